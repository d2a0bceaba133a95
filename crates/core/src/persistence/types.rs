use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

use crate::record::WorkRecord;

/// Default sheet for failed records.
pub const ERROR_SHEET: &str = "Erros";

/// Which of the two job queues a batch belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueueKind {
    Success,
    Error,
}

impl QueueKind {
    /// Prefix of the workbook file name.
    pub fn file_label(&self) -> &'static str {
        match self {
            QueueKind::Success => "Sucessos",
            QueueKind::Error => "Erros",
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            QueueKind::Success => "success",
            QueueKind::Error => "error",
        }
    }
}

impl fmt::Display for QueueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A batch waiting to be appended to `sheet_name`.
#[derive(Debug, Clone)]
pub struct QueueItem {
    pub sheet_name: String,
    pub records: Vec<WorkRecord>,
}

#[derive(Debug, Error)]
pub enum QueueError {
    /// Enqueue after shutdown. Always a lifecycle bug in the caller.
    #[error("{0} queue is shut down")]
    Closed(QueueKind),

    #[error("Sheet write failed: {0}")]
    Sheet(#[from] SheetError),
}

#[derive(Debug, Error)]
pub enum SheetError {
    #[error("Failed to read workbook: {0}")]
    Read(String),

    #[error("Failed to write workbook: {0}")]
    Write(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<rust_xlsxwriter::XlsxError> for SheetError {
    fn from(e: rust_xlsxwriter::XlsxError) -> Self {
        SheetError::Write(e.to_string())
    }
}

impl From<calamine::XlsxError> for SheetError {
    fn from(e: calamine::XlsxError) -> Self {
        SheetError::Read(e.to_string())
    }
}

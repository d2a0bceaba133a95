//! Finite, single-pass sources of work records.

mod partitioned;
mod spreadsheet;

pub use partitioned::*;
pub use spreadsheet::*;

use thiserror::Error;

use crate::record::WorkRecord;

#[derive(Debug, Error)]
pub enum SourceError {
    #[error("Failed to open workbook {path}: {reason}")]
    Open { path: String, reason: String },

    #[error("Failed to read sheet '{sheet}': {reason}")]
    Sheet { sheet: String, reason: String },
}

/// One record at a time, in input order.
///
/// Sources are read fully at construction and consumed once; rebuild the
/// source to iterate again.
pub trait WorkSource: Send {
    fn next_record(&mut self) -> Option<WorkRecord>;

    /// Number of records the source yields in total.
    fn total_rows(&self) -> usize;

    /// Number of records already yielded.
    fn position(&self) -> usize;
}

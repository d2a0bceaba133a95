use calamine::{open_workbook, Reader, Xlsx};
use rust_xlsxwriter::Workbook;
use std::path::{Path, PathBuf};
use tracing::debug;

use super::{QueueKind, SheetError};
use crate::record::{FieldValue, WorkRecord};

/// Destination of persistence queue flushes.
///
/// Called from the blocking pool, one flush at a time per store.
pub trait SheetStore: Send + Sync {
    /// Append `records` to `sheet_name`, creating it if needed. Rows already
    /// in the sheet are kept ahead of the new ones.
    fn append(&self, sheet_name: &str, records: &[WorkRecord]) -> Result<(), SheetError>;
}

/// Excel limits: 31 characters, none of `[]:*?/\`.
pub fn sanitize_sheet_name(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .filter(|c| !matches!(c, '[' | ']' | ':' | '*' | '?' | '/' | '\\'))
        .take(31)
        .collect();
    let cleaned = cleaned.trim().trim_matches('\'').to_string();
    if cleaned.is_empty() {
        "Sheet1".to_string()
    } else {
        cleaned
    }
}

struct Sheet {
    name: String,
    columns: Vec<String>,
    rows: Vec<Vec<Option<FieldValue>>>,
}

impl Sheet {
    fn empty(name: String) -> Self {
        Self {
            name,
            columns: Vec::new(),
            rows: Vec::new(),
        }
    }

    /// Union new columns in first-seen order, then add one row per record.
    fn extend(&mut self, records: &[WorkRecord]) {
        for record in records {
            for key in record.keys() {
                if !self.columns.iter().any(|c| c == key) {
                    self.columns.push(key.to_string());
                }
            }
            let row = self
                .columns
                .iter()
                .map(|c| record.get(c).cloned())
                .collect();
            self.rows.push(row);
        }
    }

    fn to_records(&self) -> Vec<WorkRecord> {
        self.rows
            .iter()
            .map(|row| {
                WorkRecord::from_pairs(
                    self.columns
                        .iter()
                        .zip(row.iter())
                        .filter_map(|(c, v)| v.clone().map(|v| (c.as_str(), v))),
                )
            })
            .collect()
    }
}

/// One `.xlsx` workbook per queue, created on first flush.
///
/// Every flush re-reads the workbook, unions the target sheet and rewrites
/// the file, keeping all other sheets untouched.
#[derive(Debug, Clone)]
pub struct XlsxSheetStore {
    path: PathBuf,
}

impl XlsxSheetStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// `"{Label} - PID {pid} - {stamp}.xlsx"` inside `output_dir`.
    pub fn for_job(output_dir: &Path, kind: QueueKind, pid: &str, stamp: &str) -> Self {
        Self::new(output_dir.join(format!(
            "{} - PID {} - {}.xlsx",
            kind.file_label(),
            pid,
            stamp
        )))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Records currently stored in `sheet_name`, or `None` if the workbook or
    /// the sheet does not exist yet.
    pub fn read_sheet(&self, sheet_name: &str) -> Result<Option<Vec<WorkRecord>>, SheetError> {
        let name = sanitize_sheet_name(sheet_name);
        Ok(self
            .load()?
            .into_iter()
            .find(|s| same_sheet(&s.name, &name))
            .map(|s| s.to_records()))
    }

    pub fn sheet_names(&self) -> Result<Vec<String>, SheetError> {
        Ok(self.load()?.into_iter().map(|s| s.name).collect())
    }

    fn load(&self) -> Result<Vec<Sheet>, SheetError> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }

        let mut workbook: Xlsx<_> = open_workbook(&self.path)?;
        let mut sheets = Vec::new();
        for name in workbook.sheet_names() {
            let range = workbook.worksheet_range(&name)?;
            let mut rows = range.rows();
            let columns: Vec<String> = match rows.next() {
                Some(cells) => cells
                    .iter()
                    .map(|c| {
                        FieldValue::from_cell(c)
                            .map(|v| v.display_text())
                            .unwrap_or_default()
                    })
                    .collect(),
                None => Vec::new(),
            };
            let rows = rows
                .map(|cells| {
                    (0..columns.len())
                        .map(|i| cells.get(i).and_then(FieldValue::from_cell))
                        .collect()
                })
                .collect();
            sheets.push(Sheet {
                name,
                columns,
                rows,
            });
        }
        Ok(sheets)
    }

    fn save(&self, sheets: &[Sheet]) -> Result<(), SheetError> {
        let mut workbook = Workbook::new();
        for sheet in sheets {
            let worksheet = workbook.add_worksheet();
            worksheet.set_name(&sheet.name)?;

            for (col, name) in sheet.columns.iter().enumerate() {
                worksheet.write_string(0, col as u16, name)?;
            }
            for (r, row) in sheet.rows.iter().enumerate() {
                let r = (r + 1) as u32;
                for (col, value) in row.iter().enumerate() {
                    let col = col as u16;
                    match value {
                        None => {}
                        Some(FieldValue::Text(s)) => {
                            worksheet.write_string(r, col, s)?;
                        }
                        Some(FieldValue::Integer(i)) => {
                            worksheet.write_number(r, col, *i as f64)?;
                        }
                        Some(FieldValue::Number(n)) => {
                            worksheet.write_number(r, col, *n)?;
                        }
                        Some(v @ FieldValue::Date(_)) => {
                            worksheet.write_string(r, col, v.display_text())?;
                        }
                    }
                }
            }
        }

        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let staging = self.path.with_extension("xlsx.partial");
        workbook.save(&staging)?;
        std::fs::rename(&staging, &self.path)?;
        Ok(())
    }
}

/// Workbook sheet names are unique case-insensitively.
fn same_sheet(a: &str, b: &str) -> bool {
    a.to_lowercase() == b.to_lowercase()
}

impl SheetStore for XlsxSheetStore {
    fn append(&self, sheet_name: &str, records: &[WorkRecord]) -> Result<(), SheetError> {
        let name = sanitize_sheet_name(sheet_name);
        let mut sheets = self.load()?;

        let idx = match sheets.iter().position(|s| same_sheet(&s.name, &name)) {
            Some(idx) => idx,
            None => {
                sheets.push(Sheet::empty(name.clone()));
                sheets.len() - 1
            }
        };
        sheets[idx].extend(records);

        self.save(&sheets)?;
        debug!(
            path = %self.path.display(),
            sheet = %name,
            added = records.len(),
            total = sheets[idx].rows.len(),
            "Flushed records to sheet"
        );
        Ok(())
    }
}

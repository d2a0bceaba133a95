use calamine::{open_workbook, Reader, Xlsx};
use std::path::Path;
use tracing::{debug, info};

use super::{SourceError, WorkSource};
use crate::record::{FieldValue, WorkRecord};

/// Records from the first sheet of an `.xlsx` workbook.
///
/// The first row is the header; column names are upper-cased. Empty cells
/// are pruned and rows left with no fields are skipped.
#[derive(Debug, Clone, Default)]
pub struct SpreadsheetSource {
    records: Vec<WorkRecord>,
    cursor: usize,
}

impl SpreadsheetSource {
    pub fn open(path: &Path) -> Result<Self, SourceError> {
        let mut workbook: Xlsx<_> = open_workbook(path).map_err(|e: calamine::XlsxError| {
            SourceError::Open {
                path: path.display().to_string(),
                reason: e.to_string(),
            }
        })?;

        let Some(sheet) = workbook.sheet_names().first().cloned() else {
            debug!(path = %path.display(), "Workbook has no sheets");
            return Ok(Self::default());
        };

        let range = workbook
            .worksheet_range(&sheet)
            .map_err(|e| SourceError::Sheet {
                sheet: sheet.clone(),
                reason: e.to_string(),
            })?;

        let mut rows = range.rows();
        let header: Vec<String> = match rows.next() {
            Some(cells) => cells
                .iter()
                .map(|c| {
                    FieldValue::from_cell(c)
                        .map(|v| v.display_text().to_uppercase())
                        .unwrap_or_default()
                })
                .collect(),
            None => Vec::new(),
        };

        let records: Vec<WorkRecord> = rows
            .map(|cells| {
                WorkRecord::from_pairs(header.iter().zip(cells.iter()).filter_map(
                    |(name, cell)| FieldValue::from_cell(cell).map(|v| (name.as_str(), v)),
                ))
            })
            .filter(|r| !r.is_empty())
            .collect();

        info!(
            path = %path.display(),
            sheet = %sheet,
            rows = records.len(),
            "Loaded input spreadsheet"
        );

        Ok(Self::from_records(records))
    }

    /// In-memory source; empty records are skipped.
    pub fn from_records(records: Vec<WorkRecord>) -> Self {
        Self {
            records: records.into_iter().filter(|r| !r.is_blank()).collect(),
            cursor: 0,
        }
    }
}

impl WorkSource for SpreadsheetSource {
    fn next_record(&mut self) -> Option<WorkRecord> {
        let record = self.records.get(self.cursor).cloned()?;
        self.cursor += 1;
        Some(record)
    }

    fn total_rows(&self) -> usize {
        self.records.len()
    }

    fn position(&self) -> usize {
        self.cursor
    }
}

impl Iterator for SpreadsheetSource {
    type Item = WorkRecord;

    fn next(&mut self) -> Option<WorkRecord> {
        self.next_record()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_xlsxwriter::Workbook;
    use tempfile::TempDir;

    fn write_input(dir: &TempDir) -> std::path::PathBuf {
        let path = dir.path().join("input.xlsx");
        let mut workbook = Workbook::new();
        let sheet = workbook.add_worksheet();
        sheet.write_string(0, 0, "numero_processo").unwrap();
        sheet.write_string(0, 1, "Valor").unwrap();
        sheet.write_string(1, 0, "0010045-12.2023.5.15.0001").unwrap();
        sheet.write_number(1, 1, 1500.25).unwrap();
        // row 2 left empty
        sheet.write_string(3, 0, "0020001-01.2022.5.02.0010").unwrap();
        workbook.save(&path).unwrap();
        path
    }

    #[test]
    fn test_open_reads_non_empty_rows_in_order() {
        let dir = TempDir::new().unwrap();
        let path = write_input(&dir);

        let mut source = SpreadsheetSource::open(&path).unwrap();
        assert_eq!(source.total_rows(), 2);

        let first = source.next_record().unwrap();
        assert_eq!(
            first.get_text("NUMERO_PROCESSO").unwrap(),
            "0010045-12.2023.5.15.0001"
        );
        assert_eq!(first.get_text("VALOR").unwrap(), "1500,25");

        let second = source.next().unwrap();
        assert!(second.get("VALOR").is_none());
        assert_eq!(source.position(), 2);
        assert!(source.next().is_none());
    }

    #[test]
    fn test_open_missing_file_fails() {
        let result = SpreadsheetSource::open(Path::new("/nonexistent/input.xlsx"));
        assert!(matches!(result, Err(SourceError::Open { .. })));
    }

    #[test]
    fn test_from_records_skips_empty() {
        let source = SpreadsheetSource::from_records(vec![
            WorkRecord::new(),
            WorkRecord::from_pairs([("A", "1")]),
        ]);
        assert_eq!(source.total_rows(), 1);
        assert_eq!(source.count(), 1);
    }
}

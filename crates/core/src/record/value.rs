use calamine::Data;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;

/// A single cell value.
///
/// Display formatting follows the sheet conventions of the courts:
/// dates as `dd/mm/YYYY`, decimals with a comma separator and two places.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    Integer(i64),
    Number(f64),
    Date(NaiveDate),
    Text(String),
}

impl FieldValue {
    /// Blank text and NaN numbers carry no information and are pruned.
    pub fn is_blank(&self) -> bool {
        match self {
            FieldValue::Text(s) => s.trim().is_empty(),
            FieldValue::Number(n) => n.is_nan(),
            FieldValue::Integer(_) | FieldValue::Date(_) => false,
        }
    }

    pub fn display_text(&self) -> String {
        match self {
            FieldValue::Text(s) => s.clone(),
            FieldValue::Integer(i) => i.to_string(),
            FieldValue::Number(n) if n.is_nan() => String::new(),
            FieldValue::Number(n) => format!("{:.2}", n).replace('.', ","),
            FieldValue::Date(d) => d.format("%d/%m/%Y").to_string(),
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            FieldValue::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Convert a spreadsheet cell. Empty, error and blank cells yield `None`.
    pub fn from_cell(cell: &Data) -> Option<Self> {
        let value = match cell {
            Data::Int(i) => FieldValue::Integer(*i),
            Data::Float(f) if f.is_nan() => return None,
            Data::Float(f) if f.fract() == 0.0 && f.abs() < 1e15 => FieldValue::Integer(*f as i64),
            Data::Float(f) => FieldValue::Number(*f),
            Data::String(s) => FieldValue::Text(s.trim().to_string()),
            Data::Bool(b) => FieldValue::Text(b.to_string()),
            Data::DateTime(dt) => FieldValue::Date(dt.as_datetime()?.date()),
            Data::DateTimeIso(s) => s
                .get(..10)
                .and_then(|d| NaiveDate::parse_from_str(d, "%Y-%m-%d").ok())
                .map(FieldValue::Date)
                .unwrap_or_else(|| FieldValue::Text(s.clone())),
            Data::DurationIso(s) => FieldValue::Text(s.clone()),
            Data::Error(_) | Data::Empty => return None,
        };

        if value.is_blank() {
            None
        } else {
            Some(value)
        }
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.display_text())
    }
}

impl From<&str> for FieldValue {
    fn from(s: &str) -> Self {
        FieldValue::Text(s.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(s: String) -> Self {
        FieldValue::Text(s)
    }
}

impl From<i64> for FieldValue {
    fn from(i: i64) -> Self {
        FieldValue::Integer(i)
    }
}

impl From<f64> for FieldValue {
    fn from(n: f64) -> Self {
        FieldValue::Number(n)
    }
}

impl From<NaiveDate> for FieldValue {
    fn from(d: NaiveDate) -> Self {
        FieldValue::Date(d)
    }
}

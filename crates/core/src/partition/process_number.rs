use once_cell::sync::Lazy;
use regex_lite::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;

use super::PartitionError;

/// `NNNNNNN-DD.AAAA.J.TR.OOOO`
static MASKED: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\d{7}-\d{2}\.\d{4}\.\d\.\d{2}\.\d{4}$").expect("valid regex"));

static BARE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\d{20}$").expect("valid regex"));

/// Unified Brazilian process number, held in its canonical masked form.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ProcessNumber(String);

impl ProcessNumber {
    /// Accepts the masked form or the 20 bare digits.
    pub fn parse(raw: &str) -> Result<Self, PartitionError> {
        let trimmed = raw.trim();
        if MASKED.is_match(trimmed) {
            return Ok(Self(trimmed.to_string()));
        }
        if BARE.is_match(trimmed) {
            let d = trimmed;
            return Ok(Self(format!(
                "{}-{}.{}.{}.{}.{}",
                &d[0..7],
                &d[7..9],
                &d[9..13],
                &d[13..14],
                &d[14..16],
                &d[16..20]
            )));
        }
        Err(PartitionError::InvalidProcessNumber(raw.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Judicial branch segment (`J`).
    pub fn branch(&self) -> &str {
        &self.0[16..17]
    }

    /// Two-digit tribunal segment (`TR`).
    pub fn tribunal(&self) -> &str {
        &self.0[18..20]
    }

    /// Tribunal code without leading zeros, as used in regional hostnames.
    pub fn region(&self) -> String {
        let stripped = self.tribunal().trim_start_matches('0');
        if stripped.is_empty() {
            "0".to_string()
        } else {
            stripped.to_string()
        }
    }
}

impl fmt::Display for ProcessNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use tracing::debug;

use super::{PositionIndex, ProcessNumber};
use crate::record::WorkRecord;

/// Field holding the unified process number in court spreadsheets.
pub const DEFAULT_PARTITION_FIELD: &str = "NUMERO_PROCESSO";

/// Routing key of a partition: the tribunal code of its records.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PartitionKey(String);

impl PartitionKey {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PartitionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Output of a partitioning pass.
#[derive(Debug, Clone, Default)]
pub struct Partitions {
    /// Groups in first-seen order; records keep input order within a group.
    pub groups: Vec<(PartitionKey, Vec<WorkRecord>)>,
    /// Canonical identifier to original input position.
    pub positions: PositionIndex,
    /// Field the identifiers were read from.
    pub field: String,
    /// Records dropped for a missing or malformed identifier.
    pub dropped: usize,
}

impl Partitions {
    pub fn total_rows(&self) -> usize {
        self.positions.len()
    }

    pub fn len(&self) -> usize {
        self.groups.len()
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    /// 1-based row of a record, looked up by its identifier field.
    pub fn row_of(&self, record: &WorkRecord) -> Option<usize> {
        row_of(&self.positions, &self.field, record)
    }
}

pub(crate) fn row_of(positions: &PositionIndex, field: &str, record: &WorkRecord) -> Option<usize> {
    record
        .get(field)
        .and_then(|v| v.as_str())
        .and_then(|id| positions.row(id))
}

/// Groups records by the region encoded in their process number.
#[derive(Debug, Clone)]
pub struct Partitioner {
    field: String,
}

impl Default for Partitioner {
    fn default() -> Self {
        Self::new(DEFAULT_PARTITION_FIELD)
    }
}

impl Partitioner {
    pub fn new(field: impl Into<String>) -> Self {
        Self {
            field: field.into().to_uppercase(),
        }
    }

    pub fn field(&self) -> &str {
        &self.field
    }

    /// Single pass over `source`.
    ///
    /// Records whose identifier does not parse are dropped and never reach
    /// the position index. Kept records have their identifier rewritten to
    /// the canonical masked form.
    pub fn partition<I>(&self, source: I) -> Partitions
    where
        I: IntoIterator<Item = WorkRecord>,
    {
        let mut partitions = Partitions {
            field: self.field.clone(),
            ..Partitions::default()
        };
        let mut slots: HashMap<PartitionKey, usize> = HashMap::new();

        for mut record in source {
            let Some(raw) = record.get_text(&self.field) else {
                debug!(field = %self.field, "Dropping record without identifier");
                partitions.dropped += 1;
                continue;
            };

            let number = match ProcessNumber::parse(&raw) {
                Ok(number) => number,
                Err(e) => {
                    debug!(error = %e, "Dropping record from partitioning");
                    partitions.dropped += 1;
                    continue;
                }
            };

            record.insert(&self.field, number.as_str());
            partitions.positions.insert(number.as_str());

            let key = PartitionKey::new(number.region());
            let slot = *slots.entry(key.clone()).or_insert_with(|| {
                partitions.groups.push((key, Vec::new()));
                partitions.groups.len() - 1
            });
            partitions.groups[slot].1.push(record);
        }

        partitions
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(number: &str) -> WorkRecord {
        WorkRecord::from_pairs([("numero_processo", number)])
    }

    #[test]
    fn test_groups_in_first_seen_order() {
        let input = vec![
            record("0010045-12.2023.5.15.0001"),
            record("0020001-01.2022.5.02.0010"),
            record("0010046-12.2023.5.15.0001"),
        ];
        let partitions = Partitioner::default().partition(input);

        let keys: Vec<&str> = partitions.groups.iter().map(|(k, _)| k.as_str()).collect();
        assert_eq!(keys, vec!["15", "2"]);
        assert_eq!(partitions.groups[0].1.len(), 2);
        assert_eq!(partitions.total_rows(), 3);
        assert_eq!(
            partitions.positions.row("0020001-01.2022.5.02.0010"),
            Some(2)
        );
    }

    #[test]
    fn test_malformed_rows_do_not_change_counts() {
        let valid = vec![
            record("0010045-12.2023.5.15.0001"),
            record("0020001-01.2022.5.02.0010"),
        ];
        let mut noisy = valid.clone();
        noisy.insert(1, record("not-a-number"));
        noisy.push(WorkRecord::from_pairs([("OTHER", "x")]));
        noisy.push(record("123"));

        let clean = Partitioner::default().partition(valid);
        let dirty = Partitioner::default().partition(noisy);

        assert_eq!(clean.len(), dirty.len());
        assert_eq!(clean.total_rows(), dirty.total_rows());
        assert_eq!(dirty.dropped, 3);
    }

    #[test]
    fn test_identifier_rewritten_to_canonical_form() {
        let partitions = Partitioner::default().partition(vec![record("00100451220235150001")]);
        let rec = &partitions.groups[0].1[0];
        assert_eq!(
            rec.get_text("NUMERO_PROCESSO").unwrap(),
            "0010045-12.2023.5.15.0001"
        );
        assert_eq!(partitions.row_of(rec), Some(1));
    }

    #[test]
    fn test_duplicates_keep_first_position() {
        let input = vec![
            record("0010045-12.2023.5.15.0001"),
            record("0020001-01.2022.5.02.0010"),
            record("0010045-12.2023.5.15.0001"),
        ];
        let partitions = Partitioner::default().partition(input);
        assert_eq!(partitions.total_rows(), 2);
        assert_eq!(partitions.groups[0].1.len(), 2);
        assert_eq!(partitions.row_of(&partitions.groups[0].1[1]), Some(1));
    }
}

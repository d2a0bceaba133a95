use std::collections::VecDeque;

use crate::partition::{PartitionKey, Partitions};
use crate::record::WorkRecord;

/// Partition groups from a [`Partitions`] result, in first-seen order.
#[derive(Debug)]
pub struct PartitionedSource {
    groups: VecDeque<(PartitionKey, Vec<WorkRecord>)>,
    total_rows: usize,
    position: usize,
}

impl PartitionedSource {
    pub fn new(partitions: Partitions) -> Self {
        Self {
            total_rows: partitions.total_rows(),
            groups: partitions.groups.into(),
            position: 0,
        }
    }

    /// Distinct identifiers across all groups.
    pub fn total_rows(&self) -> usize {
        self.total_rows
    }

    /// Number of groups already yielded.
    pub fn position(&self) -> usize {
        self.position
    }

    pub fn remaining_groups(&self) -> usize {
        self.groups.len()
    }
}

impl Iterator for PartitionedSource {
    type Item = (PartitionKey, Vec<WorkRecord>);

    fn next(&mut self) -> Option<Self::Item> {
        let group = self.groups.pop_front()?;
        self.position += 1;
        Some(group)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::partition::Partitioner;

    #[test]
    fn test_yields_groups_once() {
        let partitions = Partitioner::default().partition(vec![
            WorkRecord::from_pairs([("NUMERO_PROCESSO", "0010045-12.2023.5.15.0001")]),
            WorkRecord::from_pairs([("NUMERO_PROCESSO", "0020001-01.2022.5.02.0010")]),
        ]);
        let mut source = PartitionedSource::new(partitions);
        assert_eq!(source.total_rows(), 2);

        let (key, records) = source.next().unwrap();
        assert_eq!(key.as_str(), "15");
        assert_eq!(records.len(), 1);
        assert_eq!(source.position(), 1);

        assert!(source.next().is_some());
        assert!(source.next().is_none());
        assert_eq!(source.remaining_groups(), 0);
    }
}

use std::collections::HashMap;

/// Order in which identifiers were first seen.
///
/// Positions are 0-based and dense; [`row`](Self::row) gives the 1-based row
/// shown to operators.
#[derive(Debug, Clone, Default)]
pub struct PositionIndex {
    positions: HashMap<String, usize>,
}

impl PositionIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Index an identifier; an already-indexed identifier keeps its position.
    pub fn insert(&mut self, id: &str) -> usize {
        let next = self.positions.len();
        *self.positions.entry(id.to_string()).or_insert(next)
    }

    pub fn position(&self, id: &str) -> Option<usize> {
        self.positions.get(id).copied()
    }

    pub fn row(&self, id: &str) -> Option<usize> {
        self.position(id).map(|p| p + 1)
    }

    pub fn len(&self) -> usize {
        self.positions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }
}

use serde::Serialize;

use super::{EventKind, MessageType};

/// Running totals reported with every event.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ProgressCounters {
    pub total: usize,
    pub success: usize,
    pub error: usize,
    pub remaining: usize,
}

impl ProgressCounters {
    pub fn set_total(&mut self, total: usize) {
        self.total = total;
        self.remaining = total;
    }

    /// Update for one emitted event.
    ///
    /// Only completed records move the success/error counts; each one takes
    /// one off `remaining` (never below zero). Finishing clears `remaining`.
    pub fn apply(&mut self, kind: EventKind, message_type: MessageType) {
        match (kind, message_type) {
            (EventKind::RecordCompleted, MessageType::Success) => {
                self.success += 1;
                self.remaining = self.remaining.saturating_sub(1);
            }
            (EventKind::RecordCompleted, MessageType::Error) => {
                self.error += 1;
                self.remaining = self.remaining.saturating_sub(1);
            }
            (EventKind::ExecutionFinished, _) => self.remaining = 0,
            _ => {}
        }
    }
}

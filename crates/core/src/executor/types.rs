use async_trait::async_trait;
use serde::Serialize;
use std::sync::atomic::{AtomicUsize, Ordering};
use thiserror::Error;

use crate::partition::PartitionKey;
use crate::persistence::QueueError;
use crate::record::{RecordError, WorkRecord};

#[derive(Debug, Error)]
pub enum ExecutorError {
    /// Failed records could not be reported; the error queue is gone.
    #[error("Failed to report record failure: {0}")]
    Report(#[from] QueueError),

    #[error("Worker task failed: {0}")]
    Worker(String),
}

/// Counts from one executor run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ExecutorReport {
    /// Records handed to a worker, whatever the outcome.
    pub processed: usize,
    pub succeeded: usize,
    pub failed: usize,
    /// Partitions whose session could not be opened.
    pub skipped_partitions: usize,
    /// Records routed to the error sheet because their partition was skipped.
    pub skipped_records: usize,
    pub cancelled: bool,
}

/// Where failed records go: annotated, appended to the error sheet and
/// reported as an error event.
pub trait FailureSink: Send + Sync {
    fn report_failure(
        &self,
        record: WorkRecord,
        row: Option<usize>,
        reason: &str,
    ) -> Result<(), QueueError>;
}

/// Processes the records of one partition after opening a session for it.
///
/// One worker instance runs on one pool task and handles partitions one at
/// a time, so it may hold a page driver.
#[async_trait]
pub trait PartitionWorker: Send + 'static {
    /// Authenticate for `key`. `false` skips the partition.
    async fn open_session(&mut self, key: &PartitionKey) -> bool;

    async fn process(
        &mut self,
        key: &PartitionKey,
        row: Option<usize>,
        record: &mut WorkRecord,
    ) -> Result<(), RecordError>;

    /// Called once after the last partition this worker takes.
    async fn finish(&mut self) {}
}

/// Processes records from a non-partitioned source.
#[async_trait]
pub trait RecordProcessor: Send {
    async fn process(&mut self, row: usize, record: &mut WorkRecord) -> Result<(), RecordError>;
}

/// Counters shared by pool tasks.
#[derive(Debug, Default)]
pub(crate) struct RunStats {
    pub processed: AtomicUsize,
    pub succeeded: AtomicUsize,
    pub failed: AtomicUsize,
    pub skipped_partitions: AtomicUsize,
    pub skipped_records: AtomicUsize,
}

impl RunStats {
    pub fn report(&self, cancelled: bool) -> ExecutorReport {
        ExecutorReport {
            processed: self.processed.load(Ordering::Relaxed),
            succeeded: self.succeeded.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            skipped_partitions: self.skipped_partitions.load(Ordering::Relaxed),
            skipped_records: self.skipped_records.load(Ordering::Relaxed),
            cancelled,
        }
    }
}

use std::sync::atomic::Ordering;
use std::sync::{Arc, Mutex};
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use super::{ExecutorError, ExecutorReport, FailureSink, PartitionWorker, RunStats};
use crate::cancel::CancellationFlag;
use crate::metrics;
use crate::partition::{row_of, PartitionKey, Partitions, PositionIndex};
use crate::source::PartitionedSource;

/// Fixed-size pool draining a shared FIFO of partitions.
#[derive(Debug, Clone)]
pub struct PartitionExecutor {
    pool_size: usize,
    cancel: CancellationFlag,
}

struct RowLookup {
    positions: PositionIndex,
    field: String,
}

impl PartitionExecutor {
    /// `pool_size` below 1 is treated as 1.
    pub fn new(pool_size: usize, cancel: CancellationFlag) -> Self {
        Self {
            pool_size: pool_size.max(1),
            cancel,
        }
    }

    pub fn pool_size(&self) -> usize {
        self.pool_size
    }

    /// Process every partition. `make_worker` is called once per pool task
    /// with the task index.
    ///
    /// Returns once every task has stopped, either because the queue is
    /// empty or because cancellation was observed.
    pub async fn run<W, F>(
        &self,
        partitions: Partitions,
        sink: Arc<dyn FailureSink>,
        mut make_worker: F,
    ) -> Result<ExecutorReport, ExecutorError>
    where
        W: PartitionWorker,
        F: FnMut(usize) -> W,
    {
        let lookup = Arc::new(RowLookup {
            positions: partitions.positions.clone(),
            field: partitions.field.clone(),
        });
        let workers = self.pool_size.min(partitions.len()).max(1);
        let queue = Arc::new(Mutex::new(PartitionedSource::new(partitions)));
        let stats = Arc::new(RunStats::default());

        info!(workers, "Starting partition executor");

        let mut tasks = JoinSet::new();
        for index in 0..workers {
            tasks.spawn(drain(
                index,
                make_worker(index),
                Arc::clone(&queue),
                Arc::clone(&sink),
                Arc::clone(&lookup),
                Arc::clone(&stats),
                self.cancel.clone(),
            ));
        }

        let mut first_error = None;
        while let Some(joined) = tasks.join_next().await {
            let result = joined.map_err(|e| ExecutorError::Worker(e.to_string()));
            if let Err(e) = result.and_then(|r| r) {
                warn!("Executor worker stopped with error: {}", e);
                if first_error.is_none() {
                    // Remaining workers stop before their next partition.
                    self.cancel.cancel();
                    first_error = Some(e);
                }
            }
        }
        if let Some(e) = first_error {
            return Err(e);
        }

        let report = stats.report(self.cancel.is_cancelled());
        info!(
            processed = report.processed,
            succeeded = report.succeeded,
            failed = report.failed,
            skipped_partitions = report.skipped_partitions,
            cancelled = report.cancelled,
            "Partition executor finished"
        );
        Ok(report)
    }
}

async fn drain<W: PartitionWorker>(
    index: usize,
    mut worker: W,
    queue: Arc<Mutex<PartitionedSource>>,
    sink: Arc<dyn FailureSink>,
    lookup: Arc<RowLookup>,
    stats: Arc<RunStats>,
    cancel: CancellationFlag,
) -> Result<(), ExecutorError> {
    let result = drain_partitions(index, &mut worker, &queue, sink.as_ref(), &lookup, &stats, &cancel).await;
    worker.finish().await;
    result
}

async fn drain_partitions<W: PartitionWorker>(
    index: usize,
    worker: &mut W,
    queue: &Mutex<PartitionedSource>,
    sink: &dyn FailureSink,
    lookup: &RowLookup,
    stats: &RunStats,
    cancel: &CancellationFlag,
) -> Result<(), ExecutorError> {
    loop {
        if cancel.is_cancelled() {
            debug!(worker = index, "Cancellation observed before next partition");
            return Ok(());
        }

        let next = queue.lock().unwrap_or_else(|p| p.into_inner()).next();
        let Some((key, records)) = next else {
            return Ok(());
        };

        debug!(worker = index, partition = %key, records = records.len(), "Opening session");
        if !worker.open_session(&key).await {
            warn!(worker = index, partition = %key, "Session failed, skipping partition");
            stats.skipped_partitions.fetch_add(1, Ordering::Relaxed);
            let reason = format!("Authentication failed for partition {}", key);
            for record in records {
                let row = row_of(&lookup.positions, &lookup.field, &record);
                sink.report_failure(record, row, &reason)?;
                stats.skipped_records.fetch_add(1, Ordering::Relaxed);
            }
            continue;
        }

        process_partition(worker, &key, records, sink, lookup, stats, cancel).await?;
    }
}

async fn process_partition<W: PartitionWorker>(
    worker: &mut W,
    key: &PartitionKey,
    records: Vec<crate::record::WorkRecord>,
    sink: &dyn FailureSink,
    lookup: &RowLookup,
    stats: &RunStats,
    cancel: &CancellationFlag,
) -> Result<(), ExecutorError> {
    for mut record in records {
        if cancel.is_cancelled() {
            debug!(partition = %key, "Cancellation observed, leaving partition");
            return Ok(());
        }

        let row = row_of(&lookup.positions, &lookup.field, &record);
        let result = worker.process(key, row, &mut record).await;
        stats.processed.fetch_add(1, Ordering::Relaxed);

        match result {
            Ok(()) => {
                stats.succeeded.fetch_add(1, Ordering::Relaxed);
                metrics::RECORDS_PROCESSED
                    .with_label_values(&["succeeded"])
                    .inc();
            }
            Err(e) => {
                stats.failed.fetch_add(1, Ordering::Relaxed);
                metrics::RECORDS_PROCESSED.with_label_values(&["failed"]).inc();
                debug!(partition = %key, row = ?row, "Record failed: {}", e);
                sink.report_failure(record, row, &e.to_string())?;
            }
        }
    }
    Ok(())
}

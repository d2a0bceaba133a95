use std::sync::atomic::Ordering;
use tracing::{debug, info};

use super::{ExecutorError, ExecutorReport, FailureSink, RecordProcessor, RunStats};
use crate::cancel::CancellationFlag;
use crate::metrics;
use crate::source::WorkSource;

/// Run `processor` over every record of `source`, in order, on the current
/// task. Rows are 1-based input positions.
pub async fn process_sequential<S, P>(
    source: &mut S,
    processor: &mut P,
    sink: &dyn FailureSink,
    cancel: &CancellationFlag,
) -> Result<ExecutorReport, ExecutorError>
where
    S: WorkSource + ?Sized,
    P: RecordProcessor + ?Sized,
{
    let stats = RunStats::default();

    loop {
        if cancel.is_cancelled() {
            debug!(position = source.position(), "Cancellation observed, stopping");
            break;
        }
        let Some(mut record) = source.next_record() else {
            break;
        };
        let row = source.position();

        let result = processor.process(row, &mut record).await;
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
                sink.report_failure(record, Some(row), &e.to_string())?;
            }
        }
    }

    let report = stats.report(cancel.is_cancelled());
    info!(
        processed = report.processed,
        failed = report.failed,
        cancelled = report.cancelled,
        "Sequential run finished"
    );
    Ok(report)
}

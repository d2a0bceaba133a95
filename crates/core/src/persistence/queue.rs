use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::{QueueError, QueueItem, QueueKind, SheetStore};
use crate::metrics;
use crate::record::WorkRecord;

/// Handle to a single-writer persistence queue.
///
/// Batches for the same sheet are flushed in enqueue order. After
/// [`shutdown`](Self::shutdown) every further enqueue fails with
/// [`QueueError::Closed`].
pub struct PersistenceQueue {
    kind: QueueKind,
    tx: Mutex<Option<mpsc::UnboundedSender<QueueItem>>>,
    writer: tokio::sync::Mutex<Option<JoinHandle<()>>>,
}

impl PersistenceQueue {
    /// Start the writer task. Must be called from within a tokio runtime.
    pub fn spawn(kind: QueueKind, store: Arc<dyn SheetStore>) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let writer = SheetWriter { kind, store, rx };
        let handle = tokio::spawn(writer.run());

        Self {
            kind,
            tx: Mutex::new(Some(tx)),
            writer: tokio::sync::Mutex::new(Some(handle)),
        }
    }

    pub fn kind(&self) -> QueueKind {
        self.kind
    }

    /// Hand a batch to the writer. Never blocks; empty batches are ignored.
    pub fn enqueue(
        &self,
        sheet_name: impl Into<String>,
        records: Vec<WorkRecord>,
    ) -> Result<(), QueueError> {
        let guard = self.tx.lock().unwrap_or_else(|p| p.into_inner());
        let Some(tx) = guard.as_ref() else {
            return Err(QueueError::Closed(self.kind));
        };

        if records.is_empty() {
            return Ok(());
        }

        tx.send(QueueItem {
            sheet_name: sheet_name.into(),
            records,
        })
        .map_err(|_| QueueError::Closed(self.kind))
    }

    pub fn is_closed(&self) -> bool {
        self.tx.lock().unwrap_or_else(|p| p.into_inner()).is_none()
    }

    /// Close the queue and wait until every accepted batch is flushed.
    pub async fn shutdown(&self) {
        let sender = self.tx.lock().unwrap_or_else(|p| p.into_inner()).take();
        drop(sender);

        let handle = self.writer.lock().await.take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                error!(queue = %self.kind, "Sheet writer task failed: {}", e);
            }
        }
    }
}

/// Background consumer owning the sheet store.
struct SheetWriter {
    kind: QueueKind,
    store: Arc<dyn SheetStore>,
    rx: mpsc::UnboundedReceiver<QueueItem>,
}

impl SheetWriter {
    async fn run(mut self) {
        info!(queue = %self.kind, "Sheet writer started");

        while let Some(item) = self.rx.recv().await {
            let store = Arc::clone(&self.store);
            let sheet = item.sheet_name.clone();
            let count = item.records.len();

            let result =
                tokio::task::spawn_blocking(move || store.append(&item.sheet_name, &item.records))
                    .await;

            match result {
                Ok(Ok(())) => {
                    metrics::QUEUE_FLUSHES_TOTAL
                        .with_label_values(&[self.kind.as_str(), "ok"])
                        .inc();
                    debug!(queue = %self.kind, sheet = %sheet, records = count, "Flushed batch");
                }
                Ok(Err(e)) => {
                    metrics::QUEUE_FLUSHES_TOTAL
                        .with_label_values(&[self.kind.as_str(), "failed"])
                        .inc();
                    error!(queue = %self.kind, sheet = %sheet, records = count, "Failed to flush batch: {}", e);
                }
                Err(e) => {
                    metrics::QUEUE_FLUSHES_TOTAL
                        .with_label_values(&[self.kind.as_str(), "failed"])
                        .inc();
                    warn!(queue = %self.kind, sheet = %sheet, "Flush task aborted: {}", e);
                }
            }
        }

        info!(queue = %self.kind, "Sheet writer shutting down");
    }
}

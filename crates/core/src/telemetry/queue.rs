use chrono::Utc;
use chrono_tz::Tz;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::fs::{File, OpenOptions};
use tokio::io::AsyncWriteExt;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

use super::channel::{ChannelError, ProgressChannel, ProgressSink};
use super::{
    EventKind, JobStatus, MessageType, ProgressCounters, TelemetryEvent, EXECUTION_SUCCEEDED,
};
use crate::cancel::CancellationFlag;
use crate::metrics;

/// After a failed connect, events skip the channel for this long.
const RECONNECT_BACKOFF: Duration = Duration::from_secs(30);

/// `[({pid}, {type}, {row}, {HH:MM:SS})> {message}]`
pub fn format_line(pid: &str, message_type: MessageType, row: usize, time: &str, message: &str) -> String {
    format!("[({}, {}, {}, {})> {}]", pid, message_type, row, time, message)
}

/// Per-job progress queue.
///
/// Counters are computed at emission time, so events reach the writer with
/// their final values and in emission order.
pub struct TelemetryQueue {
    pid: String,
    timezone: Tz,
    current_row: AtomicUsize,
    counters: Mutex<ProgressCounters>,
    tx: Mutex<Option<mpsc::UnboundedSender<TelemetryEvent>>>,
    writer: tokio::sync::Mutex<Option<JoinHandle<()>>>,
}

impl TelemetryQueue {
    /// Start the writer task. `channel` may be `None`, in which case events
    /// only reach the log file.
    pub fn spawn(
        pid: impl Into<String>,
        channel: Option<Arc<dyn ProgressChannel>>,
        log_path: PathBuf,
        cancel: CancellationFlag,
        timezone: Tz,
    ) -> Self {
        let pid = pid.into();
        let (tx, rx) = mpsc::unbounded_channel();
        let writer = TelemetryWriter {
            pid: pid.clone(),
            rx,
            channel,
            sink: None,
            reconnect_after: None,
            cancel,
            log_path,
            log_file: None,
        };
        let handle = tokio::spawn(writer.run());

        Self {
            pid,
            timezone,
            current_row: AtomicUsize::new(0),
            counters: Mutex::new(ProgressCounters::default()),
            tx: Mutex::new(Some(tx)),
            writer: tokio::sync::Mutex::new(Some(handle)),
        }
    }

    pub fn pid(&self) -> &str {
        &self.pid
    }

    /// Row used for events emitted without an explicit row.
    pub fn set_row(&self, row: usize) {
        self.current_row.store(row, Ordering::SeqCst);
    }

    pub fn set_total(&self, total: usize) {
        self.counters
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .set_total(total);
    }

    pub fn counters(&self) -> ProgressCounters {
        *self.counters.lock().unwrap_or_else(|p| p.into_inner())
    }

    /// Emit a progress message. The canonical sentinels are recognised and
    /// counted as record completion or end of execution.
    pub fn emit(&self, message: impl Into<String>, message_type: MessageType, row: Option<usize>) {
        let message = message.into();
        let kind = EventKind::classify(&message);
        self.push(kind, message, message_type, row, None);
    }

    /// Emit with an attached download link.
    pub fn emit_with_link(
        &self,
        message: impl Into<String>,
        message_type: MessageType,
        row: Option<usize>,
        link: Option<String>,
    ) {
        let message = message.into();
        let kind = EventKind::classify(&message);
        self.push(kind, message, message_type, row, link);
    }

    /// A record finished successfully.
    pub fn record_succeeded(&self, row: Option<usize>) {
        self.push(
            EventKind::RecordCompleted,
            EXECUTION_SUCCEEDED.to_string(),
            MessageType::Success,
            row,
            None,
        );
    }

    /// A record failed with `reason`.
    pub fn record_failed(&self, row: Option<usize>, reason: &str) {
        self.push(
            EventKind::RecordCompleted,
            reason.to_string(),
            MessageType::Error,
            row,
            None,
        );
    }

    fn push(
        &self,
        kind: EventKind,
        message: String,
        message_type: MessageType,
        row: Option<usize>,
        link: Option<String>,
    ) {
        let row = match row {
            Some(r) if r > 0 => r,
            _ => self.current_row.load(Ordering::SeqCst),
        };
        let time = Utc::now()
            .with_timezone(&self.timezone)
            .format("%H:%M:%S")
            .to_string();

        // Counters and send under one lock so the channel sees them in order.
        let mut counters = self.counters.lock().unwrap_or_else(|p| p.into_inner());
        counters.apply(kind, message_type);

        let event = TelemetryEvent {
            pid: self.pid.clone(),
            row,
            message: format_line(&self.pid, message_type, row, &time, &message),
            message_type,
            kind,
            status: match kind {
                EventKind::ExecutionFinished => JobStatus::Finished,
                _ => JobStatus::Running,
            },
            total: counters.total,
            success_count: counters.success,
            error_count: counters.error,
            remaining_count: counters.remaining,
            link,
        };

        let tx = self.tx.lock().unwrap_or_else(|p| p.into_inner());
        match tx.as_ref() {
            Some(tx) => {
                if tx.send(event).is_err() {
                    warn!(pid = %self.pid, "Telemetry writer gone, dropping event");
                }
            }
            None => warn!(pid = %self.pid, message = %message, "Telemetry queue shut down, dropping event"),
        }
    }

    /// Close the queue and wait for the writer to deliver what is pending.
    pub async fn shutdown(&self) {
        let sender = self.tx.lock().unwrap_or_else(|p| p.into_inner()).take();
        drop(sender);

        let handle = self.writer.lock().await.take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                error!(pid = %self.pid, "Telemetry writer task failed: {}", e);
            }
        }
    }
}

/// Background consumer: streams events to the progress channel and appends
/// each line to the job log.
struct TelemetryWriter {
    pid: String,
    rx: mpsc::UnboundedReceiver<TelemetryEvent>,
    channel: Option<Arc<dyn ProgressChannel>>,
    sink: Option<Box<dyn ProgressSink>>,
    /// Set while the channel is degraded; no connect before this instant.
    reconnect_after: Option<Instant>,
    cancel: CancellationFlag,
    log_path: PathBuf,
    log_file: Option<File>,
}

impl TelemetryWriter {
    async fn run(mut self) {
        info!(pid = %self.pid, "Telemetry writer started");

        if self.channel.is_some() {
            self.connect().await;
        }

        while let Some(event) = self.rx.recv().await {
            self.deliver(&event).await;
            self.append_line(&event.message).await;
        }

        if let Some(mut sink) = self.sink.take() {
            sink.close().await;
        }
        if let Some(mut file) = self.log_file.take() {
            if let Err(e) = file.flush().await {
                warn!(pid = %self.pid, "Failed to flush job log: {}", e);
            }
        }

        info!(pid = %self.pid, "Telemetry writer shutting down");
    }

    async fn connect(&mut self) -> bool {
        let Some(channel) = &self.channel else {
            return false;
        };
        match channel.connect(&self.pid, self.cancel.clone()).await {
            Ok(sink) => {
                self.sink = Some(sink);
                self.reconnect_after = None;
                true
            }
            Err(e) => {
                warn!(
                    pid = %self.pid,
                    "Failed to connect progress channel, logging only for {}s: {}",
                    RECONNECT_BACKOFF.as_secs(),
                    e
                );
                self.reconnect_after = Some(Instant::now() + RECONNECT_BACKOFF);
                false
            }
        }
    }

    fn degraded(&self) -> bool {
        self.reconnect_after
            .is_some_and(|deadline| Instant::now() < deadline)
    }

    /// Best effort: one reconnect and retry on a stale binding, then drop.
    /// While degraded, events go to the log only.
    async fn deliver(&mut self, event: &TelemetryEvent) {
        if self.channel.is_none() {
            return;
        }
        if self.sink.is_none() && (self.degraded() || !self.connect().await) {
            metrics::TELEMETRY_DELIVERY_FAILURES
                .with_label_values(&["connect"])
                .inc();
            return;
        }

        let first = match self.sink.as_mut() {
            Some(sink) => sink.publish(event).await,
            None => return,
        };

        match first {
            Ok(()) => {}
            Err(ChannelError::StaleBinding) => {
                debug!(pid = %self.pid, "Progress channel stale, reconnecting");
                self.sink = None;
                let retried = if self.connect().await {
                    match self.sink.as_mut() {
                        Some(sink) => sink.publish(event).await,
                        None => Err(ChannelError::StaleBinding),
                    }
                } else {
                    Err(ChannelError::StaleBinding)
                };
                if let Err(e) = retried {
                    warn!(pid = %self.pid, "Dropping telemetry event after retry: {}", e);
                    metrics::TELEMETRY_DELIVERY_FAILURES
                        .with_label_values(&["stale_binding"])
                        .inc();
                    self.sink = None;
                }
            }
            Err(e) => {
                warn!(pid = %self.pid, "Dropping telemetry event: {}", e);
                metrics::TELEMETRY_DELIVERY_FAILURES
                    .with_label_values(&["transport"])
                    .inc();
            }
        }
    }

    async fn append_line(&mut self, line: &str) {
        if self.log_file.is_none() {
            match OpenOptions::new()
                .create(true)
                .append(true)
                .open(&self.log_path)
                .await
            {
                Ok(file) => self.log_file = Some(file),
                Err(e) => {
                    warn!(path = %self.log_path.display(), "Failed to open job log: {}", e);
                    return;
                }
            }
        }

        if let Some(file) = self.log_file.as_mut() {
            let mut bytes = line.as_bytes().to_vec();
            bytes.push(b'\n');
            if let Err(e) = file.write_all(&bytes).await {
                warn!(path = %self.log_path.display(), "Failed to append to job log: {}", e);
            }
        }
    }
}

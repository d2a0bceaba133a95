//! Mock progress channel for testing.

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;

use crate::cancel::CancellationFlag;
use crate::telemetry::{ChannelError, ProgressChannel, ProgressSink, TelemetryEvent};

#[derive(Debug, Default)]
struct ChannelState {
    published: Vec<TelemetryEvent>,
    rooms: Vec<String>,
    connects: usize,
    fail_next: Option<ChannelError>,
    unreachable: bool,
    connect_delay: Option<Duration>,
    stop_flags: Vec<CancellationFlag>,
}

/// Records published events and lets tests inject failures and the
/// remote stop signal.
#[derive(Debug, Clone, Default)]
pub struct MockProgressChannel {
    state: Arc<RwLock<ChannelState>>,
}

impl MockProgressChannel {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn published(&self) -> Vec<TelemetryEvent> {
        self.state.read().await.published.clone()
    }

    /// Room joined by each connection, in order.
    pub async fn rooms(&self) -> Vec<String> {
        self.state.read().await.rooms.clone()
    }

    pub async fn connect_count(&self) -> usize {
        self.state.read().await.connects
    }

    /// The next publish fails with `error`.
    pub async fn fail_next_publish(&self, error: ChannelError) {
        self.state.write().await.fail_next = Some(error);
    }

    /// While set, every connection attempt fails.
    pub async fn set_unreachable(&self, unreachable: bool) {
        self.state.write().await.unreachable = unreachable;
    }

    /// Every connection attempt waits this long before resolving.
    pub async fn set_connect_delay(&self, delay: Duration) {
        self.state.write().await.connect_delay = Some(delay);
    }

    /// Deliver the stop signal to every connection made so far.
    pub async fn send_stop(&self) {
        for flag in &self.state.read().await.stop_flags {
            flag.cancel();
        }
    }
}

#[async_trait]
impl ProgressChannel for MockProgressChannel {
    async fn connect(
        &self,
        room: &str,
        stop: CancellationFlag,
    ) -> Result<Box<dyn ProgressSink>, ChannelError> {
        let delay = self.state.read().await.connect_delay;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        let mut state = self.state.write().await;
        state.connects += 1;
        if state.unreachable {
            return Err(ChannelError::Transport("mock channel unreachable".to_string()));
        }
        state.rooms.push(room.to_string());
        state.stop_flags.push(stop);
        Ok(Box::new(MockSink {
            state: Arc::clone(&self.state),
        }))
    }
}

struct MockSink {
    state: Arc<RwLock<ChannelState>>,
}

#[async_trait]
impl ProgressSink for MockSink {
    async fn publish(&mut self, event: &TelemetryEvent) -> Result<(), ChannelError> {
        let mut state = self.state.write().await;
        if let Some(error) = state.fail_next.take() {
            return Err(error);
        }
        state.published.push(event.clone());
        Ok(())
    }

    async fn close(&mut self) {}
}

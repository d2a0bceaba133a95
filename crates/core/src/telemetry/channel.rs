use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::TelemetryEvent;
use crate::cancel::CancellationFlag;

#[derive(Debug, Error)]
pub enum ChannelError {
    /// The connection went away underneath us; reconnecting may help.
    #[error("Channel binding is stale")]
    StaleBinding,

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Protocol error: {0}")]
    Protocol(String),
}

/// Factory for room-scoped progress connections.
#[async_trait]
pub trait ProgressChannel: Send + Sync {
    /// Join `room` and start listening for its stop signal. Receiving the
    /// stop signal trips `stop`.
    async fn connect(
        &self,
        room: &str,
        stop: CancellationFlag,
    ) -> Result<Box<dyn ProgressSink>, ChannelError>;
}

/// A joined room accepting progress events.
#[async_trait]
pub trait ProgressSink: Send {
    async fn publish(&mut self, event: &TelemetryEvent) -> Result<(), ChannelError>;

    async fn close(&mut self);
}

/// JSON frames exchanged with the progress relay.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum Frame {
    JoinRoom {
        room: String,
    },
    Progress {
        room: String,
        data: TelemetryEvent,
    },
    Stop {
        room: String,
    },
}

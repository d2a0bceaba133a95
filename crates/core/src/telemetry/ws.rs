use async_trait::async_trait;
use futures::stream::SplitSink;
use futures::{SinkExt, StreamExt};
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::{self, protocol::Message};
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, warn};

use super::channel::{ChannelError, Frame, ProgressChannel, ProgressSink};
use super::{TelemetryConfig, TelemetryEvent};
use crate::cancel::CancellationFlag;

type WsWriter = SplitSink<WebSocketStream<MaybeTlsStream<TcpStream>>, Message>;

/// Progress relay reached over a WebSocket, one connection per job.
#[derive(Debug, Clone)]
pub struct WsProgressChannel {
    url: String,
    connect_timeout: Duration,
}

impl WsProgressChannel {
    pub fn new(url: impl Into<String>, connect_timeout: Duration) -> Self {
        Self {
            url: url.into(),
            connect_timeout,
        }
    }

    /// `None` when no relay URL is configured.
    pub fn from_config(config: &TelemetryConfig) -> Option<Self> {
        config.url.as_ref().map(|url| {
            Self::new(url.clone(), Duration::from_millis(config.connect_timeout_ms))
        })
    }
}

#[async_trait]
impl ProgressChannel for WsProgressChannel {
    async fn connect(
        &self,
        room: &str,
        stop: CancellationFlag,
    ) -> Result<Box<dyn ProgressSink>, ChannelError> {
        let (stream, _) = match tokio::time::timeout(
            self.connect_timeout,
            connect_async(self.url.as_str()),
        )
        .await
        {
            Ok(Ok(connected)) => connected,
            Ok(Err(e)) => return Err(ChannelError::Transport(e.to_string())),
            Err(_) => {
                return Err(ChannelError::Transport(format!(
                    "connection timeout ({:?})",
                    self.connect_timeout
                )))
            }
        };

        let (mut writer, mut reader) = stream.split();

        let join = serde_json::to_string(&Frame::JoinRoom {
            room: room.to_string(),
        })
        .map_err(|e| ChannelError::Protocol(e.to_string()))?;
        writer
            .send(Message::Text(join.into()))
            .await
            .map_err(classify)?;
        debug!(room = %room, url = %self.url, "Joined progress room");

        let listen_room = room.to_string();
        let listener = tokio::spawn(async move {
            while let Some(msg) = reader.next().await {
                match msg {
                    Ok(Message::Text(text)) => match serde_json::from_str::<Frame>(&text) {
                        Ok(Frame::Stop { room }) if room == listen_room => {
                            info!(room = %room, "Stop requested by operator");
                            stop.cancel();
                        }
                        Ok(_) => {}
                        Err(e) => debug!("Ignoring unrecognised frame: {}", e),
                    },
                    Ok(Message::Close(_)) => break,
                    Ok(_) => {}
                    Err(e) => {
                        debug!("Progress connection closed: {}", e);
                        break;
                    }
                }
            }
        });

        Ok(Box::new(WsSink {
            room: room.to_string(),
            writer,
            listener,
        }))
    }
}

struct WsSink {
    room: String,
    writer: WsWriter,
    listener: JoinHandle<()>,
}

#[async_trait]
impl ProgressSink for WsSink {
    async fn publish(&mut self, event: &TelemetryEvent) -> Result<(), ChannelError> {
        if self.listener.is_finished() {
            return Err(ChannelError::StaleBinding);
        }

        let frame = serde_json::to_string(&Frame::Progress {
            room: self.room.clone(),
            data: event.clone(),
        })
        .map_err(|e| ChannelError::Protocol(e.to_string()))?;

        self.writer
            .send(Message::Text(frame.into()))
            .await
            .map_err(classify)
    }

    async fn close(&mut self) {
        if let Err(e) = self.writer.close().await {
            warn!(room = %self.room, "Failed to close progress connection: {}", e);
        }
        self.listener.abort();
    }
}

impl Drop for WsSink {
    fn drop(&mut self) {
        self.listener.abort();
    }
}

fn classify(e: tungstenite::Error) -> ChannelError {
    match e {
        tungstenite::Error::ConnectionClosed
        | tungstenite::Error::AlreadyClosed
        | tungstenite::Error::Io(_) => ChannelError::StaleBinding,
        tungstenite::Error::Protocol(p) => ChannelError::Protocol(p.to_string()),
        other => ChannelError::Transport(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::telemetry::{EventKind, JobStatus, MessageType};
    use tokio::net::TcpListener;
    use tokio::sync::mpsc;

    fn event() -> TelemetryEvent {
        TelemetryEvent {
            pid: "99".into(),
            row: 1,
            message: "hello".into(),
            message_type: MessageType::Info,
            kind: EventKind::Message,
            status: JobStatus::Running,
            total: 1,
            success_count: 0,
            error_count: 0,
            remaining_count: 1,
            link: None,
        }
    }

    /// Relay that records inbound frames and sends a stop for room 99.
    async fn spawn_relay() -> (String, mpsc::UnboundedReceiver<Frame>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (tx, rx) = mpsc::unbounded_channel();

        tokio::spawn(async move {
            let (socket, _) = listener.accept().await.unwrap();
            let mut ws = tokio_tungstenite::accept_async(socket).await.unwrap();
            while let Some(Ok(Message::Text(text))) = ws.next().await {
                let frame: Frame = serde_json::from_str(&text).unwrap();
                let is_progress = matches!(frame, Frame::Progress { .. });
                tx.send(frame).unwrap();
                if is_progress {
                    let stop = serde_json::to_string(&Frame::Stop { room: "99".into() }).unwrap();
                    ws.send(Message::Text(stop.into())).await.unwrap();
                }
            }
        });

        (format!("ws://{}", addr), rx)
    }

    #[tokio::test]
    async fn test_join_publish_and_stop() {
        let (url, mut frames) = spawn_relay().await;
        let channel = WsProgressChannel::new(url, Duration::from_secs(2));
        let stop = CancellationFlag::new();

        let mut sink = channel.connect("99", stop.clone()).await.unwrap();
        sink.publish(&event()).await.unwrap();

        assert_eq!(
            frames.recv().await.unwrap(),
            Frame::JoinRoom { room: "99".into() }
        );
        assert!(matches!(frames.recv().await.unwrap(), Frame::Progress { .. }));

        for _ in 0..50 {
            if stop.is_cancelled() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        assert!(stop.is_cancelled());
        sink.close().await;
    }

    #[tokio::test]
    async fn test_connect_refused_is_transport_error() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let channel = WsProgressChannel::new(format!("ws://{}", addr), Duration::from_secs(1));
        let result = channel.connect("1", CancellationFlag::new()).await;
        assert!(matches!(result, Err(ChannelError::Transport(_))));
    }
}

use serde::{Deserialize, Serialize};
use std::fmt;

/// Emitted once per successfully completed record.
pub const EXECUTION_SUCCEEDED: &str = "Execução Efetuada com sucesso!";
/// Emitted once when the job finishes, carrying the archive link.
pub const EXECUTION_FINISHED: &str = "Fim da execução";
/// Emitted once when setup begins.
pub const JOB_STARTED: &str = "Robô inicializado!";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageType {
    Info,
    Log,
    Error,
    Warning,
    Success,
}

impl MessageType {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageType::Info => "info",
            MessageType::Log => "log",
            MessageType::Error => "error",
            MessageType::Warning => "warning",
            MessageType::Success => "success",
        }
    }
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What an event means for the progress counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    /// Free-form progress or log line.
    Message,
    /// A record finished; the message type says whether it succeeded.
    RecordCompleted,
    /// The job is done; nothing remains.
    ExecutionFinished,
}

impl EventKind {
    /// Kind carried by a plain message, recognising the canonical sentinels.
    pub fn classify(message: &str) -> Self {
        match message {
            EXECUTION_SUCCEEDED => EventKind::RecordCompleted,
            EXECUTION_FINISHED => EventKind::ExecutionFinished,
            _ => EventKind::Message,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum JobStatus {
    #[serde(rename = "Em Execução")]
    Running,
    #[serde(rename = "Finalizado")]
    Finished,
}

/// One progress update as seen by the remote observer.
///
/// Field names on the wire are the ones the dashboard consumes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TelemetryEvent {
    pub pid: String,
    pub row: usize,
    /// Formatted log line.
    pub message: String,
    pub message_type: MessageType,
    pub kind: EventKind,
    pub status: JobStatus,
    pub total: usize,
    #[serde(rename = "sucessos")]
    pub success_count: usize,
    #[serde(rename = "erros")]
    pub error_count: usize,
    #[serde(rename = "restantes")]
    pub remaining_count: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub link: Option<String>,
}

/// Progress channel configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelemetryConfig {
    /// WebSocket endpoint of the progress relay. Events only go to the log
    /// file when unset.
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            url: None,
            connect_timeout_ms: default_connect_timeout_ms(),
        }
    }
}

fn default_connect_timeout_ms() -> u64 {
    5000
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_sentinels() {
        assert_eq!(
            EventKind::classify(EXECUTION_SUCCEEDED),
            EventKind::RecordCompleted
        );
        assert_eq!(
            EventKind::classify(EXECUTION_FINISHED),
            EventKind::ExecutionFinished
        );
        assert_eq!(EventKind::classify(JOB_STARTED), EventKind::Message);
        assert_eq!(EventKind::classify("anything"), EventKind::Message);
    }

    #[test]
    fn test_event_wire_names() {
        let event = TelemetryEvent {
            pid: "42".into(),
            row: 3,
            message: "line".into(),
            message_type: MessageType::Success,
            kind: EventKind::RecordCompleted,
            status: JobStatus::Running,
            total: 10,
            success_count: 1,
            error_count: 0,
            remaining_count: 9,
            link: None,
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["message_type"], "success");
        assert_eq!(json["status"], "Em Execução");
        assert_eq!(json["sucessos"], 1);
        assert_eq!(json["restantes"], 9);
        assert!(json.get("link").is_none());
    }
}

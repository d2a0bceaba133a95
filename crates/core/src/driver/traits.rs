use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::time::Duration;
use thiserror::Error;
use tokio::time::Instant;
use tracing::debug;

/// W3C WebDriver code for the Enter key.
pub const ENTER_KEY: &str = "\u{E007}";

#[derive(Debug, Error)]
pub enum DriverError {
    #[error("Failed to start browser session: {0}")]
    Session(String),

    #[error("No element matches '{0}'")]
    NoSuchElement(String),

    #[error("WebDriver command failed ({error}): {message}")]
    Command { error: String, message: String },

    #[error("WebDriver unreachable: {0}")]
    Http(String),

    #[error("Unexpected WebDriver response: {0}")]
    Protocol(String),
}

/// Result of a bounded wait. Timing out is an expected outcome, not an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitOutcome {
    Found,
    TimedOut,
}

impl WaitOutcome {
    pub fn is_found(&self) -> bool {
        matches!(self, WaitOutcome::Found)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BrowserCookie {
    pub name: String,
    pub value: String,
    #[serde(default)]
    pub domain: Option<String>,
}

/// An outgoing request observed in the browser's network log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CapturedRequest {
    pub url: String,
    pub headers: HashMap<String, String>,
}

/// Opaque browser session.
#[async_trait]
pub trait PageDriver: Send {
    async fn navigate(&mut self, url: &str) -> Result<(), DriverError>;

    async fn current_url(&mut self) -> Result<String, DriverError>;

    /// Wait until an element matching the CSS `selector` exists.
    async fn wait_for_element(
        &mut self,
        selector: &str,
        timeout: Duration,
    ) -> Result<WaitOutcome, DriverError>;

    /// Poll the current URL until it contains `fragment`.
    ///
    /// Errors while polling (a page mid-navigation, a transient alert) count
    /// as "not yet".
    async fn wait_for_url_containing(
        &mut self,
        fragment: &str,
        timeout: Duration,
        poll: Duration,
    ) -> Result<WaitOutcome, DriverError> {
        let deadline = Instant::now() + timeout;
        loop {
            match self.current_url().await {
                Ok(url) if url.contains(fragment) => return Ok(WaitOutcome::Found),
                Ok(_) => {}
                Err(e) => debug!("Ignoring error while polling URL: {}", e),
            }
            if Instant::now() >= deadline {
                return Ok(WaitOutcome::TimedOut);
            }
            tokio::time::sleep(poll).await;
        }
    }

    async fn execute_script(&mut self, script: &str, args: Vec<Value>) -> Result<Value, DriverError>;

    /// Type into the first element matching `selector`.
    async fn send_keys(&mut self, selector: &str, text: &str) -> Result<(), DriverError>;

    async fn cookies(&mut self) -> Result<Vec<BrowserCookie>, DriverError>;

    /// Requests seen since the session started, oldest first.
    async fn captured_requests(&mut self) -> Result<Vec<CapturedRequest>, DriverError>;

    async fn quit(&mut self) -> Result<(), DriverError>;
}

/// Starts browser sessions.
#[async_trait]
pub trait DriverFactory: Send + Sync {
    async fn launch(&self) -> Result<Box<dyn PageDriver>, DriverError>;
}

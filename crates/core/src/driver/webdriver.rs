use async_trait::async_trait;
use reqwest::{Client, Method};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use super::{
    BrowserCookie, CapturedRequest, DriverConfig, DriverError, DriverFactory, PageDriver,
    WaitOutcome,
};

/// Key under which W3C WebDriver returns element references.
const ELEMENT_KEY: &str = "element-6066-11e4-a52e-4a5d6b7a0a4f";

const ELEMENT_POLL: Duration = Duration::from_millis(250);

/// Browser session driven over the W3C WebDriver HTTP protocol.
pub struct WebDriverClient {
    client: Client,
    base_url: String,
    session_id: String,
    /// Network requests drained from the performance log so far.
    captured: Vec<CapturedRequest>,
    closed: bool,
}

impl WebDriverClient {
    /// Create a new browser session.
    pub async fn launch(config: &DriverConfig) -> Result<Self, DriverError> {
        let client = Client::builder()
            .timeout(Duration::from_millis(config.default_timeout_ms))
            .build()
            .map_err(|e| DriverError::Session(e.to_string()))?;
        let base_url = config.webdriver_url.trim_end_matches('/').to_string();

        let response = client
            .post(format!("{}/session", base_url))
            .json(&capabilities(config))
            .send()
            .await
            .map_err(map_http_error)?;
        let body: Value = response
            .json()
            .await
            .map_err(|e| DriverError::Protocol(e.to_string()))?;

        let value = &body["value"];
        if let Some(error) = value.get("error").and_then(Value::as_str) {
            return Err(DriverError::Session(format!(
                "{}: {}",
                error,
                value["message"].as_str().unwrap_or_default()
            )));
        }
        let session_id = value["sessionId"]
            .as_str()
            .ok_or_else(|| DriverError::Protocol("missing sessionId".to_string()))?
            .to_string();

        info!(session = %session_id, browser = %config.browser, "Browser session started");

        Ok(Self {
            client,
            base_url,
            session_id,
            captured: Vec::new(),
            closed: false,
        })
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    async fn command(
        &self,
        method: Method,
        path: &str,
        body: Option<Value>,
    ) -> Result<Value, DriverError> {
        let url = format!("{}/session/{}{}", self.base_url, self.session_id, path);
        let mut request = self.client.request(method, &url);
        if let Some(body) = body {
            request = request.json(&body);
        }

        let response = request.send().await.map_err(map_http_error)?;
        let status = response.status();
        let mut body: Value = response
            .json()
            .await
            .map_err(|e| DriverError::Protocol(e.to_string()))?;
        let value = body["value"].take();

        if status.is_success() {
            return Ok(value);
        }

        let error = value["error"].as_str().unwrap_or("unknown error").to_string();
        let message = value["message"].as_str().unwrap_or_default().to_string();
        Err(DriverError::Command { error, message })
    }

    async fn find_element(&self, selector: &str) -> Result<Option<String>, DriverError> {
        let result = self
            .command(
                Method::POST,
                "/element",
                Some(json!({"using": "css selector", "value": selector})),
            )
            .await;

        match result {
            Ok(value) => Ok(value[ELEMENT_KEY].as_str().map(str::to_string)),
            Err(DriverError::Command { error, .. }) if error == "no such element" => Ok(None),
            Err(e) => Err(e),
        }
    }
}

fn capabilities(config: &DriverConfig) -> Value {
    let always_match = match config.browser.as_str() {
        "firefox" => json!({
            "browserName": "firefox",
            "moz:firefoxOptions": {"args": config.args},
        }),
        browser => json!({
            "browserName": browser,
            "goog:chromeOptions": {"args": config.args},
            "goog:loggingPrefs": {"performance": "ALL"},
        }),
    };
    json!({"capabilities": {"alwaysMatch": always_match}})
}

fn map_http_error(e: reqwest::Error) -> DriverError {
    if e.is_timeout() {
        DriverError::Http(format!("timeout: {}", e))
    } else {
        DriverError::Http(e.to_string())
    }
}

/// Extract `Network.requestWillBeSent` entries from Chrome performance log
/// messages.
pub fn parse_performance_log(entries: &Value) -> Vec<CapturedRequest> {
    let Some(entries) = entries.as_array() else {
        return Vec::new();
    };

    entries
        .iter()
        .filter_map(|entry| {
            let raw = entry["message"].as_str()?;
            let parsed: Value = serde_json::from_str(raw).ok()?;
            let message = &parsed["message"];
            if message["method"] != "Network.requestWillBeSent" {
                return None;
            }
            let request = &message["params"]["request"];
            let url = request["url"].as_str()?.to_string();
            let headers = request["headers"]
                .as_object()
                .map(|h| {
                    h.iter()
                        .filter_map(|(k, v)| v.as_str().map(|v| (k.clone(), v.to_string())))
                        .collect::<HashMap<_, _>>()
                })
                .unwrap_or_default();
            Some(CapturedRequest { url, headers })
        })
        .collect()
}

#[async_trait]
impl PageDriver for WebDriverClient {
    async fn navigate(&mut self, url: &str) -> Result<(), DriverError> {
        self.command(Method::POST, "/url", Some(json!({"url": url})))
            .await?;
        Ok(())
    }

    async fn current_url(&mut self) -> Result<String, DriverError> {
        let value = self.command(Method::GET, "/url", None).await?;
        value
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| DriverError::Protocol("url is not a string".to_string()))
    }

    async fn wait_for_element(
        &mut self,
        selector: &str,
        timeout: Duration,
    ) -> Result<WaitOutcome, DriverError> {
        let deadline = Instant::now() + timeout;
        loop {
            if self.find_element(selector).await?.is_some() {
                return Ok(WaitOutcome::Found);
            }
            if Instant::now() >= deadline {
                return Ok(WaitOutcome::TimedOut);
            }
            tokio::time::sleep(ELEMENT_POLL).await;
        }
    }

    async fn execute_script(&mut self, script: &str, args: Vec<Value>) -> Result<Value, DriverError> {
        self.command(
            Method::POST,
            "/execute/sync",
            Some(json!({"script": script, "args": args})),
        )
        .await
    }

    async fn send_keys(&mut self, selector: &str, text: &str) -> Result<(), DriverError> {
        let element = self
            .find_element(selector)
            .await?
            .ok_or_else(|| DriverError::NoSuchElement(selector.to_string()))?;
        self.command(
            Method::POST,
            &format!("/element/{}/value", element),
            Some(json!({"text": text})),
        )
        .await?;
        Ok(())
    }

    async fn cookies(&mut self) -> Result<Vec<BrowserCookie>, DriverError> {
        let value = self.command(Method::GET, "/cookie", None).await?;
        serde_json::from_value(value).map_err(|e| DriverError::Protocol(e.to_string()))
    }

    async fn captured_requests(&mut self) -> Result<Vec<CapturedRequest>, DriverError> {
        // The log endpoint drains, so keep everything seen so far.
        let entries = self
            .command(Method::POST, "/se/log", Some(json!({"type": "performance"})))
            .await?;
        let fresh = parse_performance_log(&entries);
        debug!(count = fresh.len(), "Drained browser network log");
        self.captured.extend(fresh);
        Ok(self.captured.clone())
    }

    async fn quit(&mut self) -> Result<(), DriverError> {
        if self.closed {
            return Ok(());
        }
        let url = format!("{}/session/{}", self.base_url, self.session_id);
        self.client
            .delete(&url)
            .send()
            .await
            .map_err(map_http_error)?;
        self.closed = true;
        info!(session = %self.session_id, "Browser session closed");
        Ok(())
    }
}

impl Drop for WebDriverClient {
    fn drop(&mut self) {
        if !self.closed {
            warn!(session = %self.session_id, "Browser session dropped without quit");
        }
    }
}

/// Launches a fresh [`WebDriverClient`] per call.
#[derive(Debug, Clone)]
pub struct WebDriverFactory {
    config: DriverConfig,
}

impl WebDriverFactory {
    pub fn new(config: DriverConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl DriverFactory for WebDriverFactory {
    async fn launch(&self) -> Result<Box<dyn PageDriver>, DriverError> {
        let client = WebDriverClient::launch(&self.config).await?;
        Ok(Box::new(client))
    }
}

use serde::{Deserialize, Serialize};

/// WebDriver endpoint and browser launch options.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DriverConfig {
    /// chromedriver / geckodriver base URL.
    #[serde(default = "default_webdriver_url")]
    pub webdriver_url: String,
    /// "chrome" or "firefox".
    #[serde(default = "default_browser")]
    pub browser: String,
    #[serde(default = "default_args")]
    pub args: Vec<String>,
    /// Timeout for WebDriver HTTP commands.
    #[serde(default = "default_timeout_ms")]
    pub default_timeout_ms: u64,
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            webdriver_url: default_webdriver_url(),
            browser: default_browser(),
            args: default_args(),
            default_timeout_ms: default_timeout_ms(),
        }
    }
}

fn default_webdriver_url() -> String {
    "http://127.0.0.1:9515".to_string()
}

fn default_browser() -> String {
    "chrome".to_string()
}

fn default_args() -> Vec<String> {
    vec!["--headless=new".to_string(), "--no-sandbox".to_string()]
}

fn default_timeout_ms() -> u64 {
    30_000
}

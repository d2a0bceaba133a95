use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use tracing::{info, warn};

use super::AuthError;
use crate::driver::{PageDriver, ENTER_KEY};
use crate::metrics;

/// Username and password for a site login.
#[derive(Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// A login form driven through the browser.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PasswordLoginConfig {
    pub login_url: String,
    pub username_selector: String,
    pub password_selector: String,
    /// Clicked to submit; when absent the password field receives Enter.
    #[serde(default)]
    pub submit_selector: Option<String>,
    /// Present in the URL once logged in. When absent, leaving the login
    /// page counts as success.
    #[serde(default)]
    pub success_url_fragment: Option<String>,
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
}

fn default_timeout_ms() -> u64 {
    15_000
}

const CLICK_SCRIPT: &str = "document.querySelector(arguments[0]).click();";
const POLL_INTERVAL: Duration = Duration::from_millis(300);

pub struct PasswordAuthenticator {
    config: PasswordLoginConfig,
}

impl PasswordAuthenticator {
    pub fn new(config: PasswordLoginConfig) -> Self {
        Self { config }
    }

    /// Log in through the configured form. Never fails; problems are logged
    /// and reported as `false`.
    pub async fn authenticate(&self, driver: &mut dyn PageDriver, credentials: &Credentials) -> bool {
        let result = match self.try_authenticate(driver, credentials).await {
            Ok(ok) => ok,
            Err(e) => {
                warn!(url = %self.config.login_url, error = %e, "Password login failed");
                false
            }
        };

        metrics::AUTH_ATTEMPTS
            .with_label_values(&["password", if result { "success" } else { "failure" }])
            .inc();
        result
    }

    async fn try_authenticate(
        &self,
        driver: &mut dyn PageDriver,
        credentials: &Credentials,
    ) -> Result<bool, AuthError> {
        let timeout = Duration::from_millis(self.config.timeout_ms);
        driver.navigate(&self.config.login_url).await?;

        for selector in [&self.config.username_selector, &self.config.password_selector] {
            if !driver.wait_for_element(selector, timeout).await?.is_found() {
                warn!(selector = %selector, "Login form field never appeared");
                return Ok(false);
            }
        }

        driver
            .send_keys(&self.config.username_selector, &credentials.username)
            .await?;
        driver
            .send_keys(&self.config.password_selector, &credentials.password)
            .await?;

        match &self.config.submit_selector {
            Some(submit) => {
                if !driver.wait_for_element(submit, timeout).await?.is_found() {
                    return Ok(false);
                }
                driver
                    .execute_script(CLICK_SCRIPT, vec![serde_json::Value::from(submit.as_str())])
                    .await?;
            }
            None => {
                driver
                    .send_keys(&self.config.password_selector, ENTER_KEY)
                    .await?;
            }
        }

        let logged_in = match &self.config.success_url_fragment {
            Some(fragment) => driver
                .wait_for_url_containing(fragment, timeout, POLL_INTERVAL)
                .await?
                .is_found(),
            None => self.left_login_page(driver, timeout).await?,
        };

        if logged_in {
            info!(username = %credentials.username, "Password login succeeded");
        }
        Ok(logged_in)
    }

    async fn left_login_page(
        &self,
        driver: &mut dyn PageDriver,
        timeout: Duration,
    ) -> Result<bool, AuthError> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            if driver.current_url().await? != self.config.login_url {
                return Ok(true);
            }
            if tokio::time::Instant::now() >= deadline {
                return Ok(false);
            }
            tokio::time::sleep(POLL_INTERVAL).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MockPageDriver;

    fn config() -> PasswordLoginConfig {
        PasswordLoginConfig {
            login_url: "https://portal.example.test/login".to_string(),
            username_selector: "#username".to_string(),
            password_selector: "#authKey".to_string(),
            submit_selector: None,
            success_url_fragment: Some("/home".to_string()),
            timeout_ms: 200,
        }
    }

    fn credentials() -> Credentials {
        Credentials {
            username: "operator".to_string(),
            password: "hunter2".to_string(),
        }
    }

    #[test]
    fn test_debug_redacts_password() {
        let printed = format!("{:?}", credentials());
        assert!(printed.contains("operator"));
        assert!(!printed.contains("hunter2"));
    }

    #[tokio::test]
    async fn test_login_submits_with_enter() {
        let driver = MockPageDriver::new();
        driver.add_element("#username").await;
        driver.add_element("#authKey").await;
        driver
            .redirect_on_enter("#authKey", "https://portal.example.test/home")
            .await;

        let auth = PasswordAuthenticator::new(config());
        let mut boxed: Box<dyn PageDriver> = Box::new(driver.clone());
        assert!(auth.authenticate(boxed.as_mut(), &credentials()).await);

        let keys = driver.sent_keys().await;
        assert_eq!(keys[0], ("#username".to_string(), "operator".to_string()));
        assert_eq!(keys[1], ("#authKey".to_string(), "hunter2".to_string()));
        assert_eq!(keys[2], ("#authKey".to_string(), ENTER_KEY.to_string()));
    }

    #[tokio::test]
    async fn test_missing_form_fails() {
        let driver = MockPageDriver::new();
        let auth = PasswordAuthenticator::new(config());
        let mut boxed: Box<dyn PageDriver> = Box::new(driver.clone());

        assert!(!auth.authenticate(boxed.as_mut(), &credentials()).await);
        assert!(driver.sent_keys().await.is_empty());
    }

    #[tokio::test]
    async fn test_staying_on_login_page_fails() {
        let driver = MockPageDriver::new();
        driver.add_element("#username").await;
        driver.add_element("#authKey").await;

        let mut cfg = config();
        cfg.success_url_fragment = None;
        let auth = PasswordAuthenticator::new(cfg);
        let mut boxed: Box<dyn PageDriver> = Box::new(driver);

        assert!(!auth.authenticate(boxed.as_mut(), &credentials()).await);
    }
}

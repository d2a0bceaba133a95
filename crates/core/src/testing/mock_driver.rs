//! Mock browser session for testing.

use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;

use crate::driver::{
    BrowserCookie, CapturedRequest, DriverError, DriverFactory, PageDriver, WaitOutcome, ENTER_KEY,
};

#[derive(Debug, Default)]
struct DriverState {
    current_url: String,
    elements: HashSet<String>,
    /// (fragment of requested URL, URL actually landed on)
    navigate_redirects: Vec<(String, String)>,
    /// (selector, URL after Enter is typed into it)
    enter_redirects: Vec<(String, String)>,
    navigations: Vec<String>,
    scripts: Vec<(String, Vec<Value>)>,
    sent_keys: Vec<(String, String)>,
    cookies: Vec<BrowserCookie>,
    requests: Vec<CapturedRequest>,
    navigation_error: Option<String>,
    quit_count: usize,
}

/// Scriptable [`PageDriver`].
///
/// Clones share state, so a test can keep one handle for assertions while
/// the code under test owns a boxed clone. Waits never sleep: an element is
/// either registered with [`add_element`](Self::add_element) or the wait
/// times out immediately.
///
/// # Example
///
/// ```rust,ignore
/// use docket_core::testing::MockPageDriver;
///
/// let driver = MockPageDriver::new();
/// driver.add_element("#username").await;
/// driver.redirect_on_enter("#password", "https://portal/home").await;
///
/// let mut boxed: Box<dyn PageDriver> = Box::new(driver.clone());
/// // ... run a login against `boxed` ...
/// assert_eq!(driver.sent_keys().await.len(), 3);
/// ```
#[derive(Debug, Clone)]
pub struct MockPageDriver {
    state: Arc<RwLock<DriverState>>,
}

impl MockPageDriver {
    pub fn new() -> Self {
        Self {
            state: Arc::new(RwLock::new(DriverState {
                current_url: "about:blank".to_string(),
                ..Default::default()
            })),
        }
    }

    pub async fn add_element(&self, selector: &str) {
        self.state.write().await.elements.insert(selector.to_string());
    }

    pub async fn remove_element(&self, selector: &str) {
        self.state.write().await.elements.remove(selector);
    }

    pub async fn set_current_url(&self, url: &str) {
        self.state.write().await.current_url = url.to_string();
    }

    /// Navigating to a URL containing `fragment` lands on `target`.
    pub async fn redirect_on_navigate(&self, fragment: &str, target: &str) {
        self.state
            .write()
            .await
            .navigate_redirects
            .push((fragment.to_string(), target.to_string()));
    }

    /// Typing Enter into `selector` moves the page to `target`.
    pub async fn redirect_on_enter(&self, selector: &str, target: &str) {
        self.state
            .write()
            .await
            .enter_redirects
            .push((selector.to_string(), target.to_string()));
    }

    pub async fn set_cookies(&self, cookies: Vec<BrowserCookie>) {
        self.state.write().await.cookies = cookies;
    }

    pub async fn set_captured_requests(&self, requests: Vec<CapturedRequest>) {
        self.state.write().await.requests = requests;
    }

    /// Every navigation fails with `message` until cleared with `None`.
    pub async fn fail_navigation(&self, message: Option<&str>) {
        self.state.write().await.navigation_error = message.map(str::to_string);
    }

    pub async fn navigations(&self) -> Vec<String> {
        self.state.read().await.navigations.clone()
    }

    pub async fn scripts(&self) -> Vec<(String, Vec<Value>)> {
        self.state.read().await.scripts.clone()
    }

    pub async fn sent_keys(&self) -> Vec<(String, String)> {
        self.state.read().await.sent_keys.clone()
    }

    pub async fn quit_count(&self) -> usize {
        self.state.read().await.quit_count
    }
}

impl Default for MockPageDriver {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PageDriver for MockPageDriver {
    async fn navigate(&mut self, url: &str) -> Result<(), DriverError> {
        let mut state = self.state.write().await;
        if let Some(message) = &state.navigation_error {
            return Err(DriverError::Http(message.clone()));
        }
        state.navigations.push(url.to_string());
        let landed = state
            .navigate_redirects
            .iter()
            .find(|(fragment, _)| url.contains(fragment.as_str()))
            .map(|(_, target)| target.clone())
            .unwrap_or_else(|| url.to_string());
        state.current_url = landed;
        Ok(())
    }

    async fn current_url(&mut self) -> Result<String, DriverError> {
        Ok(self.state.read().await.current_url.clone())
    }

    async fn wait_for_element(
        &mut self,
        selector: &str,
        _timeout: Duration,
    ) -> Result<WaitOutcome, DriverError> {
        if self.state.read().await.elements.contains(selector) {
            Ok(WaitOutcome::Found)
        } else {
            Ok(WaitOutcome::TimedOut)
        }
    }

    async fn execute_script(&mut self, script: &str, args: Vec<Value>) -> Result<Value, DriverError> {
        self.state
            .write()
            .await
            .scripts
            .push((script.to_string(), args));
        Ok(Value::Null)
    }

    async fn send_keys(&mut self, selector: &str, text: &str) -> Result<(), DriverError> {
        let mut state = self.state.write().await;
        if !state.elements.contains(selector) {
            return Err(DriverError::NoSuchElement(selector.to_string()));
        }
        state
            .sent_keys
            .push((selector.to_string(), text.to_string()));
        if text.contains(ENTER_KEY) {
            let target = state
                .enter_redirects
                .iter()
                .find(|(s, _)| s == selector)
                .map(|(_, target)| target.clone());
            if let Some(target) = target {
                state.current_url = target;
            }
        }
        Ok(())
    }

    async fn cookies(&mut self) -> Result<Vec<BrowserCookie>, DriverError> {
        Ok(self.state.read().await.cookies.clone())
    }

    async fn captured_requests(&mut self) -> Result<Vec<CapturedRequest>, DriverError> {
        Ok(self.state.read().await.requests.clone())
    }

    async fn quit(&mut self) -> Result<(), DriverError> {
        self.state.write().await.quit_count += 1;
        Ok(())
    }
}

/// Hands out clones of one [`MockPageDriver`].
#[derive(Debug, Clone)]
pub struct MockDriverFactory {
    driver: MockPageDriver,
    launches: Arc<AtomicUsize>,
    fail: Arc<RwLock<bool>>,
}

impl MockDriverFactory {
    pub fn new(driver: MockPageDriver) -> Self {
        Self {
            driver,
            launches: Arc::new(AtomicUsize::new(0)),
            fail: Arc::new(RwLock::new(false)),
        }
    }

    pub fn driver(&self) -> &MockPageDriver {
        &self.driver
    }

    pub async fn set_fail(&self, fail: bool) {
        *self.fail.write().await = fail;
    }

    pub fn launch_count(&self) -> usize {
        self.launches.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl DriverFactory for MockDriverFactory {
    async fn launch(&self) -> Result<Box<dyn PageDriver>, DriverError> {
        if *self.fail.read().await {
            return Err(DriverError::Session("mock launch failure".to_string()));
        }
        self.launches.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(self.driver.clone()))
    }
}

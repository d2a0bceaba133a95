use reqwest::header::{HeaderMap, HeaderName, HeaderValue, COOKIE};
use reqwest::Client;
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::debug;

use super::AuthError;

/// Headers the HTTP client sets itself.
const SKIPPED_HEADERS: &[&str] = &["content-length", "host", "cookie", "connection"];

/// Transport credentials harvested from an authenticated browser session.
///
/// Read-only once harvested; reused for direct HTTP calls against the same
/// backend.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionCredentials {
    headers: BTreeMap<String, String>,
    cookies: BTreeMap<String, String>,
}

impl SessionCredentials {
    pub fn new(
        headers: impl IntoIterator<Item = (String, String)>,
        cookies: impl IntoIterator<Item = (String, String)>,
    ) -> Self {
        Self {
            headers: headers.into_iter().collect(),
            cookies: cookies.into_iter().collect(),
        }
    }

    pub fn headers(&self) -> &BTreeMap<String, String> {
        &self.headers
    }

    pub fn cookies(&self) -> &BTreeMap<String, String> {
        &self.cookies
    }

    /// `name=value; name=value`
    pub fn cookie_header(&self) -> String {
        self.cookies
            .iter()
            .map(|(k, v)| format!("{}={}", k, v))
            .collect::<Vec<_>>()
            .join("; ")
    }

    /// HTTP client sending these headers and cookies on every request.
    pub fn to_http_client(&self, timeout: Duration) -> Result<Client, AuthError> {
        let mut map = HeaderMap::new();
        for (name, value) in &self.headers {
            if SKIPPED_HEADERS.contains(&name.to_ascii_lowercase().as_str()) {
                continue;
            }
            match (
                HeaderName::from_bytes(name.as_bytes()),
                HeaderValue::from_str(value),
            ) {
                (Ok(name), Ok(value)) => {
                    map.insert(name, value);
                }
                _ => debug!(header = %name, "Skipping header that is not valid HTTP"),
            }
        }
        if !self.cookies.is_empty() {
            let cookie = HeaderValue::from_str(&self.cookie_header())
                .map_err(|e| AuthError::InvalidSession(e.to_string()))?;
            map.insert(COOKIE, cookie);
        }

        Client::builder()
            .default_headers(map)
            .timeout(timeout)
            .build()
            .map_err(|e| AuthError::InvalidSession(e.to_string()))
    }
}

//! Certificate challenge-response login for the regional court SSO.
//!
//! A random challenge is signed with the keystore's private key and posted,
//! together with the certificate chain, to the SSO challenge endpoint. The
//! browser form is then filled with the challenge and its correlation id,
//! submitted, and the second factor typed in. Transitions are explicit in
//! [`AuthState`].

mod config;
mod keystore;
mod otp;
mod pki_path;

pub use config::*;
pub use keystore::*;
pub use otp::*;
pub use pki_path::*;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::{AuthError, SessionCredentials};
use crate::driver::{PageDriver, ENTER_KEY};
use crate::metrics;

const SET_FIELD_SCRIPT: &str = "document.getElementById(arguments[0]).value = arguments[1];";
const SUBMIT_FORM_SCRIPT: &str = "document.forms[0].submit();";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthState {
    Idle,
    KeystoreLoaded,
    ChallengeSigned,
    ChallengeSubmitted,
    FactorVerified,
    SessionEstablished,
    Failed,
}

impl fmt::Display for AuthState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            AuthState::Idle => "idle",
            AuthState::KeystoreLoaded => "keystore_loaded",
            AuthState::ChallengeSigned => "challenge_signed",
            AuthState::ChallengeSubmitted => "challenge_submitted",
            AuthState::FactorVerified => "factor_verified",
            AuthState::SessionEstablished => "session_established",
            AuthState::Failed => "failed",
        };
        write!(f, "{}", s)
    }
}

/// A signed challenge ready to post.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthContext {
    pub challenge: String,
    /// Sent as the SSO `uuid` and typed into the correlation field.
    pub correlation_id: String,
    /// Base64 signature over the challenge.
    pub signature: String,
    /// Base64 PkiPath.
    pub cert_chain: String,
}

#[derive(Serialize)]
struct ChallengePayload<'a> {
    uuid: &'a str,
    mensagem: &'a str,
    assinatura: &'a str,
    #[serde(rename = "certChain")]
    cert_chain: &'a str,
}

pub struct ChallengeResponseAuthenticator {
    config: ChallengeResponseConfig,
    keystore: Arc<Keystore>,
    otp: OtpGenerator,
    http: reqwest::Client,
    state: AuthState,
}

impl ChallengeResponseAuthenticator {
    pub fn new(
        config: ChallengeResponseConfig,
        keystore: Arc<Keystore>,
        otp: OtpGenerator,
    ) -> Result<Self, AuthError> {
        let http = Self::http_client(&config)?;
        Ok(Self::with_client(config, keystore, otp, http))
    }

    /// Client for challenge submission, bounded by the configured timeout.
    /// Clones share one connection pool.
    pub fn http_client(config: &ChallengeResponseConfig) -> Result<reqwest::Client, AuthError> {
        reqwest::Client::builder()
            .timeout(config.challenge_timeout())
            .build()
            .map_err(|e| AuthError::ConfigurationError(format!("challenge HTTP client: {}", e)))
    }

    pub fn with_client(
        config: ChallengeResponseConfig,
        keystore: Arc<Keystore>,
        otp: OtpGenerator,
        http: reqwest::Client,
    ) -> Self {
        Self {
            config,
            keystore,
            otp,
            http,
            state: AuthState::KeystoreLoaded,
        }
    }

    pub fn state(&self) -> AuthState {
        self.state
    }

    pub fn config(&self) -> &ChallengeResponseConfig {
        &self.config
    }

    fn transition(&mut self, next: AuthState) {
        debug!(from = %self.state, to = %next, "Authentication state change");
        self.state = next;
    }

    /// Generate and sign a fresh challenge.
    pub fn prepare_challenge(&mut self) -> Result<AuthContext, AuthError> {
        let challenge = random_challenge();
        let signature = self
            .keystore
            .sign(challenge.as_bytes(), self.config.signature_digest)?;
        let context = AuthContext {
            correlation_id: Uuid::new_v4().to_string(),
            signature: STANDARD.encode(signature),
            cert_chain: pki_path_base64(&self.keystore)?,
            challenge,
        };
        self.transition(AuthState::ChallengeSigned);
        Ok(context)
    }

    /// Post the signed challenge. The service answers 204 when it accepts.
    pub async fn submit_challenge(&mut self, context: &AuthContext) -> Result<(), AuthError> {
        let payload = ChallengePayload {
            uuid: &context.correlation_id,
            mensagem: &context.challenge,
            assinatura: &context.signature,
            cert_chain: &context.cert_chain,
        };

        let response = self
            .http
            .post(&self.config.challenge_endpoint)
            .json(&payload)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    AuthError::Challenge("challenge endpoint timed out".to_string())
                } else if e.is_connect() {
                    AuthError::Challenge(format!("cannot reach challenge endpoint: {}", e))
                } else {
                    AuthError::Challenge(e.to_string())
                }
            })?;

        if response.status() != reqwest::StatusCode::NO_CONTENT {
            return Err(AuthError::Challenge(format!(
                "challenge rejected with status {}",
                response.status()
            )));
        }

        self.transition(AuthState::ChallengeSubmitted);
        Ok(())
    }

    /// Log the driver into `region`. Never fails; problems are logged and
    /// reported as `false`.
    pub async fn authenticate(&mut self, driver: &mut dyn PageDriver, region: &str) -> bool {
        self.transition(AuthState::KeystoreLoaded);
        let result = match self.run_flow(driver, region).await {
            Ok(true) => {
                self.transition(AuthState::SessionEstablished);
                info!(region = %region, "Certificate login succeeded");
                true
            }
            Ok(false) => {
                self.transition(AuthState::Failed);
                warn!(region = %region, "Certificate login did not complete");
                false
            }
            Err(e) => {
                self.transition(AuthState::Failed);
                warn!(region = %region, error = %e, "Certificate login failed");
                false
            }
        };

        metrics::AUTH_ATTEMPTS
            .with_label_values(&["certificate", if result { "success" } else { "failure" }])
            .inc();
        result
    }

    async fn run_flow(&mut self, driver: &mut dyn PageDriver, region: &str) -> Result<bool, AuthError> {
        driver.navigate(&self.config.login_url(region)).await?;
        let landed = driver.current_url().await?;
        if !landed.contains(&self.config.sso_host) {
            debug!(url = %landed, "No SSO redirect, session already active");
            return Ok(true);
        }

        if !driver
            .wait_for_element(&self.config.login_form_selector, self.config.form_timeout())
            .await?
            .is_found()
        {
            warn!(selector = %self.config.login_form_selector, "SSO login form never appeared");
            return Ok(false);
        }

        let context = self.prepare_challenge()?;
        self.submit_challenge(&context).await?;

        for (field, value) in [
            (&self.config.challenge_field_id, &context.challenge),
            (&self.config.correlation_field_id, &context.correlation_id),
        ] {
            driver
                .execute_script(
                    SET_FIELD_SCRIPT,
                    vec![Value::from(field.as_str()), Value::from(value.as_str())],
                )
                .await?;
        }
        driver.execute_script(SUBMIT_FORM_SCRIPT, Vec::new()).await?;

        if !driver
            .wait_for_element(&self.config.otp_selector, self.config.otp_timeout())
            .await?
            .is_found()
        {
            warn!("Second factor prompt never appeared");
            return Ok(false);
        }
        let code = self.otp.current_code()?;
        driver
            .send_keys(&self.config.otp_selector, &format!("{}{}", code, ENTER_KEY))
            .await?;
        self.transition(AuthState::FactorVerified);

        Ok(driver
            .wait_for_url_containing(
                &self.config.authenticated_url_fragment,
                self.config.post_login_timeout(),
                self.config.poll_interval(),
            )
            .await?
            .is_found())
    }

    /// Headers of the latest captured request to the regional API plus the
    /// browser's cookies.
    pub async fn harvest(
        &self,
        driver: &mut dyn PageDriver,
        region: &str,
    ) -> Result<SessionCredentials, AuthError> {
        let api_base = self.config.api_base(region);
        let request = driver
            .captured_requests()
            .await?
            .into_iter()
            .filter(|r| r.url.contains(&api_base))
            .last()
            .ok_or_else(|| AuthError::NoCapturedRequest(api_base.clone()))?;

        let cookies: HashMap<String, String> = driver
            .cookies()
            .await?
            .into_iter()
            .map(|c| (c.name, c.value))
            .collect();

        debug!(
            region = %region,
            headers = request.headers.len(),
            cookies = cookies.len(),
            "Harvested session credentials"
        );
        Ok(SessionCredentials::new(request.headers, cookies))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::{BrowserCookie, CapturedRequest};
    use crate::testing::fixtures::self_signed_keystore;
    use crate::testing::MockPageDriver;
    use axum::{extract::State, http::StatusCode, routing::post, Json, Router};
    use std::sync::Mutex;
    use tokio::net::TcpListener;

    const OTP_URI: &str =
        "otpauth://totp/Docket:office?secret=GEZDGNBVGY3TQOJQGEZDGNBVGY3TQOJQ&issuer=Docket";

    type Received = Arc<Mutex<Vec<serde_json::Value>>>;

    async fn stub_sso(status: StatusCode) -> (String, Received) {
        let received: Received = Arc::new(Mutex::new(Vec::new()));
        let app = Router::new()
            .route(
                "/challenge",
                post(
                    move |State(received): State<Received>, Json(body): Json<serde_json::Value>| async move {
                        received.lock().unwrap().push(body);
                        status
                    },
                ),
            )
            .with_state(received.clone());
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move { axum::serve(listener, app).await.unwrap() });
        (format!("http://{}/challenge", addr), received)
    }

    fn authenticator(endpoint: &str) -> ChallengeResponseAuthenticator {
        let config: ChallengeResponseConfig = toml::from_str(&format!(
            r#"
challenge_endpoint = "{}"
sso_login_url = "https://court{{region}}.example.test/login"
sso_host = "https://sso.example.test/"
api_base_url = "https://court{{region}}.example.test/api/"
keystore_object = "certs/office.pfx"
keystore_passphrase = "pfx-pass"
otp_uri = "{}"
signature_digest = "sha256"
form_timeout_ms = 100
otp_timeout_ms = 100
post_login_timeout_ms = 100
poll_interval_ms = 10
"#,
            endpoint, OTP_URI
        ))
        .unwrap();
        let keystore =
            Keystore::from_pkcs12(&self_signed_keystore("pfx-pass"), "pfx-pass").unwrap();
        ChallengeResponseAuthenticator::new(
            config,
            Arc::new(keystore),
            OtpGenerator::from_uri(OTP_URI).unwrap(),
        )
        .unwrap()
    }

    async fn sso_driver() -> MockPageDriver {
        let driver = MockPageDriver::new();
        driver
            .redirect_on_navigate("court5.example.test/login", "https://sso.example.test/auth?x=1")
            .await;
        driver.add_element("form#kc-form-login").await;
        driver.add_element(r#"input[id="otp"]"#).await;
        driver
            .redirect_on_enter(r#"input[id="otp"]"#, "https://court5.example.test/pjekz/painel")
            .await;
        driver
    }

    #[tokio::test]
    async fn test_full_flow_establishes_session() {
        let (endpoint, received) = stub_sso(StatusCode::NO_CONTENT).await;
        let mut auth = authenticator(&endpoint);
        let driver = sso_driver().await;
        let mut boxed: Box<dyn PageDriver> = Box::new(driver.clone());

        assert!(auth.authenticate(boxed.as_mut(), "5").await);
        assert_eq!(auth.state(), AuthState::SessionEstablished);

        let bodies = received.lock().unwrap().clone();
        assert_eq!(bodies.len(), 1);
        let body = &bodies[0];
        let challenge = body["mensagem"].as_str().unwrap();
        assert!(challenge.starts_with("0."));
        assert!(body["certChain"].as_str().is_some());
        let signature = STANDARD.decode(body["assinatura"].as_str().unwrap()).unwrap();
        assert!(auth
            .keystore
            .verify(challenge.as_bytes(), &signature, SignatureDigest::Sha256)
            .unwrap());

        // Challenge and correlation id were written into the form.
        let scripts = driver.scripts().await;
        assert_eq!(scripts[0].1[0], "desafio");
        assert_eq!(scripts[0].1[1], body["mensagem"]);
        assert_eq!(scripts[1].1[0], "codigoPje");
        assert_eq!(scripts[1].1[1], body["uuid"]);
        assert_eq!(scripts[2].0, SUBMIT_FORM_SCRIPT);

        let keys = driver.sent_keys().await;
        assert_eq!(keys.len(), 1);
        assert!(keys[0].1.ends_with(ENTER_KEY));
        assert_eq!(keys[0].1.chars().count(), 7);
    }

    #[tokio::test]
    async fn test_new_starts_with_keystore_loaded() {
        let auth = authenticator("http://127.0.0.1:9/challenge");
        assert_eq!(auth.state(), AuthState::KeystoreLoaded);
        assert!(ChallengeResponseAuthenticator::http_client(auth.config()).is_ok());
    }

    #[tokio::test]
    async fn test_shared_client_authenticators_are_independent() {
        let (endpoint, received) = stub_sso(StatusCode::NO_CONTENT).await;
        let template = authenticator(&endpoint);
        let http = ChallengeResponseAuthenticator::http_client(template.config()).unwrap();
        let mut first = ChallengeResponseAuthenticator::with_client(
            template.config().clone(),
            Arc::clone(&template.keystore),
            OtpGenerator::from_uri(OTP_URI).unwrap(),
            http.clone(),
        );
        let mut second = ChallengeResponseAuthenticator::with_client(
            template.config().clone(),
            Arc::clone(&template.keystore),
            OtpGenerator::from_uri(OTP_URI).unwrap(),
            http,
        );

        for auth in [&mut first, &mut second] {
            let mut boxed: Box<dyn PageDriver> = Box::new(sso_driver().await);
            assert!(auth.authenticate(boxed.as_mut(), "5").await);
            assert_eq!(auth.state(), AuthState::SessionEstablished);
        }
        assert_eq!(received.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_rejected_challenge_fails() {
        let (endpoint, _) = stub_sso(StatusCode::UNAUTHORIZED).await;
        let mut auth = authenticator(&endpoint);
        let driver = sso_driver().await;
        let mut boxed: Box<dyn PageDriver> = Box::new(driver.clone());

        assert!(!auth.authenticate(boxed.as_mut(), "5").await);
        assert_eq!(auth.state(), AuthState::Failed);
        assert!(driver.sent_keys().await.is_empty());
    }

    #[tokio::test]
    async fn test_no_sso_redirect_means_already_logged_in() {
        let (endpoint, received) = stub_sso(StatusCode::NO_CONTENT).await;
        let mut auth = authenticator(&endpoint);
        let mut boxed: Box<dyn PageDriver> = Box::new(MockPageDriver::new());

        assert!(auth.authenticate(boxed.as_mut(), "5").await);
        assert!(received.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_missing_otp_prompt_fails() {
        let (endpoint, _) = stub_sso(StatusCode::NO_CONTENT).await;
        let mut auth = authenticator(&endpoint);
        let driver = MockPageDriver::new();
        driver
            .redirect_on_navigate("court5.example.test/login", "https://sso.example.test/auth")
            .await;
        driver.add_element("form#kc-form-login").await;
        let mut boxed: Box<dyn PageDriver> = Box::new(driver);

        assert!(!auth.authenticate(boxed.as_mut(), "5").await);
        assert_eq!(auth.state(), AuthState::Failed);
    }

    #[tokio::test]
    async fn test_harvest_uses_latest_api_request() {
        let auth = authenticator("http://127.0.0.1:9/challenge");
        let driver = MockPageDriver::new();
        let request = |url: &str, token: &str| CapturedRequest {
            url: url.to_string(),
            headers: HashMap::from([("X-XSRF-TOKEN".to_string(), token.to_string())]),
        };
        driver
            .set_captured_requests(vec![
                request("https://court5.example.test/api/processos/1", "old"),
                request("https://court5.example.test/api/processos/2", "new"),
                request("https://cdn.example.test/app.js", "other"),
            ])
            .await;
        driver
            .set_cookies(vec![BrowserCookie {
                name: "access_token".to_string(),
                value: "abc".to_string(),
                domain: None,
            }])
            .await;
        let mut boxed: Box<dyn PageDriver> = Box::new(driver);

        let creds = auth.harvest(boxed.as_mut(), "5").await.unwrap();
        assert_eq!(creds.headers()["X-XSRF-TOKEN"], "new");
        assert_eq!(creds.cookies()["access_token"], "abc");

        let err = auth.harvest(boxed.as_mut(), "7").await.unwrap_err();
        assert!(matches!(err, AuthError::NoCapturedRequest(_)));
    }
}

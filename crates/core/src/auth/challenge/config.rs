use openssl::hash::MessageDigest;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Digest used for the challenge signature (RSA PKCS#1 v1.5).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SignatureDigest {
    /// What the regional SSO service verifies against.
    #[default]
    Md5,
    Sha1,
    Sha256,
}

impl SignatureDigest {
    pub fn message_digest(&self) -> MessageDigest {
        match self {
            SignatureDigest::Md5 => MessageDigest::md5(),
            SignatureDigest::Sha1 => MessageDigest::sha1(),
            SignatureDigest::Sha256 => MessageDigest::sha256(),
        }
    }
}

impl fmt::Display for SignatureDigest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SignatureDigest::Md5 => "md5",
            SignatureDigest::Sha1 => "sha1",
            SignatureDigest::Sha256 => "sha256",
        };
        write!(f, "{}", s)
    }
}

/// Certificate login settings. URL templates may contain `{region}`.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ChallengeResponseConfig {
    #[serde(default = "default_sso_login_url")]
    pub sso_login_url: String,
    /// When the login URL does not land here the session is already live.
    #[serde(default = "default_sso_host")]
    pub sso_host: String,
    /// Where signed challenges are posted.
    pub challenge_endpoint: String,
    #[serde(default = "default_login_form_selector")]
    pub login_form_selector: String,
    #[serde(default = "default_challenge_field_id")]
    pub challenge_field_id: String,
    #[serde(default = "default_correlation_field_id")]
    pub correlation_field_id: String,
    #[serde(default = "default_otp_selector")]
    pub otp_selector: String,
    #[serde(default = "default_authenticated_url_fragment")]
    pub authenticated_url_fragment: String,
    /// Backend whose captured requests carry the session headers.
    #[serde(default = "default_api_base_url")]
    pub api_base_url: String,
    /// PKCS#12 keystore, fetched from the job's storage bucket.
    pub keystore_object: String,
    pub keystore_passphrase: String,
    /// `otpauth://totp/...`
    pub otp_uri: String,
    #[serde(default)]
    pub signature_digest: SignatureDigest,
    #[serde(default = "default_form_timeout_ms")]
    pub form_timeout_ms: u64,
    #[serde(default = "default_otp_timeout_ms")]
    pub otp_timeout_ms: u64,
    #[serde(default = "default_post_login_timeout_ms")]
    pub post_login_timeout_ms: u64,
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    #[serde(default = "default_challenge_timeout_secs")]
    pub challenge_timeout_secs: u64,
}

impl ChallengeResponseConfig {
    pub fn login_url(&self, region: &str) -> String {
        with_region(&self.sso_login_url, region)
    }

    pub fn api_base(&self, region: &str) -> String {
        with_region(&self.api_base_url, region)
    }

    pub fn form_timeout(&self) -> Duration {
        Duration::from_millis(self.form_timeout_ms)
    }

    pub fn otp_timeout(&self) -> Duration {
        Duration::from_millis(self.otp_timeout_ms)
    }

    pub fn post_login_timeout(&self) -> Duration {
        Duration::from_millis(self.post_login_timeout_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn challenge_timeout(&self) -> Duration {
        Duration::from_secs(self.challenge_timeout_secs)
    }
}

fn with_region(template: &str, region: &str) -> String {
    template.replace("{region}", region)
}

fn default_sso_login_url() -> String {
    "https://pje.trt{region}.jus.br/primeirograu/login.seam".to_string()
}

fn default_sso_host() -> String {
    "https://sso.cloud.pje.jus.br/".to_string()
}

fn default_login_form_selector() -> String {
    "form#kc-form-login".to_string()
}

fn default_challenge_field_id() -> String {
    "desafio".to_string()
}

fn default_correlation_field_id() -> String {
    "codigoPje".to_string()
}

fn default_otp_selector() -> String {
    r#"input[id="otp"]"#.to_string()
}

fn default_authenticated_url_fragment() -> String {
    "pjekz".to_string()
}

fn default_api_base_url() -> String {
    "https://pje.trt{region}.jus.br/pje-comum-api/".to_string()
}

fn default_form_timeout_ms() -> u64 {
    30_000
}

fn default_otp_timeout_ms() -> u64 {
    60_000
}

fn default_post_login_timeout_ms() -> u64 {
    10_000
}

fn default_poll_interval_ms() -> u64 {
    300
}

fn default_challenge_timeout_secs() -> u64 {
    30
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_region_templates() {
        let config: ChallengeResponseConfig = toml::from_str(
            r#"
challenge_endpoint = "https://sso.example.test/challenge"
keystore_object = "certs/office.pfx"
keystore_passphrase = "pass"
otp_uri = "otpauth://totp/x?secret=GEZDGNBVGY3TQOJQGEZDGNBVGY3TQOJQ"
"#,
        )
        .unwrap();

        assert_eq!(
            config.login_url("5"),
            "https://pje.trt5.jus.br/primeirograu/login.seam"
        );
        assert_eq!(config.api_base("15"), "https://pje.trt15.jus.br/pje-comum-api/");
        assert_eq!(config.signature_digest, SignatureDigest::Md5);
        assert_eq!(config.otp_timeout(), Duration::from_secs(60));
    }
}

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::net::IpAddr;

use crate::auth::{ChallengeResponseConfig, Credentials, PasswordLoginConfig};
use crate::driver::DriverConfig;
use crate::job::RuntimeConfig;
use crate::storage::StorageConfig;
use crate::telemetry::TelemetryConfig;

/// Root configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    pub storage: StorageConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub runtime: RuntimeConfig,
    #[serde(default)]
    pub telemetry: TelemetryConfig,
    #[serde(default)]
    pub driver: DriverConfig,
    /// Certificate login used by the regional court jobs.
    #[serde(default)]
    pub certificate: Option<ChallengeResponseConfig>,
    /// Named credential sets, referenced by dispatch requests.
    #[serde(default)]
    pub credentials: HashMap<String, Credentials>,
    /// Password login forms, keyed by system name.
    #[serde(default)]
    pub password_login: HashMap<String, PasswordLoginConfig>,
}

/// Server configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: IpAddr,
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

fn default_host() -> IpAddr {
    IpAddr::from([0, 0, 0, 0])
}

fn default_port() -> u16 {
    8080
}

/// Sanitized config for API responses (secrets redacted)
#[derive(Debug, Clone, Serialize)]
pub struct SanitizedConfig {
    pub server: ServerConfig,
    pub runtime: RuntimeConfig,
    pub storage: SanitizedStorageConfig,
    pub telemetry: TelemetryConfig,
    pub driver: DriverConfig,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub certificate: Option<SanitizedCertificateConfig>,
    /// Credential references only; usernames and passwords are never exposed.
    pub credentials: Vec<String>,
    pub password_login: Vec<String>,
}

/// Storage config without the signing secret
#[derive(Debug, Clone, Serialize)]
pub struct SanitizedStorageConfig {
    pub root: String,
    pub bucket: String,
    pub public_base_url: String,
    pub url_ttl_secs: u64,
    pub signing_secret_configured: bool,
}

/// Certificate config without passphrase or OTP seed
#[derive(Debug, Clone, Serialize)]
pub struct SanitizedCertificateConfig {
    pub challenge_endpoint: String,
    pub keystore_object: String,
    pub signature_digest: String,
    pub passphrase_configured: bool,
    pub otp_configured: bool,
}

impl From<&Config> for SanitizedConfig {
    fn from(config: &Config) -> Self {
        let mut credentials: Vec<String> = config.credentials.keys().cloned().collect();
        credentials.sort();
        let mut password_login: Vec<String> = config.password_login.keys().cloned().collect();
        password_login.sort();

        Self {
            server: config.server.clone(),
            runtime: config.runtime.clone(),
            storage: SanitizedStorageConfig {
                root: config.storage.root.display().to_string(),
                bucket: config.storage.bucket.clone(),
                public_base_url: config.storage.public_base_url.clone(),
                url_ttl_secs: config.storage.url_ttl_secs,
                signing_secret_configured: !config.storage.signing_secret.is_empty(),
            },
            telemetry: config.telemetry.clone(),
            driver: config.driver.clone(),
            certificate: config
                .certificate
                .as_ref()
                .map(|c| SanitizedCertificateConfig {
                    challenge_endpoint: c.challenge_endpoint.clone(),
                    keystore_object: c.keystore_object.clone(),
                    signature_digest: c.signature_digest.to_string(),
                    passphrase_configured: !c.keystore_passphrase.is_empty(),
                    otp_configured: !c.otp_uri.is_empty(),
                }),
            credentials,
            password_login,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL: &str = r#"
[storage]
root = "/srv/objects"
signing_secret = "s3cret"
"#;

    #[test]
    fn test_deserialize_minimal_config_uses_defaults() {
        let config: Config = toml::from_str(MINIMAL).unwrap();
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.server.host.to_string(), "0.0.0.0");
        assert_eq!(config.runtime.pool_size, 1);
        assert_eq!(config.runtime.timezone, "America/Sao_Paulo");
        assert_eq!(config.storage.url_ttl_secs, 3600);
        assert!(config.telemetry.url.is_none());
        assert!(config.certificate.is_none());
        assert!(config.credentials.is_empty());
    }

    #[test]
    fn test_deserialize_missing_storage_fails() {
        let toml = r#"
[server]
port = 8080
"#;
        let result: Result<Config, _> = toml::from_str(toml);
        assert!(result.is_err());
    }

    #[test]
    fn test_deserialize_certificate_section() {
        let toml = r#"
[storage]
root = "/srv/objects"
signing_secret = "s3cret"

[certificate]
challenge_endpoint = "https://sso.example.test/challenge"
keystore_object = "certs/office.pfx"
keystore_passphrase = "pfx-pass"
otp_uri = "otpauth://totp/Docket:office?secret=GEZDGNBVGY3TQOJQGEZDGNBVGY3TQOJQ&issuer=Docket"
signature_digest = "sha256"
"#;
        let config: Config = toml::from_str(toml).unwrap();
        let cert = config.certificate.unwrap();
        assert_eq!(cert.keystore_object, "certs/office.pfx");
        assert_eq!(cert.signature_digest.to_string(), "sha256");
        assert_eq!(cert.authenticated_url_fragment, "pjekz");
    }

    #[test]
    fn test_sanitized_config_hides_secrets() {
        let toml = r#"
[storage]
root = "/srv/objects"
signing_secret = "s3cret"

[credentials.trt]
username = "operator"
password = "hunter2"
"#;
        let config: Config = toml::from_str(toml).unwrap();
        let sanitized = SanitizedConfig::from(&config);
        let json = serde_json::to_string(&sanitized).unwrap();

        assert!(sanitized.storage.signing_secret_configured);
        assert_eq!(sanitized.credentials, vec!["trt".to_string()]);
        assert!(!json.contains("s3cret"));
        assert!(!json.contains("hunter2"));
        assert!(!json.contains("operator"));
    }
}

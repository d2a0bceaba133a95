use chrono_tz::Tz;

use super::{types::Config, ConfigError};

/// Validate configuration
/// Currently validates:
/// - Server port is not 0
/// - Worker pool has at least one worker
/// - Output bucket is named
/// - Runtime timezone is a known IANA zone
pub fn validate_config(config: &Config) -> Result<(), ConfigError> {
    if config.server.port == 0 {
        return Err(ConfigError::ValidationError(
            "server.port cannot be 0".to_string(),
        ));
    }

    if config.runtime.pool_size == 0 {
        return Err(ConfigError::ValidationError(
            "runtime.pool_size must be at least 1".to_string(),
        ));
    }

    if config.storage.bucket.trim().is_empty() {
        return Err(ConfigError::ValidationError(
            "storage.bucket cannot be empty".to_string(),
        ));
    }

    if config.runtime.timezone.parse::<Tz>().is_err() {
        return Err(ConfigError::ValidationError(format!(
            "runtime.timezone '{}' is not a known timezone",
            config.runtime.timezone
        )));
    }

    if let Some(cert) = &config.certificate {
        if cert.challenge_endpoint.trim().is_empty() {
            return Err(ConfigError::ValidationError(
                "certificate.challenge_endpoint cannot be empty".to_string(),
            ));
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::load_config_from_str;

    fn base_config() -> Config {
        load_config_from_str(
            r#"
[storage]
root = "/srv/objects"
signing_secret = "s3cret"
"#,
        )
        .unwrap()
    }

    #[test]
    fn test_validate_valid_config() {
        assert!(validate_config(&base_config()).is_ok());
    }

    #[test]
    fn test_validate_port_zero_fails() {
        let mut config = base_config();
        config.server.port = 0;
        let err = validate_config(&config).unwrap_err();
        assert!(matches!(err, ConfigError::ValidationError(_)));
    }

    #[test]
    fn test_validate_pool_size_zero_fails() {
        let mut config = base_config();
        config.runtime.pool_size = 0;
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_validate_unknown_timezone_fails() {
        let mut config = base_config();
        config.runtime.timezone = "Mars/Olympus_Mons".to_string();
        let err = validate_config(&config).unwrap_err();
        assert!(err.to_string().contains("Mars/Olympus_Mons"));
    }

    #[test]
    fn test_validate_empty_bucket_fails() {
        let mut config = base_config();
        config.storage.bucket = "  ".to_string();
        assert!(validate_config(&config).is_err());
    }
}

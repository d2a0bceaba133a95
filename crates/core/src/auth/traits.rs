use thiserror::Error;

use crate::driver::DriverError;

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("Keystore error: {0}")]
    Keystore(String),

    #[error("Signing failed: {0}")]
    Signing(String),

    #[error("One-time password error: {0}")]
    Otp(String),

    #[error("Challenge submission failed: {0}")]
    Challenge(String),

    #[error("No captured request matches {0}")]
    NoCapturedRequest(String),

    #[error("Invalid session credentials: {0}")]
    InvalidSession(String),

    #[error("Configuration error: {0}")]
    ConfigurationError(String),

    #[error("Driver error: {0}")]
    Driver(#[from] DriverError),
}

impl From<openssl::error::ErrorStack> for AuthError {
    fn from(e: openssl::error::ErrorStack) -> Self {
        AuthError::Signing(e.to_string())
    }
}

use rand::Rng;
use totp_rs::TOTP;

use crate::auth::AuthError;

/// Time-based one-time passwords from an `otpauth://totp/...` URI.
#[derive(Debug, Clone)]
pub struct OtpGenerator {
    totp: TOTP,
}

impl OtpGenerator {
    pub fn from_uri(uri: &str) -> Result<Self, AuthError> {
        let totp = TOTP::from_url(uri).map_err(|e| AuthError::Otp(e.to_string()))?;
        Ok(Self { totp })
    }

    pub fn current_code(&self) -> Result<String, AuthError> {
        self.totp
            .generate_current()
            .map_err(|e| AuthError::Otp(e.to_string()))
    }

    /// Code for a unix timestamp.
    pub fn code_at(&self, unix_secs: u64) -> String {
        self.totp.generate(unix_secs)
    }
}

const BASE36: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";

/// 52 random bits rendered in base 36 with a `0.` prefix, the same shape a
/// browser's `Math.random().toString(36)` produces.
pub fn random_challenge() -> String {
    let n: u64 = rand::thread_rng().gen::<u64>() & ((1u64 << 52) - 1);
    format!("0.{}", to_base36(n))
}

fn to_base36(mut n: u64) -> String {
    if n == 0 {
        return "0".to_string();
    }
    let mut digits = Vec::new();
    while n > 0 {
        digits.push(BASE36[(n % 36) as usize]);
        n /= 36;
    }
    digits.reverse();
    String::from_utf8_lossy(&digits).into_owned()
}

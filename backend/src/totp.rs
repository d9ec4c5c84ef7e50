//! TOTP secret lifecycle: generation, provisioning and verification.
//!
//! Codes follow RFC 6238 with SHA-1, 6 digits and a 30 second step. A code
//! is accepted for the current step and one step on either side.

use chrono::{DateTime, Utc};
use rand::RngCore;
use totp_rs::{Algorithm, Secret, TOTP};

pub const DEFAULT_ISSUER: &str = "AWS VPN 2FA";

const DIGITS: usize = 6;
const SKEW: u8 = 1;
const STEP_SECS: u64 = 30;
/// 160 bits, the RFC 4226 recommended secret length.
const SECRET_BYTES: usize = 20;

#[derive(Debug, thiserror::Error)]
pub enum TotpError {
    #[error("Invalid secret: {0}")]
    InvalidSecret(String),
    #[error("TOTP init error: {0}")]
    Init(String),
    #[error("QR generation error: {0}")]
    Qr(String),
}

/// Generate a fresh random base32 secret.
pub fn generate_secret() -> String {
    let mut bytes = [0u8; SECRET_BYTES];
    rand::thread_rng().fill_bytes(&mut bytes);
    Secret::Raw(bytes.to_vec()).to_encoded().to_string()
}

fn build(secret: &str, account: &str, issuer: &str) -> Result<TOTP, TotpError> {
    let bytes = Secret::Encoded(secret.to_string())
        .to_bytes()
        .map_err(|e| TotpError::InvalidSecret(e.to_string()))?;

    TOTP::new(
        Algorithm::SHA1,
        DIGITS,
        SKEW,
        STEP_SECS,
        bytes,
        Some(issuer.to_string()),
        account.to_string(),
    )
    .map_err(|e| TotpError::Init(e.to_string()))
}

/// `otpauth://totp/...` URI understood by authenticator apps.
pub fn provisioning_uri(secret: &str, account: &str, issuer: &str) -> Result<String, TotpError> {
    Ok(build(secret, account, issuer)?.get_url())
}

/// Base64-encoded PNG of a QR code carrying the provisioning URI.
pub fn qr_png_base64(secret: &str, account: &str, issuer: &str) -> Result<String, TotpError> {
    build(secret, account, issuer)?
        .get_qr_base64()
        .map_err(TotpError::Qr)
}

/// Check a submitted code at `now`. An empty or malformed secret never verifies.
pub fn verify(secret: &str, code: &str, now: DateTime<Utc>) -> bool {
    if secret.is_empty() {
        return false;
    }
    let code = code.trim();
    if code.len() != DIGITS || !code.bytes().all(|b| b.is_ascii_digit()) {
        return false;
    }
    let Ok(timestamp) = u64::try_from(now.timestamp()) else {
        return false;
    };

    match build(secret, "user", DEFAULT_ISSUER) {
        Ok(totp) => totp.check(code, timestamp),
        Err(e) => {
            tracing::warn!("Cannot verify TOTP code: {}", e);
            false
        }
    }
}

/// Code valid for the step containing `at`.
pub fn code_at(secret: &str, at: DateTime<Utc>) -> Result<String, TotpError> {
    let timestamp = u64::try_from(at.timestamp())
        .map_err(|_| TotpError::Init("timestamp before epoch".to_string()))?;
    Ok(build(secret, "user", DEFAULT_ISSUER)?.generate(timestamp))
}

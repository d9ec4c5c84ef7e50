//! Enrollment, verification and connection-logging payloads.

use serde::{Deserialize, Serialize};

/// Link to the enrollment wizard for `username`.
pub fn setup_url(base: &str, username: &str) -> String {
    format!(
        "{}?username={}&action=setup_2fa",
        base.trim_end_matches('?'),
        username
    )
}

/// POST /api/auth/setup-2fa/
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SetupRequest {
    pub username: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SetupResponse {
    pub success: bool,
    /// Base64-encoded PNG of the provisioning QR code.
    pub qr_code: String,
    pub secret_key: String,
    pub is_enabled: bool,
}

/// POST /api/auth/verify-2fa/
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerifyRequest {
    pub username: String,
    pub token: String,
    /// Falls back to the peer address when absent.
    #[serde(default)]
    pub client_ip: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerifyResponse {
    pub success: bool,
    pub access_granted: bool,
    pub message: String,
}

/// POST /api/auth/enable-2fa/
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnableRequest {
    pub username: String,
    pub token: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnableResponse {
    pub success: bool,
    pub message: String,
}

/// POST /api/auth/log-vpn-connection/
///
/// Sent by the connection handler once the gateway has established a tunnel.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectionLogRequest {
    pub username: String,
    pub vpn_ip: String,
    #[serde(default)]
    pub public_ip: Option<String>,
    #[serde(default)]
    pub connection_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectionLogResponse {
    pub success: bool,
    /// False when the entry was suppressed as a duplicate.
    pub logged: bool,
}

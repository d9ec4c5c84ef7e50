//! Status-check protocol between the hook and the backend.
//!
//! The hook calls `GET /api/auth/check-status/` with a [`StatusCheckQuery`]
//! and receives a [`StatusCheckResponse`]. A response with `success = false`
//! always carries an `error` message and usually an `error_code`.

use serde::{Deserialize, Serialize};

/// Source tag sent by the gateway hook. Requests carrying it are treated as
/// automated observations and their ledger writes are deduplicated.
pub const AUTOMATED_SOURCE: &str = "lambda_vpn_check";

/// Query parameters of the status-check endpoint.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusCheckQuery {
    #[serde(default)]
    pub username: Option<String>,
    /// Comma-separated group names as reported by the directory service.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub groups: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_ip: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub connection_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    /// `"true"` / `"false"`; kept as text because it travels as a query string.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub send_email: Option<String>,
}

impl StatusCheckQuery {
    /// Username with surrounding whitespace removed, `None` when blank.
    pub fn username(&self) -> Option<&str> {
        self.username
            .as_deref()
            .map(str::trim)
            .filter(|u| !u.is_empty())
    }

    /// Group names split on commas, blanks dropped.
    pub fn group_names(&self) -> Vec<String> {
        self.groups
            .as_deref()
            .unwrap_or_default()
            .split(',')
            .map(str::trim)
            .filter(|g| !g.is_empty())
            .map(String::from)
            .collect()
    }

    pub fn is_automated(&self) -> bool {
        self.source.as_deref() == Some(AUTOMATED_SOURCE)
    }

    /// Explicit notification flag, `None` when the caller did not send one.
    pub fn send_email(&self) -> Option<bool> {
        self.send_email
            .as_deref()
            .map(|v| v.trim().eq_ignore_ascii_case("true"))
    }
}

/// Machine-readable failure code of a status check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StatusErrorCode {
    TimeRestriction,
    ServerTimeout,
    InternalError,
    /// Any code this version does not know about.
    #[serde(other)]
    Unknown,
}

/// Response of the status-check endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusCheckResponse {
    pub success: bool,
    pub username: String,
    #[serde(default)]
    pub has_2fa: bool,
    #[serde(default)]
    pub is_enabled: bool,
    #[serde(default)]
    pub requires_setup: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_code: Option<StatusErrorCode>,
}

impl StatusCheckResponse {
    /// Failed check with no 2FA information attached.
    pub fn failure(username: &str, code: StatusErrorCode, error: impl Into<String>) -> Self {
        Self {
            success: false,
            username: username.to_string(),
            has_2fa: false,
            is_enabled: false,
            requires_setup: false,
            error: Some(error.into()),
            error_code: Some(code),
        }
    }
}

/// Generic `{success: false, error}` body used for request-level errors.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiErrorBody {
    pub success: bool,
    pub error: String,
}

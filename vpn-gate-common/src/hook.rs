//! Client VPN gateway hook schema.
//!
//! The gateway invokes the pre-authentication hook with a [`ClientConnectEvent`]
//! and expects a [`HookResponse`] back. Any response with `allow = false`
//! carries at least one [`PostureStatus`] and a remediation message that the
//! gateway shows to the end user.

use serde::{Deserialize, Deserializer, Serialize};

/// Response schema version expected by the gateway.
pub const SCHEMA_VERSION: &str = "v3";

/// Reason code attached to a denied connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PostureStatus {
    #[serde(rename = "missing-username")]
    MissingUsername,
    #[serde(rename = "api-error")]
    ApiError,
    #[serde(rename = "api-response-error")]
    ApiResponseError,
    #[serde(rename = "time-restriction")]
    TimeRestriction,
    #[serde(rename = "requires-2fa-setup")]
    RequiresSetup,
    #[serde(rename = "2fa-required")]
    TwoFactorRequired,
    #[serde(rename = "server-timeout")]
    ServerTimeout,
    #[serde(rename = "json-error")]
    JsonError,
    #[serde(rename = "unexpected-error")]
    UnexpectedError,
}

impl PostureStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PostureStatus::MissingUsername => "missing-username",
            PostureStatus::ApiError => "api-error",
            PostureStatus::ApiResponseError => "api-response-error",
            PostureStatus::TimeRestriction => "time-restriction",
            PostureStatus::RequiresSetup => "requires-2fa-setup",
            PostureStatus::TwoFactorRequired => "2fa-required",
            PostureStatus::ServerTimeout => "server-timeout",
            PostureStatus::JsonError => "json-error",
            PostureStatus::UnexpectedError => "unexpected-error",
        }
    }
}

impl std::fmt::Display for PostureStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Response returned to the gateway.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HookResponse {
    pub allow: bool,
    #[serde(rename = "schema-version")]
    pub schema_version: String,
    #[serde(rename = "posture-compliance-statuses")]
    pub posture_compliance_statuses: Vec<PostureStatus>,
    #[serde(rename = "error-msg-on-failed-posture-compliance")]
    pub error_msg_on_failed_posture_compliance: String,
}

impl HookResponse {
    pub fn allow() -> Self {
        Self {
            allow: true,
            schema_version: SCHEMA_VERSION.to_string(),
            posture_compliance_statuses: vec![],
            error_msg_on_failed_posture_compliance: String::new(),
        }
    }

    pub fn deny(status: PostureStatus, message: impl Into<String>) -> Self {
        Self {
            allow: false,
            schema_version: SCHEMA_VERSION.to_string(),
            posture_compliance_statuses: vec![status],
            error_msg_on_failed_posture_compliance: message.into(),
        }
    }

    /// First posture status, if the connection was denied.
    pub fn status(&self) -> Option<PostureStatus> {
        self.posture_compliance_statuses.first().copied()
    }
}

/// Pre-authentication event sent by the gateway.
///
/// The client address arrives under different keys depending on the gateway
/// version, so all three spellings are accepted.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ClientConnectEvent {
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default, rename = "public-ip")]
    pub public_ip: Option<String>,
    #[serde(default, rename = "client-ip")]
    pub client_ip_dashed: Option<String>,
    #[serde(default)]
    pub client_ip: Option<String>,
    #[serde(default, rename = "connection-id")]
    pub connection_id: Option<String>,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub groups: Vec<String>,
}

/// Gateways send `"groups": null` for users without group claims.
fn null_as_empty<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<Vec<String>>::deserialize(deserializer)?.unwrap_or_default())
}

impl ClientConnectEvent {
    /// Client address, preferring `public-ip` over `client-ip` over `client_ip`.
    pub fn client_ip(&self) -> &str {
        self.public_ip
            .as_deref()
            .or(self.client_ip_dashed.as_deref())
            .or(self.client_ip.as_deref())
            .unwrap_or_default()
    }
}

/// Connection event sent after the tunnel is established.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConnectionEvent {
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default, rename = "vpn-ip")]
    pub vpn_ip: Option<String>,
    #[serde(default, rename = "public-ip")]
    pub public_ip: Option<String>,
    #[serde(default, rename = "connection-id")]
    pub connection_id: Option<String>,
}

/// The connection handler never blocks an established tunnel.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectionHandlerResponse {
    pub allow: bool,
}

use chrono::{DateTime, Utc};
use serde::Serialize;

/// TOTP enrollment state of a user.
///
/// `secret` is empty until enrollment starts. `enabled` turns on after the
/// first successful verification and is never switched off by the service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TwoFactorCredential {
    pub username: String,
    #[serde(skip_serializing)]
    pub secret: String,
    pub enabled: bool,
    /// Reserved for recovery codes; not consulted by the decision path.
    pub backup_tokens: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TwoFactorCredential {
    pub fn has_secret(&self) -> bool {
        !self.secret.is_empty()
    }
}

use chrono::{DateTime, Utc};
use serde::Serialize;
use vpn_gate_common::AccessLogView;

/// One VPN access attempt. Entries are immutable once written.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AccessLogEntry {
    pub id: String,
    pub username: String,
    pub client_ip: String,
    pub timestamp: DateTime<Utc>,
    pub two_factor_verified: bool,
    pub access_granted: bool,
}

impl AccessLogEntry {
    pub fn new(
        username: &str,
        client_ip: &str,
        two_factor_verified: bool,
        access_granted: bool,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            username: username.to_string(),
            client_ip: client_ip.to_string(),
            timestamp,
            two_factor_verified,
            access_granted,
        }
    }
}

impl From<AccessLogEntry> for AccessLogView {
    fn from(entry: AccessLogEntry) -> Self {
        AccessLogView {
            username: entry.username,
            client_ip: entry.client_ip,
            access_time: entry.timestamp,
            two_factor_verified: entry.two_factor_verified,
            access_granted: entry.access_granted,
        }
    }
}

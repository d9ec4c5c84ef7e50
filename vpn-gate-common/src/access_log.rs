//! Access log listing types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One access attempt as shown to administrators.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessLogView {
    pub username: String,
    pub client_ip: String,
    pub access_time: DateTime<Utc>,
    pub two_factor_verified: bool,
    pub access_granted: bool,
}

/// GET /api/auth/access-logs/
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccessLogsResponse {
    pub success: bool,
    pub logs: Vec<AccessLogView>,
}

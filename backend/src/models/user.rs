use chrono::{DateTime, Utc};
use serde::Serialize;

/// Directory user. The username is owned by the upstream directory and never
/// changed locally.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct User {
    pub id: i64,
    pub username: String,
    /// When the user was first provisioned
    pub created_at: DateTime<Utc>,
}

/// Directory group. A group owns at most one time-window policy.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct Group {
    pub id: i64,
    pub name: String,
}

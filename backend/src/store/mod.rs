//! Storage collaborators of the decision engine.
//!
//! The engine only sees these traits. [`SqliteStore`] implements all of them
//! on a single connection.

mod sqlite;

pub use sqlite::SqliteStore;

use chrono::{DateTime, Utc};

use crate::models::{AccessLogEntry, Group, TwoFactorCredential, User};
use crate::policy::TimeWindowPolicy;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    DatabaseError(String),
    #[error("IO error: {0}")]
    IoError(String),
    #[error("Invalid record: {0}")]
    InvalidRecord(String),
}

impl From<rusqlite::Error> for StoreError {
    fn from(e: rusqlite::Error) -> Self {
        StoreError::DatabaseError(e.to_string())
    }
}

/// Users, groups and group policies.
pub trait Directory: Send + Sync {
    fn find_user(&self, username: &str) -> Result<Option<User>, StoreError>;

    /// Groups the user belongs to, ordered by group name.
    fn groups_of(&self, username: &str) -> Result<Vec<Group>, StoreError>;

    fn find_group(&self, name: &str) -> Result<Option<Group>, StoreError>;

    fn policy_of(&self, group: &Group) -> Result<Option<TimeWindowPolicy>, StoreError>;
}

/// Per-user TOTP credentials.
///
/// Mutations are single conditional statements so concurrent enrollment of
/// the same user cannot lose or revert the enabled flag.
pub trait CredentialStore: Send + Sync {
    fn credential(&self, username: &str) -> Result<Option<TwoFactorCredential>, StoreError>;

    /// Create the credential if missing and store `secret` only when no secret
    /// is present yet. Returns the credential as persisted afterwards.
    fn set_secret_if_absent(
        &self,
        username: &str,
        secret: &str,
        now: DateTime<Utc>,
    ) -> Result<TwoFactorCredential, StoreError>;

    /// Flip `enabled` to true. Returns whether this call performed the flip.
    fn mark_enabled(&self, username: &str, now: DateTime<Utc>) -> Result<bool, StoreError>;
}

/// Append-only access log.
pub trait LedgerStore: Send + Sync {
    fn append(&self, entry: &AccessLogEntry) -> Result<(), StoreError>;

    /// Newest entry for the pair with `timestamp >= since`.
    fn latest_since(
        &self,
        username: &str,
        client_ip: &str,
        since: DateTime<Utc>,
    ) -> Result<Option<AccessLogEntry>, StoreError>;

    /// Entries ordered newest first.
    fn recent(&self, limit: usize) -> Result<Vec<AccessLogEntry>, StoreError>;
}

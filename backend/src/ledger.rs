//! Append-only record of VPN access attempts.
//!
//! Interactive verifications are always recorded. Observations from the
//! automated gateway hook arrive repeatedly for the same connection, so they
//! are recorded at most once per `(username, client_ip)` within
//! [`DEDUP_WINDOW_SECS`].

use std::sync::{Arc, Mutex};

use chrono::{DateTime, Duration, Utc};

use crate::models::AccessLogEntry;
use crate::store::{LedgerStore, StoreError};

/// Trailing window in which automated observations of the same pair collapse.
pub const DEDUP_WINDOW_SECS: i64 = 3600;

/// Default and maximum number of entries returned by [`AccessLedger::recent`].
pub const MAX_RECENT: usize = 50;

pub struct AccessLedger {
    store: Arc<dyn LedgerStore>,
    /// Last timestamp handed out. Entries never go backwards in time.
    last: Mutex<Option<DateTime<Utc>>>,
}

impl AccessLedger {
    pub fn new(store: Arc<dyn LedgerStore>) -> Self {
        Self {
            store,
            last: Mutex::new(None),
        }
    }

    fn stamp(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        match self.last.lock() {
            Ok(mut last) => {
                let ts = match *last {
                    Some(prev) if prev > now => prev,
                    _ => now,
                };
                *last = Some(ts);
                ts
            }
            Err(_) => now,
        }
    }

    /// Append an entry unconditionally.
    pub fn record(
        &self,
        username: &str,
        client_ip: &str,
        verified: bool,
        granted: bool,
        now: DateTime<Utc>,
    ) -> Result<AccessLogEntry, StoreError> {
        let entry = AccessLogEntry::new(username, client_ip, verified, granted, self.stamp(now));
        self.store.append(&entry)?;

        tracing::info!(
            username = %username,
            client_ip = %client_ip,
            verified,
            granted,
            "Access attempt recorded"
        );
        Ok(entry)
    }

    /// Append unless the pair already has an entry in the trailing window.
    /// Returns `None` when the write was suppressed.
    ///
    /// The check and the write are not atomic: two concurrent observations
    /// may both be recorded.
    pub fn record_deduped(
        &self,
        username: &str,
        client_ip: &str,
        verified: bool,
        granted: bool,
        now: DateTime<Utc>,
    ) -> Result<Option<AccessLogEntry>, StoreError> {
        let since = now - Duration::seconds(DEDUP_WINDOW_SECS);
        if let Some(existing) = self.store.latest_since(username, client_ip, since)? {
            tracing::debug!(
                username = %username,
                client_ip = %client_ip,
                existing = %existing.id,
                "Duplicate access observation skipped"
            );
            return Ok(None);
        }

        self.record(username, client_ip, verified, granted, now)
            .map(Some)
    }

    /// Newest entries first. `None` or zero means [`MAX_RECENT`]; larger
    /// limits are capped.
    pub fn recent(&self, limit: Option<usize>) -> Result<Vec<AccessLogEntry>, StoreError> {
        let limit = match limit {
            Some(0) | None => MAX_RECENT,
            Some(n) => n.min(MAX_RECENT),
        };
        self.store.recent(limit)
    }
}

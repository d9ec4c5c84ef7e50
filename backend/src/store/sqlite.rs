use std::path::Path;
use std::sync::Mutex;

use chrono::{DateTime, NaiveTime, SecondsFormat, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};

use super::{CredentialStore, Directory, LedgerStore, StoreError};
use crate::models::{AccessLogEntry, Group, TwoFactorCredential, User};
use crate::policy::{parse_weekdays, TimeWindowPolicy};

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS users (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    username TEXT NOT NULL UNIQUE,
    created_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS groups (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL UNIQUE
);

CREATE TABLE IF NOT EXISTS user_groups (
    user_id INTEGER NOT NULL,
    group_id INTEGER NOT NULL,
    PRIMARY KEY (user_id, group_id),
    FOREIGN KEY (user_id) REFERENCES users(id),
    FOREIGN KEY (group_id) REFERENCES groups(id)
);

CREATE TABLE IF NOT EXISTS group_policies (
    group_id INTEGER PRIMARY KEY,
    require_2fa INTEGER NOT NULL DEFAULT 1,
    allow_without_2fa INTEGER NOT NULL DEFAULT 0,
    grace_period_hours INTEGER NOT NULL DEFAULT 24,
    enable_time_restriction INTEGER NOT NULL DEFAULT 0,
    allowed_start_time TEXT,
    allowed_end_time TEXT,
    allowed_weekdays TEXT NOT NULL DEFAULT '1,2,3,4,5',
    timezone TEXT NOT NULL DEFAULT 'Asia/Seoul',
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL,
    FOREIGN KEY (group_id) REFERENCES groups(id)
);

CREATE TABLE IF NOT EXISTS two_factor_credentials (
    username TEXT PRIMARY KEY,
    secret_key TEXT NOT NULL DEFAULT '',
    is_enabled INTEGER NOT NULL DEFAULT 0,
    backup_tokens TEXT NOT NULL DEFAULT '[]',
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL,
    FOREIGN KEY (username) REFERENCES users(username)
);

CREATE TABLE IF NOT EXISTS access_logs (
    id TEXT PRIMARY KEY,
    username TEXT NOT NULL,
    client_ip TEXT NOT NULL,
    access_time TEXT NOT NULL,
    two_factor_verified INTEGER NOT NULL,
    access_granted INTEGER NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_access_logs_pair ON access_logs(username, client_ip, access_time);
CREATE INDEX IF NOT EXISTS idx_access_logs_time ON access_logs(access_time);
";

/// SQLite-backed directory, credential store and access ledger.
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

/// Fixed-width UTC timestamps, so text ordering matches time ordering.
fn format_ts(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_ts(raw: &str) -> Result<DateTime<Utc>, StoreError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| StoreError::InvalidRecord(format!("bad timestamp {raw}: {e}")))
}

fn parse_time(raw: Option<String>) -> Result<Option<NaiveTime>, StoreError> {
    raw.filter(|t| !t.is_empty())
        .map(|t| {
            NaiveTime::parse_from_str(&t, "%H:%M:%S")
                .or_else(|_| NaiveTime::parse_from_str(&t, "%H:%M"))
                .map_err(|e| StoreError::InvalidRecord(format!("bad time {t}: {e}")))
        })
        .transpose()
}

type CredentialRow = (String, String, bool, String, String, String);

fn credential_row(row: &Row<'_>) -> rusqlite::Result<CredentialRow> {
    Ok((
        row.get(0)?,
        row.get(1)?,
        row.get::<_, i32>(2)? != 0,
        row.get(3)?,
        row.get(4)?,
        row.get(5)?,
    ))
}

fn into_credential(raw: CredentialRow) -> Result<TwoFactorCredential, StoreError> {
    let (username, secret, enabled, backup_tokens, created_at, updated_at) = raw;
    let backup_tokens: Vec<String> = serde_json::from_str(&backup_tokens)
        .map_err(|e| StoreError::InvalidRecord(format!("bad backup tokens: {e}")))?;
    Ok(TwoFactorCredential {
        username,
        secret,
        enabled,
        backup_tokens,
        created_at: parse_ts(&created_at)?,
        updated_at: parse_ts(&updated_at)?,
    })
}

type LogRow = (String, String, String, String, bool, bool);

fn log_row(row: &Row<'_>) -> rusqlite::Result<LogRow> {
    Ok((
        row.get(0)?,
        row.get(1)?,
        row.get(2)?,
        row.get(3)?,
        row.get::<_, i32>(4)? != 0,
        row.get::<_, i32>(5)? != 0,
    ))
}

fn into_entry(raw: LogRow) -> Result<AccessLogEntry, StoreError> {
    let (id, username, client_ip, access_time, two_factor_verified, access_granted) = raw;
    Ok(AccessLogEntry {
        id,
        username,
        client_ip,
        timestamp: parse_ts(&access_time)?,
        two_factor_verified,
        access_granted,
    })
}

impl SqliteStore {
    pub fn new(database_url: &str) -> Result<Self, StoreError> {
        // Parse sqlite: prefix if present
        let path = database_url.strip_prefix("sqlite:").unwrap_or(database_url);

        let conn = if path == ":memory:" {
            Connection::open_in_memory()?
        } else {
            if let Some(parent) = Path::new(path).parent() {
                std::fs::create_dir_all(parent)
                    .map_err(|e| StoreError::IoError(e.to_string()))?;
            }
            Connection::open(path)?
        };

        conn.execute_batch(SCHEMA)?;

        tracing::info!("Store initialized with database: {}", path);

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Connection>, StoreError> {
        self.conn
            .lock()
            .map_err(|e| StoreError::DatabaseError(e.to_string()))
    }

    /// Provision a directory user, returning the existing row if present.
    pub fn upsert_user(&self, username: &str, now: DateTime<Utc>) -> Result<User, StoreError> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT OR IGNORE INTO users (username, created_at) VALUES (?1, ?2)",
            params![username, format_ts(now)],
        )?;
        let (id, created_at): (i64, String) = conn.query_row(
            "SELECT id, created_at FROM users WHERE username = ?1",
            params![username],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )?;
        Ok(User {
            id,
            username: username.to_string(),
            created_at: parse_ts(&created_at)?,
        })
    }

    pub fn upsert_group(&self, name: &str) -> Result<Group, StoreError> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT OR IGNORE INTO groups (name) VALUES (?1)",
            params![name],
        )?;
        let id: i64 = conn.query_row(
            "SELECT id FROM groups WHERE name = ?1",
            params![name],
            |row| row.get(0),
        )?;
        Ok(Group {
            id,
            name: name.to_string(),
        })
    }

    pub fn add_member(&self, username: &str, group: &str) -> Result<(), StoreError> {
        let conn = self.lock()?;
        let inserted = conn.execute(
            "INSERT OR IGNORE INTO user_groups (user_id, group_id)
             SELECT u.id, g.id FROM users u, groups g WHERE u.username = ?1 AND g.name = ?2",
            params![username, group],
        )?;
        tracing::debug!(username, group, inserted, "Group membership updated");
        Ok(())
    }

    /// Create or replace the policy of a group.
    pub fn set_policy(
        &self,
        group: &str,
        policy: &TimeWindowPolicy,
        now: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let conn = self.lock()?;
        let group_id: Option<i64> = conn
            .query_row(
                "SELECT id FROM groups WHERE name = ?1",
                params![group],
                |row| row.get(0),
            )
            .optional()?;
        let group_id =
            group_id.ok_or_else(|| StoreError::InvalidRecord(format!("unknown group {group}")))?;

        conn.execute(
            "INSERT INTO group_policies (
                group_id, require_2fa, allow_without_2fa, grace_period_hours,
                enable_time_restriction, allowed_start_time, allowed_end_time,
                allowed_weekdays, timezone, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?10)
             ON CONFLICT(group_id) DO UPDATE SET
                require_2fa = excluded.require_2fa,
                allow_without_2fa = excluded.allow_without_2fa,
                grace_period_hours = excluded.grace_period_hours,
                enable_time_restriction = excluded.enable_time_restriction,
                allowed_start_time = excluded.allowed_start_time,
                allowed_end_time = excluded.allowed_end_time,
                allowed_weekdays = excluded.allowed_weekdays,
                timezone = excluded.timezone,
                updated_at = excluded.updated_at",
            params![
                group_id,
                policy.require_two_factor,
                policy.allow_without_two_factor,
                policy.grace_period_hours,
                policy.time_restriction_enabled,
                policy.start_time.map(|t| t.format("%H:%M:%S").to_string()),
                policy.end_time.map(|t| t.format("%H:%M:%S").to_string()),
                policy.weekdays_to_string(),
                policy.timezone,
                format_ts(now),
            ],
        )?;

        tracing::info!(group, "Group policy saved");
        Ok(())
    }
}

impl Directory for SqliteStore {
    fn find_user(&self, username: &str) -> Result<Option<User>, StoreError> {
        let conn = self.lock()?;
        let row: Option<(i64, String)> = conn
            .query_row(
                "SELECT id, created_at FROM users WHERE username = ?1",
                params![username],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;

        row.map(|(id, created_at)| {
            Ok(User {
                id,
                username: username.to_string(),
                created_at: parse_ts(&created_at)?,
            })
        })
        .transpose()
    }

    fn groups_of(&self, username: &str) -> Result<Vec<Group>, StoreError> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT g.id, g.name FROM groups g
             JOIN user_groups ug ON ug.group_id = g.id
             JOIN users u ON u.id = ug.user_id
             WHERE u.username = ?1
             ORDER BY g.name",
        )?;
        let groups = stmt
            .query_map(params![username], |row| {
                Ok(Group {
                    id: row.get(0)?,
                    name: row.get(1)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(groups)
    }

    fn find_group(&self, name: &str) -> Result<Option<Group>, StoreError> {
        let conn = self.lock()?;
        let group = conn
            .query_row(
                "SELECT id, name FROM groups WHERE name = ?1",
                params![name],
                |row| {
                    Ok(Group {
                        id: row.get(0)?,
                        name: row.get(1)?,
                    })
                },
            )
            .optional()?;
        Ok(group)
    }

    fn policy_of(&self, group: &Group) -> Result<Option<TimeWindowPolicy>, StoreError> {
        let conn = self.lock()?;
        let row: Option<(bool, bool, i32, bool, Option<String>, Option<String>, String, String)> =
            conn.query_row(
                "SELECT require_2fa, allow_without_2fa, grace_period_hours, enable_time_restriction,
                        allowed_start_time, allowed_end_time, allowed_weekdays, timezone
                 FROM group_policies WHERE group_id = ?1",
                params![group.id],
                |row| {
                    Ok((
                        row.get::<_, i32>(0)? != 0,
                        row.get::<_, i32>(1)? != 0,
                        row.get(2)?,
                        row.get::<_, i32>(3)? != 0,
                        row.get(4)?,
                        row.get(5)?,
                        row.get(6)?,
                        row.get(7)?,
                    ))
                },
            )
            .optional()?;

        let Some((require, allow_without, grace, restricted, start, end, weekdays, timezone)) = row
        else {
            return Ok(None);
        };

        Ok(Some(TimeWindowPolicy {
            require_two_factor: require,
            allow_without_two_factor: allow_without,
            grace_period_hours: grace,
            time_restriction_enabled: restricted,
            start_time: parse_time(start)?,
            end_time: parse_time(end)?,
            allowed_weekdays: parse_weekdays(&weekdays),
            timezone,
        }))
    }
}

impl CredentialStore for SqliteStore {
    fn credential(&self, username: &str) -> Result<Option<TwoFactorCredential>, StoreError> {
        let conn = self.lock()?;
        let row = conn
            .query_row(
                "SELECT username, secret_key, is_enabled, backup_tokens, created_at, updated_at
                 FROM two_factor_credentials WHERE username = ?1",
                params![username],
                credential_row,
            )
            .optional()?;
        row.map(into_credential).transpose()
    }

    fn set_secret_if_absent(
        &self,
        username: &str,
        secret: &str,
        now: DateTime<Utc>,
    ) -> Result<TwoFactorCredential, StoreError> {
        let mut conn = self.lock()?;
        let ts = format_ts(now);
        let tx = conn.transaction()?;

        tx.execute(
            "INSERT OR IGNORE INTO two_factor_credentials (username, created_at, updated_at)
             VALUES (?1, ?2, ?2)",
            params![username, ts],
        )?;
        let generated = tx.execute(
            "UPDATE two_factor_credentials SET secret_key = ?2, updated_at = ?3
             WHERE username = ?1 AND secret_key = ''",
            params![username, secret, ts],
        )?;
        let row = tx.query_row(
            "SELECT username, secret_key, is_enabled, backup_tokens, created_at, updated_at
             FROM two_factor_credentials WHERE username = ?1",
            params![username],
            credential_row,
        )?;
        tx.commit()?;

        if generated > 0 {
            tracing::info!(username, "Generated TOTP secret");
        }
        into_credential(row)
    }

    fn mark_enabled(&self, username: &str, now: DateTime<Utc>) -> Result<bool, StoreError> {
        let conn = self.lock()?;
        let changed = conn.execute(
            "UPDATE two_factor_credentials SET is_enabled = 1, updated_at = ?2
             WHERE username = ?1 AND is_enabled = 0",
            params![username, format_ts(now)],
        )?;
        Ok(changed > 0)
    }
}

impl LedgerStore for SqliteStore {
    fn append(&self, entry: &AccessLogEntry) -> Result<(), StoreError> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO access_logs (id, username, client_ip, access_time, two_factor_verified, access_granted)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                entry.id,
                entry.username,
                entry.client_ip,
                format_ts(entry.timestamp),
                entry.two_factor_verified,
                entry.access_granted,
            ],
        )?;

        tracing::debug!("Logged access attempt: {}", entry.id);
        Ok(())
    }

    fn latest_since(
        &self,
        username: &str,
        client_ip: &str,
        since: DateTime<Utc>,
    ) -> Result<Option<AccessLogEntry>, StoreError> {
        let conn = self.lock()?;
        let row = conn
            .query_row(
                "SELECT id, username, client_ip, access_time, two_factor_verified, access_granted
                 FROM access_logs
                 WHERE username = ?1 AND client_ip = ?2 AND access_time >= ?3
                 ORDER BY access_time DESC, rowid DESC LIMIT 1",
                params![username, client_ip, format_ts(since)],
                log_row,
            )
            .optional()?;
        row.map(into_entry).transpose()
    }

    fn recent(&self, limit: usize) -> Result<Vec<AccessLogEntry>, StoreError> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT id, username, client_ip, access_time, two_factor_verified, access_granted
             FROM access_logs ORDER BY access_time DESC, rowid DESC LIMIT ?1",
        )?;
        let rows = stmt
            .query_map(params![limit as i64], log_row)?
            .collect::<Result<Vec<_>, _>>()?;
        rows.into_iter().map(into_entry).collect()
    }
}

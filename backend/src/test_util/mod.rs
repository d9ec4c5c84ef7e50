//! Helpers shared by unit and integration tests.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Duration, TimeZone, Utc};
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};

use crate::clock::Clock;
use crate::config::{
    Config, DatabaseConfig, DecisionConfig, LoggingConfig, NotifierConfig, PolicyConfig,
    ServerConfig, TotpConfig,
};
use crate::engine::{AuthorizationEngine, EngineSettings};
use crate::ledger::AccessLedger;
use crate::notify::{Notifier, NotifyError};
use crate::store::SqliteStore;
use crate::AppState;

pub fn test_config() -> Config {
    Config {
        server: ServerConfig {
            host: "127.0.0.1".to_string(),
            port: 8000,
        },
        database: DatabaseConfig {
            url: ":memory:".to_string(),
        },
        logging: LoggingConfig {
            level: "debug".to_string(),
        },
        totp: TotpConfig::default(),
        policy: PolicyConfig::default(),
        decision: DecisionConfig { timeout_secs: 2 },
        notifier: NotifierConfig {
            slack_webhook_url: None,
            setup_base_url: "https://vpn.example.com".to_string(),
            timeout_secs: 2,
        },
    }
}

/// UTC instant for a wall clock time in Asia/Seoul.
pub fn seoul(year: i32, month: u32, day: u32, hour: u32, minute: u32) -> DateTime<Utc> {
    chrono_tz::Asia::Seoul
        .with_ymd_and_hms(year, month, day, hour, minute, 0)
        .unwrap()
        .with_timezone(&Utc)
}

/// Clock that only moves when told to.
pub struct FixedClock {
    now: Mutex<DateTime<Utc>>,
}

impl FixedClock {
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(now),
        }
    }

    pub fn set(&self, now: DateTime<Utc>) {
        *self.now.lock().unwrap() = now;
    }

    pub fn advance(&self, by: Duration) {
        *self.now.lock().unwrap() += by;
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap()
    }
}

/// Notifier that forwards usernames to a channel, or always fails.
pub struct RecordingNotifier {
    tx: Option<UnboundedSender<String>>,
}

impl RecordingNotifier {
    pub fn new() -> (Self, UnboundedReceiver<String>) {
        let (tx, rx) = unbounded_channel();
        (Self { tx: Some(tx) }, rx)
    }

    pub fn failing() -> Self {
        Self { tx: None }
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn notify_setup_required(&self, username: &str) -> Result<(), NotifyError> {
        match &self.tx {
            Some(tx) => {
                let _ = tx.send(username.to_string());
                Ok(())
            }
            None => Err(NotifyError::Rejected(500)),
        }
    }
}

/// Everything a router test needs to drive and inspect the backend.
pub struct TestApp {
    pub state: Arc<AppState>,
    pub store: Arc<SqliteStore>,
    pub clock: Arc<FixedClock>,
    pub reminders: UnboundedReceiver<String>,
}

/// App state over an in-memory store, with `alice` and `bob` in the directory.
pub fn create_test_app() -> TestApp {
    let config = test_config();
    let store = Arc::new(SqliteStore::new(&config.database.url).unwrap());
    // 2024-01-01 is a Monday
    let clock = Arc::new(FixedClock::new(seoul(2024, 1, 1, 10, 0)));
    let (notifier, reminders) = RecordingNotifier::new();

    for username in ["alice", "bob"] {
        store.upsert_user(username, clock.now()).unwrap();
    }

    let engine = AuthorizationEngine::new(
        store.clone(),
        store.clone(),
        AccessLedger::new(store.clone()),
        Arc::new(notifier),
        clock.clone(),
        EngineSettings::from_config(&config),
    );

    TestApp {
        state: Arc::new(AppState::new(config, engine)),
        store,
        clock,
        reminders,
    }
}

//! Configuration for the backend.

use config::{Config as ConfigLoader, ConfigError, Environment, File};
use serde::Deserialize;

/// Main configuration structure for the backend.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub totp: TotpConfig,
    #[serde(default)]
    pub policy: PolicyConfig,
    #[serde(default)]
    pub decision: DecisionConfig,
    #[serde(default)]
    pub notifier: NotifierConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    /// `sqlite:<path>` or `:memory:`
    #[serde(default = "default_database_url")]
    pub url: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: default_database_url(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Filter used when RUST_LOG is not set.
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct TotpConfig {
    /// Issuer shown by authenticator apps.
    #[serde(default = "default_issuer")]
    pub issuer: String,
}

impl Default for TotpConfig {
    fn default() -> Self {
        Self {
            issuer: default_issuer(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct PolicyConfig {
    /// Zone used when a group policy names an unknown timezone.
    #[serde(default = "default_timezone")]
    pub default_timezone: String,
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            default_timezone: default_timezone(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct DecisionConfig {
    /// Upper bound on a single status check before answering SERVER_TIMEOUT.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for DecisionConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout_secs(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct NotifierConfig {
    /// Slack incoming webhook. Reminders are disabled when unset.
    #[serde(default)]
    pub slack_webhook_url: Option<String>,
    /// Base URL of the enrollment wizard linked from reminders.
    #[serde(default = "default_setup_base_url")]
    pub setup_base_url: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for NotifierConfig {
    fn default() -> Self {
        Self {
            slack_webhook_url: None,
            setup_base_url: default_setup_base_url(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

// Default values
fn default_host() -> String {
    "0.0.0.0".to_string()
}
fn default_port() -> u16 {
    8000
}
fn default_database_url() -> String {
    "sqlite:./data/vpn_gate.db".to_string()
}
fn default_log_level() -> String {
    "info".to_string()
}
fn default_issuer() -> String {
    crate::totp::DEFAULT_ISSUER.to_string()
}
fn default_timezone() -> String {
    crate::policy::FALLBACK_TIMEZONE.name().to_string()
}
fn default_timeout_secs() -> u64 {
    10
}
fn default_setup_base_url() -> String {
    "http://localhost".to_string()
}

impl Config {
    /// Load configuration from file and environment variables.
    ///
    /// Configuration sources (in order of precedence):
    /// 1. Environment variables (VPNGATE__SECTION__KEY format)
    /// 2. config.toml file (if present)
    /// 3. Built-in defaults
    pub fn load() -> Result<Self, ConfigError> {
        let config = ConfigLoader::builder()
            .add_source(File::with_name("config").required(false))
            .add_source(
                Environment::with_prefix("VPNGATE")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        config.try_deserialize()
    }
}

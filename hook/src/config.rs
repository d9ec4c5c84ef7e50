//! Configuration for the pre-authentication hook.

use config::{Config as ConfigLoader, ConfigError, Environment, File};
use serde::Deserialize;

/// Main configuration structure for the hook.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub backend: BackendConfig,
    #[serde(default)]
    pub gateway: GatewayConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
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

/// Backend status API.
#[derive(Debug, Clone, Deserialize)]
pub struct BackendConfig {
    /// Base URL of the `/api/auth` endpoints, without a trailing slash.
    #[serde(default = "default_api_url")]
    pub api_url: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            api_url: default_api_url(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct GatewayConfig {
    /// Enrollment wizard shown to users who still need to set up 2FA.
    #[serde(default = "default_redirect_url")]
    pub redirect_url: String,
    /// Ask the backend to send a setup reminder on denied connections.
    #[serde(default = "default_true")]
    pub notify: bool,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            redirect_url: default_redirect_url(),
            notify: default_true(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
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

// Default values
fn default_host() -> String {
    "0.0.0.0".to_string()
}
fn default_port() -> u16 {
    8081
}
fn default_api_url() -> String {
    "http://localhost:8000/api/auth".to_string()
}
fn default_timeout_secs() -> u64 {
    10
}
fn default_redirect_url() -> String {
    "http://localhost".to_string()
}
fn default_true() -> bool {
    true
}
fn default_log_level() -> String {
    "info".to_string()
}

impl Config {
    /// Load configuration from file and environment variables.
    ///
    /// Configuration sources (in order of precedence):
    /// 1. Environment variables (VPNHOOK__SECTION__KEY format)
    /// 2. config.toml file (if present)
    /// 3. Built-in defaults
    pub fn load() -> Result<Self, ConfigError> {
        let config = ConfigLoader::builder()
            .add_source(File::with_name("config").required(false))
            .add_source(
                Environment::with_prefix("VPNHOOK")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        config.try_deserialize()
    }
}

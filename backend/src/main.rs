use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpListener;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use vpn_gate_backend::clock::SystemClock;
use vpn_gate_backend::notify::{NoopNotifier, Notifier, SlackNotifier};
use vpn_gate_backend::{app, AccessLedger, AppState, AuthorizationEngine, Config, EngineSettings, SqliteStore};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load configuration
    let config = Config::load()?;

    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| config.logging.level.clone().into()))
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting vpn-gate backend");

    let store = Arc::new(SqliteStore::new(&config.database.url)?);

    let notifier: Arc<dyn Notifier> = match &config.notifier.slack_webhook_url {
        Some(url) if !url.is_empty() => Arc::new(SlackNotifier::new(
            url,
            &config.notifier.setup_base_url,
            Duration::from_secs(config.notifier.timeout_secs),
        )?),
        _ => {
            tracing::warn!("No Slack webhook configured, setup reminders disabled");
            Arc::new(NoopNotifier)
        }
    };

    let engine = AuthorizationEngine::new(
        store.clone(),
        store.clone(),
        AccessLedger::new(store),
        notifier,
        Arc::new(SystemClock),
        EngineSettings::from_config(&config),
    );

    let state = Arc::new(AppState::new(config.clone(), engine));
    let app = app(state);

    // Start server
    let addr = format!("{}:{}", config.server.host, config.server.port);
    tracing::info!("Listening on {}", addr);

    let listener = TcpListener::bind(&addr).await?;
    axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>()).await?;

    Ok(())
}

use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use vpn_gate_hook::{api, AppState, BackendClient, Config, HookAdapter};

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

    tracing::info!("Starting vpn-gate hook");
    tracing::info!("Backend API: {}", config.backend.api_url);

    let backend = BackendClient::new(
        &config.backend.api_url,
        Duration::from_secs(config.backend.timeout_secs),
    )?;
    let adapter = HookAdapter::new(
        Arc::new(backend),
        &config.gateway.redirect_url,
        config.gateway.notify,
    );

    let state = Arc::new(AppState::new(adapter));
    let app = api::router(state).layer(TraceLayer::new_for_http());

    // Start server
    let addr = format!("{}:{}", config.server.host, config.server.port);
    tracing::info!("Listening on {}", addr);

    let listener = TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

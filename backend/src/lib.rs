pub mod clock;
pub mod config;
pub mod engine;
pub mod error;
pub mod ledger;
pub mod logging;
pub mod models;
pub mod notify;
pub mod policy;
pub mod routes;
pub mod store;
pub mod test_util;
pub mod totp;

pub use config::Config;
pub use engine::{AuthorizationEngine, Decision, DecisionRequest, EngineSettings, SetupReason, Source};
pub use error::Error;
pub use ledger::AccessLedger;
pub use policy::{AccessWindow, TimeWindowPolicy};
pub use store::{SqliteStore, StoreError};

use std::sync::Arc;

use axum::{middleware, Router};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

/// Shared application state.
pub struct AppState {
    pub config: Config,
    pub engine: Arc<AuthorizationEngine>,
}

impl AppState {
    pub fn new(config: Config, engine: AuthorizationEngine) -> Self {
        Self {
            config,
            engine: Arc::new(engine),
        }
    }
}

/// Build the HTTP application.
pub fn app(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .merge(routes::health::router())
        .nest("/api/auth", routes::auth::router(state))
        .layer(middleware::from_fn(logging::request_logger))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
}

//! HTTP endpoints invoked by the VPN gateway.

use std::sync::Arc;

use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde_json::{json, Value};
use vpn_gate_common::{
    ClientConnectEvent, ConnectionEvent, ConnectionHandlerResponse, HookResponse, PostureStatus,
};

use crate::state::AppState;

/// POST /pre-auth - client connect handler.
///
/// An event that cannot be read is denied in the gateway schema.
async fn pre_auth(
    State(state): State<Arc<AppState>>,
    event: Result<Json<ClientConnectEvent>, JsonRejection>,
) -> Json<HookResponse> {
    match event {
        Ok(Json(event)) => Json(state.adapter.pre_authenticate(&event).await),
        Err(rejection) => {
            tracing::error!("Rejected connect event: {}", rejection.body_text());
            Json(HookResponse::deny(
                PostureStatus::UnexpectedError,
                "An unexpected error occurred during authentication.",
            ))
        }
    }
}

/// POST /connection - post-connect handler.
async fn connection(
    State(state): State<Arc<AppState>>,
    event: Result<Json<ConnectionEvent>, JsonRejection>,
) -> Json<ConnectionHandlerResponse> {
    match event {
        Ok(Json(event)) => Json(state.adapter.on_connect(&event).await),
        Err(rejection) => {
            tracing::warn!("Unreadable connection event: {}", rejection.body_text());
            Json(ConnectionHandlerResponse { allow: true })
        }
    }
}

/// GET /health - Health check endpoint.
pub async fn health() -> (StatusCode, Json<Value>) {
    (StatusCode::OK, Json(json!({ "status": "ok" })))
}

/// Build the API router.
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/pre-auth", post(pre_auth))
        .route("/connection", post(connection))
        .route("/health", get(health))
        .with_state(state)
}

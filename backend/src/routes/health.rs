use axum::{routing::get, Json, Router};
use chrono::{DateTime, Utc};
use serde::Serialize;

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub service: &'static str,
    pub version: &'static str,
    pub timestamp: DateTime<Utc>,
}

pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        service: "vpn-gate-backend",
        version: env!("CARGO_PKG_VERSION"),
        timestamp: Utc::now(),
    })
}

pub fn router() -> Router {
    Router::new().route("/health", get(health))
}

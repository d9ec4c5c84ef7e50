//! `/api/auth` endpoints: status checks, enrollment and the access log.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::{ConnectInfo, Query, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use vpn_gate_common::{
    AccessLogsResponse, ConnectionLogRequest, ConnectionLogResponse, EnableRequest,
    EnableResponse, SetupRequest, SetupResponse, StatusCheckQuery, StatusCheckResponse,
    StatusErrorCode, VerifyRequest, VerifyResponse,
};

use crate::engine::{DecisionRequest, Source};
use crate::error::{Error, Result};
use crate::routes::health::health;
use crate::AppState;

/// Address of the caller: first `X-Forwarded-For` hop, else the socket peer.
fn peer_ip(headers: &HeaderMap, connect_info: Option<ConnectInfo<SocketAddr>>) -> String {
    headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(String::from)
        .or_else(|| connect_info.map(|ConnectInfo(addr)| addr.ip().to_string()))
        .unwrap_or_else(|| "unknown".to_string())
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

async fn check_status(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    connect_info: Option<ConnectInfo<SocketAddr>>,
    Query(query): Query<StatusCheckQuery>,
) -> Result<Response> {
    let username = query
        .username()
        .ok_or_else(|| Error::InvalidRequest("username is required".to_string()))?
        .to_string();

    let request = DecisionRequest {
        client_ip: non_empty(query.client_ip.clone())
            .unwrap_or_else(|| peer_ip(&headers, connect_info)),
        groups: query.group_names(),
        source: if query.is_automated() {
            Source::Automated
        } else {
            Source::Interactive
        },
        notify: query.send_email(),
        username,
    };

    let timeout = Duration::from_secs(state.config.decision.timeout_secs);
    let engine = state.engine.clone();
    let pending = request.clone();
    let task = tokio::task::spawn_blocking(move || engine.decide(&pending));

    let outcome = match tokio::time::timeout(timeout, task).await {
        Ok(Ok(result)) => result,
        Ok(Err(e)) => Err(Error::Internal(format!("decision task failed: {}", e))),
        Err(_) => {
            tracing::warn!(
                username = %request.username,
                timeout_secs = timeout.as_secs(),
                "Status check timed out"
            );
            return Ok(Json(StatusCheckResponse::failure(
                &request.username,
                StatusErrorCode::ServerTimeout,
                "Status check timed out",
            ))
            .into_response());
        }
    };

    let response = match outcome {
        Ok(decision) => Json(decision.to_status(&request.username)).into_response(),
        Err(e) => {
            tracing::error!(username = %request.username, "Status check failed: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(StatusCheckResponse::failure(
                    &request.username,
                    StatusErrorCode::InternalError,
                    e.to_string(),
                )),
            )
                .into_response()
        }
    };

    Ok(response)
}

async fn setup_2fa(
    State(state): State<Arc<AppState>>,
    Json(request): Json<SetupRequest>,
) -> Result<Json<SetupResponse>> {
    let enrollment = state.engine.setup(request.username.trim())?;

    Ok(Json(SetupResponse {
        success: true,
        qr_code: enrollment.qr_png_base64,
        secret_key: enrollment.secret,
        is_enabled: enrollment.is_enabled,
    }))
}

async fn verify_2fa(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    connect_info: Option<ConnectInfo<SocketAddr>>,
    Json(request): Json<VerifyRequest>,
) -> Result<Json<VerifyResponse>> {
    let client_ip =
        non_empty(request.client_ip).unwrap_or_else(|| peer_ip(&headers, connect_info));
    let valid = state
        .engine
        .verify_and_log(request.username.trim(), &request.token, &client_ip)?;

    let message = if valid {
        "2FA verification succeeded"
    } else {
        "2FA verification failed"
    };
    Ok(Json(VerifyResponse {
        success: valid,
        access_granted: valid,
        message: message.to_string(),
    }))
}

async fn enable_2fa(
    State(state): State<Arc<AppState>>,
    Json(request): Json<EnableRequest>,
) -> Result<Response> {
    if state.engine.enable(request.username.trim(), &request.token)? {
        return Ok(Json(EnableResponse {
            success: true,
            message: "2FA has been enabled".to_string(),
        })
        .into_response());
    }

    Ok((
        StatusCode::BAD_REQUEST,
        Json(EnableResponse {
            success: false,
            message: "Invalid token".to_string(),
        }),
    )
        .into_response())
}

#[derive(Debug, Deserialize)]
struct AccessLogsQuery {
    #[serde(default)]
    limit: Option<usize>,
}

async fn access_logs(
    State(state): State<Arc<AppState>>,
    Query(query): Query<AccessLogsQuery>,
) -> Result<Json<AccessLogsResponse>> {
    let logs = state.engine.access_logs(query.limit)?;

    Ok(Json(AccessLogsResponse {
        success: true,
        logs: logs.into_iter().map(Into::into).collect(),
    }))
}

async fn log_vpn_connection(
    State(state): State<Arc<AppState>>,
    Json(request): Json<ConnectionLogRequest>,
) -> Result<Json<ConnectionLogResponse>> {
    if request.vpn_ip.trim().is_empty() {
        return Err(Error::InvalidRequest("vpn_ip is required".to_string()));
    }
    let logged = state
        .engine
        .log_connection(request.username.trim(), request.vpn_ip.trim())?;

    Ok(Json(ConnectionLogResponse {
        success: true,
        logged,
    }))
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/check-status/", get(check_status))
        .route("/setup-2fa/", post(setup_2fa))
        .route("/verify-2fa/", post(verify_2fa))
        .route("/enable-2fa/", post(enable_2fa))
        .route("/access-logs/", get(access_logs))
        .route("/log-vpn-connection/", post(log_vpn_connection))
        .route("/health/", get(health))
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn test_peer_ip_prefers_forwarded_header() {
        let mut headers = HeaderMap::new();
        headers.insert(
            "x-forwarded-for",
            HeaderValue::from_static("203.0.113.7, 10.0.0.1"),
        );
        let peer = ConnectInfo(SocketAddr::from(([192, 168, 1, 1], 4000)));
        assert_eq!(peer_ip(&headers, Some(peer)), "203.0.113.7");
    }

    #[test]
    fn test_peer_ip_falls_back_to_socket() {
        let peer = ConnectInfo(SocketAddr::from(([192, 168, 1, 1], 4000)));
        assert_eq!(peer_ip(&HeaderMap::new(), Some(peer)), "192.168.1.1");
        assert_eq!(peer_ip(&HeaderMap::new(), None), "unknown");
    }
}

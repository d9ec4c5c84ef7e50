//! Error types for the backend API.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use vpn_gate_common::ApiErrorBody;

use crate::store::StoreError;
use crate::totp::TotpError;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("{0}")]
    NotFound(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Storage error: {0}")]
    Storage(#[from] StoreError),

    #[error("TOTP error: {0}")]
    Totp(#[from] TotpError),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let status = match &self {
            Error::NotFound(_) => StatusCode::NOT_FOUND,
            Error::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            Error::Storage(_) | Error::Totp(_) | Error::Internal(_) => {
                tracing::error!("Request failed: {}", self);
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };

        let body = Json(ApiErrorBody {
            success: false,
            error: self.to_string(),
        });

        (status, body).into_response()
    }
}

pub type Result<T> = std::result::Result<T, Error>;

//! HTTP client for the backend `/api/auth` endpoints.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use vpn_gate_common::{ConnectionLogRequest, StatusCheckQuery, StatusCheckResponse};

use crate::error::{ClientError, Result};

/// The part of the backend the hook depends on.
#[async_trait]
pub trait StatusBackend: Send + Sync {
    async fn check_status(&self, query: &StatusCheckQuery) -> Result<StatusCheckResponse>;

    async fn log_connection(&self, request: &ConnectionLogRequest) -> Result<()>;
}

pub struct BackendClient {
    http_client: Client,
    base_url: String,
}

impl BackendClient {
    /// Every request, body included, is bounded by `timeout`.
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        let http_client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            http_client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl StatusBackend for BackendClient {
    async fn check_status(&self, query: &StatusCheckQuery) -> Result<StatusCheckResponse> {
        let url = format!("{}/check-status/", self.base_url);
        tracing::debug!(url = %url, "Calling backend status API");

        let response = self.http_client.get(&url).query(query).send().await?;

        let status = response.status();
        if status != StatusCode::OK {
            let body = response.text().await.unwrap_or_default();
            tracing::warn!(status = %status.as_u16(), body = %body, "Backend status API error");
            return Err(ClientError::Status(status.as_u16()));
        }

        let body = response.text().await?;
        serde_json::from_str(&body).map_err(|e| ClientError::MalformedResponse(e.to_string()))
    }

    async fn log_connection(&self, request: &ConnectionLogRequest) -> Result<()> {
        let url = format!("{}/log-vpn-connection/", self.base_url);
        let response = self.http_client.post(&url).json(request).send().await?;

        let status = response.status();
        if status != StatusCode::OK {
            return Err(ClientError::Status(status.as_u16()));
        }
        Ok(())
    }
}

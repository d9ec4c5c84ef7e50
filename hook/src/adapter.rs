//! Translation between gateway events and backend status checks.
//!
//! Every failure path denies the connection.

use std::sync::Arc;

use vpn_gate_common::{
    setup_url, ClientConnectEvent, ConnectionEvent, ConnectionHandlerResponse, ConnectionLogRequest,
    HookResponse, PostureStatus, StatusCheckQuery, StatusCheckResponse, StatusErrorCode,
    AUTOMATED_SOURCE,
};

use crate::client::StatusBackend;
use crate::error::ClientError;

pub struct HookAdapter {
    backend: Arc<dyn StatusBackend>,
    redirect_url: String,
    notify: bool,
}

impl HookAdapter {
    pub fn new(backend: Arc<dyn StatusBackend>, redirect_url: &str, notify: bool) -> Self {
        Self {
            backend,
            redirect_url: redirect_url.to_string(),
            notify,
        }
    }

    /// Decide a pre-authentication event.
    pub async fn pre_authenticate(&self, event: &ClientConnectEvent) -> HookResponse {
        let Some(username) = event
            .username
            .as_deref()
            .map(str::trim)
            .filter(|u| !u.is_empty())
        else {
            tracing::warn!("Username not provided in event");
            return HookResponse::deny(PostureStatus::MissingUsername, "No username was provided.");
        };

        let client_ip = event.client_ip();
        tracing::info!(username = %username, client_ip = %client_ip, groups = ?event.groups, "Pre-authentication");

        let query = StatusCheckQuery {
            username: Some(username.to_string()),
            groups: (!event.groups.is_empty()).then(|| event.groups.join(",")),
            client_ip: Some(client_ip.to_string()),
            connection_id: Some(event.connection_id.clone().unwrap_or_default()),
            source: Some(AUTOMATED_SOURCE.to_string()),
            send_email: Some(self.notify.to_string()),
        };

        let result = self.backend.check_status(&query).await;
        let response = self.translate(username, result);
        tracing::info!(
            username = %username,
            allow = response.allow,
            status = ?response.status(),
            "Pre-authentication decided"
        );
        response
    }

    /// Map a status-check outcome onto the gateway schema.
    pub fn translate(
        &self,
        username: &str,
        result: Result<StatusCheckResponse, ClientError>,
    ) -> HookResponse {
        let data = match result {
            Ok(data) => data,
            Err(ClientError::Timeout) => {
                tracing::warn!(username = %username, "Timeout connecting to backend");
                return HookResponse::deny(
                    PostureStatus::ServerTimeout,
                    "The authentication server timed out. Please try again shortly.",
                );
            }
            Err(ClientError::Status(status)) => {
                return HookResponse::deny(
                    PostureStatus::ApiError,
                    format!("Cannot reach the authentication server. (Status: {status})"),
                );
            }
            Err(ClientError::MalformedResponse(e)) => {
                tracing::warn!(username = %username, "Cannot parse backend response: {}", e);
                return HookResponse::deny(
                    PostureStatus::JsonError,
                    "The authentication server response could not be processed.",
                );
            }
            Err(ClientError::Transport(e)) => {
                tracing::error!(username = %username, "Unexpected error calling backend: {}", e);
                return HookResponse::deny(
                    PostureStatus::UnexpectedError,
                    "An unexpected error occurred during authentication.",
                );
            }
        };

        if !data.success {
            tracing::warn!(username = %username, error = ?data.error, code = ?data.error_code, "Backend reported failure");
            if data.error_code == Some(StatusErrorCode::TimeRestriction) {
                return HookResponse::deny(
                    PostureStatus::TimeRestriction,
                    data.error
                        .unwrap_or_else(|| "Access denied by time restriction.".to_string()),
                );
            }
            return HookResponse::deny(
                PostureStatus::ApiResponseError,
                "Cannot determine the authentication status.",
            );
        }

        if data.has_2fa && data.is_enabled {
            return HookResponse::allow();
        }

        if data.requires_setup || !data.is_enabled {
            let link = setup_url(&self.redirect_url, username);
            return HookResponse::deny(
                PostureStatus::RequiresSetup,
                format!(
                    "[2FA required] Open {link} in a browser, finish 2FA setup for {username}, then reconnect the VPN."
                ),
            );
        }

        HookResponse::deny(
            PostureStatus::TwoFactorRequired,
            format!(
                "[2FA required] Open {} in a browser to set up 2FA, then reconnect the VPN.",
                self.redirect_url
            ),
        )
    }

    /// Record an established tunnel. Never blocks the connection.
    pub async fn on_connect(&self, event: &ConnectionEvent) -> ConnectionHandlerResponse {
        let username = event.username.as_deref().unwrap_or_default().trim();
        let vpn_ip = event.vpn_ip.as_deref().unwrap_or_default().trim();
        if username.is_empty() || vpn_ip.is_empty() {
            tracing::warn!("Missing username or VPN IP in connection event");
            return ConnectionHandlerResponse { allow: true };
        }

        let request = ConnectionLogRequest {
            username: username.to_string(),
            vpn_ip: vpn_ip.to_string(),
            public_ip: event.public_ip.clone(),
            connection_id: event.connection_id.clone(),
        };
        match self.backend.log_connection(&request).await {
            Ok(()) => tracing::info!(username = %username, "VPN connection logged"),
            Err(e) => tracing::warn!(username = %username, "Failed to log VPN connection: {}", e),
        }

        ConnectionHandlerResponse { allow: true }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::Mutex;

    /// Backend that answers every status check with a canned result.
    struct CannedBackend {
        answer: Mutex<Option<Result<StatusCheckResponse, ClientError>>>,
        queries: Mutex<Vec<StatusCheckQuery>>,
    }

    impl CannedBackend {
        fn new(answer: Result<StatusCheckResponse, ClientError>) -> Arc<Self> {
            Arc::new(Self {
                answer: Mutex::new(Some(answer)),
                queries: Mutex::new(vec![]),
            })
        }
    }

    #[async_trait]
    impl StatusBackend for CannedBackend {
        async fn check_status(
            &self,
            query: &StatusCheckQuery,
        ) -> Result<StatusCheckResponse, ClientError> {
            self.queries.lock().unwrap().push(query.clone());
            self.answer.lock().unwrap().take().unwrap()
        }

        async fn log_connection(&self, _: &ConnectionLogRequest) -> Result<(), ClientError> {
            Err(ClientError::Status(500))
        }
    }

    fn status(has_2fa: bool, is_enabled: bool, requires_setup: bool) -> StatusCheckResponse {
        StatusCheckResponse {
            success: true,
            username: "alice".to_string(),
            has_2fa,
            is_enabled,
            requires_setup,
            error: None,
            error_code: None,
        }
    }

    fn adapter(backend: Arc<CannedBackend>) -> HookAdapter {
        HookAdapter::new(backend, "https://vpn.example.com", true)
    }

    fn event(username: Option<&str>) -> ClientConnectEvent {
        ClientConnectEvent {
            username: username.map(String::from),
            public_ip: Some("203.0.113.7".to_string()),
            groups: vec!["eng".to_string(), "ops".to_string()],
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_missing_username_denied_without_backend_call() {
        let backend = CannedBackend::new(Ok(status(true, true, false)));
        let response = adapter(backend.clone()).pre_authenticate(&event(None)).await;
        assert!(!response.allow);
        assert_eq!(response.status(), Some(PostureStatus::MissingUsername));
        assert!(backend.queries.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_query_sent_to_backend() {
        let backend = CannedBackend::new(Ok(status(true, true, false)));
        let response = adapter(backend.clone())
            .pre_authenticate(&event(Some("alice")))
            .await;
        assert!(response.allow);

        let queries = backend.queries.lock().unwrap();
        let query = &queries[0];
        assert_eq!(query.username.as_deref(), Some("alice"));
        assert_eq!(query.client_ip.as_deref(), Some("203.0.113.7"));
        assert_eq!(query.groups.as_deref(), Some("eng,ops"));
        assert_eq!(query.source.as_deref(), Some("lambda_vpn_check"));
        assert_eq!(query.send_email.as_deref(), Some("true"));
    }

    #[test]
    fn test_setup_required_links_wizard() {
        let adapter = adapter(CannedBackend::new(Ok(status(false, false, true))));
        let response = adapter.translate("alice", Ok(status(false, false, true)));
        assert_eq!(response.status(), Some(PostureStatus::RequiresSetup));
        assert!(response
            .error_msg_on_failed_posture_compliance
            .contains("https://vpn.example.com?username=alice&action=setup_2fa"));

        // Secret present but never confirmed
        let response = adapter.translate("alice", Ok(status(true, false, false)));
        assert_eq!(response.status(), Some(PostureStatus::RequiresSetup));
    }

    #[test]
    fn test_enabled_without_secret_is_two_factor_required() {
        let adapter = adapter(CannedBackend::new(Ok(status(false, true, false))));
        let response = adapter.translate("alice", Ok(status(false, true, false)));
        assert_eq!(response.status(), Some(PostureStatus::TwoFactorRequired));
    }

    #[test]
    fn test_failures_map_to_statuses() {
        let adapter = adapter(CannedBackend::new(Ok(status(true, true, false))));
        let cases = [
            (ClientError::Timeout, PostureStatus::ServerTimeout),
            (ClientError::Status(502), PostureStatus::ApiError),
            (
                ClientError::MalformedResponse("eof".into()),
                PostureStatus::JsonError,
            ),
            (
                ClientError::Transport("refused".into()),
                PostureStatus::UnexpectedError,
            ),
        ];
        for (error, expected) in cases {
            let response = adapter.translate("alice", Err(error));
            assert!(!response.allow);
            assert_eq!(response.status(), Some(expected));
        }
    }

    #[test]
    fn test_api_error_message_includes_status() {
        let adapter = adapter(CannedBackend::new(Ok(status(true, true, false))));
        let response = adapter.translate("alice", Err(ClientError::Status(503)));
        assert!(response
            .error_msg_on_failed_posture_compliance
            .contains("503"));
    }

    #[test]
    fn test_backend_failure_codes() {
        let adapter = adapter(CannedBackend::new(Ok(status(true, true, false))));

        let restricted = StatusCheckResponse::failure(
            "alice",
            StatusErrorCode::TimeRestriction,
            "outside allowed hours (allowed: 09:00 - 18:00)",
        );
        let response = adapter.translate("alice", Ok(restricted));
        assert_eq!(response.status(), Some(PostureStatus::TimeRestriction));
        assert_eq!(
            response.error_msg_on_failed_posture_compliance,
            "outside allowed hours (allowed: 09:00 - 18:00)"
        );

        let timeout =
            StatusCheckResponse::failure("alice", StatusErrorCode::ServerTimeout, "timed out");
        let response = adapter.translate("alice", Ok(timeout));
        assert_eq!(response.status(), Some(PostureStatus::ApiResponseError));
    }

    #[tokio::test]
    async fn test_connection_handler_always_allows() {
        let adapter = adapter(CannedBackend::new(Ok(status(true, true, false))));
        let event = ConnectionEvent {
            username: Some("alice".to_string()),
            vpn_ip: Some("172.16.0.5".to_string()),
            ..Default::default()
        };
        assert!(adapter.on_connect(&event).await.allow);
        assert!(adapter.on_connect(&ConnectionEvent::default()).await.allow);
    }
}

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};
use vpn_gate_common::setup_url;

use super::{Notifier, NotifyError};

/// Posts setup reminders to a Slack incoming webhook.
pub struct SlackNotifier {
    http_client: Client,
    webhook_url: String,
    setup_base_url: String,
}

impl SlackNotifier {
    pub fn new(
        webhook_url: &str,
        setup_base_url: &str,
        timeout: Duration,
    ) -> Result<Self, NotifyError> {
        let http_client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            http_client,
            webhook_url: webhook_url.to_string(),
            setup_base_url: setup_base_url.to_string(),
        })
    }

    fn message(&self, username: &str) -> Value {
        let link = setup_url(&self.setup_base_url, username);
        json!({
            "text": "VPN 2FA setup required",
            "blocks": [
                {
                    "type": "header",
                    "text": { "type": "plain_text", "text": "AWS VPN two-factor setup required" }
                },
                {
                    "type": "section",
                    "text": {
                        "type": "mrkdwn",
                        "text": format!(
                            "*User:* `{username}`\n*Status:* VPN connection attempt blocked, 2FA is not set up"
                        )
                    }
                },
                {
                    "type": "section",
                    "text": { "type": "mrkdwn", "text": "Set up 2FA with the link below to connect:" }
                },
                {
                    "type": "actions",
                    "elements": [{
                        "type": "button",
                        "text": { "type": "plain_text", "text": "Set up 2FA" },
                        "url": link,
                        "style": "primary"
                    }]
                }
            ]
        })
    }
}

#[async_trait]
impl Notifier for SlackNotifier {
    async fn notify_setup_required(&self, username: &str) -> Result<(), NotifyError> {
        let response = self
            .http_client
            .post(&self.webhook_url)
            .json(&self.message(username))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(NotifyError::Rejected(status.as_u16()));
        }

        tracing::info!(username = %username, "Sent 2FA setup reminder");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_string_contains, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn notifier(server: &MockServer) -> SlackNotifier {
        SlackNotifier::new(
            &format!("{}/hook", server.uri()),
            "https://vpn.example.com",
            Duration::from_secs(2),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_posts_setup_link() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/hook"))
            .and(body_string_contains(
                "https://vpn.example.com?username=alice&action=setup_2fa",
            ))
            .respond_with(ResponseTemplate::new(200).set_body_string("ok"))
            .expect(1)
            .mount(&server)
            .await;

        notifier(&server).notify_setup_required("alice").await.unwrap();
    }

    #[tokio::test]
    async fn test_rejected_webhook_is_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(403))
            .mount(&server)
            .await;

        let result = notifier(&server).notify_setup_required("alice").await;
        assert!(matches!(result, Err(NotifyError::Rejected(403))));
    }

    #[tokio::test]
    async fn test_unreachable_webhook_is_error() {
        let notifier = SlackNotifier::new(
            "http://127.0.0.1:9/hook",
            "https://vpn.example.com",
            Duration::from_millis(500),
        )
        .unwrap();
        let result = notifier.notify_setup_required("alice").await;
        assert!(matches!(result, Err(NotifyError::Request(_))));
    }
}

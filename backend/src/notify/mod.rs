//! Out-of-band notifications sent when a user still has to enroll in 2FA.

mod slack;

pub use slack::SlackNotifier;

use async_trait::async_trait;

#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
    #[error("Notifier not configured")]
    NotConfigured,
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("Webhook rejected message with status {0}")]
    Rejected(u16),
}

/// Delivers "2FA setup required" reminders.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify_setup_required(&self, username: &str) -> Result<(), NotifyError>;
}

/// Notifier used when no webhook is configured.
#[derive(Debug, Default)]
pub struct NoopNotifier;

#[async_trait]
impl Notifier for NoopNotifier {
    async fn notify_setup_required(&self, username: &str) -> Result<(), NotifyError> {
        tracing::debug!(username = %username, "No notifier configured, skipping setup reminder");
        Err(NotifyError::NotConfigured)
    }
}

//! Outbound notices (currently: invitations).
//!
//! Delivery is fire-and-forget. A failed send is logged and never fails the
//! operation that triggered it.

use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{info, warn};
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum NotifierError {
    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Send error: {0}")]
    SendFailed(String),
}

/// Invitation notice handed to the notifier.
#[derive(Debug, Clone, Serialize)]
pub struct InvitationNotice {
    pub invitation_id: Uuid,
    pub organization_id: Uuid,
    pub organization_name: String,
    pub email: String,
    pub role: String,
    pub token: String,
    pub expires_at: chrono::DateTime<chrono::Utc>,
}

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send_invitation(&self, notice: &InvitationNotice) -> Result<(), NotifierError>;

    fn name(&self) -> &'static str;
}

/// POSTs notices as JSON to a configured webhook.
pub struct WebhookNotifier {
    url: String,
    client: Client,
}

#[derive(Serialize)]
struct WebhookPayload<'a> {
    event: &'static str,
    data: &'a InvitationNotice,
}

impl WebhookNotifier {
    pub fn new(url: String) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .unwrap_or_else(|_| Client::new());
        Self { url, client }
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    async fn send_invitation(&self, notice: &InvitationNotice) -> Result<(), NotifierError> {
        let response = self
            .client
            .post(&self.url)
            .json(&WebhookPayload {
                event: "organization.invitation",
                data: notice,
            })
            .send()
            .await
            .map_err(|e| NotifierError::Connection(e.to_string()))?;

        if !response.status().is_success() {
            return Err(NotifierError::SendFailed(format!(
                "webhook returned {}",
                response.status()
            )));
        }

        Ok(())
    }

    fn name(&self) -> &'static str {
        "webhook"
    }
}

/// Logs notices. Used when no webhook is configured.
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn send_invitation(&self, notice: &InvitationNotice) -> Result<(), NotifierError> {
        info!(
            invitation_id = %notice.invitation_id,
            organization_id = %notice.organization_id,
            email = %notice.email,
            role = %notice.role,
            "Invitation issued"
        );
        Ok(())
    }

    fn name(&self) -> &'static str {
        "log"
    }
}

/// Pick the notifier for the configured webhook, if any.
pub fn from_webhook_url(url: Option<&str>) -> Arc<dyn Notifier> {
    match url {
        Some(url) => Arc::new(WebhookNotifier::new(url.to_string())),
        None => Arc::new(LogNotifier),
    }
}

/// Send in the background.
pub fn dispatch_invitation(notifier: Arc<dyn Notifier>, notice: InvitationNotice) {
    tokio::spawn(async move {
        if let Err(e) = notifier.send_invitation(&notice).await {
            warn!(
                notifier = notifier.name(),
                invitation_id = %notice.invitation_id,
                error = %e,
                "Failed to deliver invitation notice"
            );
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn webhook_url_selects_notifier() {
        assert_eq!(from_webhook_url(None).name(), "log");
        assert_eq!(
            from_webhook_url(Some("http://localhost:9/hooks")).name(),
            "webhook"
        );
    }

    #[tokio::test]
    async fn unreachable_webhook_reports_connection_error() {
        let notifier = WebhookNotifier::new("http://127.0.0.1:9/hooks".to_string());
        let notice = InvitationNotice {
            invitation_id: Uuid::new_v4(),
            organization_id: Uuid::new_v4(),
            organization_name: "Acme".to_string(),
            email: "a@example.com".to_string(),
            role: "admin".to_string(),
            token: "t".to_string(),
            expires_at: chrono::Utc::now(),
        };
        assert!(matches!(
            notifier.send_invitation(&notice).await,
            Err(NotifierError::Connection(_))
        ));
    }
}

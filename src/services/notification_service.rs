use async_trait::async_trait;
use reqwest::Client;
use serde_json::json;
use std::sync::Arc;

use crate::error::{Error, Result};

/// Outbound message channel (email relay, chat bot, ...). Best effort by contract.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait NotificationSink: Send + Sync {
    async fn send(&self, to: &str, subject: &str, body: &str) -> Result<()>;
}

/// Posts each message as JSON to a relay that owns the actual delivery.
#[derive(Clone)]
pub struct WebhookNotifier {
    client: Client,
    target_url: String,
}

impl WebhookNotifier {
    pub fn new(client: Client, target_url: String) -> Self {
        Self { client, target_url }
    }
}

#[async_trait]
impl NotificationSink for WebhookNotifier {
    async fn send(&self, to: &str, subject: &str, body: &str) -> Result<()> {
        let resp = self
            .client
            .post(&self.target_url)
            .json(&json!({ "to": to, "subject": subject, "body": body }))
            .send()
            .await?;
        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            return Err(Error::Internal(format!(
                "notification relay answered {}: {}",
                status, text
            )));
        }
        Ok(())
    }
}

/// Used when no relay is configured.
#[derive(Clone, Copy, Default)]
pub struct LogNotifier;

#[async_trait]
impl NotificationSink for LogNotifier {
    async fn send(&self, to: &str, subject: &str, _body: &str) -> Result<()> {
        tracing::info!(to, subject, "notification relay not configured; message dropped");
        Ok(())
    }
}

/// Fire-and-forget delivery. Never blocks the caller and never surfaces a failure.
pub fn dispatch(sink: Arc<dyn NotificationSink>, to: String, subject: String, body: String) {
    tokio::spawn(async move {
        if let Err(e) = sink.send(&to, &subject, &body).await {
            tracing::warn!(error = ?e, to = %to, subject = %subject, "notification delivery failed");
        }
    });
}

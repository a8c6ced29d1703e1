//! Best-effort JSON delivery to the webhook. Outcomes only reach the log.

use async_trait::async_trait;
use serde_json::Value;
use tracing::{debug, error, warn};

#[async_trait]
pub trait DeliverySink: Send + Sync {
    /// Never fails; delivery problems are logged.
    async fn send(&self, url: &str, payload: &Value);
}

#[derive(Clone, Default)]
pub struct WebhookSink {
    client: reqwest::Client,
}

impl WebhookSink {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl DeliverySink for WebhookSink {
    async fn send(&self, url: &str, payload: &Value) {
        match self.client.post(url).json(payload).send().await {
            Ok(resp) if resp.status().is_success() => debug!("Webhook sent successfully"),
            Ok(resp) => warn!(
                status = %resp.status(),
                "Webhook POST failed with status {}",
                resp.status()
            ),
            Err(e) => error!("Webhook POST error: {e}"),
        }
    }
}

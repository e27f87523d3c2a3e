// Outbound message channels
// Decision: One HTTP channel for production plus a logging channel for dev
// mode, selected at startup from configuration.

use anyhow::{Context, Result};
use async_trait::async_trait;
use palaver_core::OutboundChannel;
use serde_json::json;
use tracing::{debug, info};

/// Delivers replies through the messaging provider's send endpoint
pub struct HttpOutboundChannel {
    client: reqwest::Client,
    send_url: String,
}

impl HttpOutboundChannel {
    pub fn new(client: reqwest::Client, send_url: String) -> Self {
        Self { client, send_url }
    }
}

#[async_trait]
impl OutboundChannel for HttpOutboundChannel {
    async fn send(&self, recipient: &str, text: &str) -> Result<()> {
        let body = json!({
            "to": recipient,
            "text": text,
        });
        self.client
            .post(&self.send_url)
            .json(&body)
            .send()
            .await
            .context("Outbound send request failed")?
            .error_for_status()
            .context("Outbound send rejected")?;
        debug!(recipient = %recipient, "Outbound message delivered");
        Ok(())
    }
}

/// Dev-mode channel: logs instead of delivering
pub struct LoggingChannel;

#[async_trait]
impl OutboundChannel for LoggingChannel {
    async fn send(&self, recipient: &str, text: &str) -> Result<()> {
        info!(recipient = %recipient, text = %text, "Outbound message (dev mode, not delivered)");
        Ok(())
    }
}

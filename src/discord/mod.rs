//! # Discord Webhook Integration
//!
//! Outbound notification transport: posts plain-content messages to a
//! Discord webhook. Gracefully disables itself when no webhook URL is
//! configured, so the rest of the pipeline keeps working.

use anyhow::Result;
use async_trait::async_trait;
use reqwest::Client;
use tracing::{info, warn};

use crate::models::DiscordMessage;
use crate::traits::Notify;

pub struct DiscordNotifier {
    /// Reusable HTTP client; connection pooling is handled by reqwest.
    client: Client,
    /// If `None`, every send is skipped with a warning log.
    webhook_url: Option<String>,
}

impl DiscordNotifier {
    pub fn new(webhook_url: Option<String>) -> Self {
        if webhook_url.is_none() {
            warn!("DISCORD_WEBHOOK_URL not set - Discord notifications will be disabled");
        }

        Self {
            client: Client::new(),
            webhook_url,
        }
    }
}

#[async_trait]
impl Notify for DiscordNotifier {
    /// Post `text` as the message content. Returns `Err` on transport
    /// failure or a non-success response, so callers know delivery was not
    /// confirmed.
    async fn send(&self, text: &str) -> Result<()> {
        // Delivery cannot be confirmed without a webhook, so this must be
        // an error: sent-flags stay unset and the batch is retried once a
        // webhook is configured.
        let Some(webhook_url) = &self.webhook_url else {
            warn!("Discord not configured, dropping notification");
            return Err(anyhow::anyhow!("Discord webhook not configured"));
        };

        let message = DiscordMessage {
            content: text.to_string(),
        };

        let response = self.client.post(webhook_url).json(&message).send().await?;
        response.error_for_status_ref()?;

        info!("Payload delivered successfully, code {}", response.status());
        Ok(())
    }
}

impl Clone for DiscordNotifier {
    fn clone(&self) -> Self {
        Self {
            client: self.client.clone(),
            webhook_url: self.webhook_url.clone(),
        }
    }
}

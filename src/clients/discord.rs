//! Minimal Discord webhook client used for watch notifications.

use anyhow::{Result, anyhow, bail};
use serde_json::json;
use std::time::Duration;

/// Discord truncates messages above 2000 characters; callers format below
/// this limit.
pub const MAX_MESSAGE_LENGTH: usize = 2000;

#[derive(Clone)]
pub struct DiscordWebhookClient {
    client: reqwest::Client,
    webhook_url: String,
}

impl DiscordWebhookClient {
    pub fn new(webhook_url: impl Into<String>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .user_agent(concat!("Miharr/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| anyhow!("Failed to build HTTP client: {e}"))?;

        Ok(Self {
            client,
            webhook_url: webhook_url.into(),
        })
    }

    pub async fn send_message(&self, content: &str) -> Result<()> {
        let response = self
            .client
            .post(&self.webhook_url)
            .json(&json!({ "content": content }))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            bail!("Webhook returned status {status}");
        }
        Ok(())
    }
}

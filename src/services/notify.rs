//! Notifier implementations for delivering sweep results.

use async_trait::async_trait;
use std::fmt::Write as _;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::warn;

use crate::clients::discord::{DiscordWebhookClient, MAX_MESSAGE_LENGTH};
use crate::domain::OwnerId;
use crate::domain::events::WatchEvent;
use crate::services::watcher::{WatchChange, WatchNotifier};

const MAX_TITLES_PER_WATCH: usize = 5;
const MAX_TITLE_LENGTH: usize = 120;

fn ellipsis(text: &str, max_length: usize) -> String {
    if text.chars().count() <= max_length {
        return text.to_string();
    }
    let mut truncated: String = text.chars().take(max_length.saturating_sub(3)).collect();
    truncated.push_str("...");
    truncated
}

/// Publishes one `WatchUpdated` event per changed watch on the broadcast
/// bus. A bus without subscribers is not an error.
pub struct EventBusNotifier {
    bus: broadcast::Sender<WatchEvent>,
}

impl EventBusNotifier {
    #[must_use]
    pub const fn new(bus: broadcast::Sender<WatchEvent>) -> Self {
        Self { bus }
    }
}

#[async_trait]
impl WatchNotifier for EventBusNotifier {
    async fn notify(&self, owner_id: &OwnerId, changes: &[WatchChange]) -> anyhow::Result<()> {
        for change in changes {
            let titles = change
                .new_items
                .iter()
                .take(MAX_TITLES_PER_WATCH)
                .map(|item| ellipsis(&item.title, MAX_TITLE_LENGTH))
                .collect();

            let _ = self.bus.send(WatchEvent::WatchUpdated {
                owner_id: owner_id.to_string(),
                watch_id: change.watch.id.to_string(),
                query: change.watch.query.clone(),
                new_items: change.new_items.len(),
                titles,
            });
        }
        Ok(())
    }
}

/// Posts one webhook message per owner summarizing the batch.
pub struct DiscordNotifier {
    client: DiscordWebhookClient,
}

impl DiscordNotifier {
    #[must_use]
    pub const fn new(client: DiscordWebhookClient) -> Self {
        Self { client }
    }

    fn format_batch(owner_id: &OwnerId, changes: &[WatchChange]) -> String {
        let total: usize = changes.iter().map(|c| c.new_items.len()).sum();
        let mut message = format!(
            "<@{owner_id}> {total} new result{} across {} watch{}:\n",
            if total == 1 { "" } else { "s" },
            changes.len(),
            if changes.len() == 1 { "" } else { "es" },
        );

        for change in changes {
            let _ = writeln!(
                message,
                "**{}** ({} new)",
                change.watch.query,
                change.new_items.len()
            );
            for item in change.new_items.iter().take(MAX_TITLES_PER_WATCH) {
                let _ = writeln!(message, "- {}", ellipsis(&item.title, MAX_TITLE_LENGTH));
            }
            let remaining = change.new_items.len().saturating_sub(MAX_TITLES_PER_WATCH);
            if remaining > 0 {
                let _ = writeln!(message, "- ...and {remaining} more");
            }
        }

        // Leave headroom below the hard limit for the trailing marker.
        ellipsis(&message, MAX_MESSAGE_LENGTH - 10)
    }
}

#[async_trait]
impl WatchNotifier for DiscordNotifier {
    async fn notify(&self, owner_id: &OwnerId, changes: &[WatchChange]) -> anyhow::Result<()> {
        let message = Self::format_batch(owner_id, changes);
        self.client.send_message(&message).await
    }
}

/// Drives a list of notifiers, attempting every one even when some fail.
pub struct FanoutNotifier {
    notifiers: Vec<Arc<dyn WatchNotifier>>,
}

impl FanoutNotifier {
    #[must_use]
    pub fn new(notifiers: Vec<Arc<dyn WatchNotifier>>) -> Self {
        Self { notifiers }
    }
}

#[async_trait]
impl WatchNotifier for FanoutNotifier {
    async fn notify(&self, owner_id: &OwnerId, changes: &[WatchChange]) -> anyhow::Result<()> {
        for notifier in &self.notifiers {
            if let Err(e) = notifier.notify(owner_id, changes).await {
                warn!(owner = %owner_id, error = %e, "Notifier failed");
            }
        }
        Ok(())
    }
}

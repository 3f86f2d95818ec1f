//! Outbound side of the messaging front end.

use async_trait::async_trait;

use crate::error::{LinkTrackerError, Result};
use crate::types::{SubscriberId, UpdateEvent};

#[async_trait]
pub trait Messenger: Send + Sync {
    fn name(&self) -> &str;

    /// Send `text` to one subscriber.
    async fn deliver(&self, subscriber: SubscriberId, text: &str) -> Result<()>;

    /// Fan an update out to every subscriber of the event.
    ///
    /// Every recipient is attempted; failures are reported together.
    async fn post_update(&self, event: &UpdateEvent, text: &str) -> Result<()> {
        let mut failed = Vec::new();
        for subscriber in &event.subscribers {
            if let Err(e) = self.deliver(*subscriber, text).await {
                tracing::warn!("⚠️ {} delivery to {} failed: {e}", self.name(), subscriber);
                failed.push(subscriber.to_string());
            }
        }
        if failed.is_empty() {
            Ok(())
        } else {
            Err(LinkTrackerError::Channel(format!(
                "update for {} not delivered to: {}",
                event.link.url,
                failed.join(", ")
            )))
        }
    }
}

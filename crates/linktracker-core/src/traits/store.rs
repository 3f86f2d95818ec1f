//! Storage collaborator traits. Implementations own their synchronisation.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::Result;
use crate::types::{ConversationState, LinkId, SubscriberId, TrackedLink, Watermark};

/// Scan-side view of the tracked links.
#[async_trait]
pub trait LinkStore: Send + Sync {
    /// Up to `limit` links strictly after `after`, ordered by `(updated_at, id)`.
    async fn page_links_after(&self, after: &Watermark, limit: usize) -> Result<Vec<TrackedLink>>;

    /// Store a newer timestamp. Returns `false` (and writes nothing) unless
    /// `at` is strictly later than the stored value.
    async fn update_timestamp(&self, link: LinkId, at: DateTime<Utc>) -> Result<bool>;

    /// Every subscriber currently tracking `link`.
    async fn subscribers_of(&self, link: LinkId) -> Result<Vec<SubscriberId>>;
}

/// Subscriber registration and per-subscriber link management.
#[async_trait]
pub trait SubscriptionStore: Send + Sync {
    /// Returns `true` when the subscriber was newly created.
    async fn register_subscriber(&self, subscriber: SubscriberId) -> Result<bool>;

    /// Deletes the subscriber together with its subscriptions. Links left
    /// without subscribers are deleted too.
    async fn remove_subscriber(&self, subscriber: SubscriberId) -> Result<()>;

    /// Subscribe to `link.url` with `link`'s tags and filters. Fails with
    /// `Conflict` when the subscriber already tracks that URL.
    async fn add_subscription(&self, subscriber: SubscriberId, link: &TrackedLink) -> Result<TrackedLink>;

    /// Fails with `NotFound` when the subscriber does not track `url`.
    async fn remove_subscription(&self, subscriber: SubscriberId, url: &str) -> Result<TrackedLink>;

    async fn list_subscriptions(&self, subscriber: SubscriberId) -> Result<Vec<TrackedLink>>;

    /// Replace the tags and filters of the subscription to `link.url`.
    async fn update_subscription(&self, subscriber: SubscriberId, link: &TrackedLink) -> Result<()>;
}

/// Per-subscriber dialogue state.
#[async_trait]
pub trait StateStore: Send + Sync {
    /// Fails with `Conflict` when a record exists.
    async fn create_state(&self, subscriber: SubscriberId, state: &ConversationState) -> Result<()>;

    async fn get_state(&self, subscriber: SubscriberId) -> Result<Option<ConversationState>>;

    /// Fails with `NotFound` when no record exists.
    async fn update_state(&self, subscriber: SubscriberId, state: &ConversationState) -> Result<()>;

    /// Deleting an absent record is not an error.
    async fn delete_state(&self, subscriber: SubscriberId) -> Result<()>;
}

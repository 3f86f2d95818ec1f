//! Conversation bot: runs the state machine for one subscriber at a time.
//!
//! Load state, compute the transition, execute its effect, persist the next
//! state. Store failures end the dialogue with a generic error reply; they
//! never escape `handle`.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use linktracker_core::error::{LinkTrackerError, Result};
use linktracker_core::traits::{MessageHandler, StateStore, SubscriptionStore};
use linktracker_core::types::{ConversationState, DraftLink, IncomingMessage, SubscriberId, TrackedLink};
use linktracker_sources::SourceRegistry;

use crate::replies;
use crate::state_machine::{Effect, Transition, transition};

pub struct ConversationBot {
    subscriptions: Arc<dyn SubscriptionStore>,
    states: Arc<dyn StateStore>,
    sources: SourceRegistry,
}

impl ConversationBot {
    pub fn new(
        subscriptions: Arc<dyn SubscriptionStore>,
        states: Arc<dyn StateStore>,
        sources: SourceRegistry,
    ) -> Self {
        Self {
            subscriptions,
            states,
            sources,
        }
    }

    /// Run `effect`. Returns the reply and the state to persist, which is
    /// `next` unless the effect ends the dialogue early.
    async fn execute(
        &self,
        subscriber: SubscriberId,
        effect: Effect,
        next: ConversationState,
    ) -> (String, ConversationState) {
        let reply = match effect {
            Effect::Reply(text) => text,
            Effect::Silent => String::new(),

            Effect::Register => match self.subscriptions.register_subscriber(subscriber).await {
                Ok(true) => {
                    tracing::info!("👤 Subscriber {subscriber} registered");
                    replies::WELCOME.into()
                }
                Ok(false) => replies::WELCOME_BACK.into(),
                Err(e) => failure(subscriber, "register", &e),
            },

            Effect::Deregister => match self.subscriptions.remove_subscriber(subscriber).await {
                Ok(()) => {
                    tracing::info!("👤 Subscriber {subscriber} removed");
                    replies::GOODBYE.into()
                }
                Err(e) if e.is_not_found() => replies::NOT_REGISTERED.into(),
                Err(e) => failure(subscriber, "deregister", &e),
            },

            Effect::List => match self.subscriptions.list_subscriptions(subscriber).await {
                Ok(links) => replies::link_list(&links),
                Err(e) => failure(subscriber, "list", &e),
            },

            Effect::Commit(draft) => self.commit(subscriber, draft).await,

            Effect::Untrack(url) => match self.subscriptions.remove_subscription(subscriber, &url).await {
                Ok(link) => {
                    tracing::info!("🗑️ {subscriber} stopped tracking {}", link.url);
                    replies::untracked(&link.url)
                }
                Err(e) if e.is_not_found() => replies::not_tracking(&url),
                Err(e) => failure(subscriber, "untrack", &e),
            },

            Effect::SelectTagTarget(url) => match self.find_subscription(subscriber, &url).await {
                Ok(Some(_)) => replies::TAG_VALUE_PROMPT.into(),
                Ok(None) => return (replies::not_tracking(&url), ConversationState::idle()),
                Err(e) => return (failure(subscriber, "select tag target", &e), ConversationState::idle()),
            },

            Effect::ReplaceTags { url, tags } => match self.find_subscription(subscriber, &url).await {
                Ok(Some(mut link)) => {
                    link.tags = tags;
                    match self.subscriptions.update_subscription(subscriber, &link).await {
                        Ok(()) => replies::tags_updated(&url),
                        Err(e) if e.is_not_found() => replies::not_tracking(&url),
                        Err(e) => failure(subscriber, "replace tags", &e),
                    }
                }
                Ok(None) => replies::not_tracking(&url),
                Err(e) => failure(subscriber, "replace tags", &e),
            },
        };
        (reply, next)
    }

    async fn commit(&self, subscriber: SubscriberId, draft: DraftLink) -> String {
        let Some(url) = draft.url else {
            let e = LinkTrackerError::Validation("draft has no link".into());
            return failure(subscriber, "track", &e);
        };
        let link = TrackedLink {
            id: 0,
            url,
            tags: draft.tags,
            filters: draft.filters,
            updated_at: Utc::now(),
        };
        match self.subscriptions.add_subscription(subscriber, &link).await {
            Ok(stored) => {
                tracing::info!("🔗 {subscriber} now tracks {} (link {})", stored.url, stored.id);
                replies::now_tracking(&stored.url)
            }
            Err(e) if e.is_conflict() => replies::already_tracking(&link.url),
            Err(e) => failure(subscriber, "track", &e),
        }
    }

    async fn find_subscription(&self, subscriber: SubscriberId, url: &str) -> Result<Option<TrackedLink>> {
        let links = self.subscriptions.list_subscriptions(subscriber).await?;
        Ok(links.into_iter().find(|l| l.url == url))
    }

    /// Idle is stored as "no record".
    async fn persist(&self, subscriber: SubscriberId, existed: bool, next: &ConversationState) -> Result<()> {
        match (existed, next.is_idle()) {
            (false, true) => Ok(()),
            (true, true) => self.states.delete_state(subscriber).await,
            (true, false) => self.states.update_state(subscriber, next).await,
            (false, false) => self.states.create_state(subscriber, next).await,
        }
    }
}

#[async_trait]
impl MessageHandler for ConversationBot {
    async fn handle(&self, message: &IncomingMessage) -> String {
        let subscriber = message.subscriber;
        let stored = match self.states.get_state(subscriber).await {
            Ok(stored) => stored,
            Err(e) => return failure(subscriber, "load state", &e),
        };
        let existed = stored.is_some();
        let current = stored.unwrap_or_default();

        let Transition { next, effect } = transition(&current, &message.text, &self.sources);
        tracing::debug!("💬 {subscriber}: {} → {} ({effect:?})", current.step, next.step);

        let (reply, next) = self.execute(subscriber, effect, next).await;
        match self.persist(subscriber, existed, &next).await {
            Ok(()) => reply,
            Err(e) => {
                // Best effort reset so the next message starts clean.
                self.states.delete_state(subscriber).await.ok();
                failure(subscriber, "save state", &e)
            }
        }
    }
}

fn failure(subscriber: SubscriberId, action: &str, error: &LinkTrackerError) -> String {
    tracing::warn!("⚠️ {action} failed for {subscriber}: {error}");
    replies::GENERIC_ERROR.into()
}

#[cfg(test)]
mod tests {
    use super::*;
    use linktracker_core::config::LinkTrackerConfig;
    use linktracker_core::types::DialogStep;
    use linktracker_db::SqliteStore;

    fn bot() -> (ConversationBot, Arc<SqliteStore>) {
        let store = Arc::new(SqliteStore::open_in_memory().unwrap());
        let sources = SourceRegistry::from_config(&LinkTrackerConfig::default()).unwrap();
        (ConversationBot::new(store.clone(), store.clone(), sources), store)
    }

    async fn say(bot: &ConversationBot, subscriber: i64, texts: &[&str]) -> Vec<String> {
        let mut out = Vec::new();
        for text in texts {
            out.push(bot.handle(&IncomingMessage::new(subscriber, *text)).await);
        }
        out
    }

    const TRACK_WIDGET: [&str; 4] = ["/track", "https://github.com/acme/widget", "-", "-"];

    #[tokio::test]
    async fn test_track_flow_creates_subscription() {
        let (bot, store) = bot();

        let out = say(&bot, 42, &TRACK_WIDGET).await;
        assert_eq!(
            out,
            vec![
                replies::LINK_PROMPT.to_string(),
                replies::TAGS_PROMPT.to_string(),
                replies::FILTERS_PROMPT.to_string(),
                replies::now_tracking("https://github.com/acme/widget"),
            ]
        );

        let links = store.list_subscriptions(SubscriberId(42)).await.unwrap();
        assert_eq!(links.len(), 1);
        assert_eq!(links[0].url, "https://github.com/acme/widget");
        assert!(links[0].tags.is_empty() && links[0].filters.is_empty());
        assert_eq!(store.get_state(SubscriberId(42)).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_repeated_track_is_already_tracking() {
        let (bot, store) = bot();
        say(&bot, 42, &TRACK_WIDGET).await;

        let out = say(&bot, 42, &TRACK_WIDGET).await;
        assert_eq!(out[3], replies::already_tracking("https://github.com/acme/widget"));
        assert_eq!(store.list_subscriptions(SubscriberId(42)).await.unwrap().len(), 1);
        assert_eq!(store.link_count().unwrap(), 1);
    }

    #[tokio::test]
    async fn test_www_and_http_variants_are_one_link() {
        let (bot, store) = bot();
        say(&bot, 42, &TRACK_WIDGET).await;

        for variant in ["https://www.github.com/acme/widget", "http://github.com/acme/widget/"] {
            let out = say(&bot, 42, &["/track", variant, "-", "-"]).await;
            assert_eq!(out[3], replies::already_tracking("https://github.com/acme/widget"));
        }
        assert_eq!(store.list_subscriptions(SubscriberId(42)).await.unwrap().len(), 1);
        assert_eq!(store.link_count().unwrap(), 1);
    }

    #[tokio::test]
    async fn test_unsupported_link_resets_dialogue() {
        let (bot, store) = bot();

        let out = say(&bot, 7, &["/track", "https://example.com/not-supported", "hello"]).await;
        assert_eq!(out[1], replies::FORMAT_HELP);
        assert_eq!(out[2], "");
        assert_eq!(store.get_state(SubscriberId(7)).await.unwrap(), None);
        assert!(store.list_subscriptions(SubscriberId(7)).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_dialogue_state_is_persisted_between_messages() {
        let (bot, store) = bot();
        say(&bot, 5, &["/track", "https://stackoverflow.com/questions/42"]).await;

        let state = store.get_state(SubscriberId(5)).await.unwrap().unwrap();
        assert_eq!(state.step, DialogStep::AwaitingTags);
        assert_eq!(state.draft.url.as_deref(), Some("https://stackoverflow.com/questions/42"));
    }

    #[tokio::test]
    async fn test_list_groups_tags() {
        let (bot, _) = bot();
        say(&bot, 1, &["/track", "https://github.com/acme/widget", "rust", "-"]).await;
        say(&bot, 1, &["/track", "https://stackoverflow.com/questions/9", "-", "-"]).await;

        let list = bot.handle(&IncomingMessage::new(1, "/list")).await;
        assert!(list.contains("#rust\n• https://github.com/acme/widget"));
        assert!(list.contains("untagged\n• https://stackoverflow.com/questions/9"));
    }

    #[tokio::test]
    async fn test_untrack() {
        let (bot, store) = bot();
        say(&bot, 1, &TRACK_WIDGET).await;

        let out = say(&bot, 1, &["/untrack", "https://github.com/acme/widget/"]).await;
        assert_eq!(out[1], replies::untracked("https://github.com/acme/widget"));
        assert!(store.list_subscriptions(SubscriberId(1)).await.unwrap().is_empty());

        let out = say(&bot, 1, &["/untrack", "https://github.com/acme/widget"]).await;
        assert_eq!(out[1], replies::not_tracking("https://github.com/acme/widget"));
        assert_eq!(store.get_state(SubscriberId(1)).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_tag_edit_keeps_filters() {
        let (bot, store) = bot();
        say(&bot, 1, &["/track", "https://github.com/acme/widget", "old", "f1 f2"]).await;

        let out = say(&bot, 1, &["/tags", "https://github.com/acme/widget", "new shiny"]).await;
        assert_eq!(out[1], replies::TAG_VALUE_PROMPT);
        assert_eq!(out[2], replies::tags_updated("https://github.com/acme/widget"));

        let link = &store.list_subscriptions(SubscriberId(1)).await.unwrap()[0];
        assert_eq!(link.tags.iter().collect::<Vec<_>>(), vec!["new", "shiny"]);
        assert_eq!(link.filters.iter().collect::<Vec<_>>(), vec!["f1", "f2"]);
    }

    #[tokio::test]
    async fn test_tag_edit_of_untracked_link_ends_dialogue() {
        let (bot, store) = bot();

        let out = say(&bot, 1, &["/tags", "https://github.com/acme/widget"]).await;
        assert_eq!(out[1], replies::not_tracking("https://github.com/acme/widget"));
        assert_eq!(store.get_state(SubscriberId(1)).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_start_cancel_and_stop() {
        let (bot, store) = bot();

        assert_eq!(say(&bot, 3, &["/start"]).await[0], replies::WELCOME);
        assert_eq!(say(&bot, 3, &["/start"]).await[0], replies::WELCOME_BACK);

        let out = say(&bot, 3, &["/track", "/cancel"]).await;
        assert_eq!(out[1], replies::CANCELLED);
        assert_eq!(store.get_state(SubscriberId(3)).await.unwrap(), None);

        say(&bot, 3, &TRACK_WIDGET).await;
        assert_eq!(say(&bot, 3, &["/stop"]).await[0], replies::GOODBYE);
        assert!(store.list_subscriptions(SubscriberId(3)).await.unwrap().is_empty());
        assert_eq!(store.link_count().unwrap(), 0);
        assert_eq!(say(&bot, 3, &["/stop"]).await[0], replies::NOT_REGISTERED);
    }
}

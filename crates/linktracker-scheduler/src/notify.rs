//! Notifier: turns update events into chat messages.
//! Delivery is best effort: failures are logged and recorded, never retried.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use linktracker_core::error::Result;
use linktracker_core::traits::Messenger;
use linktracker_core::types::UpdateEvent;
use serde::Serialize;

/// Max notifications kept in history.
const HISTORY_LIMIT: usize = 100;

/// A delivered (or failed) update notification.
#[derive(Debug, Clone, Serialize)]
pub struct Notification {
    pub url: String,
    pub body: String,
    pub recipients: usize,
    pub delivered: bool,
    pub error: Option<String>,
    pub timestamp: DateTime<Utc>,
}

pub struct Notifier {
    messenger: Arc<dyn Messenger>,
    history: Mutex<VecDeque<Notification>>,
}

impl Notifier {
    pub fn new(messenger: Arc<dyn Messenger>) -> Self {
        Self {
            messenger,
            history: Mutex::new(VecDeque::with_capacity(HISTORY_LIMIT)),
        }
    }

    /// Message text for an update.
    pub fn format(event: &UpdateEvent) -> String {
        format!("🔔 {}\n{}", event.link.url, event.description)
    }

    /// Deliver one event to all of its subscribers.
    pub async fn notify(&self, event: &UpdateEvent) -> Result<()> {
        let body = Self::format(event);
        let result = self.messenger.post_update(event, &body).await;

        match &result {
            Ok(()) => tracing::info!(
                "📣 Update for {} sent to {} subscriber(s) via {}",
                event.link.url,
                event.subscribers.len(),
                self.messenger.name()
            ),
            Err(e) => tracing::warn!("⚠️ Update for {} not fully delivered: {e}", event.link.url),
        }

        self.record(Notification {
            url: event.link.url.clone(),
            body,
            recipients: event.subscribers.len(),
            delivered: result.is_ok(),
            error: result.as_ref().err().map(|e| e.to_string()),
            timestamp: Utc::now(),
        });
        result
    }

    fn record(&self, notification: Notification) {
        let Ok(mut history) = self.history.lock() else {
            return;
        };
        if history.len() == HISTORY_LIMIT {
            history.pop_front();
        }
        history.push_back(notification);
    }

    /// Recent notifications, oldest first.
    pub fn history(&self) -> Vec<Notification> {
        self.history
            .lock()
            .map(|h| h.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// `(delivered, failed)` counts in the current history window.
    pub fn counts(&self) -> (usize, usize) {
        let history = self.history();
        let delivered = history.iter().filter(|n| n.delivered).count();
        (delivered, history.len() - delivered)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use async_trait::async_trait;
    use linktracker_core::error::LinkTrackerError;
    use linktracker_core::types::{SubscriberId, TrackedLink};
    use std::collections::BTreeSet;

    /// Messenger double recording every delivery; fails for listed subscribers.
    #[derive(Default)]
    pub(crate) struct RecordingMessenger {
        pub sent: Mutex<Vec<(SubscriberId, String)>>,
        pub failing: Vec<SubscriberId>,
    }

    #[async_trait]
    impl Messenger for RecordingMessenger {
        fn name(&self) -> &str {
            "recording"
        }

        async fn deliver(&self, subscriber: SubscriberId, text: &str) -> Result<()> {
            if self.failing.contains(&subscriber) {
                return Err(LinkTrackerError::Channel("chat blocked the bot".into()));
            }
            self.sent.lock().unwrap().push((subscriber, text.to_string()));
            Ok(())
        }
    }

    fn event(subscribers: &[i64]) -> UpdateEvent {
        UpdateEvent {
            link: TrackedLink {
                id: 1,
                url: "https://github.com/acme/widget".into(),
                tags: BTreeSet::new(),
                filters: BTreeSet::new(),
                updated_at: Utc::now(),
            },
            observed_at: Utc::now(),
            description: "new commit pushed".into(),
            subscribers: subscribers.iter().copied().map(SubscriberId).collect(),
        }
    }

    #[tokio::test]
    async fn test_notify_reaches_every_subscriber() {
        let messenger = Arc::new(RecordingMessenger::default());
        let notifier = Notifier::new(messenger.clone());

        notifier.notify(&event(&[1, 2, 3])).await.unwrap();

        let sent = messenger.sent.lock().unwrap();
        assert_eq!(sent.len(), 3);
        assert!(sent.iter().all(|(_, text)| text.contains("new commit pushed")));
        assert_eq!(notifier.counts(), (1, 0));
    }

    #[tokio::test]
    async fn test_partial_failure_still_attempts_everyone() {
        let messenger = Arc::new(RecordingMessenger {
            failing: vec![SubscriberId(2)],
            ..Default::default()
        });
        let notifier = Notifier::new(messenger.clone());

        let err = notifier.notify(&event(&[1, 2, 3])).await.unwrap_err();
        assert!(err.to_string().contains('2'));
        assert_eq!(messenger.sent.lock().unwrap().len(), 2);
        assert_eq!(notifier.counts(), (0, 1));
        assert!(notifier.history()[0].error.is_some());
    }

    #[tokio::test]
    async fn test_history_is_bounded() {
        let notifier = Notifier::new(Arc::new(RecordingMessenger::default()));
        for _ in 0..(HISTORY_LIMIT + 5) {
            notifier.notify(&event(&[1])).await.unwrap();
        }
        assert_eq!(notifier.history().len(), HISTORY_LIMIT);
    }
}

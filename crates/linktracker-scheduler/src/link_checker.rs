//! Link checker: one incremental scan over every tracked link.
//!
//! Links are paged in `(updated_at, id)` order behind a cursor that always
//! moves to the last link of the page just read, so a cycle finishes even when
//! every check in a page fails. Only one page is held in memory at a time.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::Utc;
use futures::stream::{self, StreamExt};
use linktracker_core::error::Result;
use linktracker_core::traits::LinkStore;
use linktracker_core::types::{LinkId, TrackedLink, UpdateEvent, Watermark};
use linktracker_sources::SourceRegistry;
use tokio::sync::mpsc;

/// Counters for one scan cycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScanStats {
    /// Page requests issued, including the final empty one.
    pub requests: usize,
    /// Non-empty pages.
    pub pages: usize,
    /// Links checked against a source.
    pub checked: usize,
    /// Links whose timestamp advanced.
    pub updated: usize,
    /// Links no source checker supports.
    pub unsupported: usize,
    /// Links whose check or bookkeeping failed; retried next cycle.
    pub failed: usize,
    /// Links seen again after advancing earlier in the same cycle.
    pub revisited: usize,
}

#[derive(Debug)]
enum Outcome {
    Unchanged,
    Updated(LinkId),
    Unsupported,
    Failed,
}

pub struct LinkChecker {
    store: Arc<dyn LinkStore>,
    sources: SourceRegistry,
    page_size: usize,
    concurrency: usize,
}

impl LinkChecker {
    /// `concurrency` is the number of checks in flight within a page; 1 checks
    /// serially.
    pub fn new(store: Arc<dyn LinkStore>, sources: SourceRegistry, page_size: usize, concurrency: usize) -> Self {
        Self {
            store,
            sources,
            page_size: page_size.max(1),
            concurrency: concurrency.max(1),
        }
    }

    /// Scan every link once, sending an [`UpdateEvent`] for each link whose
    /// remote activity is newer than its stored timestamp.
    ///
    /// Per-link failures are logged and skipped. A failed page request aborts
    /// the cycle; progress already persisted stands.
    pub async fn run_cycle(&self, events: &mpsc::Sender<UpdateEvent>) -> Result<ScanStats> {
        let mut stats = ScanStats::default();
        let mut cursor = Watermark::origin();
        // Links advanced this cycle sort after the cursor again; check them once.
        let mut advanced: HashSet<LinkId> = HashSet::new();

        loop {
            let page = self.store.page_links_after(&cursor, self.page_size).await?;
            stats.requests += 1;
            let Some(last) = page.last() else {
                break;
            };
            let next = last.watermark();
            debug_assert!(cursor < next, "scan cursor must strictly increase");
            stats.pages += 1;
            tracing::debug!(
                "📄 Scan page {} with {} link(s) after {}#{}",
                stats.pages,
                page.len(),
                cursor.updated_at,
                cursor.link_id
            );

            let (fresh, seen): (Vec<TrackedLink>, Vec<TrackedLink>) =
                page.into_iter().partition(|l| !advanced.contains(&l.id));
            stats.revisited += seen.len();

            for outcome in self.check_page(fresh, events).await {
                match outcome {
                    Outcome::Unchanged => stats.checked += 1,
                    Outcome::Updated(id) => {
                        stats.checked += 1;
                        stats.updated += 1;
                        advanced.insert(id);
                    }
                    Outcome::Unsupported => stats.unsupported += 1,
                    Outcome::Failed => stats.failed += 1,
                }
            }

            cursor = next;
        }

        tracing::info!(
            "🔍 Scan done: {} link(s) checked, {} updated, {} failed, {} unsupported in {} page(s)",
            stats.checked,
            stats.updated,
            stats.failed,
            stats.unsupported,
            stats.pages
        );
        Ok(stats)
    }

    /// Check a page with at most `concurrency` checks in flight.
    async fn check_page(&self, links: Vec<TrackedLink>, events: &mpsc::Sender<UpdateEvent>) -> Vec<Outcome> {
        stream::iter(links)
            .map(|link| self.check_link(link, events))
            .buffer_unordered(self.concurrency)
            .collect()
            .await
    }

    async fn check_link(&self, link: TrackedLink, events: &mpsc::Sender<UpdateEvent>) -> Outcome {
        let Some(checker) = self.sources.find(&link.url) else {
            tracing::warn!("⏭️ No source supports {}, skipping", link.url);
            return Outcome::Unsupported;
        };

        let activity = match checker.check(&link).await {
            Ok(activity) => activity,
            Err(e) => {
                tracing::warn!("⚠️ {} check failed for {}: {e}", checker.name(), link.url);
                return Outcome::Failed;
            }
        };

        if activity.last_activity <= link.updated_at {
            return Outcome::Unchanged;
        }

        // Queue space first: a cycle cancelled while waiting here has not
        // persisted anything, so the link is seen as changed next cycle.
        let Ok(permit) = events.reserve().await else {
            tracing::warn!("⚠️ Event queue closed, {} left for the next cycle", link.url);
            return Outcome::Failed;
        };

        match self.store.update_timestamp(link.id, activity.last_activity).await {
            Ok(true) => {}
            Ok(false) => return Outcome::Unchanged,
            Err(e) => {
                tracing::warn!("⚠️ Failed to store new timestamp for {}: {e}", link.url);
                return Outcome::Failed;
            }
        }

        let subscribers = match self.store.subscribers_of(link.id).await {
            Ok(subscribers) => subscribers,
            Err(e) => {
                tracing::error!("❌ Update for {} lost, subscribers unavailable: {e}", link.url);
                return Outcome::Updated(link.id);
            }
        };

        let id = link.id;
        if subscribers.is_empty() {
            tracing::debug!("Link {} updated but has no subscribers", link.url);
            return Outcome::Updated(id);
        }

        permit.send(UpdateEvent {
            link: TrackedLink {
                updated_at: activity.last_activity,
                ..link
            },
            observed_at: Utc::now(),
            description: activity.description,
            subscribers,
        });
        Outcome::Updated(id)
    }
}

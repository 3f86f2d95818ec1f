//! SQLite store for links, subscriptions, subscribers and dialogue state.
//! Timestamps are stored as Unix microseconds so the scan order is numeric.

use std::collections::BTreeSet;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use linktracker_core::error::{LinkTrackerError, Result};
use linktracker_core::traits::{LinkStore, StateStore, SubscriptionStore};
use linktracker_core::types::{
    ConversationState, DialogStep, DraftLink, LinkId, SubscriberId, TrackedLink, Watermark,
};
use rusqlite::{Connection, OptionalExtension, params};

pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Open or create the database at `path`.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path).map_err(storage)?;
        Self::with_connection(conn)
    }

    /// Private in-memory database.
    pub fn open_in_memory() -> Result<Self> {
        Self::with_connection(Connection::open_in_memory().map_err(storage)?)
    }

    fn with_connection(conn: Connection) -> Result<Self> {
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.migrate()?;
        Ok(store)
    }

    /// Run migrations to create tables.
    fn migrate(&self) -> Result<()> {
        self.conn()?
            .execute_batch(
                "
            PRAGMA foreign_keys = ON;

            CREATE TABLE IF NOT EXISTS subscribers (
                id INTEGER PRIMARY KEY,
                created_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS links (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                url TEXT NOT NULL UNIQUE,
                updated_at INTEGER NOT NULL      -- unix micros, never decreases
            );
            CREATE INDEX IF NOT EXISTS idx_links_scan ON links (updated_at, id);

            CREATE TABLE IF NOT EXISTS subscriptions (
                subscriber_id INTEGER NOT NULL REFERENCES subscribers(id) ON DELETE CASCADE,
                link_id INTEGER NOT NULL REFERENCES links(id) ON DELETE CASCADE,
                tags TEXT NOT NULL DEFAULT '[]',     -- JSON array
                filters TEXT NOT NULL DEFAULT '[]',  -- JSON array
                created_at TEXT NOT NULL,
                PRIMARY KEY (subscriber_id, link_id)
            );
            CREATE INDEX IF NOT EXISTS idx_subscriptions_link ON subscriptions (link_id);

            CREATE TABLE IF NOT EXISTS conversation_states (
                subscriber_id INTEGER PRIMARY KEY,
                step TEXT NOT NULL,
                draft TEXT NOT NULL DEFAULT '{}',   -- JSON DraftLink
                updated_at TEXT NOT NULL
            );
         ",
            )
            .map_err(storage)
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| LinkTrackerError::Transient(e.to_string()))
    }

    /// Number of tracked links.
    pub fn link_count(&self) -> Result<usize> {
        let conn = self.conn()?;
        let n: i64 = conn
            .query_row("SELECT COUNT(*) FROM links", [], |r| r.get(0))
            .map_err(storage)?;
        Ok(n as usize)
    }
}

fn storage(e: rusqlite::Error) -> LinkTrackerError {
    LinkTrackerError::Transient(e.to_string())
}

fn is_constraint(e: &rusqlite::Error) -> bool {
    matches!(e, rusqlite::Error::SqliteFailure(err, _) if err.code == rusqlite::ErrorCode::ConstraintViolation)
}

fn micros(at: DateTime<Utc>) -> i64 {
    at.timestamp_micros()
}

fn from_micros(us: i64) -> DateTime<Utc> {
    DateTime::from_timestamp_micros(us).unwrap_or(DateTime::<Utc>::UNIX_EPOCH)
}

fn encode_set(set: &BTreeSet<String>) -> Result<String> {
    Ok(serde_json::to_string(set)?)
}

fn decode_set(raw: &str) -> BTreeSet<String> {
    serde_json::from_str(raw).unwrap_or_else(|e| {
        tracing::warn!("⚠️ Corrupt tag/filter column {raw:?}: {e}");
        BTreeSet::new()
    })
}

/// Subscription row for `(subscriber, url)`, if any.
fn find_subscription(conn: &Connection, subscriber: SubscriberId, url: &str) -> Result<Option<TrackedLink>> {
    conn.query_row(
        "SELECT l.id, l.url, l.updated_at, s.tags, s.filters
           FROM subscriptions s JOIN links l ON l.id = s.link_id
          WHERE s.subscriber_id = ?1 AND l.url = ?2",
        params![subscriber.0, url],
        |row| {
            Ok(TrackedLink {
                id: row.get(0)?,
                url: row.get(1)?,
                updated_at: from_micros(row.get(2)?),
                tags: decode_set(&row.get::<_, String>(3)?),
                filters: decode_set(&row.get::<_, String>(4)?),
            })
        },
    )
    .optional()
    .map_err(storage)
}

fn delete_orphan_links(conn: &Connection) -> Result<usize> {
    conn.execute(
        "DELETE FROM links WHERE id NOT IN (SELECT DISTINCT link_id FROM subscriptions)",
        [],
    )
    .map_err(storage)
}

#[async_trait]
impl LinkStore for SqliteStore {
    async fn page_links_after(&self, after: &Watermark, limit: usize) -> Result<Vec<TrackedLink>> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare_cached(
                "SELECT id, url, updated_at FROM links
                  WHERE updated_at > ?1 OR (updated_at = ?1 AND id > ?2)
                  ORDER BY updated_at, id
                  LIMIT ?3",
            )
            .map_err(storage)?;
        let rows = stmt
            .query_map(
                params![micros(after.updated_at), after.link_id, limit as i64],
                |row| {
                    Ok(TrackedLink {
                        id: row.get(0)?,
                        url: row.get(1)?,
                        tags: BTreeSet::new(),
                        filters: BTreeSet::new(),
                        updated_at: from_micros(row.get(2)?),
                    })
                },
            )
            .map_err(storage)?;
        rows.collect::<std::result::Result<Vec<_>, _>>().map_err(storage)
    }

    async fn update_timestamp(&self, link: LinkId, at: DateTime<Utc>) -> Result<bool> {
        let conn = self.conn()?;
        let changed = conn
            .execute(
                "UPDATE links SET updated_at = ?1 WHERE id = ?2 AND updated_at < ?1",
                params![micros(at), link],
            )
            .map_err(storage)?;
        Ok(changed > 0)
    }

    async fn subscribers_of(&self, link: LinkId) -> Result<Vec<SubscriberId>> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare_cached("SELECT subscriber_id FROM subscriptions WHERE link_id = ?1 ORDER BY subscriber_id")
            .map_err(storage)?;
        let rows = stmt
            .query_map([link], |row| Ok(SubscriberId(row.get(0)?)))
            .map_err(storage)?;
        rows.collect::<std::result::Result<Vec<_>, _>>().map_err(storage)
    }
}

#[async_trait]
impl SubscriptionStore for SqliteStore {
    async fn register_subscriber(&self, subscriber: SubscriberId) -> Result<bool> {
        let conn = self.conn()?;
        let inserted = conn
            .execute(
                "INSERT OR IGNORE INTO subscribers (id, created_at) VALUES (?1, ?2)",
                params![subscriber.0, Utc::now().to_rfc3339()],
            )
            .map_err(storage)?;
        Ok(inserted > 0)
    }

    async fn remove_subscriber(&self, subscriber: SubscriberId) -> Result<()> {
        let mut conn = self.conn()?;
        let tx = conn.transaction().map_err(storage)?;
        let removed = tx
            .execute("DELETE FROM subscribers WHERE id = ?1", [subscriber.0])
            .map_err(storage)?;
        if removed == 0 {
            return Err(LinkTrackerError::NotFound(format!("subscriber {subscriber}")));
        }
        // Cascades are explicit so the store does not depend on the pragma.
        tx.execute("DELETE FROM subscriptions WHERE subscriber_id = ?1", [subscriber.0])
            .map_err(storage)?;
        tx.execute("DELETE FROM conversation_states WHERE subscriber_id = ?1", [subscriber.0])
            .map_err(storage)?;
        let orphans = delete_orphan_links(&tx)?;
        tx.commit().map_err(storage)?;
        tracing::debug!("🗑️ Subscriber {subscriber} removed ({orphans} orphan links dropped)");
        Ok(())
    }

    async fn add_subscription(&self, subscriber: SubscriberId, link: &TrackedLink) -> Result<TrackedLink> {
        let mut conn = self.conn()?;
        let tx = conn.transaction().map_err(storage)?;

        if find_subscription(&tx, subscriber, &link.url)?.is_some() {
            return Err(LinkTrackerError::Conflict(format!(
                "{subscriber} already tracks {}",
                link.url
            )));
        }

        let now = Utc::now().to_rfc3339();
        tx.execute(
            "INSERT OR IGNORE INTO subscribers (id, created_at) VALUES (?1, ?2)",
            params![subscriber.0, now],
        )
        .map_err(storage)?;
        tx.execute(
            "INSERT OR IGNORE INTO links (url, updated_at) VALUES (?1, ?2)",
            params![link.url, micros(link.updated_at)],
        )
        .map_err(storage)?;
        let (id, updated_at): (LinkId, i64) = tx
            .query_row(
                "SELECT id, updated_at FROM links WHERE url = ?1",
                [&link.url],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .map_err(storage)?;
        tx.execute(
            "INSERT INTO subscriptions (subscriber_id, link_id, tags, filters, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![subscriber.0, id, encode_set(&link.tags)?, encode_set(&link.filters)?, now],
        )
        .map_err(|e| {
            if is_constraint(&e) {
                LinkTrackerError::Conflict(format!("{subscriber} already tracks {}", link.url))
            } else {
                storage(e)
            }
        })?;
        tx.commit().map_err(storage)?;

        Ok(TrackedLink {
            id,
            url: link.url.clone(),
            tags: link.tags.clone(),
            filters: link.filters.clone(),
            updated_at: from_micros(updated_at),
        })
    }

    async fn remove_subscription(&self, subscriber: SubscriberId, url: &str) -> Result<TrackedLink> {
        let mut conn = self.conn()?;
        let tx = conn.transaction().map_err(storage)?;
        let link = find_subscription(&tx, subscriber, url)?
            .ok_or_else(|| LinkTrackerError::NotFound(format!("{subscriber} does not track {url}")))?;
        tx.execute(
            "DELETE FROM subscriptions WHERE subscriber_id = ?1 AND link_id = ?2",
            params![subscriber.0, link.id],
        )
        .map_err(storage)?;
        tx.execute(
            "DELETE FROM links WHERE id = ?1 AND NOT EXISTS (SELECT 1 FROM subscriptions WHERE link_id = ?1)",
            [link.id],
        )
        .map_err(storage)?;
        tx.commit().map_err(storage)?;
        Ok(link)
    }

    async fn list_subscriptions(&self, subscriber: SubscriberId) -> Result<Vec<TrackedLink>> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare_cached(
                "SELECT l.id, l.url, l.updated_at, s.tags, s.filters
                   FROM subscriptions s JOIN links l ON l.id = s.link_id
                  WHERE s.subscriber_id = ?1
                  ORDER BY l.url",
            )
            .map_err(storage)?;
        let rows = stmt
            .query_map([subscriber.0], |row| {
                Ok(TrackedLink {
                    id: row.get(0)?,
                    url: row.get(1)?,
                    updated_at: from_micros(row.get(2)?),
                    tags: decode_set(&row.get::<_, String>(3)?),
                    filters: decode_set(&row.get::<_, String>(4)?),
                })
            })
            .map_err(storage)?;
        rows.collect::<std::result::Result<Vec<_>, _>>().map_err(storage)
    }

    async fn update_subscription(&self, subscriber: SubscriberId, link: &TrackedLink) -> Result<()> {
        let conn = self.conn()?;
        let existing = find_subscription(&conn, subscriber, &link.url)?
            .ok_or_else(|| LinkTrackerError::NotFound(format!("{subscriber} does not track {}", link.url)))?;
        conn.execute(
            "UPDATE subscriptions SET tags = ?1, filters = ?2 WHERE subscriber_id = ?3 AND link_id = ?4",
            params![
                encode_set(&link.tags)?,
                encode_set(&link.filters)?,
                subscriber.0,
                existing.id
            ],
        )
        .map_err(storage)?;
        Ok(())
    }
}

#[async_trait]
impl StateStore for SqliteStore {
    async fn create_state(&self, subscriber: SubscriberId, state: &ConversationState) -> Result<()> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO conversation_states (subscriber_id, step, draft, updated_at) VALUES (?1, ?2, ?3, ?4)",
            params![
                subscriber.0,
                state.step.as_str(),
                serde_json::to_string(&state.draft)?,
                Utc::now().to_rfc3339()
            ],
        )
        .map_err(|e| {
            if is_constraint(&e) {
                LinkTrackerError::Conflict(format!("state for {subscriber} exists"))
            } else {
                storage(e)
            }
        })?;
        Ok(())
    }

    async fn get_state(&self, subscriber: SubscriberId) -> Result<Option<ConversationState>> {
        let conn = self.conn()?;
        let row: Option<(String, String)> = conn
            .query_row(
                "SELECT step, draft FROM conversation_states WHERE subscriber_id = ?1",
                [subscriber.0],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()
            .map_err(storage)?;

        let Some((step, draft)) = row else {
            return Ok(None);
        };
        let step = DialogStep::parse(&step)
            .ok_or_else(|| LinkTrackerError::Transient(format!("unknown dialog step {step:?}")))?;
        let draft: DraftLink = serde_json::from_str(&draft)?;
        Ok(Some(ConversationState { step, draft }))
    }

    async fn update_state(&self, subscriber: SubscriberId, state: &ConversationState) -> Result<()> {
        let conn = self.conn()?;
        let changed = conn
            .execute(
                "UPDATE conversation_states SET step = ?1, draft = ?2, updated_at = ?3 WHERE subscriber_id = ?4",
                params![
                    state.step.as_str(),
                    serde_json::to_string(&state.draft)?,
                    Utc::now().to_rfc3339(),
                    subscriber.0
                ],
            )
            .map_err(storage)?;
        if changed == 0 {
            return Err(LinkTrackerError::NotFound(format!("state for {subscriber}")));
        }
        Ok(())
    }

    async fn delete_state(&self, subscriber: SubscriberId) -> Result<()> {
        let conn = self.conn()?;
        conn.execute("DELETE FROM conversation_states WHERE subscriber_id = ?1", [subscriber.0])
            .map_err(storage)?;
        Ok(())
    }
}

//! Domain types: links, subscribers, dialogue state and update events.

use std::collections::BTreeSet;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Database identity of a tracked link.
pub type LinkId = i64;

/// Opaque chat/user identity of a subscriber.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SubscriberId(pub i64);

impl fmt::Display for SubscriberId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i64> for SubscriberId {
    fn from(id: i64) -> Self {
        Self(id)
    }
}

/// A link watched on behalf of one or more subscribers.
///
/// Tags and filters are subscriber-specific: they are populated when the link
/// is read through a subscription and empty when read by the scanner.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackedLink {
    pub id: LinkId,
    pub url: String,
    #[serde(default)]
    pub tags: BTreeSet<String>,
    #[serde(default)]
    pub filters: BTreeSet<String>,
    /// Last-known remote update. Never decreases.
    pub updated_at: DateTime<Utc>,
}

impl TrackedLink {
    /// Cursor position of this link in a scan.
    pub fn watermark(&self) -> Watermark {
        Watermark {
            updated_at: self.updated_at,
            link_id: self.id,
        }
    }
}

/// Pagination cursor for a scan cycle: the `(updated_at, id)` of the last link
/// seen. Pages contain links strictly after it in that order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Watermark {
    pub updated_at: DateTime<Utc>,
    pub link_id: LinkId,
}

impl Watermark {
    /// Cursor placed before every link.
    pub fn origin() -> Self {
        Self {
            updated_at: DateTime::<Utc>::UNIX_EPOCH,
            link_id: LinkId::MIN,
        }
    }

    /// Whether `link` sorts strictly after this cursor.
    pub fn precedes(&self, link: &TrackedLink) -> bool {
        *self < link.watermark()
    }
}

/// Result of a successful remote lookup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Activity {
    /// Most recent modification of the remote resource, UTC.
    pub last_activity: DateTime<Utc>,
    /// Short human-readable summary, e.g. "new commit pushed".
    pub description: String,
}

/// A detected change, queued between the link checker and the notifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpdateEvent {
    pub link: TrackedLink,
    pub observed_at: DateTime<Utc>,
    pub description: String,
    pub subscribers: Vec<SubscriberId>,
}

/// An inbound chat message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IncomingMessage {
    pub subscriber: SubscriberId,
    pub text: String,
}

impl IncomingMessage {
    pub fn new(subscriber: impl Into<SubscriberId>, text: impl Into<String>) -> Self {
        Self {
            subscriber: subscriber.into(),
            text: text.into(),
        }
    }
}

/// Where a subscriber currently is in a multi-step dialogue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DialogStep {
    #[default]
    Idle,
    AwaitingLink,
    AwaitingTags,
    AwaitingFilters,
    AwaitingDeleteTarget,
    AwaitingTagEditTarget,
    AwaitingTagEditValue,
}

impl DialogStep {
    pub fn as_str(&self) -> &'static str {
        match self {
            DialogStep::Idle => "idle",
            DialogStep::AwaitingLink => "awaiting_link",
            DialogStep::AwaitingTags => "awaiting_tags",
            DialogStep::AwaitingFilters => "awaiting_filters",
            DialogStep::AwaitingDeleteTarget => "awaiting_delete_target",
            DialogStep::AwaitingTagEditTarget => "awaiting_tag_edit_target",
            DialogStep::AwaitingTagEditValue => "awaiting_tag_edit_value",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Some(match s {
            "idle" => DialogStep::Idle,
            "awaiting_link" => DialogStep::AwaitingLink,
            "awaiting_tags" => DialogStep::AwaitingTags,
            "awaiting_filters" => DialogStep::AwaitingFilters,
            "awaiting_delete_target" => DialogStep::AwaitingDeleteTarget,
            "awaiting_tag_edit_target" => DialogStep::AwaitingTagEditTarget,
            "awaiting_tag_edit_value" => DialogStep::AwaitingTagEditValue,
            _ => return None,
        })
    }
}

impl fmt::Display for DialogStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Link fields accumulated across dialogue turns before commit.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DraftLink {
    pub url: Option<String>,
    #[serde(default)]
    pub tags: BTreeSet<String>,
    #[serde(default)]
    pub filters: BTreeSet<String>,
}

/// Persisted per-subscriber dialogue record.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationState {
    pub step: DialogStep,
    pub draft: DraftLink,
}

impl ConversationState {
    pub fn idle() -> Self {
        Self::default()
    }

    pub fn at(step: DialogStep, draft: DraftLink) -> Self {
        Self { step, draft }
    }

    pub fn is_idle(&self) -> bool {
        self.step == DialogStep::Idle
    }
}

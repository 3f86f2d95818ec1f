//! # LinkTracker Core
//!
//! Shared domain types, the error type, configuration and the collaborator
//! traits every other crate is written against.
//!
//! ```text
//! Scheduler ──► LinkChecker ──► SourceChecker (GitHub, StackOverflow)
//!     │              │
//!     │              └─► LinkStore (page / update / subscribers)
//!     └─► Notifier ──► Messenger (Telegram)
//!
//! Telegram ──► Dispatcher ──► ConversationBot ──► SubscriptionStore + StateStore
//! ```

pub mod config;
pub mod error;
pub mod traits;
pub mod types;

pub use config::LinkTrackerConfig;
pub use error::{LinkTrackerError, Result};
pub use traits::{LinkStore, MessageHandler, Messenger, SourceChecker, StateStore, SubscriptionStore};
pub use types::{
    Activity, ConversationState, DialogStep, DraftLink, IncomingMessage, LinkId, SubscriberId,
    TrackedLink, UpdateEvent, Watermark,
};

//! # LinkTracker Scheduler
//!
//! Change detection and notification fan-out.
//!
//! ## Architecture
//! ```text
//! Scheduler (tokio interval, one cycle per tick, deadline = period)
//!   └── LinkChecker::run_cycle
//!         ├── page_links_after(cursor, page_size)   ← cursor = last link of page
//!         ├── SourceRegistry::find → SourceChecker::check   (bounded pool)
//!         └── newer timestamp → update_timestamp + subscribers_of → UpdateEvent
//!                                                                    │
//!   drain loop  ◄──────────── bounded mpsc queue ◄───────────────────┘
//!     └── Notifier::notify → Messenger::post_update
//! ```

pub mod engine;
pub mod link_checker;
pub mod notify;

pub use engine::{Scheduler, SchedulerHandle, SchedulerState};
pub use link_checker::{LinkChecker, ScanStats};
pub use notify::{Notification, Notifier};

//! # LinkTracker DB
//!
//! SQLite-backed implementation of the link, subscription and dialogue-state
//! stores. One connection behind a mutex; every trait call is one short
//! critical section.

pub mod sqlite;

pub use sqlite::SqliteStore;

//! # LinkTracker Bot
//!
//! Everything between the chat and the subscription store:
//! - [`telegram`]: Bot API long polling and message delivery
//! - [`dispatcher`]: per-subscriber ordered processing over hashed shards
//! - [`state_machine`]: the pure dialogue transition function
//! - [`bot`]: executes transitions against the stores

pub mod bot;
pub mod dispatcher;
pub mod replies;
pub mod state_machine;
pub mod telegram;

pub use bot::ConversationBot;
pub use dispatcher::Dispatcher;
pub use state_machine::{Command, Effect, Transition, transition};
pub use telegram::{TelegramClient, TelegramPollingStream};

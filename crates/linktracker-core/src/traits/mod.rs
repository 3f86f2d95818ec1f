//! Collaborator traits. Storage, remote sources and the chat front end are
//! reached only through these seams.

pub mod handler;
pub mod messenger;
pub mod source;
pub mod store;

pub use handler::MessageHandler;
pub use messenger::Messenger;
pub use source::SourceChecker;
pub use store::{LinkStore, StateStore, SubscriptionStore};

//! Inbound side of the messaging front end.

use async_trait::async_trait;

use crate::types::IncomingMessage;

/// Turns one inbound chat message into a reply.
///
/// Infallible by contract: failures become user-facing text. An empty reply
/// means nothing is sent back.
#[async_trait]
pub trait MessageHandler: Send + Sync {
    async fn handle(&self, message: &IncomingMessage) -> String;
}

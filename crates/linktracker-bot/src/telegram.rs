//! Telegram Bot API front end: long polling for inbound messages and
//! `sendMessage` for replies and update notifications.

use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;

use async_trait::async_trait;
use futures::stream::Stream;
use linktracker_core::config::TelegramConfig;
use linktracker_core::error::{LinkTrackerError, Result};
use linktracker_core::traits::Messenger;
use linktracker_core::types::{IncomingMessage, SubscriberId};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::state_machine::Command;

/// Inbound messages buffered between the poller and its consumer.
const POLL_BUFFER: usize = 100;
/// Pause after a failed poll.
const RETRY_DELAY: Duration = Duration::from_secs(5);

/// Telegram Bot API client. Cheap to clone; clones share the HTTP pool.
#[derive(Clone)]
pub struct TelegramClient {
    client: reqwest::Client,
    api_base: String,
    token: String,
    poll_timeout_secs: u64,
}

impl TelegramClient {
    pub fn new(config: &TelegramConfig) -> Result<Self> {
        if config.bot_token.trim().is_empty() {
            return Err(LinkTrackerError::Config(
                "telegram.bot_token is empty (or set LINKTRACKER_TELEGRAM_TOKEN)".into(),
            ));
        }
        // The request must outlive the server-side long poll.
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.poll_timeout_secs + 15))
            .build()
            .map_err(|e| LinkTrackerError::Config(format!("HTTP client: {e}")))?;
        Ok(Self {
            client,
            api_base: config.api_base.trim_end_matches('/').to_string(),
            token: config.bot_token.clone(),
            poll_timeout_secs: config.poll_timeout_secs,
        })
    }

    fn api_url(&self, method: &str) -> String {
        format!("{}/bot{}/{}", self.api_base, self.token, method)
    }

    /// Send a request and unwrap the Bot API envelope.
    async fn call<T: serde::de::DeserializeOwned>(&self, request: reqwest::RequestBuilder, method: &str) -> Result<T> {
        let response = request
            .send()
            .await
            .map_err(|e| LinkTrackerError::Channel(format!("Telegram {method} failed: {e}")))?;

        let body: TelegramApiResponse<T> = response
            .json()
            .await
            .map_err(|e| LinkTrackerError::Channel(format!("Invalid Telegram {method} response: {e}")))?;

        if !body.ok {
            return Err(LinkTrackerError::Channel(format!(
                "Telegram {method} error: {}",
                body.description.unwrap_or_default()
            )));
        }
        body.result
            .ok_or_else(|| LinkTrackerError::Channel(format!("Telegram {method} returned no result")))
    }

    /// Long-poll for updates after `offset`.
    pub async fn get_updates(&self, offset: i64) -> Result<Vec<TelegramUpdate>> {
        let request = self.client.get(self.api_url("getUpdates")).query(&[
            ("offset", offset.to_string()),
            ("timeout", self.poll_timeout_secs.to_string()),
            ("allowed_updates", "[\"message\"]".into()),
        ]);
        self.call(request, "getUpdates").await
    }

    /// Plain-text message. No parse mode: URLs with `_` break Markdown.
    pub async fn send_message(&self, chat_id: i64, text: &str) -> Result<()> {
        let body = serde_json::json!({
            "chat_id": chat_id,
            "text": text,
            "disable_web_page_preview": true,
        });
        let request = self.client.post(self.api_url("sendMessage")).json(&body);
        self.call::<serde_json::Value>(request, "sendMessage").await?;
        Ok(())
    }

    /// Register the command menu shown by Telegram clients.
    pub async fn set_commands(&self) -> Result<()> {
        let commands: Vec<BotCommand> = Command::ALL
            .iter()
            .map(|c| BotCommand {
                command: c.name().into(),
                description: c.description().into(),
            })
            .collect();
        let request = self
            .client
            .post(self.api_url("setMyCommands"))
            .json(&serde_json::json!({ "commands": commands }));
        self.call::<bool>(request, "setMyCommands").await?;
        tracing::info!("📋 Telegram command menu registered ({} commands)", commands.len());
        Ok(())
    }

    pub async fn get_me(&self) -> Result<TelegramUser> {
        self.call(self.client.get(self.api_url("getMe")), "getMe").await
    }

    /// Spawn the polling loop. It stops once the returned stream is dropped.
    pub fn start_polling(&self) -> TelegramPollingStream {
        let (tx, rx) = mpsc::channel(POLL_BUFFER);
        let client = self.clone();

        tokio::spawn(async move {
            tracing::info!("📡 Telegram polling loop started");
            let mut offset = 0;

            loop {
                let updates = tokio::select! {
                    _ = tx.closed() => break,
                    result = client.get_updates(offset) => result,
                };
                match updates {
                    Ok(updates) => {
                        for update in updates {
                            offset = offset.max(update.update_id + 1);
                            let Some(message) = update.to_incoming() else {
                                continue;
                            };
                            if tx.send(message).await.is_err() {
                                break;
                            }
                        }
                    }
                    Err(e) => {
                        tracing::error!("❌ Telegram polling error: {e}");
                        tokio::select! {
                            _ = tx.closed() => break,
                            _ = tokio::time::sleep(RETRY_DELAY) => {}
                        }
                    }
                }
            }
            tracing::info!("📡 Telegram polling stopped (receiver dropped)");
        });

        TelegramPollingStream { rx }
    }
}

/// Stream of inbound Telegram messages from the polling loop.
pub struct TelegramPollingStream {
    rx: mpsc::Receiver<IncomingMessage>,
}

impl Stream for TelegramPollingStream {
    type Item = IncomingMessage;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.rx.poll_recv(cx)
    }
}

#[async_trait]
impl Messenger for TelegramClient {
    fn name(&self) -> &str {
        "telegram"
    }

    async fn deliver(&self, subscriber: SubscriberId, text: &str) -> Result<()> {
        self.send_message(subscriber.0, text).await
    }
}

// --- Telegram API Types ---

#[derive(Debug, Deserialize)]
pub struct TelegramApiResponse<T> {
    pub ok: bool,
    pub result: Option<T>,
    pub description: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BotCommand {
    pub command: String,
    pub description: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelegramUpdate {
    pub update_id: i64,
    pub message: Option<TelegramMessage>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelegramMessage {
    pub message_id: i64,
    pub from: Option<TelegramUser>,
    pub chat: TelegramChat,
    pub text: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelegramUser {
    pub id: i64,
    pub is_bot: bool,
    pub first_name: String,
    pub username: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelegramChat {
    pub id: i64,
}

impl TelegramUpdate {
    /// Text messages from people; the chat is the subscriber.
    pub fn to_incoming(&self) -> Option<IncomingMessage> {
        let msg = self.message.as_ref()?;
        let text = msg.text.as_ref()?;
        let from = msg.from.as_ref()?;

        if from.is_bot {
            return None;
        }
        Some(IncomingMessage::new(msg.chat.id, text.as_str()))
    }
}

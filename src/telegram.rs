//! Telegram transport
//!
//! The core never talks to Telegram directly; everything goes through the
//! [`Gateway`] trait so delivery failures stay isolable and tests can swap
//! in a recording gateway. [`TelegramClient`] implements the trait over the
//! Bot API, and a long-polling task converts updates into [`IncomingMessage`]
//! events on an mpsc channel.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

/// Outbound seam used by the core for every send and edit
#[async_trait]
pub trait Gateway: Send + Sync {
    /// Send a message; returns the new message id
    async fn send(&self, channel_id: i64, text: &str) -> Result<i64>;
    /// Edit a previously sent message in place
    async fn edit(&self, channel_id: i64, message_id: i64, text: &str) -> Result<bool>;
}

/// One inbound chat event, new or edited
#[derive(Debug, Clone)]
pub struct IncomingMessage {
    pub channel_id: i64,
    pub message_id: i64,
    pub text: String,
    pub is_edit: bool,
    pub sender_id: Option<i64>,
    pub is_private: bool,
}

// ============================================================================
// Bot API wire types
// ============================================================================

#[derive(Debug, Deserialize)]
struct ApiResponse<T> {
    ok: bool,
    result: Option<T>,
    description: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct Update {
    pub update_id: i64,
    message: Option<TgMessage>,
    edited_message: Option<TgMessage>,
    channel_post: Option<TgMessage>,
    edited_channel_post: Option<TgMessage>,
}

#[derive(Debug, Deserialize)]
struct TgMessage {
    message_id: i64,
    chat: TgChat,
    #[serde(default)]
    text: Option<String>,
    from: Option<TgUser>,
}

#[derive(Debug, Deserialize)]
struct TgChat {
    id: i64,
    #[serde(rename = "type")]
    kind: String,
}

#[derive(Debug, Deserialize)]
pub struct TgUser {
    pub id: i64,
    pub username: Option<String>,
}

impl Update {
    /// Flatten the four update shapes into one event; updates without text
    /// (joins, stickers, ...) are dropped.
    fn into_incoming(self) -> Option<IncomingMessage> {
        let (msg, is_edit) = match (
            self.message,
            self.edited_message,
            self.channel_post,
            self.edited_channel_post,
        ) {
            (Some(m), _, _, _) => (m, false),
            (_, Some(m), _, _) => (m, true),
            (_, _, Some(m), _) => (m, false),
            (_, _, _, Some(m)) => (m, true),
            _ => return None,
        };
        let text = msg.text?;
        Some(IncomingMessage {
            channel_id: msg.chat.id,
            message_id: msg.message_id,
            text,
            is_edit,
            sender_id: msg.from.map(|u| u.id),
            is_private: msg.chat.kind == "private",
        })
    }
}

// ============================================================================
// Bot API client
// ============================================================================

#[derive(Clone)]
pub struct TelegramClient {
    client: Client,
    base_url: String,
}

impl TelegramClient {
    pub fn new(token: &str, timeout_ms: u64) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_millis(timeout_ms))
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            client,
            base_url: format!("https://api.telegram.org/bot{}", token),
        })
    }

    async fn call<T: for<'de> Deserialize<'de>>(
        &self,
        method: &str,
        body: serde_json::Value,
        timeout: Option<Duration>,
    ) -> Result<T> {
        let url = format!("{}/{}", self.base_url, method);

        let mut request = self.client.post(&url).json(&body);
        if let Some(timeout) = timeout {
            request = request.timeout(timeout);
        }

        let response = request
            .send()
            .await
            .with_context(|| format!("Failed to call {}", method))?;

        let status = response.status();
        let api: ApiResponse<T> = response
            .json()
            .await
            .with_context(|| format!("Failed to parse {} response (HTTP {})", method, status))?;

        if !api.ok {
            return Err(anyhow!(
                "{} rejected: {}",
                method,
                api.description.unwrap_or_else(|| "no description".to_string())
            ));
        }
        api.result
            .ok_or_else(|| anyhow!("{} returned ok without a result", method))
    }

    /// Identify the bot account; used at startup to confirm the token works
    pub async fn get_me(&self) -> Result<TgUser> {
        self.call("getMe", json!({}), None).await
    }

    /// Long-poll for updates past `offset`
    pub async fn get_updates(&self, offset: i64, timeout_secs: u64) -> Result<Vec<Update>> {
        self.call(
            "getUpdates",
            json!({
                "offset": offset,
                "timeout": timeout_secs,
                "allowed_updates": ["message", "edited_message", "channel_post", "edited_channel_post"],
            }),
            // The HTTP timeout must outlast the long-poll window
            Some(Duration::from_secs(timeout_secs + 10)),
        )
        .await
    }
}

#[async_trait]
impl Gateway for TelegramClient {
    async fn send(&self, channel_id: i64, text: &str) -> Result<i64> {
        #[derive(Deserialize)]
        struct Sent {
            message_id: i64,
        }
        let sent: Sent = self
            .call(
                "sendMessage",
                json!({ "chat_id": channel_id, "text": text }),
                None,
            )
            .await?;
        debug!(channel_id, message_id = sent.message_id, "message sent");
        Ok(sent.message_id)
    }

    async fn edit(&self, channel_id: i64, message_id: i64, text: &str) -> Result<bool> {
        // editMessageText returns the edited message (or `true` for inline
        // messages); only the ok flag matters here.
        let _: serde_json::Value = self
            .call(
                "editMessageText",
                json!({ "chat_id": channel_id, "message_id": message_id, "text": text }),
                None,
            )
            .await?;
        debug!(channel_id, message_id, "message edited");
        Ok(true)
    }
}

/// Long-poll getUpdates and feed the dispatch loop until shutdown or the
/// receiver goes away. Transport errors back off and retry, mirroring the
/// reconnect loop the result stream needs to survive flaky networking.
pub async fn run_update_poller(
    client: TelegramClient,
    tx: mpsc::Sender<IncomingMessage>,
    running: Arc<AtomicBool>,
    poll_timeout_secs: u64,
) {
    let mut offset: i64 = 0;
    info!("update poller started");

    while running.load(Ordering::SeqCst) {
        match client.get_updates(offset, poll_timeout_secs).await {
            Ok(updates) => {
                for update in updates {
                    offset = offset.max(update.update_id + 1);
                    if let Some(incoming) = update.into_incoming() {
                        if tx.send(incoming).await.is_err() {
                            warn!("dispatch loop gone, stopping poller");
                            return;
                        }
                    }
                }
            }
            Err(e) => {
                error!(error = %e, "getUpdates failed, retrying in 2 seconds");
                tokio::time::sleep(Duration::from_secs(2)).await;
            }
        }
    }

    info!("update poller stopped");
}

#[cfg(test)]
mod tests {
    use super::*;

    fn update_json(field: &str) -> Update {
        serde_json::from_value(json!({
            "update_id": 7,
            field: {
                "message_id": 42,
                "chat": { "id": -1001234, "type": "channel" },
                "text": "N045 (A♠2♥)-(6♥J♠)🔰",
            }
        }))
        .unwrap()
    }

    #[test]
    fn channel_post_maps_to_new_message() {
        let incoming = update_json("channel_post").into_incoming().unwrap();
        assert_eq!(incoming.channel_id, -1001234);
        assert_eq!(incoming.message_id, 42);
        assert!(!incoming.is_edit);
        assert!(!incoming.is_private);
        assert!(incoming.sender_id.is_none());
    }

    #[test]
    fn edited_channel_post_maps_to_edit() {
        let incoming = update_json("edited_channel_post").into_incoming().unwrap();
        assert!(incoming.is_edit);
    }

    #[test]
    fn private_message_carries_sender() {
        let update: Update = serde_json::from_value(json!({
            "update_id": 8,
            "message": {
                "message_id": 1,
                "chat": { "id": 555, "type": "private" },
                "text": "/status",
                "from": { "id": 555, "username": "admin" },
            }
        }))
        .unwrap();
        let incoming = update.into_incoming().unwrap();
        assert!(incoming.is_private);
        assert_eq!(incoming.sender_id, Some(555));
    }

    #[test]
    fn textless_update_is_dropped() {
        let update: Update = serde_json::from_value(json!({
            "update_id": 9,
            "message": {
                "message_id": 2,
                "chat": { "id": 555, "type": "private" },
            }
        }))
        .unwrap();
        assert!(update.into_incoming().is_none());
    }
}

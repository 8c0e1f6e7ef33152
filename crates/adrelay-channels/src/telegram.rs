//! Telegram Bot API: account transport (send text/media) and update polling
//! for the command bot.

use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::task::{Context, Poll};

use adrelay_core::error::{AdRelayError, Result};
use adrelay_core::traits::{Transport, TransportFactory};
use adrelay_core::types::{Account, Identity, Media, MediaKind};
use async_trait::async_trait;
use futures::stream::Stream;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

/// Telegram connection settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelegramConfig {
    pub token: String,
    #[serde(default = "default_poll_interval")]
    pub poll_interval: u64,
    #[serde(default = "default_api_base")]
    pub api_base: String,
}

fn default_poll_interval() -> u64 {
    1
}
fn default_api_base() -> String {
    "https://api.telegram.org".into()
}

impl TelegramConfig {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
            poll_interval: default_poll_interval(),
            api_base: default_api_base(),
        }
    }
}

/// A Telegram session authenticated by a token.
pub struct TelegramTransport {
    config: TelegramConfig,
    client: reqwest::Client,
    last_update_id: i64,
    connected: AtomicBool,
}

impl TelegramTransport {
    pub fn new(config: TelegramConfig) -> Self {
        Self {
            config,
            client: reqwest::Client::new(),
            last_update_id: 0,
            connected: AtomicBool::new(false),
        }
    }

    fn api_url(&self, method: &str) -> String {
        format!(
            "{}/bot{}/{}",
            self.config.api_base.trim_end_matches('/'),
            self.config.token,
            method
        )
    }

    /// POST a Bot API method and unwrap the `{ok, result}` envelope.
    async fn call<T: DeserializeOwned>(&self, method: &str, body: serde_json::Value) -> Result<T> {
        let response = self
            .client
            .post(self.api_url(method))
            .json(&body)
            .timeout(std::time::Duration::from_secs(60))
            .send()
            .await
            .map_err(|e| AdRelayError::Transport(format!("Telegram {method} failed: {e}")))?;

        let body: TelegramApiResponse<T> = response
            .json()
            .await
            .map_err(|e| AdRelayError::Transport(format!("Invalid Telegram response: {e}")))?;

        body.into_result(method)
    }

    /// Verify the token and mark the session connected.
    pub async fn connect(&self) -> Result<Identity> {
        let me = self.get_me().await?;
        tracing::info!(
            "📡 Telegram session: @{} ({})",
            me.username.as_deref().unwrap_or("unknown"),
            me.first_name
        );
        self.connected.store(true, Ordering::Relaxed);
        Ok(me)
    }

    /// Get updates using long polling.
    pub async fn get_updates(&mut self) -> Result<Vec<TelegramUpdate>> {
        let updates: Vec<TelegramUpdate> = self
            .call(
                "getUpdates",
                serde_json::json!({
                    "offset": self.last_update_id + 1,
                    "timeout": 30,
                    "allowed_updates": ["message"],
                }),
            )
            .await?;

        if let Some(last) = updates.last() {
            self.last_update_id = last.update_id;
        }
        Ok(updates)
    }

    /// Start polling loop, returning a stream of incoming bot messages.
    pub fn start_polling(self) -> TelegramPollingStream {
        let (tx, rx) = tokio::sync::mpsc::unbounded_channel();

        tokio::spawn(async move {
            let mut channel = self;
            tracing::info!("Telegram polling loop started");

            loop {
                match channel.get_updates().await {
                    Ok(updates) => {
                        for update in updates {
                            if let Some(msg) = update.to_incoming()
                                && tx.send(msg).is_err()
                            {
                                tracing::info!("Telegram polling stopped (receiver dropped)");
                                return;
                            }
                        }
                    }
                    Err(AdRelayError::RateLimited { retry_after_secs }) => {
                        tracing::warn!("⏳ getUpdates rate limited for {retry_after_secs}s");
                        tokio::time::sleep(std::time::Duration::from_secs(retry_after_secs)).await;
                    }
                    Err(e) => {
                        tracing::error!("Telegram polling error: {e}");
                        tokio::time::sleep(std::time::Duration::from_secs(5)).await;
                    }
                }

                tokio::time::sleep(std::time::Duration::from_secs(channel.config.poll_interval))
                    .await;
            }
        });

        TelegramPollingStream { rx }
    }
}

#[async_trait]
impl Transport for TelegramTransport {
    fn name(&self) -> &str {
        "telegram"
    }

    async fn get_me(&self) -> Result<Identity> {
        let user: TelegramUser = self.call("getMe", serde_json::json!({})).await?;
        Ok(Identity {
            id: user.id,
            first_name: user.first_name,
            username: user.username,
        })
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Relaxed)
    }

    async fn send_message(&self, chat_id: i64, text: &str) -> Result<()> {
        let _: serde_json::Value = self
            .call(
                "sendMessage",
                serde_json::json!({ "chat_id": chat_id, "text": text }),
            )
            .await?;
        Ok(())
    }

    async fn send_media(&self, chat_id: i64, media: &Media, caption: &str) -> Result<()> {
        let (method, field) = match media.kind {
            MediaKind::Photo => ("sendPhoto", "photo"),
            MediaKind::Video => ("sendVideo", "video"),
        };
        let mut body = serde_json::json!({ "chat_id": chat_id, "caption": caption });
        body[field] = serde_json::Value::String(media.file_id.clone());
        let _: serde_json::Value = self.call(method, body).await?;
        Ok(())
    }
}

/// Builds one Telegram session per account token.
pub struct TelegramFactory {
    api_base: String,
}

impl TelegramFactory {
    pub fn new() -> Self {
        Self {
            api_base: default_api_base(),
        }
    }

    pub fn with_api_base(api_base: impl Into<String>) -> Self {
        Self {
            api_base: api_base.into(),
        }
    }
}

impl Default for TelegramFactory {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TransportFactory for TelegramFactory {
    async fn connect(&self, account: &Account) -> Result<Arc<dyn Transport>> {
        let token = account
            .session
            .as_deref()
            .filter(|s| !s.is_empty())
            .ok_or(AdRelayError::NoSession(account.user_id))?;
        let transport = TelegramTransport::new(TelegramConfig {
            token: token.to_string(),
            poll_interval: default_poll_interval(),
            api_base: self.api_base.clone(),
        });
        transport.connect().await?;
        Ok(Arc::new(transport))
    }
}

/// Stream of incoming bot messages from polling.
pub struct TelegramPollingStream {
    rx: tokio::sync::mpsc::UnboundedReceiver<IncomingMessage>,
}

impl Stream for TelegramPollingStream {
    type Item = IncomingMessage;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.rx.poll_recv(cx)
    }
}

/// A message the command bot received.
#[derive(Debug, Clone, PartialEq)]
pub struct IncomingMessage {
    pub chat_id: i64,
    pub sender_id: i64,
    pub sender_username: Option<String>,
    /// Text body, or the caption of a media message.
    pub text: String,
    pub media: Option<Media>,
    pub is_private: bool,
}

// --- Telegram API Types ---

#[derive(Debug, Deserialize)]
pub struct TelegramApiResponse<T> {
    pub ok: bool,
    pub result: Option<T>,
    pub description: Option<String>,
    pub error_code: Option<i64>,
    pub parameters: Option<ResponseParameters>,
}

#[derive(Debug, Deserialize)]
pub struct ResponseParameters {
    pub retry_after: Option<u64>,
}

impl<T> TelegramApiResponse<T> {
    /// Flood control (`429` + `retry_after`) becomes the rate-limit signal.
    pub fn into_result(self, method: &str) -> Result<T> {
        if self.ok {
            return self
                .result
                .ok_or_else(|| AdRelayError::Transport(format!("{method}: empty result")));
        }
        if let Some(retry_after_secs) = self.parameters.and_then(|p| p.retry_after) {
            return Err(AdRelayError::RateLimited { retry_after_secs });
        }
        Err(AdRelayError::Transport(format!(
            "{method} failed ({}): {}",
            self.error_code.unwrap_or_default(),
            self.description.unwrap_or_default()
        )))
    }
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
    pub caption: Option<String>,
    pub photo: Option<Vec<TelegramFile>>,
    pub video: Option<TelegramFile>,
    pub date: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelegramUser {
    pub id: i64,
    pub is_bot: bool,
    pub first_name: String,
    pub last_name: Option<String>,
    pub username: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelegramChat {
    pub id: i64,
    #[serde(rename = "type")]
    pub chat_type: String,
    pub title: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelegramFile {
    pub file_id: String,
}

impl TelegramUpdate {
    pub fn to_incoming(&self) -> Option<IncomingMessage> {
        let msg = self.message.as_ref()?;
        let from = msg.from.as_ref()?;

        // Skip bot messages
        if from.is_bot {
            return None;
        }

        // Telegram lists photo sizes smallest first
        let media = if let Some(sizes) = &msg.photo {
            sizes.last().map(|p| Media {
                kind: MediaKind::Photo,
                file_id: p.file_id.clone(),
            })
        } else {
            msg.video.as_ref().map(|v| Media {
                kind: MediaKind::Video,
                file_id: v.file_id.clone(),
            })
        };

        let text = msg.text.clone().or_else(|| msg.caption.clone());
        if text.is_none() && media.is_none() {
            return None;
        }

        Some(IncomingMessage {
            chat_id: msg.chat.id,
            sender_id: from.id,
            sender_username: from.username.clone(),
            text: text.unwrap_or_default(),
            media,
            is_private: msg.chat.chat_type == "private",
        })
    }
}

//! grammers-backed Telegram bot client.

use std::sync::Arc;

use async_trait::async_trait;
use grammers_client::client::{UpdateStream, UpdatesConfiguration};
use grammers_client::update::Update;
use grammers_client::message::InputMessage;
use grammers_client::{Client, InvocationError, SenderPool, sender};
use grammers_session::storages::SqliteSession;
use grammers_session::types::PeerRef;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::transport::{IncomingMessage, MessageTransport, TransportError, UserId};
use super::RateLimiter;
use crate::config::TelegramConfig;

/// Chat reference used by the Telegram transport.
pub type ChatRef = PeerRef;

impl From<InvocationError> for TransportError {
    fn from(err: InvocationError) -> Self {
        let err_str = err.to_string();

        // Check for flood wait errors
        if (err_str.contains("FLOOD_WAIT") || err_str.contains("flood"))
            && let Some(seconds) = extract_flood_wait_seconds(&err_str)
        {
            return Self::FloodWait(seconds);
        }

        Self::Invocation(err_str)
    }
}

/// Extracts flood wait seconds from an error message.
fn extract_flood_wait_seconds(err_msg: &str) -> Option<u32> {
    let patterns = ["FLOOD_WAIT_", "flood wait "];

    for pattern in patterns {
        if let Some(idx) = err_msg.to_lowercase().find(&pattern.to_lowercase()) {
            let start = idx + pattern.len();
            let num_str: String = err_msg[start..]
                .chars()
                .take_while(char::is_ascii_digit)
                .collect();
            if let Ok(seconds) = num_str.parse() {
                return Some(seconds);
            }
        }
    }
    None
}

/// A message the bot sent, enough to delete it later.
#[derive(Debug, Clone, Copy)]
pub struct SentMessage {
    /// Chat the message lives in.
    pub chat: ChatRef,

    /// Message ID within that chat.
    pub id: i32,
}

/// Stream of incoming text messages.
pub struct MessageStream {
    inner: UpdateStream,
}

impl MessageStream {
    /// Waits for the next incoming text message, skipping everything else.
    ///
    /// # Errors
    ///
    /// Returns an error if the update stream fails.
    pub async fn next_message(&mut self) -> Result<IncomingMessage<ChatRef>, TransportError> {
        loop {
            let update = self.inner.next().await?;

            let Update::NewMessage(message) = update else {
                continue;
            };
            if message.outgoing() || message.text().is_empty() {
                continue;
            }
            let Some(chat) = message.peer_ref() else {
                debug!("Skipping message {} without a resolvable chat", message.id());
                continue;
            };

            let sender = message.sender();
            let user = sender
                .as_ref()
                .map_or(chat.id.bot_api_dialog_id(), |s| s.id().bot_api_dialog_id());
            let sender_name = sender
                .as_ref()
                .and_then(|s| s.name().map(str::to_owned))
                .unwrap_or_default();

            return Ok(IncomingMessage {
                chat,
                user: UserId(user),
                sender_name,
                text: message.text().to_owned(),
            });
        }
    }
}

impl std::fmt::Debug for MessageStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MessageStream").finish_non_exhaustive()
    }
}

/// Telegram bot account connected over `MTProto`.
pub struct TelegramBot {
    /// The underlying grammers client.
    client: Client,

    /// Handle to the sender pool for disconnection.
    handle: sender::SenderPoolHandle,

    /// Rate limiter for API calls.
    rate_limiter: RateLimiter,

    /// Background task running the sender pool.
    _pool_task: JoinHandle<()>,
}

impl TelegramBot {
    /// Connects to Telegram, signs in as a bot if needed and opens the update stream.
    ///
    /// # Errors
    ///
    /// Returns an error if the session cannot be opened, the connection
    /// fails or the bot token is rejected.
    pub async fn connect(
        config: &TelegramConfig,
        min_interval_ms: u64,
    ) -> Result<(Self, MessageStream), TransportError> {
        info!("Connecting to Telegram...");

        let session = Arc::new(
            SqliteSession::open(&config.session_path)
                .await
                .map_err(|e| TransportError::Session(e.to_string()))?,
        );

        let SenderPool {
            runner,
            updates,
            handle,
        } = SenderPool::new(Arc::clone(&session), config.api_id);

        let client = Client::new(handle.clone());

        // Spawn the sender pool runner
        let pool_task = tokio::spawn(async move {
            runner.run().await;
        });

        let is_authorized = client
            .is_authorized()
            .await
            .map_err(|e| TransportError::Connection(e.to_string()))?;

        if !is_authorized {
            info!("Signing in with bot token...");
            client
                .bot_sign_in(&config.bot_token, &config.api_hash)
                .await
                .map_err(|e| TransportError::SignInFailed(e.to_string()))?;
        }

        info!("Connected to Telegram as a bot");

        let stream = client
            .stream_updates(
                updates,
                UpdatesConfiguration {
                    catch_up: false,
                    ..Default::default()
                },
            )
            .await;

        let bot = Self {
            client,
            handle: handle.thin,
            rate_limiter: RateLimiter::from_millis(min_interval_ms),
            _pool_task: pool_task,
        };

        Ok((bot, MessageStream { inner: stream }))
    }

    async fn send(
        &self,
        chat: ChatRef,
        message: InputMessage,
    ) -> Result<SentMessage, TransportError> {
        self.rate_limiter.wait_and_acquire().await;

        match self.client.send_message(chat, message).await {
            Ok(sent) => Ok(SentMessage {
                chat,
                id: sent.id(),
            }),
            Err(e) => Err(self.note_error(e).await),
        }
    }

    /// Converts an invocation error, feeding flood waits to the rate limiter.
    async fn note_error(&self, err: InvocationError) -> TransportError {
        let err: TransportError = err.into();
        if let TransportError::FloodWait(seconds) = &err {
            warn!("Flood wait triggered: {} seconds", seconds);
            self.rate_limiter.handle_flood_wait(*seconds).await;
        }
        err
    }

    /// Disconnects from Telegram.
    pub fn disconnect(&self) {
        info!("Disconnecting from Telegram...");
        self.handle.quit();
    }
}

#[async_trait]
impl MessageTransport for TelegramBot {
    type Chat = ChatRef;
    type Handle = SentMessage;

    async fn send_text(&self, chat: &ChatRef, text: &str) -> Result<SentMessage, TransportError> {
        debug!("Sending text: \"{}\"", truncate_for_log(text, 30));
        self.send(*chat, InputMessage::new().text(text)).await
    }

    async fn send_html(&self, chat: &ChatRef, html: &str) -> Result<SentMessage, TransportError> {
        debug!("Sending html: \"{}\"", truncate_for_log(html, 30));
        self.send(*chat, InputMessage::new().html(html)).await
    }

    async fn delete_message(&self, handle: &SentMessage) -> Result<(), TransportError> {
        self.rate_limiter.wait_and_acquire().await;

        match self.client.delete_messages(handle.chat, &[handle.id]).await {
            Ok(0) => Err(TransportError::NotDeleted(handle.id)),
            Ok(_) => Ok(()),
            Err(e) => Err(self.note_error(e).await),
        }
    }
}

impl std::fmt::Debug for TelegramBot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TelegramBot")
            .field("rate_limiter", &self.rate_limiter)
            .finish_non_exhaustive()
    }
}

/// Truncates a string for logging purposes.
fn truncate_for_log(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_owned()
    } else {
        format!("{}...", s.chars().take(max_len).collect::<String>())
    }
}

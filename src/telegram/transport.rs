//! Narrow messaging interface the bot core talks to.
//!
//! The dialogue and scheduler layers never see grammers types directly;
//! they only need to send text and delete what they sent.

use std::fmt;

use async_trait::async_trait;
use thiserror::Error;

/// Errors that can occur while talking to the messaging platform.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("Flood wait required: {0} seconds")]
    FloodWait(u32),

    #[error("Message {0} was not deleted (already gone or not permitted)")]
    NotDeleted(i32),

    #[error("Sign in failed: {0}")]
    SignInFailed(String),

    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Session error: {0}")]
    Session(String),

    #[error("API invocation error: {0}")]
    Invocation(String),
}

/// Identity of the person talking to the bot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct UserId(pub i64);

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// An inbound text message, already stripped of platform details.
#[derive(Debug, Clone)]
pub struct IncomingMessage<C> {
    /// Where replies go.
    pub chat: C,

    /// Who sent it; conversation state is keyed by this.
    pub user: UserId,

    /// Display name of the sender (may be empty).
    pub sender_name: String,

    /// Raw message text.
    pub text: String,
}

/// Sending and deleting messages.
///
/// Implementations must be safe to call concurrently from unrelated tasks;
/// a single instance is shared by every handler and every deletion task.
#[async_trait]
pub trait MessageTransport: Send + Sync + 'static {
    /// Chat a message can be sent to.
    type Chat: Clone + fmt::Debug + Send + Sync + 'static;

    /// Opaque reference to a sent message, enough to delete it later.
    type Handle: fmt::Debug + Send + Sync + 'static;

    /// Sends plain text.
    async fn send_text(
        &self,
        chat: &Self::Chat,
        text: &str,
    ) -> Result<Self::Handle, TransportError>;

    /// Sends HTML-formatted text. Falls back to plain text by default.
    async fn send_html(
        &self,
        chat: &Self::Chat,
        html: &str,
    ) -> Result<Self::Handle, TransportError> {
        self.send_text(chat, html).await
    }

    /// Deletes a previously sent message.
    async fn delete_message(&self, handle: &Self::Handle) -> Result<(), TransportError>;
}

/// Escapes text for Telegram's HTML parse mode.
pub fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            _ => out.push(c),
        }
    }
    out
}

//! Telegram messaging layer.
//!
//! Defines the transport interface the bot core depends on and the
//! grammers-backed implementation used by the binary.

mod client;
mod rate_limiter;
mod transport;

pub use client::{ChatRef, MessageStream, SentMessage, TelegramBot};
pub use rate_limiter::RateLimiter;
pub use transport::{IncomingMessage, MessageTransport, TransportError, UserId, escape_html};

#[cfg(test)]
pub(crate) use transport::mock;

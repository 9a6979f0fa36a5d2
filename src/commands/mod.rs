//! Command handling module.
//!
//! Recognizes `/start`, `/help`, `/setup` and `/cancel`, and routes every
//! inbound message to the dialogue or the default echo path.

mod handler;
mod types;

pub use handler::CommandRouter;
pub use types::BotCommand;

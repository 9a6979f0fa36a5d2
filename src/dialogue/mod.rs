//! Per-user `/setup` dialogue.
//!
//! Collects a delay and a message from the user, then echoes the message
//! and schedules its deletion.

mod controller;
mod duration;
mod state;

pub use controller::{
    ASK_CONTENT, ASK_DURATION, CANCELLED, DialogueController, NO_ACTIVE_SESSION, Outcome,
};
pub use duration::{DurationError, DurationSpec, MAX_DELAY_SECS, parse_duration};
pub use state::{ConversationGuard, ConversationState, ConversationStore, Stage};

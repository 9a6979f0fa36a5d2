//! Self Delete Bot Library
//!
//! A Telegram bot that echoes messages back and deletes the echo after
//! a delay.
//!
//! This crate provides the core functionality for:
//! - Parsing free-form delays such as `1h30m`
//! - Tracking each user's `/setup` dialogue
//! - Scheduling deferred message deletions
//! - Routing incoming messages and commands
//! - Talking to Telegram via `MTProto`

pub mod commands;
pub mod config;
pub mod dialogue;
pub mod scheduler;
pub mod telegram;

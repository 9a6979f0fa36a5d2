//! Configuration module for the bot.
//!
//! Handles loading and validation of Telegram credentials and
//! bot behaviour settings from the environment.

mod settings;

pub use settings::{BotSettings, ConfigError, TelegramConfig};

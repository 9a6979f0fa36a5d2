//! Application settings and Telegram configuration.

use std::path::PathBuf;

use thiserror::Error;

use crate::dialogue::{DurationError, DurationSpec, parse_duration};

/// Telegram API configuration.
#[derive(Clone)]
pub struct TelegramConfig {
    /// Telegram API ID (obtain from <https://my.telegram.org>).
    pub api_id: i32,

    /// Telegram API hash (obtain from <https://my.telegram.org>).
    pub api_hash: String,

    /// Bot token issued by `@BotFather`.
    pub bot_token: String,

    /// Path to the session file.
    pub session_path: PathBuf,
}

fn default_session_path() -> PathBuf {
    PathBuf::from("bot.session")
}

impl TelegramConfig {
    /// Creates configuration from environment variables.
    ///
    /// Expects `BOT_TOKEN`, `TG_API_ID` and `TG_API_HASH` to be set.
    ///
    /// # Errors
    ///
    /// Returns an error if environment variables are missing or invalid.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Creates configuration from an arbitrary key lookup.
    pub fn from_lookup(get: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let bot_token = get("BOT_TOKEN").ok_or(ConfigError::MissingEnvVar("BOT_TOKEN"))?;

        let api_id: i32 = get("TG_API_ID")
            .ok_or(ConfigError::MissingEnvVar("TG_API_ID"))?
            .parse()
            .map_err(|_| ConfigError::InvalidApiId)?;

        let api_hash = get("TG_API_HASH").ok_or(ConfigError::MissingEnvVar("TG_API_HASH"))?;

        let session_path = get("TG_SESSION_PATH").map_or_else(default_session_path, PathBuf::from);

        Ok(Self {
            api_id,
            api_hash,
            bot_token,
            session_path,
        })
    }
}

impl std::fmt::Debug for TelegramConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TelegramConfig")
            .field("api_id", &self.api_id)
            .field("session_path", &self.session_path)
            .finish_non_exhaustive()
    }
}

/// Bot-specific settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BotSettings {
    /// Delay applied to plain messages sent outside a dialogue.
    /// `None` means such messages are ignored.
    pub default_delete_after: Option<DurationSpec>,

    /// Minimum interval between Telegram API calls in milliseconds.
    pub min_api_interval_ms: u64,

    /// Delete everything still pending when the bot shuts down.
    pub flush_on_shutdown: bool,

    /// Telegram user ID of the bot owner, if configured.
    pub owner_id: Option<i64>,
}

fn default_delete_after() -> Option<DurationSpec> {
    Some(DurationSpec::from_secs(60))
}

fn default_min_api_interval() -> u64 {
    50
}

impl Default for BotSettings {
    fn default() -> Self {
        Self {
            default_delete_after: default_delete_after(),
            min_api_interval_ms: default_min_api_interval(),
            flush_on_shutdown: true,
            owner_id: None,
        }
    }
}

impl BotSettings {
    /// Creates bot settings from environment variables with defaults.
    ///
    /// # Errors
    ///
    /// Returns an error if a variable is set to an unusable value.
    pub fn from_env_with_defaults() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Creates bot settings from an arbitrary key lookup.
    pub fn from_lookup(get: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let default_delete_after = match get("DEFAULT_DELETE_AFTER") {
            None => default_delete_after(),
            Some(value) if is_off(&value) => None,
            Some(value) => Some(parse_duration(&value).map_err(ConfigError::InvalidDefaultDelay)?),
        };

        let min_api_interval_ms = get("MIN_API_INTERVAL_MS")
            .and_then(|s| s.trim().parse().ok())
            .unwrap_or_else(default_min_api_interval);

        let flush_on_shutdown = get("FLUSH_ON_SHUTDOWN").is_none_or(|s| !is_off(&s));

        let owner_id = get("BOT_OWNER_ID")
            .filter(|s| !s.trim().is_empty())
            .map(|s| s.trim().parse().map_err(|_| ConfigError::InvalidOwnerId))
            .transpose()?;

        Ok(Self {
            default_delete_after,
            min_api_interval_ms,
            flush_on_shutdown,
            owner_id,
        })
    }
}

fn is_off(value: &str) -> bool {
    matches!(
        value.trim().to_lowercase().as_str(),
        "off" | "false" | "no" | "0" | "none"
    )
}

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(&'static str),

    #[error("Invalid API ID format (must be a positive integer)")]
    InvalidApiId,

    #[error("Invalid DEFAULT_DELETE_AFTER: {0}")]
    InvalidDefaultDelay(#[source] DurationError),

    #[error("Invalid BOT_OWNER_ID (must be an integer user ID)")]
    InvalidOwnerId,
}

//! Self Delete Bot - Main Entry Point
//!
//! A Telegram bot that echoes messages and deletes the echo after a
//! user-chosen delay.

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::task::JoinSet;
use tracing::{debug, error, info};
use tracing_subscriber::EnvFilter;

use self_delete_bot::commands::CommandRouter;
use self_delete_bot::config::{BotSettings, TelegramConfig};
use self_delete_bot::telegram::{MessageStream, TelegramBot};

/// Telegram bot that deletes its own messages after a delay.
#[derive(Parser, Debug)]
#[command(name = "self_delete_bot")]
#[command(about = "Echo messages back and delete them after a delay")]
#[command(version)]
struct Args {
    /// Path to the .env file for environment variables.
    #[arg(long, default_value = ".env")]
    env_file: String,

    /// Log level (trace, debug, info, warn, error).
    #[arg(short, long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    init_logging(&args.log_level);

    // Load environment variables
    if let Err(e) = dotenvy::from_filename(&args.env_file) {
        debug!("Could not load .env file ({}): {}", args.env_file, e);
    }

    // Load configurations
    let tg_config = TelegramConfig::from_env()
        .context("Failed to load Telegram configuration from environment")?;

    let settings =
        BotSettings::from_env_with_defaults().context("Failed to load bot settings")?;

    match settings.default_delete_after {
        Some(delay) => info!("Plain messages are echoed and deleted after {}", delay),
        None => info!("Plain messages outside a dialogue are ignored"),
    }
    if let Some(owner) = settings.owner_id {
        info!("Bot owner: {}", owner);
    }

    // Connect to Telegram
    let (bot, updates) = TelegramBot::connect(&tg_config, settings.min_api_interval_ms)
        .await
        .context("Failed to connect to Telegram")?;

    let bot = Arc::new(bot);
    let router = Arc::new(CommandRouter::new(
        Arc::clone(&bot),
        settings.default_delete_after,
    ));

    info!("Bot is running. Use Ctrl+C to stop.");

    let mut handlers = JoinSet::new();

    // Wait for Ctrl+C or a dead update stream
    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, shutting down...");
        }
        result = receive_messages(updates, &router, &mut handlers) => {
            if let Err(e) = result {
                error!("Update stream failed: {:#}", e);
            }
        }
    }

    // Cleanup; intake is closed, in-flight handlers finish before the flush
    info!("Shutting down...");
    let deleted = router
        .shutdown(handlers, settings.flush_on_shutdown)
        .await;
    if deleted > 0 {
        info!("Deleted {} pending message(s) before exit", deleted);
    }
    bot.disconnect();

    Ok(())
}

/// Reads updates forever, handling each message in its own task.
async fn receive_messages(
    mut updates: MessageStream,
    router: &Arc<CommandRouter<TelegramBot>>,
    handlers: &mut JoinSet<()>,
) -> Result<()> {
    loop {
        let message = updates
            .next_message()
            .await
            .context("Failed to receive update")?;

        // Reap finished handlers so the set does not grow without bound.
        while handlers.try_join_next().is_some() {}

        router.spawn_route(handlers, message);
    }
}

/// Initializes the logging subsystem.
fn init_logging(level: &str) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

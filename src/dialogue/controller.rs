//! Dialogue state machine.
//!
//! ```text
//!   Idle ──/setup──▶ AwaitingDuration ──valid delay──▶ AwaitingContent ──text──▶ Idle
//!    ▲                   │    ▲ invalid delay                 │
//!    │                   │    └──────┘                        │
//!    └────────/cancel────┴────────────────────────────────────┘
//! ```
//!
//! `/start` and `/help` never change the stage. `/setup` restarts the
//! dialogue from any stage. Prompts are sent before the stage changes, so a
//! failed send leaves the user where they were; `/cancel` always ends the
//! dialogue.
//!
//! Completing the dialogue hands the echoed message to the scheduler and
//! returns to idle straight away; the deletion runs on its own. Plain text
//! while idle is echoed with the default delay, if one is configured.

use std::sync::Arc;

use tracing::{debug, info};

use super::duration::{DurationError, DurationSpec, parse_duration};
use super::state::{ConversationState, Stage};
use crate::commands::BotCommand;
use crate::scheduler::{DeletionId, DeletionScheduler};
use crate::telegram::{MessageTransport, TransportError, escape_html};

/// Reply to `/cancel` when there is nothing to cancel.
pub const NO_ACTIVE_SESSION: &str = "No active session to cancel.";

/// Reply to a successful `/cancel`.
pub const CANCELLED: &str = "Your current operation has been cancelled successfully.";

/// First `/setup` prompt.
pub const ASK_DURATION: &str =
    "Please type the time when I should delete the message (e.g., '15s', '2m', '1h30m').";

/// Second `/setup` prompt.
pub const ASK_CONTENT: &str = "Please type the message I should delete after this time.";

/// What handling one message did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// `/start` answered.
    Greeted,
    /// `/help` answered.
    HelpShown,
    /// `/setup` prompt sent; now awaiting a duration.
    SetupStarted,
    /// Duration parsed; now awaiting content.
    DurationAccepted(DurationSpec),
    /// Duration rejected; still awaiting a duration.
    DurationRejected(DurationError),
    /// Text echoed and its deletion scheduled.
    Scheduled { id: DeletionId, delay: DurationSpec },
    /// Dialogue cancelled.
    Cancelled,
    /// `/cancel` with no dialogue in progress.
    NothingToCancel,
    /// Message needed no reply.
    Ignored,
}

/// Drives users through the `/setup` dialogue.
///
/// Holds no per-user data itself; callers pass in the locked state of the
/// user being served.
pub struct DialogueController<T: MessageTransport> {
    transport: Arc<T>,
    scheduler: DeletionScheduler<T>,

    /// Delay for plain messages outside a dialogue; `None` ignores them.
    default_delete_after: Option<DurationSpec>,
}

impl<T: MessageTransport> DialogueController<T> {
    /// Creates a controller sending through `transport` and deleting through `scheduler`.
    #[must_use]
    pub fn new(
        transport: Arc<T>,
        scheduler: DeletionScheduler<T>,
        default_delete_after: Option<DurationSpec>,
    ) -> Self {
        Self {
            transport,
            scheduler,
            default_delete_after,
        }
    }

    /// Scheduler used for deferred deletions.
    #[must_use]
    pub fn scheduler(&self) -> &DeletionScheduler<T> {
        &self.scheduler
    }

    /// Handles one of the bot commands.
    pub async fn handle_command(
        &self,
        chat: &T::Chat,
        state: &mut ConversationState,
        command: BotCommand,
        sender_name: &str,
    ) -> Result<Outcome, TransportError> {
        match command {
            BotCommand::Start => self.start(chat, sender_name).await,
            BotCommand::Help => self.help(chat).await,
            BotCommand::Setup => self.setup(chat, state).await,
            BotCommand::Cancel => self.cancel(chat, state).await,
        }
    }

    /// Handles non-command text according to the current stage.
    pub async fn handle_text(
        &self,
        chat: &T::Chat,
        state: &mut ConversationState,
        text: &str,
    ) -> Result<Outcome, TransportError> {
        match state.stage {
            Stage::Idle => self.receive_free_text(chat, state, text).await,
            Stage::AwaitingDuration => self.receive_duration(chat, state, text).await,
            Stage::AwaitingContent { delay } => {
                self.receive_content(chat, state, text, delay).await
            }
        }
    }

    /// Greets the user. Stage is untouched.
    pub async fn start(
        &self,
        chat: &T::Chat,
        sender_name: &str,
    ) -> Result<Outcome, TransportError> {
        let name = if sender_name.trim().is_empty() {
            "there"
        } else {
            sender_name
        };
        self.transport
            .send_html(chat, &format!("Hello, <b>{}</b>!", escape_html(name)))
            .await?;
        Ok(Outcome::Greeted)
    }

    /// Lists the commands. Stage is untouched.
    pub async fn help(&self, chat: &T::Chat) -> Result<Outcome, TransportError> {
        self.transport.send_text(chat, &BotCommand::help_text()).await?;
        Ok(Outcome::HelpShown)
    }

    /// Starts (or restarts) the dialogue.
    pub async fn setup(
        &self,
        chat: &T::Chat,
        state: &mut ConversationState,
    ) -> Result<Outcome, TransportError> {
        self.transport.send_text(chat, ASK_DURATION).await?;

        if !state.is_idle() {
            debug!("Restarting setup for user {} (was {})", state.user, state.stage.name());
        }
        state.stage = Stage::AwaitingDuration;
        debug!("Set stage to awaiting_duration for user {}", state.user);

        Ok(Outcome::SetupStarted)
    }

    /// Cancels whatever dialogue is in progress.
    pub async fn cancel(
        &self,
        chat: &T::Chat,
        state: &mut ConversationState,
    ) -> Result<Outcome, TransportError> {
        if state.is_idle() {
            self.transport.send_text(chat, NO_ACTIVE_SESSION).await?;
            return Ok(Outcome::NothingToCancel);
        }

        state.reset();
        info!("Cancelled operation for user {}", state.user);

        // The dialogue is over even if the confirmation cannot be delivered.
        self.transport.send_text(chat, CANCELLED).await?;
        Ok(Outcome::Cancelled)
    }

    async fn receive_duration(
        &self,
        chat: &T::Chat,
        state: &mut ConversationState,
        text: &str,
    ) -> Result<Outcome, TransportError> {
        match parse_duration(text) {
            Ok(delay) => {
                self.transport.send_text(chat, ASK_CONTENT).await?;
                state.stage = Stage::AwaitingContent { delay };
                debug!(
                    "Stage set to awaiting_content with delay {} for user {}",
                    delay, state.user
                );
                Ok(Outcome::DurationAccepted(delay))
            }
            Err(e) => {
                debug!("Invalid time format from user {}: {:?}", state.user, text);
                self.transport.send_text(chat, &e.to_string()).await?;
                Ok(Outcome::DurationRejected(e))
            }
        }
    }

    async fn receive_content(
        &self,
        chat: &T::Chat,
        state: &mut ConversationState,
        text: &str,
        delay: DurationSpec,
    ) -> Result<Outcome, TransportError> {
        let id = self.echo_and_schedule(chat, text, delay).await?;
        state.reset();
        info!(
            "Dialogue complete for user {}: deletion {} in {}",
            state.user, id, delay
        );
        Ok(Outcome::Scheduled { id, delay })
    }

    async fn receive_free_text(
        &self,
        chat: &T::Chat,
        state: &ConversationState,
        text: &str,
    ) -> Result<Outcome, TransportError> {
        let Some(delay) = self.default_delete_after else {
            return Ok(Outcome::Ignored);
        };

        let id = self.echo_and_schedule(chat, text, delay).await?;
        info!(
            "Echoed free text from user {}, deletion {} in {}",
            state.user, id, delay
        );
        Ok(Outcome::Scheduled { id, delay })
    }

    /// Echoes `text` back and schedules deletion of the echo.
    ///
    /// Returns once the deletion is scheduled, not once it has happened.
    ///
    /// # Errors
    ///
    /// Returns the transport error if the echo cannot be sent; nothing is
    /// scheduled in that case.
    pub async fn echo_and_schedule(
        &self,
        chat: &T::Chat,
        text: &str,
        delay: DurationSpec,
    ) -> Result<DeletionId, TransportError> {
        let handle = self.transport.send_text(chat, text).await?;
        Ok(self.scheduler.schedule(handle, delay.as_duration()).await)
    }
}

impl<T: MessageTransport> std::fmt::Debug for DialogueController<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DialogueController")
            .field("scheduler", &self.scheduler)
            .field("default_delete_after", &self.default_delete_after)
            .finish_non_exhaustive()
    }
}

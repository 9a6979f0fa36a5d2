//! Command types and definitions.

use std::fmt;

/// Available bot commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BotCommand {
    /// Greet the user.
    Start,

    /// Show the command list.
    Help,

    /// Start the delete-later dialogue.
    Setup,

    /// Abort the current dialogue.
    Cancel,
}

impl BotCommand {
    /// Every command, in help order.
    pub const ALL: [Self; 4] = [Self::Start, Self::Help, Self::Setup, Self::Cancel];

    /// Parses a command from a message text.
    ///
    /// The command must be the first word of the message. A `@botname`
    /// suffix (as Telegram adds in groups) and trailing arguments are
    /// allowed. Matching is case-sensitive.
    ///
    /// Returns `None` if the message is not one of the bot's commands.
    #[must_use]
    pub fn parse(text: &str) -> Option<Self> {
        let first = text.split_whitespace().next()?;
        let name = first.strip_prefix('/')?;
        let name = name.split_once('@').map_or(name, |(cmd, _bot)| cmd);

        Self::ALL.into_iter().find(|cmd| cmd.name() == name)
    }

    /// Returns the command name without the leading slash.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Start => "start",
            Self::Help => "help",
            Self::Setup => "setup",
            Self::Cancel => "cancel",
        }
    }

    /// Returns the command description for help.
    #[must_use]
    pub const fn description(&self) -> &'static str {
        match self {
            Self::Start => "Start the bot",
            Self::Help => "Get help",
            Self::Setup => "Setup a message to be deleted after a specified time",
            Self::Cancel => "Cancel the current operation",
        }
    }

    /// Help text listing all commands, one per line.
    #[must_use]
    pub fn help_text() -> String {
        Self::ALL
            .iter()
            .map(|cmd| format!("{cmd} - {}", cmd.description()))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

impl fmt::Display for BotCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "/{}", self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_commands() {
        assert_eq!(BotCommand::parse("/start"), Some(BotCommand::Start));
        assert_eq!(BotCommand::parse("/help"), Some(BotCommand::Help));
        assert_eq!(BotCommand::parse("/setup"), Some(BotCommand::Setup));
        assert_eq!(BotCommand::parse("/cancel"), Some(BotCommand::Cancel));
    }

    #[test]
    fn test_parse_with_bot_mention_and_args() {
        assert_eq!(
            BotCommand::parse("/cancel@self_delete_bot"),
            Some(BotCommand::Cancel)
        );
        assert_eq!(BotCommand::parse("/setup now please"), Some(BotCommand::Setup));
        assert_eq!(BotCommand::parse("  /help  "), Some(BotCommand::Help));
    }

    #[test]
    fn test_parse_rejects_other_text() {
        assert_eq!(BotCommand::parse("hello"), None);
        assert_eq!(BotCommand::parse("15s"), None);
        assert_eq!(BotCommand::parse("/unknown"), None);
        assert_eq!(BotCommand::parse("please /cancel"), None);
        assert_eq!(BotCommand::parse(""), None);
    }

    #[test]
    fn test_parse_is_case_sensitive() {
        assert_eq!(BotCommand::parse("/Cancel"), None);
        assert_eq!(BotCommand::parse("/SETUP"), None);
    }

    #[test]
    fn test_help_text() {
        let help = BotCommand::help_text();
        assert_eq!(help.lines().count(), 4);
        assert!(help.starts_with("/start - Start the bot"));
        assert!(help.contains("/cancel - Cancel the current operation"));
    }
}

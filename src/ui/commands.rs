use std::str::FromStr;

use strum::{AsRefStr, EnumIter, EnumString, IntoEnumIterator, IntoStaticStr};

/// Commands that can be invoked by starting a chat line with a leading slash.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, EnumString, EnumIter, AsRefStr, IntoStaticStr,
)]
#[strum(serialize_all = "kebab-case")]
pub enum SlashCommand {
    /// Show past conversations
    History,
    /// Delete one history entry
    Delete,
    /// Delete all history entries
    ClearHistory,
    /// Start a fresh conversation
    New,
    /// Exit the chat
    Bye,
    /// Show help
    Help,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedCommand {
    pub command: SlashCommand,
    pub argument: Option<String>,
}

impl ParsedCommand {
    pub fn argument(&self) -> Option<&str> {
        self.argument.as_deref()
    }
}

impl SlashCommand {
    /// User-visible description shown in help.
    pub fn description(self) -> &'static str {
        match self {
            SlashCommand::History => "list past conversations",
            SlashCommand::Delete => "delete a history entry by number or id",
            SlashCommand::ClearHistory => "delete all history entries",
            SlashCommand::New => "start a new conversation",
            SlashCommand::Bye => "exit the chat",
            SlashCommand::Help => "show available commands",
        }
    }

    /// Command string without the leading '/'.
    pub fn command(self) -> &'static str {
        self.into()
    }
}

/// Return all built-in commands paired with their command string.
pub fn built_in_slash_commands() -> Vec<(&'static str, SlashCommand)> {
    SlashCommand::iter().map(|c| (c.command(), c)).collect()
}

/// Parse a slash command from user input
pub fn parse_slash_command(input: &str) -> Option<ParsedCommand> {
    let input = input.trim();
    if !input.starts_with('/') {
        return None;
    }

    let mut parts = input[1..].split_whitespace();
    let head = parts.next()?;
    let rest: Vec<&str> = parts.collect();

    let command = SlashCommand::from_str(head).ok().or_else(|| {
        match head.to_lowercase().as_str() {
            "q" | "quit" | "exit" => Some(SlashCommand::Bye),
            "h" | "?" => Some(SlashCommand::Help),
            "rm" | "del" => Some(SlashCommand::Delete),
            "ls" => Some(SlashCommand::History),
            _ => None,
        }
    })?;

    let argument = if rest.is_empty() {
        None
    } else {
        Some(rest.join(" "))
    };

    Some(ParsedCommand { command, argument })
}

/// Get help text for all available commands
pub fn get_help_text() -> String {
    let mut help = String::from("Available commands:\n\n");
    for (command_str, command) in built_in_slash_commands() {
        help.push_str(&format!("/{} - {}\n", command_str, command.description()));
    }

    help.push_str("\nAliases: /q for /bye, /ls for /history, /rm for /delete");
    help
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_kebab_case_names() {
        let parsed = parse_slash_command("/clear-history").unwrap();
        assert_eq!(parsed.command, SlashCommand::ClearHistory);
        assert_eq!(parsed.argument(), None);
    }

    #[test]
    fn parses_aliases_and_arguments() {
        let parsed = parse_slash_command("  /rm 2 ").unwrap();
        assert_eq!(parsed.command, SlashCommand::Delete);
        assert_eq!(parsed.argument(), Some("2"));

        assert_eq!(parse_slash_command("/quit").unwrap().command, SlashCommand::Bye);
    }

    #[test]
    fn plain_text_and_unknown_commands_are_not_commands() {
        assert!(parse_slash_command("where is room A.101?").is_none());
        assert!(parse_slash_command("/teleport").is_none());
        assert!(parse_slash_command("/").is_none());
    }

    #[test]
    fn help_lists_every_command() {
        let help = get_help_text();
        for (name, _) in built_in_slash_commands() {
            assert!(help.contains(&format!("/{}", name)));
        }
    }
}

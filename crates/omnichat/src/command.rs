//! Slash commands typed at the prompt.

/// A command typed at the prompt instead of a message.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ChatCommand {
    /// Starts the conversation over.
    Reset,
    /// Lists the commands.
    Help,
    /// Leaves the program.
    Quit,
    /// Looks like a command but isn't one.
    Invalid(String),
}

/// Parses a command. Returns `None` if the input is a message.
pub fn parse_command(input: &str) -> Option<ChatCommand> {
    let input = input.trim();
    let name = input.strip_prefix('/')?;
    if name.is_empty() {
        return None;
    }

    let command = match name.to_lowercase().as_str() {
        "reset" | "clear" | "new" => ChatCommand::Reset,
        "help" | "?" => ChatCommand::Help,
        "quit" | "exit" | "q" => ChatCommand::Quit,
        _ => ChatCommand::Invalid(format!(
            "unknown command: {input} (type /help for a list)"
        )),
    };
    Some(command)
}

/// Returns the help text for the prompt.
pub fn help_text() -> &'static str {
    r#"Available commands:
  /reset        Start a new conversation
  /help         Show this help message
  /quit         Exit the chat

Press Enter to send, Alt+Enter for a new line.
Press Ctrl+C while a reply is streaming to stop it and start over."#
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_commands() {
        assert_eq!(parse_command("/reset"), Some(ChatCommand::Reset));
        assert_eq!(parse_command("  /HELP "), Some(ChatCommand::Help));
        assert_eq!(parse_command("/q"), Some(ChatCommand::Quit));
        assert_eq!(parse_command("/exit"), Some(ChatCommand::Quit));
        assert!(matches!(
            parse_command("/frobnicate"),
            Some(ChatCommand::Invalid(msg)) if msg.contains("/frobnicate")
        ));
    }

    #[test]
    fn test_messages_are_not_commands() {
        assert_eq!(parse_command("hello"), None);
        assert_eq!(parse_command("what does /reset do?"), None);
        assert_eq!(parse_command("/"), None);
    }

    #[test]
    fn test_help_text() {
        let help = help_text();
        for command in ["/reset", "/help", "/quit"] {
            assert!(help.contains(command));
        }
    }
}

//! Parsing of lines typed at the prompt

use potato_core::ChannelId;

/// A single line of user input
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// `/join <channel>`
    Join(ChannelId),
    /// `/leave`
    Leave,
    /// `/status`
    Status,
    /// `/quit`
    Quit,
    /// `/help` or an unknown slash command
    Help,
    /// Anything else is posted to the active channel
    Say(String),
    /// Blank line
    Empty,
}

impl Command {
    pub fn parse(line: &str) -> Self {
        let line = line.trim();
        if line.is_empty() {
            return Command::Empty;
        }
        let Some(rest) = line.strip_prefix('/') else {
            return Command::Say(line.to_string());
        };

        let mut parts = rest.split_whitespace();
        match (parts.next(), parts.next()) {
            (Some("join"), Some(channel)) => Command::Join(ChannelId::from(channel)),
            (Some("leave"), None) => Command::Leave,
            (Some("status"), None) => Command::Status,
            (Some("quit"), None) | (Some("exit"), None) => Command::Quit,
            _ => Command::Help,
        }
    }
}

pub const HELP: &str =
    "commands: /join <channel>  /leave  /status  /quit  (anything else is sent as a message)";

// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Slash-command parsing.
//!
//! Commands are exempt from the user-turn quota (but not chat-flood).
//! `/command@botname` forms are accepted; the bot-name suffix is dropped.

/// A recognized command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Start,
    Settings,
    Network,
    /// `/wallet [sub]` with an optional subcommand word.
    Wallet(Option<String>),
    Cancel,
}

impl Command {
    /// Bare command name, matching the quota-exemption allow-list.
    pub fn name(&self) -> &'static str {
        match self {
            Command::Start => "start",
            Command::Settings => "settings",
            Command::Network => "network",
            Command::Wallet(_) => "wallet",
            Command::Cancel => "cancel",
        }
    }
}

/// Parse a message text into a command, if it is one.
///
/// Returns `None` for plain text and for unknown commands (unknown
/// commands fall through to the agent as ordinary text).
pub fn parse(text: &str) -> Option<Command> {
    let text = text.trim();
    let stripped = text.strip_prefix('/')?;
    let mut words = stripped.split_whitespace();
    let head = words.next()?;
    // Drop an @botname suffix.
    let name = head.split('@').next().unwrap_or(head);

    match name {
        "start" => Some(Command::Start),
        "settings" => Some(Command::Settings),
        "network" => Some(Command::Network),
        "wallet" => Some(Command::Wallet(words.next().map(str::to_string))),
        "cancel" => Some(Command::Cancel),
        _ => None,
    }
}

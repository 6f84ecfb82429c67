//! Special commands parser for interactive chat
//!
//! Lines starting with `/` manage sessions and audio instead of being sent
//! as messages. Command names are case-insensitive; arguments keep their
//! case.

use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur when parsing special commands
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CommandError {
    /// Unknown command was entered
    #[error("Unknown command: {0}\n\nType '/help' to see available commands")]
    UnknownCommand(String),

    /// Command was given an unsupported argument
    #[error("Unsupported argument for {command}: {arg}\n\nType '/help' to see valid usage")]
    UnsupportedArgument { command: String, arg: String },

    /// Command requires an argument but none was provided
    #[error("Command {command} requires an argument\n\nUsage: {usage}")]
    MissingArgument { command: String, usage: String },
}

/// Special commands that can be executed during interactive chat
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SpecialCommand {
    /// Leave the current session and start a new chat
    NewChat,

    /// Open a stored session by id
    Open(String),

    /// List stored sessions
    List,

    /// Delete a stored session by id
    Delete(String),

    /// Fetch the audio of a message and write it to a file
    Play {
        message_id: i64,
        output: Option<PathBuf>,
    },

    /// Show help
    Help,

    /// Exit the chat
    Exit,

    /// Not a special command; send as a message
    None,
}

fn required_arg(command: &str, usage: &str, arg: Option<&str>) -> Result<String, CommandError> {
    arg.map(str::to_string)
        .ok_or_else(|| CommandError::MissingArgument {
            command: command.to_string(),
            usage: usage.to_string(),
        })
}

/// Parse a line of chat input
///
/// # Examples
///
/// ```
/// use parley::commands::special_commands::{parse_special_command, SpecialCommand};
///
/// assert_eq!(parse_special_command("/new").unwrap(), SpecialCommand::NewChat);
/// assert_eq!(parse_special_command("hello").unwrap(), SpecialCommand::None);
/// assert!(parse_special_command("/foo").is_err());
/// ```
pub fn parse_special_command(input: &str) -> Result<SpecialCommand, CommandError> {
    let trimmed = input.trim();
    let lower = trimmed.to_lowercase();

    if !trimmed.starts_with('/') && lower != "exit" && lower != "quit" {
        return Ok(SpecialCommand::None);
    }

    let mut parts = trimmed.split_whitespace();
    let command = parts.next().unwrap_or(trimmed).to_lowercase();
    let first = parts.next();
    let second = parts.next();
    if let Some(extra) = parts.next() {
        return Err(CommandError::UnsupportedArgument {
            command,
            arg: extra.to_string(),
        });
    }

    match command.as_str() {
        "/new" => Ok(SpecialCommand::NewChat),
        "/list" | "/sessions" => Ok(SpecialCommand::List),
        "/open" => Ok(SpecialCommand::Open(required_arg(
            "/open",
            "/open <SESSION_ID>",
            first,
        )?)),
        "/delete" => Ok(SpecialCommand::Delete(required_arg(
            "/delete",
            "/delete <SESSION_ID>",
            first,
        )?)),
        "/play" => {
            let raw = required_arg("/play", "/play <MESSAGE_ID> [OUTPUT]", first)?;
            let message_id = raw
                .parse::<i64>()
                .map_err(|_| CommandError::UnsupportedArgument {
                    command: "/play".to_string(),
                    arg: raw.clone(),
                })?;
            Ok(SpecialCommand::Play {
                message_id,
                output: second.map(PathBuf::from),
            })
        }
        "/help" | "/?" => Ok(SpecialCommand::Help),
        "exit" | "quit" | "/exit" | "/quit" => Ok(SpecialCommand::Exit),
        other => Err(CommandError::UnknownCommand(other.to_string())),
    }
}

/// Display help text for special commands
pub fn print_help() {
    println!(
        r#"
Chat Commands
=============

SESSIONS:
  /new                      - Start a new chat
  /list                     - List stored sessions
  /open <SESSION_ID>        - Open a stored session
  /delete <SESSION_ID>      - Delete a session and its messages

AUDIO:
  /play <MESSAGE_ID> [FILE] - Save the spoken version of a message
                              (default file: message-<ID>.mp3)

OTHER:
  /help                     - Show this help message
  /quit                     - Exit (also: exit, quit, Ctrl-D)

Any other text is sent as a message. Message ids are shown in brackets.
"#
    );
}

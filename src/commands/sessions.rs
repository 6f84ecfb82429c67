use crate::cli::SessionCommand;
use crate::config::Config;
use crate::error::Result;
use crate::storage::SqliteStorage;
use colored::Colorize;
use prettytable::{format, Table};

fn shorten(text: &str, max_chars: usize) -> String {
    if text.chars().count() > max_chars {
        let head: String = text.chars().take(max_chars.saturating_sub(3)).collect();
        format!("{}...", head)
    } else {
        text.to_string()
    }
}

/// Handle session management commands against the local store
pub fn handle_sessions(config: &Config, command: SessionCommand) -> Result<()> {
    let storage = SqliteStorage::from_config(&config.server)?;

    match command {
        SessionCommand::List => {
            let sessions = storage.list_sessions()?;

            if sessions.is_empty() {
                println!("{}", "No chat sessions found.".yellow());
                return Ok(());
            }

            let mut table = Table::new();
            table.set_format(*format::consts::FORMAT_BORDERS_ONLY);

            table.add_row(prettytable::row![
                "ID".bold(),
                "Title".bold(),
                "Messages".bold(),
                "Created".bold()
            ]);

            for session in sessions {
                let message_count = storage.list_messages(&session.id)?.len();
                let created = session.created_at.format("%Y-%m-%d %H:%M").to_string();

                table.add_row(prettytable::row![
                    session.id.cyan(),
                    shorten(&session.title, 40),
                    message_count,
                    created
                ]);
            }

            println!("\nChat Sessions:");
            table.printstd();
            println!();
            println!(
                "Use {} to continue a session.",
                "parley chat --session <ID>".cyan()
            );
            println!();
        }
        SessionCommand::Delete { id } => {
            if storage.delete_session(&id)? {
                println!("{}", format!("Deleted chat session {}", id).green());
            } else {
                println!("{}", format!("No chat session with id {}", id).yellow());
            }
        }
    }

    Ok(())
}

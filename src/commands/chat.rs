//! Interactive chat handler
//!
//! Connects to a running `parley serve`, opens the local audio cache and
//! runs a readline loop that feeds the send pipeline.

use super::special_commands::{parse_special_command, print_help, SpecialCommand};
use crate::client::{
    AudioCache, AudioPlayer, ChatBackend, ChatPipeline, HttpBackend, SendOutcome, ViewEntry,
};
use crate::config::Config;
use crate::error::{ParleyError, Result};
use crate::providers::Role;

use base64::Engine;
use colored::Colorize;
use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;
use std::path::PathBuf;
use std::sync::Arc;

type Pipeline = ChatPipeline<dyn ChatBackend>;
type Player = AudioPlayer<dyn ChatBackend>;

/// Start interactive chat mode
///
/// # Arguments
///
/// * `config` - Global configuration (consumed)
/// * `session` - Optional session to open on start
pub async fn run_chat(config: Config, session: Option<String>) -> Result<()> {
    tracing::info!("Starting interactive chat against {}", config.client.server_url);

    let backend: Arc<dyn ChatBackend> = Arc::new(HttpBackend::new(&config.client)?);
    let cache = AudioCache::open(
        config.client.resolved_audio_cache_path()?,
        config.client.audio_retention(),
    )?;
    let pipeline: Pipeline = ChatPipeline::new(Arc::clone(&backend));
    let player: Player = AudioPlayer::new(backend, Arc::new(cache));

    print_welcome_banner(&config.client.server_url);

    if let Some(id) = session {
        if pipeline.open_session(&id).await.is_ok() {
            print_entries(&pipeline.entries());
        }
        print_notices(&pipeline);
    }

    let mut rl = DefaultEditor::new()?;

    loop {
        let prompt = format_prompt(pipeline.active_session().as_deref());
        match rl.readline(&prompt) {
            Ok(line) => {
                let trimmed = line.trim();
                if trimmed.is_empty() {
                    continue;
                }
                rl.add_history_entry(trimmed)?;

                let command = match parse_special_command(trimmed) {
                    Ok(command) => command,
                    Err(e) => {
                        println!("{}\n", e.to_string().red());
                        continue;
                    }
                };

                match command {
                    SpecialCommand::Exit => break,
                    SpecialCommand::Help => print_help(),
                    SpecialCommand::NewChat => {
                        pipeline.new_chat();
                        println!("{}\n", "Started a new chat".green());
                    }
                    SpecialCommand::List => list_sessions(&pipeline).await,
                    SpecialCommand::Open(id) => {
                        if pipeline.open_session(&id).await.is_ok() {
                            print_entries(&pipeline.entries());
                        }
                    }
                    SpecialCommand::Delete(id) => {
                        if pipeline.delete_session(&id).await.is_ok() {
                            println!("{}\n", format!("Deleted chat session {}", id).green());
                        }
                    }
                    SpecialCommand::Play { message_id, output } => {
                        if let Err(e) = play(&pipeline, &player, message_id, output).await {
                            println!("{}\n", format!("Error: {}", e).red());
                        }
                    }
                    SpecialCommand::None => send(&pipeline, trimmed).await,
                }
                print_notices(&pipeline);
            }
            Err(ReadlineError::Interrupted) => {
                println!("CTRL-C");
                break;
            }
            Err(ReadlineError::Eof) => {
                println!("CTRL-D");
                break;
            }
            Err(err) => {
                tracing::error!("Readline error: {:?}", err);
                break;
            }
        }
    }

    println!("Goodbye!");
    Ok(())
}

async fn send(pipeline: &Pipeline, content: &str) {
    let active = pipeline.active_session();
    println!("{}", "Thinking...".dimmed());
    match pipeline.send(content, active.as_deref()).await {
        Ok(SendOutcome::Committed { messages, .. }) => {
            for message in messages.iter().filter(|m| m.role == Role::Assistant) {
                print_entry(&ViewEntry::Committed(message.clone()));
            }
            println!();
        }
        Ok(SendOutcome::Discarded) => {}
        Err(e) => tracing::debug!("Send failed: {}", e),
    }
}

async fn list_sessions(pipeline: &Pipeline) {
    match pipeline.list_sessions().await {
        Ok(sessions) if sessions.is_empty() => {
            println!("{}\n", "No chat sessions found.".yellow());
        }
        Ok(sessions) => {
            let active = pipeline.active_session();
            for session in sessions {
                let marker = if active.as_deref() == Some(session.id.as_str()) {
                    "*"
                } else {
                    " "
                };
                println!(
                    "{} {}  {}  {}",
                    marker,
                    session.id.cyan(),
                    session.created_at.format("%Y-%m-%d %H:%M"),
                    session.title
                );
            }
            println!();
        }
        Err(e) => println!("{}\n", format!("Error: {}", e).red()),
    }
}

async fn play(
    pipeline: &Pipeline,
    player: &Player,
    message_id: i64,
    output: Option<PathBuf>,
) -> Result<()> {
    let message = pipeline.committed_message(message_id).ok_or_else(|| {
        ParleyError::Validation(format!("Message {} is not in the open chat", message_id))
    })?;

    if player.is_generating(message_id) {
        println!("{}", "Audio is already being generated...".dimmed());
    }
    let audio = player
        .audio_for(&message)
        .await
        .map_err(|e| ParleyError::Provider(e.to_string()))?;

    let bytes = base64::engine::general_purpose::STANDARD
        .decode(audio.trim())
        .map_err(|e| ParleyError::Provider(format!("Audio is not valid base64: {}", e)))?;

    let path = output.unwrap_or_else(|| PathBuf::from(format!("message-{}.mp3", message_id)));
    tokio::fs::write(&path, &bytes).await?;
    println!(
        "{}\n",
        format!("Saved {} bytes of audio to {}", bytes.len(), path.display()).green()
    );
    Ok(())
}

fn format_prompt(active: Option<&str>) -> String {
    match active {
        Some(id) => format!("[{}] >> ", short_id(id)).cyan().to_string(),
        None => "[new] >> ".cyan().to_string(),
    }
}

fn short_id(id: &str) -> String {
    id.chars().take(8).collect()
}

fn print_entry(entry: &ViewEntry) {
    let label = match entry.role() {
        Role::User => "you".bold(),
        Role::Assistant => "assistant".green().bold(),
        Role::System => "system".yellow().bold(),
    };
    let id = entry
        .message_id()
        .map(|id| format!("[{}]", id))
        .unwrap_or_else(|| "[...]".to_string());
    println!("{} {}: {}", id.dimmed(), label, entry.content());
}

fn print_entries(entries: &[ViewEntry]) {
    if entries.is_empty() {
        println!("{}\n", "No messages yet.".dimmed());
        return;
    }
    for entry in entries {
        print_entry(entry);
    }
    println!();
}

fn print_notices(pipeline: &Pipeline) {
    for notice in pipeline.take_notices() {
        println!(
            "{}\n",
            format!("{}: {}", notice.title, notice.description).red()
        );
    }
}

fn print_welcome_banner(server_url: &str) {
    println!();
    println!("{}", "Parley chat".bold());
    println!("Connected to {}", server_url.cyan());
    println!("Type {} for commands, {} to leave.", "/help".cyan(), "/quit".cyan());
    println!();
}

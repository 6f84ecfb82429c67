//! Command-line interface definition for Parley
//!
//! This module defines the CLI structure using clap's derive API,
//! providing commands for running the proxy server, chatting against it,
//! and managing stored sessions.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Parley - chat proxy for hosted LLM and text-to-speech APIs
///
/// Run the HTTP proxy with `serve`, then talk to it with `chat`.
#[derive(Parser, Debug, Clone)]
#[command(name = "parley")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "config/config.yaml")]
    pub config: Option<String>,

    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,

    /// Command to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Available commands for Parley
#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Run the HTTP proxy server
    Serve {
        /// Address to listen on (overrides server.bind)
        #[arg(short, long)]
        bind: Option<String>,

        /// SQLite database file (overrides server.database_path)
        #[arg(short, long, env = "PARLEY_DATABASE")]
        database: Option<PathBuf>,
    },

    /// Start an interactive chat against a running server
    Chat {
        /// Server base URL (overrides client.server_url)
        #[arg(short, long)]
        server: Option<String>,

        /// Open an existing session instead of starting a new chat
        #[arg(long)]
        session: Option<String>,

        /// Directory of the local audio cache
        #[arg(long)]
        audio_cache: Option<PathBuf>,
    },

    /// Manage stored chat sessions
    Sessions {
        /// SQLite database file (overrides server.database_path)
        #[arg(short, long, env = "PARLEY_DATABASE")]
        database: Option<PathBuf>,

        /// Session management subcommand
        #[command(subcommand)]
        command: SessionCommand,
    },
}

/// Session management subcommands
#[derive(Subcommand, Debug, Clone)]
pub enum SessionCommand {
    /// List stored sessions, newest first
    List,

    /// Delete a session and all of its messages
    Delete {
        /// Session ID
        id: String,
    },
}

impl Cli {
    /// Parse command line arguments
    pub fn parse_args() -> Self {
        Self::parse()
    }
}

//! Parley - chat client and proxy for hosted LLM and text-to-speech APIs
//!
//! This library provides the server that proxies a chat completion API and a
//! speech API while persisting sessions in SQLite, and the client pieces that
//! talk to it: a reconciling send pipeline and a local audio cache.
//!
//! # Architecture
//!
//! The library is organized into the following modules:
//!
//! - `server`: axum router, handlers and HTTP error mapping
//! - `storage`: SQLite store for sessions, messages and settings
//! - `providers`: chat completion and speech collaborators (OpenRouter, Murf)
//! - `client`: send pipeline, audio cache and playback coordinator
//! - `commands`: CLI command handlers
//! - `config`: Configuration management and validation
//! - `error`: Error types and result aliases
//! - `cli`: Command-line interface definition
//!
//! # Example
//!
//! ```no_run
//! use parley::{server, Config};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::default();
//!     config.validate()?;
//!     server::serve(config).await
//! }
//! ```

pub mod cli;
pub mod client;
pub mod commands;
pub mod config;
pub mod error;
pub mod providers;
pub mod server;
pub mod storage;

// Re-export commonly used types
pub use client::{AudioCache, ChatPipeline, PipelineError};
pub use config::Config;
pub use error::{ParleyError, Result};
pub use storage::SqliteStorage;

#[cfg(test)]
pub mod test_utils;

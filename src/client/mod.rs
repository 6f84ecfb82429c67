//! Client side of Parley
//!
//! Everything a chat front end needs on top of the server's HTTP API:
//!
//! - `backend`: the [`ChatBackend`] trait over the server plus its reqwest
//!   implementation
//! - `pipeline`: the reconciling send pipeline that owns the message view
//! - `audio_cache`: the per-client audio cache keyed by message id
//! - `playback`: lazy speech generation with per-message deduplication

pub mod audio_cache;
pub mod backend;
pub mod pipeline;
pub mod playback;

pub use audio_cache::{AudioCache, AudioCacheEntry};
pub use backend::{ChatBackend, HttpBackend};
pub use pipeline::{ChatPipeline, Notice, SendOutcome, ViewEntry};
pub use playback::AudioPlayer;

use thiserror::Error;

/// Failure of a client-side operation
///
/// Cloneable so that one failed speech request can be reported to every
/// caller waiting on it.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PipelineError {
    /// Message was empty after trimming
    #[error("Message cannot be empty")]
    EmptyMessage,

    /// Another send is still outstanding for the same chat
    #[error("A message is already being sent in this chat")]
    SendInProgress,

    /// Send targeted a session the view is not showing
    #[error("Session {0} is not open")]
    SessionNotOpen(String),

    /// Server answered with an error body
    #[error("{message}")]
    Server {
        /// HTTP status
        status: u16,
        /// Text from the `error` field
        message: String,
    },

    /// Server could not be reached
    #[error("Could not reach server: {0}")]
    Transport(String),

    /// Request exceeded the client timeout
    #[error("Request timed out")]
    Timeout,

    /// Completion succeeded but carried no text
    #[error("No response from AI")]
    EmptyReply,

    /// Server response did not have the expected shape
    #[error("Unexpected server response: {0}")]
    Protocol(String),

    /// Local audio cache failure
    #[error("Audio cache error: {0}")]
    Cache(String),
}

/// Result type for client-side operations
pub type PipelineResult<T> = std::result::Result<T, PipelineError>;

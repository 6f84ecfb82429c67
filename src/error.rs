//! Error types for Parley
//!
//! This module defines the error taxonomy shared by the server, the storage
//! layer and the upstream providers, using `thiserror` for ergonomic error
//! handling. The HTTP layer maps each variant onto a status code.

use thiserror::Error;

/// Main error type for Parley operations
///
/// Every failure that crosses a component boundary is expressed as one of
/// these variants so the server can pick a status code and the client can
/// decide what to show the user.
#[derive(Error, Debug)]
pub enum ParleyError {
    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Malformed input (empty content, bad role, non-array payload)
    #[error("{0}")]
    Validation(String),

    /// Requested chat session does not exist
    #[error("{0}")]
    NotFound(String),

    /// Upstream collaborator (LLM or TTS) answered with a failure
    #[error("{message}")]
    Upstream {
        /// HTTP status reported by the collaborator
        status: u16,
        /// Error text supplied by the collaborator
        message: String,
    },

    /// Upstream collaborator could not be reached or returned garbage
    #[error("Provider error: {0}")]
    Provider(String),

    /// No API key configured for a collaborator
    #[error("{0}")]
    MissingCredentials(String),

    /// Durable store errors (database operations)
    #[error("Storage error: {0}")]
    Storage(String),

    /// Local audio cache errors
    #[error("Audio cache error: {0}")]
    AudioCache(String),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// YAML parsing errors
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// HTTP request errors
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

impl ParleyError {
    /// HTTP status code this error should be reported with
    ///
    /// Upstream statuses are passed through when they are error statuses;
    /// anything else reported by a collaborator becomes a 502.
    pub fn status_code(&self) -> u16 {
        match self {
            Self::Validation(_) => 400,
            Self::NotFound(_) => 404,
            Self::Upstream { status, .. } if *status >= 400 => *status,
            Self::Upstream { .. } | Self::Provider(_) => 502,
            _ => 500,
        }
    }

    /// Whether the message may be shown to API callers verbatim
    pub fn is_public(&self) -> bool {
        matches!(
            self,
            Self::Validation(_)
                | Self::NotFound(_)
                | Self::Upstream { .. }
                | Self::Provider(_)
                | Self::MissingCredentials(_)
        )
    }
}

/// Result type alias for Parley operations
///
/// This is a convenience alias that uses `anyhow::Error` as the error type,
/// allowing for rich error context and easy error propagation.
pub type Result<T> = anyhow::Result<T>;

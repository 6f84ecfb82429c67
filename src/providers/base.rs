//! Base provider traits and common types for Parley
//!
//! This module defines the traits the upstream collaborators implement
//! (chat completion and speech synthesis), the role-tagged message type
//! exchanged with them, and helpers for decoding collaborator error bodies.

use crate::error::{ParleyError, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Author of a chat message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Message typed by the user
    User,
    /// Reply produced by the model
    Assistant,
    /// Instructions injected ahead of the conversation
    System,
}

impl Role {
    /// Wire name of the role
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Assistant => "assistant",
            Self::System => "system",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = ParleyError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "user" => Ok(Self::User),
            "assistant" => Ok(Self::Assistant),
            "system" => Ok(Self::System),
            other => Err(ParleyError::Validation(format!("Invalid role: {}", other))),
        }
    }
}

/// Role-tagged message exchanged with the chat completion collaborator
///
/// Also the shape of a message before the durable store has assigned it an
/// identity.
///
/// # Examples
///
/// ```
/// use parley::providers::{ChatMessage, Role};
///
/// let msg = ChatMessage::user("Hello, assistant!");
/// assert_eq!(msg.role, Role::User);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    /// Role of the message sender
    pub role: Role,
    /// Content of the message
    pub content: String,
}

impl ChatMessage {
    /// Creates a message with an explicit role
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }

    /// Creates a new user message
    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    /// Creates a new assistant message
    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }

    /// Creates a new system message
    pub fn system(content: impl Into<String>) -> Self {
        Self::new(Role::System, content)
    }
}

/// Chat completion collaborator
///
/// Implementations send the ordered conversation upstream and return the
/// single assistant reply. An empty reply is an error, never `Ok("")`.
#[async_trait]
pub trait ChatProvider: Send + Sync {
    /// Completes a conversation
    ///
    /// # Arguments
    ///
    /// * `messages` - Conversation history, oldest first
    ///
    /// # Errors
    ///
    /// Returns `ParleyError::Upstream` when the collaborator answers with an
    /// error status or no content, `ParleyError::Provider` when it cannot be
    /// reached.
    async fn complete(&self, messages: &[ChatMessage]) -> Result<String>;
}

/// Text-to-speech collaborator
#[async_trait]
pub trait SpeechProvider: Send + Sync {
    /// Converts text to base64-encoded audio
    ///
    /// # Errors
    ///
    /// Same contract as [`ChatProvider::complete`].
    async fn synthesize(&self, text: &str) -> Result<String>;
}

/// Extract a human-readable message from a collaborator error body
///
/// Collaborators disagree on where the text lives, so the lookup order is
/// `error.message`, `error` (string), `message`, then the raw body.
/// `fallback` is used when the body is empty.
///
/// # Examples
///
/// ```
/// use parley::providers::upstream_error_message;
///
/// let body = r#"{"error":{"message":"Invalid API key","code":401}}"#;
/// assert_eq!(upstream_error_message(body, "failed"), "Invalid API key");
/// assert_eq!(upstream_error_message("", "failed"), "failed");
/// ```
pub fn upstream_error_message(body: &str, fallback: &str) -> String {
    if let Ok(value) = serde_json::from_str::<serde_json::Value>(body) {
        let nested = value
            .get("error")
            .and_then(|e| e.get("message"))
            .and_then(|m| m.as_str());
        let flat = value.get("error").and_then(|e| e.as_str());
        let message = value.get("message").and_then(|m| m.as_str());

        if let Some(text) = nested.or(flat).or(message) {
            if !text.trim().is_empty() {
                return text.to_string();
            }
        }
        return fallback.to_string();
    }

    if body.trim().is_empty() {
        fallback.to_string()
    } else {
        body.trim().to_string()
    }
}

/// Build an upstream error from a non-success HTTP response
pub(crate) async fn upstream_failure(
    provider: &str,
    response: reqwest::Response,
    fallback: &str,
) -> ParleyError {
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    tracing::error!("{} returned error {}: {}", provider, status, body);
    ParleyError::Upstream {
        status: status.as_u16(),
        message: upstream_error_message(&body, fallback),
    }
}

/// Map a failed exchange with a collaborator
///
/// A timeout while connecting, waiting for headers or reading the body
/// becomes a 504 carrying `timeout_message`; anything else is a
/// `Provider` error prefixed with `context`.
pub(crate) fn request_failure(e: reqwest::Error, context: &str, timeout_message: &str) -> ParleyError {
    tracing::error!("{}: {}", context, e);
    if e.is_timeout() {
        ParleyError::Upstream {
            status: 504,
            message: timeout_message.to_string(),
        }
    } else {
        ParleyError::Provider(format!("{}: {}", context, e))
    }
}

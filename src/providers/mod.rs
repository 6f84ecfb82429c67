//! Provider module for Parley
//!
//! This module contains the upstream collaborator abstractions and their
//! implementations: OpenRouter for chat completions and Murf for speech.

pub mod base;
pub mod murf;
pub mod openrouter;

pub use base::{upstream_error_message, ChatMessage, ChatProvider, Role, SpeechProvider};
pub use murf::MurfProvider;
pub use openrouter::OpenRouterProvider;

use crate::config::{MurfConfig, OpenRouterConfig};
use crate::error::{ParleyError, Result};
use reqwest::Client;

/// Pick the API key to use for a collaborator
///
/// A key saved through the settings endpoint wins over the configured one.
/// Blank keys count as absent.
pub fn resolve_api_key(stored: Option<&str>, configured: Option<&str>) -> Option<String> {
    stored
        .filter(|k| !k.trim().is_empty())
        .or(configured.filter(|k| !k.trim().is_empty()))
        .map(str::to_string)
}

/// Create the chat completion provider for one request
///
/// # Arguments
///
/// * `client` - Shared HTTP client
/// * `config` - Chat completion configuration
/// * `stored_key` - Key saved in the settings record, if any
///
/// # Errors
///
/// Returns `ParleyError::MissingCredentials` when no key is available
pub fn create_chat_provider(
    client: &Client,
    config: &OpenRouterConfig,
    stored_key: Option<&str>,
) -> Result<Box<dyn ChatProvider>> {
    let api_key = resolve_api_key(stored_key, config.api_key.as_deref()).ok_or_else(|| {
        ParleyError::MissingCredentials(
            "OpenRouter API key not configured. Please add your API key in Settings or contact the administrator."
                .to_string(),
        )
    })?;
    Ok(Box::new(OpenRouterProvider::with_client(
        client.clone(),
        config.clone(),
        api_key,
    )))
}

/// Create the speech provider for one request
///
/// # Errors
///
/// Returns `ParleyError::MissingCredentials` when no key is available
pub fn create_speech_provider(
    client: &Client,
    config: &MurfConfig,
    stored_key: Option<&str>,
) -> Result<Box<dyn SpeechProvider>> {
    let api_key = resolve_api_key(stored_key, config.api_key.as_deref()).ok_or_else(|| {
        ParleyError::MissingCredentials(
            "Murf API key not configured. Please add your API key in Settings.".to_string(),
        )
    })?;
    Ok(Box::new(MurfProvider::with_client(
        client.clone(),
        config.clone(),
        api_key,
    )))
}

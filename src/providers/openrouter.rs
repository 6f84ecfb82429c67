//! OpenRouter provider implementation for Parley
//!
//! Implements [`ChatProvider`] against any OpenAI-compatible
//! `/chat/completions` endpoint, OpenRouter being the default.

use crate::config::OpenRouterConfig;
use crate::error::{ParleyError, Result};
use crate::providers::base::{request_failure, upstream_failure};
use crate::providers::{ChatMessage, ChatProvider};

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

const TIMEOUT_MESSAGE: &str = "AI response timed out";

/// OpenRouter chat completion provider
///
/// Non-streaming: one request, one assistant reply.
///
/// # Examples
///
/// ```no_run
/// use parley::config::OpenRouterConfig;
/// use parley::providers::{ChatMessage, ChatProvider, OpenRouterProvider};
///
/// # async fn example() -> parley::error::Result<()> {
/// let provider = OpenRouterProvider::new(OpenRouterConfig::default(), "sk-or-...")?;
/// let reply = provider.complete(&[ChatMessage::user("Hello!")]).await?;
/// # Ok(())
/// # }
/// ```
pub struct OpenRouterProvider {
    client: Client,
    config: OpenRouterConfig,
    api_key: String,
}

/// Request body for `/chat/completions`
#[derive(Debug, Serialize)]
struct CompletionRequest<'a> {
    model: &'a str,
    messages: Vec<&'a ChatMessage>,
}

#[derive(Debug, Deserialize)]
struct CompletionResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: Option<ChoiceMessage>,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

impl OpenRouterProvider {
    /// Create a provider with its own HTTP client
    ///
    /// # Errors
    ///
    /// Returns error if the HTTP client cannot be built
    pub fn new(config: OpenRouterConfig, api_key: impl Into<String>) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.timeout())
            .build()
            .map_err(|e| ParleyError::Provider(format!("Failed to create HTTP client: {}", e)))?;
        Ok(Self::with_client(client, config, api_key))
    }

    /// Create a provider that shares an existing HTTP client
    ///
    /// The configured timeout is applied per request.
    pub fn with_client(client: Client, config: OpenRouterConfig, api_key: impl Into<String>) -> Self {
        Self {
            client,
            config,
            api_key: api_key.into(),
        }
    }

    /// Model identifier sent upstream
    pub fn model(&self) -> &str {
        &self.config.model
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/chat/completions",
            self.config.api_base.trim_end_matches('/')
        )
    }

    /// Conversation as sent upstream, with the configured system prompt first
    fn outgoing_messages<'a>(
        &'a self,
        system: Option<&'a ChatMessage>,
        messages: &'a [ChatMessage],
    ) -> Vec<&'a ChatMessage> {
        system.into_iter().chain(messages.iter()).collect()
    }
}

#[async_trait]
impl ChatProvider for OpenRouterProvider {
    async fn complete(&self, messages: &[ChatMessage]) -> Result<String> {
        let system = self
            .config
            .system_prompt
            .as_deref()
            .filter(|p| !p.trim().is_empty())
            .map(ChatMessage::system);

        let request = CompletionRequest {
            model: &self.config.model,
            messages: self.outgoing_messages(system.as_ref(), messages),
        };

        tracing::debug!(
            "Sending completion request: model={}, {} messages",
            request.model,
            request.messages.len()
        );

        let response = self
            .client
            .post(self.endpoint())
            .timeout(self.config.timeout())
            .bearer_auth(&self.api_key)
            .header("HTTP-Referer", &self.config.referer)
            .header("X-Title", &self.config.title)
            .json(&request)
            .send()
            .await
            .map_err(|e| request_failure(e, "Completion request failed", TIMEOUT_MESSAGE))?;

        if !response.status().is_success() {
            return Err(
                upstream_failure("OpenRouter", response, "Failed to get AI response")
                    .await
                    .into(),
            );
        }

        let body: CompletionResponse = response.json().await.map_err(|e| {
            request_failure(e, "Failed to parse completion response", TIMEOUT_MESSAGE)
        })?;

        let content = body
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message)
            .and_then(|m| m.content)
            .filter(|c| !c.trim().is_empty());

        match content {
            Some(content) => {
                tracing::debug!("Completion received: {} chars", content.len());
                Ok(content)
            }
            None => Err(ParleyError::Upstream {
                status: 500,
                message: "No response from AI".to_string(),
            }
            .into()),
        }
    }
}

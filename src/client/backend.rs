//! Client view of the server
//!
//! [`ChatBackend`] is the narrow interface the send pipeline and the audio
//! player consume: the persistence operations plus the two collaborator
//! proxies. [`HttpBackend`] implements it against a running `parley serve`.

use super::{PipelineError, PipelineResult};
use crate::config::ClientConfig;
use crate::providers::{upstream_error_message, ChatMessage};
use crate::storage::{ChatSession, Message};

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::json;
use url::Url;

/// Operations the client needs from the server
#[async_trait]
pub trait ChatBackend: Send + Sync {
    /// Create a session with the given title
    async fn create_session(&self, title: &str) -> PipelineResult<ChatSession>;

    /// All sessions, newest first
    async fn list_sessions(&self) -> PipelineResult<Vec<ChatSession>>;

    /// Delete a session and its messages
    async fn delete_session(&self, session_id: &str) -> PipelineResult<()>;

    /// Committed messages of a session, ascending by id
    async fn list_messages(&self, session_id: &str) -> PipelineResult<Vec<Message>>;

    /// Persist messages in order and return them with their store ids
    async fn append_messages(
        &self,
        session_id: &str,
        messages: &[ChatMessage],
    ) -> PipelineResult<Vec<Message>>;

    /// Ask the chat completion collaborator for the next reply
    async fn complete(&self, messages: &[ChatMessage]) -> PipelineResult<String>;

    /// Generate speech for a text, attaching it to `message_id` server side
    async fn synthesize(&self, text: &str, message_id: Option<i64>) -> PipelineResult<String>;
}

/// [`ChatBackend`] over HTTP
pub struct HttpBackend {
    client: Client,
    base_url: Url,
}

#[derive(Debug, Deserialize)]
struct ChatReply {
    message: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SpeechReply {
    audio_base64: Option<String>,
}

fn transport_error(e: reqwest::Error) -> PipelineError {
    if e.is_timeout() {
        PipelineError::Timeout
    } else {
        PipelineError::Transport(e.to_string())
    }
}

impl HttpBackend {
    /// Create a backend for the configured server
    ///
    /// # Errors
    ///
    /// Returns error if `server_url` is not a valid URL or the HTTP client
    /// cannot be built
    pub fn new(config: &ClientConfig) -> crate::error::Result<Self> {
        let base_url = Url::parse(&config.server_url).map_err(|e| {
            crate::error::ParleyError::Config(format!("Invalid server URL: {}", e))
        })?;
        if base_url.cannot_be_a_base() {
            return Err(crate::error::ParleyError::Config(format!(
                "Invalid server URL: {} cannot carry a path",
                config.server_url
            ))
            .into());
        }
        let client = Client::builder()
            .timeout(config.request_timeout())
            .build()
            .map_err(|e| {
                crate::error::ParleyError::Provider(format!("Failed to create HTTP client: {}", e))
            })?;
        Ok(Self { client, base_url })
    }

    /// Server URL with `segments` appended to its path, each one escaped
    fn url(&self, segments: &[&str]) -> PipelineResult<Url> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| PipelineError::Protocol(format!("{} cannot carry a path", self.base_url)))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    async fn execute<T: DeserializeOwned>(&self, request: RequestBuilder) -> PipelineResult<T> {
        let response = request.send().await.map_err(transport_error)?;
        let status = response.status();

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let message = upstream_error_message(&body, status.canonical_reason().unwrap_or("Request failed"));
            tracing::debug!(status = status.as_u16(), "Server returned error: {}", message);
            return Err(PipelineError::Server {
                status: status.as_u16(),
                message,
            });
        }

        response
            .json::<T>()
            .await
            .map_err(|e| PipelineError::Protocol(e.to_string()))
    }
}

#[async_trait]
impl ChatBackend for HttpBackend {
    async fn create_session(&self, title: &str) -> PipelineResult<ChatSession> {
        let url = self.url(&["api", "chat-sessions"])?;
        self.execute(self.client.post(url).json(&json!({ "title": title })))
            .await
    }

    async fn list_sessions(&self) -> PipelineResult<Vec<ChatSession>> {
        let url = self.url(&["api", "chat-sessions"])?;
        self.execute(self.client.get(url)).await
    }

    async fn delete_session(&self, session_id: &str) -> PipelineResult<()> {
        let url = self.url(&["api", "chat-sessions", session_id])?;
        let _: serde_json::Value = self.execute(self.client.delete(url)).await?;
        Ok(())
    }

    async fn list_messages(&self, session_id: &str) -> PipelineResult<Vec<Message>> {
        let url = self.url(&["api", "chat-sessions", session_id, "messages"])?;
        self.execute(self.client.get(url)).await
    }

    async fn append_messages(
        &self,
        session_id: &str,
        messages: &[ChatMessage],
    ) -> PipelineResult<Vec<Message>> {
        let url = self.url(&["api", "chat-sessions", session_id, "messages"])?;
        self.execute(self.client.post(url).json(&json!({ "messages": messages })))
            .await
    }

    async fn complete(&self, messages: &[ChatMessage]) -> PipelineResult<String> {
        let url = self.url(&["api", "chat"])?;
        let reply: ChatReply = self
            .execute(self.client.post(url).json(&json!({ "messages": messages })))
            .await?;
        reply
            .message
            .filter(|m| !m.trim().is_empty())
            .ok_or(PipelineError::EmptyReply)
    }

    async fn synthesize(&self, text: &str, message_id: Option<i64>) -> PipelineResult<String> {
        let url = self.url(&["api", "tts"])?;
        let reply: SpeechReply = self
            .execute(
                self.client
                    .post(url)
                    .json(&json!({ "text": text, "messageId": message_id })),
            )
            .await?;
        reply
            .audio_base64
            .filter(|a| !a.is_empty())
            .ok_or_else(|| PipelineError::Protocol("response carried no audio".to_string()))
    }
}

//! Test utilities for Parley
//!
//! Temporary directories, error assertions, a sample configuration and an
//! in-memory [`ChatBackend`] for exercising the client without a server.

use crate::client::{ChatBackend, PipelineError, PipelineResult};
use crate::config::Config;
use crate::error::ParleyError;
use crate::providers::ChatMessage;
use crate::storage::{ChatSession, Message};

use async_trait::async_trait;
use chrono::Utc;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tempfile::TempDir;
use tokio::sync::Notify;

/// Create a temporary directory for testing
pub fn temp_dir() -> TempDir {
    TempDir::new().expect("Failed to create temporary directory")
}

/// Assert that an error contains the expected message
///
/// # Panics
///
/// Panics if the result is Ok or if the error doesn't contain the expected message
pub fn assert_error_contains<T>(result: Result<T, ParleyError>, expected: &str) {
    match result {
        Ok(_) => panic!("Expected error containing '{}' but got Ok", expected),
        Err(e) => {
            let error_msg = e.to_string();
            assert!(
                error_msg.contains(expected),
                "Error message '{}' does not contain '{}'",
                error_msg,
                expected
            );
        }
    }
}

/// A test configuration YAML string
pub fn test_config_yaml() -> String {
    r#"
server:
  bind: 127.0.0.1:5055
openrouter:
  model: deepseek/deepseek-chat
  timeout_seconds: 30
tts:
  voice_id: Charles
  timeout_seconds: 15
client:
  server_url: http://127.0.0.1:5055
  audio_retention_days: 7
"#
    .to_string()
}

/// Start a server that sends headers plus `partial_body` for one request,
/// then stalls without finishing the body
///
/// Returns the server's base URL.
pub async fn stalled_body_server(partial_body: &'static str) -> String {
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind test listener");
    let addr = listener.local_addr().expect("Listener has no address");
    tokio::spawn(async move {
        let Ok((mut socket, _)) = listener.accept().await else {
            return;
        };
        let mut request = vec![0u8; 16 * 1024];
        let _ = socket.read(&mut request).await;
        let head = format!(
            "HTTP/1.1 200 OK\r\ncontent-type: application/json\r\ncontent-length: {}\r\n\r\n",
            partial_body.len() + 1024
        );
        let _ = socket.write_all(head.as_bytes()).await;
        let _ = socket.write_all(partial_body.as_bytes()).await;
        tokio::time::sleep(std::time::Duration::from_secs(30)).await;
    });
    format!("http://{}", addr)
}

#[derive(Default)]
struct FakeState {
    sessions: Vec<ChatSession>,
    messages: Vec<Message>,
    next_id: i64,
    next_session: usize,
    replies: VecDeque<PipelineResult<String>>,
    histories: Vec<Vec<ChatMessage>>,
    create_error: Option<PipelineError>,
    append_error: Option<PipelineError>,
    synthesis_error: Option<PipelineError>,
    synthesized: Vec<Option<i64>>,
    gate: Option<Arc<Notify>>,
    create_gate: Option<Arc<Notify>>,
    append_gate: Option<Arc<Notify>>,
}

/// In-memory [`ChatBackend`] with scripted completions
///
/// Replies are consumed in push order; with none queued, completions echo
/// the last user message.
#[derive(Default)]
pub struct FakeBackend {
    state: Mutex<FakeState>,
    create_calls: AtomicUsize,
    append_calls: AtomicUsize,
    complete_calls: AtomicUsize,
    synthesize_calls: AtomicUsize,
}

impl FakeBackend {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> std::sync::MutexGuard<'_, FakeState> {
        self.state.lock().unwrap()
    }

    /// Queue the result of the next completion
    pub fn push_reply(&self, reply: PipelineResult<String>) {
        self.state().replies.push_back(reply);
    }

    /// Make completions wait until the returned handle is notified
    pub fn gate_completions(&self) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        self.state().gate = Some(Arc::clone(&gate));
        gate
    }

    /// Make session creation wait until the returned handle is notified
    pub fn gate_session_creation(&self) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        self.state().create_gate = Some(Arc::clone(&gate));
        gate
    }

    /// Make appends wait until the returned handle is notified
    pub fn gate_appends(&self) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        self.state().append_gate = Some(Arc::clone(&gate));
        gate
    }

    pub fn fail_create(&self, error: Option<PipelineError>) {
        self.state().create_error = error;
    }

    pub fn fail_append(&self, error: Option<PipelineError>) {
        self.state().append_error = error;
    }

    pub fn fail_synthesis(&self, error: PipelineError) {
        self.state().synthesis_error = Some(error);
    }

    /// Create a session holding alternating user/assistant messages
    pub fn seed_session(&self, title: &str, contents: &[&str]) -> ChatSession {
        let session = self.insert_session(title);
        let messages: Vec<ChatMessage> = contents
            .iter()
            .enumerate()
            .map(|(i, c)| {
                if i % 2 == 0 {
                    ChatMessage::user(*c)
                } else {
                    ChatMessage::assistant(*c)
                }
            })
            .collect();
        self.insert_messages(&session.id, &messages);
        session
    }

    fn insert_session(&self, title: &str) -> ChatSession {
        let mut state = self.state();
        state.next_session += 1;
        let session = ChatSession {
            id: format!("session-{}", state.next_session),
            title: title.to_string(),
            created_at: Utc::now(),
        };
        state.sessions.push(session.clone());
        session
    }

    fn insert_messages(&self, session_id: &str, messages: &[ChatMessage]) -> Vec<Message> {
        let mut state = self.state();
        let mut created = Vec::with_capacity(messages.len());
        for message in messages {
            state.next_id += 1;
            let stored = Message {
                id: state.next_id,
                chat_session_id: session_id.to_string(),
                role: message.role,
                content: message.content.clone(),
                audio_base64: None,
            };
            state.messages.push(stored.clone());
            created.push(stored);
        }
        created
    }

    pub fn sessions(&self) -> Vec<ChatSession> {
        self.state().sessions.clone()
    }

    pub fn messages_for(&self, session_id: &str) -> Vec<Message> {
        self.state()
            .messages
            .iter()
            .filter(|m| m.chat_session_id == session_id)
            .cloned()
            .collect()
    }

    /// History passed to the most recent completion
    pub fn last_history(&self) -> Vec<ChatMessage> {
        self.state().histories.last().cloned().unwrap_or_default()
    }

    pub fn create_calls(&self) -> usize {
        self.create_calls.load(Ordering::SeqCst)
    }

    pub fn append_calls(&self) -> usize {
        self.append_calls.load(Ordering::SeqCst)
    }

    pub fn complete_calls(&self) -> usize {
        self.complete_calls.load(Ordering::SeqCst)
    }

    pub fn synthesize_calls(&self) -> usize {
        self.synthesize_calls.load(Ordering::SeqCst)
    }

    /// Message ids passed to each synthesis, in call order
    pub fn synthesized_ids(&self) -> Vec<Option<i64>> {
        self.state().synthesized.clone()
    }
}

#[async_trait]
impl ChatBackend for FakeBackend {
    async fn create_session(&self, title: &str) -> PipelineResult<ChatSession> {
        self.create_calls.fetch_add(1, Ordering::SeqCst);
        let gate = self.state().create_gate.clone();
        if let Some(gate) = gate {
            gate.notified().await;
        }
        if let Some(e) = self.state().create_error.clone() {
            return Err(e);
        }
        Ok(self.insert_session(title))
    }

    async fn list_sessions(&self) -> PipelineResult<Vec<ChatSession>> {
        let mut sessions = self.sessions();
        sessions.reverse();
        Ok(sessions)
    }

    async fn delete_session(&self, session_id: &str) -> PipelineResult<()> {
        let mut state = self.state();
        state.sessions.retain(|s| s.id != session_id);
        state.messages.retain(|m| m.chat_session_id != session_id);
        Ok(())
    }

    async fn list_messages(&self, session_id: &str) -> PipelineResult<Vec<Message>> {
        Ok(self.messages_for(session_id))
    }

    async fn append_messages(
        &self,
        session_id: &str,
        messages: &[ChatMessage],
    ) -> PipelineResult<Vec<Message>> {
        self.append_calls.fetch_add(1, Ordering::SeqCst);
        let gate = self.state().append_gate.clone();
        if let Some(gate) = gate {
            gate.notified().await;
        }
        {
            let state = self.state();
            if let Some(e) = state.append_error.clone() {
                return Err(e);
            }
            if !state.sessions.iter().any(|s| s.id == session_id) {
                return Err(PipelineError::Server {
                    status: 404,
                    message: "Chat session not found".to_string(),
                });
            }
        }
        Ok(self.insert_messages(session_id, messages))
    }

    async fn complete(&self, messages: &[ChatMessage]) -> PipelineResult<String> {
        self.complete_calls.fetch_add(1, Ordering::SeqCst);
        let gate = {
            let mut state = self.state();
            state.histories.push(messages.to_vec());
            state.gate.clone()
        };
        if let Some(gate) = gate {
            gate.notified().await;
        }

        let scripted = self.state().replies.pop_front();
        scripted.unwrap_or_else(|| {
            Ok(messages
                .last()
                .map(|m| format!("echo: {}", m.content))
                .unwrap_or_default())
        })
    }

    async fn synthesize(&self, text: &str, message_id: Option<i64>) -> PipelineResult<String> {
        self.synthesize_calls.fetch_add(1, Ordering::SeqCst);
        let error = {
            let mut state = self.state();
            state.synthesized.push(message_id);
            state.synthesis_error.clone()
        };
        for _ in 0..3 {
            tokio::task::yield_now().await;
        }
        match error {
            Some(e) => Err(e),
            None => Ok(format!("audio:{}", text)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_temp_dir_creation() {
        let dir = temp_dir();
        assert!(dir.path().exists());
    }

    #[test]
    fn test_assert_error_contains_success() {
        let result: Result<(), ParleyError> =
            Err(ParleyError::Config("test error message".to_string()));
        assert_error_contains(result, "test error");
    }

    #[test]
    #[should_panic(expected = "Expected error containing")]
    fn test_assert_error_contains_ok() {
        let result: Result<(), ParleyError> = Ok(());
        assert_error_contains(result, "error");
    }

    #[test]
    fn test_test_config_yaml() {
        let config: Config = serde_yaml::from_str(&test_config_yaml()).unwrap();
        assert_eq!(config.server.bind, "127.0.0.1:5055");
        assert!(config.validate().is_ok());
    }

    #[tokio::test]
    async fn test_fake_backend_echoes_without_script() {
        let backend = FakeBackend::new();
        let reply = backend
            .complete(&[ChatMessage::user("ping")])
            .await
            .unwrap();
        assert_eq!(reply, "echo: ping");
    }
}

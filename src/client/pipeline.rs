//! Reconciling send pipeline
//!
//! [`ChatPipeline`] owns the message view of one chat window. A send shows
//! the user's message immediately as a pending entry, asks the completion
//! collaborator for a reply, persists both messages and then reloads the
//! session so the view shows store-assigned ids. Any failure removes the
//! pending entries again and records a [`Notice`].
//!
//! Switching sessions bumps an epoch; results that arrive for an older epoch
//! never touch the view.

use super::{ChatBackend, PipelineError, PipelineResult};
use crate::providers::{ChatMessage, Role};
use crate::storage::{ChatSession, Message};

use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard};

/// Maximum number of characters of the first message used as session title
pub const SESSION_TITLE_CHARS: usize = 50;

/// One rendered row of the message view
#[derive(Debug, Clone, PartialEq)]
pub enum ViewEntry {
    /// Not yet committed; `local_id` is unique among pending entries
    Pending {
        local_id: u64,
        role: Role,
        content: String,
    },
    /// Read back from the store
    Committed(Message),
}

impl ViewEntry {
    /// Author of the entry
    pub fn role(&self) -> Role {
        match self {
            ViewEntry::Pending { role, .. } => *role,
            ViewEntry::Committed(message) => message.role,
        }
    }

    /// Text of the entry
    pub fn content(&self) -> &str {
        match self {
            ViewEntry::Pending { content, .. } => content,
            ViewEntry::Committed(message) => &message.content,
        }
    }

    /// Whether the entry still waits for its committed counterpart
    pub fn is_pending(&self) -> bool {
        matches!(self, ViewEntry::Pending { .. })
    }

    /// Store id of a committed entry
    pub fn message_id(&self) -> Option<i64> {
        match self {
            ViewEntry::Pending { .. } => None,
            ViewEntry::Committed(message) => Some(message.id),
        }
    }

    fn local_id(&self) -> Option<u64> {
        match self {
            ViewEntry::Pending { local_id, .. } => Some(*local_id),
            ViewEntry::Committed(_) => None,
        }
    }
}

/// User-visible report of a failed operation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    pub title: String,
    pub description: String,
}

impl Notice {
    fn error(err: &PipelineError) -> Self {
        Self {
            title: "Error".to_string(),
            description: err.to_string(),
        }
    }
}

/// How a send concluded when it did not fail
#[derive(Debug, Clone, PartialEq)]
pub enum SendOutcome {
    /// Both messages were persisted
    Committed {
        session_id: String,
        messages: Vec<Message>,
    },
    /// The view moved on before the reply arrived; nothing was persisted
    Discarded,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum SendSlot {
    /// New chat, identified by the epoch it was started in
    Draft(u64),
    Session(String),
}

#[derive(Debug, Default)]
struct ViewState {
    active: Option<String>,
    epoch: u64,
    entries: Vec<ViewEntry>,
    next_local_id: u64,
    in_flight: HashSet<SendSlot>,
    notices: Vec<Notice>,
}

impl ViewState {
    fn switch_to(&mut self, active: Option<String>) {
        self.epoch += 1;
        self.active = active;
        self.entries.clear();
    }

    fn current_slot(&self) -> SendSlot {
        match &self.active {
            Some(id) => SendSlot::Session(id.clone()),
            None => SendSlot::Draft(self.epoch),
        }
    }

    fn pending(&mut self, role: Role, content: &str) -> ViewEntry {
        self.next_local_id += 1;
        ViewEntry::Pending {
            local_id: self.next_local_id,
            role,
            content: content.to_string(),
        }
    }

    fn remove_pending(&mut self, local_ids: &[u64]) {
        self.entries
            .retain(|e| e.local_id().map_or(true, |id| !local_ids.contains(&id)));
    }

    fn position_of(&self, local_id: u64) -> Option<usize> {
        self.entries
            .iter()
            .position(|e| e.local_id() == Some(local_id))
    }
}

type SharedView = Arc<Mutex<ViewState>>;

fn lock(view: &Mutex<ViewState>) -> MutexGuard<'_, ViewState> {
    view.lock().unwrap_or_else(|e| e.into_inner())
}

/// Holds a send slot until dropped
struct SlotGuard {
    view: SharedView,
    slot: SendSlot,
}

impl SlotGuard {
    fn acquire(view: &SharedView, state: &mut ViewState, slot: SendSlot) -> PipelineResult<Self> {
        if !state.in_flight.insert(slot.clone()) {
            return Err(PipelineError::SendInProgress);
        }
        Ok(Self {
            view: Arc::clone(view),
            slot,
        })
    }

    fn rebind(&mut self, state: &mut ViewState, slot: SendSlot) {
        state.in_flight.remove(&self.slot);
        state.in_flight.insert(slot.clone());
        self.slot = slot;
    }
}

impl Drop for SlotGuard {
    fn drop(&mut self) {
        lock(&self.view).in_flight.remove(&self.slot);
    }
}

/// Message view of one chat window plus the operations that change it
pub struct ChatPipeline<B: ChatBackend + ?Sized> {
    backend: Arc<B>,
    view: SharedView,
}

impl<B: ChatBackend + ?Sized> ChatPipeline<B> {
    /// Create a pipeline showing a new, empty chat
    pub fn new(backend: Arc<B>) -> Self {
        Self {
            backend,
            view: Arc::new(Mutex::new(ViewState::default())),
        }
    }

    /// Backend the pipeline talks to
    pub fn backend(&self) -> &Arc<B> {
        &self.backend
    }

    /// Session the view is bound to, `None` for a new chat
    pub fn active_session(&self) -> Option<String> {
        lock(&self.view).active.clone()
    }

    /// Snapshot of the rendered entries, in render order
    pub fn entries(&self) -> Vec<ViewEntry> {
        lock(&self.view).entries.clone()
    }

    /// Committed message with the given id, if the view shows it
    pub fn committed_message(&self, message_id: i64) -> Option<Message> {
        lock(&self.view).entries.iter().find_map(|e| match e {
            ViewEntry::Committed(m) if m.id == message_id => Some(m.clone()),
            _ => None,
        })
    }

    /// Whether a send is outstanding for the chat currently shown
    pub fn is_sending(&self) -> bool {
        let state = lock(&self.view);
        state.in_flight.contains(&state.current_slot())
    }

    /// Drain the notices recorded since the last call
    pub fn take_notices(&self) -> Vec<Notice> {
        std::mem::take(&mut lock(&self.view).notices)
    }

    fn notify(&self, err: &PipelineError) {
        lock(&self.view).notices.push(Notice::error(err));
    }

    /// Start a new chat; results of sends for the previous view are discarded
    pub fn new_chat(&self) {
        lock(&self.view).switch_to(None);
    }

    /// Switch the view to a session and load its messages
    ///
    /// # Errors
    ///
    /// Returns the backend error if the messages cannot be loaded; the view
    /// stays bound to the session with no entries
    pub async fn open_session(&self, session_id: &str) -> PipelineResult<()> {
        let epoch = {
            let mut state = lock(&self.view);
            state.switch_to(Some(session_id.to_string()));
            state.epoch
        };

        let loaded = self.backend.list_messages(session_id).await;

        let mut state = lock(&self.view);
        if state.epoch != epoch {
            return Ok(());
        }
        match loaded {
            Ok(messages) => {
                state.entries = messages.into_iter().map(ViewEntry::Committed).collect();
                Ok(())
            }
            Err(e) => {
                state.notices.push(Notice::error(&e));
                Err(e)
            }
        }
    }

    /// All sessions, newest first
    pub async fn list_sessions(&self) -> PipelineResult<Vec<ChatSession>> {
        self.backend.list_sessions().await
    }

    /// Delete a session; a view showing it falls back to a new chat
    pub async fn delete_session(&self, session_id: &str) -> PipelineResult<()> {
        if let Err(e) = self.backend.delete_session(session_id).await {
            self.notify(&e);
            return Err(e);
        }

        let mut state = lock(&self.view);
        if state.active.as_deref() == Some(session_id) {
            state.switch_to(None);
        }
        tracing::info!(session_id, "Chat session deleted");
        Ok(())
    }

    /// Send a user message and reconcile the view with the store
    ///
    /// `session_id` names the session the view is showing; `None` sends from
    /// a new chat, creating its session first. Sending without a session
    /// while one is shown starts a new chat.
    ///
    /// # Errors
    ///
    /// - `EmptyMessage` if `content` is blank
    /// - `SessionNotOpen` if `session_id` is not the session shown
    /// - `SendInProgress` if this chat already has an outstanding send
    /// - any backend error; the view is rolled back and a notice recorded
    pub async fn send(&self, content: &str, session_id: Option<&str>) -> PipelineResult<SendOutcome> {
        let content = content.trim();
        if content.is_empty() {
            return Err(PipelineError::EmptyMessage);
        }

        let (epoch, mut slot) = {
            let mut state = lock(&self.view);
            match session_id {
                Some(id) if state.active.as_deref() != Some(id) => {
                    return Err(PipelineError::SessionNotOpen(id.to_string()));
                }
                None if state.active.is_some() => state.switch_to(None),
                _ => {}
            }
            let current = state.current_slot();
            let slot = SlotGuard::acquire(&self.view, &mut state, current)?;
            (state.epoch, slot)
        };

        let session_id = match session_id {
            Some(id) => id.to_string(),
            None => {
                let title: String = content.chars().take(SESSION_TITLE_CHARS).collect();
                let session = match self.backend.create_session(&title).await {
                    Ok(session) => session,
                    Err(e) => {
                        tracing::error!("Failed to create chat session: {}", e);
                        let mut state = lock(&self.view);
                        if state.epoch == epoch {
                            state.notices.push(Notice::error(&e));
                        }
                        return Err(e);
                    }
                };

                let mut state = lock(&self.view);
                if state.epoch != epoch {
                    tracing::debug!(session_id = %session.id, "View moved on before first message");
                    return Ok(SendOutcome::Discarded);
                }
                state.active = Some(session.id.clone());
                slot.rebind(&mut state, SendSlot::Session(session.id.clone()));
                session.id
            }
        };

        let (user_local_id, history) = {
            let mut state = lock(&self.view);
            if state.epoch != epoch {
                return Ok(SendOutcome::Discarded);
            }
            let entry = state.pending(Role::User, content);
            let local_id = entry.local_id().unwrap_or_default();
            state.entries.push(entry);
            let history: Vec<ChatMessage> = state
                .entries
                .iter()
                .map(|e| ChatMessage::new(e.role(), e.content()))
                .collect();
            (local_id, history)
        };

        tracing::debug!(session_id = %session_id, messages = history.len(), "Requesting completion");
        let reply = self
            .backend
            .complete(&history)
            .await
            .and_then(|reply| {
                if reply.trim().is_empty() {
                    Err(PipelineError::EmptyReply)
                } else {
                    Ok(reply)
                }
            });

        let placeholders = {
            let mut state = lock(&self.view);
            if state.epoch != epoch {
                tracing::debug!(session_id = %session_id, "Discarding reply for inactive view");
                return Ok(SendOutcome::Discarded);
            }
            let reply = match reply {
                Ok(reply) => reply,
                Err(e) => {
                    tracing::error!(session_id = %session_id, "Completion failed: {}", e);
                    state.remove_pending(&[user_local_id]);
                    state.notices.push(Notice::error(&e));
                    return Err(e);
                }
            };

            let user = state.pending(Role::User, content);
            let assistant = state.pending(Role::Assistant, &reply);
            let ids = [
                user.local_id().unwrap_or_default(),
                assistant.local_id().unwrap_or_default(),
            ];
            match state.position_of(user_local_id) {
                Some(pos) => {
                    state.entries[pos] = user;
                    state.entries.insert(pos + 1, assistant);
                }
                None => state.entries.extend([user, assistant]),
            }
            (ids, [ChatMessage::user(content), ChatMessage::assistant(reply)])
        };
        let (local_ids, to_persist) = placeholders;

        let committed = match self.backend.append_messages(&session_id, &to_persist).await {
            Ok(committed) => committed,
            Err(e) => {
                tracing::error!(session_id = %session_id, "Failed to persist messages: {}", e);
                let mut state = lock(&self.view);
                if state.epoch == epoch {
                    state.remove_pending(&local_ids);
                    state.notices.push(Notice::error(&e));
                }
                return Err(e);
            }
        };

        let refreshed = self.backend.list_messages(&session_id).await;

        let mut state = lock(&self.view);
        if state.epoch == epoch {
            match refreshed {
                Ok(messages) => {
                    state.entries = messages.into_iter().map(ViewEntry::Committed).collect();
                }
                Err(e) => {
                    tracing::warn!(session_id = %session_id, "Failed to reload messages: {}", e);
                    for (local_id, message) in local_ids.iter().zip(&committed) {
                        if let Some(pos) = state.position_of(*local_id) {
                            state.entries[pos] = ViewEntry::Committed(message.clone());
                        }
                    }
                }
            }
        }
        drop(state);

        tracing::info!(session_id = %session_id, "Message exchange committed");
        Ok(SendOutcome::Committed {
            session_id,
            messages: committed,
        })
    }
}

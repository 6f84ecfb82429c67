//! HTTP handlers for the `/api` surface
//!
//! Handlers validate input, delegate to the store or a collaborator, and
//! return JSON. Validation runs on raw `serde_json::Value` payloads so each
//! malformed shape gets its own error text.

use super::error::{json_body, ApiError, ApiResult};
use super::AppState;
use crate::providers::{create_chat_provider, create_speech_provider, ChatMessage, Role};
use crate::storage::{ChatSession, Message, SettingsUpdate};

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::Json;
use serde_json::{json, Value};

/// Parse one `{role, content}` object, requiring non-blank content
fn parse_chat_message(value: &Value) -> Option<ChatMessage> {
    let role = value.get("role")?.as_str()?.parse::<Role>().ok()?;
    let content = value.get("content")?.as_str()?;
    if content.trim().is_empty() {
        return None;
    }
    Some(ChatMessage::new(role, content))
}

/// `GET /healthz`
pub async fn healthz() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

/// `GET /api/chat-sessions`
pub async fn list_sessions(State(state): State<AppState>) -> ApiResult<Json<Vec<ChatSession>>> {
    let sessions = state.with_storage(|s| s.list_sessions()).await?;
    Ok(Json(sessions))
}

/// `POST /api/chat-sessions`
pub async fn create_session(
    State(state): State<AppState>,
    payload: Result<Json<Value>, JsonRejection>,
) -> ApiResult<Json<ChatSession>> {
    let body = json_body(payload)?;
    let title = body
        .get("title")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .ok_or_else(|| ApiError::validation("Invalid session data"))?
        .to_string();

    let session = state
        .with_storage(move |s| s.create_session(&title))
        .await?;
    tracing::info!(session_id = %session.id, "Chat session created");
    Ok(Json(session))
}

/// `GET /api/chat-sessions/:id`
pub async fn get_session(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<ChatSession>> {
    state
        .with_storage(move |s| s.get_session(&id))
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::not_found("Chat session not found"))
}

/// `DELETE /api/chat-sessions/:id`
pub async fn delete_session(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<Value>> {
    let session_id = id.clone();
    let removed = state.with_storage(move |s| s.delete_session(&id)).await?;
    tracing::info!(session_id = %session_id, removed, "Chat session deleted");
    Ok(Json(json!({ "success": true })))
}

/// `GET /api/chat-sessions/:id/messages`
///
/// Unknown sessions yield an empty list.
pub async fn list_messages(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<Vec<Message>>> {
    let messages = state.with_storage(move |s| s.list_messages(&id)).await?;
    Ok(Json(messages))
}

/// `POST /api/chat-sessions/:id/messages`
pub async fn append_messages(
    State(state): State<AppState>,
    Path(id): Path<String>,
    payload: Result<Json<Value>, JsonRejection>,
) -> ApiResult<Json<Vec<Message>>> {
    let body = json_body(payload)?;
    let raw = body
        .get("messages")
        .and_then(Value::as_array)
        .ok_or_else(|| ApiError::validation("Messages must be an array"))?;

    let messages = raw
        .iter()
        .map(parse_chat_message)
        .collect::<Option<Vec<_>>>()
        .ok_or_else(|| ApiError::validation("Invalid message data"))?;

    let created = state
        .with_storage(move |s| s.append_messages(&id, &messages))
        .await?;
    Ok(Json(created))
}

/// `POST /api/chat`
///
/// Proxies the conversation to the chat completion collaborator.
pub async fn chat(
    State(state): State<AppState>,
    payload: Result<Json<Value>, JsonRejection>,
) -> ApiResult<Json<Value>> {
    let body = json_body(payload)?;
    let raw = body
        .get("messages")
        .and_then(Value::as_array)
        .filter(|m| !m.is_empty())
        .ok_or_else(|| ApiError::validation("Messages array is required"))?;

    let messages = raw
        .iter()
        .map(parse_chat_message)
        .collect::<Option<Vec<_>>>()
        .ok_or_else(|| ApiError::validation("Invalid message format or role"))?;

    let settings = state.settings().await?;
    let provider = create_chat_provider(
        &state.http,
        &state.config.openrouter,
        settings.as_ref().and_then(|s| s.openrouter_api_key.as_deref()),
    )?;

    tracing::info!("Proxying chat completion with {} messages", messages.len());
    let reply = provider.complete(&messages).await?;
    Ok(Json(json!({ "message": reply })))
}

/// `POST /api/tts`
///
/// Generates speech and, when `messageId` is given, stores it on the message.
pub async fn tts(
    State(state): State<AppState>,
    payload: Result<Json<Value>, JsonRejection>,
) -> ApiResult<Json<Value>> {
    let body = json_body(payload)?;
    let text = body
        .get("text")
        .and_then(Value::as_str)
        .filter(|t| !t.is_empty())
        .ok_or_else(|| ApiError::validation("Text is required"))?
        .to_string();
    let message_id = match body.get("messageId") {
        None | Some(Value::Null) => None,
        Some(value) => Some(
            value
                .as_i64()
                .ok_or_else(|| ApiError::validation("messageId must be an integer"))?,
        ),
    };

    let settings = state.settings().await?;
    let provider = create_speech_provider(
        &state.http,
        &state.config.tts,
        settings.as_ref().and_then(|s| s.murf_api_key.as_deref()),
    )?;

    let audio = provider.synthesize(&text).await?;

    if let Some(message_id) = message_id {
        let stored = audio.clone();
        let found = state
            .with_storage(move |s| s.set_message_audio(message_id, &stored))
            .await?;
        if !found {
            tracing::warn!(message_id, "Generated audio for unknown message");
        }
    }

    Ok(Json(json!({ "audioBase64": audio })))
}

/// `GET /api/settings`
///
/// Reports which keys are stored without revealing them.
pub async fn get_settings(State(state): State<AppState>) -> ApiResult<Json<Value>> {
    let settings = state.settings().await?;
    let has = |key: Option<&String>| key.map(|k| !k.is_empty()).unwrap_or(false);
    Ok(Json(json!({
        "hasOpenrouterKey": has(settings.as_ref().and_then(|s| s.openrouter_api_key.as_ref())),
        "hasMurfKey": has(settings.as_ref().and_then(|s| s.murf_api_key.as_ref())),
    })))
}

/// `POST /api/settings`
pub async fn update_settings(
    State(state): State<AppState>,
    payload: Result<Json<Value>, JsonRejection>,
) -> ApiResult<Json<Value>> {
    let body = json_body(payload)?;
    let update: SettingsUpdate =
        serde_json::from_value(body).map_err(|_| ApiError::validation("Invalid settings data"))?;

    state
        .with_storage(move |s| s.upsert_settings(&update))
        .await?;
    tracing::info!("Settings updated");
    Ok(Json(json!({ "success": true })))
}

use crate::providers::Role;
use chrono::{DateTime, Utc};
use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, ValueRef};
use serde::{Deserialize, Serialize};

/// A named, ordered conversation thread
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatSession {
    /// Opaque identifier (UUID v4)
    pub id: String,
    /// Title, derived from the first message
    pub title: String,
    /// When the session was created
    pub created_at: DateTime<Utc>,
}

/// A message committed to the durable store
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    /// Store-assigned identity, ascending in insertion order
    pub id: i64,
    /// Owning session
    pub chat_session_id: String,
    /// Author of the message
    pub role: Role,
    /// Message text
    pub content: String,
    /// Generated speech for this message, once requested
    #[serde(default)]
    pub audio_base64: Option<String>,
}

/// Stored collaborator credentials
#[derive(Debug, Clone)]
pub struct Settings {
    /// Record identifier
    pub id: String,
    /// Key for the chat completion collaborator
    pub openrouter_api_key: Option<String>,
    /// Key for the speech collaborator
    pub murf_api_key: Option<String>,
    /// Last modification time
    pub updated_at: DateTime<Utc>,
}

/// Partial update of the settings record
///
/// `None` leaves a key untouched; an empty string clears it.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SettingsUpdate {
    /// New chat completion key
    #[serde(default)]
    pub openrouter_api_key: Option<String>,
    /// New speech key
    #[serde(default)]
    pub murf_api_key: Option<String>,
}

impl ToSql for Role {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.as_str()))
    }
}

impl FromSql for Role {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        value
            .as_str()?
            .parse()
            .map_err(|e| FromSqlError::Other(Box::new(e)))
    }
}

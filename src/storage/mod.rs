use crate::config::ServerConfig;
use crate::error::{ParleyError, Result};
use crate::providers::ChatMessage;
use anyhow::Context;
use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::path::PathBuf;
use std::time::Duration;

pub mod types;
pub use types::{ChatSession, Message, Settings, SettingsUpdate};

/// SQLite-backed durable store for sessions, messages and settings
///
/// Every operation opens its own connection; writes that must be atomic run
/// in a single transaction.
pub struct SqliteStorage {
    db_path: PathBuf,
}

const SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS chat_sessions (
        id TEXT PRIMARY KEY,
        title TEXT NOT NULL,
        created_at TEXT NOT NULL
    );
    CREATE TABLE IF NOT EXISTS messages (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        chat_session_id TEXT NOT NULL REFERENCES chat_sessions(id) ON DELETE CASCADE,
        role TEXT NOT NULL,
        content TEXT NOT NULL,
        audio_base64 TEXT
    );
    CREATE INDEX IF NOT EXISTS idx_messages_session ON messages(chat_session_id, id);
    CREATE TABLE IF NOT EXISTS settings (
        id TEXT PRIMARY KEY,
        openrouter_api_key TEXT,
        murf_api_key TEXT,
        updated_at TEXT NOT NULL
    );
";

fn storage_err(e: anyhow::Error) -> ParleyError {
    ParleyError::Storage(format!("{:#}", e))
}

fn now_timestamp() -> String {
    // Fixed precision keeps lexical order equal to chronological order
    Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_timestamp(value: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

fn session_from_row(row: &Row<'_>) -> rusqlite::Result<ChatSession> {
    let created_at: String = row.get(2)?;
    Ok(ChatSession {
        id: row.get(0)?,
        title: row.get(1)?,
        created_at: parse_timestamp(&created_at),
    })
}

fn message_from_row(row: &Row<'_>) -> rusqlite::Result<Message> {
    Ok(Message {
        id: row.get(0)?,
        chat_session_id: row.get(1)?,
        role: row.get(2)?,
        content: row.get(3)?,
        audio_base64: row.get(4)?,
    })
}

impl SqliteStorage {
    /// Open the store configured for the server
    ///
    /// Uses `server.database_path`, or `parley.db` in the user's data
    /// directory.
    pub fn from_config(config: &ServerConfig) -> Result<Self> {
        Self::new_with_path(config.resolved_database_path()?)
    }

    /// Create a new storage instance that uses the specified database path.
    ///
    /// Creates the parent directory and the schema when missing.
    ///
    /// # Examples
    ///
    /// ```
    /// use parley::storage::SqliteStorage;
    ///
    /// let dir = tempfile::tempdir().unwrap();
    /// let storage = SqliteStorage::new_with_path(dir.path().join("parley.db")).unwrap();
    /// assert!(storage.list_sessions().unwrap().is_empty());
    /// ```
    pub fn new_with_path<P: Into<PathBuf>>(db_path: P) -> Result<Self> {
        let db_path = db_path.into();

        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)
                .context("Failed to create parent directory for database")
                .map_err(storage_err)?;
        }

        let storage = Self { db_path };
        storage.init()?;
        Ok(storage)
    }

    /// Location of the database file
    pub fn db_path(&self) -> &PathBuf {
        &self.db_path
    }

    fn connect(&self) -> Result<Connection> {
        let conn = Connection::open(&self.db_path)
            .context("Failed to open database")
            .map_err(storage_err)?;
        conn.busy_timeout(Duration::from_secs(5))
            .context("Failed to set busy timeout")
            .map_err(storage_err)?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")
            .context("Failed to enable foreign keys")
            .map_err(storage_err)?;
        Ok(conn)
    }

    fn init(&self) -> Result<()> {
        let conn = self.connect()?;
        conn.execute_batch(SCHEMA)
            .context("Failed to create tables")
            .map_err(storage_err)?;
        Ok(())
    }

    /// Create a session with the given title
    pub fn create_session(&self, title: &str) -> Result<ChatSession> {
        let conn = self.connect()?;
        let id = uuid::Uuid::new_v4().to_string();
        let created_at = now_timestamp();

        conn.execute(
            "INSERT INTO chat_sessions (id, title, created_at) VALUES (?, ?, ?)",
            params![id, title, created_at],
        )
        .context("Failed to insert chat session")
        .map_err(storage_err)?;

        tracing::debug!(session_id = %id, "Created chat session");

        Ok(ChatSession {
            id,
            title: title.to_string(),
            created_at: parse_timestamp(&created_at),
        })
    }

    /// List all sessions, newest first
    pub fn list_sessions(&self) -> Result<Vec<ChatSession>> {
        let conn = self.connect()?;
        let mut stmt = conn
            .prepare(
                "SELECT id, title, created_at FROM chat_sessions
                ORDER BY created_at DESC, rowid DESC",
            )
            .context("Failed to prepare statement")
            .map_err(storage_err)?;

        let sessions = stmt
            .query_map([], session_from_row)
            .and_then(|rows| rows.collect::<rusqlite::Result<Vec<_>>>())
            .context("Failed to query sessions")
            .map_err(storage_err)?;

        Ok(sessions)
    }

    /// Load one session
    pub fn get_session(&self, id: &str) -> Result<Option<ChatSession>> {
        let conn = self.connect()?;
        let session = conn
            .query_row(
                "SELECT id, title, created_at FROM chat_sessions WHERE id = ?",
                params![id],
                session_from_row,
            )
            .optional()
            .context("Failed to query chat session")
            .map_err(storage_err)?;
        Ok(session)
    }

    /// Delete a session and all of its messages
    ///
    /// Returns whether a session was removed; deleting an unknown id is not
    /// an error.
    pub fn delete_session(&self, id: &str) -> Result<bool> {
        let mut conn = self.connect()?;
        let tx = conn
            .transaction()
            .context("Failed to start transaction")
            .map_err(storage_err)?;

        tx.execute(
            "DELETE FROM messages WHERE chat_session_id = ?",
            params![id],
        )
        .context("Failed to delete messages")
        .map_err(storage_err)?;

        let removed = tx
            .execute("DELETE FROM chat_sessions WHERE id = ?", params![id])
            .context("Failed to delete chat session")
            .map_err(storage_err)?;

        tx.commit()
            .context("Failed to commit transaction")
            .map_err(storage_err)?;

        tracing::debug!(session_id = %id, removed, "Deleted chat session");
        Ok(removed > 0)
    }

    /// Messages of a session, ordered by id ascending
    pub fn list_messages(&self, session_id: &str) -> Result<Vec<Message>> {
        let conn = self.connect()?;
        let mut stmt = conn
            .prepare(
                "SELECT id, chat_session_id, role, content, audio_base64 FROM messages
                WHERE chat_session_id = ?
                ORDER BY id ASC",
            )
            .context("Failed to prepare statement")
            .map_err(storage_err)?;

        let messages = stmt
            .query_map(params![session_id], message_from_row)
            .and_then(|rows| rows.collect::<rusqlite::Result<Vec<_>>>())
            .context("Failed to query messages")
            .map_err(storage_err)?;

        Ok(messages)
    }

    /// Append messages to a session in the given order
    ///
    /// All messages are committed together or not at all.
    ///
    /// # Errors
    ///
    /// Returns `ParleyError::NotFound` if the session does not exist
    pub fn append_messages(&self, session_id: &str, messages: &[ChatMessage]) -> Result<Vec<Message>> {
        let mut conn = self.connect()?;
        let tx = conn
            .transaction()
            .context("Failed to start transaction")
            .map_err(storage_err)?;

        let exists = tx
            .query_row(
                "SELECT 1 FROM chat_sessions WHERE id = ?",
                params![session_id],
                |_| Ok(()),
            )
            .optional()
            .context("Failed to query chat session")
            .map_err(storage_err)?
            .is_some();
        if !exists {
            return Err(ParleyError::NotFound("Chat session not found".to_string()).into());
        }

        let mut created = Vec::with_capacity(messages.len());
        for message in messages {
            tx.execute(
                "INSERT INTO messages (chat_session_id, role, content) VALUES (?, ?, ?)",
                params![session_id, message.role, message.content],
            )
            .context("Failed to insert message")
            .map_err(storage_err)?;

            created.push(Message {
                id: tx.last_insert_rowid(),
                chat_session_id: session_id.to_string(),
                role: message.role,
                content: message.content.clone(),
                audio_base64: None,
            });
        }

        tx.commit()
            .context("Failed to commit transaction")
            .map_err(storage_err)?;

        tracing::debug!(session_id = %session_id, count = created.len(), "Appended messages");
        Ok(created)
    }

    /// Attach generated audio to a message
    ///
    /// Returns whether the message exists.
    pub fn set_message_audio(&self, message_id: i64, audio_base64: &str) -> Result<bool> {
        let conn = self.connect()?;
        let updated = conn
            .execute(
                "UPDATE messages SET audio_base64 = ? WHERE id = ?",
                params![audio_base64, message_id],
            )
            .context("Failed to update message audio")
            .map_err(storage_err)?;
        Ok(updated > 0)
    }

    /// Load the settings record, if one was ever saved
    pub fn get_settings(&self) -> Result<Option<Settings>> {
        let conn = self.connect()?;
        let settings = conn
            .query_row(
                "SELECT id, openrouter_api_key, murf_api_key, updated_at FROM settings LIMIT 1",
                [],
                |row| {
                    let updated_at: String = row.get(3)?;
                    Ok(Settings {
                        id: row.get(0)?,
                        openrouter_api_key: row.get(1)?,
                        murf_api_key: row.get(2)?,
                        updated_at: parse_timestamp(&updated_at),
                    })
                },
            )
            .optional()
            .context("Failed to query settings")
            .map_err(storage_err)?;
        Ok(settings)
    }

    /// Merge an update into the settings record, creating it if needed
    pub fn upsert_settings(&self, update: &SettingsUpdate) -> Result<Settings> {
        let existing = self.get_settings()?;

        let merge = |new: &Option<String>, old: Option<String>| match new {
            Some(value) if value.trim().is_empty() => None,
            Some(value) => Some(value.trim().to_string()),
            None => old,
        };

        let settings = match existing {
            Some(current) => Settings {
                id: current.id,
                openrouter_api_key: merge(&update.openrouter_api_key, current.openrouter_api_key),
                murf_api_key: merge(&update.murf_api_key, current.murf_api_key),
                updated_at: Utc::now(),
            },
            None => Settings {
                id: uuid::Uuid::new_v4().to_string(),
                openrouter_api_key: merge(&update.openrouter_api_key, None),
                murf_api_key: merge(&update.murf_api_key, None),
                updated_at: Utc::now(),
            },
        };

        let conn = self.connect()?;
        conn.execute(
            "INSERT INTO settings (id, openrouter_api_key, murf_api_key, updated_at)
            VALUES (?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                openrouter_api_key = excluded.openrouter_api_key,
                murf_api_key = excluded.murf_api_key,
                updated_at = excluded.updated_at",
            params![
                settings.id,
                settings.openrouter_api_key,
                settings.murf_api_key,
                settings
                    .updated_at
                    .to_rfc3339_opts(SecondsFormat::Micros, true)
            ],
        )
        .context("Failed to save settings")
        .map_err(storage_err)?;

        Ok(settings)
    }
}

//! Local audio cache
//!
//! Keeps generated speech on the client, keyed by message id, in an embedded
//! `sled` tree. Entries older than the retention window are swept once when
//! the cache is opened, not on every access.

use crate::error::{ParleyError, Result};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use sled::Db;
use std::path::Path;
use std::time::Duration;

/// Default retention window: 30 days
pub const DEFAULT_MAX_AGE: Duration = Duration::from_secs(30 * 24 * 60 * 60);

/// One cached audio clip
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AudioCacheEntry {
    /// Message the audio belongs to
    pub message_id: i64,
    /// Base64-encoded audio
    pub audio_base64: String,
    /// When the entry was written (milliseconds since the Unix epoch)
    pub timestamp: i64,
}

/// Per-client audio cache
///
/// All operations are single-key and atomic in sled, so concurrent callers
/// cannot corrupt the index.
pub struct AudioCache {
    db: Db,
}

fn cache_err(context: &str, e: impl std::fmt::Display) -> ParleyError {
    ParleyError::AudioCache(format!("{}: {}", context, e))
}

fn key(message_id: i64) -> [u8; 8] {
    message_id.to_be_bytes()
}

impl AudioCache {
    /// Open or create the cache and sweep expired entries
    ///
    /// # Arguments
    ///
    /// * `path` - Directory of the sled database
    /// * `max_age` - Retention window applied by the initial sweep
    ///
    /// # Errors
    ///
    /// Returns `ParleyError::AudioCache` if the database cannot be opened.
    /// A failing sweep is logged, not returned.
    ///
    /// # Examples
    ///
    /// ```
    /// use parley::client::AudioCache;
    /// use parley::client::audio_cache::DEFAULT_MAX_AGE;
    ///
    /// # fn main() -> parley::error::Result<()> {
    /// let dir = tempfile::tempdir().unwrap();
    /// let cache = AudioCache::open(dir.path().join("audio"), DEFAULT_MAX_AGE)?;
    /// cache.set(7, "SUQz")?;
    /// assert_eq!(cache.get(7)?.as_deref(), Some("SUQz"));
    /// # Ok(())
    /// # }
    /// ```
    pub fn open(path: impl AsRef<Path>, max_age: Duration) -> Result<Self> {
        let db = sled::open(path).map_err(|e| cache_err("Failed to open audio cache", e))?;
        let cache = Self { db };
        cache.sweep_on_open(max_age);
        Ok(cache)
    }

    /// Open a cache that lives only as long as the value
    pub fn temporary(max_age: Duration) -> Result<Self> {
        let db = sled::Config::new()
            .temporary(true)
            .open()
            .map_err(|e| cache_err("Failed to open audio cache", e))?;
        let cache = Self { db };
        cache.sweep_on_open(max_age);
        Ok(cache)
    }

    fn sweep_on_open(&self, max_age: Duration) {
        match self.sweep(max_age) {
            Ok(0) => {}
            Ok(removed) => tracing::debug!(removed, "Swept expired audio cache entries"),
            Err(e) => tracing::error!("Failed to clean old audio cache: {:#}", e),
        }
    }

    /// Look up the audio of a message; never generates audio
    pub fn get(&self, message_id: i64) -> Result<Option<String>> {
        Ok(self.entry(message_id)?.map(|entry| entry.audio_base64))
    }

    /// Full entry of a message, including its timestamp
    pub fn entry(&self, message_id: i64) -> Result<Option<AudioCacheEntry>> {
        match self
            .db
            .get(key(message_id))
            .map_err(|e| cache_err("Get failed", e))?
        {
            Some(bytes) => {
                let entry = serde_json::from_slice(&bytes)
                    .map_err(|e| cache_err("Deserialization failed", e))?;
                Ok(Some(entry))
            }
            None => Ok(None),
        }
    }

    /// Store audio for a message, replacing any previous entry and its
    /// timestamp
    pub fn set(&self, message_id: i64, audio_base64: &str) -> Result<()> {
        self.insert(&AudioCacheEntry {
            message_id,
            audio_base64: audio_base64.to_string(),
            timestamp: Utc::now().timestamp_millis(),
        })
    }

    /// Store a prepared entry as-is
    pub fn insert(&self, entry: &AudioCacheEntry) -> Result<()> {
        let value =
            serde_json::to_vec(entry).map_err(|e| cache_err("Serialization failed", e))?;

        self.db
            .insert(key(entry.message_id), value)
            .map_err(|e| cache_err("Insert failed", e))?;

        self.db.flush().map_err(|e| cache_err("Flush failed", e))?;

        Ok(())
    }

    /// Remove entries written more than `max_age` ago
    ///
    /// An entry rewritten while the sweep runs is left alone. Unreadable
    /// entries are removed too. Returns the number of entries removed.
    pub fn sweep(&self, max_age: Duration) -> Result<usize> {
        let max_age_ms = i64::try_from(max_age.as_millis()).unwrap_or(i64::MAX);
        let cutoff = Utc::now().timestamp_millis().saturating_sub(max_age_ms);
        let mut removed = 0;

        for item in self.db.iter() {
            let (k, value) = item.map_err(|e| cache_err("Iteration failed", e))?;

            let expired = match serde_json::from_slice::<AudioCacheEntry>(&value) {
                Ok(entry) => entry.timestamp < cutoff,
                Err(_) => true,
            };
            if !expired {
                continue;
            }

            let swapped = self
                .db
                .compare_and_swap(&k, Some(&value), None::<sled::IVec>)
                .map_err(|e| cache_err("Remove failed", e))?;
            if swapped.is_ok() {
                removed += 1;
            }
        }

        if removed > 0 {
            self.db.flush().map_err(|e| cache_err("Flush failed", e))?;
        }
        Ok(removed)
    }

    /// Remove every entry
    pub fn clear(&self) -> Result<()> {
        self.db.clear().map_err(|e| cache_err("Clear failed", e))?;
        self.db.flush().map_err(|e| cache_err("Flush failed", e))?;
        Ok(())
    }

    /// Number of cached entries
    pub fn len(&self) -> usize {
        self.db.len()
    }

    /// Whether the cache holds no entries
    pub fn is_empty(&self) -> bool {
        self.db.is_empty()
    }
}

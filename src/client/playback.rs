//! Lazy speech generation for committed messages
//!
//! Audio is looked up in the local cache first, then taken from the message
//! record if the store already has it, and only then generated. Concurrent
//! requests for the same message share a single generation.

use super::{AudioCache, ChatBackend, PipelineError, PipelineResult};
use crate::storage::Message;

use futures::future::{BoxFuture, FutureExt, Shared};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

type PendingAudio = Shared<BoxFuture<'static, PipelineResult<String>>>;

fn cache_error(e: anyhow::Error) -> PipelineError {
    PipelineError::Cache(format!("{:#}", e))
}

/// Resolves the audio of a message, generating it at most once at a time
pub struct AudioPlayer<B: ChatBackend + ?Sized + 'static> {
    backend: Arc<B>,
    cache: Arc<AudioCache>,
    in_flight: Mutex<HashMap<i64, PendingAudio>>,
}

impl<B: ChatBackend + ?Sized + 'static> AudioPlayer<B> {
    /// Create a player over a backend and a local cache
    pub fn new(backend: Arc<B>, cache: Arc<AudioCache>) -> Self {
        Self {
            backend,
            cache,
            in_flight: Mutex::new(HashMap::new()),
        }
    }

    /// Local cache used by this player
    pub fn cache(&self) -> &AudioCache {
        &self.cache
    }

    fn in_flight(&self) -> MutexGuard<'_, HashMap<i64, PendingAudio>> {
        self.in_flight.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Whether speech for `message_id` is currently being generated
    pub fn is_generating(&self, message_id: i64) -> bool {
        self.in_flight().contains_key(&message_id)
    }

    /// Base64 audio for a committed message
    ///
    /// # Errors
    ///
    /// Returns the generation failure, shared by every caller that was
    /// waiting on it, or `PipelineError::Cache` if the cache cannot be read
    pub async fn audio_for(&self, message: &Message) -> PipelineResult<String> {
        if let Some(audio) = self.cache.get(message.id).map_err(cache_error)? {
            tracing::debug!(message_id = message.id, "Audio served from local cache");
            return Ok(audio);
        }

        if let Some(audio) = message.audio_base64.as_deref().filter(|a| !a.is_empty()) {
            if let Err(e) = self.cache.set(message.id, audio) {
                tracing::warn!(message_id = message.id, "Failed to cache stored audio: {:#}", e);
            }
            return Ok(audio.to_string());
        }

        let pending = {
            let mut in_flight = self.in_flight();
            match in_flight.get(&message.id) {
                Some(pending) => pending.clone(),
                None => {
                    // A generation may have finished between the first lookup and taking the lock
                    if let Some(audio) = self.cache.get(message.id).map_err(cache_error)? {
                        return Ok(audio);
                    }
                    let pending = self.generate(message);
                    in_flight.insert(message.id, pending.clone());
                    pending
                }
            }
        };

        let result = pending.clone().await;

        let mut in_flight = self.in_flight();
        if in_flight
            .get(&message.id)
            .is_some_and(|current| Shared::ptr_eq(current, &pending))
        {
            in_flight.remove(&message.id);
        }

        result
    }

    fn generate(&self, message: &Message) -> PendingAudio {
        let backend = Arc::clone(&self.backend);
        let cache = Arc::clone(&self.cache);
        let message_id = message.id;
        let text = message.content.clone();

        async move {
            tracing::info!(message_id, "Generating speech");
            let audio = backend.synthesize(&text, Some(message_id)).await?;
            if let Err(e) = cache.set(message_id, &audio) {
                tracing::warn!(message_id, "Failed to cache generated audio: {:#}", e);
            }
            Ok(audio)
        }
        .boxed()
        .shared()
    }
}

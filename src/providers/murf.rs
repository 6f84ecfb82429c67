//! Murf text-to-speech provider
//!
//! Implements [`SpeechProvider`] against Murf's `/v1/speech/generate`
//! endpoint, requesting the audio inline as base64.

use crate::config::MurfConfig;
use crate::error::{ParleyError, Result};
use crate::providers::base::{request_failure, upstream_failure};
use crate::providers::SpeechProvider;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

const TIMEOUT_MESSAGE: &str = "Speech generation timed out";

/// Murf speech synthesis provider
pub struct MurfProvider {
    client: Client,
    config: MurfConfig,
    api_key: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SpeechRequest<'a> {
    text: &'a str,
    voice_id: &'a str,
    model_version: &'a str,
    format: &'a str,
    sample_rate: u32,
    encode_as_base64: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SpeechResponse {
    #[serde(default)]
    encoded_audio: Option<String>,
}

impl MurfProvider {
    /// Create a provider with its own HTTP client
    ///
    /// # Errors
    ///
    /// Returns error if the HTTP client cannot be built
    pub fn new(config: MurfConfig, api_key: impl Into<String>) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.timeout())
            .build()
            .map_err(|e| ParleyError::Provider(format!("Failed to create HTTP client: {}", e)))?;
        Ok(Self::with_client(client, config, api_key))
    }

    /// Create a provider that shares an existing HTTP client
    pub fn with_client(client: Client, config: MurfConfig, api_key: impl Into<String>) -> Self {
        Self {
            client,
            config,
            api_key: api_key.into(),
        }
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/v1/speech/generate",
            self.config.api_base.trim_end_matches('/')
        )
    }

    fn request<'a>(&'a self, text: &'a str) -> SpeechRequest<'a> {
        SpeechRequest {
            text,
            voice_id: &self.config.voice_id,
            model_version: &self.config.model_version,
            format: &self.config.format,
            sample_rate: self.config.sample_rate,
            encode_as_base64: true,
        }
    }
}

#[async_trait]
impl SpeechProvider for MurfProvider {
    async fn synthesize(&self, text: &str) -> Result<String> {
        tracing::debug!(
            "Sending speech request: voice={}, {} chars",
            self.config.voice_id,
            text.len()
        );

        let response = self
            .client
            .post(self.endpoint())
            .timeout(self.config.timeout())
            .header("api-key", &self.api_key)
            .json(&self.request(text))
            .send()
            .await
            .map_err(|e| request_failure(e, "Speech request failed", TIMEOUT_MESSAGE))?;

        if !response.status().is_success() {
            return Err(
                upstream_failure("Murf", response, "Failed to generate speech")
                    .await
                    .into(),
            );
        }

        let body: SpeechResponse = response.json().await.map_err(|e| {
            request_failure(e, "Failed to parse speech response", TIMEOUT_MESSAGE)
        })?;

        body.encoded_audio
            .filter(|audio| !audio.is_empty())
            .ok_or_else(|| {
                tracing::error!("Speech response carried no encodedAudio");
                ParleyError::Upstream {
                    status: 500,
                    message: "No audio data received from Murf API".to_string(),
                }
                .into()
            })
    }
}

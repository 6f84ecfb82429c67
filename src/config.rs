//! Configuration management for Parley
//!
//! This module handles loading, parsing, validating, and managing
//! configuration from files, environment variables, and CLI overrides.
//!
//! Precedence, lowest first: built-in defaults, YAML file, `PARLEY_*` (and
//! the conventional `OPENROUTER_API_KEY` / `MURF_API_KEY`) environment
//! variables, command-line flags.

use crate::cli::{Cli, Commands};
use crate::error::{ParleyError, Result};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Main configuration structure for Parley
///
/// Holds everything the server and the terminal client need. The structure is
/// loaded once at startup; API keys stored through the settings endpoint are
/// merged in per request by the server.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// HTTP server settings
    #[serde(default)]
    pub server: ServerConfig,

    /// Chat completion collaborator settings
    #[serde(default)]
    pub openrouter: OpenRouterConfig,

    /// Text-to-speech collaborator settings
    #[serde(default)]
    pub tts: MurfConfig,

    /// Terminal client settings
    #[serde(default)]
    pub client: ClientConfig,
}

/// HTTP server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Socket address to listen on
    #[serde(default = "default_bind")]
    pub bind: String,

    /// SQLite database file; defaults to the user data directory
    #[serde(default)]
    pub database_path: Option<PathBuf>,
}

fn default_bind() -> String {
    "127.0.0.1:5000".to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            database_path: None,
        }
    }
}

impl ServerConfig {
    /// Database path, falling back to `<data dir>/parley.db`
    pub fn resolved_database_path(&self) -> Result<PathBuf> {
        match &self.database_path {
            Some(path) => Ok(path.clone()),
            None => Ok(data_dir()?.join("parley.db")),
        }
    }
}

/// OpenRouter-compatible chat completion configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenRouterConfig {
    /// API base URL; `/chat/completions` is appended
    ///
    /// Overridable so tests can point the provider at a mock server.
    #[serde(default = "default_openrouter_api_base")]
    pub api_base: String,

    /// Model identifier sent with every completion request
    #[serde(default = "default_openrouter_model")]
    pub model: String,

    /// Fallback API key when none is stored in settings
    #[serde(default)]
    pub api_key: Option<String>,

    /// Value of the `HTTP-Referer` attribution header
    #[serde(default = "default_referer")]
    pub referer: String,

    /// Value of the `X-Title` attribution header
    #[serde(default = "default_title")]
    pub title: String,

    /// Optional system prompt prepended to every conversation
    #[serde(default)]
    pub system_prompt: Option<String>,

    /// Request timeout (seconds)
    #[serde(default = "default_llm_timeout")]
    pub timeout_seconds: u64,
}

fn default_openrouter_api_base() -> String {
    "https://openrouter.ai/api/v1".to_string()
}

fn default_openrouter_model() -> String {
    "deepseek/deepseek-chat".to_string()
}

fn default_referer() -> String {
    "http://localhost:5000".to_string()
}

fn default_title() -> String {
    "Parley".to_string()
}

fn default_llm_timeout() -> u64 {
    120
}

impl Default for OpenRouterConfig {
    fn default() -> Self {
        Self {
            api_base: default_openrouter_api_base(),
            model: default_openrouter_model(),
            api_key: None,
            referer: default_referer(),
            title: default_title(),
            system_prompt: None,
            timeout_seconds: default_llm_timeout(),
        }
    }
}

impl OpenRouterConfig {
    /// Request timeout as a `Duration`
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }
}

/// Murf-compatible text-to-speech configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MurfConfig {
    /// API base URL; `/v1/speech/generate` is appended
    #[serde(default = "default_murf_api_base")]
    pub api_base: String,

    /// Voice identifier
    #[serde(default = "default_voice_id")]
    pub voice_id: String,

    /// Voice model generation
    #[serde(default = "default_model_version")]
    pub model_version: String,

    /// Audio container format
    #[serde(default = "default_audio_format")]
    pub format: String,

    /// Output sample rate in Hz
    #[serde(default = "default_sample_rate")]
    pub sample_rate: u32,

    /// Fallback API key when none is stored in settings
    #[serde(default)]
    pub api_key: Option<String>,

    /// Request timeout (seconds)
    #[serde(default = "default_tts_timeout")]
    pub timeout_seconds: u64,
}

fn default_murf_api_base() -> String {
    "https://api.murf.ai".to_string()
}

fn default_voice_id() -> String {
    "Charles".to_string()
}

fn default_model_version() -> String {
    "GEN2".to_string()
}

fn default_audio_format() -> String {
    "MP3".to_string()
}

fn default_sample_rate() -> u32 {
    44100
}

fn default_tts_timeout() -> u64 {
    60
}

impl Default for MurfConfig {
    fn default() -> Self {
        Self {
            api_base: default_murf_api_base(),
            voice_id: default_voice_id(),
            model_version: default_model_version(),
            format: default_audio_format(),
            sample_rate: default_sample_rate(),
            api_key: None,
            timeout_seconds: default_tts_timeout(),
        }
    }
}

impl MurfConfig {
    /// Request timeout as a `Duration`
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }
}

/// Terminal client configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Base URL of a running `parley serve`
    #[serde(default = "default_server_url")]
    pub server_url: String,

    /// Timeout for calls to the server (seconds)
    ///
    /// Kept above the server's own upstream timeouts so the upstream error
    /// text reaches the client instead of a bare client timeout.
    #[serde(default = "default_request_timeout")]
    pub request_timeout_seconds: u64,

    /// Directory of the local audio cache; defaults to the user data directory
    #[serde(default)]
    pub audio_cache_path: Option<PathBuf>,

    /// Days an audio cache entry is retained
    #[serde(default = "default_audio_retention_days")]
    pub audio_retention_days: u64,
}

fn default_server_url() -> String {
    "http://127.0.0.1:5000".to_string()
}

fn default_request_timeout() -> u64 {
    150
}

fn default_audio_retention_days() -> u64 {
    30
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            server_url: default_server_url(),
            request_timeout_seconds: default_request_timeout(),
            audio_cache_path: None,
            audio_retention_days: default_audio_retention_days(),
        }
    }
}

impl ClientConfig {
    /// Audio cache directory, falling back to `<data dir>/audio-cache`
    pub fn resolved_audio_cache_path(&self) -> Result<PathBuf> {
        match &self.audio_cache_path {
            Some(path) => Ok(path.clone()),
            None => Ok(data_dir()?.join("audio-cache")),
        }
    }

    /// Retention window of the audio cache
    pub fn audio_retention(&self) -> Duration {
        Duration::from_secs(self.audio_retention_days * 24 * 60 * 60)
    }

    /// Timeout for calls to the server
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_seconds)
    }
}

/// Per-user data directory used for default file locations
pub fn data_dir() -> Result<PathBuf> {
    let proj_dirs = ProjectDirs::from("dev", "parley", "parley")
        .ok_or_else(|| ParleyError::Config("Could not determine data directory".into()))?;
    Ok(proj_dirs.data_dir().to_path_buf())
}

impl Config {
    /// Load configuration from file, environment, and CLI
    ///
    /// # Arguments
    ///
    /// * `path` - Path to the YAML configuration file
    /// * `cli` - Parsed command line, whose flags take precedence
    ///
    /// # Errors
    ///
    /// Returns error if the file exists but cannot be read or parsed
    pub fn load(path: &str, cli: &Cli) -> Result<Self> {
        let mut config = if Path::new(path).exists() {
            Self::from_file(path)?
        } else {
            tracing::warn!("Config file not found at {}, using defaults", path);
            Self::default()
        };

        config.apply_env_vars();
        config.apply_cli_overrides(cli);

        Ok(config)
    }

    fn from_file(path: &str) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| ParleyError::Config(format!("Failed to read config file: {}", e)))?;
        serde_yaml::from_str(&contents)
            .map_err(|e| ParleyError::Config(format!("Failed to parse config: {}", e)).into())
    }

    fn apply_env_vars(&mut self) {
        if let Ok(bind) = std::env::var("PARLEY_BIND") {
            self.server.bind = bind;
        }

        if let Ok(database) = std::env::var("PARLEY_DATABASE") {
            self.server.database_path = Some(PathBuf::from(database));
        }

        if let Ok(api_base) = std::env::var("PARLEY_OPENROUTER_API_BASE") {
            self.openrouter.api_base = api_base;
        }

        if let Ok(model) = std::env::var("PARLEY_OPENROUTER_MODEL") {
            self.openrouter.model = model;
        }

        if let Ok(key) = std::env::var("OPENROUTER_API_KEY") {
            if !key.trim().is_empty() {
                self.openrouter.api_key = Some(key);
            }
        }

        if let Ok(timeout) = std::env::var("PARLEY_LLM_TIMEOUT_SECONDS") {
            if let Ok(value) = timeout.parse() {
                self.openrouter.timeout_seconds = value;
            } else {
                tracing::warn!("Invalid PARLEY_LLM_TIMEOUT_SECONDS: {}", timeout);
            }
        }

        if let Ok(api_base) = std::env::var("PARLEY_MURF_API_BASE") {
            self.tts.api_base = api_base;
        }

        if let Ok(voice) = std::env::var("PARLEY_MURF_VOICE") {
            self.tts.voice_id = voice;
        }

        if let Ok(key) = std::env::var("MURF_API_KEY") {
            if !key.trim().is_empty() {
                self.tts.api_key = Some(key);
            }
        }

        if let Ok(url) = std::env::var("PARLEY_SERVER_URL") {
            tracing::debug!(server_url = %url, "Env override: PARLEY_SERVER_URL");
            self.client.server_url = url;
        }

        if let Ok(path) = std::env::var("PARLEY_AUDIO_CACHE") {
            self.client.audio_cache_path = Some(PathBuf::from(path));
        }
    }

    fn apply_cli_overrides(&mut self, cli: &Cli) {
        if cli.verbose {
            tracing::debug!("Verbose mode enabled");
        }

        match &cli.command {
            Commands::Serve { bind, database } => {
                if let Some(bind) = bind {
                    self.server.bind = bind.clone();
                }
                if let Some(database) = database {
                    self.server.database_path = Some(database.clone());
                }
            }
            Commands::Chat {
                server,
                audio_cache,
                ..
            } => {
                if let Some(server) = server {
                    self.client.server_url = server.clone();
                }
                if let Some(audio_cache) = audio_cache {
                    self.client.audio_cache_path = Some(audio_cache.clone());
                }
            }
            Commands::Sessions { database, .. } => {
                if let Some(database) = database {
                    self.server.database_path = Some(database.clone());
                }
            }
        }
    }

    /// Validate the configuration
    ///
    /// Ensures all configuration values are within acceptable ranges
    /// and that required fields are properly set.
    ///
    /// # Errors
    ///
    /// Returns error if any validation check fails
    pub fn validate(&self) -> Result<()> {
        if self.server.bind.parse::<SocketAddr>().is_err() {
            return Err(ParleyError::Config(format!(
                "server.bind is not a socket address: {}",
                self.server.bind
            ))
            .into());
        }

        for (name, value) in [
            ("openrouter.api_base", &self.openrouter.api_base),
            ("tts.api_base", &self.tts.api_base),
            ("client.server_url", &self.client.server_url),
        ] {
            if url::Url::parse(value).is_err() {
                return Err(
                    ParleyError::Config(format!("{} is not a valid URL: {}", name, value)).into(),
                );
            }
        }

        if self.openrouter.model.trim().is_empty() {
            return Err(
                ParleyError::Config("openrouter.model cannot be empty".to_string()).into(),
            );
        }

        if self.tts.voice_id.trim().is_empty() {
            return Err(ParleyError::Config("tts.voice_id cannot be empty".to_string()).into());
        }

        if self.openrouter.timeout_seconds == 0
            || self.tts.timeout_seconds == 0
            || self.client.request_timeout_seconds == 0
        {
            return Err(
                ParleyError::Config("timeouts must be greater than 0".to_string()).into(),
            );
        }

        if self.client.audio_retention_days == 0 {
            return Err(ParleyError::Config(
                "client.audio_retention_days must be greater than 0".to_string(),
            )
            .into());
        }

        Ok(())
    }
}

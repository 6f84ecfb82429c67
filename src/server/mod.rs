//! HTTP proxy server
//!
//! Exposes the session/message store and the two upstream collaborators
//! under `/api`.

pub mod error;
pub mod handlers;

use crate::config::Config;
use crate::error::{ParleyError, Result};
use crate::storage::{Settings, SqliteStorage};

use axum::routing::{get, post};
use axum::Router;
use std::net::SocketAddr;
use std::sync::Arc;

/// Shared state handed to every handler
#[derive(Clone)]
pub struct AppState {
    storage: Arc<SqliteStorage>,
    config: Arc<Config>,
    http: reqwest::Client,
}

impl AppState {
    /// Build the state from an opened store and the loaded configuration
    pub fn new(storage: SqliteStorage, config: Config) -> Self {
        Self {
            storage: Arc::new(storage),
            config: Arc::new(config),
            http: reqwest::Client::new(),
        }
    }

    /// Run a store operation on the blocking pool
    pub async fn with_storage<T, F>(&self, op: F) -> Result<T>
    where
        F: FnOnce(&SqliteStorage) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let storage = Arc::clone(&self.storage);
        tokio::task::spawn_blocking(move || op(&storage))
            .await
            .map_err(|e| ParleyError::Storage(format!("Storage task failed: {}", e)))?
    }

    /// Settings record, read fresh for each request
    async fn settings(&self) -> Result<Option<Settings>> {
        self.with_storage(|s| s.get_settings()).await
    }
}

/// Build the application router
pub fn router(state: AppState) -> Router {
    let api = Router::new()
        .route(
            "/chat-sessions",
            get(handlers::list_sessions).post(handlers::create_session),
        )
        .route(
            "/chat-sessions/:id",
            get(handlers::get_session).delete(handlers::delete_session),
        )
        .route(
            "/chat-sessions/:id/messages",
            get(handlers::list_messages).post(handlers::append_messages),
        )
        .route("/chat", post(handlers::chat))
        .route("/tts", post(handlers::tts))
        .route(
            "/settings",
            get(handlers::get_settings).post(handlers::update_settings),
        );

    Router::new()
        .route("/healthz", get(handlers::healthz))
        .nest("/api", api)
        .with_state(state)
}

/// Open the store, bind, and serve until Ctrl-C
///
/// # Errors
///
/// Returns error if the bind address is invalid, the store cannot be
/// opened, or the listener fails
pub async fn serve(config: Config) -> Result<()> {
    let addr: SocketAddr = config
        .server
        .bind
        .parse()
        .map_err(|e| ParleyError::Config(format!("Invalid bind address: {}", e)))?;

    let storage = SqliteStorage::from_config(&config.server)?;
    tracing::info!("Using database at {}", storage.db_path().display());

    if config.openrouter.api_key.is_none() {
        tracing::warn!("No OpenRouter API key configured; /api/chat needs one saved in settings");
    }

    let app = router(AppState::new(storage, config));

    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!("Listening on http://{}", addr);
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    tracing::info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
    }
}

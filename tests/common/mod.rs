use axum::body::Body;
use axum::http::{Method, Request, StatusCode};
use axum::Router;
use serde_json::Value;
use std::fs;
use std::path::PathBuf;
use tempfile::TempDir;
use tower::ServiceExt;

use parley::config::Config;
use parley::server::{self, AppState};
use parley::storage::SqliteStorage;

#[allow(dead_code)]
pub fn create_temp_storage() -> (SqliteStorage, TempDir) {
    let tmp = TempDir::new().expect("failed to create tempdir");
    let db_path = tmp.path().join("parley.db");
    let storage =
        SqliteStorage::new_with_path(db_path).expect("failed to create sqlite storage with path");
    (storage, tmp)
}

#[allow(dead_code)]
pub fn temp_config_file(contents: &str) -> (TempDir, PathBuf) {
    let temp_dir = TempDir::new().expect("failed to create tempdir");
    let config_path = temp_dir.path().join("config.yaml");
    fs::write(&config_path, contents).expect("failed to write config file");
    (temp_dir, config_path)
}

/// Configuration pointing both collaborators at `upstream`, with keys set
#[allow(dead_code)]
pub fn test_config(upstream: &str) -> Config {
    let mut config = Config::default();
    config.openrouter.api_base = format!("{}/api/v1", upstream);
    config.openrouter.api_key = Some("test-openrouter-key".to_string());
    config.openrouter.timeout_seconds = 5;
    config.tts.api_base = upstream.to_string();
    config.tts.api_key = Some("test-murf-key".to_string());
    config.tts.timeout_seconds = 5;
    config
}

/// Router over a fresh temporary store
#[allow(dead_code)]
pub fn test_app(config: Config) -> (Router, SqliteStorage, TempDir) {
    let (storage, tmp) = create_temp_storage();
    let handle = SqliteStorage::new_with_path(storage.db_path().clone())
        .expect("failed to reopen sqlite storage");
    (server::router(AppState::new(handle, config)), storage, tmp)
}

/// Serve the router on an ephemeral port and return its base URL
#[allow(dead_code)]
pub async fn spawn_app(app: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("failed to bind ephemeral port");
    let addr = listener.local_addr().expect("listener has no address");
    tokio::spawn(async move {
        axum::serve(listener, app).await.expect("server failed");
    });
    format!("http://{}", addr)
}

/// Issue one request against the router and decode the JSON reply
#[allow(dead_code)]
pub async fn call(app: &Router, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let builder = Request::builder().method(method).uri(uri);
    let request = match body {
        Some(body) => builder
            .header("content-type", "application/json")
            .body(Body::from(body.to_string())),
        None => builder.body(Body::empty()),
    }
    .expect("failed to build request");

    let response = app
        .clone()
        .oneshot(request)
        .await
        .expect("router failed");
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("failed to read body");
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).expect("response is not JSON")
    };
    (status, value)
}

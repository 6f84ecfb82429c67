//! HTTP surface of `parley serve`
//!
//! Routes are exercised in-process with `tower::ServiceExt::oneshot`; the two
//! collaborators are replaced by a `wiremock` server.

mod common;

use axum::http::{Method, StatusCode};
use parley::providers::ChatMessage;
use serde_json::{json, Value};
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use common::{call, test_app, test_config};

async fn mock_completion(server: &MockServer, reply: &str) {
    Mock::given(method("POST"))
        .and(path("/api/v1/chat/completions"))
        .and(header("authorization", "Bearer test-openrouter-key"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "choices": [{ "message": { "role": "assistant", "content": reply } }]
        })))
        .mount(server)
        .await;
}

#[tokio::test]
async fn test_healthz() {
    let (app, _storage, _tmp) = test_app(test_config("http://127.0.0.1:9"));
    let (status, body) = call(&app, Method::GET, "/healthz", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
}

#[tokio::test]
async fn test_session_lifecycle() {
    let (app, _storage, _tmp) = test_app(test_config("http://127.0.0.1:9"));

    let (status, created) = call(
        &app,
        Method::POST,
        "/api/chat-sessions",
        Some(json!({ "title": "Trip planning" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let id = created["id"].as_str().unwrap().to_string();
    assert_eq!(created["title"], "Trip planning");
    assert!(created["createdAt"].is_string());

    let (status, fetched) = call(&app, Method::GET, &format!("/api/chat-sessions/{}", id), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(fetched["id"], id.as_str());

    let (status, list) = call(&app, Method::GET, "/api/chat-sessions", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(list.as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn test_unknown_session_is_404() {
    let (app, _storage, _tmp) = test_app(test_config("http://127.0.0.1:9"));
    let (status, body) = call(&app, Method::GET, "/api/chat-sessions/nope", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "Chat session not found");
}

#[tokio::test]
async fn test_append_to_unknown_session_is_404() {
    let (app, _storage, _tmp) = test_app(test_config("http://127.0.0.1:9"));
    let (status, body) = call(
        &app,
        Method::POST,
        "/api/chat-sessions/nope/messages",
        Some(json!({ "messages": [{ "role": "user", "content": "hi" }] })),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(body["error"].is_string());
}

#[tokio::test]
async fn test_append_and_list_messages_in_order() {
    let (app, storage, _tmp) = test_app(test_config("http://127.0.0.1:9"));
    let session = storage.create_session("Ordering").unwrap();
    let uri = format!("/api/chat-sessions/{}/messages", session.id);

    let (status, created) = call(
        &app,
        Method::POST,
        &uri,
        Some(json!({ "messages": [
            { "role": "user", "content": "hello" },
            { "role": "assistant", "content": "hi there" }
        ] })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let created = created.as_array().unwrap();
    assert_eq!(created.len(), 2);
    assert!(created[0]["id"].as_i64().unwrap() < created[1]["id"].as_i64().unwrap());
    assert_eq!(created[0]["chatSessionId"], session.id.as_str());

    let (status, listed) = call(&app, Method::GET, &uri, None).await;
    assert_eq!(status, StatusCode::OK);
    let roles: Vec<&str> = listed
        .as_array()
        .unwrap()
        .iter()
        .map(|m| m["role"].as_str().unwrap())
        .collect();
    assert_eq!(roles, vec!["user", "assistant"]);
}

#[tokio::test]
async fn test_validation_errors_are_400() {
    let (app, storage, _tmp) = test_app(test_config("http://127.0.0.1:9"));
    let session = storage.create_session("Validation").unwrap();
    let messages_uri = format!("/api/chat-sessions/{}/messages", session.id);

    let cases: Vec<(&str, Value, &str)> = vec![
        ("/api/chat-sessions", json!({}), "Invalid session data"),
        (messages_uri.as_str(), json!({ "messages": "nope" }), "Messages must be an array"),
        ("/api/chat", json!({}), "Messages array is required"),
        ("/api/chat", json!({ "messages": [] }), "Messages array is required"),
        (
            "/api/chat",
            json!({ "messages": [{ "role": "wizard", "content": "hi" }] }),
            "Invalid message format or role",
        ),
        ("/api/tts", json!({ "text": "" }), "Text is required"),
    ];

    for (uri, body, expected) in cases {
        let (status, reply) = call(&app, Method::POST, uri, Some(body)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "{}", uri);
        assert_eq!(reply["error"], expected, "{}", uri);
    }
}

#[tokio::test]
async fn test_delete_session_with_four_messages() {
    let (app, storage, _tmp) = test_app(test_config("http://127.0.0.1:9"));
    let session = storage.create_session("Doomed").unwrap();
    storage
        .append_messages(
            &session.id,
            &[
                ChatMessage::user("one"),
                ChatMessage::assistant("two"),
                ChatMessage::user("three"),
                ChatMessage::assistant("four"),
            ],
        )
        .unwrap();

    let (status, body) = call(
        &app,
        Method::DELETE,
        &format!("/api/chat-sessions/{}", session.id),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);

    let (_, messages) = call(
        &app,
        Method::GET,
        &format!("/api/chat-sessions/{}/messages", session.id),
        None,
    )
    .await;
    assert!(messages.as_array().unwrap().is_empty());

    let (_, sessions) = call(&app, Method::GET, "/api/chat-sessions", None).await;
    assert!(sessions
        .as_array()
        .unwrap()
        .iter()
        .all(|s| s["id"] != session.id.as_str()));
}

#[tokio::test]
async fn test_chat_proxies_completion() {
    let upstream = MockServer::start().await;
    mock_completion(&upstream, "Bonjour!").await;
    let (app, _storage, _tmp) = test_app(test_config(&upstream.uri()));

    let (status, body) = call(
        &app,
        Method::POST,
        "/api/chat",
        Some(json!({ "messages": [{ "role": "user", "content": "Say hello in French" }] })),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], "Bonjour!");

    let requests = upstream.received_requests().await.unwrap();
    assert_eq!(requests.len(), 1);
    let sent: Value = serde_json::from_slice(&requests[0].body).unwrap();
    assert_eq!(sent["model"], "deepseek/deepseek-chat");
    assert_eq!(sent["messages"][0]["content"], "Say hello in French");
}

#[tokio::test]
async fn test_chat_propagates_upstream_status_and_text() {
    let upstream = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/v1/chat/completions"))
        .respond_with(
            ResponseTemplate::new(429)
                .set_body_json(json!({ "error": { "message": "Rate limit exceeded" } })),
        )
        .mount(&upstream)
        .await;
    let (app, _storage, _tmp) = test_app(test_config(&upstream.uri()));

    let (status, body) = call(
        &app,
        Method::POST,
        "/api/chat",
        Some(json!({ "messages": [{ "role": "user", "content": "hi" }] })),
    )
    .await;

    assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(body["error"], "Rate limit exceeded");
}

#[tokio::test]
async fn test_chat_empty_upstream_reply_is_500() {
    let upstream = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/v1/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "choices": [] })))
        .mount(&upstream)
        .await;
    let (app, _storage, _tmp) = test_app(test_config(&upstream.uri()));

    let (status, body) = call(
        &app,
        Method::POST,
        "/api/chat",
        Some(json!({ "messages": [{ "role": "user", "content": "hi" }] })),
    )
    .await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["error"], "No response from AI");
}

#[tokio::test]
async fn test_chat_without_key_is_500() {
    let mut config = test_config("http://127.0.0.1:9");
    config.openrouter.api_key = None;
    let (app, _storage, _tmp) = test_app(config);

    let (status, body) = call(
        &app,
        Method::POST,
        "/api/chat",
        Some(json!({ "messages": [{ "role": "user", "content": "hi" }] })),
    )
    .await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert!(body["error"]
        .as_str()
        .unwrap()
        .starts_with("OpenRouter API key not configured"));
}

#[tokio::test]
async fn test_stored_key_takes_precedence() {
    let upstream = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/v1/chat/completions"))
        .and(header("authorization", "Bearer saved-key"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "choices": [{ "message": { "content": "from saved key" } }]
        })))
        .expect(1)
        .mount(&upstream)
        .await;
    let (app, _storage, _tmp) = test_app(test_config(&upstream.uri()));

    let (status, _) = call(
        &app,
        Method::POST,
        "/api/settings",
        Some(json!({ "openrouterApiKey": "saved-key" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (_, flags) = call(&app, Method::GET, "/api/settings", None).await;
    assert_eq!(flags["hasOpenrouterKey"], true);
    assert_eq!(flags["hasMurfKey"], false);
    assert!(flags.get("openrouterApiKey").is_none());

    let (status, body) = call(
        &app,
        Method::POST,
        "/api/chat",
        Some(json!({ "messages": [{ "role": "user", "content": "hi" }] })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], "from saved key");
}

#[tokio::test]
async fn test_tts_stores_audio_on_message() {
    let upstream = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/speech/generate"))
        .and(header("api-key", "test-murf-key"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "encodedAudio": "SUQzBAA=" })))
        .expect(1)
        .mount(&upstream)
        .await;
    let (app, storage, _tmp) = test_app(test_config(&upstream.uri()));
    let session = storage.create_session("Speech").unwrap();
    let created = storage
        .append_messages(&session.id, &[ChatMessage::assistant("Read me aloud")])
        .unwrap();
    let message_id = created[0].id;

    let (status, body) = call(
        &app,
        Method::POST,
        "/api/tts",
        Some(json!({ "text": "Read me aloud", "messageId": message_id })),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["audioBase64"], "SUQzBAA=");

    let requests = upstream.received_requests().await.unwrap();
    let sent: Value = serde_json::from_slice(&requests[0].body).unwrap();
    assert_eq!(sent["voiceId"], "Charles");
    assert_eq!(sent["encodeAsBase64"], true);

    let messages = storage.list_messages(&session.id).unwrap();
    assert_eq!(messages[0].audio_base64.as_deref(), Some("SUQzBAA="));
}

#[tokio::test]
async fn test_tts_without_audio_is_500() {
    let upstream = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/speech/generate"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
        .mount(&upstream)
        .await;
    let (app, _storage, _tmp) = test_app(test_config(&upstream.uri()));

    let (status, body) = call(&app, Method::POST, "/api/tts", Some(json!({ "text": "hi" }))).await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["error"], "No audio data received from Murf API");
}

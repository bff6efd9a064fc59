//! Integration tests for the chat and history endpoints.

mod common;

use axum::http::StatusCode;
use chat_service::startup::{CHAT_REQUESTS_PER_MINUTE, HISTORY_REQUESTS_PER_MINUTE};
use common::{body_json, TestApp, TEST_API_KEY};
use serde_json::json;

// ============================================================================
// Chat
// ============================================================================

#[tokio::test]
async fn test_chat_returns_generated_response() {
    let app = TestApp::spawn().await;

    let response = app
        .post_chat(
            &json!({"user_message": "hi", "session_id": "s1"}),
            Some(TEST_API_KEY),
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);

    let body = body_json(response).await;
    assert_eq!(body["session_id"], "s1");
    assert_eq!(body["user_message"], "hi");
    assert_eq!(body["bot_response"], "Mock response for: hi");

    let timestamp = body["timestamp"].as_str().expect("timestamp is a string");
    assert!(chrono::DateTime::parse_from_rfc3339(timestamp).is_ok());
}

#[tokio::test]
async fn test_chat_persists_exactly_one_turn() {
    let app = TestApp::spawn().await;

    let response = app
        .post_chat(
            &json!({"user_message": "hello there", "session_id": "persist"}),
            Some(TEST_API_KEY),
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);

    let turns = app.state.db.list_turns("persist").await.unwrap();
    assert_eq!(turns.len(), 1);
    assert_eq!(turns[0].session_id, "persist");
    assert_eq!(turns[0].user_message, "hello there");
    assert_eq!(turns[0].bot_response, "Mock response for: hello there");
    assert_eq!(app.provider.calls(), 1);
}

#[tokio::test]
async fn test_chat_defaults_session_id() {
    let app = TestApp::spawn().await;

    let omitted = app
        .post_chat(&json!({"user_message": "a"}), Some(TEST_API_KEY))
        .await;
    assert_eq!(body_json(omitted).await["session_id"], "default");

    let null = app
        .post_chat(
            &json!({"user_message": "b", "session_id": null}),
            Some(TEST_API_KEY),
        )
        .await;
    assert_eq!(body_json(null).await["session_id"], "default");

    let turns = app.state.db.list_turns("default").await.unwrap();
    assert_eq!(turns.len(), 2);
}

#[tokio::test]
async fn test_generation_failure_returns_500_and_persists_nothing() {
    let app = TestApp::spawn_with_provider(false).await;

    let response = app
        .post_chat(
            &json!({"user_message": "hi", "session_id": "broken"}),
            Some(TEST_API_KEY),
        )
        .await;
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

    let body = body_json(response).await;
    let detail = body["detail"].as_str().unwrap();
    assert!(detail.starts_with("LLM error"), "unexpected detail: {}", detail);

    assert!(app.state.db.list_turns("broken").await.unwrap().is_empty());
}

#[tokio::test]
async fn test_malformed_body_is_client_error() {
    let app = TestApp::spawn().await;

    let invalid_json = app
        .post_chat_raw("{not json".to_string(), Some(TEST_API_KEY), common::DEFAULT_PEER)
        .await;
    assert!(invalid_json.status().is_client_error());

    let missing_field = app
        .post_chat(&json!({"session_id": "s1"}), Some(TEST_API_KEY))
        .await;
    assert!(missing_field.status().is_client_error());

    assert_eq!(app.provider.calls(), 0);
}

// ============================================================================
// Authentication
// ============================================================================

#[tokio::test]
async fn test_wrong_key_unauthorized_regardless_of_payload() {
    let app = TestApp::spawn().await;

    let payloads = [
        json!({"user_message": "hi", "session_id": "s1"}).to_string(),
        json!({"user_message": ""}).to_string(),
        json!({}).to_string(),
        "{not json".to_string(),
    ];

    for payload in payloads {
        let response = app
            .post_chat_raw(payload, Some("wrong-key"), common::DEFAULT_PEER)
            .await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(body_json(response).await["detail"], "Unauthorized");
    }

    let history = app.get_history("s1", Some("wrong-key")).await;
    assert_eq!(history.status(), StatusCode::UNAUTHORIZED);

    assert_eq!(app.provider.calls(), 0);
    assert!(app.state.db.list_turns("s1").await.unwrap().is_empty());
}

#[tokio::test]
async fn test_missing_key_unauthorized() {
    let app = TestApp::spawn().await;

    let chat = app.post_chat(&json!({"user_message": "hi"}), None).await;
    assert_eq!(chat.status(), StatusCode::UNAUTHORIZED);

    let history = app.get_history("s1", None).await;
    assert_eq!(history.status(), StatusCode::UNAUTHORIZED);
}

// ============================================================================
// Rate limiting
// ============================================================================

#[tokio::test]
async fn test_chat_rate_limited_after_quota() {
    let app = TestApp::spawn().await;
    let body = json!({"user_message": "hi", "session_id": "limited"});

    for _ in 0..CHAT_REQUESTS_PER_MINUTE {
        let response = app.post_chat(&body, Some(TEST_API_KEY)).await;
        assert_eq!(response.status(), StatusCode::OK);
    }

    let response = app.post_chat(&body, Some(TEST_API_KEY)).await;
    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
    assert!(response
        .headers()
        .contains_key(axum::http::header::RETRY_AFTER));
    assert_eq!(body_json(response).await["detail"], "Rate limit exceeded");

    // The rejected request never reached the backend or storage.
    assert_eq!(app.provider.calls(), CHAT_REQUESTS_PER_MINUTE as usize);
    assert_eq!(
        app.state.db.list_turns("limited").await.unwrap().len(),
        CHAT_REQUESTS_PER_MINUTE as usize
    );
}

#[tokio::test]
async fn test_history_rate_limited_after_quota() {
    let app = TestApp::spawn().await;

    for _ in 0..HISTORY_REQUESTS_PER_MINUTE {
        let response = app.get_history("unknown", Some(TEST_API_KEY)).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    let response = app.get_history("unknown", Some(TEST_API_KEY)).await;
    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
}

#[tokio::test]
async fn test_endpoint_quotas_are_independent() {
    let app = TestApp::spawn().await;

    for _ in 0..HISTORY_REQUESTS_PER_MINUTE {
        app.get_history("unknown", Some(TEST_API_KEY)).await;
    }
    let history = app.get_history("unknown", Some(TEST_API_KEY)).await;
    assert_eq!(history.status(), StatusCode::TOO_MANY_REQUESTS);

    let chat = app
        .post_chat(&json!({"user_message": "still allowed"}), Some(TEST_API_KEY))
        .await;
    assert_eq!(chat.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_address_quotas_are_independent() {
    let app = TestApp::spawn().await;
    let body = json!({"user_message": "hi"});

    for _ in 0..CHAT_REQUESTS_PER_MINUTE {
        app.post_chat_from(&body, Some(TEST_API_KEY), "10.0.0.1:1000")
            .await;
    }
    let blocked = app
        .post_chat_from(&body, Some(TEST_API_KEY), "10.0.0.1:2000")
        .await;
    assert_eq!(blocked.status(), StatusCode::TOO_MANY_REQUESTS);

    let other = app
        .post_chat_from(&body, Some(TEST_API_KEY), "10.0.0.2:1000")
        .await;
    assert_eq!(other.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_rejected_credentials_do_not_consume_quota() {
    let app = TestApp::spawn().await;
    let body = json!({"user_message": "hi"});

    for _ in 0..(CHAT_REQUESTS_PER_MINUTE * 2) {
        let response = app.post_chat(&body, Some("wrong-key")).await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    for _ in 0..CHAT_REQUESTS_PER_MINUTE {
        let response = app.post_chat(&body, Some(TEST_API_KEY)).await;
        assert_eq!(response.status(), StatusCode::OK);
    }
}

// ============================================================================
// History
// ============================================================================

#[tokio::test]
async fn test_history_not_found_for_empty_session() {
    let app = TestApp::spawn().await;

    let response = app.get_history("nobody", Some(TEST_API_KEY)).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(
        body_json(response).await["detail"],
        "No conversation history found."
    );
}

#[tokio::test]
async fn test_history_after_chat_round_trips() {
    let app = TestApp::spawn().await;

    let before = app.get_history("s1", Some(TEST_API_KEY)).await;
    assert_eq!(before.status(), StatusCode::NOT_FOUND);

    let chat = app
        .post_chat(
            &json!({"user_message": "hi", "session_id": "s1"}),
            Some(TEST_API_KEY),
        )
        .await;
    assert_eq!(chat.status(), StatusCode::OK);
    let chat_body = body_json(chat).await;

    let history = app.get_history("s1", Some(TEST_API_KEY)).await;
    assert_eq!(history.status(), StatusCode::OK);
    let entries = body_json(history).await;
    let entries = entries.as_array().expect("history is an array");

    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0]["user_message"], chat_body["user_message"]);
    assert_eq!(entries[0]["bot_response"], chat_body["bot_response"]);
    assert_eq!(entries[0]["timestamp"], chat_body["timestamp"]);
    assert!(entries[0].get("session_id").is_none());
}

#[tokio::test]
async fn test_history_preserves_insertion_order() {
    let app = TestApp::spawn().await;

    for message in ["first", "second", "third"] {
        let response = app
            .post_chat(
                &json!({"user_message": message, "session_id": "ordered"}),
                Some(TEST_API_KEY),
            )
            .await;
        assert_eq!(response.status(), StatusCode::OK);
    }

    let entries = body_json(app.get_history("ordered", Some(TEST_API_KEY)).await).await;
    let messages: Vec<&str> = entries
        .as_array()
        .unwrap()
        .iter()
        .map(|e| e["user_message"].as_str().unwrap())
        .collect();
    assert_eq!(messages, vec!["first", "second", "third"]);
}

#[tokio::test]
async fn test_history_is_scoped_to_session() {
    let app = TestApp::spawn().await;

    app.post_chat(
        &json!({"user_message": "mine", "session_id": "alice"}),
        Some(TEST_API_KEY),
    )
    .await;

    let other = app.get_history("bob", Some(TEST_API_KEY)).await;
    assert_eq!(other.status(), StatusCode::NOT_FOUND);
}

// ============================================================================
// Ambient middleware
// ============================================================================

#[tokio::test]
async fn test_responses_carry_request_id_and_security_headers() {
    let app = TestApp::spawn().await;

    let response = app.get_history("nobody", Some(TEST_API_KEY)).await;
    let headers = response.headers();

    assert!(headers.contains_key("x-request-id"));
    assert_eq!(headers.get("x-content-type-options").unwrap(), "nosniff");
    assert_eq!(headers.get("x-frame-options").unwrap(), "DENY");
}

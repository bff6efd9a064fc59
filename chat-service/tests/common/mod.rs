//! Common test utilities for chat-service integration tests.

#![allow(dead_code)]

use axum::{
    body::Body,
    extract::ConnectInfo,
    http::{Request, Response},
    Router,
};
use chat_service::config::{
    AuthConfig, ChatConfig, DatabaseConfig, GenerationBackend, GenerationConfig, RateLimitConfig,
};
use chat_service::services::providers::{MockTextProvider, TextProvider};
use chat_service::startup::{router, AppState, Application};
use http_body_util::BodyExt;
use secrecy::SecretString;
use serde_json::Value;
use service_core::config::Config as CommonConfig;
use service_core::middleware::api_key::API_KEY_HEADER;
use std::net::SocketAddr;
use std::sync::{Arc, Once};
use tempfile::TempDir;
use tower::ServiceExt;

pub const TEST_API_KEY: &str = "test-api-key";

/// Peer address used when a test does not care which client is calling.
pub const DEFAULT_PEER: &str = "127.0.0.1:40000";

static INIT: Once = Once::new();

/// Initialize tracing for tests (only once).
pub fn init_tracing() {
    INIT.call_once(|| {
        tracing_subscriber::fmt()
            .with_env_filter("info,chat_service=debug,sqlx=warn")
            .with_test_writer()
            .try_init()
            .ok();
    });
}

/// Configuration pointing at a SQLite file inside `dir`.
pub fn test_config(dir: &TempDir, backend: GenerationBackend) -> ChatConfig {
    ChatConfig {
        common: CommonConfig { port: 0 },
        service_name: "chat-service-test".to_string(),
        service_version: "test".to_string(),
        log_level: "debug".to_string(),
        otlp_endpoint: None,
        auth: AuthConfig {
            api_key: SecretString::new(TEST_API_KEY.to_string()),
        },
        generation: GenerationConfig {
            backend,
            ollama_api_url: "http://127.0.0.1:9/api/generate".to_string(),
            ollama_model: None,
            max_tokens: 30,
            timeout_secs: 5,
            local_corpus_path: None,
        },
        database: DatabaseConfig {
            url: format!("sqlite://{}", dir.path().join("chat.db").display()),
            max_connections: 2,
            min_connections: 1,
        },
        rate_limit: RateLimitConfig {
            trust_forwarded_for: false,
        },
    }
}

/// Router-level test application backed by a mock provider.
pub struct TestApp {
    pub router: Router,
    pub state: AppState,
    pub provider: Arc<MockTextProvider>,
    _db_dir: TempDir,
}

impl TestApp {
    /// Build an app whose provider always succeeds.
    pub async fn spawn() -> Self {
        Self::spawn_with_provider(true).await
    }

    /// Build an app whose mock provider succeeds or fails every call.
    pub async fn spawn_with_provider(enabled: bool) -> Self {
        init_tracing();

        let dir = tempfile::tempdir().expect("Failed to create temp dir");
        let config = test_config(&dir, GenerationBackend::Local);
        let provider = Arc::new(MockTextProvider::new(enabled));

        let app = Application::build_with_provider(
            config,
            provider.clone() as Arc<dyn TextProvider>,
        )
        .await
        .expect("Failed to build application");

        let state = app.state().clone();

        Self {
            router: router(state.clone()),
            state,
            provider,
            _db_dir: dir,
        }
    }

    pub async fn send(&self, mut request: Request<Body>, peer: &str) -> Response<Body> {
        let addr: SocketAddr = peer.parse().expect("Invalid peer address");
        request.extensions_mut().insert(ConnectInfo(addr));

        self.router
            .clone()
            .oneshot(request)
            .await
            .expect("Failed to execute request")
    }

    pub async fn post_chat(&self, body: &Value, api_key: Option<&str>) -> Response<Body> {
        self.post_chat_from(body, api_key, DEFAULT_PEER).await
    }

    pub async fn post_chat_from(
        &self,
        body: &Value,
        api_key: Option<&str>,
        peer: &str,
    ) -> Response<Body> {
        self.post_chat_raw(body.to_string(), api_key, peer).await
    }

    pub async fn post_chat_raw(
        &self,
        body: String,
        api_key: Option<&str>,
        peer: &str,
    ) -> Response<Body> {
        let mut builder = Request::builder()
            .method("POST")
            .uri("/chat")
            .header("content-type", "application/json");
        if let Some(key) = api_key {
            builder = builder.header(API_KEY_HEADER, key);
        }

        self.send(builder.body(Body::from(body)).unwrap(), peer).await
    }

    pub async fn get_history(&self, session_id: &str, api_key: Option<&str>) -> Response<Body> {
        self.get_history_from(session_id, api_key, DEFAULT_PEER).await
    }

    pub async fn get_history_from(
        &self,
        session_id: &str,
        api_key: Option<&str>,
        peer: &str,
    ) -> Response<Body> {
        let mut builder = Request::builder().uri(format!("/history/{}", session_id));
        if let Some(key) = api_key {
            builder = builder.header(API_KEY_HEADER, key);
        }

        self.send(builder.body(Body::empty()).unwrap(), peer).await
    }
}

/// Collect a response body as JSON.
pub async fn body_json(response: Response<Body>) -> Value {
    let bytes = response
        .into_body()
        .collect()
        .await
        .expect("Failed to read body")
        .to_bytes();
    serde_json::from_slice(&bytes).expect("Body is not JSON")
}

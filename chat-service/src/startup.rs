//! Application startup and lifecycle management.
//!
//! Builds shared state (storage, generation provider, rate limiters), wires
//! the HTTP router and runs the server.

use crate::config::ChatConfig;
use crate::handlers;
use crate::services::providers::{build_provider, TextProvider};
use crate::services::ConversationDb;
use axum::{
    middleware::{from_fn, from_fn_with_state},
    routing::{get, post},
    Router,
};
use service_core::error::AppError;
use service_core::middleware::{
    api_key::{api_key_middleware, ApiKeyGate},
    rate_limit::{create_ip_rate_limiter, ip_rate_limit_middleware, IpRateLimit},
    security_headers::security_headers_middleware,
    tracing::{request_id_middleware, REQUEST_ID_HEADER},
};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;

/// `/chat` quota per client address per rolling minute.
pub const CHAT_REQUESTS_PER_MINUTE: u32 = 5;

/// `/history/{session_id}` quota per client address per rolling minute.
pub const HISTORY_REQUESTS_PER_MINUTE: u32 = 10;

/// How often idle rate-limit keys are evicted.
const RATE_LIMIT_PRUNE_INTERVAL: Duration = Duration::from_secs(60);

/// Per-endpoint rate limiters, one instance per process.
#[derive(Clone)]
pub struct RateLimiters {
    pub chat: IpRateLimit,
    pub history: IpRateLimit,
}

impl RateLimiters {
    pub fn new(trust_forwarded_for: bool) -> Self {
        Self {
            chat: IpRateLimit::new(
                create_ip_rate_limiter(CHAT_REQUESTS_PER_MINUTE),
                trust_forwarded_for,
            ),
            history: IpRateLimit::new(
                create_ip_rate_limiter(HISTORY_REQUESTS_PER_MINUTE),
                trust_forwarded_for,
            ),
        }
    }

    /// Drop logs for addresses with no request inside the window.
    pub fn retain_recent(&self) {
        for limit in [&self.chat, &self.history] {
            limit.limiter().retain_recent();
            limit.limiter().shrink_to_fit();
        }
    }
}

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub config: ChatConfig,
    pub db: ConversationDb,
    pub text_provider: Arc<dyn TextProvider>,
    pub rate_limiters: RateLimiters,
}

/// Build the HTTP router.
///
/// Protected routes check the API key before the rate limit, so rejected
/// credentials never consume quota.
pub fn router(state: AppState) -> Router {
    let api_key_gate = ApiKeyGate::new(state.config.auth.api_key.clone());

    let chat_route = Router::new()
        .route("/chat", post(handlers::chat))
        .layer(from_fn_with_state(
            state.rate_limiters.chat.clone(),
            ip_rate_limit_middleware,
        ));

    let history_route = Router::new()
        .route("/history/:session_id", get(handlers::get_history))
        .layer(from_fn_with_state(
            state.rate_limiters.history.clone(),
            ip_rate_limit_middleware,
        ));

    let api_routes = Router::new()
        .merge(chat_route)
        .merge(history_route)
        .layer(from_fn_with_state(api_key_gate, api_key_middleware));

    Router::new()
        .route("/health", get(handlers::health_check))
        .route("/ready", get(handlers::readiness_check))
        .route("/metrics", get(handlers::metrics))
        .merge(api_routes)
        .with_state(state)
        .layer(TraceLayer::new_for_http().make_span_with(
            |request: &axum::http::Request<_>| {
                let request_id = request
                    .headers()
                    .get(REQUEST_ID_HEADER)
                    .and_then(|value| value.to_str().ok())
                    .unwrap_or("-");

                tracing::info_span!(
                    "http_request",
                    request_id = %request_id,
                    method = %request.method(),
                    uri = %request.uri(),
                    version = ?request.version(),
                )
            },
        ))
        .layer(from_fn(request_id_middleware))
        .layer(from_fn(security_headers_middleware))
}

/// Application container for managing server lifecycle.
pub struct Application {
    port: u16,
    listener: TcpListener,
    state: AppState,
}

impl Application {
    /// Build the application with the given configuration.
    pub async fn build(config: ChatConfig) -> Result<Self, AppError> {
        let text_provider = build_provider(&config.generation).map_err(|e| {
            tracing::error!("Failed to initialize text provider: {}", e);
            AppError::ConfigError(anyhow::anyhow!("Failed to initialize text provider: {}", e))
        })?;

        Self::build_with_provider(config, text_provider).await
    }

    /// Build the application around an already constructed provider.
    pub async fn build_with_provider(
        config: ChatConfig,
        text_provider: Arc<dyn TextProvider>,
    ) -> Result<Self, AppError> {
        let db = ConversationDb::connect(
            &config.database.url,
            config.database.max_connections,
            config.database.min_connections,
        )
        .await
        .map_err(|e| {
            tracing::error!("Failed to connect to database: {}", e);
            e
        })?;

        db.run_migrations().await.map_err(|e| {
            tracing::error!("Failed to run database migrations: {}", e);
            e
        })?;

        tracing::info!(
            backend = text_provider.name(),
            "Text generation backend selected"
        );

        let rate_limiters = RateLimiters::new(config.rate_limit.trust_forwarded_for);

        // Bind HTTP listener (port 0 = random port for testing)
        let addr = SocketAddr::from(([0, 0, 0, 0], config.common.port));
        let listener = TcpListener::bind(addr).await.map_err(|e| {
            tracing::error!("Failed to bind HTTP listener to {}: {}", addr, e);
            AppError::from(e)
        })?;
        let port = listener.local_addr()?.port();

        tracing::info!("Chat service: HTTP on port {}", port);

        Ok(Self {
            port,
            listener,
            state: AppState {
                config,
                db,
                text_provider,
                rate_limiters,
            },
        })
    }

    /// Get the HTTP port the server is listening on.
    pub fn port(&self) -> u16 {
        self.port
    }

    /// Get the shared application state.
    pub fn state(&self) -> &AppState {
        &self.state
    }

    /// Run the application until stopped.
    pub async fn run_until_stopped(self) -> std::io::Result<()> {
        let rate_limiters = self.state.rate_limiters.clone();
        let pruner = tokio::spawn(async move {
            let mut interval = tokio::time::interval(RATE_LIMIT_PRUNE_INTERVAL);
            loop {
                interval.tick().await;
                rate_limiters.retain_recent();
            }
        });

        let db = self.state.db.clone();
        let app = router(self.state);
        let result = axum::serve(
            self.listener,
            app.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .await;

        pruner.abort();
        db.close().await;

        result.map_err(|e| {
            tracing::error!("HTTP server error: {}", e);
            std::io::Error::other(format!("HTTP server error: {}", e))
        })
    }
}

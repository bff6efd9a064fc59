use axum::{extract::State, Json};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::{ConversationTurn, NewConversationTurn, DEFAULT_SESSION_ID};
use crate::services::metrics::{CHAT_REQUESTS_TOTAL, GENERATION_DURATION};
use crate::services::{ProviderError, TextProvider};
use crate::startup::AppState;
use service_core::error::AppError;

#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    pub user_message: String,
    /// Missing and `null` both fall back to the default session.
    #[serde(default)]
    pub session_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatResponse {
    pub session_id: String,
    pub user_message: String,
    pub bot_response: String,
    pub timestamp: DateTime<Utc>,
}

impl From<ConversationTurn> for ChatResponse {
    fn from(turn: ConversationTurn) -> Self {
        Self {
            session_id: turn.session_id,
            user_message: turn.user_message,
            bot_response: turn.bot_response,
            timestamp: turn.timestamp,
        }
    }
}

#[tracing::instrument(skip(state, request), fields(session_id))]
pub async fn chat(
    State(state): State<AppState>,
    Json(request): Json<ChatRequest>,
) -> Result<Json<ChatResponse>, AppError> {
    let session_id = request
        .session_id
        .unwrap_or_else(|| DEFAULT_SESSION_ID.to_string());
    tracing::Span::current().record("session_id", session_id.as_str());

    let provider = state.text_provider.as_ref();
    let timer = GENERATION_DURATION
        .with_label_values(&[provider.name()])
        .start_timer();

    let bot_response = match provider.generate(&request.user_message).await {
        Ok(text) => {
            timer.observe_duration();
            text
        }
        Err(e) => {
            timer.stop_and_discard();
            CHAT_REQUESTS_TOTAL
                .with_label_values(&["upstream_error"])
                .inc();
            tracing::error!(
                backend = provider.name(),
                error = %e,
                "Text generation failed"
            );
            return Err(upstream_error(provider, &e));
        }
    };

    let turn = NewConversationTurn::now(session_id, request.user_message, bot_response);

    let stored = state.db.insert_turn(&turn).await.map_err(|e| {
        CHAT_REQUESTS_TOTAL.with_label_values(&["db_error"]).inc();
        e
    })?;

    CHAT_REQUESTS_TOTAL.with_label_values(&["ok"]).inc();

    tracing::info!(
        turn_id = stored.id,
        backend = provider.name(),
        response_len = stored.bot_response.len(),
        "Chat turn completed"
    );

    Ok(Json(ChatResponse::from(stored)))
}

fn upstream_error(provider: &dyn TextProvider, err: &ProviderError) -> AppError {
    let prefix = match provider.name() {
        "ollama" => "Ollama API error",
        _ => "LLM error",
    };
    AppError::UpstreamError(format!("{}: {}", prefix, err))
}

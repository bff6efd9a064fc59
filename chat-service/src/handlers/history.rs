use axum::{
    extract::{Path, State},
    Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::ConversationTurn;
use crate::services::metrics::HISTORY_REQUESTS_TOTAL;
use crate::startup::AppState;
use service_core::error::AppError;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub user_message: String,
    pub bot_response: String,
    pub timestamp: DateTime<Utc>,
}

impl From<ConversationTurn> for HistoryEntry {
    fn from(turn: ConversationTurn) -> Self {
        Self {
            user_message: turn.user_message,
            bot_response: turn.bot_response,
            timestamp: turn.timestamp,
        }
    }
}

#[tracing::instrument(skip(state))]
pub async fn get_history(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> Result<Json<Vec<HistoryEntry>>, AppError> {
    let turns = state.db.list_turns(&session_id).await.map_err(|e| {
        HISTORY_REQUESTS_TOTAL.with_label_values(&["db_error"]).inc();
        e
    })?;

    if turns.is_empty() {
        HISTORY_REQUESTS_TOTAL.with_label_values(&["not_found"]).inc();
        return Err(AppError::NotFound(anyhow::anyhow!(
            "No conversation history found."
        )));
    }

    HISTORY_REQUESTS_TOTAL.with_label_values(&["ok"]).inc();

    Ok(Json(turns.into_iter().map(HistoryEntry::from).collect()))
}

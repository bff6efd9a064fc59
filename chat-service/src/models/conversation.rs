//! Conversation turn model.

use chrono::{DateTime, SubsecRound, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Session used when the caller does not supply one.
pub const DEFAULT_SESSION_ID: &str = "default";

/// One persisted user-message/bot-response pair.
///
/// Rows are append-only: never updated, never deleted.
#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize, Deserialize)]
pub struct ConversationTurn {
    /// Surrogate key; defines insertion order within a session.
    pub id: i64,
    pub session_id: String,
    pub user_message: String,
    pub bot_response: String,
    pub timestamp: DateTime<Utc>,
}

/// Input for persisting a turn.
#[derive(Debug, Clone)]
pub struct NewConversationTurn {
    pub session_id: String,
    pub user_message: String,
    pub bot_response: String,
    pub timestamp: DateTime<Utc>,
}

impl NewConversationTurn {
    /// Stamp a turn with the current UTC time.
    ///
    /// Truncated to microseconds so the value survives a storage round trip unchanged.
    pub fn now(session_id: String, user_message: String, bot_response: String) -> Self {
        Self {
            session_id,
            user_message,
            bot_response,
            timestamp: Utc::now().trunc_subsecs(6),
        }
    }
}

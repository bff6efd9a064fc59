//! Domain models for chat-service.

pub mod conversation;

pub use conversation::{ConversationTurn, NewConversationTurn, DEFAULT_SESSION_ID};

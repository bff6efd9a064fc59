//! HTTP handlers for chat-service.

pub mod chat;
pub mod health;
pub mod history;
pub mod metrics;

pub use chat::chat;
pub use health::{health_check, readiness_check};
pub use history::get_history;
pub use metrics::metrics;

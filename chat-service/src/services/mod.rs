pub mod database;
pub mod metrics;
pub mod providers;

pub use database::ConversationDb;
pub use metrics::init_metrics;
pub use providers::{ProviderError, TextProvider};

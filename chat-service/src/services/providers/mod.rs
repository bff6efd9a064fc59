//! Text-generation provider abstractions and implementations.
//!
//! `/chat` only needs "produce a response string for an input string".
//! The concrete backend (remote Ollama endpoint or in-process model) is
//! chosen once at startup from configuration.

pub mod local;
pub mod mock;
pub mod ollama;

use crate::config::{GenerationBackend, GenerationConfig};
use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;

pub use local::LocalTextProvider;
pub use mock::MockTextProvider;
pub use ollama::OllamaTextProvider;

/// Error type for provider operations.
#[derive(Error, Debug)]
pub enum ProviderError {
    #[error("Provider not configured: {0}")]
    NotConfigured(String),

    #[error("API error: {0}")]
    ApiError(String),

    #[error("Network error: {0}")]
    NetworkError(String),

    #[error("Model error: {0}")]
    ModelError(String),
}

/// Trait for text generation backends.
#[async_trait]
pub trait TextProvider: Send + Sync {
    /// Short backend label used in logs and metrics.
    fn name(&self) -> &'static str;

    /// Generate a response for `prompt`.
    async fn generate(&self, prompt: &str) -> Result<String, ProviderError>;
}

/// Build the provider selected by `config.backend`.
pub fn build_provider(config: &GenerationConfig) -> Result<Arc<dyn TextProvider>, ProviderError> {
    match config.backend {
        GenerationBackend::Ollama => {
            let provider = OllamaTextProvider::new(ollama::OllamaConfig {
                api_url: config.ollama_api_url.clone(),
                model: config.ollama_model.clone(),
                max_tokens: config.max_tokens,
                timeout_secs: config.timeout_secs,
            })?;
            tracing::info!(
                api_url = %config.ollama_api_url,
                model = ?config.ollama_model,
                "Initialized Ollama text provider"
            );
            Ok(Arc::new(provider))
        }
        GenerationBackend::Local => {
            let provider = match &config.local_corpus_path {
                Some(path) => {
                    let corpus = std::fs::read_to_string(path).map_err(|e| {
                        ProviderError::NotConfigured(format!(
                            "Failed to read local model corpus {}: {}",
                            path, e
                        ))
                    })?;
                    LocalTextProvider::from_corpus(&corpus, config.max_tokens)
                }
                None => LocalTextProvider::with_default_corpus(config.max_tokens),
            };
            tracing::info!(
                corpus = config.local_corpus_path.as_deref().unwrap_or("built-in"),
                vocabulary = provider.vocabulary_size(),
                max_tokens = config.max_tokens,
                "Initialized local text provider"
            );
            Ok(Arc::new(provider))
        }
    }
}

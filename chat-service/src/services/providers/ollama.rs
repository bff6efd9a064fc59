//! Remote text generation over an Ollama-compatible HTTP API.

use super::{ProviderError, TextProvider};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Ollama provider configuration.
#[derive(Debug, Clone)]
pub struct OllamaConfig {
    /// Full generate endpoint, e.g. `http://localhost:11434/api/generate`.
    pub api_url: String,
    pub model: Option<String>,
    pub max_tokens: u32,
    pub timeout_secs: u64,
}

/// Ollama text provider.
pub struct OllamaTextProvider {
    config: OllamaConfig,
    client: Client,
}

impl OllamaTextProvider {
    pub fn new(config: OllamaConfig) -> Result<Self, ProviderError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| {
                ProviderError::NotConfigured(format!("Failed to create HTTP client: {}", e))
            })?;

        Ok(Self { config, client })
    }
}

#[async_trait]
impl TextProvider for OllamaTextProvider {
    fn name(&self) -> &'static str {
        "ollama"
    }

    async fn generate(&self, prompt: &str) -> Result<String, ProviderError> {
        let request = GenerateRequest {
            prompt,
            max_tokens: self.config.max_tokens,
            stream: false,
            model: self.config.model.as_deref(),
        };

        tracing::debug!(
            api_url = %self.config.api_url,
            prompt_len = prompt.len(),
            "Sending request to Ollama API"
        );

        let response = self
            .client
            .post(&self.config.api_url)
            .json(&request)
            .send()
            .await
            .map_err(|e| ProviderError::NetworkError(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();

            return Err(ProviderError::ApiError(format!(
                "status {}: {}",
                status, error_text
            )));
        }

        let api_response: GenerateResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::ApiError(format!("Failed to parse response: {}", e)))?;

        Ok(api_response.into_text())
    }
}

#[derive(Debug, Serialize)]
struct GenerateRequest<'a> {
    prompt: &'a str,
    max_tokens: u32,
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    model: Option<&'a str>,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    generated_text: Option<String>,
    /// Field name used by stock Ollama servers.
    #[serde(default)]
    response: Option<String>,
}

impl GenerateResponse {
    /// `generated_text` wins over `response`; a body with neither yields "".
    fn into_text(self) -> String {
        self.generated_text.or(self.response).unwrap_or_default()
    }
}

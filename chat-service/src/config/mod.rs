use secrecy::SecretString;
use service_core::config as core_config;
use service_core::error::AppError;
use std::env;

/// Default credential when `API_KEY` is unset outside production.
const DEFAULT_API_KEY: &str = "secret-api-key";

const DEFAULT_OLLAMA_API_URL: &str = "http://localhost:11434/api/generate";

const DEFAULT_DATABASE_URL: &str = "sqlite://chatbot.db";

/// Token budget shared by both generation backends.
const DEFAULT_MAX_TOKENS: u32 = 100;

const DEFAULT_GENERATION_TIMEOUT_SECS: u64 = 120;

#[derive(Debug, Clone)]
pub struct ChatConfig {
    pub common: core_config::Config,
    pub service_name: String,
    pub service_version: String,
    pub log_level: String,
    pub otlp_endpoint: Option<String>,
    pub auth: AuthConfig,
    pub generation: GenerationConfig,
    pub database: DatabaseConfig,
    pub rate_limit: RateLimitConfig,
}

#[derive(Clone)]
pub struct AuthConfig {
    pub api_key: SecretString,
}

impl std::fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthConfig")
            .field("api_key", &"[REDACTED]")
            .finish()
    }
}

/// Which text-generation collaborator serves `/chat`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GenerationBackend {
    /// Remote Ollama-compatible HTTP endpoint.
    Ollama,
    /// In-process language model.
    Local,
}

impl GenerationBackend {
    /// `USE_OLLAMA=true` (any case) selects the remote backend; anything else is local.
    pub fn from_flag(flag: &str) -> Self {
        if flag.trim().eq_ignore_ascii_case("true") {
            GenerationBackend::Ollama
        } else {
            GenerationBackend::Local
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            GenerationBackend::Ollama => "ollama",
            GenerationBackend::Local => "local",
        }
    }
}

#[derive(Debug, Clone)]
pub struct GenerationConfig {
    pub backend: GenerationBackend,
    pub ollama_api_url: String,
    pub ollama_model: Option<String>,
    pub max_tokens: u32,
    pub timeout_secs: u64,
    /// Text file used to train the in-process model; the built-in corpus when unset.
    pub local_corpus_path: Option<String>,
}

#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub min_connections: u32,
}

#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    /// Key limits on the first `X-Forwarded-For` hop instead of the peer address.
    pub trust_forwarded_for: bool,
}

impl ChatConfig {
    pub fn load() -> Result<Self, AppError> {
        let common = core_config::Config::load()?;
        let is_prod = env::var("ENVIRONMENT").unwrap_or_else(|_| "dev".to_string()) == "prod";

        Ok(Self {
            common,
            service_name: env::var("SERVICE_NAME").unwrap_or_else(|_| "chat-service".to_string()),
            service_version: env::var("SERVICE_VERSION")
                .unwrap_or_else(|_| env!("CARGO_PKG_VERSION").to_string()),
            log_level: env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            otlp_endpoint: env::var("OTLP_ENDPOINT").ok().filter(|s| !s.is_empty()),
            auth: AuthConfig {
                api_key: SecretString::new(get_env("API_KEY", Some(DEFAULT_API_KEY), is_prod)?),
            },
            generation: GenerationConfig {
                backend: GenerationBackend::from_flag(
                    &env::var("USE_OLLAMA").unwrap_or_else(|_| "false".to_string()),
                ),
                ollama_api_url: get_env("OLLAMA_API_URL", Some(DEFAULT_OLLAMA_API_URL), false)?,
                ollama_model: env::var("OLLAMA_MODEL").ok().filter(|s| !s.is_empty()),
                max_tokens: parse_env("GENERATION_MAX_TOKENS", DEFAULT_MAX_TOKENS),
                timeout_secs: parse_env(
                    "GENERATION_TIMEOUT_SECS",
                    DEFAULT_GENERATION_TIMEOUT_SECS,
                ),
                local_corpus_path: env::var("LOCAL_MODEL_CORPUS").ok().filter(|s| !s.is_empty()),
            },
            database: DatabaseConfig {
                url: get_env("DATABASE_URL", Some(DEFAULT_DATABASE_URL), is_prod)?,
                max_connections: parse_env("DATABASE_MAX_CONNECTIONS", 5),
                min_connections: parse_env("DATABASE_MIN_CONNECTIONS", 1),
            },
            rate_limit: RateLimitConfig {
                trust_forwarded_for: env::var("RATE_LIMIT_TRUST_FORWARDED_FOR")
                    .map(|v| v.eq_ignore_ascii_case("true"))
                    .unwrap_or(false),
            },
        })
    }
}

fn parse_env<T: std::str::FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(default)
}

fn get_env(key: &str, default: Option<&str>, is_prod: bool) -> Result<String, AppError> {
    match env::var(key) {
        Ok(val) => Ok(val),
        Err(_) => {
            if is_prod {
                Err(AppError::ConfigError(anyhow::anyhow!(
                    "{} is required in production but not set",
                    key
                )))
            } else if let Some(def) = default {
                Ok(def.to_string())
            } else {
                Err(AppError::ConfigError(anyhow::anyhow!(
                    "{} is required but not set",
                    key
                )))
            }
        }
    }
}

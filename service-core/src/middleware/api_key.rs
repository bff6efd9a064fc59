use crate::error::AppError;
use crate::utils::secrets_match;
use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use secrecy::{ExposeSecret, SecretString};
use std::sync::Arc;

/// Header carrying the shared API key.
pub const API_KEY_HEADER: &str = "x-api-key";

/// Shared-secret gate: every request must present the configured key.
#[derive(Clone)]
pub struct ApiKeyGate {
    secret: Arc<SecretString>,
}

impl ApiKeyGate {
    pub fn new(secret: SecretString) -> Self {
        Self {
            secret: Arc::new(secret),
        }
    }

    /// A missing key is rejected the same way as a wrong one.
    pub fn verify(&self, provided: Option<&str>) -> Result<(), AppError> {
        match provided {
            Some(key) if secrets_match(self.secret.expose_secret(), key) => Ok(()),
            _ => Err(AppError::Unauthorized(anyhow::anyhow!("Unauthorized"))),
        }
    }
}

impl std::fmt::Debug for ApiKeyGate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiKeyGate")
            .field("secret", &"[REDACTED]")
            .finish()
    }
}

/// Middleware rejecting requests without a valid `x-api-key` header.
pub async fn api_key_middleware(
    State(gate): State<ApiKeyGate>,
    request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let provided = request
        .headers()
        .get(API_KEY_HEADER)
        .and_then(|value| value.to_str().ok());

    if let Err(e) = gate.verify(provided) {
        tracing::warn!(
            path = %request.uri().path(),
            key_present = provided.is_some(),
            "Rejected request with invalid API key"
        );
        return Err(e);
    }

    Ok(next.run(request).await)
}

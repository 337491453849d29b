//! Generative AI client errors.

use thiserror::Error;

pub type GenAiResult<T> = Result<T, GenAiError>;

#[derive(Debug, Error)]
pub enum GenAiError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Authentication failed: {0}")]
    Auth(String),

    #[error("{service} returned {status}: {message}")]
    Api {
        service: &'static str,
        status: u16,
        message: String,
    },

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl GenAiError {
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    pub fn invalid_response(msg: impl Into<String>) -> Self {
        Self::InvalidResponse(msg.into())
    }

    /// Transient failures worth trying again (or on another model).
    pub fn is_retryable(&self) -> bool {
        match self {
            GenAiError::Network(_) => true,
            GenAiError::Api { status, .. } => *status == 429 || *status >= 500,
            _ => false,
        }
    }

    /// The upstream reported a missing operation.
    pub fn is_not_found(&self) -> bool {
        matches!(self, GenAiError::Api { status: 404, .. })
    }
}

//! Firestore error types.

use thiserror::Error;

/// Result type for Firestore operations.
pub type FirestoreResult<T> = Result<T, FirestoreError>;

/// Errors that can occur during Firestore operations.
#[derive(Debug, Error)]
pub enum FirestoreError {
    #[error("Authentication failed: {0}")]
    AuthError(String),

    #[error("Document not found: {0}")]
    NotFound(String),

    #[error("Document already exists: {0}")]
    AlreadyExists(String),

    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    #[error("Request failed: {0}")]
    RequestFailed(String),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Serialization error: {0}")]
    SerializationError(String),

    #[error("Rate limited, retry after {0}ms")]
    RateLimited(u64),

    #[error("Server error ({0}): {1}")]
    ServerError(u16, String),

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Precondition failed: {0}")]
    PreconditionFailed(String),
}

/// Default back-off for 429 responses without a usable Retry-After.
const DEFAULT_RATE_LIMIT_MS: u64 = 1000;

impl FirestoreError {
    pub fn auth_error(msg: impl Into<String>) -> Self {
        Self::AuthError(msg.into())
    }

    pub fn not_found(path: impl Into<String>) -> Self {
        Self::NotFound(path.into())
    }

    pub fn request_failed(msg: impl Into<String>) -> Self {
        Self::RequestFailed(msg.into())
    }

    pub fn serialization(msg: impl Into<String>) -> Self {
        Self::SerializationError(msg.into())
    }

    /// Map a non-success HTTP status to an error variant.
    pub fn from_http_status(status: u16, msg: impl Into<String>) -> Self {
        let msg = msg.into();
        match status {
            401 => Self::AuthError(msg),
            403 => Self::PermissionDenied(msg),
            404 => Self::NotFound(msg),
            409 => Self::AlreadyExists(msg),
            412 => Self::PreconditionFailed(msg),
            429 => Self::RateLimited(DEFAULT_RATE_LIMIT_MS),
            500..=599 => Self::ServerError(status, msg),
            _ => Self::RequestFailed(msg),
        }
    }

    /// HTTP status this error corresponds to, for metrics.
    pub fn http_status(&self) -> Option<u16> {
        match self {
            Self::AuthError(_) => Some(401),
            Self::PermissionDenied(_) => Some(403),
            Self::NotFound(_) => Some(404),
            Self::AlreadyExists(_) => Some(409),
            Self::PreconditionFailed(_) => Some(412),
            Self::RateLimited(_) => Some(429),
            Self::ServerError(status, _) => Some(*status),
            Self::RequestFailed(_) => Some(400),
            Self::Network(e) => e.status().map(|s| s.as_u16()),
            Self::InvalidResponse(_) | Self::SerializationError(_) | Self::Json(_) => None,
        }
    }

    /// Server-requested delay before retrying, if any.
    pub fn retry_after_ms(&self) -> Option<u64> {
        match self {
            Self::RateLimited(ms) => Some(*ms),
            _ => None,
        }
    }

    /// Check if error is retryable.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            FirestoreError::Network(_) | FirestoreError::RateLimited(_) | FirestoreError::ServerError(..)
        )
    }

    /// True if the error was caused by a failed precondition (e.g., updateTime mismatch).
    pub fn is_precondition_failed(&self) -> bool {
        matches!(self, FirestoreError::PreconditionFailed(_))
            || matches!(
                self,
                FirestoreError::RequestFailed(msg)
                if msg.contains("FAILED_PRECONDITION") || msg.contains("Precondition")
            )
    }
}

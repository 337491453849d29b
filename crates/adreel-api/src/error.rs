//! API error types.
//!
//! Every failure leaves a handler as an [`ApiError`], which renders the
//! standard error envelope with a message localized for the request.

use std::fmt;

use axum::http::{HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use chrono::Utc;
use serde::Serialize;
use thiserror::Error;
use tracing::{error, warn};

use adreel_firestore::FirestoreError;
use adreel_genai::GenAiError;
use adreel_models::{EndpointClass, RateLimitResult, SessionError, TransitionError};

use crate::messages::{current_locale, user_message};

pub type ApiResult<T> = Result<T, ApiError>;

/// Machine-readable error codes returned in `error.code`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    ValidationError,
    InvalidJobId,
    JobNotFound,
    JobExpired,
    CannotCancel,
    CancellationFailed,
    BudgetExceeded,
    RateLimitExceeded,
    VeoApiError,
    AiApiError,
    SessionNotFound,
    SessionExpired,
    SessionError,
    FileTooLarge,
    UnsupportedFormat,
    HandoffIncomplete,
    HandoffOutOfOrder,
    Unauthorized,
    NotFound,
    InternalServerError,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::ValidationError => "VALIDATION_ERROR",
            ErrorCode::InvalidJobId => "INVALID_JOB_ID",
            ErrorCode::JobNotFound => "JOB_NOT_FOUND",
            ErrorCode::JobExpired => "JOB_EXPIRED",
            ErrorCode::CannotCancel => "CANNOT_CANCEL",
            ErrorCode::CancellationFailed => "CANCELLATION_FAILED",
            ErrorCode::BudgetExceeded => "BUDGET_EXCEEDED",
            ErrorCode::RateLimitExceeded => "RATE_LIMIT_EXCEEDED",
            ErrorCode::VeoApiError => "VEO_API_ERROR",
            ErrorCode::AiApiError => "AI_API_ERROR",
            ErrorCode::SessionNotFound => "SESSION_NOT_FOUND",
            ErrorCode::SessionExpired => "SESSION_EXPIRED",
            ErrorCode::SessionError => "SESSION_ERROR",
            ErrorCode::FileTooLarge => "FILE_TOO_LARGE",
            ErrorCode::UnsupportedFormat => "UNSUPPORTED_FORMAT",
            ErrorCode::HandoffIncomplete => "HANDOFF_INCOMPLETE",
            ErrorCode::HandoffOutOfOrder => "HANDOFF_OUT_OF_ORDER",
            ErrorCode::Unauthorized => "UNAUTHORIZED",
            ErrorCode::NotFound => "NOT_FOUND",
            ErrorCode::InternalServerError => "INTERNAL_SERVER_ERROR",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            ErrorCode::ValidationError | ErrorCode::InvalidJobId | ErrorCode::UnsupportedFormat => {
                StatusCode::BAD_REQUEST
            }
            ErrorCode::Unauthorized => StatusCode::UNAUTHORIZED,
            ErrorCode::BudgetExceeded => StatusCode::PAYMENT_REQUIRED,
            ErrorCode::JobNotFound | ErrorCode::SessionNotFound | ErrorCode::NotFound => StatusCode::NOT_FOUND,
            ErrorCode::CannotCancel | ErrorCode::SessionError | ErrorCode::HandoffOutOfOrder => {
                StatusCode::CONFLICT
            }
            ErrorCode::JobExpired | ErrorCode::SessionExpired => StatusCode::GONE,
            ErrorCode::FileTooLarge => StatusCode::PAYLOAD_TOO_LARGE,
            ErrorCode::HandoffIncomplete => StatusCode::UNPROCESSABLE_ENTITY,
            ErrorCode::RateLimitExceeded => StatusCode::TOO_MANY_REQUESTS,
            ErrorCode::VeoApiError | ErrorCode::AiApiError => StatusCode::BAD_GATEWAY,
            ErrorCode::CancellationFailed | ErrorCode::InternalServerError => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{code}: {message}")]
    Coded { code: ErrorCode, message: String },

    #[error("Rate limit exceeded for {class}")]
    RateLimited {
        class: EndpointClass,
        result: RateLimitResult,
    },

    #[error("Firestore error: {0}")]
    Firestore(#[from] FirestoreError),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl ApiError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self::Coded {
            code,
            message: message.into(),
        }
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        Self::new(ErrorCode::ValidationError, msg)
    }

    pub fn unauthorized(msg: impl Into<String>) -> Self {
        Self::new(ErrorCode::Unauthorized, msg)
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::new(ErrorCode::NotFound, msg)
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Wrap a failed Veo call.
    pub fn veo(err: GenAiError) -> Self {
        Self::new(ErrorCode::VeoApiError, err.to_string())
    }

    /// Wrap a failed Gemini call.
    pub fn ai(err: GenAiError) -> Self {
        Self::new(ErrorCode::AiApiError, err.to_string())
    }

    pub fn code(&self) -> ErrorCode {
        match self {
            ApiError::Coded { code, .. } => *code,
            ApiError::RateLimited { .. } => ErrorCode::RateLimitExceeded,
            ApiError::Firestore(_) | ApiError::Internal(_) => ErrorCode::InternalServerError,
        }
    }

    fn status_code(&self) -> StatusCode {
        self.code().status()
    }

    fn is_internal(&self) -> bool {
        self.status_code().is_server_error() && !matches!(self.code(), ErrorCode::CancellationFailed)
    }
}

impl From<SessionError> for ApiError {
    fn from(err: SessionError) -> Self {
        match err {
            SessionError::NothingPending => Self::validation(err.to_string()),
            SessionError::InvalidTransition { .. } => Self::new(ErrorCode::SessionError, err.to_string()),
        }
    }
}

impl From<validator::ValidationErrors> for ApiError {
    fn from(err: validator::ValidationErrors) -> Self {
        Self::validation(err.to_string())
    }
}

impl From<TransitionError> for ApiError {
    fn from(err: TransitionError) -> Self {
        Self::internal(err.to_string())
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ErrorBody {
    code: ErrorCode,
    message: String,
    user_message: &'static str,
}

#[derive(Serialize)]
struct ErrorEnvelope {
    success: bool,
    error: ErrorBody,
    timestamp: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let code = self.code();

        if status.is_server_error() {
            error!(code = %code, "Request failed: {}", self);
        } else if status == StatusCode::CONFLICT || status == StatusCode::UNPROCESSABLE_ENTITY {
            warn!(code = %code, "Request rejected: {}", self);
        }

        // Don't expose internal error details in production
        let message = if self.is_internal()
            && std::env::var("ENVIRONMENT").unwrap_or_default() == "production"
        {
            "An internal error occurred".to_string()
        } else {
            match &self {
                ApiError::Coded { message, .. } => message.clone(),
                other => other.to_string(),
            }
        };

        let body = ErrorEnvelope {
            success: false,
            error: ErrorBody {
                code,
                message,
                user_message: user_message(code, current_locale()),
            },
            timestamp: Utc::now().to_rfc3339(),
        };

        let mut response = (status, Json(body)).into_response();

        if let ApiError::RateLimited { result, .. } = &self {
            let headers = response.headers_mut();
            let retry_after = result.retry_after_secs(Utc::now());
            headers.insert("Retry-After", HeaderValue::from(retry_after));
            headers.insert("X-RateLimit-Limit", HeaderValue::from(result.limit));
            headers.insert("X-RateLimit-Remaining", HeaderValue::from(result.remaining));
            headers.insert("X-RateLimit-Reset", HeaderValue::from(result.reset_time.timestamp()));
        }

        response
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes() {
        assert_eq!(ErrorCode::JobExpired.status(), StatusCode::GONE);
        assert_eq!(ErrorCode::BudgetExceeded.status(), StatusCode::PAYMENT_REQUIRED);
        assert_eq!(ErrorCode::HandoffIncomplete.status(), StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(ErrorCode::FileTooLarge.status(), StatusCode::PAYLOAD_TOO_LARGE);
        assert_eq!(
            ApiError::from(FirestoreError::request_failed("boom")).status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_session_errors_map_to_codes() {
        assert_eq!(ApiError::from(SessionError::NothingPending).code(), ErrorCode::ValidationError);
    }

    #[tokio::test]
    async fn test_error_envelope_shape() {
        let response = ApiError::new(ErrorCode::CannotCancel, "job already completed").into_response();
        assert_eq!(response.status(), StatusCode::CONFLICT);

        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let json: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(json["success"], false);
        assert_eq!(json["error"]["code"], "CANNOT_CANCEL");
        assert_eq!(json["error"]["message"], "job already completed");
        assert!(json["error"]["userMessage"].as_str().is_some());
    }
}

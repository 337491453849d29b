//! Request extractors that fail with the standard error envelope.

use axum::async_trait;
use axum::extract::{FromRequest, Request};
use axum::Json;
use serde::de::DeserializeOwned;
use validator::Validate;

use crate::error::ApiError;

/// JSON body that is deserialized and then checked with [`Validate`].
///
/// Malformed bodies and failed validation both surface as
/// `VALIDATION_ERROR` instead of axum's plain-text rejections.
#[derive(Debug, Clone, Copy, Default)]
pub struct ValidatedJson<T>(pub T);

#[async_trait]
impl<S, T> FromRequest<S> for ValidatedJson<T>
where
    T: DeserializeOwned + Validate,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let Json(value) = Json::<T>::from_request(req, state)
            .await
            .map_err(|rejection| ApiError::validation(rejection.body_text()))?;
        value.validate()?;
        Ok(Self(value))
    }
}

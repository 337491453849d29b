//! Product intelligence intake: image upload and text analysis.
//!
//! Both routes create a `draft` session and return immediately; the analysis
//! runs in the background and moves the session to `completed` or `failed`.

use axum::extract::{Multipart, State};
use serde::{Deserialize, Serialize};
use tracing::info;
use validator::Validate;

use adreel_genai::ProductInput;
use adreel_models::{Locale, SessionStatus};

use crate::error::{ApiError, ApiResult, ErrorCode};
use crate::extract::ValidatedJson;
use crate::messages::current_locale;
use crate::response::{ok, ApiJson};
use crate::security::{sanitize_string, sniff_image_mime, MAX_DESCRIPTION_LENGTH};
use crate::state::AppState;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IntakeResponse {
    pub session_id: String,
    pub processing_status: SessionStatus,
}

fn multipart_error(e: axum::extract::multipart::MultipartError) -> ApiError {
    ApiError::validation(format!("invalid multipart body: {}", e.body_text()))
}

/// Accept a product image (`image`, optional `description` and `locale`).
pub async fn upload_product_image(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> ApiResult<ApiJson<IntakeResponse>> {
    let max_bytes = state.config.max_upload_bytes;
    let mut image: Option<Vec<u8>> = None;
    let mut description: Option<String> = None;
    let mut locale = current_locale();

    while let Some(mut field) = multipart.next_field().await.map_err(multipart_error)? {
        match field.name().unwrap_or_default() {
            "image" => {
                let mut bytes = Vec::new();
                while let Some(chunk) = field.chunk().await.map_err(multipart_error)? {
                    if bytes.len() + chunk.len() > max_bytes {
                        return Err(ApiError::new(
                            ErrorCode::FileTooLarge,
                            format!("image exceeds {} bytes", max_bytes),
                        ));
                    }
                    bytes.extend_from_slice(&chunk);
                }
                image = Some(bytes);
            }
            "description" => {
                let text = field.text().await.map_err(multipart_error)?;
                let text = sanitize_string(&text, MAX_DESCRIPTION_LENGTH);
                if !text.is_empty() {
                    description = Some(text);
                }
            }
            "locale" => {
                let tag = field.text().await.map_err(multipart_error)?;
                if let Some(l) = Locale::from_tag(&tag) {
                    locale = l;
                }
            }
            _ => continue,
        }
    }

    let bytes = image
        .filter(|b| !b.is_empty())
        .ok_or_else(|| ApiError::validation("image field is required"))?;
    let mime_type = sniff_image_mime(&bytes).ok_or_else(|| {
        ApiError::new(ErrorCode::UnsupportedFormat, "only JPEG, PNG and WebP images are supported")
    })?;

    // Analysis is billed, so refuse before any session exists
    state.budget.ensure_can_proceed().await?;
    let session = state
        .sessions
        .create_session(description.clone().unwrap_or_default(), locale)
        .await?;
    info!(
        session_id = %session.id,
        size = bytes.len(),
        mime_type,
        "Product image uploaded"
    );

    let input = ProductInput::Image {
        bytes,
        mime_type: mime_type.to_string(),
        description,
    };
    let sessions = state.sessions.clone();
    let session_id = session.id.clone();
    tokio::spawn(async move { sessions.run_analysis(session_id, input).await });

    Ok(ok(IntakeResponse {
        session_id: session.id,
        processing_status: session.status,
    }))
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct AnalyzeTextRequest {
    #[validate(length(min = 1, max = 5000))]
    pub description: String,
    pub locale: Option<Locale>,
}

/// Analyze a product from a text description.
pub async fn analyze_product_text(
    State(state): State<AppState>,
    ValidatedJson(request): ValidatedJson<AnalyzeTextRequest>,
) -> ApiResult<ApiJson<IntakeResponse>> {
    let description = sanitize_string(&request.description, MAX_DESCRIPTION_LENGTH);
    if description.is_empty() {
        return Err(ApiError::validation("description must not be blank"));
    }
    let locale = request.locale.unwrap_or_else(current_locale);

    state.budget.ensure_can_proceed().await?;
    let session = state.sessions.create_session(description.clone(), locale).await?;
    info!(session_id = %session.id, "Product text submitted for analysis");

    let sessions = state.sessions.clone();
    let session_id = session.id.clone();
    tokio::spawn(async move {
        sessions
            .run_analysis(session_id, ProductInput::Text(description))
            .await
    });

    Ok(ok(IntakeResponse {
        session_id: session.id,
        processing_status: session.status,
    }))
}

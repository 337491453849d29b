//! Video generation submission.

use axum::extract::State;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use validator::Validate;

use adreel_genai::VideoRequest;
use adreel_models::{estimate_video_cost, AgentRole, AspectRatio, JobId, JobStatus, ServiceKind};

use crate::error::{ApiError, ApiResult};
use crate::extract::ValidatedJson;
use crate::messages::current_locale;
use crate::response::{ok, ApiJson};
use crate::security::{is_valid_session_id, sanitize_string, MAX_PROMPT_LENGTH};
use crate::state::AppState;

const DEFAULT_DURATION_SECS: u32 = 15;

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct GenerateVideoRequest {
    #[validate(length(min = 1, max = 2000))]
    pub prompt: String,
    /// Seconds of video, defaults to 15
    #[validate(range(min = 5, max = 60))]
    pub duration: Option<u32>,
    #[serde(default)]
    pub aspect_ratio: Option<AspectRatio>,
    pub session_id: Option<String>,
    /// Gate the submission on a passed handoff into the producer stage
    pub handoff_id: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateVideoResponse {
    pub job_id: JobId,
    pub session_id: String,
    pub status: JobStatus,
    pub estimated_cost: f64,
    pub operation_name: String,
}

/// Submit a video generation.
///
/// A session is created when the request does not name one; if the
/// submission then fails, that session is marked failed.
pub async fn generate_video(
    State(state): State<AppState>,
    ValidatedJson(request): ValidatedJson<GenerateVideoRequest>,
) -> ApiResult<ApiJson<GenerateVideoResponse>> {
    let prompt = sanitize_string(&request.prompt, MAX_PROMPT_LENGTH);
    if prompt.is_empty() {
        return Err(ApiError::validation("prompt must not be blank"));
    }
    let duration_secs = request.duration.unwrap_or(DEFAULT_DURATION_SECS);
    let aspect_ratio = request.aspect_ratio.unwrap_or_default();

    let mut session_id = request.session_id.clone();
    if let Some(ref handoff_id) = request.handoff_id {
        let handoff = state.handoffs.get(handoff_id).await?;
        if session_id.as_deref().is_some_and(|s| s != handoff.session_id) {
            return Err(ApiError::validation("handoffId belongs to a different session"));
        }
        state
            .handoffs
            .ensure_stage_ready(&handoff.session_id, AgentRole::VideoProducer)
            .await?;
        session_id = Some(handoff.session_id);
    }

    state.budget.ensure_can_proceed().await?;

    let (session, created) = match session_id {
        Some(id) => {
            if !is_valid_session_id(&id) {
                return Err(ApiError::validation("invalid sessionId format"));
            }
            (state.sessions.get(&id).await?, false)
        }
        None => (state.sessions.create_session(prompt.clone(), current_locale()).await?, true),
    };

    let estimate = estimate_video_cost(duration_secs, aspect_ratio);
    let video_request = VideoRequest {
        prompt: prompt.clone(),
        duration_secs,
        aspect_ratio,
    };

    let operation_name = match state.video.submit(&video_request).await {
        Ok(name) => name,
        Err(e) => {
            warn!(session_id = %session.id, "Video submission failed: {}", e);
            if created {
                state
                    .sessions
                    .mark_failed(&session.id, &format!("video submission failed: {}", e))
                    .await;
            }
            return Err(ApiError::veo(e));
        }
    };

    state
        .budget
        .record_cost(
            ServiceKind::Veo,
            estimate.total,
            estimate.to_description(),
            Some(session.id.clone()),
        )
        .await;

    let job_id = state
        .tracker
        .create_job(
            &session.id,
            &prompt,
            &operation_name,
            estimate.total,
            duration_secs,
            aspect_ratio,
        )
        .await?;

    info!(
        job_id = %job_id,
        session_id = %session.id,
        duration_secs,
        aspect_ratio = aspect_ratio.as_str(),
        "Video generation submitted"
    );

    Ok(ok(GenerateVideoResponse {
        job_id,
        session_id: session.id,
        status: JobStatus::Pending,
        estimated_cost: estimate.total,
        operation_name,
    }))
}

//! Agent handoff routes.

use axum::extract::State;
use serde::Deserialize;
use validator::Validate;

use adreel_models::{AgentRole, HandoffContext, HandoffPayload, HandoffValidationResult};

use crate::error::{ApiError, ApiResult};
use crate::extract::ValidatedJson;
use crate::response::{ok, ApiJson};
use crate::state::AppState;

fn parse_agent(field: &str, value: &str) -> ApiResult<AgentRole> {
    value
        .parse()
        .map_err(|e: String| ApiError::validation(format!("{}: {}", field, e)))
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreateHandoffRequest {
    #[validate(length(min = 8, max = 64))]
    pub session_id: String,
    /// Agent slug or persona name
    pub source_agent: String,
    #[serde(default)]
    pub payload: HandoffContext,
    /// Finished job delivered by the producer stage
    pub job_id: Option<String>,
}

/// Record the handoff out of `sourceAgent`.
pub async fn create_handoff(
    State(state): State<AppState>,
    ValidatedJson(request): ValidatedJson<CreateHandoffRequest>,
) -> ApiResult<ApiJson<HandoffPayload>> {
    let source = parse_agent("sourceAgent", &request.source_agent)?;
    let handoff = state
        .handoffs
        .prepare_handoff(
            &request.session_id,
            source,
            request.payload,
            request.job_id.as_deref(),
        )
        .await?;
    Ok(ok(handoff))
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct ValidateHandoffRequest {
    pub source_agent: String,
    pub target_agent: String,
    #[serde(default)]
    pub payload: HandoffContext,
}

/// Dry-run validation; nothing is persisted.
pub async fn validate_handoff(
    State(state): State<AppState>,
    ValidatedJson(request): ValidatedJson<ValidateHandoffRequest>,
) -> ApiResult<ApiJson<HandoffValidationResult>> {
    let source = parse_agent("sourceAgent", &request.source_agent)?;
    let target = parse_agent("targetAgent", &request.target_agent)?;
    Ok(ok(state.handoffs.validate(source, target, &request.payload)))
}

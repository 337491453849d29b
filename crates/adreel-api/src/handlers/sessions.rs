//! Session documents, creative strategy and handoff history.

use axum::extract::{Path, State};
use serde::Serialize;

use adreel_models::{HandoffPayload, Session, Strategy};

use crate::error::{ApiError, ApiResult, ErrorCode};
use crate::response::{ok, ApiJson};
use crate::security::is_valid_session_id;
use crate::state::AppState;

fn check_session_id(session_id: &str) -> ApiResult<()> {
    if !is_valid_session_id(session_id) {
        return Err(ApiError::new(ErrorCode::SessionNotFound, "invalid session ID format"));
    }
    Ok(())
}

pub async fn get_session(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> ApiResult<ApiJson<Session>> {
    check_session_id(&session_id)?;
    Ok(ok(state.sessions.get(&session_id).await?))
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StrategyResponse {
    pub strategy: Strategy,
    /// An unconfirmed strategy was replaced
    pub replaced_pending: bool,
}

/// Generate a strategy from the session's analysis and keep it pending.
pub async fn generate_strategy(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> ApiResult<ApiJson<StrategyResponse>> {
    check_session_id(&session_id)?;
    let (strategy, replaced_pending) = state.sessions.generate_strategy(&session_id).await?;
    Ok(ok(StrategyResponse {
        strategy,
        replaced_pending,
    }))
}

pub async fn confirm_strategy(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> ApiResult<ApiJson<Strategy>> {
    check_session_id(&session_id)?;
    Ok(ok(state.sessions.confirm_strategy(&session_id).await?))
}

pub async fn list_session_handoffs(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> ApiResult<ApiJson<Vec<HandoffPayload>>> {
    check_session_id(&session_id)?;
    Ok(ok(state.handoffs.history(&session_id).await?))
}

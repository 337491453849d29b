//! Admin handlers for monitoring and budget control.

use std::collections::HashMap;

use axum::async_trait;
use axum::extract::{FromRequestParts, State};
use axum::http::header::AUTHORIZATION;
use axum::http::request::Parts;
use serde::Serialize;
use tracing::{info, warn};

use adreel_models::{BudgetAlert, BudgetStatus, JobStatus};

use crate::error::{ApiError, ApiResult};
use crate::response::{ok, ApiJson};
use crate::state::AppState;

/// Caller presented `Authorization: Bearer <ADMIN_API_KEY>`.
///
/// Without a configured key every admin request is refused.
pub struct AdminAuth;

#[async_trait]
impl FromRequestParts<AppState> for AdminAuth {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let Some(expected) = state.config.admin_api_key.as_deref() else {
            warn!("Admin request refused: ADMIN_API_KEY is not configured");
            return Err(ApiError::unauthorized("admin access is not configured"));
        };

        let presented = parts
            .headers
            .get(AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("Bearer "))
            .map(str::trim);

        match presented {
            Some(token) if constant_time_eq(token.as_bytes(), expected.as_bytes()) => Ok(AdminAuth),
            Some(_) => {
                warn!("Admin request with invalid key");
                Err(ApiError::unauthorized("invalid admin key"))
            }
            None => Err(ApiError::unauthorized("missing bearer token")),
        }
    }
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    a.len() == b.len() && a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MonitoringResponse {
    pub budget: BudgetStatus,
    pub alerts: Vec<BudgetAlert>,
    pub jobs_by_status: HashMap<JobStatus, u64>,
    pub rate_limit_keys: usize,
    pub stream_subscribers: usize,
    pub uptime_secs: u64,
    pub environment: String,
}

/// Operational dashboard.
pub async fn get_monitoring(
    State(state): State<AppState>,
    _admin: AdminAuth,
) -> ApiResult<ApiJson<MonitoringResponse>> {
    let jobs_by_status = state.stores.jobs.count_jobs_by_status().await?;

    Ok(ok(MonitoringResponse {
        budget: state.budget.get_budget_status().await,
        alerts: state.budget.alerts().await,
        jobs_by_status,
        rate_limit_keys: state.rate_limiter.tracked_keys().await,
        stream_subscribers: state.events.subscriber_count(),
        uptime_secs: state.started_at.elapsed().as_secs(),
        environment: state.config.environment.clone(),
    }))
}

/// Zero the tracked spend and clear alerts. Ledger entries are kept; the
/// persisted reset marker excludes them from later hydration.
pub async fn reset_budget(
    State(state): State<AppState>,
    _admin: AdminAuth,
) -> ApiResult<ApiJson<BudgetStatus>> {
    let status = state.budget.reset().await?;
    info!("Budget reset by admin");
    Ok(ok(status))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_constant_time_eq() {
        assert!(constant_time_eq(b"secret", b"secret"));
        assert!(!constant_time_eq(b"secret", b"secreT"));
        assert!(!constant_time_eq(b"secret", b"secret1"));
    }
}

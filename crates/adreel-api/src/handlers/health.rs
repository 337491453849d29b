//! Health check handlers.

use std::time::Instant;

use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use chrono::Utc;
use serde::Serialize;

use crate::state::AppState;

/// Health response.
#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub timestamp: String,
    pub uptime_secs: u64,
}

/// Health check endpoint (liveness probe).
pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        timestamp: Utc::now().to_rfc3339(),
        uptime_secs: state.started_at.elapsed().as_secs(),
    })
}

#[derive(Serialize)]
pub struct ReadinessResponse {
    pub status: String,
    pub checks: ReadinessChecks,
}

#[derive(Serialize)]
pub struct ReadinessChecks {
    pub store: CheckStatus,
}

#[derive(Serialize)]
pub struct CheckStatus {
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latency_ms: Option<u64>,
}

impl CheckStatus {
    fn ok(latency_ms: u64) -> Self {
        Self {
            status: "ok".to_string(),
            error: None,
            latency_ms: Some(latency_ms),
        }
    }

    fn error(msg: impl Into<String>) -> Self {
        Self {
            status: "error".to_string(),
            error: Some(msg.into()),
            latency_ms: None,
        }
    }
}

/// Readiness check endpoint (readiness probe).
/// A read of a missing session proves the store is reachable.
pub async fn ready(
    State(state): State<AppState>,
) -> Result<Json<ReadinessResponse>, (StatusCode, Json<ReadinessResponse>)> {
    let start = Instant::now();
    let store = match state.stores.sessions.get_session("_readiness_probe").await {
        Ok(_) => CheckStatus::ok(start.elapsed().as_millis() as u64),
        Err(e) => CheckStatus::error(e.to_string()),
    };

    let ok = store.status == "ok";
    let response = ReadinessResponse {
        status: if ok { "ready" } else { "degraded" }.to_string(),
        checks: ReadinessChecks { store },
    };

    if ok {
        Ok(Json(response))
    } else {
        Err((StatusCode::SERVICE_UNAVAILABLE, Json(response)))
    }
}

//! Prometheus metrics for the API server.

use std::time::Instant;

use axum::body::Body;
use axum::http::{Request, Response};
use axum::middleware::Next;
use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};

use adreel_models::{EndpointClass, JobStatus, ValidationStatus};

/// Initialize the Prometheus metrics recorder.
/// Returns a handle that can be used to render metrics.
pub fn init_metrics() -> Result<PrometheusHandle, BuildError> {
    PrometheusBuilder::new().install_recorder()
}

/// Metric names as constants for consistency.
pub mod names {
    // HTTP metrics
    pub const HTTP_REQUESTS_TOTAL: &str = "adreel_http_requests_total";
    pub const HTTP_REQUEST_DURATION_SECONDS: &str = "adreel_http_request_duration_seconds";
    pub const HTTP_REQUESTS_IN_FLIGHT: &str = "adreel_http_requests_in_flight";

    // Job metrics
    pub const JOBS_SUBMITTED_TOTAL: &str = "adreel_jobs_submitted_total";
    pub const JOBS_FINISHED_TOTAL: &str = "adreel_jobs_finished_total";
    pub const JOBS_CANCELLED_TOTAL: &str = "adreel_jobs_cancelled_total";
    pub const REMOTE_POLL_FAILURES_TOTAL: &str = "adreel_remote_poll_failures_total";

    // Workflow metrics
    pub const HANDOFFS_TOTAL: &str = "adreel_handoffs_total";
    pub const SESSIONS_EXPIRED_TOTAL: &str = "adreel_sessions_expired_total";

    // Budget metrics
    pub const BUDGET_SPEND_USD: &str = "adreel_budget_spend_usd";
    pub const COSTS_RECORDED_TOTAL: &str = "adreel_costs_recorded_total";

    // Rate limiting metrics
    pub const RATE_LIMIT_HITS_TOTAL: &str = "adreel_rate_limit_hits_total";
}

/// Record an HTTP request.
pub fn record_http_request(method: &str, path: &str, status: u16, duration_secs: f64) {
    let labels = [
        ("method", method.to_string()),
        ("path", sanitize_path(path)),
        ("status", status.to_string()),
    ];

    counter!(names::HTTP_REQUESTS_TOTAL, &labels).increment(1);
    histogram!(names::HTTP_REQUEST_DURATION_SECONDS, &labels).record(duration_secs);
}

pub fn record_job_submitted(duration_secs: u32) {
    let labels = [("duration", duration_secs.to_string())];
    counter!(names::JOBS_SUBMITTED_TOTAL, &labels).increment(1);
}

/// Record a job reaching a terminal status through polling.
pub fn record_job_finished(status: JobStatus) {
    let labels = [("status", status.as_str().to_string())];
    counter!(names::JOBS_FINISHED_TOTAL, &labels).increment(1);
}

pub fn record_job_cancelled() {
    counter!(names::JOBS_CANCELLED_TOTAL).increment(1);
}

pub fn record_remote_poll_failure() {
    counter!(names::REMOTE_POLL_FAILURES_TOTAL).increment(1);
}

pub fn record_handoff(status: ValidationStatus) {
    let status = match status {
        ValidationStatus::Passed => "passed",
        ValidationStatus::Failed => "failed",
    };
    counter!(names::HANDOFFS_TOTAL, "status" => status).increment(1);
}

pub fn record_sessions_expired(count: usize) {
    counter!(names::SESSIONS_EXPIRED_TOTAL).increment(count as u64);
}

pub fn record_cost(service: &str, current_spend: f64) {
    let labels = [("service", service.to_string())];
    counter!(names::COSTS_RECORDED_TOTAL, &labels).increment(1);
    set_budget_spend(current_spend);
}

pub fn set_budget_spend(current_spend: f64) {
    gauge!(names::BUDGET_SPEND_USD).set(current_spend);
}

/// Record rate limit hit.
pub fn record_rate_limit_hit(class: EndpointClass) {
    counter!(names::RATE_LIMIT_HITS_TOTAL, "class" => class.as_str()).increment(1);
}

/// Collapse id segments so label cardinality stays bounded.
fn sanitize_path(path: &str) -> String {
    let mut out = Vec::new();
    let mut placeholder: Option<&'static str> = None;

    for segment in path.split('/') {
        if let Some(p) = placeholder.take() {
            if !segment.is_empty() {
                out.push(p.to_string());
                continue;
            }
        }
        placeholder = match segment {
            "status" | "videos" => Some(":job_id"),
            "sessions" => Some(":session_id"),
            _ => None,
        };
        out.push(segment.to_string());
    }

    out.join("/")
}

/// Metrics middleware for HTTP requests.
pub async fn metrics_middleware(request: Request<Body>, next: Next) -> Response<Body> {
    let method = request.method().to_string();
    let path = request.uri().path().to_string();
    let start = Instant::now();

    gauge!(names::HTTP_REQUESTS_IN_FLIGHT).increment(1.0);

    let response = next.run(request).await;

    gauge!(names::HTTP_REQUESTS_IN_FLIGHT).decrement(1.0);

    let status = response.status().as_u16();
    let duration = start.elapsed().as_secs_f64();

    record_http_request(&method, &path, status, duration);

    response
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_path() {
        assert_eq!(sanitize_path("/api/status/8412771/stream"), "/api/status/:job_id/stream");
        assert_eq!(
            sanitize_path("/api/sessions/550e8400-e29b-41d4-a716-446655440000/strategy/confirm"),
            "/api/sessions/:session_id/strategy/confirm"
        );
        assert_eq!(sanitize_path("/api/gallery/videos"), "/api/gallery/videos");
        assert_eq!(sanitize_path("/api/gallery/videos/op-1"), "/api/gallery/videos/:job_id");
        assert_eq!(sanitize_path("/health"), "/health");
    }
}

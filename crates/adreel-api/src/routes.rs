//! API routes.

use std::sync::Arc;

use axum::extract::DefaultBodyLimit;
use axum::middleware;
use axum::routing::{get, post};
use axum::Router;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::timeout::TimeoutLayer;

use adreel_models::EndpointClass;

use crate::handlers::{
    analyze_product_text, cancel_job, confirm_strategy, create_handoff, generate_strategy,
    generate_video, get_budget, get_gallery_video, get_job_status, get_monitoring, get_session,
    health, list_gallery_videos, list_session_handoffs, ready, refine_chat, reset_budget,
    stream_job_status, upload_product_image, validate_handoff,
};
use crate::metrics::metrics_middleware;
use crate::middleware::{
    cors_layer, endpoint_rate_limit, locale_scope, rate_limit_middleware, request_id,
    request_logging, security_headers, ClassLimit,
};
use crate::state::AppState;

/// Attach the fixed-window limit of `class` to every route in `router`.
fn limited(router: Router<AppState>, state: &AppState, class: EndpointClass) -> Router<AppState> {
    router.route_layer(middleware::from_fn_with_state(
        ClassLimit {
            limiter: Arc::clone(&state.rate_limiter),
            class,
        },
        endpoint_rate_limit,
    ))
}

/// Create the API router.
pub fn create_router(state: AppState) -> Router {
    let generation_routes = Router::new().route("/generate-video", post(generate_video));

    let status_routes = Router::new()
        .route("/status/:job_id", get(get_job_status).delete(cancel_job));

    let chat_routes = Router::new().route("/chat/refine", post(refine_chat));

    let upload_routes = Router::new()
        .route("/agents/product-intelligence/upload", post(upload_product_image));

    let analysis_routes = Router::new()
        .route("/agents/product-intelligence/analyze", post(analyze_product_text))
        .route("/sessions/:session_id/strategy", post(generate_strategy))
        .route("/sessions/:session_id/strategy/confirm", post(confirm_strategy))
        .route("/agents/handoff", post(create_handoff))
        .route("/agents/handoff/validate", post(validate_handoff));

    let default_routes = Router::new()
        .route("/sessions/:session_id", get(get_session))
        .route("/sessions/:session_id/handoffs", get(list_session_handoffs))
        .route("/gallery/videos", get(list_gallery_videos))
        .route("/gallery/videos/:job_id", get(get_gallery_video))
        .route("/budget", get(get_budget))
        .route("/admin/monitoring", get(get_monitoring))
        .route("/admin/budget/reset", post(reset_budget));

    // Long-lived, so it stays outside the request timeout
    let stream_routes = Router::new().route("/status/:job_id/stream", get(stream_job_status));

    let timed_routes = Router::new()
        .merge(limited(generation_routes, &state, EndpointClass::Generation))
        .merge(limited(status_routes, &state, EndpointClass::StatusCheck))
        .merge(limited(chat_routes, &state, EndpointClass::Chat))
        .merge(limited(upload_routes, &state, EndpointClass::Upload))
        .merge(limited(analysis_routes, &state, EndpointClass::Analysis))
        .merge(limited(default_routes, &state, EndpointClass::Default))
        .layer(TimeoutLayer::new(state.config.request_timeout));

    let api_routes = Router::new()
        .merge(timed_routes)
        .merge(limited(stream_routes, &state, EndpointClass::StatusCheck))
        .layer(middleware::from_fn_with_state(
            Arc::clone(&state.ip_limiter),
            rate_limit_middleware,
        ));

    let health_routes = Router::new()
        .route("/health", get(health))
        .route("/healthz", get(health))
        .route("/ready", get(ready));

    let metrics_routes = if let Some(handle) = state.metrics_handle.clone() {
        Router::new().route("/metrics", get(move || async move { handle.render() }))
    } else {
        Router::new()
    };

    Router::new()
        .nest("/api", api_routes)
        .merge(health_routes)
        .merge(metrics_routes)
        // Uploads are bounded here rather than by the per-extractor default
        .layer(DefaultBodyLimit::disable())
        .layer(RequestBodyLimitLayer::new(state.config.max_body_size))
        .layer(middleware::from_fn(metrics_middleware))
        .layer(middleware::from_fn(security_headers))
        .layer(middleware::from_fn(locale_scope))
        .layer(middleware::from_fn(request_logging))
        .layer(middleware::from_fn(request_id))
        .layer(cors_layer(&state.config.cors_origins))
        .with_state(state)
}

//! API middleware.

use std::collections::HashMap;
use std::net::IpAddr;
use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Instant;

use axum::body::Body;
use axum::extract::{ConnectInfo, State};
use axum::http::{HeaderValue, Request, Response};
use axum::middleware::Next;
use axum::response::IntoResponse;
use governor::clock::DefaultClock;
use governor::state::{InMemoryState, NotKeyed};
use governor::{Quota, RateLimiter};
use tokio::sync::RwLock;
use tower_http::cors::{Any, CorsLayer};
use tracing::{info, info_span, warn, Instrument};
use uuid::Uuid;

use adreel_models::{EndpointClass, Locale, RateLimitResult};

use crate::error::ApiError;
use crate::messages::LOCALE;
use crate::metrics;
use crate::services::RateLimitService;

/// Per-IP token bucket.
pub type IpRateLimiter = RateLimiter<NotKeyed, InMemoryState, DefaultClock>;

/// Maximum number of IPs to track in the token bucket cache.
const MAX_RATE_LIMITER_ENTRIES: usize = 10_000;

/// IP-based token bucket cache with TTL cleanup.
#[derive(Clone)]
pub struct RateLimiterCache {
    limiters: Arc<RwLock<HashMap<IpAddr, (Arc<IpRateLimiter>, Instant)>>>,
    quota: Quota,
    ttl: std::time::Duration,
}

impl RateLimiterCache {
    pub fn new(requests_per_second: u32) -> Self {
        let rps = NonZeroU32::new(requests_per_second).unwrap_or(NonZeroU32::MIN);
        Self {
            limiters: Arc::new(RwLock::new(HashMap::new())),
            quota: Quota::per_second(rps),
            ttl: std::time::Duration::from_secs(3600),
        }
    }

    async fn cleanup_expired(&self) {
        let mut limiters = self.limiters.write().await;
        let now = Instant::now();
        limiters.retain(|_, (_, created_at)| now.duration_since(*created_at) < self.ttl);

        if limiters.len() >= MAX_RATE_LIMITER_ENTRIES {
            let mut entries: Vec<_> = limiters.iter().map(|(ip, (_, t))| (*ip, *t)).collect();
            entries.sort_by_key(|(_, t)| *t);

            let to_remove = limiters.len() + 1 - MAX_RATE_LIMITER_ENTRIES;
            for (ip, _) in entries.into_iter().take(to_remove) {
                limiters.remove(&ip);
            }
            warn!("Token bucket cache exceeded capacity, removed {} entries", to_remove);
        }
    }

    async fn get_limiter(&self, ip: IpAddr) -> Arc<IpRateLimiter> {
        {
            let limiters = self.limiters.read().await;
            if let Some((limiter, _)) = limiters.get(&ip) {
                return Arc::clone(limiter);
            }
        }

        if self.limiters.read().await.len() >= MAX_RATE_LIMITER_ENTRIES {
            self.cleanup_expired().await;
        }

        let mut limiters = self.limiters.write().await;
        let (limiter, _) = limiters
            .entry(ip)
            .or_insert_with(|| (Arc::new(RateLimiter::direct(self.quota)), Instant::now()));
        Arc::clone(limiter)
    }

    pub async fn check(&self, ip: IpAddr) -> bool {
        self.get_limiter(ip).await.check().is_ok()
    }
}

/// Create CORS layer.
pub fn cors_layer(origins: &[String]) -> CorsLayer {
    use axum::http::{header, HeaderName, Method};

    let allowed_headers = [
        header::AUTHORIZATION,
        header::CONTENT_TYPE,
        header::ACCEPT,
        header::ACCEPT_LANGUAGE,
        header::ORIGIN,
        HeaderName::from_static("x-locale"),
        HeaderName::from_static("x-request-id"),
    ];

    let exposed_headers = [
        header::CONTENT_LENGTH,
        header::CONTENT_TYPE,
        header::RETRY_AFTER,
        HeaderName::from_static("x-request-id"),
        HeaderName::from_static("x-ratelimit-limit"),
        HeaderName::from_static("x-ratelimit-remaining"),
        HeaderName::from_static("x-ratelimit-reset"),
    ];

    let allowed_methods = [Method::GET, Method::POST, Method::DELETE, Method::OPTIONS];

    if origins.iter().any(|o| o == "*") {
        CorsLayer::new()
            .allow_methods(Any)
            .allow_headers(Any)
            .expose_headers(Any)
            .allow_origin(Any)
            .max_age(std::time::Duration::from_secs(600))
    } else {
        // Credentials cannot be combined with wildcard headers
        let origins: Vec<HeaderValue> = origins.iter().filter_map(|o| o.parse().ok()).collect();

        CorsLayer::new()
            .allow_methods(allowed_methods)
            .allow_headers(allowed_headers)
            .expose_headers(exposed_headers)
            .allow_credentials(true)
            .allow_origin(origins)
            .max_age(std::time::Duration::from_secs(600))
    }
}

/// Security headers middleware.
pub async fn security_headers(request: Request<Body>, next: Next) -> Response<Body> {
    let mut response = next.run(request).await;
    let headers = response.headers_mut();

    headers.insert("X-Content-Type-Options", HeaderValue::from_static("nosniff"));
    headers.insert("X-Frame-Options", HeaderValue::from_static("DENY"));
    headers.insert(
        "Strict-Transport-Security",
        HeaderValue::from_static("max-age=31536000; includeSubDomains"),
    );
    headers.insert(
        "Referrer-Policy",
        HeaderValue::from_static("strict-origin-when-cross-origin"),
    );
    headers.insert(
        "Permissions-Policy",
        HeaderValue::from_static("camera=(), geolocation=(), microphone=(), payment=(), usb=()"),
    );
    headers.insert(
        "Cross-Origin-Resource-Policy",
        HeaderValue::from_static("same-origin"),
    );

    response
}

/// Request ID middleware.
///
/// Everything logged while serving the request carries the id through the
/// `request` span.
pub async fn request_id(mut request: Request<Body>, next: Next) -> Response<Body> {
    let request_id = request
        .headers()
        .get("X-Request-ID")
        .and_then(|v| v.to_str().ok())
        .filter(|s| !s.is_empty() && s.len() <= 128)
        .map(|s| s.to_string())
        .unwrap_or_else(|| Uuid::new_v4().to_string());

    request.extensions_mut().insert(RequestId(request_id.clone()));

    let span = info_span!("request", request_id = %request_id);
    let mut response = next.run(request).instrument(span).await;

    if let Ok(value) = HeaderValue::from_str(&request_id) {
        response.headers_mut().insert("X-Request-ID", value);
    }

    response
}

/// Correlation id of the request, stored in request extensions.
#[derive(Debug, Clone)]
pub struct RequestId(pub String);

/// Request logging middleware.
pub async fn request_logging(request: Request<Body>, next: Next) -> Response<Body> {
    let method = request.method().clone();
    let uri = request.uri().clone();
    let start = Instant::now();

    let response = next.run(request).await;

    let status = response.status();
    let duration = start.elapsed();

    // Skip health check logging
    if !matches!(uri.path(), "/health" | "/healthz" | "/ready" | "/metrics") {
        info!(
            method = %method,
            uri = %uri,
            status = %status,
            duration_ms = %duration.as_millis(),
            "Request completed"
        );
    }

    response
}

/// Resolve the response locale from `?locale=`, `X-Locale` or
/// `Accept-Language` and serve the request inside that locale scope.
pub async fn locale_scope(request: Request<Body>, next: Next) -> Response<Body> {
    let locale = resolve_locale(&request);
    LOCALE.scope(locale, next.run(request)).await
}

fn resolve_locale(request: &Request<Body>) -> Locale {
    let from_query = request.uri().query().and_then(|q| {
        q.split('&')
            .filter_map(|pair| pair.split_once('='))
            .find(|(k, _)| *k == "locale")
            .and_then(|(_, v)| Locale::from_tag(v))
    });

    let header = |name: &str| request.headers().get(name).and_then(|v| v.to_str().ok());

    from_query
        .or_else(|| header("X-Locale").and_then(Locale::from_tag))
        .or_else(|| header("Accept-Language").and_then(Locale::from_accept_language))
        .unwrap_or_default()
}

/// Per-IP token bucket over all `/api` routes.
pub async fn rate_limit_middleware(
    State(rate_limiter): State<Arc<RateLimiterCache>>,
    request: Request<Body>,
    next: Next,
) -> Response<Body> {
    if let Some(ip) = extract_client_ip(&request) {
        if !rate_limiter.check(ip).await {
            warn!(ip = %ip, "Token bucket exhausted");
            metrics::record_rate_limit_hit(EndpointClass::Default);
            let result = RateLimitResult {
                allowed: false,
                limit: 0,
                remaining: 0,
                reset_time: chrono::Utc::now() + chrono::Duration::seconds(1),
            };
            return ApiError::RateLimited {
                class: EndpointClass::Default,
                result,
            }
            .into_response();
        }
    }

    next.run(request).await
}

/// State for [`endpoint_rate_limit`]: the shared limiter plus the class of
/// the routes the layer is attached to.
#[derive(Clone)]
pub struct ClassLimit {
    pub limiter: Arc<RateLimitService>,
    pub class: EndpointClass,
}

/// Fixed-window limit for one endpoint class.
pub async fn endpoint_rate_limit(
    State(ClassLimit { limiter, class }): State<ClassLimit>,
    request: Request<Body>,
    next: Next,
) -> Response<Body> {
    let client_id = extract_client_ip(&request)
        .map(|ip| ip.to_string())
        .unwrap_or_else(|| "unknown".to_string());

    let result = limiter.check_rate_limit(&client_id, class).await;
    if !result.allowed {
        warn!(client = %client_id, class = class.as_str(), "Rate limit exceeded");
        metrics::record_rate_limit_hit(class);
        return ApiError::RateLimited { class, result }.into_response();
    }

    let mut response = next.run(request).await;
    let headers = response.headers_mut();
    headers.insert("X-RateLimit-Limit", HeaderValue::from(result.limit));
    headers.insert("X-RateLimit-Remaining", HeaderValue::from(result.remaining));
    headers.insert("X-RateLimit-Reset", HeaderValue::from(result.reset_time.timestamp()));
    response
}

/// Extract client IP from proxy headers or connection info.
pub fn extract_client_ip(request: &Request<Body>) -> Option<IpAddr> {
    if let Some(forwarded) = request.headers().get("X-Forwarded-For") {
        if let Ok(forwarded_str) = forwarded.to_str() {
            // First entry is the original client
            if let Some(first_ip) = forwarded_str.split(',').next() {
                if let Ok(ip) = first_ip.trim().parse() {
                    return Some(ip);
                }
            }
        }
    }

    if let Some(real_ip) = request.headers().get("X-Real-IP") {
        if let Ok(ip) = real_ip.to_str().map(str::trim).unwrap_or_default().parse() {
            return Some(ip);
        }
    }

    request
        .extensions()
        .get::<ConnectInfo<std::net::SocketAddr>>()
        .map(|ci| ci.0.ip())
}

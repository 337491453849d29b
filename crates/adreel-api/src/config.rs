//! API configuration.

use std::collections::HashMap;
use std::str::FromStr;
use std::time::Duration;

use adreel_models::{BudgetThresholds, EndpointClass};

/// Which persistence backend the server runs against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreBackend {
    Firestore,
    Memory,
}

impl FromStr for StoreBackend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "firestore" => Ok(Self::Firestore),
            "memory" => Ok(Self::Memory),
            other => Err(format!("unknown store backend: {}", other)),
        }
    }
}

/// API server configuration.
#[derive(Debug, Clone)]
pub struct ApiConfig {
    /// Server host
    pub host: String,
    /// Server port
    pub port: u16,
    /// CORS origins
    pub cors_origins: Vec<String>,
    /// Per-IP token bucket for all `/api` routes
    pub rate_limit_rps: u32,
    /// Fixed-window limits per endpoint class
    pub endpoint_limits: HashMap<EndpointClass, u32>,
    /// Request timeout
    pub request_timeout: Duration,
    /// Max request body size
    pub max_body_size: usize,
    /// Max uploaded image size
    pub max_upload_bytes: usize,
    /// Environment (development/production)
    pub environment: String,
    /// Bearer key for admin routes; admin access is refused when unset
    pub admin_api_key: Option<String>,
    pub total_budget_usd: f64,
    pub budget_thresholds: BudgetThresholds,
    pub hydrate_budget_from_ledger: bool,
    pub handoff_completeness_threshold: f64,
    pub job_max_age: chrono::Duration,
    pub session_ttl: chrono::Duration,
    pub status_stream_poll: Duration,
    pub store_backend: StoreBackend,
    pub enable_expiry_sweeper: bool,
    /// Install the Prometheus recorder and serve `/metrics`.
    pub metrics_enabled: bool,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8000,
            cors_origins: vec!["*".to_string()],
            rate_limit_rps: 20,
            endpoint_limits: EndpointClass::ALL
                .iter()
                .map(|c| (*c, c.default_limit_per_minute()))
                .collect(),
            request_timeout: Duration::from_secs(30),
            max_body_size: 12 * 1024 * 1024,
            max_upload_bytes: 10 * 1024 * 1024,
            environment: "development".to_string(),
            admin_api_key: None,
            total_budget_usd: 300.0,
            budget_thresholds: BudgetThresholds::default(),
            hydrate_budget_from_ledger: true,
            handoff_completeness_threshold: 0.8,
            job_max_age: chrono::Duration::hours(24),
            session_ttl: chrono::Duration::hours(24),
            status_stream_poll: Duration::from_secs(5),
            store_backend: StoreBackend::Firestore,
            enable_expiry_sweeper: true,
            metrics_enabled: true,
        }
    }
}

fn env_parse<T: FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|s| s.trim().parse().ok())
}

fn env_flag(key: &str, default: bool) -> bool {
    std::env::var(key)
        .map(|v| matches!(v.to_lowercase().as_str(), "true" | "1" | "yes"))
        .unwrap_or(default)
}

impl ApiConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let endpoint_limits = EndpointClass::ALL
            .iter()
            .map(|class| {
                let limit = env_parse::<u32>(&class.env_key())
                    .filter(|l| *l > 0)
                    .unwrap_or_else(|| class.default_limit_per_minute());
                (*class, limit)
            })
            .collect();

        let budget_thresholds = BudgetThresholds {
            warning: env_parse("BUDGET_WARNING_THRESHOLD").unwrap_or(defaults.budget_thresholds.warning),
            critical: env_parse("BUDGET_CRITICAL_THRESHOLD").unwrap_or(defaults.budget_thresholds.critical),
        };

        Self {
            host: std::env::var("API_HOST").unwrap_or(defaults.host),
            port: env_parse("API_PORT").unwrap_or(defaults.port),
            cors_origins: std::env::var("CORS_ORIGINS")
                .map(|s| s.split(',').map(|s| s.trim().to_string()).collect())
                .unwrap_or(defaults.cors_origins),
            rate_limit_rps: env_parse("RATE_LIMIT_RPS").unwrap_or(defaults.rate_limit_rps),
            endpoint_limits,
            request_timeout: env_parse("REQUEST_TIMEOUT")
                .map(Duration::from_secs)
                .unwrap_or(defaults.request_timeout),
            max_body_size: env_parse("MAX_BODY_SIZE").unwrap_or(defaults.max_body_size),
            max_upload_bytes: env_parse("MAX_UPLOAD_BYTES").unwrap_or(defaults.max_upload_bytes),
            environment: std::env::var("ENVIRONMENT").unwrap_or(defaults.environment),
            admin_api_key: std::env::var("ADMIN_API_KEY").ok().filter(|k| !k.trim().is_empty()),
            total_budget_usd: env_parse("TOTAL_BUDGET_USD")
                .filter(|b: &f64| b.is_finite() && *b >= 0.0)
                .unwrap_or(defaults.total_budget_usd),
            budget_thresholds,
            hydrate_budget_from_ledger: env_flag("BUDGET_HYDRATE_FROM_LEDGER", true),
            handoff_completeness_threshold: env_parse("HANDOFF_COMPLETENESS_THRESHOLD")
                .filter(|t: &f64| (0.0..=1.0).contains(t))
                .unwrap_or(defaults.handoff_completeness_threshold),
            job_max_age: env_parse::<i64>("JOB_MAX_AGE_HOURS")
                .filter(|h| *h > 0)
                .map(chrono::Duration::hours)
                .unwrap_or(defaults.job_max_age),
            session_ttl: env_parse::<i64>("SESSION_TTL_HOURS")
                .filter(|h| *h > 0)
                .map(chrono::Duration::hours)
                .unwrap_or(defaults.session_ttl),
            status_stream_poll: env_parse::<u64>("STATUS_STREAM_POLL_SECS")
                .filter(|s| *s > 0)
                .map(Duration::from_secs)
                .unwrap_or(defaults.status_stream_poll),
            store_backend: env_parse("STORE_BACKEND").unwrap_or(defaults.store_backend),
            enable_expiry_sweeper: env_flag("ENABLE_EXPIRY_SWEEPER", defaults.enable_expiry_sweeper),
            metrics_enabled: env_flag("METRICS_ENABLED", defaults.metrics_enabled),
        }
    }

    /// Check if running in production mode.
    pub fn is_production(&self) -> bool {
        self.environment.to_lowercase() == "production"
    }

    pub fn limit_for(&self, class: EndpointClass) -> u32 {
        self.endpoint_limits
            .get(&class)
            .copied()
            .unwrap_or_else(|| class.default_limit_per_minute())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    #[serial]
    fn test_from_env_overrides_class_limit_and_backend() {
        std::env::set_var("RATE_LIMIT_STATUS_CHECK_PER_MIN", "3");
        std::env::set_var("STORE_BACKEND", "memory");
        std::env::set_var("ADMIN_API_KEY", "  ");

        let config = ApiConfig::from_env();
        assert_eq!(config.limit_for(EndpointClass::StatusCheck), 3);
        assert_eq!(config.limit_for(EndpointClass::Generation), 5);
        assert_eq!(config.store_backend, StoreBackend::Memory);
        assert!(config.admin_api_key.is_none());

        std::env::remove_var("RATE_LIMIT_STATUS_CHECK_PER_MIN");
        std::env::remove_var("STORE_BACKEND");
        std::env::remove_var("ADMIN_API_KEY");
    }

    #[test]
    #[serial]
    fn test_invalid_values_fall_back_to_defaults() {
        std::env::set_var("TOTAL_BUDGET_USD", "-5");
        std::env::set_var("HANDOFF_COMPLETENESS_THRESHOLD", "1.5");

        let config = ApiConfig::from_env();
        assert_eq!(config.total_budget_usd, 300.0);
        assert_eq!(config.handoff_completeness_threshold, 0.8);

        std::env::remove_var("TOTAL_BUDGET_USD");
        std::env::remove_var("HANDOFF_COMPLETENESS_THRESHOLD");
    }

    #[test]
    #[serial]
    fn test_metrics_flag_from_env() {
        assert!(ApiConfig::from_env().metrics_enabled);

        std::env::set_var("METRICS_ENABLED", "false");
        assert!(!ApiConfig::from_env().metrics_enabled);

        std::env::set_var("METRICS_ENABLED", "1");
        assert!(ApiConfig::from_env().metrics_enabled);

        std::env::remove_var("METRICS_ENABLED");
    }
}

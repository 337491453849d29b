//! Endpoint classes and limiter results.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Group of endpoints sharing a per-client request budget.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "kebab-case")]
pub enum EndpointClass {
    StatusCheck,
    Generation,
    Chat,
    Upload,
    Analysis,
    Default,
}

impl EndpointClass {
    pub const ALL: [EndpointClass; 6] = [
        EndpointClass::StatusCheck,
        EndpointClass::Generation,
        EndpointClass::Chat,
        EndpointClass::Upload,
        EndpointClass::Analysis,
        EndpointClass::Default,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            EndpointClass::StatusCheck => "status-check",
            EndpointClass::Generation => "generation",
            EndpointClass::Chat => "chat",
            EndpointClass::Upload => "upload",
            EndpointClass::Analysis => "analysis",
            EndpointClass::Default => "default",
        }
    }

    /// Requests allowed per one-minute window.
    pub fn default_limit_per_minute(&self) -> u32 {
        match self {
            EndpointClass::StatusCheck => 60,
            EndpointClass::Generation => 5,
            EndpointClass::Chat => 20,
            EndpointClass::Upload => 10,
            EndpointClass::Analysis => 10,
            EndpointClass::Default => 100,
        }
    }

    /// Suffix used in `RATE_LIMIT_<CLASS>_PER_MIN` overrides.
    pub fn env_key(&self) -> String {
        format!(
            "RATE_LIMIT_{}_PER_MIN",
            self.as_str().replace('-', "_").to_ascii_uppercase()
        )
    }
}

impl fmt::Display for EndpointClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for EndpointClass {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        EndpointClass::ALL
            .into_iter()
            .find(|c| c.as_str() == s)
            .ok_or_else(|| format!("unknown endpoint class: {}", s))
    }
}

/// Outcome of a limiter check.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct RateLimitResult {
    pub allowed: bool,
    pub limit: u32,
    pub remaining: u32,
    /// When the current window closes.
    pub reset_time: DateTime<Utc>,
}

impl RateLimitResult {
    /// Seconds until the window resets, at least 1.
    pub fn retry_after_secs(&self, now: DateTime<Utc>) -> u64 {
        let ms = (self.reset_time - now).num_milliseconds().max(0) as u64;
        ms.div_ceil(1000).max(1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_class_roundtrip_and_env_key() {
        for class in EndpointClass::ALL {
            assert_eq!(class.as_str().parse::<EndpointClass>().unwrap(), class);
        }
        assert_eq!(
            EndpointClass::StatusCheck.env_key(),
            "RATE_LIMIT_STATUS_CHECK_PER_MIN"
        );
    }

    #[test]
    fn test_retry_after_rounds_up() {
        let now = Utc::now();
        let result = RateLimitResult {
            allowed: false,
            limit: 5,
            remaining: 0,
            reset_time: now + Duration::milliseconds(1500),
        };
        assert_eq!(result.retry_after_secs(now), 2);
        assert_eq!(result.retry_after_secs(now + Duration::seconds(10)), 1);
    }
}

//! Budget accounting types.

use std::fmt;

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::cost::{GEMINI_TEXT_COST, GEMINI_VISION_COST, IMAGE_GENERATION_COST};

/// Billed external service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum ServiceKind {
    GeminiVision,
    GeminiText,
    ImageGeneration,
    Veo,
}

impl ServiceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ServiceKind::GeminiVision => "gemini_vision",
            ServiceKind::GeminiText => "gemini_text",
            ServiceKind::ImageGeneration => "image_generation",
            ServiceKind::Veo => "veo",
        }
    }

    /// Flat per-request price. Veo is priced per second, see
    /// [`crate::cost::estimate_video_cost`].
    pub fn unit_cost(&self) -> Option<f64> {
        match self {
            ServiceKind::GeminiVision => Some(GEMINI_VISION_COST),
            ServiceKind::GeminiText => Some(GEMINI_TEXT_COST),
            ServiceKind::ImageGeneration => Some(IMAGE_GENERATION_COST),
            ServiceKind::Veo => None,
        }
    }
}

impl fmt::Display for ServiceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One billed operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct CostEntry {
    pub id: String,
    pub service: ServiceKind,
    /// USD, never negative
    pub amount: f64,
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl CostEntry {
    pub fn new(
        service: ServiceKind,
        amount: f64,
        description: impl Into<String>,
        session_id: Option<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            service,
            amount,
            description: description.into(),
            session_id,
            timestamp: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "lowercase")]
pub enum AlertLevel {
    #[default]
    Normal,
    Warning,
    Critical,
}

impl AlertLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            AlertLevel::Normal => "normal",
            AlertLevel::Warning => "warning",
            AlertLevel::Critical => "critical",
        }
    }
}

/// Fractions of the total budget at which alerts fire.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct BudgetThresholds {
    pub warning: f64,
    pub critical: f64,
}

impl Default for BudgetThresholds {
    fn default() -> Self {
        Self {
            warning: 0.75,
            critical: 0.90,
        }
    }
}

impl BudgetThresholds {
    pub fn level(&self, fraction_used: f64) -> AlertLevel {
        if fraction_used >= self.critical {
            AlertLevel::Critical
        } else if fraction_used >= self.warning {
            AlertLevel::Warning
        } else {
            AlertLevel::Normal
        }
    }
}

/// Snapshot returned by `GET /api/budget`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct BudgetStatus {
    pub can_proceed: bool,
    pub current_spend: f64,
    pub total_budget: f64,
    pub remaining_budget: f64,
    /// 0-100
    pub percentage_used: f64,
    pub alert_level: AlertLevel,
}

impl BudgetStatus {
    pub fn compute(current_spend: f64, total_budget: f64, thresholds: &BudgetThresholds) -> Self {
        let fraction = if total_budget > 0.0 {
            current_spend / total_budget
        } else {
            // A zero budget allows nothing
            1.0
        };
        let alert_level = thresholds.level(fraction);
        Self {
            can_proceed: fraction < thresholds.critical,
            current_spend,
            total_budget,
            remaining_budget: (total_budget - current_spend).max(0.0),
            percentage_used: fraction * 100.0,
            alert_level,
        }
    }
}

/// A threshold crossing kept for the monitoring endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct BudgetAlert {
    pub level: AlertLevel,
    pub spend_at_alert: f64,
    pub percentage_used: f64,
    pub message: String,
    pub timestamp: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_can_proceed_stops_at_critical() {
        let thresholds = BudgetThresholds::default();

        let below = BudgetStatus::compute(269.99, 300.0, &thresholds);
        assert!(below.can_proceed);
        assert_eq!(below.alert_level, AlertLevel::Warning);

        let at = BudgetStatus::compute(270.0, 300.0, &thresholds);
        assert!(!at.can_proceed);
        assert_eq!(at.alert_level, AlertLevel::Critical);

        let over = BudgetStatus::compute(310.0, 300.0, &thresholds);
        assert!(!over.can_proceed);
        assert_eq!(over.remaining_budget, 0.0);
    }

    #[test]
    fn test_levels() {
        let t = BudgetThresholds::default();
        assert_eq!(t.level(0.1), AlertLevel::Normal);
        assert_eq!(t.level(0.75), AlertLevel::Warning);
        assert_eq!(t.level(0.95), AlertLevel::Critical);
        assert!(AlertLevel::Critical > AlertLevel::Warning);
    }

    #[test]
    fn test_zero_budget_blocks() {
        let status = BudgetStatus::compute(0.0, 0.0, &BudgetThresholds::default());
        assert!(!status.can_proceed);
    }
}

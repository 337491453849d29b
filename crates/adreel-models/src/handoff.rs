//! Agent handoffs.
//!
//! The workflow is a fixed pipeline of four agents:
//!
//! ```text
//! product-intelligence (Maya) -> creative-director (David)
//!     -> video-producer (Alex) -> post-production (Zara)
//! ```
//!
//! Each transition packages the accumulated [`HandoffContext`] into an
//! immutable, versioned [`HandoffPayload`]. Validation is a pure function of
//! the transition and the context.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::analysis::{CreativeDirection, ProductAnalysis, Strategy};
use crate::job::AspectRatio;
use crate::locale::Locale;

// =============================================================================
// Agents
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "kebab-case")]
pub enum AgentRole {
    ProductIntelligence,
    CreativeDirector,
    VideoProducer,
    PostProduction,
}

impl AgentRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            AgentRole::ProductIntelligence => "product-intelligence",
            AgentRole::CreativeDirector => "creative-director",
            AgentRole::VideoProducer => "video-producer",
            AgentRole::PostProduction => "post-production",
        }
    }

    /// Display name of the agent persona.
    pub fn persona(&self) -> &'static str {
        match self {
            AgentRole::ProductIntelligence => "Maya",
            AgentRole::CreativeDirector => "David",
            AgentRole::VideoProducer => "Alex",
            AgentRole::PostProduction => "Zara",
        }
    }

    /// The fixed successor in the pipeline.
    pub fn next(&self) -> Option<AgentRole> {
        match self {
            AgentRole::ProductIntelligence => Some(AgentRole::CreativeDirector),
            AgentRole::CreativeDirector => Some(AgentRole::VideoProducer),
            AgentRole::VideoProducer => Some(AgentRole::PostProduction),
            AgentRole::PostProduction => None,
        }
    }
}

impl fmt::Display for AgentRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for AgentRole {
    type Err = String;

    /// Accepts the slug (`creative-director`) or the persona (`David`).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim().to_ascii_lowercase();
        match s.as_str() {
            "product-intelligence" | "maya" => Ok(AgentRole::ProductIntelligence),
            "creative-director" | "david" => Ok(AgentRole::CreativeDirector),
            "video-producer" | "alex" => Ok(AgentRole::VideoProducer),
            "post-production" | "zara" => Ok(AgentRole::PostProduction),
            _ => Err(format!("unknown agent: {}", s)),
        }
    }
}

// =============================================================================
// Context
// =============================================================================

/// Video produced by the producer stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct VideoDeliverable {
    pub job_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub video_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thumbnail_url: Option<String>,
    #[serde(default)]
    pub duration_secs: u32,
    #[serde(default)]
    pub aspect_ratio: AspectRatio,
}

/// Everything an agent hands to the next one.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct HandoffContext {
    #[serde(default)]
    pub locale: Locale,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub analysis: Option<ProductAnalysis>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub strategy: Option<Strategy>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub creative_direction: Option<CreativeDirection>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub video: Option<VideoDeliverable>,
    #[serde(default)]
    pub notes: Vec<String>,
}

impl HandoffContext {
    /// Overlay `other` on top of `self`: present fields win, notes append.
    /// Locale is left to the caller.
    pub fn overlay(&mut self, other: HandoffContext) {
        if other.analysis.is_some() {
            self.analysis = other.analysis;
        }
        if other.strategy.is_some() {
            self.strategy = other.strategy;
        }
        if other.creative_direction.is_some() {
            self.creative_direction = other.creative_direction;
        }
        if other.video.is_some() {
            self.video = other.video;
        }
        self.notes.extend(other.notes);
    }
}

// =============================================================================
// Validation
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum ValidationStatus {
    Passed,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ValidationIssue {
    pub field: String,
    pub message: String,
}

impl ValidationIssue {
    fn missing(field: &str) -> Self {
        Self {
            field: field.to_string(),
            message: format!("{} is missing", field),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct HandoffValidationResult {
    pub validation_status: ValidationStatus,
    /// Fraction of required fields present, in [0, 1].
    pub completeness: f64,
    pub errors: Vec<ValidationIssue>,
    pub warnings: Vec<ValidationIssue>,
}

impl HandoffValidationResult {
    pub fn passed(&self) -> bool {
        self.validation_status == ValidationStatus::Passed
    }
}

fn present(s: &str) -> bool {
    !s.trim().is_empty()
}

fn opt_present(s: &Option<String>) -> bool {
    s.as_deref().is_some_and(present)
}

type FieldChecks = Vec<(&'static str, bool)>;

/// Required and recommended field checks for a transition out of `source`.
fn field_checks(source: AgentRole, ctx: &HandoffContext) -> (FieldChecks, FieldChecks) {
    let analysis = ctx.analysis.as_ref();
    let strategy = ctx.strategy.as_ref();
    let video = ctx.video.as_ref();

    match source {
        AgentRole::ProductIntelligence => (
            vec![
                ("analysis", analysis.is_some()),
                ("analysis.productName", analysis.is_some_and(|a| present(&a.product_name))),
                ("analysis.description", analysis.is_some_and(|a| present(&a.description))),
                ("analysis.keyFeatures", analysis.is_some_and(|a| !a.key_features.is_empty())),
            ],
            vec![
                ("analysis.targetAudience", analysis.is_some_and(|a| opt_present(&a.target_audience))),
                ("analysis.brandTone", analysis.is_some_and(|a| opt_present(&a.brand_tone))),
            ],
        ),
        AgentRole::CreativeDirector => (
            vec![
                ("analysis", analysis.is_some()),
                ("strategy", strategy.is_some()),
                ("strategy.headline", strategy.is_some_and(|s| present(&s.headline))),
                ("strategy.keyMessages", strategy.is_some_and(|s| !s.key_messages.is_empty())),
                ("strategy.visualStyle", strategy.is_some_and(|s| present(&s.visual_style))),
            ],
            vec![
                ("strategy.callToAction", strategy.is_some_and(|s| opt_present(&s.call_to_action))),
                ("strategy.mood", strategy.is_some_and(|s| opt_present(&s.mood))),
                ("creativeDirection", ctx.creative_direction.is_some()),
            ],
        ),
        AgentRole::VideoProducer => (
            vec![
                ("strategy", strategy.is_some()),
                ("video", video.is_some()),
                ("video.jobId", video.is_some_and(|v| present(&v.job_id))),
                ("video.videoUrl", video.is_some_and(|v| opt_present(&v.video_url))),
            ],
            vec![("video.thumbnailUrl", video.is_some_and(|v| opt_present(&v.thumbnail_url)))],
        ),
        AgentRole::PostProduction => (vec![], vec![]),
    }
}

/// Validate a transition and its context.
///
/// The status is `passed` when `completeness >= threshold`. A transition
/// that is not the fixed successor of `source` fails with completeness 0.
pub fn validate_handoff(
    source: AgentRole,
    target: AgentRole,
    ctx: &HandoffContext,
    threshold: f64,
) -> HandoffValidationResult {
    if source.next() != Some(target) {
        return HandoffValidationResult {
            validation_status: ValidationStatus::Failed,
            completeness: 0.0,
            errors: vec![ValidationIssue {
                field: "targetAgent".to_string(),
                message: format!("{} cannot hand off to {}", source, target),
            }],
            warnings: vec![],
        };
    }

    let (required, recommended) = field_checks(source, ctx);

    let errors: Vec<_> = required
        .iter()
        .filter(|(_, ok)| !ok)
        .map(|(field, _)| ValidationIssue::missing(field))
        .collect();
    let warnings: Vec<_> = recommended
        .iter()
        .filter(|(_, ok)| !ok)
        .map(|(field, _)| ValidationIssue::missing(field))
        .collect();

    let completeness = if required.is_empty() {
        1.0
    } else {
        (required.len() - errors.len()) as f64 / required.len() as f64
    };

    HandoffValidationResult {
        validation_status: if completeness >= threshold {
            ValidationStatus::Passed
        } else {
            ValidationStatus::Failed
        },
        completeness,
        errors,
        warnings,
    }
}

// =============================================================================
// Payload
// =============================================================================

/// Immutable record of one agent transition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct HandoffPayload {
    pub handoff_id: String,
    pub session_id: String,
    pub timestamp: DateTime<Utc>,
    /// 1-based position in the session's handoff history.
    pub version: u32,
    pub source_agent: AgentRole,
    pub target_agent: AgentRole,
    pub payload: HandoffContext,
    pub validation_result: HandoffValidationResult,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn analysis() -> ProductAnalysis {
        ProductAnalysis {
            product_name: "Glow Serum".into(),
            category: "skincare".into(),
            description: "Vitamin C serum".into(),
            key_features: vec!["brightening".into()],
            target_audience: Some("adults".into()),
            brand_tone: None,
            colors: vec![],
            confidence: 0.9,
        }
    }

    #[test]
    fn test_agent_parsing() {
        assert_eq!("David".parse::<AgentRole>().unwrap(), AgentRole::CreativeDirector);
        assert_eq!(
            "video-producer".parse::<AgentRole>().unwrap(),
            AgentRole::VideoProducer
        );
        assert!("bob".parse::<AgentRole>().is_err());
        assert_eq!(AgentRole::PostProduction.next(), None);
    }

    #[test]
    fn test_complete_analysis_passes_with_warning() {
        let ctx = HandoffContext {
            analysis: Some(analysis()),
            ..Default::default()
        };
        let result = validate_handoff(
            AgentRole::ProductIntelligence,
            AgentRole::CreativeDirector,
            &ctx,
            0.8,
        );
        assert!(result.passed());
        assert_eq!(result.completeness, 1.0);
        assert!(result.errors.is_empty());
        assert_eq!(result.warnings.len(), 1);
        assert_eq!(result.warnings[0].field, "analysis.brandTone");
    }

    #[test]
    fn test_missing_fields_reduce_completeness() {
        let mut a = analysis();
        a.key_features.clear();
        let ctx = HandoffContext {
            analysis: Some(a),
            ..Default::default()
        };
        let result = validate_handoff(
            AgentRole::ProductIntelligence,
            AgentRole::CreativeDirector,
            &ctx,
            0.8,
        );
        assert_eq!(result.completeness, 0.75);
        assert!(!result.passed());
        assert_eq!(result.errors[0].field, "analysis.keyFeatures");
    }

    #[test]
    fn test_invalid_transition() {
        let result = validate_handoff(
            AgentRole::ProductIntelligence,
            AgentRole::PostProduction,
            &HandoffContext::default(),
            0.8,
        );
        assert!(!result.passed());
        assert_eq!(result.completeness, 0.0);
    }

    #[test]
    fn test_validation_is_deterministic() {
        let ctx = HandoffContext::default();
        let a = validate_handoff(AgentRole::VideoProducer, AgentRole::PostProduction, &ctx, 0.8);
        let b = validate_handoff(AgentRole::VideoProducer, AgentRole::PostProduction, &ctx, 0.8);
        assert_eq!(a, b);
        assert_eq!(a.errors.len(), 4);
    }

    #[test]
    fn test_overlay_prefers_newer_fields() {
        let mut base = HandoffContext {
            analysis: Some(analysis()),
            notes: vec!["first".into()],
            ..Default::default()
        };
        base.overlay(HandoffContext {
            creative_direction: Some(CreativeDirection::default()),
            notes: vec!["second".into()],
            ..Default::default()
        });
        assert!(base.analysis.is_some());
        assert!(base.creative_direction.is_some());
        assert_eq!(base.notes, vec!["first", "second"]);
    }
}

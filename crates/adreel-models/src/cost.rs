//! Cost estimation for billed AI operations.
//!
//! Prices are list prices in USD and are used both for up-front estimates
//! shown to users and for the amounts recorded by the budget tracker.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::job::AspectRatio;

// =============================================================================
// Pricing
// =============================================================================

/// Veo price per generated second of video.
pub const VEO_COST_PER_SECOND: f64 = 0.10;

/// Gemini multimodal (image) analysis, per request.
pub const GEMINI_VISION_COST: f64 = 0.0025;

/// Gemini text generation, per request.
pub const GEMINI_TEXT_COST: f64 = 0.001;

/// Image generation, per image.
pub const IMAGE_GENERATION_COST: f64 = 0.04;

/// Round an amount to whole cents.
pub fn round_cents(amount: f64) -> f64 {
    (amount * 100.0).round() / 100.0
}

// =============================================================================
// Video estimate
// =============================================================================

/// Up-front estimate for a video generation request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct VideoCostEstimate {
    pub duration_secs: u32,
    pub aspect_ratio: AspectRatio,
    pub per_second: f64,
    /// Total in USD, rounded to cents
    pub total: f64,
}

impl VideoCostEstimate {
    /// Human-readable description for the cost ledger.
    ///
    /// Format: "Veo video 15s (16:9)"
    pub fn to_description(&self) -> String {
        format!(
            "Veo video {}s ({})",
            self.duration_secs,
            self.aspect_ratio.as_str()
        )
    }
}

/// Estimate the cost of generating `duration_secs` seconds of video.
pub fn estimate_video_cost(duration_secs: u32, aspect_ratio: AspectRatio) -> VideoCostEstimate {
    VideoCostEstimate {
        duration_secs,
        aspect_ratio,
        per_second: VEO_COST_PER_SECOND,
        total: round_cents(duration_secs as f64 * VEO_COST_PER_SECOND),
    }
}

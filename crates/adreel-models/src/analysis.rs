//! Product analysis and creative strategy produced by the AI stages.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Structured result of analysing a product image or description.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ProductAnalysis {
    pub product_name: String,
    #[serde(default)]
    pub category: String,
    pub description: String,
    #[serde(default)]
    pub key_features: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_audience: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub brand_tone: Option<String>,
    #[serde(default)]
    pub colors: Vec<String>,
    /// Model confidence in [0, 1].
    #[serde(default)]
    pub confidence: f64,
}

impl ProductAnalysis {
    /// Clamp the confidence into [0, 1]; models occasionally return percentages.
    pub fn normalized(mut self) -> Self {
        if self.confidence > 1.0 && self.confidence <= 100.0 {
            self.confidence /= 100.0;
        }
        if !self.confidence.is_finite() {
            self.confidence = 0.0;
        }
        self.confidence = self.confidence.clamp(0.0, 1.0);
        self
    }
}

/// Creative strategy proposed by the creative director stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Strategy {
    pub headline: String,
    #[serde(default)]
    pub key_messages: Vec<String>,
    #[serde(default)]
    pub visual_style: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_audience: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub call_to_action: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mood: Option<String>,
}

impl Strategy {
    /// Render the strategy as a video generation prompt.
    pub fn to_video_prompt(&self, product_name: Option<&str>) -> String {
        let mut prompt = String::new();
        if let Some(name) = product_name {
            prompt.push_str(&format!("Commercial for {}. ", name));
        }
        prompt.push_str(&self.headline);
        if !self.visual_style.is_empty() {
            prompt.push_str(&format!(". Visual style: {}", self.visual_style));
        }
        if let Some(ref mood) = self.mood {
            prompt.push_str(&format!(". Mood: {}", mood));
        }
        if !self.key_messages.is_empty() {
            prompt.push_str(&format!(". Key messages: {}", self.key_messages.join("; ")));
        }
        prompt
    }
}

/// Scene-level direction added by the creative director for the producer.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct CreativeDirection {
    #[serde(default)]
    pub scenes: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub music_style: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub voiceover: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn analysis(confidence: f64) -> ProductAnalysis {
        ProductAnalysis {
            product_name: "Glow Serum".into(),
            category: "skincare".into(),
            description: "Vitamin C serum".into(),
            key_features: vec!["brightening".into()],
            target_audience: None,
            brand_tone: None,
            colors: vec![],
            confidence,
        }
    }

    #[test]
    fn test_confidence_percentage_is_normalized() {
        assert!((analysis(87.0).normalized().confidence - 0.87).abs() < 1e-9);
        assert_eq!(analysis(-1.0).normalized().confidence, 0.0);
        assert_eq!(analysis(f64::NAN).normalized().confidence, 0.0);
    }

    #[test]
    fn test_strategy_prompt_includes_style_and_messages() {
        let strategy = Strategy {
            headline: "Radiance in a drop".into(),
            key_messages: vec!["glow".into(), "clean".into()],
            visual_style: "soft morning light".into(),
            target_audience: None,
            call_to_action: None,
            mood: Some("calm".into()),
        };
        let prompt = strategy.to_video_prompt(Some("Glow Serum"));
        assert!(prompt.starts_with("Commercial for Glow Serum."));
        assert!(prompt.contains("soft morning light"));
        assert!(prompt.contains("glow; clean"));
    }
}

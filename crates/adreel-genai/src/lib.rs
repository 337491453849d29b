//! Generative AI backends.
//!
//! - [`GeminiClient`]: product analysis, prompt refinement and strategy
//!   generation through the Gemini `generateContent` API
//! - [`VeoClient`]: long-running video generation on Vertex AI
//!
//! The API server depends on the [`CreativeModel`] and [`VideoGenerator`]
//! traits so tests can substitute deterministic fakes.

pub mod error;
pub mod gemini;
pub mod veo;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use adreel_models::{AspectRatio, ChatMessage, Locale, ProductAnalysis, RemoteJobState, Strategy};

pub use error::{GenAiError, GenAiResult};
pub use gemini::{GeminiClient, GeminiConfig};
pub use veo::{VeoClient, VeoConfig};

/// What the product analysis stage looks at.
#[derive(Debug, Clone)]
pub enum ProductInput {
    Image {
        bytes: Vec<u8>,
        mime_type: String,
        description: Option<String>,
    },
    Text(String),
}

impl ProductInput {
    pub fn is_image(&self) -> bool {
        matches!(self, ProductInput::Image { .. })
    }
}

#[derive(Debug, Clone)]
pub struct RefineRequest {
    pub message: String,
    pub current_prompt: Option<String>,
    pub history: Vec<ChatMessage>,
    pub locale: Locale,
}

/// Assistant reply to a prompt-refinement message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatRefinement {
    pub response: String,
    #[serde(default)]
    pub suggestions: Vec<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct VideoRequest {
    pub prompt: String,
    pub duration_secs: u32,
    pub aspect_ratio: AspectRatio,
}

/// Text and vision model used by the creative stages.
#[async_trait]
pub trait CreativeModel: Send + Sync {
    async fn analyze_product(&self, input: &ProductInput, locale: Locale) -> GenAiResult<ProductAnalysis>;

    async fn refine_prompt(&self, request: &RefineRequest) -> GenAiResult<ChatRefinement>;

    async fn generate_strategy(
        &self,
        analysis: &ProductAnalysis,
        prompt: &str,
        locale: Locale,
    ) -> GenAiResult<Strategy>;
}

/// Long-running video generation backend.
#[async_trait]
pub trait VideoGenerator: Send + Sync {
    /// Start generation; returns the full operation name.
    async fn submit(&self, request: &VideoRequest) -> GenAiResult<String>;

    async fn poll(&self, operation_name: &str) -> GenAiResult<RemoteJobState>;

    async fn cancel(&self, operation_name: &str) -> GenAiResult<()>;
}

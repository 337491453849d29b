//! Gemini client for the product-intelligence and creative-director stages.
//!
//! Every call asks for a JSON response and walks the configured model list
//! until one answers with parseable output.

use std::time::Duration;

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use adreel_models::{ChatRole, Locale, ProductAnalysis, Strategy};

use crate::error::{GenAiError, GenAiResult};
use crate::{ChatRefinement, CreativeModel, ProductInput, RefineRequest};

const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com";

const DEFAULT_MODELS: [&str; 3] = ["gemini-2.5-flash", "gemini-2.5-flash-lite", "gemini-2.5-pro"];

/// Chat turns forwarded as context for refinement.
const MAX_HISTORY_TURNS: usize = 10;

// =============================================================================
// Configuration
// =============================================================================

#[derive(Debug, Clone)]
pub struct GeminiConfig {
    pub api_key: String,
    pub base_url: String,
    /// Tried in order until one succeeds
    pub models: Vec<String>,
    pub timeout: Duration,
}

impl GeminiConfig {
    pub fn from_env() -> GenAiResult<Self> {
        let api_key = std::env::var("GEMINI_API_KEY")
            .ok()
            .filter(|k| !k.is_empty())
            .ok_or_else(|| GenAiError::config("GEMINI_API_KEY not configured"))?;

        let models = std::env::var("GEMINI_MODELS")
            .ok()
            .map(|s| {
                s.split(',')
                    .map(|m| m.trim().to_string())
                    .filter(|m| !m.is_empty())
                    .collect::<Vec<_>>()
            })
            .filter(|m| !m.is_empty())
            .unwrap_or_else(|| DEFAULT_MODELS.iter().map(|m| m.to_string()).collect());

        Ok(Self {
            api_key,
            base_url: std::env::var("GEMINI_BASE_URL").unwrap_or_else(|_| DEFAULT_BASE_URL.to_string()),
            models,
            timeout: Duration::from_secs(
                std::env::var("GEMINI_TIMEOUT_SECS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(60),
            ),
        })
    }
}

// =============================================================================
// Wire types
// =============================================================================

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateRequest {
    contents: Vec<Content>,
    generation_config: GenerationConfig,
}

#[derive(Debug, Serialize)]
struct Content {
    role: &'static str,
    parts: Vec<Part>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct Part {
    #[serde(skip_serializing_if = "Option::is_none")]
    text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    inline_data: Option<InlineData>,
}

impl Part {
    fn text(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
            inline_data: None,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct InlineData {
    mime_type: String,
    /// base64
    data: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    response_mime_type: &'static str,
    temperature: f32,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<ResponseContent>,
}

#[derive(Debug, Deserialize)]
struct ResponseContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Debug, Deserialize)]
struct ResponsePart {
    text: Option<String>,
}

// =============================================================================
// Client
// =============================================================================

pub struct GeminiClient {
    http: Client,
    config: GeminiConfig,
}

impl GeminiClient {
    pub fn new(config: GeminiConfig) -> GenAiResult<Self> {
        let http = Client::builder()
            .timeout(config.timeout)
            .user_agent(concat!("adreel-genai/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self { http, config })
    }

    pub fn from_env() -> GenAiResult<Self> {
        Self::new(GeminiConfig::from_env()?)
    }

    /// Generate a JSON answer, falling back through the model list.
    async fn generate_json<T: DeserializeOwned>(
        &self,
        parts: Vec<Part>,
        temperature: f32,
    ) -> GenAiResult<T> {
        let request = GenerateRequest {
            contents: vec![Content { role: "user", parts }],
            generation_config: GenerationConfig {
                response_mime_type: "application/json",
                temperature,
            },
        };

        let mut last_error = None;
        for model in &self.config.models {
            match self.call_model(model, &request).await {
                Ok(text) => match serde_json::from_str::<T>(strip_code_fences(&text)) {
                    Ok(value) => {
                        info!(model = %model, "Gemini request succeeded");
                        return Ok(value);
                    }
                    Err(e) => {
                        warn!(model = %model, "Gemini returned unparseable JSON: {}", e);
                        last_error = Some(GenAiError::from(e));
                    }
                },
                Err(e) => {
                    warn!(model = %model, "Gemini request failed: {}", e);
                    last_error = Some(e);
                }
            }
        }

        Err(last_error.unwrap_or_else(|| GenAiError::config("no Gemini models configured")))
    }

    async fn call_model(&self, model: &str, request: &GenerateRequest) -> GenAiResult<String> {
        let url = format!(
            "{}/v1beta/models/{}:generateContent",
            self.config.base_url.trim_end_matches('/'),
            model
        );

        let response = self
            .http
            .post(&url)
            .header("x-goog-api-key", &self.config.api_key)
            .json(request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(GenAiError::Api {
                service: "gemini",
                status: status.as_u16(),
                message,
            });
        }

        let body: GenerateResponse = response.json().await?;
        body.candidates
            .into_iter()
            .filter_map(|c| c.content)
            .flat_map(|c| c.parts)
            .find_map(|p| p.text)
            .ok_or_else(|| GenAiError::invalid_response("no content in Gemini response"))
    }
}

/// Models sometimes wrap JSON in a markdown fence despite the MIME type.
pub fn strip_code_fences(text: &str) -> &str {
    let text = text.trim();
    let text = text
        .strip_prefix("```json")
        .or_else(|| text.strip_prefix("```"))
        .unwrap_or(text);
    text.strip_suffix("```").unwrap_or(text).trim()
}

fn language_instruction(locale: Locale) -> &'static str {
    match locale {
        Locale::En => "Write all text values in English.",
        Locale::Ja => "Write all text values in Japanese.",
    }
}

fn analysis_prompt(description: Option<&str>, locale: Locale) -> String {
    let mut prompt = String::from(
        "You are a product marketing analyst. Analyze the product and respond with JSON: \
         {\"productName\": string, \"category\": string, \"description\": string, \
         \"keyFeatures\": string[], \"targetAudience\": string, \"brandTone\": string, \
         \"colors\": string[], \"confidence\": number between 0 and 1}.",
    );
    if let Some(desc) = description.filter(|d| !d.trim().is_empty()) {
        prompt.push_str("\nProduct description from the user: ");
        prompt.push_str(desc);
    }
    prompt.push('\n');
    prompt.push_str(language_instruction(locale));
    prompt
}

#[async_trait]
impl CreativeModel for GeminiClient {
    async fn analyze_product(&self, input: &ProductInput, locale: Locale) -> GenAiResult<ProductAnalysis> {
        let parts = match input {
            ProductInput::Image {
                bytes,
                mime_type,
                description,
            } => vec![
                Part {
                    text: None,
                    inline_data: Some(InlineData {
                        mime_type: mime_type.clone(),
                        data: STANDARD.encode(bytes),
                    }),
                },
                Part::text(analysis_prompt(description.as_deref(), locale)),
            ],
            ProductInput::Text(description) => vec![Part::text(analysis_prompt(Some(description), locale))],
        };

        let analysis: ProductAnalysis = self.generate_json(parts, 0.2).await?;
        Ok(analysis.normalized())
    }

    async fn refine_prompt(&self, request: &RefineRequest) -> GenAiResult<ChatRefinement> {
        let mut prompt = String::from(
            "You help users write prompts for short commercial videos. Reply to the user's \
             latest message and respond with JSON: {\"response\": string, \"suggestions\": string[]} \
             where suggestions are up to three improved video prompts.\n",
        );
        if let Some(current) = request.current_prompt.as_deref() {
            prompt.push_str(&format!("Current prompt: {}\n", current));
        }

        let skip = request.history.len().saturating_sub(MAX_HISTORY_TURNS);
        for turn in request.history.iter().skip(skip) {
            let who = match turn.role {
                ChatRole::User => "User",
                ChatRole::Assistant => "Assistant",
            };
            prompt.push_str(&format!("{}: {}\n", who, turn.content));
        }
        prompt.push_str(&format!("User: {}\n", request.message));
        prompt.push_str(language_instruction(request.locale));

        self.generate_json(vec![Part::text(prompt)], 0.7).await
    }

    async fn generate_strategy(
        &self,
        analysis: &ProductAnalysis,
        prompt: &str,
        locale: Locale,
    ) -> GenAiResult<Strategy> {
        let text = format!(
            "You are a creative director planning a 15 second commercial. Product analysis: {}\n\
             User direction: {}\n\
             Respond with JSON: {{\"headline\": string, \"keyMessages\": string[], \
             \"visualStyle\": string, \"targetAudience\": string, \"callToAction\": string, \
             \"mood\": string}}.\n{}",
            serde_json::to_string(analysis)?,
            if prompt.trim().is_empty() { "(none)" } else { prompt },
            language_instruction(locale)
        );

        self.generate_json(vec![Part::text(text)], 0.8).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client(server: &MockServer, models: &[&str]) -> GeminiClient {
        GeminiClient::new(GeminiConfig {
            api_key: "test-key".into(),
            base_url: server.uri(),
            models: models.iter().map(|m| m.to_string()).collect(),
            timeout: Duration::from_secs(5),
        })
        .unwrap()
    }

    fn text_response(text: &str) -> ResponseTemplate {
        ResponseTemplate::new(200).set_body_json(json!({
            "candidates": [{"content": {"parts": [{"text": text}]}}]
        }))
    }

    #[test]
    fn test_strip_code_fences() {
        assert_eq!(strip_code_fences("```json\n{\"a\":1}\n```"), "{\"a\":1}");
        assert_eq!(strip_code_fences("```\n[]\n```"), "[]");
        assert_eq!(strip_code_fences("  {}  "), "{}");
    }

    #[tokio::test]
    async fn test_analysis_falls_back_to_next_model() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1beta/models/primary:generateContent"))
            .respond_with(ResponseTemplate::new(503))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/v1beta/models/backup:generateContent"))
            .and(header("x-goog-api-key", "test-key"))
            .respond_with(text_response(
                "```json\n{\"productName\":\"Glow Serum\",\"description\":\"Vitamin C\",\
                 \"keyFeatures\":[\"bright\"],\"confidence\":92}\n```",
            ))
            .expect(1)
            .mount(&server)
            .await;

        let analysis = client(&server, &["primary", "backup"])
            .analyze_product(&ProductInput::Text("serum".into()), Locale::En)
            .await
            .unwrap();
        assert_eq!(analysis.product_name, "Glow Serum");
        assert!((analysis.confidence - 0.92).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_all_models_failing_surfaces_last_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
            .mount(&server)
            .await;

        let err = client(&server, &["a", "b"])
            .refine_prompt(&RefineRequest {
                message: "brighter".into(),
                current_prompt: None,
                history: vec![],
                locale: Locale::Ja,
            })
            .await
            .unwrap_err();
        assert!(matches!(err, GenAiError::Api { status: 500, .. }));
    }

    #[tokio::test]
    async fn test_refinement_parses_suggestions() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(text_response(
                "{\"response\":\"Try golden hour\",\"suggestions\":[\"A lake at golden hour\"]}",
            ))
            .mount(&server)
            .await;

        let reply = client(&server, &["m"])
            .refine_prompt(&RefineRequest {
                message: "make it warmer".into(),
                current_prompt: Some("a lake".into()),
                history: vec![],
                locale: Locale::En,
            })
            .await
            .unwrap();
        assert_eq!(reply.suggestions.len(), 1);
    }
}

//! Veo video generation on Vertex AI.
//!
//! Generation is a long-running operation: `predictLongRunning` returns an
//! operation name which is polled with `fetchPredictOperation`. The last path
//! segment of that name doubles as the public job id.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use tracing::{debug, info, warn};

use adreel_models::{JobStatus, RemoteJobState};

use crate::error::{GenAiError, GenAiResult};
use crate::{VideoGenerator, VideoRequest};

const CLOUD_PLATFORM_SCOPE: &str = "https://www.googleapis.com/auth/cloud-platform";

#[derive(Debug, Clone)]
pub struct VeoConfig {
    pub project_id: String,
    pub location: String,
    pub model: String,
    pub base_url: String,
    /// Optional `gs://` prefix where Vertex writes the rendered videos
    pub output_gcs_uri: Option<String>,
    pub timeout: Duration,
}

impl VeoConfig {
    pub fn from_env() -> GenAiResult<Self> {
        let project_id = std::env::var("GCP_PROJECT_ID")
            .ok()
            .filter(|p| !p.is_empty())
            .ok_or_else(|| GenAiError::config("GCP_PROJECT_ID not configured"))?;
        let location = std::env::var("VEO_LOCATION").unwrap_or_else(|_| "us-central1".to_string());
        let base_url = std::env::var("VEO_BASE_URL")
            .unwrap_or_else(|_| format!("https://{}-aiplatform.googleapis.com", location));

        Ok(Self {
            project_id,
            model: std::env::var("VEO_MODEL").unwrap_or_else(|_| "veo-3.0-generate-001".to_string()),
            base_url,
            location,
            output_gcs_uri: std::env::var("VEO_OUTPUT_GCS_URI").ok().filter(|u| !u.is_empty()),
            timeout: Duration::from_secs(
                std::env::var("VEO_TIMEOUT_SECS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(30),
            ),
        })
    }

    fn model_path(&self) -> String {
        format!(
            "{}/v1/projects/{}/locations/{}/publishers/google/models/{}",
            self.base_url.trim_end_matches('/'),
            self.project_id,
            self.location,
            self.model
        )
    }
}

enum Auth {
    Provider(Arc<dyn gcp_auth::TokenProvider>),
    Static(String),
}

// =============================================================================
// Wire types
// =============================================================================

#[derive(Debug, Serialize)]
struct PredictRequest<'a> {
    instances: [Instance<'a>; 1],
    parameters: Parameters<'a>,
}

#[derive(Debug, Serialize)]
struct Instance<'a> {
    prompt: &'a str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct Parameters<'a> {
    duration_seconds: u32,
    aspect_ratio: &'a str,
    sample_count: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    storage_uri: Option<&'a str>,
}

#[derive(Debug, Deserialize)]
struct OperationName {
    name: String,
}

#[derive(Debug, Default, Deserialize)]
struct Operation {
    #[serde(default)]
    done: bool,
    #[serde(default)]
    metadata: Option<JsonValue>,
    #[serde(default)]
    error: Option<OperationError>,
    #[serde(default)]
    response: Option<GenerateVideoResponse>,
}

#[derive(Debug, Deserialize)]
struct OperationError {
    #[serde(default)]
    message: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateVideoResponse {
    #[serde(default)]
    videos: Vec<GeneratedVideo>,
    #[serde(default)]
    rai_media_filtered_count: u32,
    #[serde(default)]
    rai_media_filtered_reasons: Vec<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeneratedVideo {
    gcs_uri: Option<String>,
}

// =============================================================================
// Client
// =============================================================================

pub struct VeoClient {
    http: Client,
    config: VeoConfig,
    auth: Auth,
}

impl VeoClient {
    /// Authenticate with application default credentials.
    pub async fn new(config: VeoConfig) -> GenAiResult<Self> {
        let auth = match std::env::var("VEO_ACCESS_TOKEN").ok().filter(|t| !t.is_empty()) {
            Some(token) => Auth::Static(token),
            None => Auth::Provider(
                gcp_auth::provider()
                    .await
                    .map_err(|e| GenAiError::Auth(format!("no Google credentials: {}", e)))?,
            ),
        };
        Self::build(config, auth)
    }

    pub fn with_static_token(config: VeoConfig, token: impl Into<String>) -> GenAiResult<Self> {
        Self::build(config, Auth::Static(token.into()))
    }

    fn build(config: VeoConfig, auth: Auth) -> GenAiResult<Self> {
        let http = Client::builder()
            .timeout(config.timeout)
            .user_agent(concat!("adreel-genai/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self { http, config, auth })
    }

    async fn token(&self) -> GenAiResult<String> {
        match &self.auth {
            Auth::Static(token) => Ok(token.clone()),
            Auth::Provider(provider) => provider
                .token(&[CLOUD_PLATFORM_SCOPE])
                .await
                .map(|t| t.as_str().to_string())
                .map_err(|e| GenAiError::Auth(e.to_string())),
        }
    }

    async fn post_json<B: Serialize + ?Sized>(&self, url: &str, body: &B) -> GenAiResult<JsonValue> {
        let token = self.token().await?;
        let response = self.http.post(url).bearer_auth(token).json(body).send().await?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(GenAiError::Api {
                service: "veo",
                status: status.as_u16(),
                message,
            });
        }
        Ok(response.json().await?)
    }
}

/// Rewrite `gs://bucket/key` into its public HTTPS form.
pub fn gcs_to_https(uri: &str) -> String {
    match uri.strip_prefix("gs://") {
        Some(rest) => format!("https://storage.googleapis.com/{}", rest),
        None => uri.to_string(),
    }
}

fn progress_from_metadata(metadata: Option<&JsonValue>) -> Option<u8> {
    metadata?
        .get("progressPercent")
        .and_then(JsonValue::as_f64)
        .map(|p| p.clamp(0.0, 100.0) as u8)
}

fn remote_state(op: Operation) -> RemoteJobState {
    if !op.done {
        return RemoteJobState {
            status: JobStatus::Processing,
            progress: progress_from_metadata(op.metadata.as_ref()),
            ..Default::default()
        };
    }

    if let Some(error) = op.error {
        let message = if error.message.is_empty() {
            "video generation failed".to_string()
        } else {
            error.message
        };
        return RemoteJobState {
            status: JobStatus::Failed,
            error: Some(message),
            ..Default::default()
        };
    }

    let response = op.response.unwrap_or_default();
    match response.videos.iter().find_map(|v| v.gcs_uri.as_deref()) {
        Some(uri) => RemoteJobState {
            status: JobStatus::Completed,
            progress: Some(100),
            video_url: Some(gcs_to_https(uri)),
            thumbnail_url: None,
            error: None,
        },
        None => {
            let error = if response.rai_media_filtered_count > 0 {
                match response.rai_media_filtered_reasons.first() {
                    Some(reason) => format!("blocked by safety filters: {}", reason),
                    None => "blocked by safety filters".to_string(),
                }
            } else {
                "generation finished without a video".to_string()
            };
            RemoteJobState {
                status: JobStatus::Failed,
                error: Some(error),
                ..Default::default()
            }
        }
    }
}

#[async_trait]
impl VideoGenerator for VeoClient {
    async fn submit(&self, request: &VideoRequest) -> GenAiResult<String> {
        let url = format!("{}:predictLongRunning", self.config.model_path());
        let body = PredictRequest {
            instances: [Instance {
                prompt: &request.prompt,
            }],
            parameters: Parameters {
                duration_seconds: request.duration_secs,
                aspect_ratio: request.aspect_ratio.as_str(),
                sample_count: 1,
                storage_uri: self.config.output_gcs_uri.as_deref(),
            },
        };

        let value = self.post_json(&url, &body).await?;
        let op: OperationName = serde_json::from_value(value)
            .map_err(|e| GenAiError::invalid_response(format!("missing operation name: {}", e)))?;

        info!(operation = %op.name, duration = request.duration_secs, "Submitted Veo generation");
        Ok(op.name)
    }

    async fn poll(&self, operation_name: &str) -> GenAiResult<RemoteJobState> {
        let url = format!("{}:fetchPredictOperation", self.config.model_path());
        let value = self
            .post_json(&url, &serde_json::json!({ "operationName": operation_name }))
            .await?;
        let op: Operation = serde_json::from_value(value)?;
        let state = remote_state(op);
        debug!(operation = %operation_name, status = %state.status, "Polled Veo operation");
        Ok(state)
    }

    async fn cancel(&self, operation_name: &str) -> GenAiResult<()> {
        let url = format!(
            "{}/v1/{}:cancel",
            self.config.base_url.trim_end_matches('/'),
            operation_name
        );
        match self.post_json(&url, &serde_json::json!({})).await {
            Ok(_) => Ok(()),
            Err(e) if e.is_not_found() => {
                warn!(operation = %operation_name, "Cancel target no longer exists upstream");
                Ok(())
            }
            Err(e) => Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use adreel_models::AspectRatio;
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const MODEL: &str = "/v1/projects/p1/locations/us-central1/publishers/google/models/veo-test";
    const OP: &str =
        "projects/p1/locations/us-central1/publishers/google/models/veo-test/operations/op-123";

    fn client(server: &MockServer) -> VeoClient {
        VeoClient::with_static_token(
            VeoConfig {
                project_id: "p1".into(),
                location: "us-central1".into(),
                model: "veo-test".into(),
                base_url: server.uri(),
                output_gcs_uri: None,
                timeout: Duration::from_secs(5),
            },
            "tok",
        )
        .unwrap()
    }

    #[test]
    fn test_gcs_to_https() {
        assert_eq!(
            gcs_to_https("gs://bucket/videos/a.mp4"),
            "https://storage.googleapis.com/bucket/videos/a.mp4"
        );
        assert_eq!(gcs_to_https("https://x/y.mp4"), "https://x/y.mp4");
    }

    #[test]
    fn test_safety_filtered_result_is_failed() {
        let op: Operation = serde_json::from_value(json!({
            "done": true,
            "response": {"raiMediaFilteredCount": 1, "raiMediaFilteredReasons": ["celebrity"]}
        }))
        .unwrap();
        let state = remote_state(op);
        assert_eq!(state.status, JobStatus::Failed);
        assert!(state.error.unwrap().contains("celebrity"));
    }

    #[tokio::test]
    async fn test_submit_returns_operation_name() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(format!("{}:predictLongRunning", MODEL)))
            .and(header("authorization", "Bearer tok"))
            .and(body_partial_json(json!({
                "parameters": {"durationSeconds": 8, "aspectRatio": "9:16", "sampleCount": 1}
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "name": OP })))
            .expect(1)
            .mount(&server)
            .await;

        let name = client(&server)
            .submit(&VideoRequest {
                prompt: "a sneaker on a rooftop".into(),
                duration_secs: 8,
                aspect_ratio: AspectRatio::Portrait,
            })
            .await
            .unwrap();
        assert_eq!(name, OP);
    }

    #[tokio::test]
    async fn test_poll_maps_running_and_completed() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(format!("{}:fetchPredictOperation", MODEL)))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "name": OP, "done": false, "metadata": {"progressPercent": 40}
            })))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path(format!("{}:fetchPredictOperation", MODEL)))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "name": OP,
                "done": true,
                "response": {"videos": [{"gcsUri": "gs://out/op-123/sample_0.mp4", "mimeType": "video/mp4"}]}
            })))
            .mount(&server)
            .await;

        let veo = client(&server);
        let running = veo.poll(OP).await.unwrap();
        assert_eq!(running.status, JobStatus::Processing);
        assert_eq!(running.progress, Some(40));

        let done = veo.poll(OP).await.unwrap();
        assert_eq!(done.status, JobStatus::Completed);
        assert_eq!(
            done.video_url.as_deref(),
            Some("https://storage.googleapis.com/out/op-123/sample_0.mp4")
        );
    }

    #[tokio::test]
    async fn test_cancel_of_missing_operation_is_ok() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(format!("/v1/{}:cancel", OP)))
            .respond_with(ResponseTemplate::new(404))
            .expect(1)
            .mount(&server)
            .await;

        client(&server).cancel(OP).await.unwrap();
    }
}

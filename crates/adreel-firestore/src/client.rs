//! Firestore REST API client.
//!
//! - Token caching with refresh margin (or a static token for the emulator)
//! - HTTP client tuning (pooling, timeouts)
//! - Exponential backoff with jitter on transport failures
//! - Observability (tracing spans, metrics)

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use gcp_auth::{CustomServiceAccount, TokenProvider};
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use tracing::{debug, info_span, Instrument};

use crate::error::{FirestoreError, FirestoreResult};
use crate::metrics::{record_query_results, record_request};
use crate::retry::{with_retry, RetryConfig};
use crate::token_cache::TokenCache;
use crate::types::{
    Aggregation, BatchWriteRequest, BatchWriteResponse, Document, RunAggregationQueryRequest,
    RunAggregationQueryResponse, RunQueryRequest, RunQueryResponse, StructuredAggregationQuery,
    StructuredQuery, Value, Write,
};

/// Token the Firestore emulator accepts for admin access.
const EMULATOR_TOKEN: &str = "owner";

// =============================================================================
// Configuration
// =============================================================================

/// Firestore client configuration.
#[derive(Debug, Clone)]
pub struct FirestoreConfig {
    /// GCP project ID
    pub project_id: String,
    /// Database ID (usually "(default)")
    pub database_id: String,
    /// `host:port` of a local emulator; disables OAuth when set
    pub emulator_host: Option<String>,
    pub timeout: Duration,
    pub connect_timeout: Duration,
    pub retry: RetryConfig,
}

impl FirestoreConfig {
    /// Create config from environment variables.
    pub fn from_env() -> FirestoreResult<Self> {
        let project_id = std::env::var("GCP_PROJECT_ID")
            .or_else(|_| std::env::var("FIREBASE_PROJECT_ID"))
            .map_err(|_| {
                FirestoreError::auth_error(
                    "GCP_PROJECT_ID or FIREBASE_PROJECT_ID must be set to access Firestore",
                )
            })?;

        if project_id.is_empty() {
            return Err(FirestoreError::auth_error(
                "GCP_PROJECT_ID or FIREBASE_PROJECT_ID cannot be empty",
            ));
        }

        let connect_timeout_secs: u64 = std::env::var("FIRESTORE_CONNECT_TIMEOUT_SECS")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(5);

        Ok(Self {
            project_id,
            database_id: std::env::var("FIRESTORE_DATABASE_ID")
                .unwrap_or_else(|_| "(default)".to_string()),
            emulator_host: std::env::var("FIRESTORE_EMULATOR_HOST")
                .ok()
                .filter(|h| !h.is_empty()),
            timeout: Duration::from_secs(30),
            connect_timeout: Duration::from_secs(connect_timeout_secs),
            retry: RetryConfig::from_env(),
        })
    }

    fn api_root(&self) -> String {
        match &self.emulator_host {
            Some(host) => format!("http://{}", host),
            None => "https://firestore.googleapis.com".to_string(),
        }
    }
}

// =============================================================================
// Client
// =============================================================================

#[derive(Clone)]
enum Auth {
    Cached(Arc<TokenCache>),
    Static(String),
}

impl Auth {
    async fn token(&self) -> FirestoreResult<String> {
        match self {
            Auth::Cached(cache) => cache.get_token().await,
            Auth::Static(token) => Ok(token.clone()),
        }
    }
}

/// Firestore REST API client.
#[derive(Clone)]
pub struct FirestoreClient {
    http: Client,
    config: FirestoreConfig,
    base_url: String,
    auth: Auth,
}

impl FirestoreClient {
    /// Create a new Firestore client.
    pub async fn new(config: FirestoreConfig) -> FirestoreResult<Self> {
        let auth = if config.emulator_host.is_some() {
            Auth::Static(EMULATOR_TOKEN.to_string())
        } else {
            Auth::Cached(Arc::new(TokenCache::new(Self::create_auth_provider()?)))
        };
        let root = config.api_root();
        Self::build(config, &root, auth)
    }

    /// Client against an arbitrary API root with a fixed bearer token.
    pub fn with_static_token(
        config: FirestoreConfig,
        api_root: &str,
        token: impl Into<String>,
    ) -> FirestoreResult<Self> {
        Self::build(config, api_root, Auth::Static(token.into()))
    }

    fn build(config: FirestoreConfig, api_root: &str, auth: Auth) -> FirestoreResult<Self> {
        let http = Client::builder()
            .timeout(config.timeout)
            .connect_timeout(config.connect_timeout)
            .pool_idle_timeout(Duration::from_secs(90))
            .pool_max_idle_per_host(10)
            .user_agent(concat!("adreel-firestore/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(FirestoreError::Network)?;

        let base_url = format!(
            "{}/v1/projects/{}/databases/{}/documents",
            api_root.trim_end_matches('/'),
            config.project_id,
            config.database_id
        );

        Ok(Self {
            http,
            config,
            base_url,
            auth,
        })
    }

    fn create_auth_provider() -> FirestoreResult<Arc<dyn TokenProvider>> {
        let service_account = CustomServiceAccount::from_env().map_err(|e| {
            FirestoreError::auth_error(format!("Failed to load service account: {}", e))
        })?;

        match service_account {
            Some(sa) => Ok(Arc::new(sa)),
            None => Err(FirestoreError::auth_error(
                "GOOGLE_APPLICATION_CREDENTIALS not set. \
                 Set it to the path of your service account JSON file.",
            )),
        }
    }

    /// Create from environment variables.
    pub async fn from_env() -> FirestoreResult<Self> {
        Self::new(FirestoreConfig::from_env()?).await
    }

    fn is_access_token_expired(body: &str) -> bool {
        body.contains("ACCESS_TOKEN_EXPIRED") || body.contains("\"UNAUTHENTICATED\"")
    }

    fn document_path(&self, collection: &str, doc_id: &str) -> String {
        format!("{}/{}/{}", self.base_url, collection, doc_id)
    }

    /// Full resource name, as used by batch writes and reference values.
    pub fn full_document_name(&self, collection: &str, doc_id: &str) -> String {
        format!(
            "projects/{}/databases/{}/documents/{}/{}",
            self.config.project_id, self.config.database_id, collection, doc_id
        )
    }

    // =========================================================================
    // CRUD Operations
    // =========================================================================

    /// Get a document.
    pub async fn get_document(
        &self,
        collection: &str,
        doc_id: &str,
    ) -> FirestoreResult<Option<Document>> {
        let url = self.document_path(collection, doc_id);

        self.execute_request("get_document", collection, Some(doc_id), || async {
            let response = self.send_authorized(|token| self.http.get(&url).bearer_auth(token)).await?;
            match response.status() {
                StatusCode::OK => Ok(Some(response.json().await?)),
                StatusCode::NOT_FOUND => Ok(None),
                status => Err(Self::error_from_response(status, &url, response).await),
            }
        })
        .await
    }

    /// Create a document. Fails with `AlreadyExists` if the id is taken.
    pub async fn create_document(
        &self,
        collection: &str,
        doc_id: &str,
        fields: HashMap<String, Value>,
    ) -> FirestoreResult<Document> {
        let url = format!(
            "{}/{}?documentId={}",
            self.base_url,
            collection,
            urlencoding::encode(doc_id)
        );
        let body = Document::new(fields);

        self.execute_request("create_document", collection, Some(doc_id), || async {
            let response = self
                .send_authorized(|token| self.http.post(&url).bearer_auth(token).json(&body))
                .await?;
            match response.status() {
                StatusCode::OK | StatusCode::CREATED => Ok(response.json().await?),
                StatusCode::CONFLICT => Err(FirestoreError::AlreadyExists(format!(
                    "{}/{}",
                    collection, doc_id
                ))),
                status => Err(Self::error_from_response(status, &url, response).await),
            }
        })
        .await
    }

    /// Replace the given fields of an existing document.
    ///
    /// With `update_time`, the write only succeeds if the stored document
    /// still has that update time; otherwise `PreconditionFailed`.
    pub async fn update_document(
        &self,
        collection: &str,
        doc_id: &str,
        fields: HashMap<String, Value>,
        update_mask: Option<Vec<String>>,
        update_time: Option<&str>,
    ) -> FirestoreResult<Document> {
        let mut params: Vec<String> = Vec::new();
        if let Some(mask) = update_mask {
            params.extend(
                mask.iter()
                    .map(|f| format!("updateMask.fieldPaths={}", urlencoding::encode(f))),
            );
        }
        match update_time {
            Some(ts) => params.push(format!("currentDocument.updateTime={}", urlencoding::encode(ts))),
            None => params.push("currentDocument.exists=true".to_string()),
        }
        let url = format!("{}?{}", self.document_path(collection, doc_id), params.join("&"));
        let body = Document::new(fields);

        self.execute_request("update_document", collection, Some(doc_id), || async {
            let response = self
                .send_authorized(|token| self.http.patch(&url).bearer_auth(token).json(&body))
                .await?;
            match response.status() {
                StatusCode::OK => Ok(response.json().await?),
                StatusCode::NOT_FOUND => Err(FirestoreError::not_found(format!(
                    "{}/{}",
                    collection, doc_id
                ))),
                StatusCode::PRECONDITION_FAILED | StatusCode::CONFLICT => {
                    let body_text = response.text().await.unwrap_or_default();
                    Err(FirestoreError::PreconditionFailed(body_text))
                }
                StatusCode::BAD_REQUEST => {
                    // A stale updateTime comes back as 400 FAILED_PRECONDITION
                    let body_text = response.text().await.unwrap_or_default();
                    if body_text.contains("FAILED_PRECONDITION") {
                        Err(FirestoreError::PreconditionFailed(body_text))
                    } else {
                        Err(FirestoreError::request_failed(format!("{} failed: {}", url, body_text)))
                    }
                }
                status => Err(Self::error_from_response(status, &url, response).await),
            }
        })
        .await
    }

    /// Delete a document. Missing documents are not an error.
    pub async fn delete_document(&self, collection: &str, doc_id: &str) -> FirestoreResult<()> {
        let url = self.document_path(collection, doc_id);

        self.execute_request("delete_document", collection, Some(doc_id), || async {
            let response = self
                .send_authorized(|token| self.http.delete(&url).bearer_auth(token))
                .await?;
            match response.status() {
                StatusCode::OK | StatusCode::NO_CONTENT => Ok(()),
                StatusCode::NOT_FOUND => {
                    debug!("Document {}/{} already deleted", collection, doc_id);
                    Ok(())
                }
                status => Err(Self::error_from_response(status, &url, response).await),
            }
        })
        .await
    }

    /// Execute a batch write (up to 500 writes, applied independently).
    pub async fn batch_write(&self, writes: Vec<Write>) -> FirestoreResult<BatchWriteResponse> {
        if writes.is_empty() {
            return Ok(BatchWriteResponse::empty());
        }
        if writes.len() > 500 {
            return Err(FirestoreError::request_failed("Batch write exceeds 500 document limit"));
        }

        let url = format!("{}:batchWrite", self.base_url);
        let request = BatchWriteRequest { writes };

        self.execute_request("batch_write", "batch", None, || async {
            let response = self
                .send_authorized(|token| self.http.post(&url).bearer_auth(token).json(&request))
                .await?;
            match response.status() {
                StatusCode::OK => {
                    let batch: BatchWriteResponse = response.json().await?;
                    batch.check_for_errors()?;
                    Ok(batch)
                }
                status => Err(Self::error_from_response(status, &url, response).await),
            }
        })
        .await
    }

    // =========================================================================
    // Query Operations
    // =========================================================================

    /// Run a structured query against top-level collections.
    pub async fn run_query(&self, query: StructuredQuery) -> FirestoreResult<Vec<Document>> {
        let collection = query
            .from
            .first()
            .map(|c| c.collection_id.clone())
            .unwrap_or_default();
        let url = format!("{}:runQuery", self.base_url);
        let request = RunQueryRequest {
            structured_query: query,
        };

        self.execute_request("run_query", &collection, None, || async {
            let response = self
                .send_authorized(|token| self.http.post(&url).bearer_auth(token).json(&request))
                .await?;
            match response.status() {
                StatusCode::OK => {
                    let responses: Vec<RunQueryResponse> =
                        Self::parse_array(response, "runQuery").await?;
                    let docs: Vec<Document> =
                        responses.into_iter().filter_map(|r| r.document).collect();
                    record_query_results(&collection, docs.len());
                    Ok(docs)
                }
                status => Err(Self::error_from_response(status, &url, response).await),
            }
        })
        .await
    }

    /// Run count/sum aggregations; returns values keyed by alias.
    pub async fn run_aggregation(
        &self,
        query: StructuredQuery,
        aggregations: Vec<Aggregation>,
    ) -> FirestoreResult<HashMap<String, Value>> {
        let collection = query
            .from
            .first()
            .map(|c| c.collection_id.clone())
            .unwrap_or_default();
        let url = format!("{}:runAggregationQuery", self.base_url);
        let request = RunAggregationQueryRequest {
            structured_aggregation_query: StructuredAggregationQuery {
                structured_query: query,
                aggregations,
            },
        };

        self.execute_request("run_aggregation", &collection, None, || async {
            let response = self
                .send_authorized(|token| self.http.post(&url).bearer_auth(token).json(&request))
                .await?;
            match response.status() {
                StatusCode::OK => {
                    let responses: Vec<RunAggregationQueryResponse> =
                        Self::parse_array(response, "runAggregationQuery").await?;
                    Ok(responses
                        .into_iter()
                        .filter_map(|r| r.result?.aggregate_fields)
                        .flatten()
                        .collect())
                }
                status => Err(Self::error_from_response(status, &url, response).await),
            }
        })
        .await
    }

    // =========================================================================
    // Internal Helpers
    // =========================================================================

    /// Send a request, refreshing the token once if the server reports it expired.
    async fn send_authorized<F>(&self, build: F) -> FirestoreResult<Response>
    where
        F: Fn(&str) -> RequestBuilder,
    {
        let token = self.auth.token().await?;
        let response = build(&token).send().await?;
        if response.status() != StatusCode::UNAUTHORIZED {
            return Ok(response);
        }

        let url = response.url().to_string();
        let body = response.text().await.unwrap_or_default();
        let Auth::Cached(cache) = &self.auth else {
            return Err(FirestoreError::from_http_status(401, format!("{} failed: {}", url, body)));
        };
        if !Self::is_access_token_expired(&body) {
            return Err(FirestoreError::from_http_status(401, format!("{} failed: {}", url, body)));
        }

        cache.invalidate().await;
        let token = cache.get_token().await?;
        Ok(build(&token).send().await?)
    }

    /// Streaming endpoints answer with a JSON array.
    async fn parse_array<T: DeserializeOwned>(response: Response, what: &str) -> FirestoreResult<Vec<T>> {
        let body = response.text().await.unwrap_or_default();
        serde_json::from_str(&body).map_err(|e| {
            FirestoreError::InvalidResponse(format!(
                "Failed to parse {} response: {} (body prefix: {})",
                what,
                e,
                body.chars().take(200).collect::<String>()
            ))
        })
    }

    /// Execute a request with retry, tracing and metrics.
    async fn execute_request<T, F, Fut>(
        &self,
        operation: &str,
        collection: &str,
        doc_id: Option<&str>,
        op: F,
    ) -> FirestoreResult<T>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = FirestoreResult<T>>,
    {
        let span = match doc_id {
            Some(id) => info_span!("firestore_request", operation = %operation, collection = %collection, doc_id = %id),
            None => info_span!("firestore_request", operation = %operation, collection = %collection),
        };

        let start = Instant::now();
        let result = with_retry(&self.config.retry, operation, op)
            .instrument(span)
            .await;
        let latency_ms = start.elapsed().as_millis() as f64;

        let status = match &result {
            Ok(_) => 200,
            Err(e) => e.http_status().unwrap_or(500),
        };
        record_request(operation, status, latency_ms);

        result
    }

    async fn error_from_response(status: StatusCode, url: &str, response: Response) -> FirestoreError {
        let body = response.text().await.unwrap_or_default();
        FirestoreError::from_http_status(status.as_u16(), format!("{} failed: {}", url, body))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    #[serial]
    fn test_config_from_env_validates_project_id() {
        std::env::remove_var("GCP_PROJECT_ID");
        std::env::remove_var("FIREBASE_PROJECT_ID");
        assert!(FirestoreConfig::from_env().is_err());
    }

    #[test]
    #[serial]
    fn test_config_picks_up_emulator() {
        std::env::set_var("GCP_PROJECT_ID", "test-project");
        std::env::set_var("FIRESTORE_EMULATOR_HOST", "localhost:8080");
        let config = FirestoreConfig::from_env().unwrap();
        assert_eq!(config.api_root(), "http://localhost:8080");
        assert_eq!(config.database_id, "(default)");

        std::env::remove_var("FIRESTORE_EMULATOR_HOST");
        let config = FirestoreConfig::from_env().unwrap();
        assert_eq!(config.api_root(), "https://firestore.googleapis.com");
        assert_eq!(config.connect_timeout, Duration::from_secs(5));
    }
}

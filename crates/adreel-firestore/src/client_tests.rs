//! HTTP contract tests for the Firestore client and repositories.

use std::time::Duration;

use serde_json::json;
use wiremock::matchers::{header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use adreel_models::{JobStatus, Locale, Session};

use crate::client::{FirestoreClient, FirestoreConfig};
use crate::error::FirestoreError;
use crate::retry::RetryConfig;
use crate::session_repo::SessionRepository;
use crate::store::{JobStore, SessionStore};
use crate::video_job_repo::VideoJobRepository;

const DOCS: &str = "/v1/projects/test-project/databases/(default)/documents";

fn test_config() -> FirestoreConfig {
    FirestoreConfig {
        project_id: "test-project".to_string(),
        database_id: "(default)".to_string(),
        emulator_host: None,
        timeout: Duration::from_secs(5),
        connect_timeout: Duration::from_secs(2),
        retry: RetryConfig {
            max_retries: 2,
            base_delay_ms: 1,
            max_delay_ms: 5,
        },
    }
}

fn client(server: &MockServer) -> FirestoreClient {
    FirestoreClient::with_static_token(test_config(), &server.uri(), "test-token").unwrap()
}

// =============================================================================
// Error mapping
// =============================================================================

#[test]
fn test_error_from_http_status() {
    assert!(matches!(
        FirestoreError::from_http_status(429, "slow down"),
        FirestoreError::RateLimited(_)
    ));
    assert!(matches!(
        FirestoreError::from_http_status(503, "unavailable"),
        FirestoreError::ServerError(503, _)
    ));
    assert!(matches!(
        FirestoreError::from_http_status(404, "missing"),
        FirestoreError::NotFound(_)
    ));
    assert!(matches!(
        FirestoreError::from_http_status(409, "conflict"),
        FirestoreError::AlreadyExists(_)
    ));
    assert!(matches!(
        FirestoreError::from_http_status(400, "bad request"),
        FirestoreError::RequestFailed(_)
    ));
}

#[test]
fn test_retryable_classification() {
    assert!(FirestoreError::from_http_status(429, "").is_retryable());
    assert!(FirestoreError::from_http_status(500, "").is_retryable());
    assert!(FirestoreError::from_http_status(502, "").is_retryable());
    assert!(!FirestoreError::from_http_status(400, "").is_retryable());
    assert!(!FirestoreError::from_http_status(412, "").is_retryable());
}

#[test]
fn test_http_status_and_retry_after() {
    assert_eq!(FirestoreError::RateLimited(1000).http_status(), Some(429));
    assert_eq!(
        FirestoreError::ServerError(502, "bad gateway".into()).http_status(),
        Some(502)
    );
    assert_eq!(FirestoreError::RateLimited(5000).retry_after_ms(), Some(5000));
    assert_eq!(
        FirestoreError::ServerError(500, "error".into()).retry_after_ms(),
        None
    );
}

// =============================================================================
// Client over HTTP
// =============================================================================

#[tokio::test]
async fn test_get_missing_document_is_none() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(format!("{}/sessions/missing", DOCS)))
        .and(header("authorization", "Bearer test-token"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let doc = client(&server).get_document("sessions", "missing").await.unwrap();
    assert!(doc.is_none());
}

#[tokio::test]
async fn test_server_errors_are_retried() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(format!("{}/videoJobs/op-1", DOCS)))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(format!("{}/videoJobs/op-1", DOCS)))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "name": "projects/test-project/databases/(default)/documents/videoJobs/op-1",
            "fields": {},
            "updateTime": "2025-01-01T00:00:00.000001Z"
        })))
        .mount(&server)
        .await;

    let doc = client(&server).get_document("videoJobs", "op-1").await.unwrap();
    assert_eq!(doc.unwrap().id(), Some("op-1"));
}

#[tokio::test]
async fn test_stale_update_time_maps_to_precondition_failed() {
    let server = MockServer::start().await;
    Mock::given(method("PATCH"))
        .and(path(format!("{}/sessions/s1", DOCS)))
        .and(query_param("currentDocument.updateTime", "2025-01-01T00:00:00Z"))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({
            "error": {"code": 400, "status": "FAILED_PRECONDITION", "message": "stale"}
        })))
        .expect(1)
        .mount(&server)
        .await;

    let err = client(&server)
        .update_document(
            "sessions",
            "s1",
            Default::default(),
            None,
            Some("2025-01-01T00:00:00Z"),
        )
        .await
        .unwrap_err();
    assert!(err.is_precondition_failed());
}

#[tokio::test]
async fn test_create_conflict_is_already_exists() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(format!("{}/handoffs", DOCS)))
        .respond_with(ResponseTemplate::new(409))
        .mount(&server)
        .await;

    let err = client(&server)
        .create_document("handoffs", "s1_v0001", Default::default())
        .await
        .unwrap_err();
    assert!(matches!(err, FirestoreError::AlreadyExists(_)));
}

// =============================================================================
// Repositories over HTTP
// =============================================================================

#[tokio::test]
async fn test_session_repository_decodes_document() {
    let server = MockServer::start().await;
    let session = Session::new("sneakers", Locale::Ja, chrono::Duration::hours(24));

    Mock::given(method("GET"))
        .and(path(format!("{}/sessions/{}", DOCS, session.id)))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "name": format!("projects/test-project/databases/(default)/documents/sessions/{}", session.id),
            "fields": {
                "id": {"stringValue": session.id},
                "prompt": {"stringValue": "sneakers"},
                "status": {"stringValue": "analyzing"},
                "chatHistory": {"arrayValue": {}},
                "locale": {"stringValue": "ja"},
                "createdAt": {"timestampValue": "2025-01-01T00:00:00Z"},
                "updatedAt": {"timestampValue": "2025-01-01T00:05:00.250Z"},
                "expiresAt": {"timestampValue": "2025-01-02T00:00:00Z"}
            },
            "updateTime": "2025-01-01T00:05:00.250001Z"
        })))
        .mount(&server)
        .await;

    let repo = SessionRepository::new(client(&server));
    let read = repo.get_session(&session.id).await.unwrap().unwrap();
    assert_eq!(read.revision, "2025-01-01T00:05:00.250001Z");
    assert_eq!(read.value.status, adreel_models::SessionStatus::Analyzing);
    assert_eq!(read.value.locale, Locale::Ja);
    assert!(read.value.chat_history.is_empty());
}

#[tokio::test]
async fn test_job_counts_use_aggregation_queries() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(format!("{}:runAggregationQuery", DOCS)))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            {"result": {"aggregateFields": {"count": {"integerValue": "3"}}}, "readTime": "2025-01-01T00:00:00Z"}
        ])))
        .expect(4)
        .mount(&server)
        .await;

    let repo = VideoJobRepository::new(client(&server));
    let counts = repo.count_jobs_by_status().await.unwrap();
    assert_eq!(counts[&JobStatus::Completed], 3);
    assert_eq!(counts.len(), 4);
}

fn job_document(id: &str, updated_at: &str, decodable: bool) -> serde_json::Value {
    let mut fields = json!({
        "id": {"stringValue": id},
        "sessionId": {"stringValue": "session-1"},
        "prompt": {"stringValue": "mountain lake"},
        "status": {"stringValue": "completed"},
        "progress": {"integerValue": "100"},
        "veoJobId": {"stringValue": format!("operations/{}", id)},
        "estimatedCost": {"doubleValue": 1.5},
        "durationSecs": {"integerValue": "15"},
        "aspectRatio": {"stringValue": "16:9"},
        "createdAt": {"timestampValue": "2025-01-01T00:00:00Z"},
        "updatedAt": {"timestampValue": updated_at}
    });
    if !decodable {
        fields.as_object_mut().unwrap().remove("prompt");
    }
    json!({
        "document": {
            "name": format!("projects/test-project/databases/(default)/documents/videoJobs/{}", id),
            "fields": fields,
            "updateTime": updated_at
        },
        "readTime": "2025-01-01T01:00:00Z"
    })
}

#[tokio::test]
async fn test_undecodable_job_does_not_end_gallery_pagination() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(format!("{}:runQuery", DOCS)))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            job_document("op-00000003", "2025-01-01T00:30:00Z", true),
            job_document("op-00000002", "2025-01-01T00:20:00Z", false),
            job_document("op-00000001", "2025-01-01T00:10:00Z", true)
        ])))
        .mount(&server)
        .await;

    let repo = VideoJobRepository::new(client(&server));
    let page = repo.list_completed_jobs(2, None).await.unwrap();

    assert_eq!(page.items.len(), 1);
    assert_eq!(page.items[0].id.as_str(), "op-00000003");
    let cursor = page.next_cursor.expect("another page exists");
    assert_eq!(cursor.id, "op-00000002");
    assert_eq!(cursor.updated_at.to_rfc3339(), "2025-01-01T00:20:00+00:00");
}

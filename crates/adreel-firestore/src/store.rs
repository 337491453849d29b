//! Persistence traits.
//!
//! The API layer depends on these traits only, so the same services run
//! against Firestore in production and [`crate::MemoryStore`] in tests and
//! local development.
//!
//! Writes that mutate an existing document take the `revision` obtained from
//! the read; a concurrent writer makes the write fail with
//! [`FirestoreError::PreconditionFailed`].

use std::collections::HashMap;

use async_trait::async_trait;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::{DateTime, Utc};

use adreel_models::{CostEntry, HandoffPayload, JobStatus, Session, VideoJob};

use crate::error::{FirestoreError, FirestoreResult};

pub const SESSIONS: &str = "sessions";
pub const VIDEO_JOBS: &str = "videoJobs";
pub const HANDOFFS: &str = "handoffs";
pub const COST_LEDGER: &str = "costLedger";
pub const BUDGET_RESETS: &str = "budgetResets";

/// A value together with its optimistic-concurrency token.
#[derive(Debug, Clone, PartialEq)]
pub struct Versioned<T> {
    pub value: T,
    pub revision: String,
}

/// One page of a keyset-paginated listing.
#[derive(Debug, Clone)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub next_cursor: Option<PageCursor>,
}

/// Position after the last item of a page ordered by `(updated_at, id)` descending.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageCursor {
    pub updated_at: DateTime<Utc>,
    pub id: String,
}

impl PageCursor {
    pub fn encode(&self) -> String {
        URL_SAFE_NO_PAD.encode(format!("{}|{}", self.updated_at.to_rfc3339(), self.id))
    }

    pub fn decode(raw: &str) -> FirestoreResult<Self> {
        let invalid = || FirestoreError::request_failed(format!("invalid cursor: {}", raw));
        let bytes = URL_SAFE_NO_PAD.decode(raw).map_err(|_| invalid())?;
        let text = String::from_utf8(bytes).map_err(|_| invalid())?;
        let (ts, id) = text.split_once('|').ok_or_else(invalid)?;
        let updated_at = DateTime::parse_from_rfc3339(ts)
            .map_err(|_| invalid())?
            .with_timezone(&Utc);
        if id.is_empty() {
            return Err(invalid());
        }
        Ok(Self {
            updated_at,
            id: id.to_string(),
        })
    }
}

#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn create_session(&self, session: &Session) -> FirestoreResult<()>;

    async fn get_session(&self, id: &str) -> FirestoreResult<Option<Versioned<Session>>>;

    /// Overwrite a session read at `revision`; returns the new revision.
    async fn update_session(&self, session: &Session, revision: &str) -> FirestoreResult<String>;

    async fn delete_sessions(&self, ids: &[String]) -> FirestoreResult<()>;

    /// Ids of sessions whose `expiresAt` is before `now`.
    async fn list_expired_sessions(&self, now: DateTime<Utc>, limit: u32) -> FirestoreResult<Vec<String>>;
}

#[async_trait]
pub trait JobStore: Send + Sync {
    async fn create_job(&self, job: &VideoJob) -> FirestoreResult<()>;

    async fn get_job(&self, id: &str) -> FirestoreResult<Option<Versioned<VideoJob>>>;

    async fn update_job(&self, job: &VideoJob, revision: &str) -> FirestoreResult<String>;

    /// Completed jobs, most recently updated first.
    async fn list_completed_jobs(
        &self,
        limit: u32,
        cursor: Option<&PageCursor>,
    ) -> FirestoreResult<Page<VideoJob>>;

    async fn count_jobs_by_status(&self) -> FirestoreResult<HashMap<JobStatus, u64>>;
}

#[async_trait]
pub trait HandoffStore: Send + Sync {
    /// Append a handoff. Fails with `AlreadyExists` if the session already
    /// has a handoff with the same version; records are never overwritten.
    async fn append_handoff(&self, handoff: &HandoffPayload) -> FirestoreResult<()>;

    /// All handoffs of a session ordered by version.
    async fn list_handoffs(&self, session_id: &str) -> FirestoreResult<Vec<HandoffPayload>>;

    async fn get_handoff(&self, handoff_id: &str) -> FirestoreResult<Option<HandoffPayload>>;
}

#[async_trait]
pub trait CostLedger: Send + Sync {
    async fn record_cost(&self, entry: &CostEntry) -> FirestoreResult<()>;

    /// Sum of the amounts recorded after `since`, or of every entry.
    async fn total_spend(&self, since: Option<DateTime<Utc>>) -> FirestoreResult<f64>;

    /// Persist an admin budget reset taking effect at `at`.
    async fn record_reset(&self, at: DateTime<Utc>) -> FirestoreResult<()>;

    /// Most recent persisted reset.
    async fn last_reset(&self) -> FirestoreResult<Option<DateTime<Utc>>>;
}

/// Document id of a handoff: unique per (session, version).
pub fn handoff_doc_id(session_id: &str, version: u32) -> String {
    format!("{}_v{:04}", session_id, version)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cursor_roundtrip_and_rejects_garbage() {
        let cursor = PageCursor {
            updated_at: DateTime::parse_from_rfc3339("2025-03-01T10:00:00Z")
                .unwrap()
                .with_timezone(&Utc),
            id: "op-123".into(),
        };
        assert_eq!(PageCursor::decode(&cursor.encode()).unwrap(), cursor);
        assert!(PageCursor::decode("not base64 !").is_err());
        assert!(PageCursor::decode(&URL_SAFE_NO_PAD.encode("no-separator")).is_err());
    }

    #[test]
    fn test_handoff_doc_id_orders_by_version() {
        assert!(handoff_doc_id("s", 2) < handoff_doc_id("s", 10));
    }
}

//! In-memory store with the same semantics as the Firestore repositories.
//!
//! Used for local development (`STORE_BACKEND=memory`) and tests. Revisions
//! are a process-wide counter, so a stale revision fails exactly like a
//! stale Firestore `updateTime`.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use adreel_models::{CostEntry, HandoffPayload, JobStatus, Session, VideoJob};

use crate::error::{FirestoreError, FirestoreResult};
use crate::store::{
    CostLedger, HandoffStore, JobStore, Page, PageCursor, SessionStore, Versioned, COST_LEDGER,
    HANDOFFS, SESSIONS, VIDEO_JOBS,
};

#[derive(Default)]
pub struct MemoryStore {
    sessions: RwLock<HashMap<String, (Session, u64)>>,
    jobs: RwLock<HashMap<String, (VideoJob, u64)>>,
    handoffs: RwLock<Vec<HandoffPayload>>,
    ledger: RwLock<Vec<CostEntry>>,
    resets: RwLock<Vec<DateTime<Utc>>>,
    revision: AtomicU64,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn next_revision(&self) -> u64 {
        self.revision.fetch_add(1, Ordering::SeqCst) + 1
    }

    fn check_revision(stored: u64, revision: &str, path: String) -> FirestoreResult<()> {
        if revision.parse::<u64>().ok() != Some(stored) {
            return Err(FirestoreError::PreconditionFailed(format!(
                "{} changed since revision {}",
                path, revision
            )));
        }
        Ok(())
    }

    /// Number of ledger entries, for assertions.
    pub async fn ledger_len(&self) -> usize {
        self.ledger.read().await.len()
    }
}

#[async_trait]
impl SessionStore for MemoryStore {
    async fn create_session(&self, session: &Session) -> FirestoreResult<()> {
        let mut sessions = self.sessions.write().await;
        if sessions.contains_key(&session.id) {
            return Err(FirestoreError::AlreadyExists(format!("{}/{}", SESSIONS, session.id)));
        }
        let rev = self.next_revision();
        sessions.insert(session.id.clone(), (session.clone(), rev));
        Ok(())
    }

    async fn get_session(&self, id: &str) -> FirestoreResult<Option<Versioned<Session>>> {
        Ok(self.sessions.read().await.get(id).map(|(s, rev)| Versioned {
            value: s.clone(),
            revision: rev.to_string(),
        }))
    }

    async fn update_session(&self, session: &Session, revision: &str) -> FirestoreResult<String> {
        let mut sessions = self.sessions.write().await;
        let path = format!("{}/{}", SESSIONS, session.id);
        let (stored, stored_rev) = sessions
            .get_mut(&session.id)
            .ok_or_else(|| FirestoreError::not_found(path.clone()))?;
        Self::check_revision(*stored_rev, revision, path)?;
        *stored = session.clone();
        *stored_rev = self.next_revision();
        Ok(stored_rev.to_string())
    }

    async fn delete_sessions(&self, ids: &[String]) -> FirestoreResult<()> {
        let mut sessions = self.sessions.write().await;
        for id in ids {
            sessions.remove(id);
        }
        Ok(())
    }

    async fn list_expired_sessions(&self, now: DateTime<Utc>, limit: u32) -> FirestoreResult<Vec<String>> {
        Ok(self
            .sessions
            .read()
            .await
            .values()
            .filter(|(s, _)| s.expires_at < now)
            .take(limit as usize)
            .map(|(s, _)| s.id.clone())
            .collect())
    }
}

#[async_trait]
impl JobStore for MemoryStore {
    async fn create_job(&self, job: &VideoJob) -> FirestoreResult<()> {
        let mut jobs = self.jobs.write().await;
        if jobs.contains_key(job.id.as_str()) {
            return Err(FirestoreError::AlreadyExists(format!("{}/{}", VIDEO_JOBS, job.id)));
        }
        let rev = self.next_revision();
        jobs.insert(job.id.to_string(), (job.clone(), rev));
        Ok(())
    }

    async fn get_job(&self, id: &str) -> FirestoreResult<Option<Versioned<VideoJob>>> {
        Ok(self.jobs.read().await.get(id).map(|(j, rev)| Versioned {
            value: j.clone(),
            revision: rev.to_string(),
        }))
    }

    async fn update_job(&self, job: &VideoJob, revision: &str) -> FirestoreResult<String> {
        let mut jobs = self.jobs.write().await;
        let path = format!("{}/{}", VIDEO_JOBS, job.id);
        let (stored, stored_rev) = jobs
            .get_mut(job.id.as_str())
            .ok_or_else(|| FirestoreError::not_found(path.clone()))?;
        Self::check_revision(*stored_rev, revision, path)?;
        *stored = job.clone();
        *stored_rev = self.next_revision();
        Ok(stored_rev.to_string())
    }

    async fn list_completed_jobs(
        &self,
        limit: u32,
        cursor: Option<&PageCursor>,
    ) -> FirestoreResult<Page<VideoJob>> {
        let jobs = self.jobs.read().await;
        let mut completed: Vec<&VideoJob> = jobs
            .values()
            .map(|(j, _)| j)
            .filter(|j| j.status == JobStatus::Completed)
            .filter(|j| match cursor {
                Some(c) => (j.updated_at, j.id.as_str()) < (c.updated_at, c.id.as_str()),
                None => true,
            })
            .collect();
        completed.sort_by(|a, b| {
            (b.updated_at, b.id.as_str()).cmp(&(a.updated_at, a.id.as_str()))
        });

        let has_more = completed.len() > limit as usize;
        let items: Vec<VideoJob> = completed
            .into_iter()
            .take(limit as usize)
            .cloned()
            .collect();
        let next_cursor = if has_more {
            items.last().map(|j| PageCursor {
                updated_at: j.updated_at,
                id: j.id.to_string(),
            })
        } else {
            None
        };
        Ok(Page { items, next_cursor })
    }

    async fn count_jobs_by_status(&self) -> FirestoreResult<HashMap<JobStatus, u64>> {
        let mut counts = HashMap::new();
        for (job, _) in self.jobs.read().await.values() {
            *counts.entry(job.status).or_insert(0) += 1;
        }
        Ok(counts)
    }
}

#[async_trait]
impl HandoffStore for MemoryStore {
    async fn append_handoff(&self, handoff: &HandoffPayload) -> FirestoreResult<()> {
        let mut handoffs = self.handoffs.write().await;
        let duplicate = handoffs.iter().any(|h| {
            h.handoff_id == handoff.handoff_id
                || (h.session_id == handoff.session_id && h.version == handoff.version)
        });
        if duplicate {
            return Err(FirestoreError::AlreadyExists(format!(
                "{}/{}",
                HANDOFFS, handoff.handoff_id
            )));
        }
        handoffs.push(handoff.clone());
        Ok(())
    }

    async fn list_handoffs(&self, session_id: &str) -> FirestoreResult<Vec<HandoffPayload>> {
        let mut list: Vec<HandoffPayload> = self
            .handoffs
            .read()
            .await
            .iter()
            .filter(|h| h.session_id == session_id)
            .cloned()
            .collect();
        list.sort_by_key(|h| h.version);
        Ok(list)
    }

    async fn get_handoff(&self, handoff_id: &str) -> FirestoreResult<Option<HandoffPayload>> {
        Ok(self
            .handoffs
            .read()
            .await
            .iter()
            .find(|h| h.handoff_id == handoff_id)
            .cloned())
    }
}

#[async_trait]
impl CostLedger for MemoryStore {
    async fn record_cost(&self, entry: &CostEntry) -> FirestoreResult<()> {
        let mut ledger = self.ledger.write().await;
        if ledger.iter().any(|e| e.id == entry.id) {
            return Err(FirestoreError::AlreadyExists(format!("{}/{}", COST_LEDGER, entry.id)));
        }
        ledger.push(entry.clone());
        Ok(())
    }

    async fn total_spend(&self, since: Option<DateTime<Utc>>) -> FirestoreResult<f64> {
        Ok(self
            .ledger
            .read()
            .await
            .iter()
            .filter(|e| since.map_or(true, |t| e.timestamp > t))
            .map(|e| e.amount)
            .sum())
    }

    async fn record_reset(&self, at: DateTime<Utc>) -> FirestoreResult<()> {
        self.resets.write().await.push(at);
        Ok(())
    }

    async fn last_reset(&self) -> FirestoreResult<Option<DateTime<Utc>>> {
        Ok(self.resets.read().await.iter().max().copied())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use adreel_models::{JobId, Locale};
    use chrono::Duration;

    fn job(id: &str, status: JobStatus, minutes_ago: i64) -> VideoJob {
        let mut job = VideoJob::new(JobId::from_string(id), "s1", "prompt", id, 1.0);
        job.status = status;
        job.updated_at = Utc::now() - Duration::minutes(minutes_ago);
        job
    }

    #[tokio::test]
    async fn test_stale_revision_is_rejected() {
        let store = MemoryStore::new();
        let session = Session::new("p", Locale::En, Duration::hours(24));
        store.create_session(&session).await.unwrap();

        let read = store.get_session(&session.id).await.unwrap().unwrap();
        let new_rev = store.update_session(&read.value, &read.revision).await.unwrap();
        assert_ne!(new_rev, read.revision);

        let err = store
            .update_session(&read.value, &read.revision)
            .await
            .unwrap_err();
        assert!(err.is_precondition_failed());
    }

    #[tokio::test]
    async fn test_completed_jobs_paginate_newest_first() {
        let store = MemoryStore::new();
        for (id, mins) in [("a", 30), ("b", 20), ("c", 10)] {
            store.create_job(&job(id, JobStatus::Completed, mins)).await.unwrap();
        }
        store.create_job(&job("d", JobStatus::Processing, 0)).await.unwrap();

        let first = store.list_completed_jobs(2, None).await.unwrap();
        let ids: Vec<_> = first.items.iter().map(|j| j.id.to_string()).collect();
        assert_eq!(ids, vec!["c", "b"]);

        let cursor = first.next_cursor.expect("second page");
        let second = store.list_completed_jobs(2, Some(&cursor)).await.unwrap();
        assert_eq!(second.items.len(), 1);
        assert_eq!(second.items[0].id.as_str(), "a");
        assert!(second.next_cursor.is_none());
    }

    #[tokio::test]
    async fn test_expired_sessions_listed() {
        let store = MemoryStore::new();
        let mut old = Session::new("", Locale::En, Duration::hours(1));
        old.expires_at = Utc::now() - Duration::minutes(1);
        let fresh = Session::new("", Locale::En, Duration::hours(1));
        store.create_session(&old).await.unwrap();
        store.create_session(&fresh).await.unwrap();

        let expired = store.list_expired_sessions(Utc::now(), 10).await.unwrap();
        assert_eq!(expired, vec![old.id.clone()]);

        store.delete_sessions(&expired).await.unwrap();
        assert!(store.get_session(&old.id).await.unwrap().is_none());
        assert!(store.get_session(&fresh.id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_ledger_totals() {
        let store = MemoryStore::new();
        store
            .record_cost(&CostEntry::new(adreel_models::ServiceKind::Veo, 1.5, "video", None))
            .await
            .unwrap();
        store
            .record_cost(&CostEntry::new(adreel_models::ServiceKind::GeminiText, 0.25, "chat", None))
            .await
            .unwrap();
        assert!((store.total_spend(None).await.unwrap() - 1.75).abs() < 1e-9);
        assert_eq!(store.ledger_len().await, 2);
    }

    #[tokio::test]
    async fn test_ledger_total_since_reset() {
        let store = MemoryStore::new();
        let mut before = CostEntry::new(adreel_models::ServiceKind::Veo, 9.0, "old video", None);
        before.timestamp = Utc::now() - Duration::minutes(5);
        store.record_cost(&before).await.unwrap();

        assert!(store.last_reset().await.unwrap().is_none());
        let reset_at = Utc::now() - Duration::minutes(1);
        store.record_reset(reset_at).await.unwrap();
        store
            .record_cost(&CostEntry::new(adreel_models::ServiceKind::GeminiText, 0.5, "chat", None))
            .await
            .unwrap();

        assert_eq!(store.last_reset().await.unwrap(), Some(reset_at));
        assert!((store.total_spend(Some(reset_at)).await.unwrap() - 0.5).abs() < 1e-9);
        assert!((store.total_spend(None).await.unwrap() - 9.5).abs() < 1e-9);
    }
}

//! Video job lifecycle.
//!
//! Jobs are created when a generation is submitted and reconciled with the
//! remote operation whenever a client polls. Polling never blocks on the
//! remote API being healthy: a failed poll returns the last persisted state.

use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, info, warn};

use adreel_firestore::{JobStore, Versioned};
use adreel_genai::VideoGenerator;
use adreel_models::{AspectRatio, JobId, JobStatus, VideoJob};

use crate::error::{ApiError, ApiResult, ErrorCode};
use crate::metrics;
use crate::services::events::JobEventBus;
use crate::services::session::SessionService;

/// Attempts to persist a cancellation that races with other writers.
const MAX_CANCEL_ATTEMPTS: u32 = 3;

#[derive(Clone)]
pub struct JobTracker {
    jobs: Arc<dyn JobStore>,
    video: Arc<dyn VideoGenerator>,
    sessions: SessionService,
    events: JobEventBus,
    max_age: chrono::Duration,
}

impl JobTracker {
    pub fn new(
        jobs: Arc<dyn JobStore>,
        video: Arc<dyn VideoGenerator>,
        sessions: SessionService,
        events: JobEventBus,
        max_age: chrono::Duration,
    ) -> Self {
        Self {
            jobs,
            video,
            sessions,
            events,
            max_age,
        }
    }

    /// Persist a new `pending` job for a submitted operation.
    pub async fn create_job(
        &self,
        session_id: &str,
        prompt: &str,
        operation_name: &str,
        estimated_cost: f64,
        duration_secs: u32,
        aspect_ratio: AspectRatio,
    ) -> ApiResult<JobId> {
        if session_id.trim().is_empty() {
            return Err(ApiError::validation("sessionId is required"));
        }

        let job_id = JobId::from_operation_name(operation_name);
        let job = VideoJob::new(job_id.clone(), session_id, prompt, operation_name, estimated_cost)
            .with_output(duration_secs, aspect_ratio);
        self.jobs.create_job(&job).await?;

        metrics::record_job_submitted(duration_secs);
        self.events.publish(&job);
        info!(job_id = %job_id, session_id, estimated_cost, "Created video job");
        Ok(job_id)
    }

    async fn load(&self, job_id: &str) -> ApiResult<Versioned<VideoJob>> {
        self.jobs
            .get_job(job_id)
            .await?
            .ok_or_else(|| ApiError::new(ErrorCode::JobNotFound, format!("job {} not found", job_id)))
    }

    fn ensure_not_expired(&self, job: &VideoJob) -> ApiResult<()> {
        if job.is_expired_at(Utc::now(), self.max_age) {
            return Err(ApiError::new(
                ErrorCode::JobExpired,
                format!("job {} is older than {} hours", job.id, self.max_age.num_hours()),
            ));
        }
        Ok(())
    }

    /// Current state of a job, reconciled with the remote operation.
    pub async fn get_status(&self, job_id: &str) -> ApiResult<VideoJob> {
        let Versioned { value: job, revision } = self.load(job_id).await?;
        self.ensure_not_expired(&job)?;

        if job.is_terminal() {
            return Ok(job);
        }

        let remote = match self.video.poll(&job.veo_job_id).await {
            Ok(remote) => remote,
            Err(e) => {
                metrics::record_remote_poll_failure();
                warn!(job_id, "Remote status check failed, returning stored status: {}", e);
                return Ok(job);
            }
        };

        let mut updated = job.clone();
        match updated.apply_remote(&remote, Utc::now()) {
            Ok(true) => {}
            Ok(false) => return Ok(job),
            Err(e) => {
                warn!(job_id, "Ignoring remote state: {}", e);
                return Ok(job);
            }
        }

        match self.jobs.update_job(&updated, &revision).await {
            Ok(_) => {}
            Err(e) if e.is_precondition_failed() => {
                debug!(job_id, "Concurrent job update, returning the stored state");
                return Ok(self.load(job_id).await?.value);
            }
            Err(e) => return Err(e.into()),
        }

        self.events.publish(&updated);
        if updated.status != job.status {
            info!(
                job_id,
                from = %job.status,
                to = %updated.status,
                progress = updated.progress,
                "Job status changed"
            );
            if updated.is_terminal() {
                metrics::record_job_finished(updated.status);
            }
            if updated.status == JobStatus::Completed {
                self.sessions.mark_completed(&updated.session_id).await;
            }
        }

        Ok(updated)
    }

    /// Cancel a running job. Returns `false` when it had already finished.
    pub async fn cancel(&self, job_id: &str) -> ApiResult<bool> {
        let Versioned { value: job, mut revision } = self.load(job_id).await?;
        self.ensure_not_expired(&job)?;
        if !job.status.can_cancel() {
            return Ok(false);
        }

        if let Err(e) = self.video.cancel(&job.veo_job_id).await {
            warn!(job_id, "Remote cancellation failed, marking job cancelled anyway: {}", e);
        }

        let mut current = job;
        for _ in 0..MAX_CANCEL_ATTEMPTS {
            let mut cancelled = current.clone();
            if !cancelled.cancel(Utc::now()) {
                return Ok(false);
            }

            match self.jobs.update_job(&cancelled, &revision).await {
                Ok(_) => {
                    metrics::record_job_cancelled();
                    self.events.publish(&cancelled);
                    info!(job_id, "Job cancelled");
                    return Ok(true);
                }
                Err(e) if e.is_precondition_failed() => {
                    let latest = self.load(job_id).await?;
                    current = latest.value;
                    revision = latest.revision;
                }
                Err(e) => {
                    return Err(ApiError::new(
                        ErrorCode::CancellationFailed,
                        format!("failed to persist cancellation: {}", e),
                    ));
                }
            }
        }

        Err(ApiError::new(
            ErrorCode::CancellationFailed,
            format!("job {} kept changing during cancellation", job_id),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    use async_trait::async_trait;
    use adreel_firestore::MemoryStore;
    use adreel_genai::{ChatRefinement, CreativeModel, GenAiError, GenAiResult, ProductInput, RefineRequest, VideoRequest};
    use adreel_models::{BudgetThresholds, Locale, ProductAnalysis, RemoteJobState, Strategy};

    use crate::services::budget::BudgetTracker;

    const OP: &str = "projects/p/locations/us-central1/publishers/google/models/veo/operations/op-00000001";

    /// Scripted remote: each poll pops the next state, the last one repeats.
    #[derive(Default)]
    struct ScriptedVideo {
        states: Mutex<Vec<GenAiResult<RemoteJobState>>>,
    }

    impl ScriptedVideo {
        fn push(&self, state: GenAiResult<RemoteJobState>) {
            self.states.lock().unwrap().push(state);
        }
    }

    #[async_trait]
    impl VideoGenerator for ScriptedVideo {
        async fn submit(&self, _request: &VideoRequest) -> GenAiResult<String> {
            Ok(OP.to_string())
        }

        async fn poll(&self, _operation_name: &str) -> GenAiResult<RemoteJobState> {
            let mut states = self.states.lock().unwrap();
            if states.len() > 1 {
                return states.remove(0);
            }
            match states.first() {
                Some(Ok(s)) => Ok(s.clone()),
                Some(Err(_)) | None => Err(GenAiError::invalid_response("unavailable")),
            }
        }

        async fn cancel(&self, _operation_name: &str) -> GenAiResult<()> {
            Err(GenAiError::invalid_response("cancel not supported"))
        }
    }

    struct NoCreative;

    #[async_trait]
    impl CreativeModel for NoCreative {
        async fn analyze_product(&self, _: &ProductInput, _: Locale) -> GenAiResult<ProductAnalysis> {
            Err(GenAiError::config("unused"))
        }
        async fn refine_prompt(&self, _: &RefineRequest) -> GenAiResult<ChatRefinement> {
            Err(GenAiError::config("unused"))
        }
        async fn generate_strategy(&self, _: &ProductAnalysis, _: &str, _: Locale) -> GenAiResult<Strategy> {
            Err(GenAiError::config("unused"))
        }
    }

    fn processing(progress: u8) -> GenAiResult<RemoteJobState> {
        Ok(RemoteJobState {
            status: JobStatus::Processing,
            progress: Some(progress),
            ..Default::default()
        })
    }

    fn tracker(store: Arc<MemoryStore>, video: Arc<ScriptedVideo>) -> JobTracker {
        let budget = BudgetTracker::new(300.0, BudgetThresholds::default(), store.clone());
        let sessions = SessionService::new(store.clone(), Arc::new(NoCreative), budget, chrono::Duration::hours(24));
        JobTracker::new(store, video, sessions, JobEventBus::default(), chrono::Duration::hours(24))
    }

    async fn setup() -> (JobTracker, Arc<MemoryStore>, Arc<ScriptedVideo>, JobId) {
        let store = Arc::new(MemoryStore::new());
        let video = Arc::new(ScriptedVideo::default());
        let t = tracker(store.clone(), video.clone());
        let id = t
            .create_job("session-1", "mountain lake", OP, 1.5, 15, AspectRatio::Landscape)
            .await
            .unwrap();
        (t, store, video, id)
    }

    #[tokio::test]
    async fn test_create_requires_session() {
        let (t, _, _, id) = setup().await;
        assert_eq!(id.as_str(), "op-00000001");

        let err = t
            .create_job("  ", "p", OP, 1.0, 8, AspectRatio::Square)
            .await
            .unwrap_err();
        assert_eq!(err.code(), ErrorCode::ValidationError);
    }

    #[tokio::test]
    async fn test_progress_never_decreases() {
        let (t, _, video, id) = setup().await;
        video.push(processing(40));
        video.push(processing(25));
        video.push(processing(60));

        assert_eq!(t.get_status(id.as_str()).await.unwrap().progress, 40);
        assert_eq!(t.get_status(id.as_str()).await.unwrap().progress, 40);
        assert_eq!(t.get_status(id.as_str()).await.unwrap().progress, 60);
    }

    #[tokio::test]
    async fn test_status_is_idempotent_without_remote_change() {
        let (t, store, video, id) = setup().await;
        video.push(processing(30));

        let first = t.get_status(id.as_str()).await.unwrap();
        let rev = store.get_job(id.as_str()).await.unwrap().unwrap().revision;
        let second = t.get_status(id.as_str()).await.unwrap();

        assert_eq!(first, second);
        assert_eq!(store.get_job(id.as_str()).await.unwrap().unwrap().revision, rev);
    }

    #[tokio::test]
    async fn test_remote_failure_returns_stored_state() {
        let (t, _, video, id) = setup().await;
        video.push(Err(GenAiError::invalid_response("boom")));

        let job = t.get_status(id.as_str()).await.unwrap();
        assert_eq!(job.status, JobStatus::Pending);
    }

    #[tokio::test]
    async fn test_expired_job() {
        let (t, store, _, _) = setup().await;
        let mut old = VideoJob::new(JobId::from_string("op-old-0001"), "s", "p", "ops/op-old-0001", 0.8);
        old.created_at = Utc::now() - chrono::Duration::hours(25);
        store.create_job(&old).await.unwrap();

        let err = t.get_status("op-old-0001").await.unwrap_err();
        assert_eq!(err.code(), ErrorCode::JobExpired);
    }

    #[tokio::test]
    async fn test_cancel_refuses_expired_job() {
        let (t, store, _, _) = setup().await;
        let mut old = VideoJob::new(JobId::from_string("op-old-0002"), "s", "p", "ops/op-old-0002", 0.8);
        old.created_at = Utc::now() - chrono::Duration::hours(25);
        store.create_job(&old).await.unwrap();

        let err = t.cancel("op-old-0002").await.unwrap_err();
        assert_eq!(err.code(), ErrorCode::JobExpired);

        let stored = store.get_job("op-old-0002").await.unwrap().unwrap().value;
        assert_eq!(stored.status, JobStatus::Pending);
    }

    #[tokio::test]
    async fn test_cancel_running_then_terminal() {
        let (t, _, video, id) = setup().await;
        video.push(processing(10));

        // Remote cancel fails, the job is still cancelled locally
        assert!(t.cancel(id.as_str()).await.unwrap());
        let job = t.get_status(id.as_str()).await.unwrap();
        assert!(job.is_cancelled());

        assert!(!t.cancel(id.as_str()).await.unwrap());
    }
}

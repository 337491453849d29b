//! Video generation jobs.
//!
//! A job mirrors one long-running operation on the external video API.
//! Lifecycle:
//!
//! ```text
//! pending -> processing -> completed | failed
//! pending | processing -> failed   (cancellation)
//! ```
//!
//! `completed` and `failed` are terminal.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Duration, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Error recorded on a job cancelled through the API.
pub const CANCELLED_BY_USER: &str = "cancelled by user";

/// Error recorded when the remote operation failed without a message.
const DEFAULT_FAILURE: &str = "video generation failed";

/// Unique identifier for a job.
///
/// Equal to the external operation id (last segment of the operation name).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(transparent)]
pub struct JobId(pub String);

impl JobId {
    /// Create from an existing string.
    pub fn from_string(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    /// Derive the job id from a full operation name such as
    /// `projects/p/locations/l/publishers/google/models/m/operations/<id>`.
    pub fn from_operation_name(name: &str) -> Self {
        let id = name.trim_end_matches('/').rsplit('/').next().unwrap_or(name);
        Self(id.to_string())
    }

    /// Get the inner string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for JobId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Job processing status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    /// Submitted, not yet observed running
    #[default]
    Pending,
    /// Remote operation is running
    Processing,
    /// Video is available
    Completed,
    /// Remote failure or cancellation
    Failed,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Processing => "processing",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
        }
    }

    /// Check if this is a terminal state (no more updates expected).
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }

    /// Cancellation is only meaningful while the operation may still run.
    pub fn can_cancel(&self) -> bool {
        matches!(self, JobStatus::Pending | JobStatus::Processing)
    }

    /// Whether `next` is reachable from `self` (staying put counts).
    pub fn can_transition_to(&self, next: JobStatus) -> bool {
        if *self == next {
            return true;
        }
        match self {
            JobStatus::Pending => true,
            JobStatus::Processing => next.is_terminal(),
            JobStatus::Completed | JobStatus::Failed => false,
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for JobStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(JobStatus::Pending),
            "processing" => Ok(JobStatus::Processing),
            "completed" => Ok(JobStatus::Completed),
            "failed" => Ok(JobStatus::Failed),
            other => Err(format!("unknown job status: {}", other)),
        }
    }
}

/// Output aspect ratio supported by the video model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema, Default)]
pub enum AspectRatio {
    #[default]
    #[serde(rename = "16:9")]
    Landscape,
    #[serde(rename = "9:16")]
    Portrait,
    #[serde(rename = "1:1")]
    Square,
}

impl AspectRatio {
    pub fn as_str(&self) -> &'static str {
        match self {
            AspectRatio::Landscape => "16:9",
            AspectRatio::Portrait => "9:16",
            AspectRatio::Square => "1:1",
        }
    }
}

impl FromStr for AspectRatio {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "16:9" => Ok(AspectRatio::Landscape),
            "9:16" => Ok(AspectRatio::Portrait),
            "1:1" => Ok(AspectRatio::Square),
            other => Err(format!("unsupported aspect ratio: {}", other)),
        }
    }
}

/// Snapshot of the remote operation as reported by the video API.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct RemoteJobState {
    pub status: JobStatus,
    pub progress: Option<u8>,
    pub video_url: Option<String>,
    pub thumbnail_url: Option<String>,
    pub error: Option<String>,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TransitionError {
    #[error("job {job_id} is already {status}")]
    Terminal { job_id: String, status: JobStatus },

    #[error("job {job_id} cannot move from {from} to {to}")]
    Invalid {
        job_id: String,
        from: JobStatus,
        to: JobStatus,
    },
}

/// A tracked video generation job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct VideoJob {
    pub id: JobId,
    /// Owning session (weak reference, may have expired).
    pub session_id: String,
    pub prompt: String,
    pub status: JobStatus,
    /// Progress percentage (0-100)
    pub progress: u8,
    /// Full external operation name.
    pub veo_job_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub video_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thumbnail_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Estimated cost in USD recorded at submission.
    pub estimated_cost: f64,
    pub duration_secs: u32,
    pub aspect_ratio: AspectRatio,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl VideoJob {
    /// Create a new job in `pending`.
    pub fn new(
        id: JobId,
        session_id: impl Into<String>,
        prompt: impl Into<String>,
        veo_job_id: impl Into<String>,
        estimated_cost: f64,
    ) -> Self {
        let now = Utc::now();
        Self {
            id,
            session_id: session_id.into(),
            prompt: prompt.into(),
            status: JobStatus::Pending,
            progress: 0,
            veo_job_id: veo_job_id.into(),
            video_url: None,
            thumbnail_url: None,
            error: None,
            estimated_cost,
            duration_secs: 0,
            aspect_ratio: AspectRatio::default(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Attach output parameters requested at submission.
    pub fn with_output(mut self, duration_secs: u32, aspect_ratio: AspectRatio) -> Self {
        self.duration_secs = duration_secs;
        self.aspect_ratio = aspect_ratio;
        self
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Jobs older than `max_age` are expired regardless of their status.
    pub fn is_expired_at(&self, now: DateTime<Utc>, max_age: Duration) -> bool {
        now - self.created_at > max_age
    }

    pub fn is_cancelled(&self) -> bool {
        self.status == JobStatus::Failed && self.error.as_deref() == Some(CANCELLED_BY_USER)
    }

    /// Reconcile with the remote operation.
    ///
    /// Returns `Ok(true)` when any persisted field changed. Progress never
    /// decreases; completion forces 100.
    pub fn apply_remote(
        &mut self,
        remote: &RemoteJobState,
        now: DateTime<Utc>,
    ) -> Result<bool, TransitionError> {
        if self.status.is_terminal() {
            if remote.status == self.status {
                return Ok(false);
            }
            return Err(TransitionError::Terminal {
                job_id: self.id.to_string(),
                status: self.status,
            });
        }
        if !self.status.can_transition_to(remote.status) {
            return Err(TransitionError::Invalid {
                job_id: self.id.to_string(),
                from: self.status,
                to: remote.status,
            });
        }

        let before = (
            self.status,
            self.progress,
            self.video_url.clone(),
            self.thumbnail_url.clone(),
            self.error.clone(),
        );

        match remote.status {
            JobStatus::Pending => {}
            JobStatus::Processing => {
                self.status = JobStatus::Processing;
                if let Some(p) = remote.progress {
                    // 100 is reserved for completion
                    self.progress = self.progress.max(p.min(99));
                }
            }
            JobStatus::Completed => {
                self.status = JobStatus::Completed;
                self.progress = 100;
                if remote.video_url.is_some() {
                    self.video_url = remote.video_url.clone();
                }
                if remote.thumbnail_url.is_some() {
                    self.thumbnail_url = remote.thumbnail_url.clone();
                }
            }
            JobStatus::Failed => {
                self.status = JobStatus::Failed;
                self.error = Some(
                    remote
                        .error
                        .clone()
                        .unwrap_or_else(|| DEFAULT_FAILURE.to_string()),
                );
            }
        }

        let after = (
            self.status,
            self.progress,
            self.video_url.clone(),
            self.thumbnail_url.clone(),
            self.error.clone(),
        );
        let changed = before != after;
        if changed {
            self.updated_at = now;
        }
        Ok(changed)
    }

    /// Mark the job as cancelled. Returns `false` if it was already terminal.
    pub fn cancel(&mut self, now: DateTime<Utc>) -> bool {
        if !self.status.can_cancel() {
            return false;
        }
        self.status = JobStatus::Failed;
        self.error = Some(CANCELLED_BY_USER.to_string());
        self.updated_at = now;
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn job() -> VideoJob {
        VideoJob::new(
            JobId::from_string("op-12345678"),
            "session-1",
            "mountain lake",
            "projects/p/locations/us-central1/operations/op-12345678",
            1.5,
        )
    }

    fn processing(progress: u8) -> RemoteJobState {
        RemoteJobState {
            status: JobStatus::Processing,
            progress: Some(progress),
            ..Default::default()
        }
    }

    #[test]
    fn test_job_id_from_operation_name() {
        let id = JobId::from_operation_name(
            "projects/p/locations/us-central1/publishers/google/models/veo/operations/abc-123",
        );
        assert_eq!(id.as_str(), "abc-123");
        assert_eq!(JobId::from_operation_name("plain").as_str(), "plain");
    }

    #[test]
    fn test_status_transitions() {
        assert!(JobStatus::Pending.can_transition_to(JobStatus::Processing));
        assert!(JobStatus::Pending.can_transition_to(JobStatus::Completed));
        assert!(JobStatus::Processing.can_transition_to(JobStatus::Failed));
        assert!(!JobStatus::Processing.can_transition_to(JobStatus::Pending));
        assert!(!JobStatus::Completed.can_transition_to(JobStatus::Failed));
        assert!(!JobStatus::Failed.can_transition_to(JobStatus::Processing));
    }

    #[test]
    fn test_progress_is_monotonic_while_processing() {
        let mut job = job();
        let now = Utc::now();

        assert!(job.apply_remote(&processing(40), now).unwrap());
        assert_eq!(job.progress, 40);

        // Lower remote progress is ignored
        assert!(!job.apply_remote(&processing(25), now).unwrap());
        assert_eq!(job.progress, 40);

        // 100 while still running is capped
        job.apply_remote(&processing(100), now).unwrap();
        assert_eq!(job.progress, 99);
        assert_eq!(job.status, JobStatus::Processing);
    }

    #[test]
    fn test_completion_sets_full_progress_and_url() {
        let mut job = job();
        let remote = RemoteJobState {
            status: JobStatus::Completed,
            video_url: Some("gs://bucket/video.mp4".into()),
            ..Default::default()
        };
        assert!(job.apply_remote(&remote, Utc::now()).unwrap());
        assert_eq!(job.progress, 100);
        assert_eq!(job.video_url.as_deref(), Some("gs://bucket/video.mp4"));
        assert!(job.is_terminal());
    }

    #[test]
    fn test_no_transition_out_of_terminal() {
        let mut job = job();
        job.apply_remote(
            &RemoteJobState {
                status: JobStatus::Completed,
                ..Default::default()
            },
            Utc::now(),
        )
        .unwrap();

        let err = job
            .apply_remote(
                &RemoteJobState {
                    status: JobStatus::Failed,
                    ..Default::default()
                },
                Utc::now(),
            )
            .unwrap_err();
        assert!(matches!(err, TransitionError::Terminal { .. }));
        assert_eq!(job.status, JobStatus::Completed);
    }

    #[test]
    fn test_remote_failure_without_message() {
        let mut job = job();
        job.apply_remote(
            &RemoteJobState {
                status: JobStatus::Failed,
                ..Default::default()
            },
            Utc::now(),
        )
        .unwrap();
        assert_eq!(job.error.as_deref(), Some(DEFAULT_FAILURE));
        assert!(!job.is_cancelled());
    }

    #[test]
    fn test_cancel_only_from_non_terminal() {
        let mut job = job();
        assert!(job.cancel(Utc::now()));
        assert!(job.is_cancelled());
        assert!(!job.cancel(Utc::now()));
    }

    #[test]
    fn test_expiry_ignores_status() {
        let mut job = job();
        job.status = JobStatus::Completed;
        job.created_at = Utc::now() - Duration::hours(25);
        assert!(job.is_expired_at(Utc::now(), Duration::hours(24)));

        job.created_at = Utc::now() - Duration::hours(23);
        assert!(!job.is_expired_at(Utc::now(), Duration::hours(24)));
    }

    #[test]
    fn test_aspect_ratio_serde() {
        let json = serde_json::to_string(&AspectRatio::Portrait).unwrap();
        assert_eq!(json, "\"9:16\"");
        assert_eq!("1:1".parse::<AspectRatio>().unwrap(), AspectRatio::Square);
        assert!("4:3".parse::<AspectRatio>().is_err());
    }
}

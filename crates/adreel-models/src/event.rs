//! Job events pushed to streaming clients.

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::job::{JobId, JobStatus, VideoJob};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct JobEvent {
    pub job_id: JobId,
    pub status: JobStatus,
    pub progress: u8,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub video_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Monotonic sequence number assigned by the publisher.
    pub seq: u64,
    pub timestamp: DateTime<Utc>,
}

impl JobEvent {
    pub fn from_job(job: &VideoJob, seq: u64) -> Self {
        Self {
            job_id: job.id.clone(),
            status: job.status,
            progress: job.progress,
            video_url: job.video_url.clone(),
            error: job.error.clone(),
            seq,
            timestamp: job.updated_at,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }
}

//! Job status polling, cancellation and streaming.

use std::time::Duration;

use axum::extract::{Path, State};
use axum::response::sse::{Event, KeepAlive, Sse};
use futures_util::stream::{self, Stream};
use serde::Serialize;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::broadcast::Receiver;
use tracing::{debug, info};

use adreel_models::{JobEvent, JobId, JobStatus, VideoJob};

use crate::error::{ApiError, ApiResult, ErrorCode};
use crate::messages::{current_locale, status_message};
use crate::response::{ok, ApiJson};
use crate::security::is_valid_job_id;
use crate::services::JobTracker;
use crate::state::AppState;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JobStatusResponse {
    pub job_id: JobId,
    pub status: JobStatus,
    pub progress: u8,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub video_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thumbnail_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub status_message: &'static str,
    pub updated_at: String,
}

impl From<VideoJob> for JobStatusResponse {
    fn from(job: VideoJob) -> Self {
        Self {
            status_message: status_message(job.status, current_locale()),
            job_id: job.id,
            status: job.status,
            progress: job.progress,
            video_url: job.video_url,
            thumbnail_url: job.thumbnail_url,
            error: job.error,
            updated_at: job.updated_at.to_rfc3339(),
        }
    }
}

fn check_job_id(job_id: &str) -> ApiResult<()> {
    if !is_valid_job_id(job_id) {
        return Err(ApiError::new(ErrorCode::InvalidJobId, "invalid job ID format"));
    }
    Ok(())
}

/// Poll a job.
pub async fn get_job_status(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> ApiResult<ApiJson<JobStatusResponse>> {
    check_job_id(&job_id)?;
    let job = state.tracker.get_status(&job_id).await?;
    Ok(ok(job.into()))
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CancelResponse {
    pub job_id: String,
    pub status: &'static str,
}

/// Cancel a pending or processing job.
pub async fn cancel_job(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> ApiResult<ApiJson<CancelResponse>> {
    check_job_id(&job_id)?;

    if !state.tracker.cancel(&job_id).await? {
        return Err(ApiError::new(
            ErrorCode::CannotCancel,
            format!("job {} has already finished", job_id),
        ));
    }

    info!(job_id = %job_id, "Cancellation requested");
    Ok(ok(CancelResponse {
        job_id,
        status: "cancelled",
    }))
}

struct StreamState {
    rx: Receiver<JobEvent>,
    tracker: JobTracker,
    job_id: String,
    poll: Duration,
    pending: Option<JobEvent>,
    last_seq: u64,
    done: bool,
}

fn sse_event(event: &JobEvent) -> Result<Event, axum::Error> {
    Event::default()
        .event("status")
        .id(event.seq.to_string())
        .json_data(event)
}

/// Server-sent job events.
///
/// Emits the current state first, then every transition. While idle the job
/// is re-polled so the stream also advances without other pollers. The
/// stream ends after a terminal event.
pub async fn stream_job_status(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> ApiResult<Sse<impl Stream<Item = Result<Event, axum::Error>>>> {
    check_job_id(&job_id)?;

    // Subscribe before reading so no transition is missed
    let rx = state.events.subscribe();
    let job = state.tracker.get_status(&job_id).await?;
    let first = state.events.snapshot(&job);

    let init = StreamState {
        rx,
        tracker: state.tracker.clone(),
        job_id,
        poll: state.config.status_stream_poll,
        last_seq: first.seq,
        pending: Some(first),
        done: false,
    };

    let stream = stream::unfold(init, |mut s| async move {
        if s.done {
            return None;
        }
        if let Some(event) = s.pending.take() {
            s.done = event.is_terminal();
            return Some((sse_event(&event), s));
        }

        loop {
            tokio::select! {
                received = s.rx.recv() => match received {
                    Ok(event) if event.job_id.as_str() == s.job_id && event.seq > s.last_seq => {
                        s.last_seq = event.seq;
                        s.done = event.is_terminal();
                        return Some((sse_event(&event), s));
                    }
                    Ok(_) => continue,
                    Err(RecvError::Lagged(skipped)) => {
                        debug!(job_id = %s.job_id, skipped, "Status stream lagged");
                        continue;
                    }
                    Err(RecvError::Closed) => return None,
                },
                _ = tokio::time::sleep(s.poll) => {
                    match s.tracker.get_status(&s.job_id).await {
                        // Transitions arrive through the channel
                        Ok(job) if !job.is_terminal() => continue,
                        Ok(job) => {
                            let event = JobEvent::from_job(&job, s.last_seq);
                            s.done = true;
                            return Some((sse_event(&event), s));
                        }
                        Err(e) => {
                            debug!(job_id = %s.job_id, "Ending status stream: {}", e);
                            s.done = true;
                            let event = Event::default()
                                .event("error")
                                .data(e.code().as_str());
                            return Some((Ok(event), s));
                        }
                    }
                }
            }
        }
    });

    Ok(Sse::new(stream).keep_alive(KeepAlive::default()))
}

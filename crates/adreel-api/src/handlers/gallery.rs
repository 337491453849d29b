//! Gallery of completed videos.

use axum::extract::{Path, Query, State};
use serde::{Deserialize, Serialize};

use adreel_firestore::PageCursor;
use adreel_models::{AspectRatio, JobId, JobStatus, VideoJob};

use crate::error::{ApiError, ApiResult, ErrorCode};
use crate::response::{ok, paginated, ApiJson, Pagination};
use crate::security::is_valid_job_id;
use crate::state::AppState;

const DEFAULT_PAGE_SIZE: u32 = 20;
const MAX_PAGE_SIZE: u32 = 50;

#[derive(Debug, Default, Deserialize)]
pub struct GalleryQuery {
    pub limit: Option<u32>,
    pub cursor: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GalleryVideo {
    pub job_id: JobId,
    pub session_id: String,
    pub prompt: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub video_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thumbnail_url: Option<String>,
    pub duration_secs: u32,
    pub aspect_ratio: AspectRatio,
    pub created_at: String,
    pub completed_at: String,
}

impl From<VideoJob> for GalleryVideo {
    fn from(job: VideoJob) -> Self {
        Self {
            job_id: job.id,
            session_id: job.session_id,
            prompt: job.prompt,
            video_url: job.video_url,
            thumbnail_url: job.thumbnail_url,
            duration_secs: job.duration_secs,
            aspect_ratio: job.aspect_ratio,
            created_at: job.created_at.to_rfc3339(),
            completed_at: job.updated_at.to_rfc3339(),
        }
    }
}

/// Completed videos, newest first, keyset-paginated.
pub async fn list_gallery_videos(
    State(state): State<AppState>,
    Query(query): Query<GalleryQuery>,
) -> ApiResult<ApiJson<Vec<GalleryVideo>>> {
    let limit = query.limit.unwrap_or(DEFAULT_PAGE_SIZE).clamp(1, MAX_PAGE_SIZE);
    let cursor = query
        .cursor
        .as_deref()
        .filter(|c| !c.is_empty())
        .map(PageCursor::decode)
        .transpose()
        .map_err(|_| ApiError::validation("invalid cursor"))?;

    let page = state.stores.jobs.list_completed_jobs(limit, cursor.as_ref()).await?;
    let videos: Vec<GalleryVideo> = page.items.into_iter().map(GalleryVideo::from).collect();

    let pagination = Pagination {
        limit,
        count: videos.len(),
        next_cursor: page.next_cursor.map(|c| c.encode()),
    };
    Ok(paginated(videos, pagination))
}

pub async fn get_gallery_video(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> ApiResult<ApiJson<GalleryVideo>> {
    if !is_valid_job_id(&job_id) {
        return Err(ApiError::new(ErrorCode::InvalidJobId, "invalid job ID format"));
    }

    let job = state
        .stores
        .jobs
        .get_job(&job_id)
        .await?
        .map(|v| v.value)
        .filter(|job| job.status == JobStatus::Completed)
        .ok_or_else(|| ApiError::new(ErrorCode::JobNotFound, format!("video {} not found", job_id)))?;

    Ok(ok(job.into()))
}

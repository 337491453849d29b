//! Video job repository for Firestore.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tracing::{info, warn};

use adreel_models::{JobStatus, VideoJob};

use crate::client::FirestoreClient;
use crate::error::FirestoreResult;
use crate::session_repo::revision_of;
use crate::store::{JobStore, Page, PageCursor, Versioned, VIDEO_JOBS};
use crate::types::{
    from_document, to_fields, Aggregation, Document, FromFirestoreValue, StructuredQuery,
    ToFirestoreValue, Value,
};

/// Repository for `videoJobs/{jobId}` documents.
#[derive(Clone)]
pub struct VideoJobRepository {
    client: FirestoreClient,
}

impl VideoJobRepository {
    pub fn new(client: FirestoreClient) -> Self {
        Self { client }
    }
}

fn job_to_fields(job: &VideoJob) -> FirestoreResult<HashMap<String, Value>> {
    let mut fields = to_fields(job)?;
    fields.insert("createdAt".to_string(), job.created_at.to_firestore_value());
    fields.insert("updatedAt".to_string(), job.updated_at.to_firestore_value());
    Ok(fields)
}

fn cursor_of(doc: &Document) -> Option<PageCursor> {
    let updated_at = doc
        .fields
        .as_ref()?
        .get("updatedAt")
        .and_then(DateTime::<Utc>::from_firestore_value)?;
    Some(PageCursor {
        updated_at,
        id: doc.id()?.to_string(),
    })
}

#[async_trait]
impl JobStore for VideoJobRepository {
    async fn create_job(&self, job: &VideoJob) -> FirestoreResult<()> {
        self.client
            .create_document(VIDEO_JOBS, job.id.as_str(), job_to_fields(job)?)
            .await?;
        info!(job_id = %job.id, session_id = %job.session_id, "Created video job");
        Ok(())
    }

    async fn get_job(&self, id: &str) -> FirestoreResult<Option<Versioned<VideoJob>>> {
        let Some(doc) = self.client.get_document(VIDEO_JOBS, id).await? else {
            return Ok(None);
        };
        Ok(Some(Versioned {
            value: from_document(&doc)?,
            revision: revision_of(&doc)?,
        }))
    }

    async fn update_job(&self, job: &VideoJob, revision: &str) -> FirestoreResult<String> {
        let doc = self
            .client
            .update_document(VIDEO_JOBS, job.id.as_str(), job_to_fields(job)?, None, Some(revision))
            .await?;
        revision_of(&doc)
    }

    async fn list_completed_jobs(
        &self,
        limit: u32,
        cursor: Option<&PageCursor>,
    ) -> FirestoreResult<Page<VideoJob>> {
        let mut query = StructuredQuery::collection(VIDEO_JOBS)
            .where_field("status", "EQUAL", JobStatus::Completed.as_str().to_firestore_value())
            .order_by("updatedAt", true)
            .order_by("__name__", true)
            // One extra row tells us whether another page exists
            .limit(limit + 1);
        if let Some(c) = cursor {
            query = query.start_after(vec![
                c.updated_at.to_firestore_value(),
                Value::ReferenceValue(self.client.full_document_name(VIDEO_JOBS, &c.id)),
            ]);
        }

        let docs = self.client.run_query(query).await?;
        let has_more = docs.len() > limit as usize;
        let page = &docs[..docs.len().min(limit as usize)];

        let mut items = Vec::with_capacity(page.len());
        for doc in page {
            match from_document::<VideoJob>(doc) {
                Ok(job) => items.push(job),
                Err(e) => warn!(doc = ?doc.name, "Skipping undecodable job document: {}", e),
            }
        }

        // Cursor from the raw row so an undecodable last row still advances
        let next_cursor = if has_more {
            page.last().and_then(cursor_of)
        } else {
            None
        };

        Ok(Page { items, next_cursor })
    }

    async fn count_jobs_by_status(&self) -> FirestoreResult<HashMap<JobStatus, u64>> {
        let mut counts = HashMap::new();
        for status in [
            JobStatus::Pending,
            JobStatus::Processing,
            JobStatus::Completed,
            JobStatus::Failed,
        ] {
            let query = StructuredQuery::collection(VIDEO_JOBS).where_field(
                "status",
                "EQUAL",
                status.as_str().to_firestore_value(),
            );
            let result = self
                .client
                .run_aggregation(query, vec![Aggregation::count("count")])
                .await?;
            let count = result
                .get("count")
                .and_then(i64::from_firestore_value)
                .unwrap_or(0);
            counts.insert(status, count.max(0) as u64);
        }
        Ok(counts)
    }
}

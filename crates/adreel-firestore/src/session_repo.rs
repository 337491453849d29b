//! Session repository for Firestore.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tracing::info;

use adreel_models::Session;

use crate::client::FirestoreClient;
use crate::error::{FirestoreError, FirestoreResult};
use crate::store::{SessionStore, Versioned, SESSIONS};
use crate::types::{from_document, to_fields, Document, StructuredQuery, ToFirestoreValue, Value, Write};

/// Repository for `sessions/{sessionId}` documents.
#[derive(Clone)]
pub struct SessionRepository {
    client: FirestoreClient,
}

impl SessionRepository {
    pub fn new(client: FirestoreClient) -> Self {
        Self { client }
    }
}

/// Timestamps are written as native values so `expiresAt` can be queried.
fn session_to_fields(session: &Session) -> FirestoreResult<HashMap<String, Value>> {
    let mut fields = to_fields(session)?;
    fields.insert("createdAt".to_string(), session.created_at.to_firestore_value());
    fields.insert("updatedAt".to_string(), session.updated_at.to_firestore_value());
    fields.insert("expiresAt".to_string(), session.expires_at.to_firestore_value());
    Ok(fields)
}

pub(crate) fn revision_of(doc: &Document) -> FirestoreResult<String> {
    doc.update_time
        .clone()
        .ok_or_else(|| FirestoreError::InvalidResponse("document has no updateTime".into()))
}

#[async_trait]
impl SessionStore for SessionRepository {
    async fn create_session(&self, session: &Session) -> FirestoreResult<()> {
        self.client
            .create_document(SESSIONS, &session.id, session_to_fields(session)?)
            .await?;
        info!(session_id = %session.id, "Created session");
        Ok(())
    }

    async fn get_session(&self, id: &str) -> FirestoreResult<Option<Versioned<Session>>> {
        let Some(doc) = self.client.get_document(SESSIONS, id).await? else {
            return Ok(None);
        };
        Ok(Some(Versioned {
            value: from_document(&doc)?,
            revision: revision_of(&doc)?,
        }))
    }

    async fn update_session(&self, session: &Session, revision: &str) -> FirestoreResult<String> {
        let doc = self
            .client
            .update_document(
                SESSIONS,
                &session.id,
                session_to_fields(session)?,
                None,
                Some(revision),
            )
            .await?;
        revision_of(&doc)
    }

    async fn delete_sessions(&self, ids: &[String]) -> FirestoreResult<()> {
        for chunk in ids.chunks(500) {
            let writes = chunk
                .iter()
                .map(|id| Write::delete(self.client.full_document_name(SESSIONS, id)))
                .collect();
            self.client.batch_write(writes).await?;
        }
        Ok(())
    }

    async fn list_expired_sessions(&self, now: DateTime<Utc>, limit: u32) -> FirestoreResult<Vec<String>> {
        let query = StructuredQuery::collection(SESSIONS)
            .where_field("expiresAt", "LESS_THAN", now.to_firestore_value())
            .select(&["__name__"])
            .limit(limit);

        let docs = self.client.run_query(query).await?;
        Ok(docs
            .iter()
            .filter_map(|d| d.id().map(str::to_string))
            .collect())
    }
}

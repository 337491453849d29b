//! Append-only handoff repository for Firestore.

use async_trait::async_trait;
use tracing::info;

use adreel_models::HandoffPayload;

use crate::client::FirestoreClient;
use crate::error::FirestoreResult;
use crate::store::{handoff_doc_id, HandoffStore, HANDOFFS};
use crate::types::{from_document, to_fields, StructuredQuery, ToFirestoreValue};

/// Repository for `handoffs/{sessionId}_v{version}` documents.
///
/// Documents are only ever created; the id scheme makes a duplicate version
/// for the same session fail at the store.
#[derive(Clone)]
pub struct HandoffRepository {
    client: FirestoreClient,
}

impl HandoffRepository {
    pub fn new(client: FirestoreClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl HandoffStore for HandoffRepository {
    async fn append_handoff(&self, handoff: &HandoffPayload) -> FirestoreResult<()> {
        let mut fields = to_fields(handoff)?;
        fields.insert("timestamp".to_string(), handoff.timestamp.to_firestore_value());

        let doc_id = handoff_doc_id(&handoff.session_id, handoff.version);
        self.client.create_document(HANDOFFS, &doc_id, fields).await?;

        info!(
            handoff_id = %handoff.handoff_id,
            session_id = %handoff.session_id,
            version = handoff.version,
            "Stored handoff {} -> {}",
            handoff.source_agent,
            handoff.target_agent
        );
        Ok(())
    }

    async fn list_handoffs(&self, session_id: &str) -> FirestoreResult<Vec<HandoffPayload>> {
        let query = StructuredQuery::collection(HANDOFFS)
            .where_field("sessionId", "EQUAL", session_id.to_firestore_value())
            .order_by("version", false);

        self.client
            .run_query(query)
            .await?
            .iter()
            .map(from_document)
            .collect()
    }

    async fn get_handoff(&self, handoff_id: &str) -> FirestoreResult<Option<HandoffPayload>> {
        let query = StructuredQuery::collection(HANDOFFS)
            .where_field("handoffId", "EQUAL", handoff_id.to_firestore_value())
            .limit(1);

        match self.client.run_query(query).await?.first() {
            Some(doc) => Ok(Some(from_document(doc)?)),
            None => Ok(None),
        }
    }
}

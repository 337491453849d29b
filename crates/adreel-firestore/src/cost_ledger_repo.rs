//! Cost ledger repository for Firestore.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use adreel_models::CostEntry;

use crate::client::FirestoreClient;
use crate::error::FirestoreResult;
use crate::store::{CostLedger, BUDGET_RESETS, COST_LEDGER};
use crate::types::{to_fields, Aggregation, FromFirestoreValue, StructuredQuery, ToFirestoreValue};

/// Repository for `costLedger/{entryId}` documents and the `budgetResets`
/// markers that bound the running total.
#[derive(Clone)]
pub struct CostLedgerRepository {
    client: FirestoreClient,
}

impl CostLedgerRepository {
    pub fn new(client: FirestoreClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl CostLedger for CostLedgerRepository {
    async fn record_cost(&self, entry: &CostEntry) -> FirestoreResult<()> {
        let mut fields = to_fields(entry)?;
        fields.insert("timestamp".to_string(), entry.timestamp.to_firestore_value());

        self.client
            .create_document(COST_LEDGER, &entry.id, fields)
            .await?;
        Ok(())
    }

    async fn total_spend(&self, since: Option<DateTime<Utc>>) -> FirestoreResult<f64> {
        let mut query = StructuredQuery::collection(COST_LEDGER);
        if let Some(since) = since {
            query = query.where_field("timestamp", "GREATER_THAN", since.to_firestore_value());
        }

        let result = self
            .client
            .run_aggregation(query, vec![Aggregation::sum("total", "amount")])
            .await?;

        Ok(result
            .get("total")
            .and_then(f64::from_firestore_value)
            .unwrap_or(0.0))
    }

    async fn record_reset(&self, at: DateTime<Utc>) -> FirestoreResult<()> {
        let mut fields = HashMap::new();
        fields.insert("resetAt".to_string(), at.to_firestore_value());

        let doc_id = format!("reset-{}", at.timestamp_micros());
        self.client.create_document(BUDGET_RESETS, &doc_id, fields).await?;
        Ok(())
    }

    async fn last_reset(&self) -> FirestoreResult<Option<DateTime<Utc>>> {
        let docs = self
            .client
            .run_query(
                StructuredQuery::collection(BUDGET_RESETS)
                    .order_by("resetAt", true)
                    .limit(1),
            )
            .await?;

        Ok(docs
            .first()
            .and_then(|doc| doc.fields.as_ref()?.get("resetAt"))
            .and_then(DateTime::<Utc>::from_firestore_value))
    }
}

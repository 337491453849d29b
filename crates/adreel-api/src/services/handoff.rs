//! Agent handoff coordination.
//!
//! Each call to [`HandoffCoordinator::prepare_handoff`] folds the session's
//! accumulated context into a new, append-only [`HandoffPayload`] for the
//! fixed successor of the source agent.

use std::sync::Arc;

use chrono::Utc;
use tracing::{info, warn};
use uuid::Uuid;

use adreel_firestore::{FirestoreError, HandoffStore, JobStore};
use adreel_models::{
    validate_handoff, AgentRole, HandoffContext, HandoffPayload, HandoffValidationResult,
    VideoDeliverable,
};

use crate::error::{ApiError, ApiResult, ErrorCode};
use crate::metrics;
use crate::services::session::SessionService;

#[derive(Clone)]
pub struct HandoffCoordinator {
    store: Arc<dyn HandoffStore>,
    sessions: SessionService,
    jobs: Arc<dyn JobStore>,
    threshold: f64,
}

impl HandoffCoordinator {
    pub fn new(
        store: Arc<dyn HandoffStore>,
        sessions: SessionService,
        jobs: Arc<dyn JobStore>,
        threshold: f64,
    ) -> Self {
        Self {
            store,
            sessions,
            jobs,
            threshold,
        }
    }

    /// Build, validate and persist the handoff out of `source`.
    ///
    /// A payload below the completeness threshold is still persisted and
    /// returned with a `failed` status; it only blocks gated stages.
    pub async fn prepare_handoff(
        &self,
        session_id: &str,
        source: AgentRole,
        source_payload: HandoffContext,
        job_id: Option<&str>,
    ) -> ApiResult<HandoffPayload> {
        let target = source.next().ok_or_else(|| {
            ApiError::validation(format!("{} is the last stage and has no successor", source))
        })?;

        let session = self.sessions.get(session_id).await?;
        let history = self.store.list_handoffs(session_id).await?;

        if let Some(later) = history
            .iter()
            .find(|h| h.source_agent > source && h.validation_result.passed())
        {
            return Err(ApiError::new(
                ErrorCode::HandoffOutOfOrder,
                format!(
                    "session {} already moved past {} (handoff {} from {})",
                    session_id, source, later.handoff_id, later.source_agent
                ),
            ));
        }

        let last = history.last();
        let mut context = last.map(|h| h.payload.clone()).unwrap_or_default();

        context.overlay(HandoffContext {
            analysis: session.analysis.clone(),
            strategy: session.confirmed_strategy.clone(),
            ..Default::default()
        });

        if source == AgentRole::VideoProducer {
            if let Some(job_id) = job_id {
                context.overlay(HandoffContext {
                    video: Some(self.deliverable(job_id).await?),
                    ..Default::default()
                });
            }
        }

        context.overlay(source_payload);
        context.locale = session.locale;

        let validation_result = self.validate(source, target, &context);
        let handoff = HandoffPayload {
            handoff_id: Uuid::new_v4().to_string(),
            session_id: session_id.to_string(),
            timestamp: Utc::now(),
            version: last.map(|h| h.version).unwrap_or(0) + 1,
            source_agent: source,
            target_agent: target,
            payload: context,
            validation_result,
        };

        match self.store.append_handoff(&handoff).await {
            Ok(()) => {}
            Err(FirestoreError::AlreadyExists(_)) => {
                return Err(ApiError::new(
                    ErrorCode::HandoffOutOfOrder,
                    format!(
                        "handoff version {} for session {} was written concurrently",
                        handoff.version, session_id
                    ),
                ));
            }
            Err(e) => return Err(e.into()),
        }

        let status = handoff.validation_result.validation_status;
        metrics::record_handoff(status);
        if handoff.validation_result.passed() {
            info!(
                session_id,
                source = %source,
                target = %target,
                persona = target.persona(),
                version = handoff.version,
                completeness = handoff.validation_result.completeness,
                "Handoff recorded"
            );
        } else {
            warn!(
                session_id,
                source = %source,
                target = %target,
                completeness = handoff.validation_result.completeness,
                errors = handoff.validation_result.errors.len(),
                "Handoff below completeness threshold"
            );
        }

        Ok(handoff)
    }

    async fn deliverable(&self, job_id: &str) -> ApiResult<VideoDeliverable> {
        let job = self
            .jobs
            .get_job(job_id)
            .await?
            .ok_or_else(|| ApiError::new(ErrorCode::JobNotFound, format!("job {} not found", job_id)))?
            .value;

        Ok(VideoDeliverable {
            job_id: job.id.to_string(),
            video_url: job.video_url,
            thumbnail_url: job.thumbnail_url,
            duration_secs: job.duration_secs,
            aspect_ratio: job.aspect_ratio,
        })
    }

    pub fn validate(&self, source: AgentRole, target: AgentRole, context: &HandoffContext) -> HandoffValidationResult {
        validate_handoff(source, target, context, self.threshold)
    }

    /// Reject work for `target` unless its latest incoming handoff passed.
    pub async fn ensure_stage_ready(&self, session_id: &str, target: AgentRole) -> ApiResult<()> {
        let history = self.store.list_handoffs(session_id).await?;
        let latest = history.iter().rev().find(|h| h.target_agent == target);

        match latest {
            Some(h) if h.validation_result.passed() => Ok(()),
            Some(h) => Err(ApiError::new(
                ErrorCode::HandoffIncomplete,
                format!(
                    "handoff {} into {} is incomplete ({:.0}% of required fields)",
                    h.handoff_id,
                    target,
                    h.validation_result.completeness * 100.0
                ),
            )),
            None => Err(ApiError::new(
                ErrorCode::HandoffIncomplete,
                format!("session {} has no handoff into {}", session_id, target),
            )),
        }
    }

    pub async fn get(&self, handoff_id: &str) -> ApiResult<HandoffPayload> {
        self.store
            .get_handoff(handoff_id)
            .await?
            .ok_or_else(|| ApiError::not_found(format!("handoff {} not found", handoff_id)))
    }

    /// Audit trail of a live session.
    pub async fn history(&self, session_id: &str) -> ApiResult<Vec<HandoffPayload>> {
        self.sessions.get(session_id).await?;
        Ok(self.store.list_handoffs(session_id).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;

    use adreel_firestore::MemoryStore;
    use adreel_genai::{ChatRefinement, CreativeModel, GenAiError, GenAiResult, ProductInput, RefineRequest};
    use adreel_models::{BudgetThresholds, Locale, ProductAnalysis, Strategy, ValidationStatus};

    use crate::services::budget::BudgetTracker;

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

    fn analysis() -> ProductAnalysis {
        ProductAnalysis {
            product_name: "Glow Serum".into(),
            category: "skincare".into(),
            description: "Vitamin C serum".into(),
            key_features: vec!["brightening".into()],
            target_audience: None,
            brand_tone: None,
            colors: vec![],
            confidence: 0.9,
        }
    }

    async fn setup() -> (HandoffCoordinator, SessionService, String) {
        let store = Arc::new(MemoryStore::new());
        let budget = BudgetTracker::new(300.0, BudgetThresholds::default(), store.clone());
        let sessions = SessionService::new(store.clone(), Arc::new(NoCreative), budget, chrono::Duration::hours(24));
        let session = sessions.create_session("serum ad", Locale::Ja).await.unwrap();
        let coordinator = HandoffCoordinator::new(store.clone(), sessions.clone(), store, 0.8);
        (coordinator, sessions, session.id)
    }

    #[tokio::test]
    async fn test_incomplete_handoff_is_persisted_as_failed() {
        let (c, _, sid) = setup().await;

        let h = c
            .prepare_handoff(&sid, AgentRole::ProductIntelligence, HandoffContext::default(), None)
            .await
            .unwrap();

        assert_eq!(h.version, 1);
        assert_eq!(h.target_agent, AgentRole::CreativeDirector);
        assert_eq!(h.validation_result.validation_status, ValidationStatus::Failed);
        assert_eq!(h.payload.locale, Locale::Ja);

        let err = c
            .ensure_stage_ready(&sid, AgentRole::CreativeDirector)
            .await
            .unwrap_err();
        assert_eq!(err.code(), ErrorCode::HandoffIncomplete);
    }

    #[tokio::test]
    async fn test_context_accumulates_and_versions_increase() {
        let (c, _, sid) = setup().await;

        let first = c
            .prepare_handoff(
                &sid,
                AgentRole::ProductIntelligence,
                HandoffContext {
                    analysis: Some(analysis()),
                    ..Default::default()
                },
                None,
            )
            .await
            .unwrap();
        assert!(first.validation_result.passed());
        c.ensure_stage_ready(&sid, AgentRole::CreativeDirector).await.unwrap();

        let second = c
            .prepare_handoff(&sid, AgentRole::CreativeDirector, HandoffContext::default(), None)
            .await
            .unwrap();
        assert_eq!(second.version, 2);
        // Analysis carried over, strategy still missing
        assert!(second.payload.analysis.is_some());
        assert!(!second.validation_result.passed());

        assert_eq!(c.history(&sid).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_rejects_going_back_after_later_stage_passed() {
        let (c, _, sid) = setup().await;
        let strategy = Strategy {
            headline: "Glow all day".into(),
            key_messages: vec!["lasting".into()],
            visual_style: "soft light".into(),
            target_audience: None,
            call_to_action: None,
            mood: None,
        };

        c.prepare_handoff(
            &sid,
            AgentRole::CreativeDirector,
            HandoffContext {
                analysis: Some(analysis()),
                strategy: Some(strategy),
                ..Default::default()
            },
            None,
        )
        .await
        .unwrap();

        let err = c
            .prepare_handoff(&sid, AgentRole::ProductIntelligence, HandoffContext::default(), None)
            .await
            .unwrap_err();
        assert_eq!(err.code(), ErrorCode::HandoffOutOfOrder);
    }

    #[tokio::test]
    async fn test_last_stage_has_no_successor() {
        let (c, _, sid) = setup().await;
        let err = c
            .prepare_handoff(&sid, AgentRole::PostProduction, HandoffContext::default(), None)
            .await
            .unwrap_err();
        assert_eq!(err.code(), ErrorCode::ValidationError);
    }
}

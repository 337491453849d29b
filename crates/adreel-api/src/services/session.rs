//! Session lifecycle: creation, expiry-aware loads, optimistic updates and
//! the background product analysis.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tracing::{error, info, warn};

use adreel_firestore::{SessionStore, Versioned};
use adreel_genai::{CreativeModel, ProductInput};
use adreel_models::{Locale, ServiceKind, Session, Strategy};
use adreel_models::cost::{GEMINI_TEXT_COST, GEMINI_VISION_COST};

use crate::error::{ApiError, ApiResult, ErrorCode};
use crate::services::budget::BudgetTracker;

/// Attempts for one optimistic update before giving up.
const MAX_UPDATE_ATTEMPTS: u32 = 5;

/// Backoff step between attempts; attempt `n` waits `n * step`.
const UPDATE_BACKOFF_STEP: Duration = Duration::from_millis(25);

#[derive(Clone)]
pub struct SessionService {
    store: Arc<dyn SessionStore>,
    creative: Arc<dyn CreativeModel>,
    budget: BudgetTracker,
    ttl: chrono::Duration,
}

impl SessionService {
    pub fn new(
        store: Arc<dyn SessionStore>,
        creative: Arc<dyn CreativeModel>,
        budget: BudgetTracker,
        ttl: chrono::Duration,
    ) -> Self {
        Self {
            store,
            creative,
            budget,
            ttl,
        }
    }

    pub async fn create_session(&self, prompt: impl Into<String>, locale: Locale) -> ApiResult<Session> {
        let session = Session::new(prompt, locale, self.ttl);
        self.store.create_session(&session).await?;
        info!(session_id = %session.id, locale = locale.as_str(), "Created session");
        Ok(session)
    }

    /// Load a live session with its revision.
    pub async fn load(&self, session_id: &str) -> ApiResult<Versioned<Session>> {
        let versioned = self
            .store
            .get_session(session_id)
            .await?
            .ok_or_else(|| ApiError::new(ErrorCode::SessionNotFound, format!("session {} not found", session_id)))?;

        if versioned.value.is_expired_at(Utc::now()) {
            return Err(ApiError::new(
                ErrorCode::SessionExpired,
                format!("session {} expired at {}", session_id, versioned.value.expires_at.to_rfc3339()),
            ));
        }
        Ok(versioned)
    }

    pub async fn get(&self, session_id: &str) -> ApiResult<Session> {
        Ok(self.load(session_id).await?.value)
    }

    /// Apply `f` under optimistic concurrency, re-reading on conflicts.
    ///
    /// `f` may run several times and must only touch the session it is given.
    pub async fn mutate<F, R>(&self, session_id: &str, mut f: F) -> ApiResult<(Session, R)>
    where
        F: FnMut(&mut Session) -> ApiResult<R> + Send,
        R: Send,
    {
        for attempt in 1..=MAX_UPDATE_ATTEMPTS {
            let Versioned { mut value, revision } = self.load(session_id).await?;
            let out = f(&mut value)?;

            match self.store.update_session(&value, &revision).await {
                Ok(_) => return Ok((value, out)),
                Err(e) if e.is_precondition_failed() => {
                    warn!(session_id, attempt, "Session update conflicted, retrying");
                    tokio::time::sleep(UPDATE_BACKOFF_STEP * attempt).await;
                }
                Err(e) => return Err(e.into()),
            }
        }

        Err(ApiError::new(
            ErrorCode::SessionError,
            format!("session {} is being modified concurrently", session_id),
        ))
    }

    /// Compensation for a failed downstream step. Errors are logged only.
    pub async fn mark_failed(&self, session_id: &str, reason: &str) {
        let result = self
            .mutate(session_id, |s| Ok(s.fail(reason, Utc::now())?))
            .await;
        if let Err(e) = result {
            warn!(session_id, "Could not mark session failed: {}", e);
        }
    }

    /// Flip the session to `completed` after its video finished.
    pub async fn mark_completed(&self, session_id: &str) {
        let result = self
            .mutate(session_id, |s| Ok(s.mark_completed(Utc::now())?))
            .await;
        if let Err(e) = result {
            warn!(session_id, "Could not mark session completed: {}", e);
        }
    }

    /// Run product analysis for a freshly created session.
    ///
    /// Runs detached from the upload request; any failure marks the session
    /// `failed` with the reason.
    pub async fn run_analysis(&self, session_id: String, input: ProductInput) {
        if let Err(e) = self.try_run_analysis(&session_id, &input).await {
            error!(session_id = %session_id, "Product analysis failed: {}", e);
            self.mark_failed(&session_id, &e.to_string()).await;
        }
    }

    async fn try_run_analysis(&self, session_id: &str, input: &ProductInput) -> ApiResult<()> {
        let (session, _) = self
            .mutate(session_id, |s| Ok(s.begin_analysis(Utc::now())?))
            .await?;

        self.budget.ensure_can_proceed().await?;
        let analysis = self
            .creative
            .analyze_product(input, session.locale)
            .await
            .map_err(ApiError::ai)?;

        let (service, cost) = if input.is_image() {
            (ServiceKind::GeminiVision, GEMINI_VISION_COST)
        } else {
            (ServiceKind::GeminiText, GEMINI_TEXT_COST)
        };
        self.budget
            .record_cost(service, cost, "product analysis", Some(session_id.to_string()))
            .await;

        let product = analysis.product_name.clone();
        self.mutate(session_id, |s| Ok(s.complete_analysis(analysis.clone(), Utc::now())?))
            .await?;

        info!(session_id, product = %product, "Product analysis completed");
        Ok(())
    }

    /// Ask the creative model for a strategy and store it as pending.
    pub async fn generate_strategy(&self, session_id: &str) -> ApiResult<(Strategy, bool)> {
        let session = self.get(session_id).await?;
        let analysis = session
            .analysis
            .as_ref()
            .ok_or_else(|| ApiError::validation("session has no product analysis yet"))?;

        self.budget.ensure_can_proceed().await?;
        let strategy = self
            .creative
            .generate_strategy(analysis, &session.prompt, session.locale)
            .await
            .map_err(ApiError::ai)?;
        self.budget
            .record_cost(
                ServiceKind::GeminiText,
                GEMINI_TEXT_COST,
                "strategy generation",
                Some(session_id.to_string()),
            )
            .await;

        let (_, replaced) = self
            .mutate(session_id, |s| Ok(s.set_pending_strategy(strategy.clone(), Utc::now()).is_some()))
            .await?;
        Ok((strategy, replaced))
    }

    pub async fn confirm_strategy(&self, session_id: &str) -> ApiResult<Strategy> {
        let (_, confirmed) = self
            .mutate(session_id, |s| Ok(s.confirm_strategy(Utc::now())?.clone()))
            .await?;
        info!(session_id, headline = %confirmed.headline, "Strategy confirmed");
        Ok(confirmed)
    }
}

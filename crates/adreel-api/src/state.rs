//! Application state.

use std::sync::Arc;
use std::time::Instant;

use metrics_exporter_prometheus::PrometheusHandle;
use tracing::{info, warn};

use adreel_firestore::{
    CostLedger, CostLedgerRepository, FirestoreClient, HandoffRepository, HandoffStore, JobStore,
    MemoryStore, SessionRepository, SessionStore, VideoJobRepository,
};
use adreel_genai::{CreativeModel, GeminiClient, VeoClient, VeoConfig, VideoGenerator};

use crate::config::{ApiConfig, StoreBackend};
use crate::middleware::RateLimiterCache;
use crate::services::{
    BudgetTracker, HandoffCoordinator, JobEventBus, JobTracker, RateLimitService, SessionService,
};

/// Persistence handles, one per collection.
#[derive(Clone)]
pub struct Stores {
    pub sessions: Arc<dyn SessionStore>,
    pub jobs: Arc<dyn JobStore>,
    pub handoffs: Arc<dyn HandoffStore>,
    pub ledger: Arc<dyn CostLedger>,
}

impl Stores {
    /// All collections backed by one in-process store.
    pub fn memory() -> Self {
        let store = Arc::new(MemoryStore::new());
        Self {
            sessions: store.clone(),
            jobs: store.clone(),
            handoffs: store.clone(),
            ledger: store,
        }
    }

    pub fn firestore(client: FirestoreClient) -> Self {
        Self {
            sessions: Arc::new(SessionRepository::new(client.clone())),
            jobs: Arc::new(VideoJobRepository::new(client.clone())),
            handoffs: Arc::new(HandoffRepository::new(client.clone())),
            ledger: Arc::new(CostLedgerRepository::new(client)),
        }
    }
}

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<ApiConfig>,
    pub stores: Stores,
    pub creative: Arc<dyn CreativeModel>,
    pub video: Arc<dyn VideoGenerator>,
    pub budget: BudgetTracker,
    pub rate_limiter: Arc<RateLimitService>,
    pub ip_limiter: Arc<RateLimiterCache>,
    pub events: JobEventBus,
    pub sessions: SessionService,
    pub tracker: JobTracker,
    pub handoffs: HandoffCoordinator,
    pub metrics_handle: Option<PrometheusHandle>,
    pub started_at: Instant,
}

impl AppState {
    /// Wire services over already constructed stores and AI backends.
    pub fn from_parts(
        config: ApiConfig,
        stores: Stores,
        creative: Arc<dyn CreativeModel>,
        video: Arc<dyn VideoGenerator>,
    ) -> Self {
        let budget = BudgetTracker::new(
            config.total_budget_usd,
            config.budget_thresholds,
            stores.ledger.clone(),
        );
        let events = JobEventBus::default();
        let sessions = SessionService::new(
            stores.sessions.clone(),
            creative.clone(),
            budget.clone(),
            config.session_ttl,
        );
        let tracker = JobTracker::new(
            stores.jobs.clone(),
            video.clone(),
            sessions.clone(),
            events.clone(),
            config.job_max_age,
        );
        let handoffs = HandoffCoordinator::new(
            stores.handoffs.clone(),
            sessions.clone(),
            stores.jobs.clone(),
            config.handoff_completeness_threshold,
        );

        Self {
            rate_limiter: Arc::new(RateLimitService::new(config.endpoint_limits.clone())),
            ip_limiter: Arc::new(RateLimiterCache::new(config.rate_limit_rps)),
            config: Arc::new(config),
            stores,
            creative,
            video,
            budget,
            events,
            sessions,
            tracker,
            handoffs,
            metrics_handle: None,
            started_at: Instant::now(),
        }
    }

    pub fn with_metrics(mut self, handle: PrometheusHandle) -> Self {
        self.metrics_handle = Some(handle);
        self
    }

    /// Create application state from the environment.
    pub async fn new(config: ApiConfig) -> Result<Self, Box<dyn std::error::Error + Send + Sync>> {
        let stores = match config.store_backend {
            StoreBackend::Firestore => Stores::firestore(FirestoreClient::from_env().await?),
            StoreBackend::Memory => {
                warn!("Using in-memory store, data is lost on restart");
                Stores::memory()
            }
        };

        let creative = Arc::new(GeminiClient::from_env()?);
        let video = Arc::new(VeoClient::new(VeoConfig::from_env()?).await?);
        let hydrate = config.hydrate_budget_from_ledger;

        let state = Self::from_parts(config, stores, creative, video);

        if hydrate {
            match state.budget.hydrate_from_ledger().await {
                Ok(spend) => info!(spend, "Budget hydrated"),
                Err(e) => warn!("Could not hydrate budget from ledger, starting at zero: {}", e),
            }
        }

        Ok(state)
    }
}

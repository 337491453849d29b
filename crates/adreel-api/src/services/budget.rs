//! Process-wide spend tracking for billed AI calls.
//!
//! Spend only grows until an admin reset. Every recorded cost is appended to
//! the persistent ledger in the background so a restart can rehydrate the
//! total.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::RwLock;
use tracing::{error, info, warn};

use adreel_firestore::CostLedger;
use adreel_models::{AlertLevel, BudgetAlert, BudgetStatus, BudgetThresholds, CostEntry, ServiceKind};

use crate::error::{ApiError, ApiResult, ErrorCode};
use crate::metrics;

/// Upper bound for one background ledger write.
const LEDGER_WRITE_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Default)]
struct BudgetState {
    current_spend: f64,
    /// Highest level already alerted since the last reset
    alerted_level: AlertLevel,
    alerts: Vec<BudgetAlert>,
}

#[derive(Clone)]
pub struct BudgetTracker {
    state: Arc<RwLock<BudgetState>>,
    total_budget: f64,
    thresholds: BudgetThresholds,
    ledger: Arc<dyn CostLedger>,
}

impl BudgetTracker {
    pub fn new(total_budget: f64, thresholds: BudgetThresholds, ledger: Arc<dyn CostLedger>) -> Self {
        Self {
            state: Arc::new(RwLock::new(BudgetState::default())),
            total_budget,
            thresholds,
            ledger,
        }
    }

    /// Seed the running total from the ledger entries recorded since the
    /// last persisted reset.
    pub async fn hydrate_from_ledger(&self) -> ApiResult<f64> {
        let since = self.ledger.last_reset().await?;
        let total = self.ledger.total_spend(since).await?;
        let mut state = self.state.write().await;
        state.current_spend = total.max(0.0);
        state.alerted_level = self
            .thresholds
            .level(fraction(state.current_spend, self.total_budget));
        info!(spend = state.current_spend, "Hydrated budget from cost ledger");
        Ok(state.current_spend)
    }

    /// Record a billed operation. Never fails; the ledger write happens in
    /// the background.
    pub async fn record_cost(
        &self,
        service: ServiceKind,
        amount: f64,
        description: impl Into<String>,
        session_id: Option<String>,
    ) -> CostEntry {
        let amount = if amount.is_finite() && amount >= 0.0 {
            amount
        } else {
            warn!(service = service.as_str(), amount, "Ignoring invalid cost amount");
            0.0
        };

        let entry = CostEntry::new(service, amount, description, session_id);

        let current_spend = {
            let mut state = self.state.write().await;
            state.current_spend += amount;

            let status = BudgetStatus::compute(state.current_spend, self.total_budget, &self.thresholds);
            if status.alert_level > state.alerted_level {
                let alert = BudgetAlert {
                    level: status.alert_level,
                    spend_at_alert: status.current_spend,
                    percentage_used: status.percentage_used,
                    message: format!(
                        "Budget {} threshold crossed: ${:.2} of ${:.2} used",
                        status.alert_level.as_str(),
                        status.current_spend,
                        status.total_budget
                    ),
                    timestamp: Utc::now(),
                };
                match alert.level {
                    AlertLevel::Critical => error!("{}", alert.message),
                    _ => warn!("{}", alert.message),
                }
                state.alerted_level = alert.level;
                state.alerts.push(alert);
            }
            state.current_spend
        };

        metrics::record_cost(service.as_str(), current_spend);

        let ledger = Arc::clone(&self.ledger);
        let persisted = entry.clone();
        tokio::spawn(async move {
            match tokio::time::timeout(LEDGER_WRITE_TIMEOUT, ledger.record_cost(&persisted)).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => error!(entry_id = %persisted.id, "Failed to persist cost entry: {}", e),
                Err(_) => error!(entry_id = %persisted.id, "Timed out persisting cost entry"),
            }
        });

        entry
    }

    pub async fn get_budget_status(&self) -> BudgetStatus {
        let state = self.state.read().await;
        BudgetStatus::compute(state.current_spend, self.total_budget, &self.thresholds)
    }

    /// Fail fast before a billed call once the critical threshold is reached.
    pub async fn ensure_can_proceed(&self) -> ApiResult<BudgetStatus> {
        let status = self.get_budget_status().await;
        if !status.can_proceed {
            return Err(ApiError::new(
                ErrorCode::BudgetExceeded,
                format!(
                    "budget exhausted: ${:.2} of ${:.2} used",
                    status.current_spend, status.total_budget
                ),
            ));
        }
        Ok(status)
    }

    pub async fn alerts(&self) -> Vec<BudgetAlert> {
        self.state.read().await.alerts.clone()
    }

    /// Admin reset: zero the spend and forget past alerts.
    ///
    /// The reset is persisted first so hydration after a restart only counts
    /// entries recorded after it.
    pub async fn reset(&self) -> ApiResult<BudgetStatus> {
        let mut state = self.state.write().await;
        self.ledger.record_reset(Utc::now()).await?;

        let previous = state.current_spend;
        *state = BudgetState::default();
        info!(previous_spend = previous, "Budget reset");
        metrics::set_budget_spend(0.0);
        Ok(BudgetStatus::compute(0.0, self.total_budget, &self.thresholds))
    }
}

fn fraction(spend: f64, total: f64) -> f64 {
    if total > 0.0 {
        spend / total
    } else {
        1.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use adreel_firestore::MemoryStore;

    fn tracker(store: Arc<MemoryStore>) -> BudgetTracker {
        BudgetTracker::new(300.0, BudgetThresholds::default(), store)
    }

    #[tokio::test]
    async fn test_blocks_at_critical_threshold() {
        let budget = tracker(Arc::new(MemoryStore::new()));

        budget.record_cost(ServiceKind::Veo, 250.0, "video", None).await;
        assert!(budget.ensure_can_proceed().await.is_ok());

        budget.record_cost(ServiceKind::Veo, 20.0, "video", None).await;
        let status = budget.get_budget_status().await;
        assert!(!status.can_proceed);
        assert_eq!(status.alert_level, AlertLevel::Critical);

        let err = budget.ensure_can_proceed().await.unwrap_err();
        assert_eq!(err.code(), ErrorCode::BudgetExceeded);

        // Spend past the budget is still recorded
        budget.record_cost(ServiceKind::Veo, 50.0, "video", None).await;
        assert!((budget.get_budget_status().await.current_spend - 320.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_alerts_fire_once_per_crossing_and_reset_clears() {
        let budget = tracker(Arc::new(MemoryStore::new()));

        budget.record_cost(ServiceKind::Veo, 230.0, "a", None).await;
        budget.record_cost(ServiceKind::Veo, 1.0, "b", None).await;
        budget.record_cost(ServiceKind::Veo, 50.0, "c", None).await;

        let alerts = budget.alerts().await;
        assert_eq!(alerts.len(), 2);
        assert_eq!(alerts[0].level, AlertLevel::Warning);
        assert_eq!(alerts[1].level, AlertLevel::Critical);

        let status = budget.reset().await.unwrap();
        assert!(status.can_proceed);
        assert!(budget.alerts().await.is_empty());
    }

    #[tokio::test]
    async fn test_invalid_amounts_are_clamped() {
        let budget = tracker(Arc::new(MemoryStore::new()));
        let entry = budget.record_cost(ServiceKind::Veo, f64::NAN, "bad", None).await;
        assert_eq!(entry.amount, 0.0);
        budget.record_cost(ServiceKind::Veo, -4.0, "bad", None).await;
        assert_eq!(budget.get_budget_status().await.current_spend, 0.0);
    }

    #[tokio::test]
    async fn test_hydrates_from_ledger() {
        let store = Arc::new(MemoryStore::new());
        store
            .record_cost(&CostEntry::new(ServiceKind::Veo, 12.5, "old", None))
            .await
            .unwrap();

        let budget = tracker(store);
        assert_eq!(budget.hydrate_from_ledger().await.unwrap(), 12.5);
        assert_eq!(budget.get_budget_status().await.current_spend, 12.5);
    }

    #[tokio::test]
    async fn test_reset_survives_restart() {
        let store = Arc::new(MemoryStore::new());
        let mut spent = CostEntry::new(ServiceKind::Veo, 280.0, "videos", None);
        spent.timestamp = Utc::now() - chrono::Duration::seconds(5);
        store.record_cost(&spent).await.unwrap();

        let budget = tracker(store.clone());
        budget.hydrate_from_ledger().await.unwrap();
        assert!(!budget.get_budget_status().await.can_proceed);
        assert!(budget.reset().await.unwrap().can_proceed);

        let mut later = CostEntry::new(ServiceKind::GeminiText, 2.0, "chat", None);
        later.timestamp = Utc::now() + chrono::Duration::seconds(1);
        store.record_cost(&later).await.unwrap();

        let restarted = tracker(store);
        assert_eq!(restarted.hydrate_from_ledger().await.unwrap(), 2.0);
        assert!(restarted.get_budget_status().await.can_proceed);
    }
}

//! Background removal of expired sessions.
//!
//! Reads already treat expired sessions as gone, so this only reclaims
//! storage. Jobs and handoffs are kept for the gallery and audit trail.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::time::interval;
use tracing::{debug, error, info};

use adreel_firestore::SessionStore;

use crate::metrics;

/// Interval between sweeps.
const SWEEP_INTERVAL: Duration = Duration::from_secs(600);

/// Sessions deleted per sweep batch.
const SWEEP_BATCH: u32 = 200;

pub struct ExpirySweeper {
    sessions: Arc<dyn SessionStore>,
    period: Duration,
}

impl ExpirySweeper {
    pub fn new(sessions: Arc<dyn SessionStore>) -> Self {
        Self {
            sessions,
            period: SWEEP_INTERVAL,
        }
    }

    /// Start the sweep loop. Runs until the task is aborted.
    pub async fn run(&self) {
        info!("Starting session expiry sweeper (interval: {:?})", self.period);

        let mut ticker = interval(self.period);
        loop {
            ticker.tick().await;

            match self.sweep_once().await {
                Ok(0) => debug!("No expired sessions"),
                Ok(n) => info!("Deleted {} expired sessions", n),
                Err(e) => error!("Session expiry sweep failed: {:#}", e),
            }
        }
    }

    /// Delete expired sessions in batches until none are left.
    pub async fn sweep_once(&self) -> anyhow::Result<usize> {
        let now = Utc::now();
        let mut deleted = 0;

        loop {
            let expired = self.sessions.list_expired_sessions(now, SWEEP_BATCH).await?;
            if expired.is_empty() {
                break;
            }

            self.sessions.delete_sessions(&expired).await?;
            deleted += expired.len();
            metrics::record_sessions_expired(expired.len());

            if expired.len() < SWEEP_BATCH as usize {
                break;
            }
        }

        Ok(deleted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use adreel_firestore::MemoryStore;
    use adreel_models::{Locale, Session};

    #[tokio::test]
    async fn test_sweep_deletes_only_expired_sessions() {
        let store = Arc::new(MemoryStore::new());

        let mut stale = Session::new("old", Locale::En, chrono::Duration::hours(24));
        stale.expires_at = Utc::now() - chrono::Duration::minutes(1);
        let live = Session::new("new", Locale::En, chrono::Duration::hours(24));
        store.create_session(&stale).await.unwrap();
        store.create_session(&live).await.unwrap();

        let sweeper = ExpirySweeper::new(store.clone());
        assert_eq!(sweeper.sweep_once().await.unwrap(), 1);
        assert_eq!(sweeper.sweep_once().await.unwrap(), 0);

        assert!(store.get_session(&stale.id).await.unwrap().is_none());
        assert!(store.get_session(&live.id).await.unwrap().is_some());
    }
}

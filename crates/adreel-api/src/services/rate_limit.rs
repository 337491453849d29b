//! Fixed-window request limiter keyed by client and endpoint class.

use std::collections::HashMap;

use chrono::{DateTime, Duration, Utc};
use tokio::sync::RwLock;
use tracing::warn;

use adreel_models::{EndpointClass, RateLimitResult};

/// Maximum number of (client, class) windows tracked at once.
const MAX_TRACKED_KEYS: usize = 10_000;

#[derive(Debug, Clone, Copy)]
struct Window {
    started_at: DateTime<Utc>,
    reset_time: DateTime<Utc>,
    count: u32,
}

type Key = (String, EndpointClass);

pub struct RateLimitService {
    windows: RwLock<HashMap<Key, Window>>,
    limits: HashMap<EndpointClass, u32>,
    window: Duration,
    max_keys: usize,
}

impl RateLimitService {
    /// One-minute windows with the given per-class limits.
    pub fn new(limits: HashMap<EndpointClass, u32>) -> Self {
        Self::with_window(limits, Duration::minutes(1), MAX_TRACKED_KEYS)
    }

    pub fn with_window(limits: HashMap<EndpointClass, u32>, window: Duration, max_keys: usize) -> Self {
        Self {
            windows: RwLock::new(HashMap::new()),
            limits,
            window,
            max_keys: max_keys.max(1),
        }
    }

    pub fn limit_for(&self, class: EndpointClass) -> u32 {
        self.limits
            .get(&class)
            .copied()
            .unwrap_or_else(|| class.default_limit_per_minute())
    }

    pub async fn check_rate_limit(&self, client_id: &str, class: EndpointClass) -> RateLimitResult {
        self.check_at(client_id, class, Utc::now()).await
    }

    /// Count one request at `now` and report whether it is allowed.
    pub async fn check_at(&self, client_id: &str, class: EndpointClass, now: DateTime<Utc>) -> RateLimitResult {
        let limit = self.limit_for(class);
        let key = (client_id.to_string(), class);
        let mut windows = self.windows.write().await;

        if !windows.contains_key(&key) && windows.len() >= self.max_keys {
            self.evict(&mut windows, now);
        }

        let window = windows.entry(key).or_insert(Window {
            started_at: now,
            reset_time: now + self.window,
            count: 0,
        });

        if now >= window.reset_time {
            *window = Window {
                started_at: now,
                reset_time: now + self.window,
                count: 0,
            };
        }

        let allowed = window.count < limit;
        if allowed {
            window.count += 1;
        }

        RateLimitResult {
            allowed,
            limit,
            remaining: limit.saturating_sub(window.count),
            reset_time: window.reset_time,
        }
    }

    /// Drop expired windows, then the oldest ones until there is room.
    fn evict(&self, windows: &mut HashMap<Key, Window>, now: DateTime<Utc>) {
        windows.retain(|_, w| now < w.reset_time);

        if windows.len() >= self.max_keys {
            let mut by_age: Vec<(Key, DateTime<Utc>)> =
                windows.iter().map(|(k, w)| (k.clone(), w.started_at)).collect();
            by_age.sort_by_key(|(_, started)| *started);

            let to_remove = windows.len() + 1 - self.max_keys;
            for (key, _) in by_age.into_iter().take(to_remove) {
                windows.remove(&key);
            }
            warn!("Rate limiter exceeded capacity, evicted {} active windows", to_remove);
        }
    }

    pub async fn tracked_keys(&self) -> usize {
        self.windows.read().await.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn limiter(limit: u32, max_keys: usize) -> RateLimitService {
        RateLimitService::with_window(
            HashMap::from([(EndpointClass::StatusCheck, limit)]),
            Duration::minutes(1),
            max_keys,
        )
    }

    #[tokio::test]
    async fn test_allows_limit_then_rejects_until_reset() {
        let rl = limiter(3, 100);
        let now = Utc::now();

        for i in 0..3 {
            let r = rl.check_at("1.2.3.4", EndpointClass::StatusCheck, now).await;
            assert!(r.allowed, "request {} should pass", i + 1);
            assert_eq!(r.remaining, 2 - i);
        }

        let rejected = rl.check_at("1.2.3.4", EndpointClass::StatusCheck, now).await;
        assert!(!rejected.allowed);
        assert_eq!(rejected.remaining, 0);

        let after = rl
            .check_at("1.2.3.4", EndpointClass::StatusCheck, rejected.reset_time)
            .await;
        assert!(after.allowed);
    }

    #[tokio::test]
    async fn test_classes_and_clients_are_independent() {
        let rl = limiter(1, 100);
        let now = Utc::now();

        assert!(rl.check_at("a", EndpointClass::StatusCheck, now).await.allowed);
        assert!(!rl.check_at("a", EndpointClass::StatusCheck, now).await.allowed);
        assert!(rl.check_at("b", EndpointClass::StatusCheck, now).await.allowed);
        assert!(rl.check_at("a", EndpointClass::Chat, now).await.allowed);
    }

    #[tokio::test]
    async fn test_key_count_is_bounded() {
        let rl = limiter(5, 2);
        let now = Utc::now();

        rl.check_at("a", EndpointClass::StatusCheck, now).await;
        rl.check_at("b", EndpointClass::StatusCheck, now + Duration::seconds(1)).await;
        rl.check_at("c", EndpointClass::StatusCheck, now + Duration::seconds(2)).await;

        assert_eq!(rl.tracked_keys().await, 2);
        // "a" was the oldest window and got evicted, so it starts fresh
        let r = rl.check_at("a", EndpointClass::StatusCheck, now + Duration::seconds(3)).await;
        assert_eq!(r.remaining, 4);
    }
}

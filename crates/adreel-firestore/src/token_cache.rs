//! Access-token caching for Google APIs.
//!
//! Tokens are refreshed a minute before expiry. Concurrent callers share one
//! refresh (double-checked under the write lock), and a failed refresh falls
//! back to the current token while it is still usable.

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use gcp_auth::TokenProvider;
use tokio::sync::RwLock;
use tracing::{debug, warn};

use crate::error::{FirestoreError, FirestoreResult};

const TOKEN_REFRESH_MARGIN: Duration = Duration::from_secs(60);

/// Used when the provider reports an expiry we cannot represent.
const TOKEN_DEFAULT_TTL: Duration = Duration::from_secs(50 * 60);

/// OAuth scope for Firestore access.
pub const FIRESTORE_SCOPE: &str = "https://www.googleapis.com/auth/datastore";

struct CachedToken {
    access_token: String,
    expires_at: Instant,
}

impl CachedToken {
    fn is_fresh(&self) -> bool {
        Instant::now() + TOKEN_REFRESH_MARGIN < self.expires_at
    }

    fn is_usable(&self) -> bool {
        Instant::now() < self.expires_at
    }
}

/// Thread-safe token cache for a fixed set of scopes.
pub struct TokenCache {
    auth: Arc<dyn TokenProvider>,
    scopes: Vec<&'static str>,
    cache: RwLock<Option<CachedToken>>,
}

impl TokenCache {
    pub fn new(auth: Arc<dyn TokenProvider>) -> Self {
        Self::with_scopes(auth, &[FIRESTORE_SCOPE])
    }

    pub fn with_scopes(auth: Arc<dyn TokenProvider>, scopes: &[&'static str]) -> Self {
        Self {
            auth,
            scopes: scopes.to_vec(),
            cache: RwLock::new(None),
        }
    }

    /// Drop the cached token, e.g. after the server reported it expired.
    pub async fn invalidate(&self) {
        *self.cache.write().await = None;
    }

    /// Get a valid access token, refreshing if necessary.
    pub async fn get_token(&self) -> FirestoreResult<String> {
        {
            let cache = self.cache.read().await;
            if let Some(cached) = cache.as_ref().filter(|c| c.is_fresh()) {
                return Ok(cached.access_token.clone());
            }
        }

        let mut cache = self.cache.write().await;

        // Another task may have refreshed while we waited for the lock
        if let Some(cached) = cache.as_ref().filter(|c| c.is_fresh()) {
            return Ok(cached.access_token.clone());
        }

        self.refresh(&mut cache).await
    }

    async fn refresh(&self, cache: &mut Option<CachedToken>) -> FirestoreResult<String> {
        match self.auth.token(&self.scopes).await {
            Ok(token) => {
                let access_token = token.as_str().to_string();
                let now = Utc::now();
                let exp = token.expires_at();
                let expires_at = if exp > now {
                    (exp - now)
                        .to_std()
                        .map(|ttl| Instant::now() + ttl)
                        .unwrap_or_else(|_| Instant::now() + TOKEN_DEFAULT_TTL)
                } else {
                    Instant::now()
                };

                *cache = Some(CachedToken {
                    access_token: access_token.clone(),
                    expires_at,
                });
                debug!(scopes = ?self.scopes, "Refreshed access token");
                Ok(access_token)
            }
            Err(e) => {
                if let Some(cached) = cache.as_ref().filter(|c| c.is_usable()) {
                    warn!("Token refresh failed, using existing token: {}", e);
                    return Ok(cached.access_token.clone());
                }
                Err(FirestoreError::auth_error(format!(
                    "Failed to obtain auth token: {}",
                    e
                )))
            }
        }
    }
}

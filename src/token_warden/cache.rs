//! In-process access-token cache
//!
//! Read-through cache keyed by user id. Entry TTL is
//! `min(expires_at - now, 300s)`; writes invalidate explicitly. The
//! per-user flight mutex gives callers singleflight semantics: losers of
//! the race re-read the cache instead of issuing a duplicate refresh.

use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};

/// Cache entry TTL cap in seconds
pub const CACHE_TTL_CAP_SECONDS: i64 = 300;

#[derive(Debug, Clone)]
struct CachedToken {
    access_token: String,
    /// Epoch seconds the token itself expires
    expires_at: i64,
    /// Epoch seconds this cache entry stops being served
    cached_until: i64,
}

/// Token cache instance
pub struct TokenCache {
    entries: RwLock<HashMap<String, CachedToken>>,
    /// User -> flight guard (singleflight refresh)
    flights: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl TokenCache {
    /// Create new cache
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            flights: Mutex::new(HashMap::new()),
        }
    }

    /// Read a still-valid access token
    pub async fn get(&self, user_id: &str, now: i64) -> Option<String> {
        let entries = self.entries.read().await;
        entries.get(user_id).and_then(|entry| {
            if now < entry.cached_until && now < entry.expires_at {
                Some(entry.access_token.clone())
            } else {
                None
            }
        })
    }

    /// Store a token; entry lifetime is capped so a revoked token cannot
    /// be served stale for long
    pub async fn put(&self, user_id: &str, access_token: &str, expires_at: i64, now: i64) {
        let ttl = (expires_at - now).min(CACHE_TTL_CAP_SECONDS).max(0);
        let mut entries = self.entries.write().await;
        entries.insert(
            user_id.to_string(),
            CachedToken {
                access_token: access_token.to_string(),
                expires_at,
                cached_until: now + ttl,
            },
        );
    }

    /// Drop a user's entry (called on every secret-store write)
    pub async fn invalidate(&self, user_id: &str) {
        let mut entries = self.entries.write().await;
        entries.remove(user_id);
    }

    /// Per-user flight guard. Hold the lock across a refresh; racers
    /// block here and re-check the cache once they acquire it.
    pub async fn flight(&self, user_id: &str) -> Arc<Mutex<()>> {
        let mut flights = self.flights.lock().await;
        flights
            .entry(user_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }
}

impl Default for TokenCache {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn entry_ttl_is_capped_at_300s() {
        let cache = TokenCache::new();
        let now = 1_000_000;

        // Long-lived token: served for the cap, no longer
        cache.put("u1", "tok-a", now + 3600, now).await;
        assert_eq!(cache.get("u1", now).await.as_deref(), Some("tok-a"));
        assert_eq!(
            cache.get("u1", now + CACHE_TTL_CAP_SECONDS - 1).await.as_deref(),
            Some("tok-a")
        );
        assert!(cache.get("u1", now + CACHE_TTL_CAP_SECONDS).await.is_none());
    }

    #[tokio::test]
    async fn entry_ttl_tracks_short_expiry() {
        let cache = TokenCache::new();
        let now = 1_000_000;

        cache.put("u1", "tok-b", now + 60, now).await;
        assert_eq!(cache.get("u1", now + 59).await.as_deref(), Some("tok-b"));
        assert!(cache.get("u1", now + 60).await.is_none());
    }

    #[tokio::test]
    async fn expired_token_is_never_served() {
        let cache = TokenCache::new();
        let now = 1_000_000;

        cache.put("u1", "tok-c", now - 1, now).await;
        assert!(cache.get("u1", now).await.is_none());
    }

    #[tokio::test]
    async fn invalidate_removes_entry() {
        let cache = TokenCache::new();
        let now = 1_000_000;

        cache.put("u1", "tok-d", now + 3600, now).await;
        cache.invalidate("u1").await;
        assert!(cache.get("u1", now).await.is_none());
    }

    #[tokio::test]
    async fn flight_guard_is_shared_per_user() {
        let cache = TokenCache::new();
        let a = cache.flight("u1").await;
        let b = cache.flight("u1").await;
        assert!(Arc::ptr_eq(&a, &b));

        let other = cache.flight("u2").await;
        assert!(!Arc::ptr_eq(&a, &other));
    }
}

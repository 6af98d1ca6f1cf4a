//! Fixed-window rate limiting
//!
//! Per-(user, action) counters built on the cache store's `incr` +
//! conditional `expire`. The first increment of a window starts the clock;
//! the backend expiring the key resets the window. Exact distributed
//! atomicity is not required here: a race that double-counts by one is
//! acceptable for a usage budget.
//!
//! When the backend is disabled or unreachable the limiter fails open and
//! allows everything. Rate limiting degrades silently rather than blocking
//! all traffic when the cache is down.

use crate::cache::CacheStore;
use crate::utils::Clock;
use chrono::{DateTime, Duration, Utc};
use std::sync::Arc;

/// Outcome of a rate-limit check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RateLimitDecision {
    pub allowed: bool,
    /// Requests left in the current window.
    pub remaining: u32,
    /// When the window resets and the counter starts over.
    pub reset_at: DateTime<Utc>,
}

impl RateLimitDecision {
    fn open(limit: u32, now: DateTime<Utc>, window_seconds: u64) -> Self {
        Self {
            allowed: true,
            remaining: limit,
            reset_at: now + Duration::seconds(window_seconds as i64),
        }
    }
}

/// Fixed-window counter over the shared cache store.
pub struct RateLimiter {
    store: Arc<dyn CacheStore>,
    clock: Arc<dyn Clock>,
}

impl RateLimiter {
    pub fn new(store: Arc<dyn CacheStore>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    /// Count one request against `(user_id, action)` and decide.
    pub async fn check(
        &self,
        user_id: &str,
        action: &str,
        limit: u32,
        window_seconds: u64,
    ) -> RateLimitDecision {
        let now = self.clock.now();
        let key = format!("rate_limit:{user_id}:{action}");

        let count = match self.store.incr(&key).await {
            Some(count) => count,
            None => {
                tracing::debug!(%key, "rate limit backend unavailable, allowing request");
                return RateLimitDecision::open(limit, now, window_seconds);
            }
        };

        // First hit opens the window
        if count == 1 {
            self.store.expire(&key, window_seconds).await;
        }

        let reset_at = match self.store.ttl(&key).await {
            Some(ttl) => now + Duration::seconds(ttl as i64),
            None => now + Duration::seconds(window_seconds as i64),
        };

        RateLimitDecision {
            allowed: count <= limit as i64,
            remaining: (limit as i64 - count).max(0) as u32,
            reset_at,
        }
    }
}

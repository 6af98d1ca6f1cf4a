//! Dataset cache
//!
//! Upload/read handlers keep parsed datasets warm in the same cache store
//! the gateway uses, under their own namespace and TTL policy: long-lived
//! entries whose TTL is refreshed on every read.

use super::CacheStore;
use serde_json::Value;
use std::sync::Arc;

/// Default dataset TTL: 7 days, refreshed on read.
pub const DEFAULT_DATASET_TTL_SECONDS: u64 = 7 * 24 * 60 * 60;

/// Namespaced dataset caching over a shared `CacheStore`.
pub struct DatasetCache {
    store: Arc<dyn CacheStore>,
    ttl_seconds: u64,
}

impl DatasetCache {
    pub fn new(store: Arc<dyn CacheStore>) -> Self {
        Self {
            store,
            ttl_seconds: DEFAULT_DATASET_TTL_SECONDS,
        }
    }

    pub fn with_ttl(mut self, ttl_seconds: u64) -> Self {
        self.ttl_seconds = ttl_seconds;
        self
    }

    fn key(user_id: &str, dataset_id: &str) -> String {
        format!("dataset:{user_id}:{dataset_id}")
    }

    /// Cache a dataset payload. Returns whether it was stored.
    pub async fn put(&self, user_id: &str, dataset_id: &str, payload: &Value) -> bool {
        let key = Self::key(user_id, dataset_id);
        let serialized = match serde_json::to_string(payload) {
            Ok(s) => s,
            Err(err) => {
                tracing::warn!(%key, %err, "dataset payload not serializable, skipping cache");
                return false;
            }
        };
        self.store.set(&key, &serialized, self.ttl_seconds).await
    }

    /// Fetch a cached dataset, refreshing its TTL on hit.
    pub async fn get(&self, user_id: &str, dataset_id: &str) -> Option<Value> {
        let key = Self::key(user_id, dataset_id);
        let raw = self.store.get(&key).await?;
        let payload = match serde_json::from_str(&raw) {
            Ok(v) => v,
            Err(err) => {
                tracing::warn!(%key, %err, "corrupt cached dataset, evicting");
                self.store.delete(&key).await;
                return None;
            }
        };
        self.store.expire(&key, self.ttl_seconds).await;
        Some(payload)
    }

    /// Drop a cached dataset (e.g. after re-upload).
    pub async fn invalidate(&self, user_id: &str, dataset_id: &str) -> bool {
        self.store.delete(&Self::key(user_id, dataset_id)).await
    }

    /// Push out the expiry without reading the payload.
    pub async fn extend_ttl(&self, user_id: &str, dataset_id: &str) -> bool {
        self.store
            .expire(&Self::key(user_id, dataset_id), self.ttl_seconds)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::MemoryStore;
    use crate::utils::ManualClock;
    use chrono::{Duration, TimeZone, Utc};

    fn cache_with_clock() -> (DatasetCache, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new(
            Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap(),
        ));
        let store = Arc::new(MemoryStore::new(clock.clone()));
        (DatasetCache::new(store), clock)
    }

    #[tokio::test]
    async fn test_put_get_roundtrip() {
        let (cache, _clock) = cache_with_clock();
        let payload = serde_json::json!({"rows": 120, "columns": ["date", "sales"]});

        assert!(cache.put("u1", "d1", &payload).await);
        assert_eq!(cache.get("u1", "d1").await, Some(payload));
    }

    #[tokio::test]
    async fn test_read_refreshes_ttl() {
        let (cache, clock) = cache_with_clock();
        let cache = cache.with_ttl(100);
        cache.put("u1", "d1", &serde_json::json!(1)).await;

        // Past the original window, but a read at 80s pushed expiry out
        clock.advance(Duration::seconds(80));
        assert!(cache.get("u1", "d1").await.is_some());
        clock.advance(Duration::seconds(80));
        assert!(cache.get("u1", "d1").await.is_some());
    }

    #[tokio::test]
    async fn test_invalidate() {
        let (cache, _clock) = cache_with_clock();
        cache.put("u1", "d1", &serde_json::json!(1)).await;
        assert!(cache.invalidate("u1", "d1").await);
        assert_eq!(cache.get("u1", "d1").await, None);
    }

    #[tokio::test]
    async fn test_users_are_isolated() {
        let (cache, _clock) = cache_with_clock();
        cache.put("u1", "d1", &serde_json::json!("mine")).await;
        assert_eq!(cache.get("u2", "d1").await, None);
    }

    #[tokio::test]
    async fn test_corrupt_entry_is_evicted() {
        let (cache, _clock) = cache_with_clock();
        cache.store.set("dataset:u1:d1", "{not json", 60).await;
        assert_eq!(cache.get("u1", "d1").await, None);
        assert_eq!(cache.store.get("dataset:u1:d1").await, None);
    }
}

//! In-process cache backend
//!
//! Backs local development and tests. Expiry is enforced lazily against the
//! injected clock on every access, mirroring how the remote backends expire
//! keys server-side.

use super::CacheStore;
use crate::utils::Clock;
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

#[derive(Debug, Clone)]
struct Entry {
    value: String,
    expires_at: Option<DateTime<Utc>>,
}

/// HashMap-backed `CacheStore` driven by an injectable clock.
pub struct MemoryStore {
    entries: Mutex<HashMap<String, Entry>>,
    clock: Arc<dyn Clock>,
}

impl MemoryStore {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            clock,
        }
    }

    /// Drop the entry if its TTL has passed. Returns the live entry, if any.
    fn live_entry(
        entries: &mut HashMap<String, Entry>,
        key: &str,
        now: DateTime<Utc>,
    ) -> Option<Entry> {
        match entries.get(key) {
            Some(entry) if entry.expires_at.is_some_and(|at| at <= now) => {
                entries.remove(key);
                None
            }
            Some(entry) => Some(entry.clone()),
            None => None,
        }
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.entries.lock().unwrap().len()
    }
}

#[async_trait]
impl CacheStore for MemoryStore {
    async fn get(&self, key: &str) -> Option<String> {
        let now = self.clock.now();
        let mut entries = self.entries.lock().unwrap();
        Self::live_entry(&mut entries, key, now).map(|e| e.value)
    }

    async fn set(&self, key: &str, value: &str, ttl_seconds: u64) -> bool {
        let expires_at = self.clock.now() + Duration::seconds(ttl_seconds as i64);
        let mut entries = self.entries.lock().unwrap();
        entries.insert(
            key.to_string(),
            Entry {
                value: value.to_string(),
                expires_at: Some(expires_at),
            },
        );
        true
    }

    async fn delete(&self, key: &str) -> bool {
        self.entries.lock().unwrap().remove(key);
        true
    }

    async fn expire(&self, key: &str, ttl_seconds: u64) -> bool {
        let now = self.clock.now();
        let mut entries = self.entries.lock().unwrap();
        if Self::live_entry(&mut entries, key, now).is_none() {
            return false;
        }
        if let Some(entry) = entries.get_mut(key) {
            entry.expires_at = Some(now + Duration::seconds(ttl_seconds as i64));
            return true;
        }
        false
    }

    async fn incr(&self, key: &str) -> Option<i64> {
        let now = self.clock.now();
        let mut entries = self.entries.lock().unwrap();
        let next = match Self::live_entry(&mut entries, key, now) {
            Some(entry) => entry.value.parse::<i64>().ok()? + 1,
            None => 1,
        };
        // A fresh counter has no TTL until expire() starts the window,
        // matching Redis INCR semantics.
        let expires_at = entries.get(key).and_then(|e| e.expires_at);
        entries.insert(
            key.to_string(),
            Entry {
                value: next.to_string(),
                expires_at,
            },
        );
        Some(next)
    }

    async fn ttl(&self, key: &str) -> Option<u64> {
        let now = self.clock.now();
        let mut entries = self.entries.lock().unwrap();
        let entry = Self::live_entry(&mut entries, key, now)?;
        let remaining = entry.expires_at? - now;
        Some(remaining.num_seconds().max(0) as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::ManualClock;
    use chrono::TimeZone;

    fn store_with_clock() -> (MemoryStore, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new(
            Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap(),
        ));
        (MemoryStore::new(clock.clone()), clock)
    }

    #[tokio::test]
    async fn test_set_get_roundtrip() {
        let (store, _clock) = store_with_clock();
        assert!(store.set("k", "v", 60).await);
        assert_eq!(store.get("k").await.as_deref(), Some("v"));
    }

    #[tokio::test]
    async fn test_entry_expires() {
        let (store, clock) = store_with_clock();
        store.set("k", "v", 60).await;

        clock.advance(Duration::seconds(61));
        assert_eq!(store.get("k").await, None);
        // Lazy expiry removed the entry
        assert_eq!(store.len(), 0);
    }

    #[tokio::test]
    async fn test_incr_starts_at_one_and_keeps_ttl() {
        let (store, clock) = store_with_clock();
        assert_eq!(store.incr("c").await, Some(1));
        assert!(store.expire("c", 30).await);
        assert_eq!(store.incr("c").await, Some(2));
        assert_eq!(store.ttl("c").await, Some(30));

        clock.advance(Duration::seconds(31));
        // Window elapsed, counter restarts
        assert_eq!(store.incr("c").await, Some(1));
    }

    #[tokio::test]
    async fn test_expire_on_missing_key() {
        let (store, _clock) = store_with_clock();
        assert!(!store.expire("missing", 10).await);
    }

    #[tokio::test]
    async fn test_ttl_counts_down() {
        let (store, clock) = store_with_clock();
        store.set("k", "v", 100).await;
        clock.advance(Duration::seconds(40));
        assert_eq!(store.ttl("k").await, Some(60));
    }
}

//! Feature key pool
//!
//! All credentials registered for one logical feature ("FORECAST",
//! "INSIGHTS", ...), behind a single pool-wide mutex. Pools are small
//! (≤10 keys), so one lock per feature is cheaper than per-key locking and
//! makes acquire-then-mark-trial atomic.

use super::credential::ApiKey;
use super::selector;
use crate::error::ProviderErrorKind;
use chrono::{DateTime, Duration, Utc};
use std::sync::Mutex;

/// Breaker and recovery parameters for one pool.
///
/// The defaults (3 failures, 2 min trial window, 5 min full reset) are
/// product defaults, not provider-derived constants; override them per
/// feature in configuration.
#[derive(Debug, Clone)]
pub struct PoolConfig {
    /// Consecutive failures that trip the breaker.
    pub failure_threshold: u32,
    /// Seconds a disabled key waits before one trial call is allowed.
    pub recovery_window_secs: u64,
    /// Seconds a recovering key must stay failure-free before it counts as
    /// healthy again.
    pub full_recovery_window_secs: u64,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 3,
            recovery_window_secs: 120,
            full_recovery_window_secs: 300,
        }
    }
}

impl PoolConfig {
    pub fn with_failure_threshold(mut self, threshold: u32) -> Self {
        self.failure_threshold = threshold;
        self
    }

    pub fn with_recovery_window(mut self, secs: u64) -> Self {
        self.recovery_window_secs = secs;
        self
    }

    pub fn with_full_recovery_window(mut self, secs: u64) -> Self {
        self.full_recovery_window_secs = secs;
        self
    }

    pub fn recovery_window(&self) -> Duration {
        Duration::seconds(self.recovery_window_secs as i64)
    }

    pub fn full_recovery_window(&self) -> Duration {
        Duration::seconds(self.full_recovery_window_secs as i64)
    }
}

/// An acquired credential, handed to the caller for the provider call.
///
/// Carries only the immutable identity; outcome recording goes back through
/// the gateway by id.
#[derive(Debug, Clone)]
pub struct KeyLease {
    pub feature: String,
    pub key_id: String,
    pub secret: String,
}

/// Snapshot of a pool's health.
#[derive(Debug, Clone, serde::Serialize)]
pub struct PoolStats {
    pub feature: String,
    pub total: usize,
    /// Keys the selector could pick right now.
    pub available: usize,
    pub disabled: usize,
    pub quota_exhausted: usize,
}

impl PoolStats {
    pub fn is_healthy(&self) -> bool {
        self.available > 0
    }
}

/// Credentials sharing one feature key.
#[derive(Debug)]
pub struct KeyPool {
    feature: String,
    config: PoolConfig,
    keys: Mutex<Vec<ApiKey>>,
}

impl KeyPool {
    pub fn new(feature: impl Into<String>, keys: Vec<ApiKey>, config: PoolConfig) -> Self {
        Self {
            feature: feature.into(),
            config,
            keys: Mutex::new(keys),
        }
    }

    pub fn feature(&self) -> &str {
        &self.feature
    }

    pub fn len(&self) -> usize {
        self.keys.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.lock().unwrap().is_empty()
    }

    /// Select the best eligible key and consume one unit of its capacity.
    ///
    /// The capacity increment happens here, not on success, so concurrent
    /// callers cannot over-subscribe one key. Returns `None` when the pool
    /// has nothing eligible; the gateway never queues for a key.
    pub fn acquire(&self, now: DateTime<Utc>) -> Option<KeyLease> {
        let mut keys = self.keys.lock().unwrap();
        for key in keys.iter_mut() {
            key.refresh(now, &self.config);
        }

        let idx = selector::select(&keys, now, &self.config)?;
        let key = &mut keys[idx];
        key.begin_lease(now);
        tracing::debug!(
            feature = %self.feature,
            key_id = key.id(),
            used_today = key.used_today(),
            "acquired credential"
        );

        Some(KeyLease {
            feature: self.feature.clone(),
            key_id: key.id().to_string(),
            secret: key.secret().to_string(),
        })
    }

    /// Record a successful provider call for a leased key.
    pub fn record_success(&self, key_id: &str, latency_ms: u32, now: DateTime<Utc>) {
        let mut keys = self.keys.lock().unwrap();
        if let Some(key) = keys.iter_mut().find(|k| k.id() == key_id) {
            key.record_success(latency_ms, now, &self.config);
        }
    }

    /// Record a failed provider call for a leased key. Returns `true` when
    /// the failure disabled the key.
    pub fn record_failure(&self, key_id: &str, kind: ProviderErrorKind, now: DateTime<Utc>) -> bool {
        let mut keys = self.keys.lock().unwrap();
        let Some(key) = keys.iter_mut().find(|k| k.id() == key_id) else {
            return false;
        };
        let disabled = key.record_failure(kind, now, &self.config);
        if disabled {
            tracing::warn!(
                feature = %self.feature,
                key_id,
                failures = key.consecutive_failures(),
                %kind,
                "credential disabled"
            );
        }
        disabled
    }

    pub fn stats(&self, now: DateTime<Utc>) -> PoolStats {
        let keys = self.keys.lock().unwrap();
        PoolStats {
            feature: self.feature.clone(),
            total: keys.len(),
            available: keys
                .iter()
                .filter(|k| k.selectable(now, &self.config))
                .count(),
            disabled: keys
                .iter()
                .filter(|k| k.status() == super::credential::KeyStatus::Disabled)
                .count(),
            quota_exhausted: keys.iter().filter(|k| k.quota_exhausted()).count(),
        }
    }

    /// Per-key usage counters, in insertion order.
    pub fn usage(&self) -> Vec<(String, u32)> {
        self.keys
            .lock()
            .unwrap()
            .iter()
            .map(|k| (k.id().to_string(), k.used_today()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at_noon() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap()
    }

    fn test_pool(n: usize, capacity: u32, now: DateTime<Utc>) -> KeyPool {
        let keys = (1..=n)
            .map(|i| ApiKey::new(format!("x-{i}"), format!("sk-{i}"), capacity, now.date_naive()))
            .collect();
        KeyPool::new("X", keys, PoolConfig::default())
    }

    #[test]
    fn test_empty_pool_returns_none() {
        let pool = KeyPool::new("X", vec![], PoolConfig::default());
        assert!(pool.acquire(at_noon()).is_none());
        assert!(pool.is_empty());
    }

    #[test]
    fn test_two_equal_keys_balance_within_one() {
        let now = at_noon();
        let pool = test_pool(2, 10, now);

        for _ in 0..15 {
            assert!(pool.acquire(now).is_some());
        }

        let usage = pool.usage();
        let a = usage[0].1 as i64;
        let b = usage[1].1 as i64;
        assert!((a - b).abs() <= 1, "usage diverged: {usage:?}");
    }

    #[test]
    fn test_pool_exhausts_at_capacity() {
        let now = at_noon();
        let pool = test_pool(2, 3, now);

        for _ in 0..6 {
            assert!(pool.acquire(now).is_some());
        }
        assert!(pool.acquire(now).is_none());

        let stats = pool.stats(now);
        assert_eq!(stats.quota_exhausted, 2);
        assert!(!stats.is_healthy());
    }

    #[test]
    fn test_failed_key_excluded_then_single_trial() {
        let now = at_noon();
        let pool = test_pool(1, 100, now);

        let lease = pool.acquire(now).unwrap();
        for _ in 0..3 {
            pool.record_failure(&lease.key_id, ProviderErrorKind::Transient, now);
        }
        assert!(pool.acquire(now).is_none());

        let boundary = now + PoolConfig::default().recovery_window();
        // Exactly one trial at the boundary
        let trial = pool.acquire(boundary).unwrap();
        assert_eq!(trial.key_id, lease.key_id);
        assert!(pool.acquire(boundary).is_none());

        // Trial success makes the key selectable again
        pool.record_success(&trial.key_id, 200, boundary);
        assert!(pool.acquire(boundary).is_some());
    }

    #[test]
    fn test_abandoned_trial_does_not_wedge_key() {
        let now = at_noon();
        let pool = test_pool(1, 100, now);

        let lease = pool.acquire(now).unwrap();
        for _ in 0..3 {
            pool.record_failure(&lease.key_id, ProviderErrorKind::Transient, now);
        }

        // Trial lease dropped without ever recording an outcome
        let boundary = now + PoolConfig::default().recovery_window();
        let trial = pool.acquire(boundary).unwrap();
        drop(trial);
        assert!(pool.acquire(boundary).is_none());

        // The stale trial expires; a fresh one is granted much later
        let later = boundary + Duration::days(10);
        assert!(pool.acquire(later).is_some());
    }

    #[test]
    fn test_failover_to_remaining_key() {
        let now = at_noon();
        let pool = test_pool(2, 100, now);

        let lease = pool.acquire(now).unwrap();
        for _ in 0..3 {
            pool.record_failure(&lease.key_id, ProviderErrorKind::Transient, now);
        }

        // All further traffic lands on the surviving key
        for _ in 0..5 {
            let next = pool.acquire(now).unwrap();
            assert_ne!(next.key_id, lease.key_id);
        }
    }

    #[test]
    fn test_stats_track_disabled_keys() {
        let now = at_noon();
        let pool = test_pool(3, 100, now);

        let lease = pool.acquire(now).unwrap();
        for _ in 0..3 {
            pool.record_failure(&lease.key_id, ProviderErrorKind::Transient, now);
        }

        let stats = pool.stats(now);
        assert_eq!(stats.total, 3);
        assert_eq!(stats.disabled, 1);
        assert_eq!(stats.available, 2);
        assert!(stats.is_healthy());
    }

    #[test]
    fn test_daily_reset_on_acquire() {
        let now = at_noon();
        let pool = test_pool(1, 1, now);
        assert!(pool.acquire(now).is_some());
        assert!(pool.acquire(now).is_none());

        let next_day = now + Duration::hours(13);
        assert!(pool.acquire(next_day).is_some());
    }
}

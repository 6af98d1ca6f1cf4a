//! Gateway facade
//!
//! The only entry point feature handlers use. Owns the per-feature key
//! pools, the shared cache store, and the rate limiter; constructed once at
//! process start and passed by reference to handlers. There is no hidden
//! global state, so tests build a fresh gateway per case.
//!
//! The gateway never blocks or queues waiting for a key: when a feature's
//! pool has nothing eligible the caller gets `NoKeyAvailable` immediately
//! and falls back to its non-AI heuristic answer.

use crate::cache::{build_store, CacheStore, DatasetCache};
use crate::config::Settings;
use crate::error::{GatewayError, ProviderErrorKind};
use crate::rate_limit::{RateLimitDecision, RateLimiter};
use crate::services::key_pool::{ApiKey, KeyLease, KeyPool, PoolConfig, PoolStats};
use crate::services::provider::Provider;
use crate::utils::{Clock, SystemClock};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Result of a provider call, reported back to update credential health.
#[derive(Debug, Clone, Copy)]
pub enum CallOutcome {
    Success { latency_ms: u32 },
    Failure { kind: ProviderErrorKind },
}

/// A value from `with_cache`, tagged with whether it was served from cache.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cached<T> {
    pub value: T,
    pub cached: bool,
}

/// Facade over credential pools, response cache, and rate limiting.
pub struct Gateway {
    pools: HashMap<String, KeyPool>,
    store: Arc<dyn CacheStore>,
    limiter: RateLimiter,
    datasets: DatasetCache,
    clock: Arc<dyn Clock>,
    provider_timeout: Duration,
}

impl Gateway {
    /// Build a gateway from settings with an explicit store and clock.
    pub fn new(settings: &Settings, store: Arc<dyn CacheStore>, clock: Arc<dyn Clock>) -> Self {
        let today = clock.now().date_naive();
        let mut pools = HashMap::new();
        for feature in &settings.features {
            let keys: Vec<ApiKey> = feature
                .keys
                .iter()
                .enumerate()
                .map(|(i, key)| {
                    ApiKey::new(
                        format!("{}-{}", feature.name.to_lowercase(), i + 1),
                        key.secret.clone(),
                        key.daily_capacity,
                        today,
                    )
                })
                .collect();
            let config = PoolConfig::default()
                .with_failure_threshold(feature.resilience.failure_threshold)
                .with_recovery_window(feature.resilience.recovery_window_secs)
                .with_full_recovery_window(feature.resilience.full_recovery_window_secs);
            tracing::info!(
                feature = %feature.name,
                keys = keys.len(),
                "registered feature pool"
            );
            pools.insert(
                feature.name.clone(),
                KeyPool::new(feature.name.clone(), keys, config),
            );
        }

        Self {
            pools,
            store: store.clone(),
            limiter: RateLimiter::new(store.clone(), clock.clone()),
            datasets: DatasetCache::new(store),
            clock,
            provider_timeout: Duration::from_secs(settings.provider_timeout_secs),
        }
    }

    /// Build a gateway from settings, constructing the configured cache
    /// backend and the system clock.
    pub async fn from_settings(settings: &Settings) -> anyhow::Result<Self> {
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);
        let store = build_store(&settings.cache, clock.clone()).await?;
        Ok(Self::new(settings, store, clock))
    }

    /// Load settings from the environment and build the gateway.
    pub async fn from_env() -> anyhow::Result<Self> {
        let settings = Settings::load()?;
        Self::from_settings(&settings).await
    }

    /// Acquire the best eligible credential for a feature.
    ///
    /// Consumes one unit of the key's daily capacity up front, so
    /// concurrent callers cannot over-subscribe a key that later fails.
    pub fn acquire(&self, feature: &str) -> Result<KeyLease, GatewayError> {
        let name = feature.to_uppercase();
        let Some(pool) = self.pools.get(&name) else {
            tracing::warn!(feature = %name, "acquire for unconfigured feature");
            return Err(GatewayError::no_key(name));
        };
        pool.acquire(self.clock.now()).ok_or_else(|| {
            tracing::warn!(feature = %name, "no eligible credential");
            GatewayError::no_key(name)
        })
    }

    /// Report how a provider call with a leased key went.
    pub fn record_outcome(&self, lease: &KeyLease, outcome: CallOutcome) {
        let Some(pool) = self.pools.get(&lease.feature) else {
            return;
        };
        let now = self.clock.now();
        match outcome {
            CallOutcome::Success { latency_ms } => {
                pool.record_success(&lease.key_id, latency_ms, now);
            }
            CallOutcome::Failure { kind } => {
                pool.record_failure(&lease.key_id, kind, now);
            }
        }
    }

    /// Memoize an expensive computation in the shared cache.
    ///
    /// A hit short-circuits with `cached = true`; on a miss the computed
    /// value is stored for `ttl_seconds` only when `compute` succeeds.
    /// Cache failures are invisible here: they degrade to computing.
    pub async fn with_cache<T, E, F, Fut>(
        &self,
        namespace: &str,
        key: &str,
        ttl_seconds: u64,
        compute: F,
    ) -> Result<Cached<T>, E>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let cache_key = format!("{namespace}:{key}");

        if let Some(raw) = self.store.get(&cache_key).await {
            match serde_json::from_str(&raw) {
                Ok(value) => {
                    tracing::debug!(key = %cache_key, "cache hit");
                    return Ok(Cached {
                        value,
                        cached: true,
                    });
                }
                Err(err) => {
                    tracing::warn!(key = %cache_key, %err, "corrupt cache entry, evicting");
                    self.store.delete(&cache_key).await;
                }
            }
        }

        let value = compute().await?;
        match serde_json::to_string(&value) {
            Ok(serialized) => {
                self.store.set(&cache_key, &serialized, ttl_seconds).await;
            }
            Err(err) => {
                tracing::warn!(key = %cache_key, %err, "result not serializable, skipping cache");
            }
        }
        Ok(Cached {
            value,
            cached: false,
        })
    }

    /// Count one request against the per-user budget for an action.
    pub async fn check_rate_limit(
        &self,
        user_id: &str,
        action: &str,
        limit: u32,
        window_seconds: u64,
    ) -> RateLimitDecision {
        self.limiter.check(user_id, action, limit, window_seconds).await
    }

    /// Dataset caching for the upload/read handlers.
    pub fn datasets(&self) -> &DatasetCache {
        &self.datasets
    }

    /// Health snapshot of every feature pool.
    pub fn pool_stats(&self) -> Vec<PoolStats> {
        let now = self.clock.now();
        let mut stats: Vec<PoolStats> = self.pools.values().map(|p| p.stats(now)).collect();
        stats.sort_by(|a, b| a.feature.cmp(&b.feature));
        stats
    }

    /// Acquire, call the provider, record the outcome, and fail over to the
    /// next credential on per-key errors.
    ///
    /// Tries at most as many credentials as the pool holds. Propagates the
    /// last provider error once the pool is exhausted, or `NoKeyAvailable`
    /// when nothing was eligible to begin with.
    pub async fn call_with_failover(
        &self,
        feature: &str,
        provider: &dyn Provider,
        prompt: &str,
    ) -> Result<String, GatewayError> {
        let name = feature.to_uppercase();
        let attempts = self.pools.get(&name).map(|p| p.len()).unwrap_or(0).max(1);

        let mut last_error: Option<GatewayError> = None;
        for _ in 0..attempts {
            let lease = match self.acquire(&name) {
                Ok(lease) => lease,
                Err(err) => return Err(last_error.unwrap_or(err)),
            };

            let started = Instant::now();
            match provider.call(&lease, prompt, self.provider_timeout).await {
                Ok(text) => {
                    self.record_outcome(
                        &lease,
                        CallOutcome::Success {
                            latency_ms: started.elapsed().as_millis() as u32,
                        },
                    );
                    return Ok(text);
                }
                Err(err) => {
                    tracing::warn!(
                        feature = %name,
                        key_id = %lease.key_id,
                        kind = %err.kind,
                        "provider call failed, trying next credential"
                    );
                    self.record_outcome(&lease, CallOutcome::Failure { kind: err.kind });
                    last_error = Some(err.into());
                }
            }
        }
        Err(last_error.unwrap_or_else(|| GatewayError::no_key(name)))
    }
}

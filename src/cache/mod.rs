//! Cache store abstraction
//!
//! One `CacheStore` trait over interchangeable backends: a persistent
//! Redis-backed store, a stateless REST store for ephemeral/serverless
//! execution, and an in-process memory store for local development and
//! tests. The backend is chosen once at startup, never per call.
//!
//! Every operation is fail-open. Caching and rate limiting are
//! optimizations, not correctness requirements, so an unreachable backend
//! degrades to "miss"/"not stored" with a warning instead of raising into
//! the caller's business logic. Backend I/O runs under a short per-op
//! timeout so a slow cache cannot stall the request path; a timeout is
//! treated identically to a backend error.

mod dataset;
mod memory;
mod redis_store;
mod rest_store;

pub use dataset::DatasetCache;
pub use memory::MemoryStore;
pub use redis_store::RedisStore;
pub use rest_store::RestStore;

use crate::config::{CacheBackend, CacheConfig};
use crate::utils::Clock;
use anyhow::Context;
use async_trait::async_trait;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Internal backend error. Never crosses the `CacheStore` boundary; trait
/// implementations convert it into the fail-open return values below.
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("cache backend error: {0}")]
    Backend(String),

    #[error("cache operation timed out after {0:?}")]
    Timeout(Duration),
}

/// Uniform get/set/expire/delete over a TTL-enforcing backend.
///
/// Return values encode the fail-open contract: `get`/`incr`/`ttl` return
/// `None` on miss *or* backend failure, `set`/`delete`/`expire` return
/// `false` when the write did not happen. Callers must treat both the same
/// way.
#[async_trait]
pub trait CacheStore: Send + Sync {
    /// Fetch a value. `None` means miss, expired, or backend unavailable.
    async fn get(&self, key: &str) -> Option<String>;

    /// Store a value with a TTL. Returns whether the write happened.
    async fn set(&self, key: &str, value: &str, ttl_seconds: u64) -> bool;

    /// Remove a key. Absence from the backend is deletion, so deleting a
    /// missing key still returns `true`.
    async fn delete(&self, key: &str) -> bool;

    /// Reset a key's TTL without touching its value.
    async fn expire(&self, key: &str, ttl_seconds: u64) -> bool;

    /// Atomically increment a counter, creating it at 1. The counter keeps
    /// any TTL already set on the key.
    async fn incr(&self, key: &str) -> Option<i64>;

    /// Remaining TTL in seconds, if the key exists and has one.
    async fn ttl(&self, key: &str) -> Option<u64>;
}

/// Apply the per-operation timeout to a backend call.
pub(crate) async fn with_op_timeout<T>(
    limit: Duration,
    fut: impl Future<Output = Result<T, CacheError>>,
) -> Result<T, CacheError> {
    match tokio::time::timeout(limit, fut).await {
        Ok(res) => res,
        Err(_) => Err(CacheError::Timeout(limit)),
    }
}

/// Kill-switch store (`ENABLE_CACHE=false`): every operation no-ops.
///
/// The gateway keeps working, simply uncached and unlimited. No logging
/// here; being off is intentional, not a failure.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopStore;

#[async_trait]
impl CacheStore for NoopStore {
    async fn get(&self, _key: &str) -> Option<String> {
        None
    }

    async fn set(&self, _key: &str, _value: &str, _ttl_seconds: u64) -> bool {
        false
    }

    async fn delete(&self, _key: &str) -> bool {
        false
    }

    async fn expire(&self, _key: &str, _ttl_seconds: u64) -> bool {
        false
    }

    async fn incr(&self, _key: &str) -> Option<i64> {
        None
    }

    async fn ttl(&self, _key: &str) -> Option<u64> {
        None
    }
}

/// Build the configured cache store.
///
/// Backend selection is a startup-time decision. Connection errors here are
/// real configuration errors and propagate; runtime errors after startup
/// are fail-open.
pub async fn build_store(
    config: &CacheConfig,
    clock: Arc<dyn Clock>,
) -> anyhow::Result<Arc<dyn CacheStore>> {
    if !config.enabled {
        tracing::info!("cache disabled by kill-switch, using no-op store");
        return Ok(Arc::new(NoopStore));
    }

    let op_timeout = Duration::from_millis(config.op_timeout_ms);
    let store: Arc<dyn CacheStore> = match config.backend {
        CacheBackend::Redis => {
            let store = RedisStore::connect(&config.redis_url, op_timeout)
                .await
                .with_context(|| format!("connecting to redis at {}", config.redis_url))?;
            tracing::info!(url = %config.redis_url, "using redis cache backend");
            Arc::new(store)
        }
        CacheBackend::Rest => {
            let url = config
                .rest_url
                .as_deref()
                .context("CACHE_REST_URL is required for the rest backend")?;
            let token = config
                .rest_token
                .as_deref()
                .context("CACHE_REST_TOKEN is required for the rest backend")?;
            tracing::info!(url = %url, "using REST cache backend");
            Arc::new(RestStore::new(url, token, op_timeout)?)
        }
        CacheBackend::Memory => {
            tracing::info!("using in-process memory cache backend");
            Arc::new(MemoryStore::new(clock))
        }
    };

    Ok(store)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_noop_store_noops() {
        let store = NoopStore;
        assert!(!store.set("k", "v", 60).await);
        assert_eq!(store.get("k").await, None);
        assert_eq!(store.incr("k").await, None);
        assert_eq!(store.ttl("k").await, None);
        assert!(!store.expire("k", 60).await);
        assert!(!store.delete("k").await);
    }

    #[tokio::test]
    async fn test_op_timeout_fires() {
        let result: Result<(), CacheError> =
            with_op_timeout(Duration::from_millis(10), async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Ok(())
            })
            .await;

        match result {
            Err(CacheError::Timeout(limit)) => {
                assert_eq!(limit, Duration::from_millis(10));
            }
            other => panic!("expected timeout, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_op_timeout_passes_through() {
        let result = with_op_timeout(Duration::from_secs(1), async { Ok(7) }).await;
        assert_eq!(result.unwrap(), 7);
    }
}

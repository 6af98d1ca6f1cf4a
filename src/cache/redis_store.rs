//! Persistent cache backend (Redis)
//!
//! Connection-pooled, process-local deployments go through this backend.
//! The tokio connection manager reconnects on its own; individual command
//! failures while it does so fall under the fail-open policy.

use super::{with_op_timeout, CacheError, CacheStore};
use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use std::time::Duration;

/// `CacheStore` over a Redis connection manager.
pub struct RedisStore {
    manager: ConnectionManager,
    op_timeout: Duration,
}

impl RedisStore {
    /// Open the client and establish the managed connection.
    pub async fn connect(url: &str, op_timeout: Duration) -> Result<Self, CacheError> {
        let client = redis::Client::open(url).map_err(backend_err)?;
        let manager = ConnectionManager::new(client).await.map_err(backend_err)?;
        Ok(Self {
            manager,
            op_timeout,
        })
    }

    async fn try_get(&self, key: &str) -> Result<Option<String>, CacheError> {
        let mut conn = self.manager.clone();
        conn.get(key).await.map_err(backend_err)
    }

    async fn try_set(&self, key: &str, value: &str, ttl_seconds: u64) -> Result<(), CacheError> {
        let mut conn = self.manager.clone();
        conn.set_ex(key, value, ttl_seconds).await.map_err(backend_err)
    }

    async fn try_delete(&self, key: &str) -> Result<(), CacheError> {
        let mut conn = self.manager.clone();
        conn.del(key).await.map_err(backend_err)
    }

    async fn try_expire(&self, key: &str, ttl_seconds: u64) -> Result<bool, CacheError> {
        let mut conn = self.manager.clone();
        conn.expire(key, ttl_seconds as i64).await.map_err(backend_err)
    }

    async fn try_incr(&self, key: &str) -> Result<i64, CacheError> {
        let mut conn = self.manager.clone();
        conn.incr(key, 1).await.map_err(backend_err)
    }

    async fn try_ttl(&self, key: &str) -> Result<i64, CacheError> {
        let mut conn = self.manager.clone();
        conn.ttl(key).await.map_err(backend_err)
    }
}

fn backend_err(err: redis::RedisError) -> CacheError {
    CacheError::Backend(err.to_string())
}

#[async_trait]
impl CacheStore for RedisStore {
    async fn get(&self, key: &str) -> Option<String> {
        match with_op_timeout(self.op_timeout, self.try_get(key)).await {
            Ok(value) => value,
            Err(err) => {
                tracing::warn!(key, %err, "redis get failed, treating as miss");
                None
            }
        }
    }

    async fn set(&self, key: &str, value: &str, ttl_seconds: u64) -> bool {
        match with_op_timeout(self.op_timeout, self.try_set(key, value, ttl_seconds)).await {
            Ok(()) => true,
            Err(err) => {
                tracing::warn!(key, %err, "redis set failed, value not cached");
                false
            }
        }
    }

    async fn delete(&self, key: &str) -> bool {
        match with_op_timeout(self.op_timeout, self.try_delete(key)).await {
            Ok(()) => true,
            Err(err) => {
                tracing::warn!(key, %err, "redis delete failed");
                false
            }
        }
    }

    async fn expire(&self, key: &str, ttl_seconds: u64) -> bool {
        match with_op_timeout(self.op_timeout, self.try_expire(key, ttl_seconds)).await {
            Ok(applied) => applied,
            Err(err) => {
                tracing::warn!(key, %err, "redis expire failed");
                false
            }
        }
    }

    async fn incr(&self, key: &str) -> Option<i64> {
        match with_op_timeout(self.op_timeout, self.try_incr(key)).await {
            Ok(count) => Some(count),
            Err(err) => {
                tracing::warn!(key, %err, "redis incr failed");
                None
            }
        }
    }

    async fn ttl(&self, key: &str) -> Option<u64> {
        match with_op_timeout(self.op_timeout, self.try_ttl(key)).await {
            // Redis reports -1 (no TTL) and -2 (no key) as negatives
            Ok(seconds) if seconds >= 0 => Some(seconds as u64),
            Ok(_) => None,
            Err(err) => {
                tracing::warn!(key, %err, "redis ttl lookup failed");
                None
            }
        }
    }
}

//! Stateless REST cache backend
//!
//! Talks to an Upstash-style HTTP front for Redis: one POST per command,
//! bearer-token auth, JSON `{"result": ...}` replies. No connection state,
//! which is what ephemeral/serverless deployments need.

use super::{with_op_timeout, CacheError, CacheStore};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use std::time::Duration;

#[derive(Debug, Deserialize)]
struct RestReply {
    #[serde(default)]
    result: Option<Value>,
    #[serde(default)]
    error: Option<String>,
}

/// `CacheStore` over a stateless REST command endpoint.
pub struct RestStore {
    client: reqwest::Client,
    base_url: String,
    token: String,
    op_timeout: Duration,
}

impl RestStore {
    pub fn new(base_url: &str, token: &str, op_timeout: Duration) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(op_timeout)
            .build()?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            token: token.to_string(),
            op_timeout,
        })
    }

    /// Execute a single command, e.g. `["SET", key, value, "EX", "60"]`.
    async fn execute(&self, command: &[&str]) -> Result<Value, CacheError> {
        let response = self
            .client
            .post(&self.base_url)
            .bearer_auth(&self.token)
            .json(&command)
            .send()
            .await
            .map_err(|err| CacheError::Backend(err.to_string()))?;

        if !response.status().is_success() {
            return Err(CacheError::Backend(format!(
                "unexpected status {}",
                response.status()
            )));
        }

        let reply: RestReply = response
            .json()
            .await
            .map_err(|err| CacheError::Backend(err.to_string()))?;

        if let Some(error) = reply.error {
            return Err(CacheError::Backend(error));
        }
        Ok(reply.result.unwrap_or(Value::Null))
    }

    fn as_int(value: &Value) -> Option<i64> {
        match value {
            Value::Number(n) => n.as_i64(),
            Value::String(s) => s.parse().ok(),
            _ => None,
        }
    }
}

#[async_trait]
impl CacheStore for RestStore {
    async fn get(&self, key: &str) -> Option<String> {
        let cmd = ["GET", key];
        match with_op_timeout(self.op_timeout, self.execute(&cmd)).await {
            Ok(Value::String(value)) => Some(value),
            Ok(_) => None,
            Err(err) => {
                tracing::warn!(key, %err, "rest cache get failed, treating as miss");
                None
            }
        }
    }

    async fn set(&self, key: &str, value: &str, ttl_seconds: u64) -> bool {
        let ttl = ttl_seconds.to_string();
        let cmd = ["SET", key, value, "EX", ttl.as_str()];
        match with_op_timeout(self.op_timeout, self.execute(&cmd)).await {
            Ok(_) => true,
            Err(err) => {
                tracing::warn!(key, %err, "rest cache set failed, value not cached");
                false
            }
        }
    }

    async fn delete(&self, key: &str) -> bool {
        let cmd = ["DEL", key];
        match with_op_timeout(self.op_timeout, self.execute(&cmd)).await {
            Ok(_) => true,
            Err(err) => {
                tracing::warn!(key, %err, "rest cache delete failed");
                false
            }
        }
    }

    async fn expire(&self, key: &str, ttl_seconds: u64) -> bool {
        let ttl = ttl_seconds.to_string();
        let cmd = ["EXPIRE", key, ttl.as_str()];
        match with_op_timeout(self.op_timeout, self.execute(&cmd)).await {
            Ok(value) => Self::as_int(&value) == Some(1),
            Err(err) => {
                tracing::warn!(key, %err, "rest cache expire failed");
                false
            }
        }
    }

    async fn incr(&self, key: &str) -> Option<i64> {
        let cmd = ["INCR", key];
        match with_op_timeout(self.op_timeout, self.execute(&cmd)).await {
            Ok(value) => Self::as_int(&value),
            Err(err) => {
                tracing::warn!(key, %err, "rest cache incr failed");
                None
            }
        }
    }

    async fn ttl(&self, key: &str) -> Option<u64> {
        let cmd = ["TTL", key];
        match with_op_timeout(self.op_timeout, self.execute(&cmd)).await {
            Ok(value) => match Self::as_int(&value) {
                Some(seconds) if seconds >= 0 => Some(seconds as u64),
                _ => None,
            },
            Err(err) => {
                tracing::warn!(key, %err, "rest cache ttl lookup failed");
                None
            }
        }
    }
}

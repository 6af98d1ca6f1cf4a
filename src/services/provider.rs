//! Provider call contract
//!
//! The gateway never talks to an LLM provider itself; feature handlers (or
//! the failover helper) do, through this trait. The gateway only consumes
//! the error *kind* to update credential health.

use crate::error::ProviderError;
use crate::services::key_pool::KeyLease;
use async_trait::async_trait;
use std::time::Duration;

/// External LLM provider client.
#[async_trait]
pub trait Provider: Send + Sync {
    /// Send one prompt with the leased credential. Implementations must
    /// respect `timeout` and classify failures into a `ProviderErrorKind`.
    async fn call(
        &self,
        lease: &KeyLease,
        prompt: &str,
        timeout: Duration,
    ) -> Result<String, ProviderError>;
}

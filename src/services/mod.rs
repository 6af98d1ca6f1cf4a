//! Core services: the gateway facade, credential pooling, and the provider
//! contract.

pub mod gateway;
pub mod key_pool;
pub mod provider;

pub use gateway::{CallOutcome, Cached, Gateway};
pub use key_pool::{ApiKey, KeyLease, KeyPool, KeyStatus, PoolConfig, PoolStats};
pub use provider::Provider;

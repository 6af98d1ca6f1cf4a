//! Credential pooling: per-feature key pools, the embedded per-key circuit
//! breaker, and the scoring selector.

mod credential;
mod pool;
mod selector;

pub use credential::{ApiKey, KeyStatus, LATENCY_SAMPLES};
pub use pool::{KeyLease, KeyPool, PoolConfig, PoolStats};

//! Resilience and caching layer between dashboard feature handlers and
//! hosted LLM providers.
//!
//! Every feature (insight generation, forecasting, chart specs, anomaly
//! explanation, chat) goes through one [`Gateway`]: it hands out the best
//! available provider credential, tracks per-key health through a circuit
//! breaker, memoizes expensive responses, and enforces per-user usage
//! budgets. Cache and rate-limit infrastructure is fail-open throughout;
//! only `NoKeyAvailable` and provider errors ever reach a handler.

// Public modules
pub mod cache;
pub mod config;
pub mod error;
pub mod rate_limit;
pub mod services;
pub mod utils;

// Re-export commonly used types
pub use cache::{CacheStore, DatasetCache};
pub use config::Settings;
pub use error::{GatewayError, ProviderError, ProviderErrorKind};
pub use rate_limit::{RateLimitDecision, RateLimiter};
pub use services::{CallOutcome, Cached, Gateway, KeyLease, Provider};
pub use utils::{Clock, ManualClock, SystemClock};

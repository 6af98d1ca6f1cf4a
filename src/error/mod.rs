//! Error types

mod types;

pub use types::{GatewayError, ProviderError, ProviderErrorKind};

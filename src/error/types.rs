//! Gateway error types

use thiserror::Error;

/// Classification of a provider call failure.
///
/// The gateway only cares about the kind, never the provider-specific
/// payload: the kind decides whether the credential is penalized, marked
/// quota-exhausted, or revoked.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderErrorKind {
    /// Network error, 5xx, or timeout. Counts against the circuit breaker;
    /// the caller may retry with a different credential.
    Transient,
    /// Provider-reported rate/quota limit. Exhausts the credential for the
    /// rest of the UTC day without penalizing its health.
    QuotaExceeded,
    /// Invalid or revoked credential. Disables the credential permanently
    /// until an operator rotates it.
    AuthFailed,
}

impl std::fmt::Display for ProviderErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Transient => write!(f, "transient"),
            Self::QuotaExceeded => write!(f, "quota_exceeded"),
            Self::AuthFailed => write!(f, "auth_failed"),
        }
    }
}

/// Error returned by a provider call.
#[derive(Debug, Clone, Error)]
#[error("provider error ({kind}): {message}")]
pub struct ProviderError {
    pub kind: ProviderErrorKind,
    pub message: String,
}

impl ProviderError {
    pub fn new(kind: ProviderErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn transient(message: impl Into<String>) -> Self {
        Self::new(ProviderErrorKind::Transient, message)
    }

    pub fn quota_exceeded(message: impl Into<String>) -> Self {
        Self::new(ProviderErrorKind::QuotaExceeded, message)
    }

    pub fn auth_failed(message: impl Into<String>) -> Self {
        Self::new(ProviderErrorKind::AuthFailed, message)
    }
}

/// Errors surfaced to feature handlers.
///
/// Cache and rate-limit failures never appear here: those paths are
/// fail-open and absorbed inside the gateway.
#[derive(Debug, Error)]
pub enum GatewayError {
    /// Every credential for the feature is disabled or quota-exhausted (or
    /// none were configured). The handler should fall back to its non-AI
    /// heuristic answer.
    #[error("no API key available for feature '{feature}'")]
    NoKeyAvailable { feature: String },

    /// The provider failed on every credential the gateway tried.
    #[error(transparent)]
    Provider(#[from] ProviderError),

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl GatewayError {
    pub fn no_key(feature: impl Into<String>) -> Self {
        Self::NoKeyAvailable {
            feature: feature.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_provider_error_display() {
        let err = ProviderError::transient("connection reset");
        assert_eq!(err.kind, ProviderErrorKind::Transient);
        assert!(err.to_string().contains("transient"));
        assert!(err.to_string().contains("connection reset"));
    }

    #[test]
    fn test_no_key_error_names_feature() {
        let err = GatewayError::no_key("FORECAST");
        assert!(err.to_string().contains("FORECAST"));
    }

    #[test]
    fn test_provider_error_converts() {
        let err: GatewayError = ProviderError::auth_failed("revoked").into();
        match err {
            GatewayError::Provider(p) => assert_eq!(p.kind, ProviderErrorKind::AuthFailed),
            other => panic!("unexpected error: {other}"),
        }
    }
}

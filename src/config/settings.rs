//! Application settings
//!
//! Everything is environment-driven and assembled exactly once at startup.
//! Credentials follow the `{FEATURE}_KEY_{N}` convention for `N` in 1..=10;
//! the first gap stops enumeration for that feature. Nothing re-scans the
//! environment at runtime.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::env;
use std::fmt;
use std::str::FromStr;

/// Upper bound on enumerated keys per feature.
pub const MAX_KEYS_PER_FEATURE: usize = 10;

/// Features the dashboard ships with, used when `GATEWAY_FEATURES` is not
/// set.
pub const DEFAULT_FEATURES: &[&str] = &["INSIGHTS", "FORECAST", "CHART", "ANOMALY", "CHAT"];

/// Which cache backend to construct at startup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CacheBackend {
    /// Persistent connection-managed Redis store.
    #[default]
    Redis,
    /// Stateless HTTP store for ephemeral/serverless execution.
    Rest,
    /// In-process store for local development and tests.
    Memory,
}

impl CacheBackend {
    /// Parse from string (case-insensitive); unknown values fall back to
    /// the default backend.
    pub fn parse(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "redis" | "persistent" => Self::Redis,
            "rest" | "stateless" => Self::Rest,
            "memory" => Self::Memory,
            _ => Self::Redis,
        }
    }
}

impl fmt::Display for CacheBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Redis => write!(f, "redis"),
            Self::Rest => write!(f, "rest"),
            Self::Memory => write!(f, "memory"),
        }
    }
}

/// Cache store configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CacheConfig {
    /// Global kill-switch (`ENABLE_CACHE`). Off means every cache and
    /// rate-limit operation no-ops and the gateway runs uncached.
    pub enabled: bool,
    pub backend: CacheBackend,
    pub redis_url: String,
    pub rest_url: Option<String>,
    #[serde(skip_serializing)]
    pub rest_token: Option<String>,
    /// Per-operation timeout; a slow backend must not stall requests.
    pub op_timeout_ms: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            backend: CacheBackend::Redis,
            redis_url: "redis://127.0.0.1:6379".to_string(),
            rest_url: None,
            rest_token: None,
            op_timeout_ms: 300,
        }
    }
}

/// Breaker/recovery parameters, global defaults overridable per feature.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ResilienceConfig {
    pub failure_threshold: u32,
    pub recovery_window_secs: u64,
    pub full_recovery_window_secs: u64,
    pub daily_capacity: u32,
}

impl Default for ResilienceConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 3,
            recovery_window_secs: 120,
            full_recovery_window_secs: 300,
            daily_capacity: 1000,
        }
    }
}

/// One enumerated provider key.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct KeyConfig {
    #[serde(skip_serializing)]
    pub secret: String,
    pub daily_capacity: u32,
}

/// One feature's credential pool, with its resolved resilience parameters.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct FeatureConfig {
    pub name: String,
    pub keys: Vec<KeyConfig>,
    pub resilience: ResilienceConfig,
}

/// Main application settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Settings {
    pub cache: CacheConfig,
    pub resilience: ResilienceConfig,
    pub features: Vec<FeatureConfig>,
    /// Timeout handed to provider calls made through the failover helper.
    pub provider_timeout_secs: u64,
}

impl Settings {
    /// Load settings from the process environment (reads `.env` first).
    pub fn load() -> Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_lookup(&|key| env::var(key).ok())
    }

    /// Assemble settings from an arbitrary variable source. Tests pass a
    /// map instead of mutating the process environment.
    pub fn from_lookup(lookup: &dyn Fn(&str) -> Option<String>) -> Result<Self> {
        let cache = CacheConfig {
            enabled: parse_or(lookup, "ENABLE_CACHE", true),
            backend: lookup("CACHE_BACKEND")
                .map(|s| CacheBackend::parse(&s))
                .unwrap_or_default(),
            redis_url: lookup("REDIS_URL")
                .unwrap_or_else(|| "redis://127.0.0.1:6379".to_string()),
            rest_url: lookup("CACHE_REST_URL"),
            rest_token: lookup("CACHE_REST_TOKEN"),
            op_timeout_ms: parse_or(lookup, "CACHE_TIMEOUT_MS", 300),
        };

        let resilience = ResilienceConfig {
            failure_threshold: parse_or(lookup, "FAILURE_THRESHOLD", 3),
            recovery_window_secs: parse_or(lookup, "RECOVERY_WINDOW_SECONDS", 120),
            full_recovery_window_secs: parse_or(lookup, "FULL_RECOVERY_WINDOW_SECONDS", 300),
            daily_capacity: parse_or(lookup, "DAILY_KEY_CAPACITY", 1000),
        };

        let feature_names: Vec<String> = match lookup("GATEWAY_FEATURES") {
            Some(csv) => csv
                .split(',')
                .map(|s| s.trim().to_uppercase())
                .filter(|s| !s.is_empty())
                .collect(),
            None => DEFAULT_FEATURES.iter().map(|s| s.to_string()).collect(),
        };

        let features = feature_names
            .iter()
            .map(|name| Self::load_feature(lookup, name, &resilience))
            .collect();

        let settings = Self {
            cache,
            resilience,
            features,
            provider_timeout_secs: parse_or(lookup, "PROVIDER_TIMEOUT_SECONDS", 30),
        };
        settings.validate()?;
        Ok(settings)
    }

    /// Enumerate `{FEATURE}_KEY_{N}` and apply per-feature overrides.
    fn load_feature(
        lookup: &dyn Fn(&str) -> Option<String>,
        name: &str,
        global: &ResilienceConfig,
    ) -> FeatureConfig {
        let resilience = ResilienceConfig {
            failure_threshold: parse_or(
                lookup,
                &format!("{name}_FAILURE_THRESHOLD"),
                global.failure_threshold,
            ),
            recovery_window_secs: parse_or(
                lookup,
                &format!("{name}_RECOVERY_WINDOW_SECONDS"),
                global.recovery_window_secs,
            ),
            full_recovery_window_secs: parse_or(
                lookup,
                &format!("{name}_FULL_RECOVERY_WINDOW_SECONDS"),
                global.full_recovery_window_secs,
            ),
            daily_capacity: parse_or(
                lookup,
                &format!("{name}_DAILY_CAPACITY"),
                global.daily_capacity,
            ),
        };

        let mut keys = Vec::new();
        for n in 1..=MAX_KEYS_PER_FEATURE {
            // The first gap ends enumeration for this feature
            let Some(secret) = lookup(&format!("{name}_KEY_{n}")) else {
                break;
            };
            keys.push(KeyConfig {
                secret,
                daily_capacity: resilience.daily_capacity,
            });
        }

        if keys.is_empty() {
            tracing::debug!(feature = name, "no credentials configured");
        }

        FeatureConfig {
            name: name.to_string(),
            keys,
            resilience,
        }
    }

    fn validate(&self) -> Result<()> {
        if self.cache.op_timeout_ms == 0 {
            anyhow::bail!("CACHE_TIMEOUT_MS must be > 0");
        }
        for feature in &self.features {
            let r = &feature.resilience;
            if r.failure_threshold == 0 {
                anyhow::bail!("failure threshold for {} must be > 0", feature.name);
            }
            if r.recovery_window_secs == 0 || r.full_recovery_window_secs == 0 {
                anyhow::bail!("recovery windows for {} must be > 0", feature.name);
            }
            if r.daily_capacity == 0 {
                anyhow::bail!("daily capacity for {} must be > 0", feature.name);
            }
        }
        if self.cache.backend == CacheBackend::Rest && self.cache.enabled {
            self.cache
                .rest_url
                .as_ref()
                .context("CACHE_REST_URL is required for the rest backend")?;
            self.cache
                .rest_token
                .as_ref()
                .context("CACHE_REST_TOKEN is required for the rest backend")?;
        }
        Ok(())
    }

    /// Look up a feature's configuration by name (case-insensitive).
    pub fn feature(&self, name: &str) -> Option<&FeatureConfig> {
        let name = name.to_uppercase();
        self.features.iter().find(|f| f.name == name)
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            cache: CacheConfig::default(),
            resilience: ResilienceConfig::default(),
            features: DEFAULT_FEATURES
                .iter()
                .map(|name| FeatureConfig {
                    name: name.to_string(),
                    keys: Vec::new(),
                    resilience: ResilienceConfig::default(),
                })
                .collect(),
            provider_timeout_secs: 30,
        }
    }
}

/// Parse a variable through the lookup, falling back to a default.
fn parse_or<T: FromStr>(lookup: &dyn Fn(&str) -> Option<String>, key: &str, default: T) -> T {
    lookup(key)
        .and_then(|value| value.parse().ok())
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key: &str| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let settings = Settings::from_lookup(&|_| None).unwrap();
        assert!(settings.cache.enabled);
        assert_eq!(settings.cache.backend, CacheBackend::Redis);
        assert_eq!(settings.resilience.failure_threshold, 3);
        assert_eq!(settings.features.len(), DEFAULT_FEATURES.len());
        assert!(settings.feature("FORECAST").unwrap().keys.is_empty());
    }

    #[test]
    fn test_key_enumeration_stops_at_first_gap() {
        let lookup = lookup_from(&[
            ("GATEWAY_FEATURES", "FORECAST"),
            ("FORECAST_KEY_1", "sk-a"),
            ("FORECAST_KEY_2", "sk-b"),
            // gap at 3
            ("FORECAST_KEY_4", "sk-d"),
        ]);
        let settings = Settings::from_lookup(&lookup).unwrap();
        let forecast = settings.feature("forecast").unwrap();
        assert_eq!(forecast.keys.len(), 2);
        assert_eq!(forecast.keys[0].secret, "sk-a");
        assert_eq!(forecast.keys[1].secret, "sk-b");
    }

    #[test]
    fn test_per_feature_overrides() {
        let lookup = lookup_from(&[
            ("GATEWAY_FEATURES", "CHAT,FORECAST"),
            ("FAILURE_THRESHOLD", "5"),
            ("CHAT_FAILURE_THRESHOLD", "2"),
            ("CHAT_DAILY_CAPACITY", "50"),
            ("CHAT_KEY_1", "sk-chat"),
        ]);
        let settings = Settings::from_lookup(&lookup).unwrap();

        let chat = settings.feature("CHAT").unwrap();
        assert_eq!(chat.resilience.failure_threshold, 2);
        assert_eq!(chat.keys[0].daily_capacity, 50);

        let forecast = settings.feature("FORECAST").unwrap();
        assert_eq!(forecast.resilience.failure_threshold, 5);
    }

    #[test]
    fn test_backend_parsing() {
        assert_eq!(CacheBackend::parse("redis"), CacheBackend::Redis);
        assert_eq!(CacheBackend::parse("persistent"), CacheBackend::Redis);
        assert_eq!(CacheBackend::parse("REST"), CacheBackend::Rest);
        assert_eq!(CacheBackend::parse("stateless"), CacheBackend::Rest);
        assert_eq!(CacheBackend::parse("memory"), CacheBackend::Memory);
        assert_eq!(CacheBackend::parse("unknown"), CacheBackend::Redis);
    }

    #[test]
    fn test_rest_backend_requires_url_and_token() {
        let lookup = lookup_from(&[("CACHE_BACKEND", "rest")]);
        assert!(Settings::from_lookup(&lookup).is_err());

        let lookup = lookup_from(&[
            ("CACHE_BACKEND", "rest"),
            ("CACHE_REST_URL", "https://cache.example.com"),
            ("CACHE_REST_TOKEN", "token"),
        ]);
        assert!(Settings::from_lookup(&lookup).is_ok());
    }

    #[test]
    fn test_kill_switch_skips_rest_validation() {
        let lookup = lookup_from(&[("CACHE_BACKEND", "rest"), ("ENABLE_CACHE", "false")]);
        let settings = Settings::from_lookup(&lookup).unwrap();
        assert!(!settings.cache.enabled);
    }

    #[test]
    fn test_invalid_threshold_rejected() {
        let lookup = lookup_from(&[("FAILURE_THRESHOLD", "0")]);
        assert!(Settings::from_lookup(&lookup).is_err());
    }

    #[test]
    fn test_feature_list_is_normalized() {
        let lookup = lookup_from(&[
            ("GATEWAY_FEATURES", " chat , forecast "),
            ("CHAT_KEY_1", "sk-1"),
        ]);
        let settings = Settings::from_lookup(&lookup).unwrap();
        assert_eq!(settings.features.len(), 2);
        assert_eq!(settings.features[0].name, "CHAT");
        assert_eq!(settings.feature("Chat").unwrap().keys.len(), 1);
    }
}

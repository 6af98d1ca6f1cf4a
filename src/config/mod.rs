//! Configuration management

mod settings;

pub use settings::{
    CacheBackend, CacheConfig, FeatureConfig, KeyConfig, ResilienceConfig, Settings,
    DEFAULT_FEATURES, MAX_KEYS_PER_FEATURE,
};

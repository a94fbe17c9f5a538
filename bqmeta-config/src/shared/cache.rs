use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::shared::ValidationError;

/// Settings for the metadata cache and the parallel loader that fills it.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct MetadataCacheConfig {
    /// Whether listings are served from and written to the cache at all.
    #[serde(default = "default_cache_enabled")]
    pub cache_enabled: bool,
    /// Lifetime of a cached listing in seconds. Zero or negative disables caching.
    #[serde(default = "default_cache_ttl_seconds")]
    pub cache_ttl_seconds: i64,
    /// Defers per-dataset listings until a dataset is requested by name.
    #[serde(default = "default_lazy_load")]
    pub lazy_load: bool,
    /// Minimum number of independent listings before they are fanned out concurrently.
    #[serde(default = "default_parallel_threshold")]
    pub parallel_threshold: usize,
    /// Upper bound, in milliseconds, for one fan-out to complete.
    #[serde(default = "default_parallel_timeout_ms")]
    pub parallel_timeout_ms: u64,
}

impl MetadataCacheConfig {
    pub const DEFAULT_CACHE_ENABLED: bool = true;

    pub const DEFAULT_CACHE_TTL_SECONDS: i64 = 300;

    pub const DEFAULT_LAZY_LOAD: bool = false;

    pub const DEFAULT_PARALLEL_THRESHOLD: usize = 5;

    pub const DEFAULT_PARALLEL_TIMEOUT_MS: u64 = 60_000;

    /// Returns the fan-out deadline as a [`Duration`].
    pub fn parallel_timeout(&self) -> Duration {
        Duration::from_millis(self.parallel_timeout_ms)
    }

    /// Returns `true` when entries can actually be retained.
    pub fn caching_active(&self) -> bool {
        self.cache_enabled && self.cache_ttl_seconds > 0
    }

    /// Validates the cache settings.
    ///
    /// The TTL is not validated: a non-positive TTL is a supported way to disable caching.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.parallel_threshold == 0 {
            return Err(ValidationError::InvalidFieldValue {
                field: "metadata_cache.parallel_threshold".to_string(),
                constraint: "must be greater than 0".to_string(),
            });
        }

        if self.parallel_timeout_ms == 0 {
            return Err(ValidationError::InvalidFieldValue {
                field: "metadata_cache.parallel_timeout_ms".to_string(),
                constraint: "must be greater than 0".to_string(),
            });
        }

        Ok(())
    }
}

impl Default for MetadataCacheConfig {
    fn default() -> Self {
        Self {
            cache_enabled: default_cache_enabled(),
            cache_ttl_seconds: default_cache_ttl_seconds(),
            lazy_load: default_lazy_load(),
            parallel_threshold: default_parallel_threshold(),
            parallel_timeout_ms: default_parallel_timeout_ms(),
        }
    }
}

fn default_cache_enabled() -> bool {
    MetadataCacheConfig::DEFAULT_CACHE_ENABLED
}

fn default_cache_ttl_seconds() -> i64 {
    MetadataCacheConfig::DEFAULT_CACHE_TTL_SECONDS
}

fn default_lazy_load() -> bool {
    MetadataCacheConfig::DEFAULT_LAZY_LOAD
}

fn default_parallel_threshold() -> usize {
    MetadataCacheConfig::DEFAULT_PARALLEL_THRESHOLD
}

fn default_parallel_timeout_ms() -> u64 {
    MetadataCacheConfig::DEFAULT_PARALLEL_TIMEOUT_MS
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = MetadataCacheConfig::default();
        assert!(config.cache_enabled);
        assert_eq!(config.cache_ttl_seconds, 300);
        assert!(!config.lazy_load);
        assert_eq!(config.parallel_threshold, 5);
        assert_eq!(config.parallel_timeout(), Duration::from_secs(60));
    }

    #[test]
    fn test_missing_fields_use_defaults() {
        let config: MetadataCacheConfig =
            serde_json::from_str(r#"{"cache_ttl_seconds": 30}"#).unwrap();
        assert_eq!(config.cache_ttl_seconds, 30);
        assert_eq!(config.parallel_threshold, 5);
        assert!(config.cache_enabled);
    }

    #[test]
    fn test_non_positive_ttl_disables_caching() {
        let config = MetadataCacheConfig {
            cache_ttl_seconds: 0,
            ..Default::default()
        };
        assert!(config.validate().is_ok());
        assert!(!config.caching_active());
    }

    #[test]
    fn test_validate_zero_threshold() {
        let config = MetadataCacheConfig {
            parallel_threshold: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_zero_timeout() {
        let config = MetadataCacheConfig {
            parallel_timeout_ms: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }
}

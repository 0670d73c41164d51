//! Cache configuration.

use crate::error::Result;
use crate::subscriptions::SubscriptionConfig;
use crate::types::SortOptimisations;
use serde::{Deserialize, Serialize};

/// Default change-set size at which the sorter rebuilds instead of diffing.
pub const DEFAULT_RESET_THRESHOLD: usize = 100;

/// Sorter configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SortConfig {
    /// Change-set size at which a sort pass becomes a wholesale rebuild.
    /// 0 disables the reset path.
    #[serde(default = "default_reset_threshold")]
    pub reset_threshold: usize,

    #[serde(default)]
    pub optimisations: SortOptimisations,
}

fn default_reset_threshold() -> usize {
    DEFAULT_RESET_THRESHOLD
}

impl SortConfig {
    /// Never rebuild; always emit minimal diffs.
    pub fn without_reset() -> Self {
        Self {
            reset_threshold: 0,
            ..Default::default()
        }
    }

    pub(crate) fn exceeds_threshold(&self, size: usize) -> bool {
        self.reset_threshold > 0 && size >= self.reset_threshold
    }
}

impl Default for SortConfig {
    fn default() -> Self {
        Self {
            reset_threshold: DEFAULT_RESET_THRESHOLD,
            optimisations: SortOptimisations::default(),
        }
    }
}

/// Top-level configuration for a source cache and its derived views.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct CacheConfig {
    #[serde(default)]
    pub subscription: SubscriptionConfig,

    #[serde(default)]
    pub sort: SortConfig,
}

impl CacheConfig {
    /// Parse configuration from JSON. Missing fields take their defaults.
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CacheError;

    #[test]
    fn test_defaults() {
        let config = CacheConfig::default();
        assert_eq!(config.subscription.buffer_size, 1000);
        assert_eq!(config.sort.reset_threshold, DEFAULT_RESET_THRESHOLD);
    }

    #[test]
    fn test_from_json_partial() {
        let config = CacheConfig::from_json(
            r#"{"sort": {"reset_threshold": 5, "optimisations": {"compares_immutable_values_only": true}}}"#,
        )
        .unwrap();
        assert_eq!(config.sort.reset_threshold, 5);
        assert!(config.sort.optimisations.compares_immutable_values_only);
        assert_eq!(config.subscription.buffer_size, 1000);
    }

    #[test]
    fn test_from_json_invalid() {
        let result = CacheConfig::from_json("{not json");
        assert!(matches!(result, Err(CacheError::Config(_))));
    }

    #[test]
    fn test_threshold_zero_disables_reset() {
        let config = SortConfig::without_reset();
        assert!(!config.exceeds_threshold(10_000));
        assert!(SortConfig::default().exceeds_threshold(100));
        assert!(!SortConfig::default().exceeds_threshold(99));
    }
}

//! Engine configuration
//!
//! Limits and cache sizing for the metrics engine.

use serde::Deserialize;

use crate::error::{ConfigError, Result};

/// Engine configuration
///
/// # Example
///
/// ```toml
/// [engine]
/// group_value_limit = 50
/// max_group_selections = 10
/// cache_capacity = 64
/// ```
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct EngineConfig {
    /// Distinct group values returned when no limit is given
    /// Default: 50
    pub group_value_limit: usize,

    /// Maximum number of selected values per group-by field
    /// Default: 10
    pub max_group_selections: usize,

    /// Memoized results kept per cache, 0 disables memoization
    /// Default: 64
    pub cache_capacity: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            group_value_limit: 50,
            max_group_selections: 10,
            cache_capacity: 64,
        }
    }
}

impl EngineConfig {
    pub(crate) fn validate(&self) -> Result<()> {
        if self.group_value_limit == 0 {
            return Err(ConfigError::invalid_value(
                "engine",
                "group_value_limit",
                "must be at least 1",
            ));
        }
        if self.max_group_selections == 0 {
            return Err(ConfigError::invalid_value(
                "engine",
                "max_group_selections",
                "must be at least 1",
            ));
        }
        Ok(())
    }
}

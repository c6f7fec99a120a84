//! Tally Configuration
//!
//! TOML-based configuration with defaults for every field. An empty file is
//! a valid configuration.
//!
//! # Parsing
//!
//! ```
//! use tally_config::Config;
//! use std::str::FromStr;
//!
//! let config = Config::from_str("[engine]\ncache_capacity = 16").unwrap();
//! assert_eq!(config.engine.cache_capacity, 16);
//! ```
//!
//! # Example
//!
//! ```toml
//! [log]
//! level = "debug"
//!
//! [engine]
//! group_value_limit = 50
//! max_group_selections = 10
//! cache_capacity = 64
//!
//! [data]
//! schema = "schema.json"
//! warehouse = "warehouse.json"
//! ```

mod data;
mod engine;
mod error;
mod logging;

use std::fs;
use std::path::Path;
use std::str::FromStr;

pub use data::DataConfig;
pub use engine::EngineConfig;
pub use error::{ConfigError, Result};
pub use logging::{LogConfig, LogFormat, LogLevel, LogOutput};

use serde::Deserialize;

/// Main configuration structure
#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct Config {
    /// Logging configuration
    pub log: LogConfig,

    /// Engine limits and caching
    pub engine: EngineConfig,

    /// Default data file locations
    pub data: DataConfig,
}

impl Config {
    /// Load configuration from a TOML file
    ///
    /// # Errors
    ///
    /// Returns error if file cannot be read, contains invalid TOML, or
    /// fails validation.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path).map_err(|e| ConfigError::IoError {
            path: path.display().to_string(),
            source: e,
        })?;

        Self::from_str(&contents)
    }

    fn parse(s: &str) -> Result<Self> {
        let config: Config = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        self.engine.validate()
    }
}

impl FromStr for Config {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_empty_config_uses_defaults() {
        let config = Config::from_str("").unwrap();
        assert_eq!(config, Config::default());
        assert_eq!(config.engine.group_value_limit, 50);
        assert_eq!(config.log.level, LogLevel::Warn);
    }

    #[test]
    fn test_full_config_parse() {
        let toml = r#"
[log]
level = "debug"
format = "json"

[engine]
group_value_limit = 20
max_group_selections = 5
cache_capacity = 0

[data]
schema = "schema.json"
warehouse = "warehouse.json"
"#;
        let config = Config::from_str(toml).unwrap();

        assert_eq!(config.log.level, LogLevel::Debug);
        assert_eq!(config.log.format, LogFormat::Json);
        assert_eq!(config.engine.group_value_limit, 20);
        assert_eq!(config.engine.max_group_selections, 5);
        assert_eq!(config.engine.cache_capacity, 0);
        assert!(config.data.schema.is_some());
    }

    #[test]
    fn test_validation_runs_on_parse() {
        let result = Config::from_str("[engine]\nmax_group_selections = 0");
        assert!(matches!(result, Err(ConfigError::InvalidValue { .. })));
    }

    #[test]
    fn test_invalid_toml() {
        assert!(Config::from_str("invalid { toml").is_err());
        assert!(Config::from_str("[engine]\ncache_capacity = \"lots\"").is_err());
    }

    #[test]
    fn test_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[engine]\ncache_capacity = 8").unwrap();

        let config = Config::from_file(file.path()).unwrap();
        assert_eq!(config.engine.cache_capacity, 8);

        let missing = Config::from_file("/nonexistent/tally.toml");
        assert!(matches!(missing, Err(ConfigError::IoError { .. })));
    }
}

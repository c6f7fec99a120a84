//! Data file configuration
//!
//! Default schema and warehouse snapshot paths, used when the command line
//! does not name them.

use std::path::PathBuf;

use serde::Deserialize;

/// Data file locations
///
/// # Example
///
/// ```toml
/// [data]
/// schema = "schema.json"
/// warehouse = "data/warehouse.json"
/// ```
#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct DataConfig {
    /// Schema registry JSON
    pub schema: Option<PathBuf>,

    /// Warehouse snapshot JSON
    pub warehouse: Option<PathBuf>,
}

impl DataConfig {
    /// Schema path, preferring an explicit override
    pub fn schema_path(&self, explicit: Option<PathBuf>) -> Option<PathBuf> {
        explicit.or_else(|| self.schema.clone())
    }

    /// Warehouse path, preferring an explicit override
    pub fn warehouse_path(&self, explicit: Option<PathBuf>) -> Option<PathBuf> {
        explicit.or_else(|| self.warehouse.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_has_no_paths() {
        let config = DataConfig::default();
        assert!(config.schema_path(None).is_none());
        assert!(config.warehouse_path(None).is_none());
    }

    #[test]
    fn test_explicit_path_wins() {
        let config: DataConfig = toml::from_str(r#"schema = "a.json""#).unwrap();
        assert_eq!(config.schema_path(None), Some(PathBuf::from("a.json")));
        assert_eq!(
            config.schema_path(Some(PathBuf::from("b.json"))),
            Some(PathBuf::from("b.json"))
        );
    }
}

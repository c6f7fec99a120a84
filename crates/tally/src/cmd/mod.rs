//! Command implementations for the Tally CLI

pub mod compute;
pub mod fields;
pub mod groups;

use std::path::PathBuf;
use std::str::FromStr;

use anyhow::{Context, Result};
use clap::Args;
use tally_analytics::{EngineOptions, MetricsEngine};
use tally_config::Config;
use tally_warehouse::{Schema, Warehouse};

/// Schema and warehouse file arguments
///
/// Both fall back to the `[data]` section of the config file.
#[derive(Args, Debug, Default)]
pub struct DataArgs {
    /// Schema registry JSON file
    #[arg(short, long)]
    pub schema: Option<PathBuf>,

    /// Warehouse snapshot JSON file
    #[arg(short, long)]
    pub data: Option<PathBuf>,
}

impl DataArgs {
    /// Load the schema
    pub fn load_schema(&self, config: &Config) -> Result<Schema> {
        let path = config
            .data
            .schema_path(self.schema.clone())
            .context("no schema file: pass --schema or set [data] schema")?;
        Schema::from_file(&path)
            .with_context(|| format!("failed to load schema {}", path.display()))
    }

    /// Load the warehouse snapshot against a schema
    pub fn load_warehouse(&self, config: &Config, schema: &Schema) -> Result<Warehouse> {
        let path = config
            .data
            .warehouse_path(self.data.clone())
            .context("no warehouse file: pass --data or set [data] warehouse")?;
        Warehouse::from_file(schema, &path)
            .with_context(|| format!("failed to load warehouse {}", path.display()))
    }
}

/// Build an engine with the configured limits
pub fn build_engine(schema: Schema, config: &Config) -> MetricsEngine {
    let options = EngineOptions {
        group_value_limit: config.engine.group_value_limit,
        max_group_selections: config.engine.max_group_selections,
        cache_capacity: config.engine.cache_capacity,
    };
    MetricsEngine::new(schema, options)
}

/// Output format
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    /// Aligned text
    Table,
    /// Pretty-printed JSON
    Json,
}

impl FromStr for OutputFormat {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "table" => Ok(Self::Table),
            "json" => Ok(Self::Json),
            _ => Err(anyhow::anyhow!("invalid format '{}': use table or json", s)),
        }
    }
}

/// Render an optional value, `-` when undefined
pub fn format_value(value: Option<f64>) -> String {
    match value {
        Some(v) if v.fract() == 0.0 && v.abs() < 1e15 => format!("{:.0}", v),
        Some(v) => format!("{:.2}", v),
        None => "-".to_string(),
    }
}

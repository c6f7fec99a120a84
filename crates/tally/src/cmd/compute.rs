//! Compute command - Evaluate a metric formula
//!
//! # Usage
//!
//! ```bash
//! tally compute --schema schema.json --data warehouse.json --formula revenue.json
//! tally compute --formula aov.json --range 2024-01-01,2024-03-31 --granularity month
//! tally compute --formula revenue.json --range 30d --compare previous_period --format json
//! tally compute --formula revenue.json --filters paid_only.json
//! ```
//!
//! The formula file holds a `MetricFormula`; the optional filters file a
//! `FilterSet`.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Args;
use tally_analytics::{
    ComparisonMode, FilterSet, FormulaRequest, FormulaResult, Granularity, MetricFormula,
    TimeRange,
};
use tally_config::Config;

use super::{DataArgs, OutputFormat, build_engine, format_value};

/// Compute command arguments
#[derive(Args, Debug)]
pub struct ComputeArgs {
    #[command(flatten)]
    pub data: DataArgs,

    /// Formula JSON file
    #[arg(long)]
    pub formula: PathBuf,

    /// Global filters JSON file
    #[arg(long)]
    pub filters: Option<PathBuf>,

    /// Time range (e.g., 7d, 30d, mtd, ytd, 2024-01-01,2024-01-31)
    #[arg(short, long, default_value = "30d")]
    pub range: String,

    /// Bucket size (day, week, month, quarter, year)
    #[arg(short, long, default_value = "day")]
    pub granularity: String,

    /// Comparison (none, previous_period, previous_year, period_start)
    #[arg(short = 'C', long, default_value = "none")]
    pub compare: String,

    /// Output format (table, json)
    #[arg(short, long, default_value = "table")]
    pub format: String,
}

/// Run the compute command
pub fn run(args: ComputeArgs, config: &Config) -> Result<()> {
    let format: OutputFormat = args.format.parse()?;
    let request = build_request(&args)?;

    let schema = args.data.load_schema(config)?;
    let warehouse = args.data.load_warehouse(config, &schema)?;
    let engine = build_engine(schema, config);

    let result = engine.compute(&request, &warehouse);
    tracing::info!(
        blocks = request.formula.blocks.len(),
        version = warehouse.version(),
        "computed formula"
    );

    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&result)?),
        OutputFormat::Table => print!("{}", render_table(&result)),
    }
    Ok(())
}

fn build_request(args: &ComputeArgs) -> Result<FormulaRequest> {
    let formula: MetricFormula = read_json(&args.formula, "formula")?;

    let range = TimeRange::parse(&args.range)
        .map_err(|e| anyhow::anyhow!("invalid time range: {}", e))?;
    let granularity = Granularity::parse(&args.granularity)
        .map_err(|e| anyhow::anyhow!("invalid granularity: {}", e))?;
    let comparison = ComparisonMode::parse(&args.compare)
        .map_err(|e| anyhow::anyhow!("invalid compare mode: {}", e))?;

    let mut request = FormulaRequest::new(formula, range, granularity).with_comparison(comparison);
    if let Some(path) = &args.filters {
        let filters: FilterSet = read_json(path, "filters")?;
        request = request.with_filters(filters);
    }
    Ok(request)
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path, what: &str) -> Result<T> {
    let contents = fs::read_to_string(path)
        .with_context(|| format!("failed to read {} file {}", what, path.display()))?;
    serde_json::from_str(&contents)
        .with_context(|| format!("invalid {} file {}", what, path.display()))
}

fn render_table(result: &FormulaResult) -> String {
    let mut out = String::new();
    let combined = &result.result;

    if let Some(series) = combined.series.as_ref().filter(|s| !s.is_empty()) {
        out.push_str(&format!("{:<20} {:>15}\n", "Date", "Value"));
        out.push_str(&format!("{}\n", "-".repeat(36)));
        for point in &series.points {
            out.push_str(&format!("{:<20} {:>15}\n", point.date, format_value(point.value)));
        }
        out.push_str(&format!("{}\n", "-".repeat(36)));
    }

    out.push_str(&format!(
        "Value: {}  ({})\n",
        format_value(combined.value),
        combined.unit_type.as_str()
    ));

    if let Some(comp) = &combined.comparison {
        let percent = comp
            .percent_delta
            .map(|p| format!("{:+.1}%", p * 100.0))
            .unwrap_or_else(|| "-".to_string());
        out.push_str(&format!(
            "Baseline: {}  Change: {} ({})\n",
            format_value(comp.baseline_value),
            comp.delta
                .map(|d| {
                    let sign = if d >= 0.0 { "+" } else { "" };
                    format!("{}{}", sign, format_value(Some(d)))
                })
                .unwrap_or_else(|| "-".to_string()),
            percent
        ));
    }

    if result.block_results.len() > 1 || !result.exposed.is_empty() {
        out.push_str("\nBlocks:\n");
        for block in &result.block_results {
            let marker = if result.exposed.iter().any(|e| e.block_id == block.block_id) {
                "*"
            } else {
                " "
            };
            out.push_str(&format!(
                "{} {:<18} {:>15}\n",
                marker,
                block.block_id,
                format_value(block.value)
            ));
        }
    }

    out
}

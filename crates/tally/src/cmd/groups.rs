//! Groups command - Rank the distinct values of a field
//!
//! # Usage
//!
//! ```bash
//! tally groups --schema schema.json --data warehouse.json --field payments.status
//! tally groups --field customers.plan --primary payments --limit 10
//! ```
//!
//! With `--primary`, each value counts rows of the primary object linked to
//! it through a relationship.

use anyhow::Result;
use clap::Args;
use tally_analytics::GroupValue;
use tally_config::Config;
use tally_warehouse::FieldRef;

use super::{DataArgs, OutputFormat, build_engine};

/// Groups command arguments
#[derive(Args, Debug)]
pub struct GroupsArgs {
    #[command(flatten)]
    pub data: DataArgs,

    /// Field to group by (object.field)
    #[arg(long)]
    pub field: FieldRef,

    /// Object whose rows are counted
    #[arg(short, long)]
    pub primary: Option<String>,

    /// Maximum number of values (default from config)
    #[arg(short = 'n', long)]
    pub limit: Option<usize>,

    /// Output format (table, json)
    #[arg(short, long, default_value = "table")]
    pub format: String,
}

/// Run the groups command
pub fn run(args: GroupsArgs, config: &Config) -> Result<()> {
    let format: OutputFormat = args.format.parse()?;
    let schema = args.data.load_schema(config)?;
    let warehouse = args.data.load_warehouse(config, &schema)?;
    let engine = build_engine(schema, config);

    let values = engine.group_values(
        &warehouse,
        &args.field,
        args.limit,
        args.primary.as_deref(),
    );
    tracing::debug!(field = %args.field, count = values.len(), "ranked group values");

    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&values)?),
        OutputFormat::Table => print!("{}", render_table(&args.field, &values)),
    }
    Ok(())
}

fn render_table(field: &FieldRef, values: &[GroupValue]) -> String {
    if values.is_empty() {
        return format!("No values for {}\n", field);
    }

    let mut out = format!("{:<30} {:>10}\n", "Value", "Count");
    out.push_str(&format!("{}\n", "-".repeat(41)));
    for v in values {
        out.push_str(&format!("{:<30} {:>10}\n", v.value, v.count));
    }
    out
}

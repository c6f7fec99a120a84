//! Fields command - List candidate group-by fields
//!
//! # Usage
//!
//! ```bash
//! tally fields --schema schema.json --objects payments
//! tally fields --objects payments,customers --format json
//! ```

use anyhow::Result;
use clap::Args;
use tally_config::Config;
use tally_warehouse::FieldRef;

use super::{DataArgs, OutputFormat, build_engine};

/// Fields command arguments
#[derive(Args, Debug)]
pub struct FieldsArgs {
    #[command(flatten)]
    pub data: DataArgs,

    /// Selected objects, comma-separated
    #[arg(long, value_delimiter = ',', required = true)]
    pub objects: Vec<String>,

    /// Output format (table, json)
    #[arg(short, long, default_value = "table")]
    pub format: String,
}

/// Run the fields command
pub fn run(args: FieldsArgs, config: &Config) -> Result<()> {
    let format: OutputFormat = args.format.parse()?;
    let schema = args.data.load_schema(config)?;
    let engine = build_engine(schema, config);

    let fields = engine.group_fields(&args.objects);
    tracing::debug!(objects = ?args.objects, count = fields.len(), "listed group fields");

    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&fields)?),
        OutputFormat::Table => print!("{}", render_list(&fields)),
    }
    Ok(())
}

fn render_list(fields: &[FieldRef]) -> String {
    if fields.is_empty() {
        return "No groupable fields\n".to_string();
    }
    fields.iter().map(|f| format!("{}\n", f)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_list() {
        let fields = vec![
            FieldRef::new("payments", "status"),
            FieldRef::new("customers", "plan"),
        ];
        assert_eq!(render_list(&fields), "payments.status\ncustomers.plan\n");
        assert_eq!(render_list(&[]), "No groupable fields\n");
    }
}

//! Tally - metric computation over JSON warehouse snapshots
//!
//! # Usage
//!
//! ```bash
//! # Compute a formula over the last 30 days
//! tally compute --schema schema.json --data warehouse.json --formula revenue.json
//!
//! # Candidate group-by fields
//! tally fields --schema schema.json --objects payments,customers
//!
//! # Ranked values of a field
//! tally groups --schema schema.json --data warehouse.json --field payments.status
//! ```

mod cmd;

use std::fs::OpenOptions;
use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tally_config::{Config, LogConfig, LogFormat, LogLevel, LogOutput};
use tracing_subscriber::fmt::writer::BoxMakeWriter;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

/// Tally - metric computation over JSON warehouse snapshots
#[derive(Parser, Debug)]
#[command(name = "tally")]
#[command(version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Path to configuration file (error if specified but not found)
    #[arg(short, long, global = true)]
    config: Option<std::path::PathBuf>,

    /// Log level (trace, debug, info, warn, error). Overrides config file.
    #[arg(short, long, global = true)]
    log_level: Option<String>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Compute a metric formula
    Compute(cmd::compute::ComputeArgs),

    /// List candidate group-by fields
    Fields(cmd::fields::FieldsArgs),

    /// Rank the distinct values of a field
    Groups(cmd::groups::GroupsArgs),
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = load_config(cli.config.as_deref())?;
    let log_level = resolve_log_level(cli.log_level.as_deref(), &config)?;
    init_logging(log_level, &config.log)?;

    match cli.command {
        Command::Compute(args) => cmd::compute::run(args, &config),
        Command::Fields(args) => cmd::fields::run(args, &config),
        Command::Groups(args) => cmd::groups::run(args, &config),
    }
}

/// Load the config file, or defaults when none is given
fn load_config(path: Option<&Path>) -> Result<Config> {
    match path {
        Some(path) => Config::from_file(path)
            .with_context(|| format!("failed to load config {}", path.display())),
        None => Ok(Config::default()),
    }
}

/// Resolve log level: CLI flag > config file > default
fn resolve_log_level(cli_level: Option<&str>, config: &Config) -> Result<LogLevel> {
    match cli_level {
        Some(level) => level.parse().context("invalid --log-level"),
        None => Ok(config.log.level),
    }
}

/// Initialize the tracing subscriber for logging
fn init_logging(level: LogLevel, log: &LogConfig) -> Result<()> {
    let filter = EnvFilter::try_new(level.as_str())
        .map_err(|e| anyhow::anyhow!("invalid log level: {}", e))?;

    let (writer, ansi) = match &log.output {
        LogOutput::Stderr => (BoxMakeWriter::new(std::io::stderr), true),
        LogOutput::Stdout => (BoxMakeWriter::new(std::io::stdout), true),
        LogOutput::File(path) => {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("failed to open log file {}", path))?;
            (BoxMakeWriter::new(Arc::new(file)), false)
        }
    };

    let registry = tracing_subscriber::registry().with(filter);
    match log.format {
        LogFormat::Json => registry.with(fmt::layer().json().with_writer(writer)).init(),
        LogFormat::Console => registry
            .with(
                fmt::layer()
                    .with_target(true)
                    .with_ansi(ansi)
                    .with_writer(writer),
            )
            .init(),
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_cli_flag_overrides_config_level() {
        let config: Config = "[log]\nlevel = \"error\"".parse().unwrap();
        assert_eq!(resolve_log_level(None, &config).unwrap(), LogLevel::Error);
        assert_eq!(
            resolve_log_level(Some("debug"), &config).unwrap(),
            LogLevel::Debug
        );
        assert!(resolve_log_level(Some("loud"), &config).is_err());
    }

    #[test]
    fn test_load_config() {
        assert_eq!(load_config(None).unwrap(), Config::default());

        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[engine]\ngroup_value_limit = 5").unwrap();
        let config = load_config(Some(file.path())).unwrap();
        assert_eq!(config.engine.group_value_limit, 5);

        assert!(load_config(Some(Path::new("/nonexistent/tally.toml"))).is_err());
    }

    #[test]
    fn test_cli_parses() {
        use clap::CommandFactory;
        Cli::command().debug_assert();

        let cli = Cli::try_parse_from([
            "tally",
            "--log-level",
            "debug",
            "groups",
            "--schema",
            "s.json",
            "--data",
            "d.json",
            "--field",
            "payments.status",
        ])
        .unwrap();
        assert_eq!(cli.log_level.as_deref(), Some("debug"));
        assert!(matches!(cli.command, Command::Groups(_)));
    }
}

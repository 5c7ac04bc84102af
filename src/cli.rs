//! Command-line interface for statdiff

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "statdiff")]
#[command(about = "Statistical comparison of a table across two database engines")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

impl Cli {
    /// Debug with `--verbose` (SQL sent to each side), Info otherwise
    pub fn log_level(&self) -> log::LevelFilter {
        if self.verbose {
            log::LevelFilter::Debug
        } else {
            log::LevelFilter::Info
        }
    }
}

#[derive(Subcommand)]
pub enum Commands {
    /// Compare one table between a source and a destination
    Compare {
        /// Source table (qualified as needed, e.g. SCHEMA.TABLE)
        source_table: String,

        /// Destination table
        dest_table: String,

        /// Source DuckDB database file (in-memory when omitted)
        #[arg(long)]
        source_db: Option<PathBuf>,

        /// Destination DuckDB database file (in-memory when omitted)
        #[arg(long)]
        dest_db: Option<PathBuf>,

        /// SQL dialect of the source: "hana", "dremio" or "duckdb"
        #[arg(long, default_value = "duckdb", value_parser = parse_dialect)]
        source_dialect: String,

        /// SQL dialect of the destination
        #[arg(long, default_value = "duckdb", value_parser = parse_dialect)]
        dest_dialect: String,

        /// ATTACH statement run on the source connection; {VAR} reads the environment
        #[arg(long)]
        source_attach: Vec<String>,

        /// ATTACH statement run on the destination connection
        #[arg(long)]
        dest_attach: Vec<String>,

        /// Configuration file (.json, .yaml or .yml)
        #[arg(long)]
        config: Option<PathBuf>,

        /// SQL predicate applied to both sides, ANDed with --month when both are given
        #[arg(long)]
        filter: Option<String>,

        /// Restrict both sides to one month, e.g. "2024-03" (needs --date-column)
        #[arg(long, value_parser = parse_month, requires = "date_column")]
        month: Option<(i32, u32)>,

        /// Date column used by --month
        #[arg(long)]
        date_column: Option<String>,

        /// Comma-separated list of columns to test
        #[arg(long, value_delimiter = ',')]
        columns: Option<Vec<String>>,

        /// Write the report as JSON to this file
        #[arg(long)]
        output: Option<PathBuf>,

        /// Output format: "pretty", "json", "yaml"
        #[arg(long, default_value = "pretty")]
        format: String,

        /// Hide progress bars
        #[arg(long)]
        no_progress: bool,
    },

    /// Inspect configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
pub enum ConfigAction {
    /// Print the effective configuration (defaults, file, environment)
    Show {
        /// Configuration file
        #[arg(long)]
        config: Option<PathBuf>,

        /// Output format: "yaml", "json"
        #[arg(long, default_value = "yaml")]
        format: String,
    },

    /// Check a configuration file without running anything
    Validate {
        /// Configuration file
        config: PathBuf,
    },
}

/// Parse output format string
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutputFormat {
    Pretty,
    Json,
    Yaml,
}

impl OutputFormat {
    pub fn parse(s: &str) -> Result<Self, String> {
        match s.to_lowercase().as_str() {
            "pretty" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            "yaml" | "yml" => Ok(Self::Yaml),
            _ => Err(format!("Invalid output format: {}. Use 'pretty', 'json' or 'yaml'", s)),
        }
    }
}

fn parse_dialect(s: &str) -> Result<String, String> {
    let name = s.to_lowercase();
    match name.as_str() {
        "hana" | "dremio" | "duckdb" => Ok(name),
        _ => Err(format!("Unknown dialect: '{}'. Use 'hana', 'dremio' or 'duckdb'", s)),
    }
}

/// Parse "YYYY-MM"
fn parse_month(s: &str) -> Result<(i32, u32), String> {
    let (year, month) = s
        .split_once('-')
        .ok_or_else(|| format!("Invalid month: '{}'. Expected YYYY-MM", s))?;
    let year: i32 = year
        .parse()
        .map_err(|_| format!("Invalid year in '{}'", s))?;
    let month: u32 = month
        .parse()
        .map_err(|_| format!("Invalid month in '{}'", s))?;
    if !(1..=12).contains(&month) {
        return Err(format!("Month must be between 1 and 12: {}", month));
    }
    Ok((year, month))
}

//! Command implementations for the statdiff CLI

use crate::cli::{Commands, ConfigAction, OutputFormat};
use crate::comparator::{CompareOptions, Comparator, MonthFilter};
use crate::config::CompareConfig;
use crate::connector::{DataConnector, DuckDbConnector};
use crate::dialect::Dialect;
use crate::error::{Result, StatdiffError};
use crate::output::{JsonFormatter, PrettyPrinter};
use crate::progress::ProgressReporter;
use crate::report::OverallStatus;
use anyhow::Context;
use std::path::{Path, PathBuf};

/// Execute a command, returning the overall status of a comparison if one ran
pub fn execute_command(command: Commands) -> Result<Option<OverallStatus>> {
    match command {
        Commands::Compare {
            source_table,
            dest_table,
            source_db,
            dest_db,
            source_dialect,
            dest_dialect,
            source_attach,
            dest_attach,
            config,
            filter,
            month,
            date_column,
            columns,
            output,
            format,
            no_progress,
        } => {
            let source = Endpoint {
                db: source_db,
                dialect: source_dialect,
                attach: source_attach,
            };
            let dest = Endpoint {
                db: dest_db,
                dialect: dest_dialect,
                attach: dest_attach,
            };
            let month = month
                .zip(date_column)
                .map(|((year, month), column)| MonthFilter { column, year, month });
            let options = CompareOptions {
                filter,
                month,
                columns,
            };
            compare_command(
                &source,
                &dest,
                (&source_table, &dest_table),
                config.as_deref(),
                &options,
                output.as_deref(),
                &format,
                no_progress,
            )
            .map(Some)
        }
        Commands::Config { action } => {
            config_command(action)?;
            Ok(None)
        }
    }
}

/// One side of a comparison as given on the command line
struct Endpoint {
    db: Option<PathBuf>,
    dialect: String,
    attach: Vec<String>,
}

impl Endpoint {
    fn dialect(&self) -> Result<Dialect> {
        Dialect::by_name(&self.dialect)
            .ok_or_else(|| StatdiffError::invalid_input(format!("Unknown dialect: {}", self.dialect)))
    }

    fn connect(&self) -> Result<DuckDbConnector> {
        let dialect = self.dialect()?;
        let connector = match &self.db {
            Some(path) => DuckDbConnector::open(path, dialect)?,
            None => DuckDbConnector::open_in_memory(dialect)?,
        };
        for statement in &self.attach {
            connector.attach(statement)?;
        }
        Ok(connector)
    }
}

#[allow(clippy::too_many_arguments)]
fn compare_command(
    source: &Endpoint,
    dest: &Endpoint,
    (source_table, dest_table): (&str, &str),
    config_path: Option<&Path>,
    options: &CompareOptions,
    output: Option<&Path>,
    format: &str,
    no_progress: bool,
) -> Result<OverallStatus> {
    let format = OutputFormat::parse(format).map_err(StatdiffError::invalid_input)?;
    let config = load_config(config_path)?;

    let mut source_connector = source.connect()?;
    let mut dest_connector = dest.connect()?;

    let progress = if no_progress || format != OutputFormat::Pretty {
        ProgressReporter::new_minimal()
    } else {
        ProgressReporter::new()
    };
    let report = {
        let mut comparator =
            Comparator::new(&source_connector, &dest_connector, config).with_progress(progress);
        comparator.compare(source_table, dest_table, options)?
    };

    match format {
        OutputFormat::Pretty => {
            PrettyPrinter::print_report(&report);
            PrettyPrinter::print_failures(&report);
        }
        OutputFormat::Json => println!("{}", report.to_json_pretty()?),
        OutputFormat::Yaml => println!("{}", serde_yaml::to_string(&report)?),
    }

    if let Some(path) = output {
        JsonFormatter::write_report(&report, path)
            .with_context(|| format!("Failed to write report to {}", path.display()))?;
    }

    source_connector.close()?;
    dest_connector.close()?;
    Ok(report.overall_status)
}

fn config_command(action: ConfigAction) -> Result<()> {
    match action {
        ConfigAction::Show { config, format } => {
            let config = load_config(config.as_deref())?;
            match OutputFormat::parse(&format).map_err(StatdiffError::invalid_input)? {
                OutputFormat::Json => println!("{}", JsonFormatter::format(&config)?),
                _ => print!("{}", serde_yaml::to_string(&config)?),
            }
        }
        ConfigAction::Validate { config } => {
            CompareConfig::load(&config)?;
            println!("✅ Configuration is valid: {}", config.display());
        }
    }
    Ok(())
}

/// File if given, else defaults; env overrides apply either way
fn load_config(path: Option<&Path>) -> Result<CompareConfig> {
    match path {
        Some(path) => CompareConfig::load(path),
        None => {
            let mut config = CompareConfig::default();
            config.apply_env_overrides()?;
            config.validate()?;
            Ok(config)
        }
    }
}

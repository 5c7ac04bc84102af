//! Main entry point for the statdiff CLI

use clap::Parser;
use statdiff::cli::Cli;
use statdiff::commands::execute_command;
use statdiff::report::OverallStatus;

fn main() {
    let cli = Cli::parse();

    env_logger::Builder::from_default_env()
        .filter_level(cli.log_level())
        .init();

    match execute_command(cli.command) {
        Ok(Some(OverallStatus::Fail)) => std::process::exit(2),
        Ok(_) => {}
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    }
}

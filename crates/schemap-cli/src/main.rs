//! `schemap` command-line entry point.

use clap::Parser;
use schemap_cli::logging::init_logging;

mod cli;
mod commands;
mod summary;

use crate::cli::{Cli, Command};
use crate::commands::{run_aggregate, run_inspect, run_match};
use crate::summary::{print_columns, print_run_summary, print_table_matches};

fn main() {
    let cli = Cli::parse();
    cli.color.write_global();
    if let Err(error) = init_logging(&cli.log_config()) {
        eprintln!("error: failed to initialize logging: {error}");
        std::process::exit(1);
    }
    let result = match &cli.command {
        Command::Run(args) => run_match(args).map(|outcome| print_run_summary(&outcome)),
        Command::Aggregate(args) => run_aggregate(args).map(|tables| print_table_matches(&tables)),
        Command::Inspect(args) => {
            run_inspect(args).map(|(columns, descriptions)| print_columns(&columns, &descriptions))
        }
    };
    if let Err(error) = result {
        eprintln!("error: {error:#}");
        std::process::exit(1);
    }
}

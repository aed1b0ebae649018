//! bobqa CLI - Main Entry Point
//!
//! Runs UI scenarios against the BOB web application and probes the
//! calendar replan rules on the backend.

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;

mod commands;
mod output;

use commands::{replan, run, scenarios};

/// bobqa - browser and backend probes for BOB
#[derive(Parser)]
#[command(name = "bobqa")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Configuration file
    #[arg(long, default_value_os_t = bobqa_common::default_config_path(), global = true)]
    config: PathBuf,

    /// Output format
    #[arg(long, default_value = "table", global = true)]
    format: output::OutputFormat,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run UI scenarios in a browser and write reports
    Run(run::RunArgs),

    /// List scenarios without starting a browser
    Scenarios(scenarios::ScenariosArgs),

    /// Recompute the calendar focus set
    #[command(subcommand)]
    Replan(replan::ReplanCommands),

    /// Show version information
    Version,
}

fn init_logging(verbose: bool, json: bool) {
    let log_level = if verbose { "debug" } else { "info" };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level));

    if json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .with_writer(std::io::stderr)
            .init();
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose, cli.log_json);

    let result = match cli.command {
        Commands::Run(args) => run::execute(args, &cli.config, cli.format).await,
        Commands::Scenarios(args) => scenarios::execute(args, &cli.config, cli.format),
        Commands::Replan(cmd) => replan::execute(cmd, &cli.config, cli.format).await,
        Commands::Version => {
            println!("bobqa v{}", bobqa_common::VERSION);
            Ok(ExitCode::SUCCESS)
        }
    };

    match result {
        Ok(code) => code,
        Err(e) => {
            output::print_error(&format!("{:#}", e));
            ExitCode::from(2)
        }
    }
}

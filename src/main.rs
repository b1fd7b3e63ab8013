//! Rollout CLI entry point
//!
//! Dispatches to subcommands; every error is printed with its hint and
//! terminates the process with a non-zero status.

use clap::Parser;
use console::style;
use rollout::cli::{Cli, Commands};
use rollout::error::RolloutResult;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{} {}", style("Error:").red().bold(), e);
            if let Some(hint) = e.hint() {
                eprintln!("{} {}", style("Hint:").yellow(), hint);
            }
            ExitCode::FAILURE
        }
    }
}

async fn run() -> RolloutResult<()> {
    let cli = Cli::parse();

    // Initialize logging: 0 = warn (spinner only), 1 = info, 2+ = debug
    let filter = match cli.verbose {
        0 => EnvFilter::new("rollout=warn"),
        1 => EnvFilter::new("rollout=info"),
        _ => EnvFilter::new("rollout=debug"),
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .without_time()
        .init();

    match cli.command {
        Commands::Run(args) => rollout::cli::commands::run(args, cli.cache_dir).await,
        Commands::Validate(args) => rollout::cli::commands::validate(args).await,
        Commands::Status(args) => rollout::cli::commands::status(args, cli.cache_dir).await,
    }
}

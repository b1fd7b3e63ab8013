//! CLI argument definitions using clap derive

use crate::executor::{DEFAULT_BATCH_SIZE, DEFAULT_CONCURRENCY};
use clap::{ArgAction, Parser, Subcommand};
use std::path::PathBuf;

/// Rollout - resumable, idempotent token rollout orchestrator
///
/// Provisions a token, a vesting-wallet factory, and a batch relayer,
/// then grants roles, creates vesting schedules, and funds allocations.
/// Progress is checkpointed per network; re-running the same command
/// resumes where the last run stopped.
#[derive(Parser, Debug)]
#[command(name = "rollout")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,

    /// Increase verbosity (-v info, -vv debug)
    #[arg(short, long, global = true, action = ArgAction::Count)]
    pub verbose: u8,

    /// Directory holding deploy cache files (defaults to the state dir)
    #[arg(long, global = true, env = "ROLLOUT_CACHE_DIR")]
    pub cache_dir: Option<PathBuf>,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Execute a rollout plan
    Run(RunArgs),

    /// Validate a plan without touching any target
    Validate(ValidateArgs),

    /// Show cached progress for a plan's network
    Status(StatusArgs),
}

/// Arguments for the run command
#[derive(Parser, Debug)]
pub struct RunArgs {
    /// Path to the plan TOML file
    pub plan: PathBuf,

    /// Run against the in-memory simulator instead of a live target
    #[arg(long)]
    pub rehearse: bool,

    /// Operations per submitted batch
    #[arg(long, default_value_t = DEFAULT_BATCH_SIZE)]
    pub batch_size: usize,

    /// Maximum simultaneously in-flight batches
    #[arg(long, default_value_t = DEFAULT_CONCURRENCY)]
    pub concurrency: usize,

    /// Per-batch confirmation timeout in seconds
    #[arg(long, default_value_t = 120)]
    pub confirm_timeout: u64,
}

/// Arguments for the validate command
#[derive(Parser, Debug)]
pub struct ValidateArgs {
    /// Path to the plan TOML file
    pub plan: PathBuf,
}

/// Arguments for the status command
#[derive(Parser, Debug)]
pub struct StatusArgs {
    /// Path to the plan TOML file
    pub plan: PathBuf,
}

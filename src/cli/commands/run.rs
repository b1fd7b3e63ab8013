//! Run command - execute a rollout plan

use crate::cache::{default_cache_dir, DeployCache, FileStore};
use crate::cli::args::RunArgs;
use crate::error::{RolloutError, RolloutResult};
use crate::executor::BatchExecutor;
use crate::plan::Plan;
use crate::rollout::Orchestrator;
use crate::target::{ExecutionTarget, MemoryTarget};
use console::style;
use indicatif::{ProgressBar, ProgressStyle};
use std::path::PathBuf;
use std::time::Duration;
use tracing::debug;

/// Execute the run command
pub async fn execute(args: RunArgs, cache_dir: Option<PathBuf>) -> RolloutResult<()> {
    let plan = Plan::load(&args.plan).await?;
    let resolved = plan.resolve()?;
    debug!(
        "Plan resolved: {} role grants, {} allocations",
        resolved.role_grants().len(),
        resolved.allocations.len()
    );

    // The only shipped backend is the rehearsal simulator; a live run
    // needs an RPC adapter implementing ExecutionTarget.
    if !args.rehearse {
        return Err(RolloutError::TargetUnavailable);
    }
    let target = MemoryTarget::new();

    let dir = cache_dir.unwrap_or_else(default_cache_dir);
    let store = FileStore::open(&dir, &resolved.network)?;
    let cache_path = store.path().to_path_buf();
    let cache = DeployCache::open(Box::new(store)).await?;

    let executor = BatchExecutor::new(args.batch_size, args.concurrency)
        .with_confirm_timeout(Duration::from_secs(args.confirm_timeout));

    let pb = create_progress_bar(format!(
        "Rolling out '{}' against {}...",
        resolved.network,
        target.target_name()
    ));
    let result = Orchestrator::new(&cache, &target, &resolved, executor)
        .execute()
        .await;
    pb.finish_and_clear();

    let outcome = result?;

    println!(
        "{} Rollout for {} complete",
        style("✓").green(),
        style(&resolved.network).cyan()
    );
    println!("  token            {}", outcome.token);
    println!("  vesting factory  {}", outcome.vesting_factory);
    println!("  relayer          {}", outcome.relayer);
    println!("  cache            {}", cache_path.display());

    Ok(())
}

fn create_progress_bar(msg: String) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.cyan} {msg}")
            .unwrap(),
    );
    pb.set_message(msg);
    pb.enable_steady_tick(std::time::Duration::from_millis(100));
    pb
}

//! Status command - show cached progress for a plan's network
//!
//! Reads the cache file directly, without taking the advisory lock, so
//! status works while a run is in flight.

use crate::cache::{default_cache_dir, FileStore};
use crate::cli::args::StatusArgs;
use crate::error::{RolloutError, RolloutResult};
use crate::executor::CHECKPOINT_KEY;
use crate::plan::Plan;
use crate::rollout::{KEY_RELAYER, KEY_TOKEN, KEY_VESTING_FACTORY, STAGE_NAMES};
use console::style;
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::PathBuf;
use tokio::fs;

/// Execute the status command
pub async fn execute(args: StatusArgs, cache_dir: Option<PathBuf>) -> RolloutResult<()> {
    let plan = Plan::load(&args.plan).await?;
    let resolved = plan.resolve()?;

    let dir = cache_dir.unwrap_or_else(default_cache_dir);
    let path = FileStore::file_path(&dir, &resolved.network);

    println!("{}", style("Rollout Status").bold().cyan());
    println!("  network  {}", resolved.network);
    println!("  cache    {}", path.display());
    println!();

    if !path.exists() {
        println!("  No cached progress; a run would start at stage 0");
        return Ok(());
    }

    let content = fs::read_to_string(&path)
        .await
        .map_err(|e| RolloutError::io(format!("reading cache file {}", path.display()), e))?;
    let entries: BTreeMap<String, Value> = serde_json::from_str(&content)?;

    let checkpoint = entries
        .get(CHECKPOINT_KEY)
        .and_then(Value::as_u64)
        .unwrap_or(0) as usize;

    if checkpoint >= STAGE_NAMES.len() {
        println!(
            "  {} All {} stages complete",
            style("✓").green(),
            STAGE_NAMES.len()
        );
    } else {
        println!(
            "  Checkpoint at stage {checkpoint}/{}; next: {}",
            STAGE_NAMES.len(),
            style(STAGE_NAMES[checkpoint]).yellow()
        );
    }

    for (label, key) in [
        ("token", KEY_TOKEN),
        ("vesting factory", KEY_VESTING_FACTORY),
        ("relayer", KEY_RELAYER),
    ] {
        match entries.get(key).and_then(Value::as_str) {
            Some(address) => println!("  {label:<16} {address}"),
            None => println!("  {label:<16} {}", style("not provisioned").dim()),
        }
    }

    if let Some(operator) = entries.get("operator").and_then(Value::as_str) {
        println!("  {:<16} {operator}", "pinned operator");
    }

    Ok(())
}

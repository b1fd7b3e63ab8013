//! Checkpointed stage execution
//!
//! Work is structured as an explicit ordered list of stage handlers. The
//! cache records the index of the next stage to run; a resumed run skips
//! everything below the checkpoint and advances it after each stage's
//! batches confirm. Stages must be idempotent: a stage that partially
//! completed before a crash runs again in full, and its per-operation
//! producers re-check preconditions instead of trusting a completion log.

use crate::cache::DeployCache;
use crate::error::RolloutResult;
use async_trait::async_trait;
use serde_json::json;
use tracing::info;

/// Cache key holding the index of the next stage to execute
pub const CHECKPOINT_KEY: &str = "checkpoint";

/// One resumable unit of rollout work
#[async_trait]
pub trait Stage: Send + Sync {
    /// Stable stage name for logs and status output
    fn name(&self) -> &'static str;

    /// Execute the stage to completion
    async fn run(&self) -> RolloutResult<()>;
}

/// Read the persisted checkpoint, defaulting to stage 0
pub async fn checkpoint(cache: &DeployCache) -> usize {
    cache
        .get(CHECKPOINT_KEY)
        .await
        .and_then(|v| v.as_u64())
        .unwrap_or(0) as usize
}

/// Run all stages at or above the cached checkpoint, in order, advancing
/// the checkpoint after each one completes.
pub async fn run_stages(cache: &DeployCache, stages: &[Box<dyn Stage + '_>]) -> RolloutResult<()> {
    let start = checkpoint(cache).await;
    if start > 0 {
        info!("Resuming at stage {start} of {}", stages.len());
    }

    for (index, stage) in stages.iter().enumerate().skip(start) {
        info!("Stage {index}: {}", stage.name());
        stage.run().await?;
        cache.set(CHECKPOINT_KEY, json!(index + 1)).await?;
    }

    Ok(())
}

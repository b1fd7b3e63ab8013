//! Rollout - resumable, idempotent token rollout orchestrator
//!
//! Provisions a token, vesting-wallet factory, and batch relayer against
//! an execution target, then grants roles, creates vesting schedules, and
//! funds allocations. A durable per-network cache makes every step
//! restartable: re-running after a crash skips completed work.

pub mod cache;
pub mod cli;
pub mod error;
pub mod executor;
pub mod plan;
pub mod provision;
pub mod rollout;
pub mod target;

pub use error::{RolloutError, RolloutResult};

//! Error types for rollout
//!
//! All modules use `RolloutResult<T>` as their return type. Every error
//! surfaces to the top level and terminates the process; re-running the
//! same command is the recovery path, made safe by the deploy cache.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for rollout operations
pub type RolloutResult<T> = Result<T, RolloutError>;

/// All errors that can occur in rollout
#[derive(Error, Debug)]
pub enum RolloutError {
    // Plan errors
    #[error("Plan file not found: {0}")]
    PlanNotFound(PathBuf),

    #[error("Invalid plan at {path}: {reason}")]
    PlanInvalid { path: PathBuf, reason: String },

    #[error("Malformed address '{0}': expected 0x followed by 40 hex digits")]
    AddressInvalid(String),

    #[error("Duplicate allocation for beneficiary {beneficiary} with kind '{kind}'")]
    AllocationDuplicate { beneficiary: String, kind: String },

    #[error("Invalid allocation for {beneficiary}: {reason}")]
    AllocationInvalid { beneficiary: String, reason: String },

    // Cache errors
    #[error("Cached value for '{key}' does not match this run (cached: {cached}, current: {current}). The cache belongs to a different plan, operator, or network.")]
    CacheMismatch {
        key: String,
        cached: String,
        current: String,
    },

    #[error("Cache is locked by another process: {0}")]
    CacheLocked(PathBuf),

    #[error("Failed to persist cache to {path}: {reason}")]
    CachePersist { path: PathBuf, reason: String },

    // Target errors
    #[error("No execution target available. Pass --rehearse to run against the in-memory simulator.")]
    TargetUnavailable,

    #[error("Deployment of '{artifact}' failed: {reason}")]
    DeployFailed { artifact: String, reason: String },

    #[error("Confirmation timed out after {seconds}s for batch {batch}")]
    ConfirmationTimeout { batch: usize, seconds: u64 },

    #[error("Call to {target}.{method} rejected: {reason}")]
    CallRejected {
        target: String,
        method: String,
        reason: String,
    },

    #[error("Unknown resource at address {0}")]
    UnknownResource(String),

    // Verification errors
    #[error("Post-condition check failed: {0}")]
    VerificationFailed(String),

    // IO errors
    #[error("IO error: {context}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    // Serialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    // General errors
    #[error("Internal error: {0}")]
    Internal(String),
}

impl RolloutError {
    /// Create an IO error with context
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }

    /// Get actionable hint for the error
    pub fn hint(&self) -> Option<&'static str> {
        match self {
            Self::CacheMismatch { .. } => {
                Some("Point --cache-dir at a fresh directory, or re-run with the original plan")
            }
            Self::CacheLocked(_) => {
                Some("If no other rollout is running, delete the stale .lock file and retry")
            }
            Self::TargetUnavailable => Some("Run: rollout run <plan.toml> --rehearse"),
            Self::VerificationFailed(_) => {
                Some("Re-run the same command; completed work is skipped and missing work retried")
            }
            _ => None,
        }
    }
}

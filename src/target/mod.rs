//! Remote execution target abstraction
//!
//! The orchestrator only ever talks to the chain through this trait:
//! deploy a resource, relay a batch of calls through a deployed relayer,
//! or run a read-only query.
//! [`MemoryTarget`] is the in-process implementation behind `--rehearse`
//! and the test suite; a live RPC adapter would implement the same trait.

pub mod memory;

pub use memory::MemoryTarget;

use crate::error::RolloutResult;
use crate::plan::Address;
use async_trait::async_trait;
use serde_json::Value;
use uuid::Uuid;

/// One parameterized call against a deployed resource
#[derive(Debug, Clone, PartialEq)]
pub struct Call {
    pub target: Address,
    pub method: String,
    pub args: Vec<Value>,
}

impl Call {
    pub fn new(target: Address, method: impl Into<String>, args: Vec<Value>) -> Self {
        Self {
            target,
            method: method.into(),
            args,
        }
    }
}

/// Durable acknowledgment for a confirmed batch
#[derive(Debug, Clone)]
pub struct Receipt {
    /// Target-assigned identifier for the batch
    pub id: Uuid,
    /// Position in the target's global submission sequence
    pub sequence: u64,
}

/// A confirmed deployment
#[derive(Debug, Clone)]
pub struct Deployment {
    pub address: Address,
}

/// Abstract execution target interface
///
/// `deploy` and `relay` resolve only after the target durably confirms
/// the effect; `query` reads current state and is used to re-validate
/// preconditions on resumed runs.
#[async_trait]
pub trait ExecutionTarget: Send + Sync {
    /// Create a resource from a named artifact and return its address
    async fn deploy(&self, artifact: &str, args: &[Value]) -> RolloutResult<Deployment>;

    /// Submit a batch of calls through `relayer`, resolving on
    /// confirmation
    async fn relay(&self, relayer: &Address, calls: &[Call]) -> RolloutResult<Receipt>;

    /// Run a read-only call against current state
    async fn query(&self, call: &Call) -> RolloutResult<Value>;

    /// Human-readable target name for display
    fn target_name(&self) -> &'static str;
}

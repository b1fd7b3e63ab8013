//! Checkpointed batch execution
//!
//! The executor resolves a list of operation producers, drops the no-ops,
//! chunks the remaining calls into fixed-size batches, and submits them
//! with bounded concurrency. Submission order always matches input order;
//! confirmation order across in-flight batches does not when the
//! concurrency bound is above one.

pub mod stages;

pub use stages::{checkpoint, run_stages, Stage, CHECKPOINT_KEY};

use crate::error::{RolloutError, RolloutResult};
use crate::plan::Address;
use crate::target::{Call, ExecutionTarget, Receipt};
use futures_util::future::{join_all, BoxFuture};
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::time::timeout;
use tracing::debug;

/// Default operations per batch
pub const DEFAULT_BATCH_SIZE: usize = 10;
/// Default in-flight batch bound; sized for the target's nonce and
/// throughput constraints, not for performance
pub const DEFAULT_CONCURRENCY: usize = 4;
/// Default per-batch confirmation timeout
pub const DEFAULT_CONFIRM_TIMEOUT: Duration = Duration::from_secs(120);

/// An async operation producer: resolves to a call, or `None` when the
/// precondition it re-checks shows the operation is already done.
pub type CallProducer<'a> = BoxFuture<'a, RolloutResult<Option<Call>>>;

/// Split a vector into consecutive fixed-size groups, order preserved
pub fn chunk<T>(items: Vec<T>, size: usize) -> Vec<Vec<T>> {
    assert!(size > 0, "chunk size must be non-zero");

    let mut batches = Vec::with_capacity(items.len().div_ceil(size));
    let mut batch = Vec::with_capacity(size);
    for item in items {
        batch.push(item);
        if batch.len() == size {
            batches.push(std::mem::replace(&mut batch, Vec::with_capacity(size)));
        }
    }
    if !batch.is_empty() {
        batches.push(batch);
    }
    batches
}

/// Batched, concurrency-bounded submission against an execution target
pub struct BatchExecutor {
    batch_size: usize,
    concurrency: usize,
    confirm_timeout: Duration,
}

impl Default for BatchExecutor {
    fn default() -> Self {
        Self::new(DEFAULT_BATCH_SIZE, DEFAULT_CONCURRENCY)
    }
}

impl BatchExecutor {
    pub fn new(batch_size: usize, concurrency: usize) -> Self {
        Self {
            batch_size: batch_size.max(1),
            concurrency: concurrency.max(1),
            confirm_timeout: DEFAULT_CONFIRM_TIMEOUT,
        }
    }

    /// Override the per-batch confirmation timeout
    pub fn with_confirm_timeout(mut self, confirm_timeout: Duration) -> Self {
        self.confirm_timeout = confirm_timeout;
        self
    }

    /// Resolve `producers`, submit the surviving calls in batches through
    /// `relayer`, and wait for every confirmation. Receipts come back in
    /// batch order.
    ///
    /// Any producer failure, submission failure, or confirmation timeout
    /// aborts the whole stage; nothing is submitted after a producer
    /// fails, and already confirmed batches stay confirmed. A re-run
    /// re-derives what is still needed from current remote state.
    pub async fn execute_batches(
        &self,
        target: &dyn ExecutionTarget,
        relayer: &Address,
        producers: Vec<CallProducer<'_>>,
    ) -> RolloutResult<Vec<Receipt>> {
        let produced = join_all(producers).await;

        let mut calls = Vec::with_capacity(produced.len());
        for result in produced {
            if let Some(call) = result? {
                calls.push(call);
            }
        }

        if calls.is_empty() {
            debug!("All operations already satisfied, nothing to submit");
            return Ok(Vec::new());
        }

        let batches = chunk(calls, self.batch_size);
        debug!(
            "Submitting {} batches (size {}, concurrency {})",
            batches.len(),
            self.batch_size,
            self.concurrency
        );

        // The semaphore is FIFO-fair and every batch future starts polling
        // in input order, so submission order matches input order even
        // though confirmations may land out of order.
        let semaphore = Semaphore::new(self.concurrency);
        let submissions = batches.iter().enumerate().map(|(index, batch)| {
            let semaphore = &semaphore;
            async move {
                let _permit = semaphore
                    .acquire()
                    .await
                    .map_err(|_| RolloutError::Internal("semaphore closed".to_string()))?;

                debug!("Submitting batch {index} ({} calls)", batch.len());
                let receipt = timeout(self.confirm_timeout, target.relay(relayer, batch))
                    .await
                    .map_err(|_| RolloutError::ConfirmationTimeout {
                        batch: index,
                        seconds: self.confirm_timeout.as_secs(),
                    })??;

                debug!("Batch {index} confirmed (sequence {})", receipt.sequence);
                Ok::<Receipt, RolloutError>(receipt)
            }
        });

        join_all(submissions).await.into_iter().collect()
    }
}

//! Durable key-value cache backing resumable runs
//!
//! Every provisioned address, pinned identity, and stage checkpoint lives
//! here, keyed per network, so a restarted run picks up where the last one
//! stopped. Values are arbitrary JSON; every mutation is persisted before
//! the call returns.
//!
//! # Concurrency
//!
//! A single `tokio::sync::Mutex` serializes every read-modify-write,
//! including across the producer await in [`DeployCache::get_or_else`].
//! Waiters are queued FIFO, so interleaved callers never lose updates.
//! Cross-process exclusion is the lock file's job (see
//! [`store::FileStore`]).

pub mod store;

pub use store::{CacheStore, FileStore, MemoryStore};

use crate::error::{RolloutError, RolloutResult};
use serde_json::Value;
use std::collections::BTreeMap;
use std::future::Future;
use std::path::PathBuf;
use tokio::sync::Mutex;
use tracing::debug;

/// Get the default cache directory path
pub fn default_cache_dir() -> PathBuf {
    dirs::state_dir()
        .or_else(dirs::data_local_dir)
        .unwrap_or_else(|| PathBuf::from("."))
        .join("rollout")
}

/// Persistent key-value cache for one rollout target
pub struct DeployCache {
    store: Box<dyn CacheStore>,
    entries: Mutex<BTreeMap<String, Value>>,
}

impl DeployCache {
    /// Open the cache, loading whatever the store already holds
    pub async fn open(store: Box<dyn CacheStore>) -> RolloutResult<Self> {
        let entries = store.load().await?;
        if !entries.is_empty() {
            debug!("Loaded {} cached entries", entries.len());
        }
        Ok(Self {
            store,
            entries: Mutex::new(entries),
        })
    }

    /// Look up a cached value
    pub async fn get(&self, key: &str) -> Option<Value> {
        self.entries.lock().await.get(key).cloned()
    }

    /// Look up a cached string value
    pub async fn get_str(&self, key: &str) -> Option<String> {
        self.get(key)
            .await
            .and_then(|v| v.as_str().map(str::to_string))
    }

    /// Store a value, persisting immediately
    pub async fn set(&self, key: &str, value: Value) -> RolloutResult<()> {
        let mut entries = self.entries.lock().await;
        entries.insert(key.to_string(), value);
        self.store.persist(&entries).await
    }

    /// Return the cached value for `key`, or produce, store, and return it.
    ///
    /// The cache lock is held across the producer await: two concurrent
    /// callers for the same key run the producer exactly once.
    pub async fn get_or_else<F, Fut>(&self, key: &str, producer: F) -> RolloutResult<Value>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = RolloutResult<Value>>,
    {
        let mut entries = self.entries.lock().await;

        if let Some(value) = entries.get(key) {
            debug!("Cache hit: {key}");
            return Ok(value.clone());
        }

        debug!("Cache miss: {key}");
        let value = producer().await?;
        entries.insert(key.to_string(), value.clone());
        self.store.persist(&entries).await?;
        Ok(value)
    }

    /// Pin a value: first call stores it and returns `true`; later calls
    /// return `false` if the cached value deep-equals `value`, and fail
    /// with [`RolloutError::CacheMismatch`] if it does not.
    ///
    /// Used at run start to reject resuming against a different network,
    /// operator, or plan.
    pub async fn expect(&self, key: &str, value: Value) -> RolloutResult<bool> {
        let mut entries = self.entries.lock().await;

        match entries.get(key) {
            Some(cached) if *cached == value => Ok(false),
            Some(cached) => Err(RolloutError::CacheMismatch {
                key: key.to_string(),
                cached: cached.to_string(),
                current: value.to_string(),
            }),
            None => {
                entries.insert(key.to_string(), value);
                self.store.persist(&entries).await?;
                Ok(true)
            }
        }
    }
}

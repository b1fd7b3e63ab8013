//! Backing stores for the deploy cache
//!
//! A store only knows how to load and persist the full entry map. The
//! serialization discipline lives in [`crate::cache::DeployCache`].

use crate::error::{RolloutError, RolloutResult};
use async_trait::async_trait;
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::debug;

/// Durable map storage behind the deploy cache
#[async_trait]
pub trait CacheStore: Send + Sync {
    /// Load all entries, or an empty map if nothing was persisted yet
    async fn load(&self) -> RolloutResult<BTreeMap<String, Value>>;

    /// Persist the full entry map
    async fn persist(&self, entries: &BTreeMap<String, Value>) -> RolloutResult<()>;
}

/// Advisory lock file guarding a cache file against a second writer.
///
/// Created with `create_new` so a concurrent open fails fast. Removed on
/// drop; a crash leaves a stale lock the operator deletes by hand.
#[derive(Debug)]
struct LockFile {
    path: PathBuf,
}

impl LockFile {
    fn acquire(path: PathBuf) -> RolloutResult<Self> {
        match std::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
        {
            Ok(mut file) => {
                use std::io::Write;
                let _ = write!(file, "{}", std::process::id());
                Ok(Self { path })
            }
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                Err(RolloutError::CacheLocked(path))
            }
            Err(e) => Err(RolloutError::io(
                format!("creating lock file {}", path.display()),
                e,
            )),
        }
    }
}

impl Drop for LockFile {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.path);
    }
}

/// JSON file store, one file per network identifier
#[derive(Debug)]
pub struct FileStore {
    path: PathBuf,
    _lock: LockFile,
}

impl FileStore {
    /// Open the store for a network, acquiring its advisory lock
    pub fn open(dir: &Path, network: &str) -> RolloutResult<Self> {
        std::fs::create_dir_all(dir)
            .map_err(|e| RolloutError::io(format!("creating cache directory {}", dir.display()), e))?;

        let path = Self::file_path(dir, network);
        let lock = LockFile::acquire(dir.join(format!("rollout-{network}.lock")))?;

        debug!("Cache file: {}", path.display());
        Ok(Self { path, _lock: lock })
    }

    /// Cache file location for a network, without opening the store
    pub fn file_path(dir: &Path, network: &str) -> PathBuf {
        dir.join(format!("rollout-{network}.json"))
    }

    /// Path of the backing cache file
    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl CacheStore for FileStore {
    async fn load(&self) -> RolloutResult<BTreeMap<String, Value>> {
        if !self.path.exists() {
            return Ok(BTreeMap::new());
        }

        let content = fs::read_to_string(&self.path)
            .await
            .map_err(|e| RolloutError::io(format!("reading cache file {}", self.path.display()), e))?;

        let entries: BTreeMap<String, Value> = serde_json::from_str(&content)?;
        Ok(entries)
    }

    async fn persist(&self, entries: &BTreeMap<String, Value>) -> RolloutResult<()> {
        let content = serde_json::to_string_pretty(entries)?;
        fs::write(&self.path, content)
            .await
            .map_err(|e| RolloutError::CachePersist {
                path: self.path.clone(),
                reason: e.to_string(),
            })?;
        Ok(())
    }
}

/// In-process store for tests and rehearsals that need no durability
#[derive(Default)]
pub struct MemoryStore {
    entries: std::sync::Mutex<BTreeMap<String, Value>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CacheStore for MemoryStore {
    async fn load(&self) -> RolloutResult<BTreeMap<String, Value>> {
        Ok(self.entries.lock().unwrap().clone())
    }

    async fn persist(&self, entries: &BTreeMap<String, Value>) -> RolloutResult<()> {
        *self.entries.lock().unwrap() = entries.clone();
        Ok(())
    }
}

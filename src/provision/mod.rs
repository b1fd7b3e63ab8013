//! Idempotent resource provisioning
//!
//! A provisioned resource is keyed by a logical name in the deploy cache.
//! The creation action runs at most once per cache file and key; every
//! later call binds a handle to the cached address without touching the
//! remote target.
//!
//! If the process dies after the remote creation confirms but before the
//! cache write lands, the next run re-creates the resource and the first
//! copy is orphaned. There is no two-phase commit between the target and
//! the cache; callers needing stronger guarantees reconcile externally.

use crate::cache::DeployCache;
use crate::error::{RolloutError, RolloutResult};
use crate::plan::Address;
use crate::target::Deployment;
use serde_json::json;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::info;

/// A resource bound to its remote address
#[derive(Debug, Clone)]
pub struct ResourceHandle {
    /// Logical name, also the cache key
    pub name: String,
    /// Remote address of the resource
    pub address: Address,
    /// Whether this call performed the creation (false = cache hit)
    pub created: bool,
}

/// Return the resource named `key`, creating it once if it is not cached.
///
/// On a cache hit the handle is bound to the cached address and `create`
/// never runs. On a miss, `create` performs the remote deployment and the
/// resulting address is persisted before this function returns.
pub async fn provision<F, Fut>(
    cache: &DeployCache,
    key: &str,
    create: F,
) -> RolloutResult<ResourceHandle>
where
    F: FnOnce() -> Fut,
    Fut: Future<Output = RolloutResult<Deployment>>,
{
    let ran = AtomicBool::new(false);

    let value = cache
        .get_or_else(key, || async {
            ran.store(true, Ordering::SeqCst);
            let deployment = create().await?;
            Ok(json!(deployment.address.as_str()))
        })
        .await?;

    let address = value
        .as_str()
        .ok_or_else(|| {
            RolloutError::Internal(format!("cached value for '{key}' is not an address string"))
        })
        .and_then(Address::parse)?;

    let created = ran.load(Ordering::SeqCst);
    if created {
        info!("Provisioned {key} at {address}");
    } else {
        info!("Reusing {key} at {address}");
    }

    Ok(ResourceHandle {
        name: key.to_string(),
        address,
        created,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::MemoryStore;
    use std::sync::atomic::AtomicUsize;

    async fn memory_cache() -> DeployCache {
        DeployCache::open(Box::new(MemoryStore::new())).await.unwrap()
    }

    fn deployment(addr: &str) -> Deployment {
        Deployment {
            address: Address::parse(addr).unwrap(),
        }
    }

    const ADDR: &str = "0x0000000000000000000000000000000000000001";

    #[tokio::test]
    async fn creates_exactly_once() {
        let cache = memory_cache().await;
        let calls = AtomicUsize::new(0);

        let first = provision(&cache, "token", || async {
            calls.fetch_add(1, Ordering::SeqCst);
            Ok(deployment(ADDR))
        })
        .await
        .unwrap();

        let second = provision(&cache, "token", || async {
            calls.fetch_add(1, Ordering::SeqCst);
            Ok(deployment("0x0000000000000000000000000000000000000099"))
        })
        .await
        .unwrap();

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(first.created);
        assert!(!second.created);
        assert_eq!(first.address, second.address);
        assert_eq!(second.address.as_str(), ADDR);
    }

    #[tokio::test]
    async fn distinct_keys_create_independently() {
        let cache = memory_cache().await;

        let token = provision(&cache, "token", || async { Ok(deployment(ADDR)) })
            .await
            .unwrap();
        let relayer = provision(&cache, "relayer", || async {
            Ok(deployment("0x0000000000000000000000000000000000000002"))
        })
        .await
        .unwrap();

        assert!(token.created);
        assert!(relayer.created);
        assert_ne!(token.address, relayer.address);
    }

    #[tokio::test]
    async fn failed_creation_caches_nothing() {
        let cache = memory_cache().await;

        let result = provision(&cache, "token", || async {
            Err(RolloutError::DeployFailed {
                artifact: "token".to_string(),
                reason: "nonce too low".to_string(),
            })
        })
        .await;
        assert!(result.is_err());

        // Retry succeeds and performs the creation
        let handle = provision(&cache, "token", || async { Ok(deployment(ADDR)) })
            .await
            .unwrap();
        assert!(handle.created);
    }
}

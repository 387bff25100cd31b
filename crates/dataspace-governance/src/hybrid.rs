//! Memory cache over a persistent policy store.
//!
//! Reads are served from the cache and fall back to the backing store on a
//! miss, populating the cache. Removal tombstones the hash and bumps a removal
//! epoch before touching either layer; a lazy load only populates the cache if
//! no removal happened since it started, so a revoked policy cannot be
//! resurrected by a read that raced the delete. Only a tombstone on the hash
//! being read turns a backing hit into a miss. A tombstone outlives a failed
//! backing delete: the policy stays invalid until it is registered again.

use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use dataspace_policy::PolicyHash;
use dataspace_policy_store::{
    prepare_policy, MemoryPolicyStore, PolicyStore, StoreError, StoreResult,
};
use serde_json::Value;
use tracing::{debug, warn};

#[derive(Debug, Default)]
struct Invalidation {
    tombstones: HashSet<PolicyHash>,
    epoch: u64,
}

pub struct HybridPolicyStore {
    cache: MemoryPolicyStore,
    backing: Arc<dyn PolicyStore>,
    invalidation: Mutex<Invalidation>,
}

impl HybridPolicyStore {
    pub fn new(backing: Arc<dyn PolicyStore>) -> Self {
        Self {
            cache: MemoryPolicyStore::new(),
            backing,
            invalidation: Mutex::new(Invalidation::default()),
        }
    }

    pub fn backing(&self) -> &Arc<dyn PolicyStore> {
        &self.backing
    }

    fn invalidation(&self) -> StoreResult<MutexGuard<'_, Invalidation>> {
        self.invalidation
            .lock()
            .map_err(|_| StoreError::Unavailable("invalidation lock poisoned".to_string()))
    }

    /// Cache lookup, then backing lookup with guarded cache population.
    async fn load(&self, hash: &PolicyHash) -> StoreResult<Option<Value>> {
        let started_at = {
            let state = self.invalidation()?;
            if state.tombstones.contains(hash) {
                return Ok(None);
            }
            state.epoch
        };

        if let Some(body) = self.cache.get(hash).await? {
            return Ok(Some(body));
        }

        let Some(body) = self.backing.get(hash).await? else {
            return Ok(None);
        };

        let state = self.invalidation()?;
        if state.tombstones.contains(hash) {
            debug!(hash = %hash, "revoked while loading");
            return Ok(None);
        }
        if state.epoch != started_at {
            // Another removal ran meanwhile; serve the read but leave the
            // cache untouched.
            debug!(hash = %hash, "removal raced lazy load; not caching");
            return Ok(Some(body));
        }
        self.cache.insert_prepared(hash.clone(), body.clone())?;
        Ok(Some(body))
    }
}

#[async_trait]
impl PolicyStore for HybridPolicyStore {
    async fn add(&self, policy: &Value) -> StoreResult<PolicyHash> {
        let prepared = prepare_policy(policy)?;
        let hash = self.backing.add(policy).await?;

        let mut state = self.invalidation()?;
        state.tombstones.remove(&hash);
        self.cache.insert_prepared(hash.clone(), prepared.body)?;
        Ok(hash)
    }

    async fn remove(&self, hash: &PolicyHash) -> StoreResult<bool> {
        {
            let mut state = self.invalidation()?;
            state.tombstones.insert(hash.clone());
            state.epoch += 1;
        }
        let cached = self.cache.remove(hash).await?;

        match self.backing.remove(hash).await {
            Ok(stored) => {
                self.invalidation()?.tombstones.remove(hash);
                Ok(cached || stored)
            }
            Err(e) => {
                warn!(hash = %hash, error = %e, "backing delete failed; policy stays revoked in cache");
                Err(e)
            }
        }
    }

    async fn get(&self, hash: &PolicyHash) -> StoreResult<Option<Value>> {
        self.load(hash).await
    }

    async fn contains(&self, hash: &PolicyHash) -> StoreResult<bool> {
        Ok(self.load(hash).await?.is_some())
    }

    async fn count(&self) -> StoreResult<usize> {
        Ok(self.list_hashes().await?.len())
    }

    async fn list_hashes(&self) -> StoreResult<Vec<PolicyHash>> {
        let hashes = self.backing.list_hashes().await?;
        let state = self.invalidation()?;
        Ok(hashes
            .into_iter()
            .filter(|h| !state.tombstones.contains(h))
            .collect())
    }

    async fn clear(&self) -> StoreResult<usize> {
        self.invalidation()?.epoch += 1;
        self.cache.clear().await?;
        let removed = self.backing.clear().await?;
        self.invalidation()?.tombstones.clear();
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dataspace_policy_store::FilesystemPolicyStore;
    use serde_json::json;
    use std::sync::atomic::{AtomicBool, Ordering};
    use tempfile::TempDir;

    fn policy(purpose: &str) -> Value {
        json!({
            "odrl:permission": {
                "odrl:action": "use",
                "odrl:constraint": {
                    "odrl:leftOperand": "cx-policy:UsagePurpose",
                    "odrl:operator": "eq",
                    "odrl:rightOperand": purpose
                }
            }
        })
    }

    /// Backing store whose deletes can be made to fail.
    #[derive(Default)]
    struct FlakyStore {
        inner: MemoryPolicyStore,
        fail_removes: AtomicBool,
    }

    #[async_trait]
    impl PolicyStore for FlakyStore {
        async fn add(&self, policy: &Value) -> StoreResult<PolicyHash> {
            self.inner.add(policy).await
        }
        async fn remove(&self, hash: &PolicyHash) -> StoreResult<bool> {
            if self.fail_removes.load(Ordering::SeqCst) {
                return Err(StoreError::Unavailable("disk detached".to_string()));
            }
            self.inner.remove(hash).await
        }
        async fn get(&self, hash: &PolicyHash) -> StoreResult<Option<Value>> {
            self.inner.get(hash).await
        }
        async fn count(&self) -> StoreResult<usize> {
            self.inner.count().await
        }
        async fn list_hashes(&self) -> StoreResult<Vec<PolicyHash>> {
            self.inner.list_hashes().await
        }
        async fn clear(&self) -> StoreResult<usize> {
            self.inner.clear().await
        }
    }

    /// Backing store that parks one `get` until released.
    #[derive(Default)]
    struct GatedStore {
        inner: MemoryPolicyStore,
        gated: Mutex<Option<PolicyHash>>,
        entered: tokio::sync::Notify,
        release: tokio::sync::Notify,
    }

    #[async_trait]
    impl PolicyStore for GatedStore {
        async fn add(&self, policy: &Value) -> StoreResult<PolicyHash> {
            self.inner.add(policy).await
        }
        async fn remove(&self, hash: &PolicyHash) -> StoreResult<bool> {
            self.inner.remove(hash).await
        }
        async fn get(&self, hash: &PolicyHash) -> StoreResult<Option<Value>> {
            let body = self.inner.get(hash).await?;
            let parked = {
                let mut gated = self.gated.lock().unwrap();
                if gated.as_ref() == Some(hash) {
                    gated.take()
                } else {
                    None
                }
            };
            if parked.is_some() {
                self.entered.notify_one();
                self.release.notified().await;
            }
            Ok(body)
        }
        async fn count(&self) -> StoreResult<usize> {
            self.inner.count().await
        }
        async fn list_hashes(&self) -> StoreResult<Vec<PolicyHash>> {
            self.inner.list_hashes().await
        }
        async fn clear(&self) -> StoreResult<usize> {
            self.inner.clear().await
        }
    }

    #[tokio::test]
    async fn unrelated_removal_during_lazy_load_keeps_policy_valid() {
        let backing = Arc::new(GatedStore::default());
        let hybrid = Arc::new(HybridPolicyStore::new(backing.clone()));

        let revoked = hybrid.add(&policy("a")).await.unwrap();
        // registered before this process started: only in the backing store
        let kept = backing.inner.add(&policy("b")).await.unwrap();
        *backing.gated.lock().unwrap() = Some(kept.clone());

        let reader = {
            let hybrid = hybrid.clone();
            let kept = kept.clone();
            tokio::spawn(async move { hybrid.contains(&kept).await.unwrap() })
        };
        backing.entered.notified().await;
        assert!(hybrid.remove(&revoked).await.unwrap());
        backing.release.notify_one();

        assert!(reader.await.unwrap());
        assert!(!hybrid.cache.contains(&kept).await.unwrap());
        assert!(hybrid.is_valid(&policy("b")).await.unwrap());
        assert!(!hybrid.is_valid(&policy("a")).await.unwrap());
    }

    #[tokio::test]
    async fn lazy_load_racing_its_own_removal_is_not_cached() {
        let backing = Arc::new(GatedStore::default());
        let hybrid = Arc::new(HybridPolicyStore::new(backing.clone()));

        let hash = backing.inner.add(&policy("a")).await.unwrap();
        *backing.gated.lock().unwrap() = Some(hash.clone());

        let reader = {
            let hybrid = hybrid.clone();
            let hash = hash.clone();
            tokio::spawn(async move { hybrid.get(&hash).await.unwrap() })
        };
        backing.entered.notified().await;
        assert!(hybrid.remove(&hash).await.unwrap());
        backing.release.notify_one();
        reader.await.unwrap();

        assert!(!hybrid.cache.contains(&hash).await.unwrap());
        assert!(!hybrid.contains(&hash).await.unwrap());
    }

    #[tokio::test]
    async fn lazily_loads_from_backing() {
        let dir = TempDir::new().unwrap();
        let backing = Arc::new(FilesystemPolicyStore::new(dir.path()));
        let hash = backing.add(&policy("a")).await.unwrap();

        let hybrid = HybridPolicyStore::new(backing.clone());
        assert!(hybrid.contains(&hash).await.unwrap());
        assert!(hybrid.cache.contains(&hash).await.unwrap());

        // served from cache after the file is gone
        std::fs::remove_file(dir.path().join(format!("{hash}.json"))).unwrap();
        assert!(hybrid.contains(&hash).await.unwrap());
    }

    #[tokio::test]
    async fn read_after_remove_is_invalid() {
        let dir = TempDir::new().unwrap();
        let hybrid = HybridPolicyStore::new(Arc::new(FilesystemPolicyStore::new(dir.path())));

        let hash = hybrid.add(&policy("a")).await.unwrap();
        assert!(hybrid.is_valid(&policy("a")).await.unwrap());
        assert!(hybrid.remove(&hash).await.unwrap());
        assert!(!hybrid.is_valid(&policy("a")).await.unwrap());
        assert!(!hybrid.remove(&hash).await.unwrap());
        assert_eq!(hybrid.count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn failed_backing_delete_keeps_tombstone() {
        let backing = Arc::new(FlakyStore::default());
        let hybrid = HybridPolicyStore::new(backing.clone());
        let hash = hybrid.add(&policy("a")).await.unwrap();

        backing.fail_removes.store(true, Ordering::SeqCst);
        let err = hybrid.remove(&hash).await.unwrap_err();
        assert!(err.is_unavailable());

        assert!(backing.inner.contains(&hash).await.unwrap());
        assert!(!hybrid.contains(&hash).await.unwrap());
        assert!(hybrid.list_hashes().await.unwrap().is_empty());

        // registering again lifts the tombstone
        hybrid.add(&policy("a")).await.unwrap();
        assert!(hybrid.contains(&hash).await.unwrap());
    }

    #[tokio::test]
    async fn clear_empties_both_layers() {
        let dir = TempDir::new().unwrap();
        let hybrid = HybridPolicyStore::new(Arc::new(FilesystemPolicyStore::new(dir.path())));
        hybrid.add(&policy("a")).await.unwrap();
        hybrid.add(&policy("b")).await.unwrap();

        assert_eq!(hybrid.clear().await.unwrap(), 2);
        assert!(!hybrid.is_valid(&policy("a")).await.unwrap());
        assert_eq!(hybrid.backing().count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn concurrent_reads_and_removes_never_resurrect() {
        let dir = TempDir::new().unwrap();
        let hybrid = Arc::new(HybridPolicyStore::new(Arc::new(FilesystemPolicyStore::new(
            dir.path(),
        ))));
        let hash = hybrid.add(&policy("a")).await.unwrap();

        let readers: Vec<_> = (0..8)
            .map(|_| {
                let hybrid = hybrid.clone();
                let hash = hash.clone();
                tokio::spawn(async move {
                    for _ in 0..20 {
                        hybrid.contains(&hash).await.unwrap();
                    }
                })
            })
            .collect();
        hybrid.remove(&hash).await.unwrap();
        for reader in readers {
            reader.await.unwrap();
        }

        assert!(!hybrid.contains(&hash).await.unwrap());
        assert!(!hybrid.cache.contains(&hash).await.unwrap());
    }
}

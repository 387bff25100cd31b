//! In-memory policy store. Contents live as long as the process.

use std::collections::BTreeMap;
use std::sync::RwLock;

use async_trait::async_trait;
use dataspace_policy::PolicyHash;
use serde_json::Value;

use crate::traits::{prepare_policy, PolicyStore};
use crate::{StoreError, StoreResult};

#[derive(Debug, Default)]
pub struct MemoryPolicyStore {
    policies: RwLock<BTreeMap<PolicyHash, Value>>,
}

impl MemoryPolicyStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a body under a precomputed hash. Used by caches that already
    /// hold the canonical hash.
    pub fn insert_prepared(&self, hash: PolicyHash, body: Value) -> StoreResult<()> {
        let mut guard = self.write()?;
        guard.entry(hash).or_insert(body);
        Ok(())
    }

    fn read(&self) -> StoreResult<std::sync::RwLockReadGuard<'_, BTreeMap<PolicyHash, Value>>> {
        self.policies
            .read()
            .map_err(|_| StoreError::Unavailable("policy lock poisoned".to_string()))
    }

    fn write(&self) -> StoreResult<std::sync::RwLockWriteGuard<'_, BTreeMap<PolicyHash, Value>>> {
        self.policies
            .write()
            .map_err(|_| StoreError::Unavailable("policy lock poisoned".to_string()))
    }
}

#[async_trait]
impl PolicyStore for MemoryPolicyStore {
    async fn add(&self, policy: &Value) -> StoreResult<PolicyHash> {
        let prepared = prepare_policy(policy)?;
        self.insert_prepared(prepared.hash.clone(), prepared.body)?;
        Ok(prepared.hash)
    }

    async fn remove(&self, hash: &PolicyHash) -> StoreResult<bool> {
        Ok(self.write()?.remove(hash).is_some())
    }

    async fn get(&self, hash: &PolicyHash) -> StoreResult<Option<Value>> {
        Ok(self.read()?.get(hash).cloned())
    }

    async fn contains(&self, hash: &PolicyHash) -> StoreResult<bool> {
        Ok(self.read()?.contains_key(hash))
    }

    async fn count(&self) -> StoreResult<usize> {
        Ok(self.read()?.len())
    }

    async fn list_hashes(&self) -> StoreResult<Vec<PolicyHash>> {
        Ok(self.read()?.keys().cloned().collect())
    }

    async fn clear(&self) -> StoreResult<usize> {
        let mut guard = self.write()?;
        let removed = guard.len();
        guard.clear();
        Ok(removed)
    }
}

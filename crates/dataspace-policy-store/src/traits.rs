use async_trait::async_trait;
use dataspace_policy::{normalize_policy, Catalog, Offer, Policy, PolicyHash};
use serde_json::Value;

use crate::StoreResult;

/// A policy reduced to what stores persist.
#[derive(Debug, Clone, PartialEq)]
pub struct PreparedPolicy {
    pub hash: PolicyHash,
    pub body: Value,
}

/// Normalize and hash a policy document.
pub fn prepare_policy(policy: &Value) -> StoreResult<PreparedPolicy> {
    let body = normalize_policy(policy)?;
    let hash = Policy::from_json(&body)?.hash()?;
    Ok(PreparedPolicy { hash, body })
}

/// Storage interface for known-valid policies, keyed by canonical hash.
#[async_trait]
pub trait PolicyStore: Send + Sync {
    /// Persist a policy; adding the same body twice yields the same hash and
    /// stores it once.
    async fn add(&self, policy: &Value) -> StoreResult<PolicyHash>;

    /// Remove a policy. Returns `false` when the hash is unknown.
    async fn remove(&self, hash: &PolicyHash) -> StoreResult<bool>;

    /// Normalized body stored under `hash`.
    async fn get(&self, hash: &PolicyHash) -> StoreResult<Option<Value>>;

    async fn contains(&self, hash: &PolicyHash) -> StoreResult<bool> {
        Ok(self.get(hash).await?.is_some())
    }

    async fn count(&self) -> StoreResult<usize>;

    /// All stored hashes, sorted.
    async fn list_hashes(&self) -> StoreResult<Vec<PolicyHash>>;

    /// Remove every policy and return how many were removed.
    async fn clear(&self) -> StoreResult<usize>;

    /// Whether the candidate's canonical hash is registered.
    async fn is_valid(&self, policy: &Value) -> StoreResult<bool> {
        let prepared = prepare_policy(policy)?;
        self.contains(&prepared.hash).await
    }

    /// Registered policies among `policies`, in input order.
    async fn select_valid(&self, policies: &[Value]) -> StoreResult<Vec<Value>> {
        let mut valid = Vec::new();
        for policy in policies {
            if self.is_valid(policy).await? {
                valid.push(policy.clone());
            }
        }
        Ok(valid)
    }

    /// `(assetId, offer)` pairs whose offer policy is registered, in catalog order.
    async fn select_valid_from_catalog(&self, catalog: &Catalog) -> StoreResult<Vec<(String, Offer)>> {
        let mut valid = Vec::new();
        for offer in catalog.offers() {
            if self.is_valid(&offer.policy).await? {
                valid.push((offer.asset_id.clone(), offer.clone()));
            }
        }
        Ok(valid)
    }
}

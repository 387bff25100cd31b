//! Governance engine

use std::fmt;
use std::sync::Arc;

#[cfg(feature = "database")]
use dataspace_policy_store::DatabasePolicyStore;
use dataspace_policy::{Catalog, Offer, PolicyHash};
use dataspace_policy_store::{
    prepare_policy, FilesystemPolicyStore, MemoryPolicyStore, PolicyStore,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info, instrument};

use crate::config::{BackingStoreConfig, DatabaseStoreConfig, GovernanceConfig};
use crate::hybrid::HybridPolicyStore;
use crate::GovernanceResult;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GovernanceMode {
    Memory,
    Persistent,
    Hybrid,
}

impl fmt::Display for GovernanceMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GovernanceMode::Memory => write!(f, "memory"),
            GovernanceMode::Persistent => write!(f, "persistent"),
            GovernanceMode::Hybrid => write!(f, "hybrid"),
        }
    }
}

/// Outcome of screening one offer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "decision", rename_all = "lowercase")]
pub enum GovernanceDecision {
    Accepted { hash: PolicyHash },
    Rejected { hash: PolicyHash },
}

impl GovernanceDecision {
    pub fn is_accepted(&self) -> bool {
        matches!(self, GovernanceDecision::Accepted { .. })
    }

    pub fn hash(&self) -> &PolicyHash {
        match self {
            GovernanceDecision::Accepted { hash } | GovernanceDecision::Rejected { hash } => hash,
        }
    }
}

/// Registers acceptable policies and screens offers against them.
///
/// The engine owns its store; the host constructs it (usually via
/// [`GovernanceEngine::from_config`]) and shares it behind an `Arc`.
#[derive(Clone)]
pub struct GovernanceEngine {
    mode: GovernanceMode,
    store: Arc<dyn PolicyStore>,
}

impl GovernanceEngine {
    pub fn memory() -> Self {
        Self {
            mode: GovernanceMode::Memory,
            store: Arc::new(MemoryPolicyStore::new()),
        }
    }

    /// Every call goes straight to `store`.
    pub fn persistent(store: Arc<dyn PolicyStore>) -> Self {
        Self {
            mode: GovernanceMode::Persistent,
            store,
        }
    }

    /// Cache reads from `store` in memory.
    pub fn hybrid(store: Arc<dyn PolicyStore>) -> Self {
        Self {
            mode: GovernanceMode::Hybrid,
            store: Arc::new(HybridPolicyStore::new(store)),
        }
    }

    pub async fn from_config(config: &GovernanceConfig) -> GovernanceResult<Self> {
        let engine = match config {
            GovernanceConfig::Memory => Self::memory(),
            GovernanceConfig::Filesystem { path } => {
                Self::persistent(Arc::new(FilesystemPolicyStore::new(path.clone())))
            }
            GovernanceConfig::Database(db) => Self::persistent(connect_database(db).await?),
            GovernanceConfig::Hybrid { backing } => {
                let store: Arc<dyn PolicyStore> = match backing {
                    BackingStoreConfig::Filesystem { path } => {
                        Arc::new(FilesystemPolicyStore::new(path.clone()))
                    }
                    BackingStoreConfig::Database(db) => connect_database(db).await?,
                };
                Self::hybrid(store)
            }
        };
        info!(mode = %engine.mode, "governance engine ready");
        Ok(engine)
    }

    pub fn mode(&self) -> GovernanceMode {
        self.mode
    }

    /// Register a policy as acceptable. Returns its canonical hash.
    #[instrument(skip(self, policy))]
    pub async fn register_policy(&self, policy: &Value) -> GovernanceResult<PolicyHash> {
        let hash = self.store.add(policy).await?;
        info!(hash = %hash, "policy registered");
        Ok(hash)
    }

    /// Returns `false` if the hash was not registered.
    #[instrument(skip(self))]
    pub async fn revoke_policy(&self, hash: &PolicyHash) -> GovernanceResult<bool> {
        let removed = self.store.remove(hash).await?;
        if removed {
            info!(hash = %hash, "policy revoked");
        }
        Ok(removed)
    }

    pub async fn policy(&self, hash: &PolicyHash) -> GovernanceResult<Option<Value>> {
        Ok(self.store.get(hash).await?)
    }

    pub async fn policy_count(&self) -> GovernanceResult<usize> {
        Ok(self.store.count().await?)
    }

    pub async fn policy_hashes(&self) -> GovernanceResult<Vec<PolicyHash>> {
        Ok(self.store.list_hashes().await?)
    }

    pub async fn clear(&self) -> GovernanceResult<usize> {
        Ok(self.store.clear().await?)
    }

    pub async fn is_valid(&self, policy: &Value) -> GovernanceResult<bool> {
        Ok(self.store.is_valid(policy).await?)
    }

    pub async fn select_valid(&self, policies: &[Value]) -> GovernanceResult<Vec<Value>> {
        Ok(self.store.select_valid(policies).await?)
    }

    /// Offers in `catalog` whose policy is registered, as `(assetId, offer)`.
    #[instrument(skip(self, catalog), fields(offers = catalog.offers().count()))]
    pub async fn accepted_offers(&self, catalog: &Catalog) -> GovernanceResult<Vec<(String, Offer)>> {
        let accepted = self.store.select_valid_from_catalog(catalog).await?;
        debug!(accepted = accepted.len(), "catalog screened");
        Ok(accepted)
    }

    pub async fn evaluate_offer(&self, offer: &Offer) -> GovernanceResult<GovernanceDecision> {
        let hash = prepare_policy(&offer.policy)?.hash;
        let decision = if self.store.contains(&hash).await? {
            GovernanceDecision::Accepted { hash }
        } else {
            GovernanceDecision::Rejected { hash }
        };
        debug!(
            asset_id = %offer.asset_id,
            offer_id = %offer.offer_id,
            accepted = decision.is_accepted(),
            "offer evaluated"
        );
        Ok(decision)
    }
}

impl fmt::Debug for GovernanceEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GovernanceEngine")
            .field("mode", &self.mode)
            .finish_non_exhaustive()
    }
}

#[cfg(feature = "database")]
async fn connect_database(config: &DatabaseStoreConfig) -> GovernanceResult<Arc<dyn PolicyStore>> {
    let store = DatabasePolicyStore::connect_with_options(
        &config.url,
        config.max_connections,
        config.connect_timeout_secs,
    )
    .await?;
    Ok(Arc::new(store))
}

#[cfg(not(feature = "database"))]
async fn connect_database(_config: &DatabaseStoreConfig) -> GovernanceResult<Arc<dyn PolicyStore>> {
    Err(crate::GovernanceError::InvalidConfig(
        "database policy store requires the `database` feature".to_string(),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::GovernanceError;
    use dataspace_policy::PolicyError;
    use serde_json::json;
    use tempfile::TempDir;

    fn policy(purpose: &str) -> Value {
        json!({
            "@context": ["https://w3id.org/tractusx/edc/v0.0.1"],
            "@type": "odrl:Set",
            "odrl:permission": [{
                "odrl:action": {"@id": "odrl:use"},
                "odrl:constraint": {"odrl:and": [
                    {"odrl:leftOperand": {"@id": "cx-policy:FrameworkAgreement"}, "odrl:operator": {"@id": "odrl:eq"}, "odrl:rightOperand": "DataExchangeGovernance:1.0"},
                    {"odrl:leftOperand": {"@id": "cx-policy:UsagePurpose"}, "odrl:operator": {"@id": "odrl:eq"}, "odrl:rightOperand": purpose}
                ]}
            }]
        })
    }

    fn offer(asset: &str, id: &str, purpose: &str) -> Value {
        let mut p = policy(purpose);
        p["@id"] = json!(id);
        p["@type"] = json!("odrl:Offer");
        json!({"@id": asset, "odrl:hasPolicy": p})
    }

    async fn engines(dir: &TempDir) -> Vec<GovernanceEngine> {
        #[allow(unused_mut)]
        let mut engines = vec![
            GovernanceEngine::memory(),
            GovernanceEngine::from_config(&GovernanceConfig::Filesystem {
                path: dir.path().join("persistent"),
            })
            .await
            .unwrap(),
            GovernanceEngine::from_config(&GovernanceConfig::Hybrid {
                backing: BackingStoreConfig::Filesystem {
                    path: dir.path().join("hybrid"),
                },
            })
            .await
            .unwrap(),
        ];
        #[cfg(feature = "database")]
        engines.push(
            GovernanceEngine::from_config(&GovernanceConfig::Database(DatabaseStoreConfig {
                url: "sqlite::memory:".to_string(),
                max_connections: 1,
                connect_timeout_secs: 5,
            }))
            .await
            .unwrap(),
        );
        engines
    }

    #[tokio::test]
    async fn register_then_revoke_in_every_mode() {
        let dir = TempDir::new().unwrap();
        for engine in engines(&dir).await {
            let hash = engine.register_policy(&policy("a")).await.unwrap();
            assert!(engine.is_valid(&policy("a")).await.unwrap(), "{:?}", engine.mode());
            assert!(engine.policy(&hash).await.unwrap().is_some());
            assert_eq!(engine.policy_count().await.unwrap(), 1);

            assert!(engine.revoke_policy(&hash).await.unwrap());
            assert!(!engine.is_valid(&policy("a")).await.unwrap(), "{:?}", engine.mode());
            assert!(!engine.revoke_policy(&hash).await.unwrap());
        }
    }

    #[tokio::test]
    async fn modes_follow_config() {
        let dir = TempDir::new().unwrap();
        let modes: Vec<GovernanceMode> = engines(&dir).await.iter().map(|e| e.mode()).collect();
        assert_eq!(
            &modes[..3],
            &[GovernanceMode::Memory, GovernanceMode::Persistent, GovernanceMode::Hybrid]
        );
    }

    #[tokio::test]
    async fn screens_catalog_offers() {
        let engine = GovernanceEngine::memory();
        engine.register_policy(&policy("cx.pcf.base:1")).await.unwrap();

        let catalog = Catalog::from_json(&json!({
            "dcat:dataset": [
                offer("asset-pcf", "offer-1", "cx.pcf.base:1"),
                offer("asset-quality", "offer-2", "cx.quality.base:1")
            ]
        }))
        .unwrap();

        let accepted = engine.accepted_offers(&catalog).await.unwrap();
        assert_eq!(accepted.len(), 1);
        assert_eq!(accepted[0].0, "asset-pcf");

        let offers: Vec<&Offer> = catalog.offers().collect();
        assert!(engine.evaluate_offer(offers[0]).await.unwrap().is_accepted());
        let rejected = engine.evaluate_offer(offers[1]).await.unwrap();
        assert!(!rejected.is_accepted());
        assert_eq!(rejected.hash(), &prepare_policy(&offers[1].policy).unwrap().hash);
    }

    #[tokio::test]
    async fn malformed_offer_is_an_error_not_a_rejection() {
        let engine = GovernanceEngine::memory();
        let broken = Offer {
            asset_id: "asset".to_string(),
            offer_id: "offer".to_string(),
            policy: json!({"odrl:permission": {"odrl:constraint": {"odrl:operator": "eq"}}}),
        };
        let err = engine.evaluate_offer(&broken).await.unwrap_err();
        assert!(matches!(err, GovernanceError::Policy(PolicyError::MalformedConstraint(_))));
    }

    #[tokio::test]
    async fn persistent_registrations_survive_restart() {
        let dir = TempDir::new().unwrap();
        let config = GovernanceConfig::Hybrid {
            backing: BackingStoreConfig::Filesystem {
                path: dir.path().to_path_buf(),
            },
        };
        let hash = GovernanceEngine::from_config(&config)
            .await
            .unwrap()
            .register_policy(&policy("a"))
            .await
            .unwrap();

        let restarted = GovernanceEngine::from_config(&config).await.unwrap();
        assert_eq!(restarted.policy_hashes().await.unwrap(), vec![hash]);
        assert!(restarted.is_valid(&policy("a")).await.unwrap());
    }

    #[cfg(feature = "database")]
    #[tokio::test]
    async fn unreachable_database_is_unavailable() {
        let config = GovernanceConfig::Database(DatabaseStoreConfig {
            url: "postgres://nobody@127.0.0.1:1/none".to_string(),
            max_connections: 1,
            connect_timeout_secs: 1,
        });
        let err = GovernanceEngine::from_config(&config).await.unwrap_err();
        assert!(err.is_unavailable());
    }
}

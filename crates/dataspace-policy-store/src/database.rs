//! SQL policy store over `sqlx::AnyPool`.
//!
//! The same schema runs on PostgreSQL and SQLite; the backend is chosen by
//! the connection URL (`postgres://...`, `sqlite://...`, `sqlite::memory:`).

use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use dataspace_policy::PolicyHash;
use serde_json::Value;
use sqlx::any::AnyPoolOptions;
use sqlx::AnyPool;
use sqlx::Row;
use tracing::debug;

use crate::traits::{prepare_policy, PolicyStore};
use crate::{StoreError, StoreResult};

/// Database-backed policy store.
#[derive(Clone)]
pub struct DatabasePolicyStore {
    pool: AnyPool,
}

impl DatabasePolicyStore {
    /// Connect and initialize the schema.
    pub async fn connect(database_url: &str) -> StoreResult<Self> {
        Self::connect_with_options(database_url, 10, 5).await
    }

    pub async fn connect_with_options(
        database_url: &str,
        max_connections: u32,
        connect_timeout_secs: u64,
    ) -> StoreResult<Self> {
        sqlx::any::install_default_drivers();
        let pool = AnyPoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(Duration::from_secs(connect_timeout_secs))
            .connect(database_url)
            .await
            .map_err(|e| StoreError::Unavailable(format!("failed to connect policy database: {e}")))?;
        Self::from_pool(pool).await
    }

    pub async fn from_pool(pool: AnyPool) -> StoreResult<Self> {
        let store = Self { pool };
        store.init_schema().await?;
        Ok(store)
    }

    pub fn pool(&self) -> &AnyPool {
        &self.pool
    }

    async fn init_schema(&self) -> StoreResult<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS dataspace_policies (
                policy_hash TEXT PRIMARY KEY,
                body TEXT NOT NULL,
                created_at TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| backend("initialize schema", e))?;
        Ok(())
    }
}

#[async_trait]
impl PolicyStore for DatabasePolicyStore {
    async fn add(&self, policy: &Value) -> StoreResult<PolicyHash> {
        let prepared = prepare_policy(policy)?;
        let body = serde_json::to_string(&prepared.body)
            .map_err(|e| StoreError::Serialization(e.to_string()))?;

        let result = sqlx::query(
            "INSERT INTO dataspace_policies (policy_hash, body, created_at) VALUES ($1, $2, $3) \
             ON CONFLICT (policy_hash) DO NOTHING",
        )
        .bind(prepared.hash.as_str())
        .bind(body)
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await
        .map_err(|e| backend("insert policy", e))?;

        debug!(hash = %prepared.hash, inserted = result.rows_affected() > 0, "policy stored");
        Ok(prepared.hash)
    }

    async fn remove(&self, hash: &PolicyHash) -> StoreResult<bool> {
        let result = sqlx::query("DELETE FROM dataspace_policies WHERE policy_hash = $1")
            .bind(hash.as_str())
            .execute(&self.pool)
            .await
            .map_err(|e| backend("delete policy", e))?;
        Ok(result.rows_affected() > 0)
    }

    async fn get(&self, hash: &PolicyHash) -> StoreResult<Option<Value>> {
        let row = sqlx::query("SELECT body FROM dataspace_policies WHERE policy_hash = $1")
            .bind(hash.as_str())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| backend("load policy", e))?;

        let Some(row) = row else {
            return Ok(None);
        };
        let raw: String = row.try_get("body").map_err(|e| backend("decode policy row", e))?;
        serde_json::from_str(&raw)
            .map(Some)
            .map_err(|e| StoreError::Corrupt {
                key: hash.to_string(),
                reason: e.to_string(),
            })
    }

    async fn contains(&self, hash: &PolicyHash) -> StoreResult<bool> {
        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM dataspace_policies WHERE policy_hash = $1")
                .bind(hash.as_str())
                .fetch_one(&self.pool)
                .await
                .map_err(|e| backend("look up policy", e))?;
        Ok(count > 0)
    }

    async fn count(&self) -> StoreResult<usize> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM dataspace_policies")
            .fetch_one(&self.pool)
            .await
            .map_err(|e| backend("count policies", e))?;
        row_count(count)
    }

    async fn list_hashes(&self) -> StoreResult<Vec<PolicyHash>> {
        let raw: Vec<String> =
            sqlx::query_scalar("SELECT policy_hash FROM dataspace_policies ORDER BY policy_hash")
                .fetch_all(&self.pool)
                .await
                .map_err(|e| backend("list policies", e))?;
        raw.into_iter()
            .map(|h| {
                PolicyHash::parse(&h).map_err(|e| StoreError::Corrupt {
                    key: h.clone(),
                    reason: e.to_string(),
                })
            })
            .collect()
    }

    async fn clear(&self) -> StoreResult<usize> {
        let result = sqlx::query("DELETE FROM dataspace_policies")
            .execute(&self.pool)
            .await
            .map_err(|e| backend("clear policies", e))?;
        Ok(result.rows_affected() as usize)
    }
}

fn row_count(count: i64) -> StoreResult<usize> {
    usize::try_from(count).map_err(|e| StoreError::Corrupt {
        key: "dataspace_policies".to_string(),
        reason: format!("row count {count}: {e}"),
    })
}

fn backend(action: &str, err: sqlx::Error) -> StoreError {
    StoreError::Unavailable(format!("failed to {action}: {err}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    async fn sqlite_store() -> DatabasePolicyStore {
        DatabasePolicyStore::connect_with_options("sqlite::memory:", 1, 5)
            .await
            .unwrap()
    }

    fn policy(purpose: &str) -> Value {
        json!({
            "odrl:permission": [{
                "odrl:action": {"@id": "odrl:use"},
                "odrl:constraint": {"odrl:and": [
                    {"odrl:leftOperand": "cx-policy:FrameworkAgreement", "odrl:operator": "odrl:eq", "odrl:rightOperand": "DataExchangeGovernance:1.0"},
                    {"odrl:leftOperand": "cx-policy:UsagePurpose", "odrl:operator": "odrl:eq", "odrl:rightOperand": purpose}
                ]}
            }]
        })
    }

    #[tokio::test]
    async fn round_trips_policies() {
        let store = sqlite_store().await;
        let hash = store.add(&policy("a")).await.unwrap();
        assert_eq!(store.add(&policy("a")).await.unwrap(), hash);
        assert_eq!(store.count().await.unwrap(), 1);
        assert!(store.contains(&hash).await.unwrap());
        assert_eq!(store.get(&hash).await.unwrap().unwrap(), policy("a"));
    }

    #[tokio::test]
    async fn remove_and_clear() {
        let store = sqlite_store().await;
        let a = store.add(&policy("a")).await.unwrap();
        store.add(&policy("b")).await.unwrap();
        store.add(&policy("c")).await.unwrap();

        assert!(store.remove(&a).await.unwrap());
        assert!(!store.remove(&a).await.unwrap());
        assert_eq!(store.list_hashes().await.unwrap().len(), 2);
        assert_eq!(store.clear().await.unwrap(), 2);
        assert_eq!(store.count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn hashes_come_back_sorted() {
        let store = sqlite_store().await;
        for purpose in ["x", "y", "z", "w"] {
            store.add(&policy(purpose)).await.unwrap();
        }
        let hashes = store.list_hashes().await.unwrap();
        let mut sorted = hashes.clone();
        sorted.sort();
        assert_eq!(hashes, sorted);
    }

    #[test]
    fn negative_row_count_is_corrupt() {
        assert_eq!(row_count(3).unwrap(), 3);
        assert!(matches!(
            row_count(-1),
            Err(StoreError::Corrupt { ref key, .. }) if key == "dataspace_policies"
        ));
    }

    #[tokio::test]
    async fn unreachable_database_is_unavailable() {
        let err = match DatabasePolicyStore::connect_with_options(
            "postgres://nobody@127.0.0.1:1/none",
            1,
            1,
        )
        .await
        {
            Ok(_) => panic!("connection to a closed port succeeded"),
            Err(e) => e,
        };
        assert!(err.is_unavailable());
    }
}

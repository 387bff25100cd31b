//! Governance configuration

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Which policy store backs the engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(tag = "mode", rename_all = "lowercase")]
pub enum GovernanceConfig {
    /// Process-lifetime registrations
    #[default]
    Memory,

    /// One JSON file per policy
    Filesystem {
        #[serde(default = "default_policy_dir")]
        path: PathBuf,
    },

    /// SQL database (PostgreSQL or SQLite)
    Database(DatabaseStoreConfig),

    /// Memory cache over a persistent store
    Hybrid {
        #[serde(default)]
        backing: BackingStoreConfig,
    },
}

/// Persistent store behind the hybrid cache.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum BackingStoreConfig {
    Filesystem {
        #[serde(default = "default_policy_dir")]
        path: PathBuf,
    },
    Database(DatabaseStoreConfig),
}

impl Default for BackingStoreConfig {
    fn default() -> Self {
        BackingStoreConfig::Filesystem {
            path: default_policy_dir(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatabaseStoreConfig {
    /// Connection URL, e.g. `postgres://...` or `sqlite://policies.db`
    pub url: String,

    #[serde(default = "default_pool_size")]
    pub max_connections: u32,

    #[serde(default = "default_connection_timeout")]
    pub connect_timeout_secs: u64,
}

fn default_policy_dir() -> PathBuf {
    PathBuf::from("policies")
}

fn default_pool_size() -> u32 {
    10
}

fn default_connection_timeout() -> u64 {
    5
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn default_is_memory() {
        let config: GovernanceConfig = serde_json::from_value(json!({"mode": "memory"})).unwrap();
        assert_eq!(config, GovernanceConfig::default());
    }

    #[test]
    fn database_fields_default() {
        let config: GovernanceConfig =
            serde_json::from_value(json!({"mode": "database", "url": "sqlite::memory:"})).unwrap();
        assert_eq!(
            config,
            GovernanceConfig::Database(DatabaseStoreConfig {
                url: "sqlite::memory:".to_string(),
                max_connections: 10,
                connect_timeout_secs: 5,
            })
        );
    }

    #[test]
    fn hybrid_backing_defaults_to_filesystem() {
        let config: GovernanceConfig = serde_json::from_value(json!({"mode": "hybrid"})).unwrap();
        assert_eq!(
            config,
            GovernanceConfig::Hybrid {
                backing: BackingStoreConfig::Filesystem {
                    path: PathBuf::from("policies")
                }
            }
        );

        let config: GovernanceConfig = serde_json::from_value(json!({
            "mode": "hybrid",
            "backing": {"type": "database", "url": "postgres://localhost/policies"}
        }))
        .unwrap();
        assert!(matches!(
            config,
            GovernanceConfig::Hybrid { backing: BackingStoreConfig::Database(_) }
        ));
    }

    #[test]
    fn unknown_mode_is_rejected() {
        let result: Result<GovernanceConfig, _> = serde_json::from_value(json!({"mode": "redis"}));
        assert!(result.is_err());
    }
}

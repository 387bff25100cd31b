//! Orchestrator configuration

use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::{OrchestratorError, OrchestratorResult};

/// Polling cadence, deadlines and transfer defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrchestratorConfig {
    /// Wait between two polls of the same resource
    #[serde(default = "default_poll_interval")]
    pub poll_interval_ms: u64,

    /// Budget from negotiation submission to FINALIZED
    #[serde(default = "default_deadline")]
    pub negotiation_deadline_secs: u64,

    /// Budget from transfer submission to a ready EDR
    #[serde(default = "default_deadline")]
    pub transfer_deadline_secs: u64,

    /// Upper bound for a single gateway call; must be shorter than the poll interval
    #[serde(default = "default_request_timeout")]
    pub request_timeout_ms: u64,

    /// Upper bound for a catalog request; catalogs are larger than status polls
    #[serde(default = "default_catalog_timeout")]
    pub catalog_timeout_secs: u64,

    #[serde(default = "default_transfer_type")]
    pub transfer_type: String,

    #[serde(default = "default_data_destination")]
    pub data_destination: Value,

    /// Ask the connector to terminate resources after a timeout or cancellation
    #[serde(default = "default_true")]
    pub terminate_on_abort: bool,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_poll_interval(),
            negotiation_deadline_secs: default_deadline(),
            transfer_deadline_secs: default_deadline(),
            request_timeout_ms: default_request_timeout(),
            catalog_timeout_secs: default_catalog_timeout(),
            transfer_type: default_transfer_type(),
            data_destination: default_data_destination(),
            terminate_on_abort: true,
        }
    }
}

impl OrchestratorConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn negotiation_deadline(&self) -> Duration {
        Duration::from_secs(self.negotiation_deadline_secs)
    }

    pub fn transfer_deadline(&self) -> Duration {
        Duration::from_secs(self.transfer_deadline_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn catalog_timeout(&self) -> Duration {
        Duration::from_secs(self.catalog_timeout_secs)
    }

    pub fn validate(&self) -> OrchestratorResult<()> {
        if self.poll_interval_ms == 0 {
            return Err(OrchestratorError::InvalidConfig(
                "poll interval must be positive".to_string(),
            ));
        }
        if self.request_timeout_ms == 0 || self.request_timeout_ms >= self.poll_interval_ms {
            return Err(OrchestratorError::InvalidConfig(format!(
                "request timeout ({}ms) must be positive and shorter than the poll interval ({}ms)",
                self.request_timeout_ms, self.poll_interval_ms
            )));
        }
        if self.negotiation_deadline_secs == 0 || self.transfer_deadline_secs == 0 {
            return Err(OrchestratorError::InvalidConfig(
                "deadlines must be positive".to_string(),
            ));
        }
        if self.catalog_timeout_secs == 0 {
            return Err(OrchestratorError::InvalidConfig(
                "catalog timeout must be positive".to_string(),
            ));
        }
        if self.transfer_type.trim().is_empty() {
            return Err(OrchestratorError::InvalidConfig(
                "transfer type must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}

fn default_poll_interval() -> u64 {
    2_000
}

fn default_deadline() -> u64 {
    60
}

fn default_request_timeout() -> u64 {
    1_500
}

fn default_catalog_timeout() -> u64 {
    30
}

fn default_transfer_type() -> String {
    "HttpData-PULL".to_string()
}

fn default_data_destination() -> Value {
    json!({"type": "HttpProxy"})
}

fn default_true() -> bool {
    true
}

//! Configuration for dsconsumer

use dataspace_connector::ConnectorConfig;
use dataspace_governance::GovernanceConfig;
use dataspace_orchestrator::OrchestratorConfig;
use serde::{Deserialize, Serialize};

/// Environment variables use this prefix, e.g.
/// `DATASPACE_CONNECTOR__BASE_URL` or `DATASPACE_GOVERNANCE__MODE`.
pub const ENV_PREFIX: &str = "DATASPACE";

/// Main consumer configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConsumerConfig {
    /// Which store holds accepted policies
    #[serde(default)]
    pub governance: GovernanceConfig,

    /// Management API of the local connector
    #[serde(default)]
    pub connector: ConnectorConfig,

    /// Polling cadence and deadlines
    #[serde(default)]
    pub orchestrator: OrchestratorConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Filter directive used when `RUST_LOG` is unset
    #[serde(default = "default_log_level")]
    pub level: String,

    /// JSON format
    #[serde(default)]
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

impl ConsumerConfig {
    /// Load configuration: defaults, then the optional file, then the
    /// process environment.
    pub fn load(path: Option<&str>) -> Result<Self, config::ConfigError> {
        Self::load_with(path, environment())
    }

    fn load_with(
        path: Option<&str>,
        env: config::Environment,
    ) -> Result<Self, config::ConfigError> {
        let mut builder = config::Config::builder();

        builder = builder.add_source(config::Config::try_from(&ConsumerConfig::default())?);

        if let Some(path) = path {
            builder = builder.add_source(config::File::with_name(path).required(true));
        }

        builder = builder.add_source(env);

        builder.build()?.try_deserialize()
    }
}

fn environment() -> config::Environment {
    config::Environment::with_prefix(ENV_PREFIX)
        .prefix_separator("_")
        .separator("__")
        .try_parsing(true)
}

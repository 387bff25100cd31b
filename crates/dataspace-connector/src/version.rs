//! Supported connector releases.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::GatewayError;

const EDC_VOCAB: &str = "https://w3id.org/edc/v0.0.1/ns/";
const ODRL_VOCAB: &str = "http://www.w3.org/ns/odrl/2/";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ConnectorVersion {
    /// Connectors speaking the unversioned dataspace protocol
    Jupiter,
    /// Connectors speaking dataspace protocol 2025-1
    #[default]
    Saturn,
}

impl ConnectorVersion {
    pub const SUPPORTED: [ConnectorVersion; 2] = [ConnectorVersion::Jupiter, ConnectorVersion::Saturn];

    pub fn as_str(&self) -> &'static str {
        match self {
            ConnectorVersion::Jupiter => "jupiter",
            ConnectorVersion::Saturn => "saturn",
        }
    }

    /// Dataspace protocol identifier sent with negotiation, transfer and
    /// catalog requests.
    pub fn protocol(&self) -> &'static str {
        match self {
            ConnectorVersion::Jupiter => "dataspace-protocol-http",
            ConnectorVersion::Saturn => "dataspace-protocol-http:2025-1",
        }
    }

    /// JSON-LD `@context` for management API request bodies.
    pub fn context(&self) -> Value {
        match self {
            ConnectorVersion::Jupiter => json!({
                "@vocab": EDC_VOCAB,
                "odrl": ODRL_VOCAB
            }),
            ConnectorVersion::Saturn => json!([
                "https://w3id.org/catenax/2025/9/policy/odrl.jsonld",
                "https://w3id.org/catenax/2025/9/policy/context.jsonld",
                {"@vocab": EDC_VOCAB}
            ]),
        }
    }

    /// `@type` of the offer embedded in a contract request.
    pub fn offer_type(&self) -> &'static str {
        match self {
            ConnectorVersion::Jupiter => "odrl:Offer",
            ConnectorVersion::Saturn => "Offer",
        }
    }
}

impl fmt::Display for ConnectorVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ConnectorVersion {
    type Err = GatewayError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::SUPPORTED
            .into_iter()
            .find(|v| v.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| {
                GatewayError::InvalidConfig(format!(
                    "unsupported connector version {s:?}; supported: jupiter, saturn"
                ))
            })
    }
}

//! Management API resources as the consumer sees them.
//!
//! Connector responses are JSON-LD and may be compacted against the EDC
//! vocabulary or not, so every field is looked up as `key`, `edc:key` and the
//! full vocabulary IRI.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::{GatewayError, GatewayResult};

const EDC_NAMESPACE: &str = "https://w3id.org/edc/v0.0.1/ns/";

/// Identifier the connector assigned to a negotiation or transfer.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResourceId(String);

impl ResourceId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ResourceId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResourceKind {
    Negotiation,
    Transfer,
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResourceKind::Negotiation => f.write_str("negotiation"),
            ResourceKind::Transfer => f.write_str("transfer"),
        }
    }
}

/// A remote resource that can be terminated.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ResourceRef {
    pub kind: ResourceKind,
    pub id: ResourceId,
}

impl ResourceRef {
    pub fn negotiation(id: ResourceId) -> Self {
        Self {
            kind: ResourceKind::Negotiation,
            id,
        }
    }

    pub fn transfer(id: ResourceId) -> Self {
        Self {
            kind: ResourceKind::Transfer,
            id,
        }
    }
}

impl fmt::Display for ResourceRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.kind, self.id)
    }
}

/// Remote state enum with a catch-all for states this client does not know.
macro_rules! remote_state {
    ($(#[$meta:meta])* $name:ident { $($variant:ident => $wire:literal),+ $(,)? }) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(from = "String", into = "String")]
        pub enum $name {
            $($variant,)+
            Unknown(String),
        }

        impl $name {
            pub fn as_str(&self) -> &str {
                match self {
                    $($name::$variant => $wire,)+
                    $name::Unknown(raw) => raw,
                }
            }
        }

        impl From<String> for $name {
            fn from(raw: String) -> Self {
                let bare = raw
                    .strip_prefix(EDC_NAMESPACE)
                    .or_else(|| raw.strip_prefix("edc:"))
                    .unwrap_or(&raw);
                match bare.to_ascii_uppercase().as_str() {
                    $($wire => $name::$variant,)+
                    _ => $name::Unknown(raw),
                }
            }
        }

        impl From<&str> for $name {
            fn from(raw: &str) -> Self {
                Self::from(raw.to_string())
            }
        }

        impl From<$name> for String {
            fn from(state: $name) -> Self {
                state.as_str().to_string()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }
    };
}

remote_state!(
    /// Contract negotiation state as reported by the connector.
    NegotiationState {
        Initial => "INITIAL",
        Requesting => "REQUESTING",
        Requested => "REQUESTED",
        Offering => "OFFERING",
        Offered => "OFFERED",
        Accepting => "ACCEPTING",
        Accepted => "ACCEPTED",
        Agreeing => "AGREEING",
        Agreed => "AGREED",
        Verifying => "VERIFYING",
        Verified => "VERIFIED",
        Finalizing => "FINALIZING",
        Finalized => "FINALIZED",
        Terminating => "TERMINATING",
        Terminated => "TERMINATED",
    }
);

remote_state!(
    /// Transfer process state as reported by the connector.
    TransferState {
        Initial => "INITIAL",
        Provisioning => "PROVISIONING",
        Provisioned => "PROVISIONED",
        Requesting => "REQUESTING",
        Requested => "REQUESTED",
        Starting => "STARTING",
        Started => "STARTED",
        Suspending => "SUSPENDING",
        Suspended => "SUSPENDED",
        Resuming => "RESUMING",
        Completing => "COMPLETING",
        Completed => "COMPLETED",
        Terminating => "TERMINATING",
        Terminated => "TERMINATED",
        Deprovisioning => "DEPROVISIONING",
        Deprovisioned => "DEPROVISIONED",
    }
);

impl NegotiationState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, NegotiationState::Finalized | NegotiationState::Terminated)
    }
}

impl TransferState {
    /// Data is flowing (or has flowed), so an EDR can be issued.
    pub fn is_running(&self) -> bool {
        matches!(self, TransferState::Started | TransferState::Completed)
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, TransferState::Terminated)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Negotiation {
    pub id: ResourceId,
    pub state: NegotiationState,
    pub offer_id: Option<String>,
    pub asset_id: Option<String>,
    pub provider_id: Option<String>,
    pub contract_agreement_id: Option<String>,
    pub error_detail: Option<String>,
}

impl Negotiation {
    pub fn new(id: impl Into<ResourceId>, state: NegotiationState) -> Self {
        Self {
            id: id.into(),
            state,
            offer_id: None,
            asset_id: None,
            provider_id: None,
            contract_agreement_id: None,
            error_detail: None,
        }
    }

    pub fn with_agreement(mut self, agreement_id: impl Into<String>) -> Self {
        self.contract_agreement_id = Some(agreement_id.into());
        self
    }

    pub fn from_json(value: &Value) -> GatewayResult<Self> {
        let map = object(value, "negotiation")?;
        Ok(Self {
            id: ResourceId(required_id(map, "negotiation")?),
            state: NegotiationState::from(required_str(map, "state", "negotiation")?),
            offer_id: optional_str(map, "offerId"),
            asset_id: optional_str(map, "assetId"),
            provider_id: optional_str(map, "counterPartyId"),
            contract_agreement_id: optional_str(map, "contractAgreementId"),
            error_detail: optional_str(map, "errorDetail"),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Transfer {
    pub id: ResourceId,
    pub state: TransferState,
    pub contract_id: Option<String>,
    pub error_detail: Option<String>,
}

impl Transfer {
    pub fn new(id: impl Into<ResourceId>, state: TransferState) -> Self {
        Self {
            id: id.into(),
            state,
            contract_id: None,
            error_detail: None,
        }
    }

    pub fn from_json(value: &Value) -> GatewayResult<Self> {
        let map = object(value, "transfer process")?;
        Ok(Self {
            id: ResourceId(required_id(map, "transfer process")?),
            state: TransferState::from(required_str(map, "state", "transfer process")?),
            contract_id: optional_str(map, "contractId"),
            error_detail: optional_str(map, "errorDetail"),
        })
    }
}

/// Endpoint data reference: where to fetch the data and the token to present.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Edr {
    pub endpoint: String,
    pub authorization: String,
    pub issued_for: ResourceId,
}

impl Edr {
    pub fn from_json(value: &Value, transfer_id: &ResourceId) -> GatewayResult<Self> {
        let map = object(value, "data address")?;
        Ok(Self {
            endpoint: required_str(map, "endpoint", "data address")?,
            authorization: required_str(map, "authorization", "data address")?,
            issued_for: transfer_id.clone(),
        })
    }
}

impl fmt::Debug for Edr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Edr")
            .field("endpoint", &self.endpoint)
            .field("authorization", &"<redacted>")
            .field("issued_for", &self.issued_for)
            .finish()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CredentialLookup {
    Ready(Edr),
    /// The transfer has no EDR yet.
    NotReady,
}

/// Request to negotiate one offer with a provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NegotiationRequest {
    pub counter_party_address: String,
    pub provider_id: String,
    pub asset_id: String,
    pub offer_id: String,
    /// The offered policy, accepted as-is.
    pub policy: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransferRequest {
    pub counter_party_address: String,
    pub contract_id: String,
    pub transfer_type: String,
    pub data_destination: Value,
}

fn object<'a>(value: &'a Value, what: &str) -> GatewayResult<&'a Map<String, Value>> {
    value
        .as_object()
        .ok_or_else(|| GatewayError::Decode(format!("{what} is not a JSON object: {value}")))
}

/// Look a field up in plain, `edc:`-prefixed and expanded form.
pub(crate) fn lookup<'a>(map: &'a Map<String, Value>, key: &str) -> Option<&'a Value> {
    map.get(key)
        .or_else(|| map.get(&format!("edc:{key}")))
        .or_else(|| map.get(&format!("{EDC_NAMESPACE}{key}")))
}

fn optional_str(map: &Map<String, Value>, key: &str) -> Option<String> {
    match lookup(map, key)? {
        Value::String(s) => Some(s.clone()),
        Value::Object(inner) => inner
            .get("@id")
            .or_else(|| inner.get("@value"))
            .and_then(Value::as_str)
            .map(str::to_string),
        _ => None,
    }
}

fn required_str(map: &Map<String, Value>, key: &str, what: &str) -> GatewayResult<String> {
    optional_str(map, key).ok_or_else(|| GatewayError::Decode(format!("{what} without {key}")))
}

pub(crate) fn required_id(map: &Map<String, Value>, what: &str) -> GatewayResult<String> {
    map.get("@id")
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| GatewayError::Decode(format!("{what} without @id")))
}

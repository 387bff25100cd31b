//! Client side of a dataspace connector's management API.
//!
//! The [`ConnectorGateway`] trait is the only seam between the consumer and
//! the remote connector. [`HttpConnectorGateway`] implements it over HTTP;
//! tests substitute scripted fakes.
//!
//! Connector releases differ in protocol identifier and JSON-LD context.
//! Supported releases are listed explicitly in [`ConnectorVersion::SUPPORTED`].

#![deny(unsafe_code)]
#![cfg_attr(feature = "strict-docs", warn(missing_docs))]
#![cfg_attr(not(feature = "strict-docs"), allow(missing_docs))]
#![warn(rust_2018_idioms)]

mod error;
pub mod gateway;
pub mod http;
pub mod model;
pub mod version;

pub use error::{GatewayError, GatewayResult};
pub use gateway::ConnectorGateway;
pub use http::{ConnectorConfig, HttpConnectorGateway};
pub use model::{
    CredentialLookup, Edr, Negotiation, NegotiationRequest, NegotiationState, ResourceId,
    ResourceKind, ResourceRef, Transfer, TransferRequest, TransferState,
};
pub use version::ConnectorVersion;

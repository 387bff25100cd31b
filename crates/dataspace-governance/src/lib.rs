//! Policy governance for a dataspace consumer.
//!
//! The [`GovernanceEngine`] answers one question before any counterparty is
//! engaged: is this offer's policy one we have registered as acceptable?
//! Policies are compared by canonical hash, so two offers that differ only in
//! identifiers, JSON-LD decoration or constraint order are the same policy.
//!
//! Three modes are available:
//! - [`GovernanceMode::Memory`]: registrations last as long as the engine
//! - [`GovernanceMode::Persistent`]: every call goes to a filesystem or
//!   database store
//! - [`GovernanceMode::Hybrid`]: an in-memory cache in front of a persistent
//!   store ([`HybridPolicyStore`])

#![deny(unsafe_code)]
#![cfg_attr(feature = "strict-docs", warn(missing_docs))]
#![cfg_attr(not(feature = "strict-docs"), allow(missing_docs))]
#![warn(rust_2018_idioms)]

pub mod config;
pub mod engine;
mod error;
pub mod hybrid;

pub use config::{BackingStoreConfig, DatabaseStoreConfig, GovernanceConfig};
pub use engine::{GovernanceDecision, GovernanceEngine, GovernanceMode};
pub use error::{GovernanceError, GovernanceResult};
pub use hybrid::HybridPolicyStore;

//! ODRL policy model and canonical hashing for dataspace governance.
//!
//! This crate turns JSON-LD policy documents into a typed rule tree and
//! derives a canonical, order-independent digest from it:
//! - constraint trees (`and`/`or` groups) flatten into sorted
//!   `(leftOperand, operator, rightOperand)` triples
//! - metadata (`@id`, `@type`, `@context`, `metadata`) never reaches the digest
//! - two policies with the same rule set always share one [`PolicyHash`]
//!
//! Catalog responses are parsed into [`Offer`]s so governance can screen them
//! before a counterparty is engaged.

#![deny(unsafe_code)]
#![cfg_attr(feature = "strict-docs", warn(missing_docs))]
#![cfg_attr(not(feature = "strict-docs"), allow(missing_docs))]
#![warn(rust_2018_idioms)]

pub mod canonical;
pub mod catalog;
pub mod constraint;
mod error;
pub mod policy;
pub mod rule;
mod vocab;

pub use canonical::{
    canonicalize_constraints, hash_constraints, CanonicalConstraint, CanonicalPolicy,
    CanonicalRule,
};
pub use catalog::{Catalog, Dataset, Offer};
pub use constraint::{AtomicConstraint, ConstraintNode, Operator};
pub use error::{PolicyError, PolicyResult};
pub use policy::{normalize_policy, policy_hash, Policy, PolicyHash, PolicyType};
pub use rule::{Rule, RuleKind, MAX_RULE_DEPTH};
pub use vocab::ODRL_NAMESPACE;

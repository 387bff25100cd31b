//! Policy persistence for dataspace governance.
//!
//! Every backend maps a canonical [`PolicyHash`] to the normalized policy
//! body it was derived from:
//! - [`MemoryPolicyStore`]: lock-guarded map, process lifetime
//! - [`FilesystemPolicyStore`]: one `<hash>.json` file per policy
//! - `DatabasePolicyStore`: one row per policy (feature `database`)
//!
//! Backends are selected at construction time and share the [`PolicyStore`]
//! trait. Persistent backends report I/O and connection failures as
//! [`StoreError::Unavailable`]; a store that cannot answer never pretends a
//! policy is invalid.
//!
//! [`PolicyHash`]: dataspace_policy::PolicyHash

#![deny(unsafe_code)]
#![cfg_attr(feature = "strict-docs", warn(missing_docs))]
#![cfg_attr(not(feature = "strict-docs"), allow(missing_docs))]
#![warn(rust_2018_idioms)]

#[cfg(feature = "database")]
pub mod database;
mod error;
pub mod filesystem;
pub mod memory;
mod traits;

#[cfg(feature = "database")]
pub use database::DatabasePolicyStore;
pub use error::{StoreError, StoreResult};
pub use filesystem::FilesystemPolicyStore;
pub use memory::MemoryPolicyStore;
pub use traits::{prepare_policy, PolicyStore, PreparedPolicy};

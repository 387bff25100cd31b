//! Contract lifecycle orchestration for a dataspace consumer.
//!
//! A [`ContractWorkflow`] drives one catalog offer through the remote
//! connector's state machines:
//!
//! ```text
//! INIT -> NEGOTIATING -> AGREEMENT_PENDING -> AGREED -> TRANSFERRING -> CREDENTIAL_READY
//!   \------------------------------------------------------------------> FAILED
//! ```
//!
//! Remote progress is observed by polling. Every poll is bounded by a
//! per-call timeout, each phase by a deadline on the injected [`Clock`], and
//! the whole workflow can be cancelled between polls through a
//! [`CancellationHandle`]. Failed, timed-out and cancelled workflows ask the
//! connector to terminate what they created.

#![deny(unsafe_code)]
#![cfg_attr(feature = "strict-docs", warn(missing_docs))]
#![cfg_attr(not(feature = "strict-docs"), allow(missing_docs))]
#![warn(rust_2018_idioms)]

pub mod cancel;
pub mod clock;
pub mod config;
mod error;
pub mod orchestrator;
pub mod workflow;

pub use cancel::{CancellationHandle, CancellationToken};
pub use clock::{Clock, ManualClock, TokioClock};
pub use config::OrchestratorConfig;
pub use error::{OrchestratorError, OrchestratorResult};
pub use orchestrator::{ContractOrchestrator, WorkflowHandle};
pub use workflow::{
    ContractTarget, ContractWorkflow, CredentialGrant, RemoteState, StateTransition,
    WorkflowOutcome, WorkflowState,
};

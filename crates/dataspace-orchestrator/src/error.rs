use std::time::Duration;

use dataspace_connector::{
    GatewayError, NegotiationState, ResourceId, ResourceKind, TransferState,
};
use dataspace_governance::GovernanceError;
use dataspace_policy::PolicyHash;
use thiserror::Error;

use crate::workflow::{RemoteState, WorkflowState};

pub type OrchestratorResult<T> = Result<T, OrchestratorError>;

/// Terminal outcome of a failed workflow.
#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error("offer {offer_id} for asset {asset_id} is not covered by a registered policy ({hash})")]
    PolicyNotAccepted {
        asset_id: String,
        offer_id: String,
        hash: PolicyHash,
    },

    #[error("governance check failed: {0}")]
    Governance(#[from] GovernanceError),

    /// The connector refused or garbled a create request. The remote state is
    /// unknown; submissions are never retried.
    #[error("{kind} submission failed: {source}")]
    SubmissionError {
        kind: ResourceKind,
        #[source]
        source: GatewayError,
        last_state: Option<RemoteState>,
    },

    #[error("negotiation {negotiation_id} finalized without a contract agreement id")]
    MissingAgreementId { negotiation_id: ResourceId },

    #[error("negotiation {negotiation_id} was terminated{}", detail_suffix(.detail))]
    NegotiationRejected {
        negotiation_id: ResourceId,
        detail: Option<String>,
    },

    #[error("negotiation {negotiation_id} not finalized after {after:?} (last state {})", state_or_none(.last_state))]
    NegotiationTimeout {
        negotiation_id: ResourceId,
        after: Duration,
        last_state: Option<NegotiationState>,
        last_error: Option<String>,
    },

    #[error("transfer {transfer_id} was terminated{}", detail_suffix(.detail))]
    TransferRejected {
        transfer_id: ResourceId,
        detail: Option<String>,
    },

    #[error("transfer {transfer_id} not started after {after:?} (last state {})", state_or_none(.last_state))]
    TransferTimeout {
        transfer_id: ResourceId,
        after: Duration,
        last_state: Option<TransferState>,
        last_error: Option<String>,
    },

    /// The transfer started but no EDR was issued before the deadline.
    #[error("no EDR for transfer {transfer_id} after {after:?}")]
    CredentialTimeout {
        transfer_id: ResourceId,
        after: Duration,
        last_state: Option<TransferState>,
        last_error: Option<String>,
    },

    #[error("workflow cancelled while {stage}")]
    Cancelled {
        stage: WorkflowState,
        last_state: Option<RemoteState>,
    },

    #[error("failed to fetch catalog: {0}")]
    Catalog(#[source] GatewayError),

    #[error("invalid orchestrator configuration: {0}")]
    InvalidConfig(String),

    #[error("workflow task failed: {0}")]
    TaskFailed(String),
}

impl OrchestratorError {
    /// Last remote state the workflow observed before failing.
    pub fn last_remote_state(&self) -> Option<RemoteState> {
        match self {
            OrchestratorError::SubmissionError { last_state, .. }
            | OrchestratorError::Cancelled { last_state, .. } => last_state.clone(),
            OrchestratorError::MissingAgreementId { .. } => {
                Some(RemoteState::Negotiation(NegotiationState::Finalized))
            }
            OrchestratorError::NegotiationRejected { .. } => {
                Some(RemoteState::Negotiation(NegotiationState::Terminated))
            }
            OrchestratorError::TransferRejected { .. } => {
                Some(RemoteState::Transfer(TransferState::Terminated))
            }
            OrchestratorError::NegotiationTimeout { last_state, .. } => {
                last_state.clone().map(RemoteState::Negotiation)
            }
            OrchestratorError::TransferTimeout { last_state, .. }
            | OrchestratorError::CredentialTimeout { last_state, .. } => {
                last_state.clone().map(RemoteState::Transfer)
            }
            _ => None,
        }
    }

    pub fn is_timeout(&self) -> bool {
        matches!(
            self,
            OrchestratorError::NegotiationTimeout { .. }
                | OrchestratorError::TransferTimeout { .. }
                | OrchestratorError::CredentialTimeout { .. }
        )
    }

    pub fn is_rejection(&self) -> bool {
        matches!(
            self,
            OrchestratorError::PolicyNotAccepted { .. }
                | OrchestratorError::NegotiationRejected { .. }
                | OrchestratorError::TransferRejected { .. }
        )
    }
}

fn detail_suffix(detail: &Option<String>) -> String {
    detail.as_ref().map(|d| format!(": {d}")).unwrap_or_default()
}

fn state_or_none<S: std::fmt::Display>(state: &Option<S>) -> String {
    state
        .as_ref()
        .map(ToString::to_string)
        .unwrap_or_else(|| "none".to_string())
}

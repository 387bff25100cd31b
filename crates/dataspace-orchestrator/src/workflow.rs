//! One offer driven from negotiation to a usable credential.

use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use dataspace_connector::{
    ConnectorGateway, CredentialLookup, Edr, GatewayError, GatewayResult, NegotiationRequest,
    NegotiationState, ResourceId, ResourceKind, ResourceRef, TransferRequest, TransferState,
};
use dataspace_governance::{GovernanceDecision, GovernanceEngine};
use dataspace_policy::Offer;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::cancel::CancellationToken;
use crate::clock::Clock;
use crate::config::OrchestratorConfig;
use crate::{OrchestratorError, OrchestratorResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WorkflowState {
    Init,
    Negotiating,
    AgreementPending,
    Agreed,
    Transferring,
    CredentialReady,
    Failed,
}

impl WorkflowState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, WorkflowState::CredentialReady | WorkflowState::Failed)
    }
}

impl fmt::Display for WorkflowState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            WorkflowState::Init => "INIT",
            WorkflowState::Negotiating => "NEGOTIATING",
            WorkflowState::AgreementPending => "AGREEMENT_PENDING",
            WorkflowState::Agreed => "AGREED",
            WorkflowState::Transferring => "TRANSFERRING",
            WorkflowState::CredentialReady => "CREDENTIAL_READY",
            WorkflowState::Failed => "FAILED",
        };
        f.write_str(name)
    }
}

/// State of the remote resource a workflow last observed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "resource", content = "state", rename_all = "lowercase")]
pub enum RemoteState {
    Negotiation(NegotiationState),
    Transfer(TransferState),
}

impl fmt::Display for RemoteState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RemoteState::Negotiation(s) => write!(f, "negotiation {s}"),
            RemoteState::Transfer(s) => write!(f, "transfer {s}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateTransition {
    pub from: WorkflowState,
    pub to: WorkflowState,
    pub at: DateTime<Utc>,
}

/// Offer to pursue, and where its provider lives.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContractTarget {
    pub provider_id: String,
    pub counter_party_address: String,
    pub offer: Offer,
}

impl ContractTarget {
    pub fn new(
        provider_id: impl Into<String>,
        counter_party_address: impl Into<String>,
        offer: Offer,
    ) -> Self {
        Self {
            provider_id: provider_id.into(),
            counter_party_address: counter_party_address.into(),
            offer,
        }
    }
}

/// Access to the provider's data plane under a finalized agreement.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CredentialGrant {
    pub endpoint: String,
    pub authorization: String,
    pub transfer_id: ResourceId,
    pub agreement_id: String,
    pub negotiation_id: ResourceId,
}

impl CredentialGrant {
    fn from_edr(edr: Edr, agreement_id: String, negotiation_id: ResourceId) -> Self {
        Self {
            endpoint: edr.endpoint,
            authorization: edr.authorization,
            transfer_id: edr.issued_for,
            agreement_id,
            negotiation_id,
        }
    }
}

impl fmt::Debug for CredentialGrant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CredentialGrant")
            .field("endpoint", &self.endpoint)
            .field("authorization", &"<redacted>")
            .field("transfer_id", &self.transfer_id)
            .field("agreement_id", &self.agreement_id)
            .field("negotiation_id", &self.negotiation_id)
            .finish()
    }
}

/// Result of a finished workflow together with its provenance.
#[derive(Debug)]
pub struct WorkflowOutcome {
    pub workflow_id: Uuid,
    pub result: OrchestratorResult<CredentialGrant>,
    pub history: Vec<StateTransition>,
    pub negotiation_id: Option<ResourceId>,
    pub transfer_id: Option<ResourceId>,
}

impl WorkflowOutcome {
    pub fn final_state(&self) -> WorkflowState {
        self.history
            .last()
            .map(|t| t.to)
            .unwrap_or(WorkflowState::Init)
    }
}

enum Wait {
    Elapsed,
    Cancelled,
}

/// State machine for a single offer. Built by
/// [`ContractOrchestrator::workflow`](crate::ContractOrchestrator::workflow)
/// and consumed by [`ContractWorkflow::run`].
pub struct ContractWorkflow {
    id: Uuid,
    target: ContractTarget,
    gateway: Arc<dyn ConnectorGateway>,
    governance: Option<Arc<GovernanceEngine>>,
    clock: Arc<dyn Clock>,
    config: OrchestratorConfig,
    state: WorkflowState,
    history: Vec<StateTransition>,
    negotiation_id: Option<ResourceId>,
    transfer_id: Option<ResourceId>,
    last_remote: Option<RemoteState>,
}

impl ContractWorkflow {
    pub(crate) fn new(
        target: ContractTarget,
        gateway: Arc<dyn ConnectorGateway>,
        governance: Option<Arc<GovernanceEngine>>,
        clock: Arc<dyn Clock>,
        config: OrchestratorConfig,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            target,
            gateway,
            governance,
            clock,
            config,
            state: WorkflowState::Init,
            history: Vec::new(),
            negotiation_id: None,
            transfer_id: None,
            last_remote: None,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn state(&self) -> WorkflowState {
        self.state
    }

    pub fn target(&self) -> &ContractTarget {
        &self.target
    }

    /// Drive the offer to a credential or a terminal error.
    #[instrument(
        name = "contract_workflow",
        skip_all,
        fields(
            workflow_id = %self.id,
            asset_id = %self.target.offer.asset_id,
            offer_id = %self.target.offer.offer_id,
        )
    )]
    pub async fn run(mut self, mut cancel: CancellationToken) -> WorkflowOutcome {
        let result = self.drive(&mut cancel).await;
        match &result {
            Ok(grant) => info!(
                transfer_id = %grant.transfer_id,
                agreement_id = %grant.agreement_id,
                "credential ready"
            ),
            Err(e) => {
                warn!(error = %e, stage = %self.state, "workflow failed");
                self.transition(WorkflowState::Failed);
            }
        }
        WorkflowOutcome {
            workflow_id: self.id,
            result,
            history: self.history,
            negotiation_id: self.negotiation_id,
            transfer_id: self.transfer_id,
        }
    }

    async fn drive(&mut self, cancel: &mut CancellationToken) -> OrchestratorResult<CredentialGrant> {
        if cancel.is_cancelled() {
            return Err(self.cancelled().await);
        }
        self.check_governance().await?;

        let submitted = self.clock.now();
        let negotiation_id = self.submit_negotiation().await?;
        self.transition(WorkflowState::AgreementPending);
        let agreement_id = self.await_agreement(&negotiation_id, submitted, cancel).await?;
        self.transition(WorkflowState::Agreed);

        if cancel.is_cancelled() {
            return Err(self.cancelled().await);
        }
        let submitted = self.clock.now();
        let transfer_id = self.submit_transfer(&agreement_id).await?;
        let edr = self.await_credential(&transfer_id, submitted, cancel).await?;
        self.transition(WorkflowState::CredentialReady);

        Ok(CredentialGrant::from_edr(edr, agreement_id, negotiation_id))
    }

    async fn check_governance(&self) -> OrchestratorResult<()> {
        let Some(governance) = &self.governance else {
            return Ok(());
        };
        match governance.evaluate_offer(&self.target.offer).await? {
            GovernanceDecision::Accepted { hash } => {
                debug!(hash = %hash, "offer policy accepted");
                Ok(())
            }
            GovernanceDecision::Rejected { hash } => Err(OrchestratorError::PolicyNotAccepted {
                asset_id: self.target.offer.asset_id.clone(),
                offer_id: self.target.offer.offer_id.clone(),
                hash,
            }),
        }
    }

    async fn submit_negotiation(&mut self) -> OrchestratorResult<ResourceId> {
        let request = NegotiationRequest {
            counter_party_address: self.target.counter_party_address.clone(),
            provider_id: self.target.provider_id.clone(),
            asset_id: self.target.offer.asset_id.clone(),
            offer_id: self.target.offer.offer_id.clone(),
            policy: self.target.offer.policy.clone(),
        };
        let gateway = self.gateway.clone();
        let id = self
            .timed("submit negotiation", gateway.submit_negotiation(&request))
            .await
            .map_err(|source| OrchestratorError::SubmissionError {
                kind: ResourceKind::Negotiation,
                source,
                last_state: None,
            })?;

        info!(negotiation_id = %id, "negotiation submitted");
        self.negotiation_id = Some(id.clone());
        self.transition(WorkflowState::Negotiating);
        Ok(id)
    }

    async fn await_agreement(
        &mut self,
        negotiation_id: &ResourceId,
        started: Instant,
        cancel: &mut CancellationToken,
    ) -> OrchestratorResult<String> {
        let deadline = started + self.config.negotiation_deadline();
        let gateway = self.gateway.clone();
        let mut last_state: Option<NegotiationState> = None;
        let mut last_error: Option<String> = None;

        loop {
            if cancel.is_cancelled() {
                return Err(self.cancelled().await);
            }

            let budget = self.call_budget(deadline);
            if budget.is_zero() {
                return Err(self.negotiation_timeout(negotiation_id, started, last_state, last_error).await);
            }
            match self
                .timed_for("poll negotiation", budget, gateway.get_negotiation(negotiation_id))
                .await
            {
                Ok(negotiation) => {
                    if last_state.as_ref() != Some(&negotiation.state) {
                        debug!(negotiation_id = %negotiation_id, state = %negotiation.state, "negotiation state");
                    }
                    last_state = Some(negotiation.state.clone());
                    self.last_remote = Some(RemoteState::Negotiation(negotiation.state.clone()));

                    match negotiation.state {
                        NegotiationState::Finalized => {
                            return match negotiation.contract_agreement_id {
                                Some(agreement) if !agreement.is_empty() => {
                                    info!(negotiation_id = %negotiation_id, agreement_id = %agreement, "agreement reached");
                                    Ok(agreement)
                                }
                                _ => Err(OrchestratorError::MissingAgreementId {
                                    negotiation_id: negotiation_id.clone(),
                                }),
                            };
                        }
                        NegotiationState::Terminated => {
                            return Err(OrchestratorError::NegotiationRejected {
                                negotiation_id: negotiation_id.clone(),
                                detail: negotiation.error_detail,
                            });
                        }
                        _ => {}
                    }
                }
                Err(e) => {
                    warn!(negotiation_id = %negotiation_id, error = %e, "negotiation poll failed");
                    last_error = Some(e.to_string());
                }
            }

            if self.clock.now() >= deadline {
                return Err(self.negotiation_timeout(negotiation_id, started, last_state, last_error).await);
            }

            if let Wait::Cancelled = self.wait(deadline, cancel).await {
                return Err(self.cancelled().await);
            }
        }
    }

    async fn submit_transfer(&mut self, agreement_id: &str) -> OrchestratorResult<ResourceId> {
        let request = TransferRequest {
            counter_party_address: self.target.counter_party_address.clone(),
            contract_id: agreement_id.to_string(),
            transfer_type: self.config.transfer_type.clone(),
            data_destination: self.config.data_destination.clone(),
        };
        let gateway = self.gateway.clone();
        let id = match self.timed("submit transfer", gateway.submit_transfer(&request)).await {
            Ok(id) => id,
            Err(source) => {
                return Err(OrchestratorError::SubmissionError {
                    kind: ResourceKind::Transfer,
                    source,
                    last_state: self.last_remote.clone(),
                })
            }
        };

        info!(transfer_id = %id, agreement_id = %agreement_id, "transfer submitted");
        self.transfer_id = Some(id.clone());
        self.transition(WorkflowState::Transferring);
        Ok(id)
    }

    async fn await_credential(
        &mut self,
        transfer_id: &ResourceId,
        started: Instant,
        cancel: &mut CancellationToken,
    ) -> OrchestratorResult<Edr> {
        let deadline = started + self.config.transfer_deadline();
        let gateway = self.gateway.clone();
        let mut last_state: Option<TransferState> = None;
        let mut last_error: Option<String> = None;
        let mut seen_running = false;

        loop {
            if cancel.is_cancelled() {
                return Err(self.cancelled().await);
            }

            let budget = self.call_budget(deadline);
            if budget.is_zero() {
                return Err(self
                    .transfer_timeout(transfer_id, started, seen_running, last_state, last_error)
                    .await);
            }
            match self
                .timed_for("poll transfer", budget, gateway.get_transfer(transfer_id))
                .await
            {
                Ok(transfer) => {
                    if last_state.as_ref() != Some(&transfer.state) {
                        debug!(transfer_id = %transfer_id, state = %transfer.state, "transfer state");
                    }
                    last_state = Some(transfer.state.clone());
                    self.last_remote = Some(RemoteState::Transfer(transfer.state.clone()));

                    if transfer.state.is_failed() {
                        return Err(OrchestratorError::TransferRejected {
                            transfer_id: transfer_id.clone(),
                            detail: transfer.error_detail,
                        });
                    }
                    if transfer.state.is_running() {
                        seen_running = true;
                        let budget = self.call_budget(deadline);
                        match self
                            .timed_for("fetch EDR", budget, gateway.get_credential(transfer_id))
                            .await
                        {
                            Ok(CredentialLookup::Ready(edr)) => return Ok(edr),
                            Ok(CredentialLookup::NotReady) => {
                                debug!(transfer_id = %transfer_id, "EDR not issued yet");
                            }
                            Err(e) => {
                                warn!(transfer_id = %transfer_id, error = %e, "EDR lookup failed");
                                last_error = Some(e.to_string());
                            }
                        }
                    }
                }
                Err(e) => {
                    warn!(transfer_id = %transfer_id, error = %e, "transfer poll failed");
                    last_error = Some(e.to_string());
                }
            }

            if self.clock.now() >= deadline {
                return Err(self
                    .transfer_timeout(transfer_id, started, seen_running, last_state, last_error)
                    .await);
            }

            if let Wait::Cancelled = self.wait(deadline, cancel).await {
                return Err(self.cancelled().await);
            }
        }
    }

    async fn negotiation_timeout(
        &self,
        negotiation_id: &ResourceId,
        started: Instant,
        last_state: Option<NegotiationState>,
        last_error: Option<String>,
    ) -> OrchestratorError {
        let after = self.clock.now().saturating_duration_since(started);
        self.terminate(ResourceRef::negotiation(negotiation_id.clone()), "negotiation deadline exceeded")
            .await;
        OrchestratorError::NegotiationTimeout {
            negotiation_id: negotiation_id.clone(),
            after,
            last_state,
            last_error,
        }
    }

    async fn transfer_timeout(
        &self,
        transfer_id: &ResourceId,
        started: Instant,
        seen_running: bool,
        last_state: Option<TransferState>,
        last_error: Option<String>,
    ) -> OrchestratorError {
        let after = self.clock.now().saturating_duration_since(started);
        self.terminate(ResourceRef::transfer(transfer_id.clone()), "transfer deadline exceeded")
            .await;
        let transfer_id = transfer_id.clone();
        if seen_running {
            OrchestratorError::CredentialTimeout {
                transfer_id,
                after,
                last_state,
                last_error,
            }
        } else {
            OrchestratorError::TransferTimeout {
                transfer_id,
                after,
                last_state,
                last_error,
            }
        }
    }

    /// Per-call timeout, never reaching past `deadline`.
    fn call_budget(&self, deadline: Instant) -> Duration {
        let remaining = deadline.saturating_duration_since(self.clock.now());
        self.config.request_timeout().min(remaining)
    }

    /// Sleep one poll interval, cut short at `deadline` or by cancellation.
    async fn wait(&self, deadline: Instant, cancel: &mut CancellationToken) -> Wait {
        let pause = self
            .config
            .poll_interval()
            .min(deadline.saturating_duration_since(self.clock.now()));
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Wait::Cancelled,
            _ = self.clock.sleep(pause) => Wait::Elapsed,
        }
    }

    /// Best-effort cleanup of whatever this workflow created, then the error.
    async fn cancelled(&mut self) -> OrchestratorError {
        info!(stage = %self.state, "workflow cancelled");
        if let Some(transfer_id) = self.transfer_id.clone() {
            self.terminate(ResourceRef::transfer(transfer_id), "cancelled by consumer")
                .await;
        } else if let Some(negotiation_id) = self.negotiation_id.clone() {
            let finalized = matches!(
                self.last_remote,
                Some(RemoteState::Negotiation(NegotiationState::Finalized))
            );
            if !finalized {
                self.terminate(ResourceRef::negotiation(negotiation_id), "cancelled by consumer")
                    .await;
            }
        }
        OrchestratorError::Cancelled {
            stage: self.state,
            last_state: self.last_remote.clone(),
        }
    }

    async fn terminate(&self, resource: ResourceRef, reason: &str) {
        if !self.config.terminate_on_abort {
            return;
        }
        let gateway = self.gateway.clone();
        match self.timed("terminate", gateway.terminate(&resource, reason)).await {
            Ok(()) => info!(resource = %resource, reason, "termination requested"),
            Err(e) => warn!(resource = %resource, error = %e, "termination failed"),
        }
    }

    async fn timed<T>(
        &self,
        operation: &'static str,
        call: impl Future<Output = GatewayResult<T>>,
    ) -> GatewayResult<T> {
        self.timed_for(operation, self.config.request_timeout(), call).await
    }

    async fn timed_for<T>(
        &self,
        operation: &'static str,
        after: Duration,
        call: impl Future<Output = GatewayResult<T>>,
    ) -> GatewayResult<T> {
        match tokio::time::timeout(after, call).await {
            Ok(result) => result,
            Err(_) => Err(GatewayError::Timeout { operation, after }),
        }
    }

    fn transition(&mut self, to: WorkflowState) {
        let from = self.state;
        if from == to {
            return;
        }
        self.state = to;
        self.history.push(StateTransition {
            from,
            to,
            at: self.clock.wall_clock(),
        });
        info!(from = %from, to = %to, "workflow state changed");
    }
}

//! Orchestrator: builds workflows and runs them inline or as tasks.

use std::fmt;
use std::sync::Arc;

use dataspace_connector::ConnectorGateway;
use dataspace_governance::GovernanceEngine;
use dataspace_policy::Offer;
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument};
use uuid::Uuid;

use crate::cancel::{CancellationHandle, CancellationToken};
use crate::clock::{Clock, TokioClock};
use crate::config::OrchestratorConfig;
use crate::workflow::{ContractTarget, ContractWorkflow, WorkflowOutcome};
use crate::{OrchestratorError, OrchestratorResult};

/// Entry point for contract workflows against one connector.
///
/// Holds no per-workflow state; clone freely. With a governance engine
/// attached, offers whose policy is not registered are refused before any
/// remote call.
#[derive(Clone)]
pub struct ContractOrchestrator {
    gateway: Arc<dyn ConnectorGateway>,
    governance: Option<Arc<GovernanceEngine>>,
    clock: Arc<dyn Clock>,
    config: OrchestratorConfig,
}

impl ContractOrchestrator {
    pub fn new(
        gateway: Arc<dyn ConnectorGateway>,
        config: OrchestratorConfig,
    ) -> OrchestratorResult<Self> {
        config.validate()?;
        Ok(Self {
            gateway,
            governance: None,
            clock: Arc::new(TokioClock),
            config,
        })
    }

    pub fn with_governance(mut self, governance: Arc<GovernanceEngine>) -> Self {
        self.governance = Some(governance);
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    pub fn workflow(&self, target: ContractTarget) -> ContractWorkflow {
        ContractWorkflow::new(
            target,
            self.gateway.clone(),
            self.governance.clone(),
            self.clock.clone(),
            self.config.clone(),
        )
    }

    /// Run a workflow on the current task.
    pub async fn run(&self, target: ContractTarget, cancel: CancellationToken) -> WorkflowOutcome {
        self.workflow(target).run(cancel).await
    }

    /// Run a workflow on its own tokio task.
    pub fn spawn(&self, target: ContractTarget) -> WorkflowHandle {
        let cancel = CancellationHandle::new();
        let workflow = self.workflow(target);
        let id = workflow.id();
        let task = tokio::spawn(workflow.run(cancel.token()));
        debug!(workflow_id = %id, "workflow spawned");
        WorkflowHandle { id, cancel, task }
    }

    /// Offers in the provider's catalog that the governance engine accepts.
    /// Without an engine every offer is returned.
    #[instrument(skip(self))]
    pub async fn discover(
        &self,
        provider_id: &str,
        counter_party_address: &str,
    ) -> OrchestratorResult<Vec<Offer>> {
        let after = self.config.catalog_timeout();
        let catalog = tokio::time::timeout(
            after,
            self.gateway.get_catalog(provider_id, counter_party_address),
        )
        .await
        .map_err(|_| {
            OrchestratorError::Catalog(dataspace_connector::GatewayError::Timeout {
                operation: "fetch catalog",
                after,
            })
        })?
        .map_err(OrchestratorError::Catalog)?;

        let offers: Vec<Offer> = match &self.governance {
            Some(governance) => governance
                .accepted_offers(&catalog)
                .await?
                .into_iter()
                .map(|(_, offer)| offer)
                .collect(),
            None => catalog.offers().cloned().collect(),
        };
        info!(
            total = catalog.offers().count(),
            accepted = offers.len(),
            "catalog discovered"
        );
        Ok(offers)
    }
}

impl fmt::Debug for ContractOrchestrator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ContractOrchestrator")
            .field("governed", &self.governance.is_some())
            .field("clock", &self.clock)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

/// A workflow running on its own task.
pub struct WorkflowHandle {
    id: Uuid,
    cancel: CancellationHandle,
    task: JoinHandle<WorkflowOutcome>,
}

impl WorkflowHandle {
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Request cancellation; the workflow stops at its next poll boundary.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn cancellation(&self) -> CancellationHandle {
        self.cancel.clone()
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    pub async fn join(self) -> WorkflowOutcome {
        match self.task.await {
            Ok(outcome) => outcome,
            Err(e) => WorkflowOutcome {
                workflow_id: self.id,
                result: Err(OrchestratorError::TaskFailed(e.to_string())),
                history: Vec::new(),
                negotiation_id: None,
                transfer_id: None,
            },
        }
    }
}

use async_trait::async_trait;
use dataspace_policy::Catalog;

use crate::model::{
    CredentialLookup, Negotiation, NegotiationRequest, ResourceId, ResourceRef, Transfer,
    TransferRequest,
};
use crate::GatewayResult;

/// Consumer-side view of a remote connector's management API.
#[async_trait]
pub trait ConnectorGateway: Send + Sync {
    /// Start a contract negotiation. Returns the connector's negotiation id.
    async fn submit_negotiation(&self, request: &NegotiationRequest) -> GatewayResult<ResourceId>;

    async fn get_negotiation(&self, id: &ResourceId) -> GatewayResult<Negotiation>;

    /// Start a transfer process under an agreement.
    async fn submit_transfer(&self, request: &TransferRequest) -> GatewayResult<ResourceId>;

    async fn get_transfer(&self, id: &ResourceId) -> GatewayResult<Transfer>;

    /// EDR for a transfer, or [`CredentialLookup::NotReady`] while the
    /// connector has not issued one yet.
    async fn get_credential(&self, transfer_id: &ResourceId) -> GatewayResult<CredentialLookup>;

    /// Catalog a provider offers to this consumer.
    async fn get_catalog(
        &self,
        counter_party_id: &str,
        counter_party_address: &str,
    ) -> GatewayResult<Catalog>;

    /// Ask the connector to terminate a negotiation or transfer. Advisory: the
    /// connector may already have moved past a terminable state.
    async fn terminate(&self, resource: &ResourceRef, reason: &str) -> GatewayResult<()>;
}

//! HTTP gateway for the connector management API (`/v3`).

use std::time::Duration;

use async_trait::async_trait;
use dataspace_policy::Catalog;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::{Client, RequestBuilder, Response, StatusCode, Url};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{debug, instrument};

use crate::gateway::ConnectorGateway;
use crate::model::{
    required_id, CredentialLookup, Edr, Negotiation, NegotiationRequest, ResourceId,
    ResourceKind, ResourceRef, Transfer, TransferRequest,
};
use crate::version::ConnectorVersion;
use crate::{GatewayError, GatewayResult};

const NEGOTIATIONS: &[&str] = &["v3", "contractnegotiations"];
const TRANSFERS: &[&str] = &["v3", "transferprocesses"];
const CATALOG: &[&str] = &["v3", "catalog", "request"];
const EDRS: &[&str] = &["v3", "edrs"];

/// Management API connection settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectorConfig {
    /// Management API base URL, e.g. `https://consumer.example/management`
    pub base_url: String,

    #[serde(default)]
    pub api_key: Option<String>,

    #[serde(default = "default_api_key_header")]
    pub api_key_header: String,

    #[serde(default)]
    pub version: ConnectorVersion,

    /// Client-level timeout in seconds
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    /// Page size for catalog requests
    #[serde(default = "default_catalog_limit")]
    pub catalog_limit: u32,
}

impl Default for ConnectorConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8181/management".to_string(),
            api_key: None,
            api_key_header: default_api_key_header(),
            version: ConnectorVersion::default(),
            request_timeout_secs: default_request_timeout(),
            catalog_limit: default_catalog_limit(),
        }
    }
}

fn default_api_key_header() -> String {
    "X-Api-Key".to_string()
}

fn default_request_timeout() -> u64 {
    30
}

fn default_catalog_limit() -> u32 {
    100
}

/// [`ConnectorGateway`] over reqwest.
pub struct HttpConnectorGateway {
    client: Client,
    base_url: Url,
    version: ConnectorVersion,
    catalog_limit: u32,
}

impl HttpConnectorGateway {
    pub fn new(config: &ConnectorConfig) -> GatewayResult<Self> {
        let mut headers = HeaderMap::new();
        if let Some(key) = &config.api_key {
            let name = HeaderName::from_bytes(config.api_key_header.as_bytes()).map_err(|e| {
                GatewayError::InvalidConfig(format!("api key header {:?}: {e}", config.api_key_header))
            })?;
            let mut value = HeaderValue::from_str(key)
                .map_err(|e| GatewayError::InvalidConfig(format!("api key: {e}")))?;
            value.set_sensitive(true);
            headers.insert(name, value);
        }

        let base_url = Url::parse(&config.base_url)
            .map_err(|e| GatewayError::InvalidConfig(format!("base url {:?}: {e}", config.base_url)))?;
        if base_url.cannot_be_a_base() {
            return Err(GatewayError::InvalidConfig(format!(
                "base url {:?} cannot carry a path",
                config.base_url
            )));
        }

        let client = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .default_headers(headers)
            .build()?;

        Ok(Self {
            client,
            base_url,
            version: config.version,
            catalog_limit: config.catalog_limit,
        })
    }

    pub fn version(&self) -> ConnectorVersion {
        self.version
    }

    /// `collection` then `tail` appended to the base path, each segment
    /// percent-encoded so ids cannot escape their path segment.
    fn endpoint(&self, collection: &[&str], tail: &[&str]) -> GatewayResult<Url> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| GatewayError::InvalidConfig(format!("base url {} cannot carry a path", self.base_url)))?
            .pop_if_empty()
            .extend(collection)
            .extend(tail);
        Ok(url)
    }

    async fn get_json(&self, url: Url) -> GatewayResult<Value> {
        let response = send(self.client.get(url)).await?;
        decode(response).await
    }

    async fn post_json(&self, url: Url, body: &Value) -> GatewayResult<Value> {
        let response = send(self.client.post(url).json(body)).await?;
        decode(response).await
    }

    fn negotiation_body(&self, request: &NegotiationRequest) -> Value {
        let mut policy = match &request.policy {
            Value::Object(map) => map.clone(),
            _ => serde_json::Map::new(),
        };
        policy.remove("@context");
        policy.insert("@id".to_string(), json!(request.offer_id));
        policy.insert("@type".to_string(), json!(self.version.offer_type()));
        policy.insert("assigner".to_string(), json!(request.provider_id));
        policy.insert("target".to_string(), json!(request.asset_id));

        json!({
            "@context": self.version.context(),
            "@type": "ContractRequest",
            "counterPartyAddress": request.counter_party_address,
            "protocol": self.version.protocol(),
            "policy": Value::Object(policy),
            "callbackAddresses": []
        })
    }

    fn transfer_body(&self, request: &TransferRequest) -> Value {
        json!({
            "@context": self.version.context(),
            "@type": "TransferRequest",
            "counterPartyAddress": request.counter_party_address,
            "protocol": self.version.protocol(),
            "contractId": request.contract_id,
            "transferType": request.transfer_type,
            "dataDestination": request.data_destination,
            "privateProperties": {},
            "callbackAddresses": []
        })
    }
}

#[async_trait]
impl ConnectorGateway for HttpConnectorGateway {
    #[instrument(skip(self, request), fields(asset_id = %request.asset_id, offer_id = %request.offer_id))]
    async fn submit_negotiation(&self, request: &NegotiationRequest) -> GatewayResult<ResourceId> {
        let body = self.negotiation_body(request);
        let response = self.post_json(self.endpoint(NEGOTIATIONS, &[])?, &body).await?;
        let id = id_response(&response, "negotiation")?;
        debug!(negotiation_id = %id, "negotiation submitted");
        Ok(id)
    }

    async fn get_negotiation(&self, id: &ResourceId) -> GatewayResult<Negotiation> {
        let response = self.get_json(self.endpoint(NEGOTIATIONS, &[id.as_str()])?).await?;
        Negotiation::from_json(&response)
    }

    #[instrument(skip(self, request), fields(contract_id = %request.contract_id))]
    async fn submit_transfer(&self, request: &TransferRequest) -> GatewayResult<ResourceId> {
        let body = self.transfer_body(request);
        let response = self.post_json(self.endpoint(TRANSFERS, &[])?, &body).await?;
        let id = id_response(&response, "transfer process")?;
        debug!(transfer_id = %id, "transfer submitted");
        Ok(id)
    }

    async fn get_transfer(&self, id: &ResourceId) -> GatewayResult<Transfer> {
        let response = self.get_json(self.endpoint(TRANSFERS, &[id.as_str()])?).await?;
        Transfer::from_json(&response)
    }

    async fn get_credential(&self, transfer_id: &ResourceId) -> GatewayResult<CredentialLookup> {
        let response = self
            .client
            .get(self.endpoint(EDRS, &[transfer_id.as_str(), "dataaddress"])?)
            .send()
            .await?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND || status.as_u16() == 425 {
            debug!(transfer_id = %transfer_id, status = status.as_u16(), "EDR not ready");
            return Ok(CredentialLookup::NotReady);
        }
        let body = decode(check(response).await?).await?;
        Ok(CredentialLookup::Ready(Edr::from_json(&body, transfer_id)?))
    }

    #[instrument(skip(self))]
    async fn get_catalog(
        &self,
        counter_party_id: &str,
        counter_party_address: &str,
    ) -> GatewayResult<Catalog> {
        let body = json!({
            "@context": self.version.context(),
            "@type": "CatalogRequest",
            "counterPartyAddress": counter_party_address,
            "counterPartyId": counter_party_id,
            "protocol": self.version.protocol(),
            "querySpec": {"offset": 0, "limit": self.catalog_limit}
        });
        let response = self.post_json(self.endpoint(CATALOG, &[])?, &body).await?;
        Catalog::from_json(&response).map_err(|e| GatewayError::Decode(e.to_string()))
    }

    async fn terminate(&self, resource: &ResourceRef, reason: &str) -> GatewayResult<()> {
        let (collection, kind) = match resource.kind {
            ResourceKind::Negotiation => (NEGOTIATIONS, "TerminateNegotiation"),
            ResourceKind::Transfer => (TRANSFERS, "TerminateTransfer"),
        };
        let body = json!({
            "@context": self.version.context(),
            "@type": kind,
            "@id": resource.id,
            "reason": reason
        });
        send(
            self.client
                .post(self.endpoint(collection, &[resource.id.as_str(), "terminate"])?)
                .json(&body),
        )
        .await?;
        debug!(resource = %resource, "termination requested");
        Ok(())
    }
}

async fn send(request: RequestBuilder) -> GatewayResult<Response> {
    check(request.send().await?).await
}

async fn check(response: Response) -> GatewayResult<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(GatewayError::Http {
        status: status.as_u16(),
        body,
    })
}

async fn decode(response: Response) -> GatewayResult<Value> {
    response
        .json()
        .await
        .map_err(|e| GatewayError::Decode(e.to_string()))
}

fn id_response(value: &Value, what: &str) -> GatewayResult<ResourceId> {
    let map = value
        .as_object()
        .ok_or_else(|| GatewayError::Decode(format!("{what} id response is not an object")))?;
    let id = required_id(map, what)?;
    if id.is_empty() {
        return Err(GatewayError::Decode(format!("{what} id response with empty @id")));
    }
    Ok(ResourceId::new(id))
}

//! Scripted connector for lifecycle tests.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use dataspace_connector::{
    ConnectorGateway, CredentialLookup, Edr, GatewayError, GatewayResult, Negotiation,
    NegotiationRequest, NegotiationState, ResourceId, ResourceRef, Transfer, TransferRequest,
    TransferState,
};
use dataspace_orchestrator::{CancellationHandle, ManualClock};
use dataspace_policy::{Catalog, Offer};
use serde_json::{json, Value};

/// One scripted reply.
#[derive(Clone)]
pub enum Step<T> {
    Reply(T),
    Fail(u16),
    /// Never answers; exercises the per-call timeout.
    Hang,
}

/// Replies are consumed in order; the last one repeats.
struct Script<T: Clone> {
    steps: VecDeque<Step<T>>,
}

impl<T: Clone> Script<T> {
    fn new(steps: Vec<Step<T>>) -> Self {
        Self {
            steps: steps.into(),
        }
    }

    fn next(&mut self) -> Option<Step<T>> {
        if self.steps.len() > 1 {
            self.steps.pop_front()
        } else {
            self.steps.front().cloned()
        }
    }
}

async fn play<T: Clone>(step: Option<Step<T>>) -> GatewayResult<T> {
    match step {
        Some(Step::Reply(value)) => Ok(value),
        Some(Step::Fail(status)) => Err(GatewayError::Http {
            status,
            body: "scripted failure".to_string(),
        }),
        Some(Step::Hang) => std::future::pending().await,
        None => Err(GatewayError::Decode("nothing scripted".to_string())),
    }
}

pub struct ScriptedGateway {
    negotiation_submit: Mutex<Script<ResourceId>>,
    negotiation_polls: Mutex<Script<Negotiation>>,
    transfer_submit: Mutex<Script<ResourceId>>,
    transfer_polls: Mutex<Script<Transfer>>,
    credentials: Mutex<Script<CredentialLookup>>,
    terminate_fails: bool,
    catalog: Value,
    cancel_at: Mutex<Option<(usize, CancellationHandle)>>,
    latency: Option<(ManualClock, Duration)>,
    catalog_delay: Duration,

    pub negotiation_requests: Mutex<Vec<NegotiationRequest>>,
    pub transfer_requests: Mutex<Vec<TransferRequest>>,
    pub negotiation_poll_count: Mutex<usize>,
    pub transfer_poll_count: Mutex<usize>,
    pub terminated: Mutex<Vec<ResourceRef>>,
}

impl ScriptedGateway {
    pub fn new() -> Self {
        Self {
            negotiation_submit: Mutex::new(Script::new(vec![Step::Reply(ResourceId::new("neg-1"))])),
            negotiation_polls: Mutex::new(Script::new(vec![Step::Reply(finalized("agr-1"))])),
            transfer_submit: Mutex::new(Script::new(vec![Step::Reply(ResourceId::new("tp-1"))])),
            transfer_polls: Mutex::new(Script::new(vec![Step::Reply(transfer(TransferState::Started))])),
            credentials: Mutex::new(Script::new(vec![Step::Reply(ready("tp-1"))])),
            terminate_fails: false,
            catalog: json!({}),
            cancel_at: Mutex::new(None),
            latency: None,
            catalog_delay: Duration::ZERO,
            negotiation_requests: Mutex::new(Vec::new()),
            transfer_requests: Mutex::new(Vec::new()),
            negotiation_poll_count: Mutex::new(0),
            transfer_poll_count: Mutex::new(0),
            terminated: Mutex::new(Vec::new()),
        }
    }

    pub fn negotiation_submit(self, steps: Vec<Step<ResourceId>>) -> Self {
        *self.negotiation_submit.lock().unwrap() = Script::new(steps);
        self
    }

    pub fn negotiations(self, steps: Vec<Step<Negotiation>>) -> Self {
        *self.negotiation_polls.lock().unwrap() = Script::new(steps);
        self
    }

    pub fn transfer_submit(self, steps: Vec<Step<ResourceId>>) -> Self {
        *self.transfer_submit.lock().unwrap() = Script::new(steps);
        self
    }

    pub fn transfers(self, steps: Vec<Step<Transfer>>) -> Self {
        *self.transfer_polls.lock().unwrap() = Script::new(steps);
        self
    }

    pub fn credentials(self, steps: Vec<Step<CredentialLookup>>) -> Self {
        *self.credentials.lock().unwrap() = Script::new(steps);
        self
    }

    pub fn failing_terminate(mut self) -> Self {
        self.terminate_fails = true;
        self
    }

    pub fn catalog(mut self, catalog: Value) -> Self {
        self.catalog = catalog;
        self
    }

    /// Answer catalog requests after `delay` of tokio time.
    pub fn slow_catalog(mut self, delay: Duration) -> Self {
        self.catalog_delay = delay;
        self
    }

    /// Cancel `handle` while answering the `poll`-th negotiation poll.
    pub fn cancel_on_negotiation_poll(self, poll: usize, handle: CancellationHandle) -> Self {
        *self.cancel_at.lock().unwrap() = Some((poll, handle));
        self
    }

    /// Every submission and poll takes `per_call` of virtual time on `clock`.
    pub fn latency(mut self, clock: &ManualClock, per_call: Duration) -> Self {
        self.latency = Some((clock.clone(), per_call));
        self
    }

    fn lag(&self) {
        if let Some((clock, per_call)) = &self.latency {
            clock.advance(*per_call);
        }
    }

    pub fn negotiation_polls(&self) -> usize {
        *self.negotiation_poll_count.lock().unwrap()
    }

    pub fn transfer_polls(&self) -> usize {
        *self.transfer_poll_count.lock().unwrap()
    }

    pub fn terminated(&self) -> Vec<ResourceRef> {
        self.terminated.lock().unwrap().clone()
    }
}

#[async_trait]
impl ConnectorGateway for ScriptedGateway {
    async fn submit_negotiation(&self, request: &NegotiationRequest) -> GatewayResult<ResourceId> {
        self.negotiation_requests.lock().unwrap().push(request.clone());
        self.lag();
        let step = self.negotiation_submit.lock().unwrap().next();
        play(step).await
    }

    async fn get_negotiation(&self, _id: &ResourceId) -> GatewayResult<Negotiation> {
        self.lag();
        let poll = {
            let mut count = self.negotiation_poll_count.lock().unwrap();
            *count += 1;
            *count
        };
        if let Some((at, handle)) = self.cancel_at.lock().unwrap().as_ref() {
            if *at == poll {
                handle.cancel();
            }
        }
        let step = self.negotiation_polls.lock().unwrap().next();
        play(step).await
    }

    async fn submit_transfer(&self, request: &TransferRequest) -> GatewayResult<ResourceId> {
        self.transfer_requests.lock().unwrap().push(request.clone());
        self.lag();
        let step = self.transfer_submit.lock().unwrap().next();
        play(step).await
    }

    async fn get_transfer(&self, _id: &ResourceId) -> GatewayResult<Transfer> {
        *self.transfer_poll_count.lock().unwrap() += 1;
        self.lag();
        let step = self.transfer_polls.lock().unwrap().next();
        play(step).await
    }

    async fn get_credential(&self, _transfer_id: &ResourceId) -> GatewayResult<CredentialLookup> {
        let step = self.credentials.lock().unwrap().next();
        play(step).await
    }

    async fn get_catalog(
        &self,
        _counter_party_id: &str,
        _counter_party_address: &str,
    ) -> GatewayResult<Catalog> {
        if !self.catalog_delay.is_zero() {
            tokio::time::sleep(self.catalog_delay).await;
        }
        Catalog::from_json(&self.catalog).map_err(|e| GatewayError::Decode(e.to_string()))
    }

    async fn terminate(&self, resource: &ResourceRef, _reason: &str) -> GatewayResult<()> {
        self.terminated.lock().unwrap().push(resource.clone());
        if self.terminate_fails {
            return Err(GatewayError::Http {
                status: 409,
                body: "not terminable".to_string(),
            });
        }
        Ok(())
    }
}

pub fn negotiation(state: NegotiationState) -> Negotiation {
    Negotiation::new("neg-1", state)
}

pub fn finalized(agreement: &str) -> Negotiation {
    negotiation(NegotiationState::Finalized).with_agreement(agreement)
}

pub fn transfer(state: TransferState) -> Transfer {
    Transfer::new("tp-1", state)
}

pub fn ready(transfer_id: &str) -> CredentialLookup {
    CredentialLookup::Ready(Edr {
        endpoint: "https://provider-dataplane.example/api/public".to_string(),
        authorization: "eyJhbGciOiJSUzI1NiJ9.token".to_string(),
        issued_for: ResourceId::new(transfer_id),
    })
}

pub fn usage_policy(purpose: &str) -> Value {
    json!({
        "@type": "odrl:Offer",
        "odrl:permission": {
            "odrl:action": {"@id": "odrl:use"},
            "odrl:constraint": {"odrl:and": [
                {"odrl:leftOperand": {"@id": "cx-policy:FrameworkAgreement"}, "odrl:operator": {"@id": "odrl:eq"}, "odrl:rightOperand": "DataExchangeGovernance:1.0"},
                {"odrl:leftOperand": {"@id": "cx-policy:UsagePurpose"}, "odrl:operator": {"@id": "odrl:eq"}, "odrl:rightOperand": purpose}
            ]}
        }
    })
}

pub fn offer(asset_id: &str, offer_id: &str, purpose: &str) -> Offer {
    let mut policy = usage_policy(purpose);
    policy["@id"] = json!(offer_id);
    Offer {
        asset_id: asset_id.to_string(),
        offer_id: offer_id.to_string(),
        policy,
    }
}

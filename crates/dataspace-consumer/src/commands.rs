//! Subcommand implementations

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::Subcommand;
use dataspace_governance::GovernanceEngine;
use dataspace_orchestrator::{ContractOrchestrator, ContractTarget, WorkflowOutcome};
use dataspace_policy::{Offer, PolicyHash};
use serde_json::{json, Value};
use tracing::{info, warn};

#[derive(Subcommand)]
pub enum PolicyCommands {
    /// Register the policy (or array of policies) in a JSON file
    Add { file: PathBuf },

    /// List registered policy hashes
    List,

    /// Print the stored normalized body of a policy
    Show { hash: String },

    /// Revoke a registered policy
    Remove { hash: String },

    /// Report whether each policy in a JSON file is accepted
    Check { file: PathBuf },

    /// Revoke every registered policy
    Clear,
}

pub async fn policy(command: PolicyCommands, governance: &GovernanceEngine) -> Result<()> {
    match command {
        PolicyCommands::Add { file } => {
            for policy in read_policies(&file)? {
                let hash = governance.register_policy(&policy).await?;
                println!("{hash}");
            }
        }
        PolicyCommands::List => {
            for hash in governance.policy_hashes().await? {
                println!("{hash}");
            }
        }
        PolicyCommands::Show { hash } => {
            let hash = PolicyHash::parse(&hash)?;
            match governance.policy(&hash).await? {
                Some(body) => print_json(&body)?,
                None => bail!("policy {hash} is not registered"),
            }
        }
        PolicyCommands::Remove { hash } => {
            let hash = PolicyHash::parse(&hash)?;
            if !governance.revoke_policy(&hash).await? {
                warn!(%hash, "policy was not registered");
            }
        }
        PolicyCommands::Check { file } => {
            for policy in read_policies(&file)? {
                let accepted = governance.is_valid(&policy).await?;
                let hash = dataspace_policy::policy_hash(&policy)?;
                println!("{hash} {}", if accepted { "accepted" } else { "rejected" });
            }
        }
        PolicyCommands::Clear => {
            let removed = governance.clear().await?;
            info!(removed, "policy store cleared");
        }
    }
    Ok(())
}

/// Print the offers a provider publishes that governance accepts.
pub async fn catalog(orchestrator: &ContractOrchestrator, provider_id: &str, address: &str) -> Result<()> {
    let offers = orchestrator
        .discover(provider_id, address)
        .await
        .with_context(|| format!("catalog request to {provider_id} failed"))?;
    print_json(&offers)
}

/// Run one offer through negotiation and transfer until an EDR is issued.
/// Ctrl-C cancels the workflow and terminates its remote resources.
pub async fn negotiate(
    orchestrator: &ContractOrchestrator,
    provider_id: &str,
    address: &str,
    asset_id: Option<&str>,
    offer_id: Option<&str>,
) -> Result<()> {
    let offers = orchestrator
        .discover(provider_id, address)
        .await
        .with_context(|| format!("catalog request to {provider_id} failed"))?;
    let offer = pick_offer(offers, asset_id, offer_id)?;
    info!(asset_id = %offer.asset_id, offer_id = %offer.offer_id, "negotiating offer");

    let handle = orchestrator.spawn(ContractTarget::new(provider_id, address, offer));
    let cancel = handle.cancellation();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupt received, cancelling workflow");
            cancel.cancel();
        }
    });

    let outcome = handle.join().await;
    print_json(&report(&outcome))?;
    match outcome.result {
        Ok(_) => Ok(()),
        Err(e) => Err(e).context(format!("workflow {} failed", outcome.workflow_id)),
    }
}

fn pick_offer(offers: Vec<Offer>, asset_id: Option<&str>, offer_id: Option<&str>) -> Result<Offer> {
    let mut matching = offers.into_iter().filter(|offer| {
        asset_id.map_or(true, |id| offer.asset_id == id)
            && offer_id.map_or(true, |id| offer.offer_id == id)
    });
    let Some(first) = matching.next() else {
        bail!("no accepted offer matches the selection");
    };
    if matching.next().is_some() && offer_id.is_none() {
        warn!(offer_id = %first.offer_id, "several offers match, using the first");
    }
    Ok(first)
}

fn report(outcome: &WorkflowOutcome) -> Value {
    let mut report = json!({
        "workflowId": outcome.workflow_id,
        "state": outcome.final_state(),
        "negotiationId": outcome.negotiation_id,
        "transferId": outcome.transfer_id,
        "history": outcome.history,
    });
    match &outcome.result {
        Ok(grant) => report["credential"] = json!(grant),
        Err(e) => report["error"] = json!(e.to_string()),
    }
    report
}

fn read_policies(path: &Path) -> Result<Vec<Value>> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("cannot read {}", path.display()))?;
    let value: Value = serde_json::from_str(&raw)
        .with_context(|| format!("{} is not valid JSON", path.display()))?;
    Ok(match value {
        Value::Array(policies) => policies,
        policy => vec![policy],
    })
}

fn print_json<T: serde::Serialize + ?Sized>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn offer(asset_id: &str, offer_id: &str) -> Offer {
        Offer {
            asset_id: asset_id.to_string(),
            offer_id: offer_id.to_string(),
            policy: json!({"@id": offer_id}),
        }
    }

    #[test]
    fn test_pick_offer_by_asset() {
        let offers = vec![offer("a", "o1"), offer("b", "o2")];
        let picked = pick_offer(offers, Some("b"), None).unwrap();
        assert_eq!(picked.offer_id, "o2");
    }

    #[test]
    fn test_pick_offer_without_selection_takes_first() {
        let offers = vec![offer("a", "o1"), offer("b", "o2")];
        assert_eq!(pick_offer(offers, None, None).unwrap().offer_id, "o1");
    }

    #[test]
    fn test_pick_offer_no_match() {
        let offers = vec![offer("a", "o1")];
        assert!(pick_offer(offers, Some("a"), Some("o9")).is_err());
        assert!(pick_offer(Vec::new(), None, None).is_err());
    }

    #[test]
    fn test_read_policies_accepts_object_or_array() {
        let mut single = tempfile::NamedTempFile::new().unwrap();
        write!(single, r#"{{"@type": "odrl:Set"}}"#).unwrap();
        assert_eq!(read_policies(single.path()).unwrap().len(), 1);

        let mut many = tempfile::NamedTempFile::new().unwrap();
        write!(many, r#"[{{"@type": "odrl:Set"}}, {{"@type": "odrl:Offer"}}]"#).unwrap();
        assert_eq!(read_policies(many.path()).unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_policy_add_then_check() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{"@type": "odrl:Offer", "odrl:permission": {{"odrl:action": {{"@id": "odrl:use"}}}}}}"#
        )
        .unwrap();

        let governance = GovernanceEngine::memory();
        policy(
            PolicyCommands::Add {
                file: file.path().to_path_buf(),
            },
            &governance,
        )
        .await
        .unwrap();
        assert_eq!(governance.policy_count().await.unwrap(), 1);

        let body: Value = serde_json::from_str(&std::fs::read_to_string(file.path()).unwrap()).unwrap();
        assert!(governance.is_valid(&body).await.unwrap());

        policy(PolicyCommands::Clear, &governance).await.unwrap();
        assert_eq!(governance.policy_count().await.unwrap(), 0);
    }
}

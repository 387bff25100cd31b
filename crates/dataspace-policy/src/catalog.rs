//! DCAT catalog responses and the offers they advertise.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::vocab::{as_list, AT_ID};
use crate::{PolicyError, PolicyResult};

/// An asset advertised in a catalog together with one policy the provider
/// accepts for it. Offers are fetched per catalog query and never persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Offer {
    pub asset_id: String,
    pub offer_id: String,
    pub policy: Value,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dataset {
    pub id: String,
    pub offers: Vec<Offer>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Catalog {
    pub id: Option<String>,
    pub participant_id: Option<String>,
    pub datasets: Vec<Dataset>,
}

impl Catalog {
    /// Parse a catalog response (`dcat:dataset` as object or array).
    pub fn from_json(value: &Value) -> PolicyResult<Self> {
        let map = value.as_object().ok_or_else(|| {
            PolicyError::InvalidCatalog(format!("expected a catalog object, found {value}"))
        })?;

        let datasets = lookup(map, &["dcat:dataset", "dataset"])
            .map(|v| {
                as_list(v)
                    .into_iter()
                    .map(parse_dataset)
                    .collect::<PolicyResult<Vec<_>>>()
            })
            .transpose()?
            .unwrap_or_default();

        Ok(Catalog {
            id: map.get(AT_ID).and_then(Value::as_str).map(str::to_string),
            participant_id: lookup(map, &["dspace:participantId", "participantId"])
                .and_then(Value::as_str)
                .map(str::to_string),
            datasets,
        })
    }

    /// Every offer in catalog order.
    pub fn offers(&self) -> impl Iterator<Item = &Offer> {
        self.datasets.iter().flat_map(|d| d.offers.iter())
    }

    pub fn dataset(&self, asset_id: &str) -> Option<&Dataset> {
        self.datasets.iter().find(|d| d.id == asset_id)
    }
}

fn parse_dataset(value: &Value) -> PolicyResult<Dataset> {
    let map = value
        .as_object()
        .ok_or_else(|| PolicyError::InvalidCatalog(format!("dataset is not an object: {value}")))?;
    let id = map
        .get(AT_ID)
        .and_then(Value::as_str)
        .ok_or_else(|| PolicyError::InvalidCatalog("dataset without @id".to_string()))?
        .to_string();

    let offers = lookup(map, &["odrl:hasPolicy", "hasPolicy"])
        .map(|policies| {
            as_list(policies)
                .into_iter()
                .map(|policy| parse_offer(&id, policy))
                .collect::<PolicyResult<Vec<_>>>()
        })
        .transpose()?
        .unwrap_or_default();

    Ok(Dataset { id, offers })
}

fn parse_offer(asset_id: &str, policy: &Value) -> PolicyResult<Offer> {
    let offer_id = policy
        .get(AT_ID)
        .and_then(Value::as_str)
        .ok_or_else(|| {
            PolicyError::InvalidCatalog(format!("offer for dataset {asset_id} without @id"))
        })?;
    Ok(Offer {
        asset_id: asset_id.to_string(),
        offer_id: offer_id.to_string(),
        policy: policy.clone(),
    })
}

fn lookup<'a>(map: &'a Map<String, Value>, keys: &[&str]) -> Option<&'a Value> {
    keys.iter().find_map(|key| map.get(*key))
}

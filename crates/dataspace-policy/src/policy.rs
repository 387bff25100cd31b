//! ODRL policies, normalization and canonical hashing.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::canonical::CanonicalPolicy;
use crate::rule::{Rule, RuleKind};
use crate::vocab::{self, field, AT_ID, AT_TYPE, METADATA_KEYS};
use crate::{PolicyError, PolicyResult};

/// Hex-encoded SHA-256 digest of a canonical policy body.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct PolicyHash(String);

impl PolicyHash {
    pub(crate) fn from_digest(hex: String) -> Self {
        Self(hex)
    }

    /// Validate an externally supplied hash: 64 lower-case hex characters.
    pub fn parse(raw: &str) -> PolicyResult<Self> {
        let valid = raw.len() == 64
            && raw
                .bytes()
                .all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b));
        if valid {
            Ok(Self(raw.to_string()))
        } else {
            Err(PolicyError::InvalidHash(raw.to_string()))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PolicyHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for PolicyHash {
    type Err = PolicyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for PolicyHash {
    type Error = PolicyError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<PolicyHash> for String {
    fn from(hash: PolicyHash) -> Self {
        hash.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum PolicyType {
    #[default]
    Set,
    Offer,
    Agreement,
}

impl PolicyType {
    fn from_term(term: &str) -> Self {
        match vocab::strip_odrl(term) {
            "Offer" => PolicyType::Offer,
            "Agreement" => PolicyType::Agreement,
            _ => PolicyType::Set,
        }
    }
}

/// A parsed ODRL policy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Policy {
    pub id: Option<String>,
    pub profile: Option<String>,
    pub policy_type: PolicyType,
    pub rules: Vec<Rule>,
}

impl Policy {
    /// Parse a JSON-LD policy document.
    pub fn from_json(value: &Value) -> PolicyResult<Self> {
        let map = value.as_object().ok_or_else(|| {
            PolicyError::InvalidPolicy(format!("expected a policy object, found {value}"))
        })?;

        let mut rules = Vec::new();
        for kind in RuleKind::ALL {
            if let Some(items) = field(map, kind.term()) {
                rules.extend(Rule::parse_all(kind, items)?);
            }
        }

        Ok(Policy {
            id: map.get(AT_ID).and_then(Value::as_str).map(str::to_string),
            profile: field(map, "profile").and_then(vocab::id_value).map(str::to_string),
            policy_type: map
                .get(AT_TYPE)
                .and_then(Value::as_str)
                .map(PolicyType::from_term)
                .unwrap_or_default(),
            rules,
        })
    }

    pub fn rules_of(&self, kind: RuleKind) -> impl Iterator<Item = &Rule> {
        self.rules.iter().filter(move |rule| rule.kind == kind)
    }

    pub fn canonical(&self) -> CanonicalPolicy {
        CanonicalPolicy::from_policy(self)
    }

    /// Canonical digest; independent of metadata and rule/constraint order.
    pub fn hash(&self) -> PolicyResult<PolicyHash> {
        self.canonical().digest()
    }
}

/// Parse and hash a raw policy document in one step.
pub fn policy_hash(value: &Value) -> PolicyResult<PolicyHash> {
    Policy::from_json(value)?.hash()
}

/// Strip top-level metadata (`@id`, `@type`, `@context`, `metadata`, ...).
///
/// The result is the body stores persist; it hashes identically to the input.
pub fn normalize_policy(value: &Value) -> PolicyResult<Value> {
    let map = value.as_object().ok_or_else(|| {
        PolicyError::InvalidPolicy(format!("expected a policy object, found {value}"))
    })?;
    let body: Map<String, Value> = map
        .iter()
        .filter(|(key, _)| !METADATA_KEYS.contains(&key.as_str()))
        .map(|(key, value)| (key.clone(), value.clone()))
        .collect();
    Ok(Value::Object(body))
}

//! Constraint canonicalization and canonical policy bodies.
//!
//! Canonical forms are sorted with a total order so that two independently
//! authored policies with the same rules serialize to the same bytes.

use std::cmp::Ordering;

use serde::Serialize;
use serde_json::Value;
use sha2::{Digest, Sha256};

use crate::constraint::{AtomicConstraint, ConstraintNode};
use crate::policy::{Policy, PolicyHash};
use crate::rule::{Rule, RuleKind};
use crate::{PolicyError, PolicyResult};

/// A flattened `(leftOperand, operator, rightOperand)` triple.
///
/// Serializes as a three-element JSON array.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CanonicalConstraint(pub String, pub String, pub Value);

impl CanonicalConstraint {
    pub fn left_operand(&self) -> &str {
        &self.0
    }

    pub fn operator(&self) -> &str {
        &self.1
    }

    pub fn right_operand(&self) -> &Value {
        &self.2
    }
}

impl From<&AtomicConstraint> for CanonicalConstraint {
    fn from(atom: &AtomicConstraint) -> Self {
        CanonicalConstraint(
            atom.left_operand.clone(),
            atom.operator.as_str().to_string(),
            atom.right_operand.clone(),
        )
    }
}

impl Ord for CanonicalConstraint {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0
            .cmp(&other.0)
            .then_with(|| self.1.cmp(&other.1))
            .then_with(|| compare_json(&self.2, &other.2))
    }
}

impl PartialOrd for CanonicalConstraint {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Canonicalize a raw constraint value into sorted triples.
///
/// Degenerate input (`null`, scalars, `{}`) yields an empty list. A constraint
/// missing one of its three terms fails with
/// [`PolicyError::MalformedConstraint`]; dropping it would make the policy
/// look less constrained than it is.
pub fn canonicalize_constraints(value: &Value) -> PolicyResult<Vec<CanonicalConstraint>> {
    let nodes = ConstraintNode::parse_list(value)?;
    Ok(canonicalize_nodes(&nodes))
}

/// Flatten already-parsed nodes into sorted triples.
pub fn canonicalize_nodes(nodes: &[ConstraintNode]) -> Vec<CanonicalConstraint> {
    let mut triples: Vec<CanonicalConstraint> = nodes
        .iter()
        .flat_map(|node| node.atoms())
        .map(CanonicalConstraint::from)
        .collect();
    triples.sort();
    triples
}

/// SHA-256 over the compact JSON array of sorted constraint triples.
///
/// Left operands are hashed verbatim. Operators are normalized first, so
/// `odrl:eq`, `eq` and the full ODRL IRI give the same digest; tools that hash
/// the raw operator `@id` produce different digests.
pub fn hash_constraints(value: &Value) -> PolicyResult<String> {
    let triples = canonicalize_constraints(value)?;
    let encoded = serde_json::to_string(&triples)
        .map_err(|e| PolicyError::InvalidPolicy(format!("failed to encode constraints: {e}")))?;
    Ok(sha256_hex(encoded.as_bytes()))
}

/// Canonical, metadata-free form of one rule.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub struct CanonicalRule {
    pub action: Option<String>,
    pub constraints: Vec<CanonicalConstraint>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub duties: Vec<CanonicalRule>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub consequences: Vec<CanonicalRule>,
}

impl From<&Rule> for CanonicalRule {
    fn from(rule: &Rule) -> Self {
        CanonicalRule {
            action: rule.action.clone(),
            constraints: canonicalize_nodes(&rule.constraints),
            duties: sorted_rules(rule.duties.iter()),
            consequences: sorted_rules(rule.consequences.iter()),
        }
    }
}

/// Canonical policy body: the only input to a policy digest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CanonicalPolicy {
    pub permission: Vec<CanonicalRule>,
    pub prohibition: Vec<CanonicalRule>,
    pub obligation: Vec<CanonicalRule>,
}

impl CanonicalPolicy {
    pub fn from_policy(policy: &Policy) -> Self {
        let of_kind = |kind: RuleKind| sorted_rules(policy.rules.iter().filter(|r| r.kind == kind));
        CanonicalPolicy {
            permission: of_kind(RuleKind::Permission),
            prohibition: of_kind(RuleKind::Prohibition),
            obligation: of_kind(RuleKind::Obligation),
        }
    }

    /// Compact JSON encoding fed to the digest.
    pub fn encode(&self) -> PolicyResult<String> {
        serde_json::to_string(self)
            .map_err(|e| PolicyError::InvalidPolicy(format!("failed to encode policy: {e}")))
    }

    pub fn digest(&self) -> PolicyResult<PolicyHash> {
        let encoded = self.encode()?;
        Ok(PolicyHash::from_digest(sha256_hex(encoded.as_bytes())))
    }
}

fn sorted_rules<'a>(rules: impl Iterator<Item = &'a Rule>) -> Vec<CanonicalRule> {
    let mut canonical: Vec<CanonicalRule> = rules.map(CanonicalRule::from).collect();
    canonical.sort();
    canonical
}

fn sha256_hex(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

/// Total order over JSON values.
///
/// Values of the same type compare naturally (arrays and objects element-wise);
/// across types the order is null < bool < number < string < array < object.
pub fn compare_json(a: &Value, b: &Value) -> Ordering {
    match (a, b) {
        (Value::Null, Value::Null) => Ordering::Equal,
        (Value::Bool(x), Value::Bool(y)) => x.cmp(y),
        (Value::Number(x), Value::Number(y)) => {
            let (fx, fy) = (x.as_f64().unwrap_or(f64::NAN), y.as_f64().unwrap_or(f64::NAN));
            fx.total_cmp(&fy)
                .then_with(|| x.to_string().cmp(&y.to_string()))
        }
        (Value::String(x), Value::String(y)) => x.cmp(y),
        (Value::Array(x), Value::Array(y)) => x
            .iter()
            .zip(y.iter())
            .map(|(l, r)| compare_json(l, r))
            .find(|o| o.is_ne())
            .unwrap_or_else(|| x.len().cmp(&y.len())),
        (Value::Object(x), Value::Object(y)) => x
            .iter()
            .zip(y.iter())
            .map(|((lk, lv), (rk, rv))| lk.cmp(rk).then_with(|| compare_json(lv, rv)))
            .find(|o| o.is_ne())
            .unwrap_or_else(|| x.len().cmp(&y.len())),
        _ => type_rank(a).cmp(&type_rank(b)),
    }
}

fn type_rank(value: &Value) -> u8 {
    match value {
        Value::Null => 0,
        Value::Bool(_) => 1,
        Value::Number(_) => 2,
        Value::String(_) => 3,
        Value::Array(_) => 4,
        Value::Object(_) => 5,
    }
}

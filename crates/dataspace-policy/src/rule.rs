//! ODRL rules: permissions, prohibitions, obligations and their duties.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::constraint::ConstraintNode;
use crate::vocab::{as_list, field, id_value, AT_ID};
use crate::{PolicyError, PolicyResult};

/// Maximum nesting of duties and consequences below a top-level rule.
pub const MAX_RULE_DEPTH: usize = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RuleKind {
    Permission,
    Prohibition,
    Obligation,
}

impl RuleKind {
    pub const ALL: [RuleKind; 3] = [
        RuleKind::Permission,
        RuleKind::Prohibition,
        RuleKind::Obligation,
    ];

    /// The policy-level term holding rules of this kind.
    pub fn term(&self) -> &'static str {
        match self {
            RuleKind::Permission => "permission",
            RuleKind::Prohibition => "prohibition",
            RuleKind::Obligation => "obligation",
        }
    }
}

/// One ODRL rule.
///
/// Duties attached to a rule are obligation rules themselves and may carry a
/// `consequence`, which forms a depth-bounded chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rule {
    pub kind: RuleKind,
    pub id: Option<String>,
    pub action: Option<String>,
    pub constraints: Vec<ConstraintNode>,
    pub duties: Vec<Rule>,
    pub consequences: Vec<Rule>,
}

impl Rule {
    pub fn new(kind: RuleKind, action: impl Into<String>) -> Self {
        Self {
            kind,
            id: None,
            action: Some(action.into()),
            constraints: Vec::new(),
            duties: Vec::new(),
            consequences: Vec::new(),
        }
    }

    pub fn with_constraint(mut self, constraint: ConstraintNode) -> Self {
        self.constraints.push(constraint);
        self
    }

    /// Parse every rule stored under a policy-level term.
    pub fn parse_all(kind: RuleKind, value: &Value) -> PolicyResult<Vec<Rule>> {
        as_list(value)
            .into_iter()
            .map(|item| Self::parse(kind, item, 0))
            .collect()
    }

    fn parse(kind: RuleKind, value: &Value, depth: usize) -> PolicyResult<Rule> {
        if depth > MAX_RULE_DEPTH {
            return Err(PolicyError::InvalidRule(format!(
                "duty nesting exceeds {MAX_RULE_DEPTH} levels"
            )));
        }

        let map = match value {
            Value::Object(map) => map,
            Value::String(reference) => return Ok(Self::reference(kind, reference)),
            other => {
                return Err(PolicyError::InvalidRule(format!(
                    "expected a {} object, found {other}",
                    kind.term()
                )))
            }
        };

        let id = map.get(AT_ID).and_then(Value::as_str).map(str::to_string);
        let action = match field(map, "action") {
            None | Some(Value::Null) => None,
            Some(value) => Some(parse_action(value)?),
        };
        let constraints = match field(map, "constraint") {
            Some(value) => ConstraintNode::parse_list(value)?,
            None => Vec::new(),
        };

        let duties = parse_children(map, "duty", depth)?;
        let consequences = parse_children(map, "consequence", depth)?;

        if let Some(own_id) = &id {
            if consequences.iter().any(|c| c.id.as_deref() == Some(own_id)) {
                return Err(PolicyError::InvalidRule(format!(
                    "duty {own_id} names itself as its consequence"
                )));
            }
        }

        Ok(Rule {
            kind,
            id,
            action,
            constraints,
            duties,
            consequences,
        })
    }

    fn reference(kind: RuleKind, reference: &str) -> Rule {
        Rule {
            kind,
            id: Some(reference.to_string()),
            action: None,
            constraints: Vec::new(),
            duties: Vec::new(),
            consequences: Vec::new(),
        }
    }
}

fn parse_children(map: &Map<String, Value>, term: &str, depth: usize) -> PolicyResult<Vec<Rule>> {
    match field(map, term) {
        Some(value) => as_list(value)
            .into_iter()
            .map(|item| Rule::parse(RuleKind::Obligation, item, depth + 1))
            .collect(),
        None => Ok(Vec::new()),
    }
}

fn parse_action(value: &Value) -> PolicyResult<String> {
    if let Some(action) = id_value(value) {
        return Ok(action.to_string());
    }
    // Refined actions nest the action term one level down.
    if let Value::Object(map) = value {
        if let Some(inner) = field(map, "action") {
            return parse_action(inner);
        }
    }
    Err(PolicyError::InvalidRule(format!(
        "unsupported action value {value}"
    )))
}

//! ODRL constraint trees.
//!
//! A constraint node is exactly one of: an atomic constraint, an `and` group
//! or an `or` group. Groups may nest arbitrarily.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::vocab::{self, field, has_field, id_value};
use crate::{PolicyError, PolicyResult};

const LEFT_OPERAND: &str = "leftOperand";
const OPERATOR: &str = "operator";
const RIGHT_OPERAND: &str = "rightOperand";
const AND: &str = "and";
const OR: &str = "or";

/// ODRL constraint operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Operator {
    #[serde(rename = "eq")]
    Eq,
    #[serde(rename = "neq")]
    Neq,
    #[serde(rename = "gt")]
    Gt,
    #[serde(rename = "gteq")]
    Gteq,
    #[serde(rename = "lt")]
    Lt,
    #[serde(rename = "lteq")]
    Lteq,
    #[serde(rename = "hasPart")]
    HasPart,
    #[serde(rename = "isA")]
    IsA,
    #[serde(rename = "isAllOf")]
    IsAllOf,
    #[serde(rename = "isAnyOf")]
    IsAnyOf,
    #[serde(rename = "isNoneOf")]
    IsNoneOf,
    #[serde(rename = "isPartOf")]
    IsPartOf,
    #[serde(rename = "term-lteq")]
    TermLteq,
}

impl Operator {
    pub const ALL: [Operator; 13] = [
        Operator::Eq,
        Operator::Neq,
        Operator::Gt,
        Operator::Gteq,
        Operator::Lt,
        Operator::Lteq,
        Operator::HasPart,
        Operator::IsA,
        Operator::IsAllOf,
        Operator::IsAnyOf,
        Operator::IsNoneOf,
        Operator::IsPartOf,
        Operator::TermLteq,
    ];

    /// Bare ODRL term for this operator.
    pub fn as_str(&self) -> &'static str {
        match self {
            Operator::Eq => "eq",
            Operator::Neq => "neq",
            Operator::Gt => "gt",
            Operator::Gteq => "gteq",
            Operator::Lt => "lt",
            Operator::Lteq => "lteq",
            Operator::HasPart => "hasPart",
            Operator::IsA => "isA",
            Operator::IsAllOf => "isAllOf",
            Operator::IsAnyOf => "isAnyOf",
            Operator::IsNoneOf => "isNoneOf",
            Operator::IsPartOf => "isPartOf",
            Operator::TermLteq => "term-lteq",
        }
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Operator {
    type Err = PolicyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let term = vocab::strip_odrl(s);
        Operator::ALL
            .iter()
            .find(|op| op.as_str() == term)
            .copied()
            .ok_or_else(|| PolicyError::MalformedConstraint(format!("unknown operator '{s}'")))
    }
}

/// A single `(leftOperand, operator, rightOperand)` constraint.
///
/// `right_operand` keeps its native JSON type; list operands used with
/// `isAnyOf` and friends stay a single value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AtomicConstraint {
    pub left_operand: String,
    pub operator: Operator,
    pub right_operand: Value,
}

impl AtomicConstraint {
    pub fn new(left_operand: impl Into<String>, operator: Operator, right_operand: Value) -> Self {
        Self {
            left_operand: left_operand.into(),
            operator,
            right_operand,
        }
    }
}

/// A node in a constraint tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConstraintNode {
    Atomic(AtomicConstraint),
    And(Vec<ConstraintNode>),
    Or(Vec<ConstraintNode>),
}

impl ConstraintNode {
    /// Parse the value of a rule's `constraint` term.
    ///
    /// `null`, scalars and `{}` carry no constraint and yield an empty list.
    /// Arrays yield one node per element.
    pub fn parse_list(value: &Value) -> PolicyResult<Vec<ConstraintNode>> {
        match value {
            Value::Array(items) => items.iter().map(Self::parse_element).collect(),
            Value::Object(map) if map.is_empty() => Ok(Vec::new()),
            Value::Object(map) => Ok(vec![Self::parse_object(map)?]),
            _ => Ok(Vec::new()),
        }
    }

    /// Parse one constraint node.
    pub fn parse(value: &Value) -> PolicyResult<ConstraintNode> {
        Self::parse_element(value)
    }

    /// Collect the atomic constraints below this node, in tree order.
    pub fn atoms(&self) -> Vec<&AtomicConstraint> {
        let mut out = Vec::new();
        self.collect_atoms(&mut out);
        out
    }

    fn collect_atoms<'a>(&'a self, out: &mut Vec<&'a AtomicConstraint>) {
        match self {
            ConstraintNode::Atomic(atom) => out.push(atom),
            ConstraintNode::And(children) | ConstraintNode::Or(children) => {
                for child in children {
                    child.collect_atoms(out);
                }
            }
        }
    }

    fn parse_element(value: &Value) -> PolicyResult<ConstraintNode> {
        match value {
            Value::Object(map) => Self::parse_object(map),
            other => Err(PolicyError::MalformedConstraint(format!(
                "expected a constraint object, found {other}"
            ))),
        }
    }

    fn parse_object(map: &Map<String, Value>) -> PolicyResult<ConstraintNode> {
        let atomic = [LEFT_OPERAND, OPERATOR, RIGHT_OPERAND]
            .iter()
            .any(|term| has_field(map, term));
        let and = field(map, AND);
        let or = field(map, OR);

        let forms = usize::from(atomic) + usize::from(and.is_some()) + usize::from(or.is_some());
        if forms > 1 {
            return Err(PolicyError::MalformedConstraint(
                "constraint node mixes atomic fields and and/or groups".to_string(),
            ));
        }

        if let Some(children) = and {
            return Ok(ConstraintNode::And(Self::parse_group(children, AND)?));
        }
        if let Some(children) = or {
            return Ok(ConstraintNode::Or(Self::parse_group(children, OR)?));
        }
        if !atomic {
            return Err(PolicyError::MalformedConstraint(
                "constraint has none of leftOperand, operator, rightOperand, and, or".to_string(),
            ));
        }

        let left_operand = field(map, LEFT_OPERAND)
            .ok_or_else(|| missing(LEFT_OPERAND))
            .and_then(|v| id_value(v).ok_or_else(|| not_an_id(LEFT_OPERAND)))?;
        let operator = field(map, OPERATOR)
            .ok_or_else(|| missing(OPERATOR))
            .and_then(|v| id_value(v).ok_or_else(|| not_an_id(OPERATOR)))?
            .parse::<Operator>()?;
        let right_operand = field(map, RIGHT_OPERAND).ok_or_else(|| missing(RIGHT_OPERAND))?;

        Ok(ConstraintNode::Atomic(AtomicConstraint::new(
            left_operand,
            operator,
            right_operand.clone(),
        )))
    }

    fn parse_group(value: &Value, group: &str) -> PolicyResult<Vec<ConstraintNode>> {
        match value {
            Value::Array(items) => items.iter().map(Self::parse_element).collect(),
            Value::Object(map) => Ok(vec![Self::parse_object(map)?]),
            other => Err(PolicyError::MalformedConstraint(format!(
                "'{group}' group must hold constraints, found {other}"
            ))),
        }
    }
}

fn missing(term: &str) -> PolicyError {
    PolicyError::MalformedConstraint(format!("missing {term}"))
}

fn not_an_id(term: &str) -> PolicyError {
    PolicyError::MalformedConstraint(format!("{term} must be a string or {{\"@id\": ...}}"))
}

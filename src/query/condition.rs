//! Condition tree nodes accumulated by the builder

use serde::Serialize;

use crate::error::{QueryError, Result};
use crate::parser::operators;
use crate::parser::Combinator;
use crate::value::Value;

/// A single `field <operator> value` condition.
///
/// The field is already alias-expanded and the operator normalized; both are
/// fixed once constructed.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConditionLeaf {
    field: String,
    operator: &'static str,
    value: Value,
}

impl ConditionLeaf {
    pub fn new(field: impl Into<String>, operator: &str, value: Value) -> Result<Self> {
        let normalized = operators::normalize(operator).ok_or_else(|| {
            QueryError::InvalidOperator {
                operator: operator.to_string(),
                supported: operators::supported_operators()
                    .iter()
                    .map(|s| s.to_string())
                    .collect(),
            }
        })?;

        Ok(Self {
            field: field.into(),
            operator: normalized,
            value,
        })
    }

    pub fn field(&self) -> &str {
        &self.field
    }

    pub fn operator(&self) -> &'static str {
        self.operator
    }

    pub fn value(&self) -> &Value {
        &self.value
    }
}

/// An ordered, non-empty list of conditions joined by one combinator
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConditionGroup {
    expressions: Vec<Condition>,
    combinator: Combinator,
}

impl ConditionGroup {
    pub fn new(expressions: Vec<Condition>, combinator: Combinator) -> Result<Self> {
        if expressions.is_empty() {
            return Err(QueryError::usage(format!(
                "a {} group needs at least one condition",
                combinator
            )));
        }
        Ok(Self {
            expressions,
            combinator,
        })
    }

    pub fn expressions(&self) -> &[Condition] {
        &self.expressions
    }

    pub fn combinator(&self) -> Combinator {
        self.combinator
    }
}

/// A node of the condition tree
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Condition {
    Leaf(ConditionLeaf),
    Group(ConditionGroup),
}

impl Condition {
    pub fn as_leaf(&self) -> Option<&ConditionLeaf> {
        match self {
            Condition::Leaf(leaf) => Some(leaf),
            Condition::Group(_) => None,
        }
    }

    pub fn as_group(&self) -> Option<&ConditionGroup> {
        match self {
            Condition::Group(group) => Some(group),
            Condition::Leaf(_) => None,
        }
    }
}

impl From<ConditionLeaf> for Condition {
    fn from(leaf: ConditionLeaf) -> Self {
        Condition::Leaf(leaf)
    }
}

impl From<ConditionGroup> for Condition {
    fn from(group: ConditionGroup) -> Self {
        Condition::Group(group)
    }
}

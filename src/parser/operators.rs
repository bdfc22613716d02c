//! Operator table shared by the expression parser and the criteria compiler

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{QueryError, Result};

/// Filter construction category an operator maps to
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum FilterType {
    Equals,
    NotEquals,
    Range,
    Contains,
    In,
    NotIn,
    Null,
    NotNull,
    Prefix,
    Suffix,
}

impl FilterType {
    /// Operators of this category take no value (`is null`, `is not null`)
    pub fn is_unary(self) -> bool {
        matches!(self, FilterType::Null | FilterType::NotNull)
    }

    /// Operators of this category take a list value
    pub fn takes_list(self) -> bool {
        matches!(self, FilterType::In | FilterType::NotIn)
    }
}

/// How the children of a group are joined
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "UPPERCASE")]
pub enum Combinator {
    And,
    Or,
}

impl Combinator {
    pub fn keyword(self) -> &'static str {
        match self {
            Combinator::And => "AND",
            Combinator::Or => "OR",
        }
    }
}

impl fmt::Display for Combinator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.keyword())
    }
}

/// Every accepted spelling in its normalized form.
///
/// Word operators are stored lower-cased with single spaces.
const OPERATORS: &[(&str, FilterType)] = &[
    ("=", FilterType::Equals),
    ("==", FilterType::Equals),
    ("!=", FilterType::NotEquals),
    ("<>", FilterType::NotEquals),
    (">", FilterType::Range),
    (">=", FilterType::Range),
    ("<", FilterType::Range),
    ("<=", FilterType::Range),
    ("like", FilterType::Contains),
    ("contains", FilterType::Contains),
    ("in", FilterType::In),
    ("not in", FilterType::NotIn),
    ("is null", FilterType::Null),
    ("is not null", FilterType::NotNull),
    ("starts with", FilterType::Prefix),
    ("ends with", FilterType::Suffix),
];

/// Find the table entry for an operator spelling.
///
/// Matching is case-insensitive and tolerates runs of whitespace inside
/// multi-word operators.
fn lookup(operator: &str) -> Option<&'static (&'static str, FilterType)> {
    let folded = operator
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase();

    OPERATORS.iter().find(|(spelling, _)| *spelling == folded)
}

/// Normalize an operator spelling to its table entry
pub fn normalize(operator: &str) -> Option<&'static str> {
    lookup(operator).map(|(spelling, _)| *spelling)
}

/// Look up the filter category of an operator
pub fn filter_type(operator: &str) -> Result<FilterType> {
    lookup(operator)
        .map(|(_, filter_type)| *filter_type)
        .ok_or_else(|| QueryError::InvalidOperator {
            operator: operator.to_string(),
            supported: supported_operators().iter().map(|s| s.to_string()).collect(),
        })
}

pub fn is_valid_operator(operator: &str) -> bool {
    normalize(operator).is_some()
}

pub fn supported_operators() -> Vec<&'static str> {
    OPERATORS.iter().map(|(spelling, _)| *spelling).collect()
}

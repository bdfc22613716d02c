//! Filter construction from an operator and a resolved value

use super::types::{Filter, RangeBound};
use crate::error::{QueryError, Result};
use crate::parser::operators::{self, FilterType};
use crate::value::Value;

/// Builds one [`Filter`] per condition leaf.
///
/// Dispatch is an exhaustive match over [`FilterType`], so every category
/// the operator table can produce has a constructor.
#[derive(Debug, Clone, Copy, Default)]
pub struct FilterFactory;

impl FilterFactory {
    pub fn new() -> Self {
        Self
    }

    pub fn create(&self, field: &str, operator: &str, value: Value) -> Result<Filter> {
        let field = field.to_string();

        let filter = match operators::filter_type(operator)? {
            FilterType::Equals => Filter::Equals { field, value },
            FilterType::NotEquals => Filter::not(Filter::Equals { field, value }),
            FilterType::Range => {
                let normalized = operators::normalize(operator).unwrap_or(operator);
                let bound = RangeBound::from_operator(normalized).ok_or_else(|| {
                    QueryError::usage(format!("'{}' is not a range operator", operator))
                })?;
                Filter::Range { field, bound, value }
            }
            FilterType::Contains => Filter::Contains {
                field,
                value: strip_like_wildcards(value),
            },
            FilterType::In => Filter::EqualsAny {
                field,
                values: value.into_list(),
            },
            FilterType::NotIn => Filter::not(Filter::EqualsAny {
                field,
                values: value.into_list(),
            }),
            FilterType::Null => Filter::Equals {
                field,
                value: Value::Null,
            },
            FilterType::NotNull => Filter::not(Filter::Equals {
                field,
                value: Value::Null,
            }),
            FilterType::Prefix => Filter::Prefix { field, value },
            FilterType::Suffix => Filter::Suffix { field, value },
        };

        Ok(filter)
    }
}

/// `like '%shirt%'` means the same as `contains 'shirt'`
fn strip_like_wildcards(value: Value) -> Value {
    match value {
        Value::String(s) => Value::String(s.trim_matches('%').to_string()),
        other => other,
    }
}

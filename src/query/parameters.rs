//! Named parameters bound to `:name` placeholders at compile time

use regex::Regex;
use std::collections::BTreeMap;

use crate::error::{QueryError, Result};
use crate::value::Value;

lazy_static::lazy_static! {
    static ref NAME_REGEX: Regex = Regex::new(r"^[A-Za-z_]\w*$").unwrap();
}

/// Parameter values keyed by name (without the leading `:`)
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParameterStore {
    values: BTreeMap<String, Value>,
}

impl ParameterStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a value. The name may carry a leading `:` and is validated
    /// immediately.
    pub fn set(&mut self, name: &str, value: impl Into<Value>) -> Result<()> {
        let stripped = name.strip_prefix(':').unwrap_or(name);
        if !NAME_REGEX.is_match(stripped) {
            return Err(QueryError::InvalidParameterName(name.to_string()));
        }
        self.values.insert(stripped.to_string(), value.into());
        Ok(())
    }

    pub fn get(&self, name: &str) -> Result<&Value> {
        let stripped = name.strip_prefix(':').unwrap_or(name);
        self.values
            .get(stripped)
            .ok_or_else(|| QueryError::MissingParameter(stripped.to_string()))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_ok()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// A copy of `self` with `overrides` applied on top
    pub fn layered(&self, overrides: &ParameterStore) -> ParameterStore {
        let mut values = self.values.clone();
        values.extend(overrides.values.iter().map(|(k, v)| (k.clone(), v.clone())));
        ParameterStore { values }
    }

    /// Replace placeholders with their bound values, descending into arrays.
    /// Strings are never placeholders, even when they start with `:`.
    /// Unbound placeholders are an error.
    pub fn resolve(&self, value: &Value) -> Result<Value> {
        match value {
            Value::Parameter(name) => self.get(name).cloned(),
            Value::Array(items) => items
                .iter()
                .map(|item| self.resolve(item))
                .collect::<Result<Vec<_>>>()
                .map(Value::Array),
            other => Ok(other.clone()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_and_get() {
        let mut params = ParameterStore::new();
        params.set("status", "active").unwrap();
        params.set(":min", 10).unwrap();

        assert_eq!(params.get("status").unwrap(), &Value::from("active"));
        assert_eq!(params.get(":min").unwrap(), &Value::Int(10));
        assert!(params.contains("min"));
    }

    #[test]
    fn test_invalid_names_fail_fast() {
        let mut params = ParameterStore::new();

        for name in ["", ":", "1abc", "with-dash", "a b"] {
            assert!(
                matches!(params.set(name, 1), Err(QueryError::InvalidParameterName(_))),
                "'{}' should be rejected",
                name
            );
        }
        assert!(params.is_empty());
    }

    #[test]
    fn test_missing_parameter() {
        let params = ParameterStore::new();
        match params.resolve(&Value::parameter("status")) {
            Err(QueryError::MissingParameter(name)) => assert_eq!(name, "status"),
            other => panic!("Expected missing parameter, got {:?}", other),
        }
    }

    #[test]
    fn test_resolve_descends_into_arrays() {
        let mut params = ParameterStore::new();
        params.set("a", 1).unwrap();
        params.set("b", "two").unwrap();

        let resolved = params
            .resolve(&Value::Array(vec![Value::parameter("a"), Value::parameter("b"), Value::Int(3)]))
            .unwrap();
        assert_eq!(
            resolved,
            Value::Array(vec![Value::Int(1), Value::from("two"), Value::Int(3)])
        );
        assert_eq!(params.resolve(&Value::from("plain")).unwrap(), Value::from("plain"));
    }

    #[test]
    fn test_colon_strings_are_not_placeholders() {
        let mut params = ParameterStore::new();
        params.set("vip", "gold").unwrap();

        assert_eq!(params.resolve(&Value::from(":vip")).unwrap(), Value::from(":vip"));
        assert_eq!(params.resolve(&Value::from(":unbound")).unwrap(), Value::from(":unbound"));
        assert_eq!(params.resolve(&Value::parameter("vip")).unwrap(), Value::from("gold"));
    }

    #[test]
    fn test_layered_overrides() {
        let mut parent = ParameterStore::new();
        parent.set("a", 1).unwrap();
        parent.set("b", 2).unwrap();
        let mut child = ParameterStore::new();
        child.set("b", 20).unwrap();

        let merged = parent.layered(&child);
        assert_eq!(merged.get("a").unwrap(), &Value::Int(1));
        assert_eq!(merged.get("b").unwrap(), &Value::Int(20));
    }
}

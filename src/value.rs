//! Literal values carried by conditions, parameters and filters

use serde::{Deserialize, Serialize};
use std::fmt;

/// A dynamically typed literal
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
    Array(Vec<Value>),

    /// An unbound `:name` placeholder, holding the name without the colon
    #[serde(serialize_with = "serialize_parameter", skip_deserializing)]
    Parameter(String),
}

fn serialize_parameter<S: serde::Serializer>(name: &str, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.collect_str(&format_args!(":{}", name))
}

impl Value {
    /// Placeholder for a named parameter; a leading `:` is accepted
    pub fn parameter(name: &str) -> Self {
        Value::Parameter(name.strip_prefix(':').unwrap_or(name).to_string())
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Int(i) => Some(*i as f64),
            Value::Float(f) => Some(*f),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// The placeholder name, if this is an unbound parameter
    pub fn as_parameter(&self) -> Option<&str> {
        match self {
            Value::Parameter(name) => Some(name),
            _ => None,
        }
    }

    /// Flatten into a list: arrays yield their items, null yields nothing,
    /// anything else becomes a single-element list.
    pub fn into_list(self) -> Vec<Value> {
        match self {
            Value::Array(items) => items,
            Value::Null => Vec::new(),
            other => vec![other],
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "NULL"),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Int(i) => write!(f, "{}", i),
            Value::Float(n) => write!(f, "{}", n),
            Value::String(s) => write!(f, "{}", s),
            Value::Parameter(name) => write!(f, ":{}", name),
            Value::Array(items) => {
                write!(f, "(")?;
                for (idx, item) in items.iter().enumerate() {
                    if idx > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", item)?;
                }
                write!(f, ")")
            }
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Int(i)
    }
}

impl From<i32> for Value {
    fn from(i: i32) -> Self {
        Value::Int(i64::from(i))
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Float(n)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(items: Vec<T>) -> Self {
        Value::Array(items.into_iter().map(Into::into).collect())
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(value: Option<T>) -> Self {
        value.map(Into::into).unwrap_or(Value::Null)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_into_list() {
        assert_eq!(Value::from(vec![1, 2]).into_list(), vec![Value::Int(1), Value::Int(2)]);
        assert_eq!(Value::from("a").into_list(), vec![Value::from("a")]);
        assert!(Value::Null.into_list().is_empty());
    }

    #[test]
    fn test_display_array() {
        let value = Value::Array(vec![Value::from("a"), Value::Int(2), Value::Null]);
        assert_eq!(value.to_string(), "(a, 2, NULL)");
    }

    #[test]
    fn test_parameter_placeholder() {
        let value = Value::parameter(":brand");
        assert_eq!(value, Value::parameter("brand"));
        assert_eq!(value.as_parameter(), Some("brand"));
        assert_eq!(value.as_str(), None);
        assert_eq!(value.to_string(), ":brand");
        assert_eq!(serde_json::to_string(&value).unwrap(), r#"":brand""#);

        // Deserializing never yields a placeholder
        let parsed: Value = serde_json::from_str(r#"":brand""#).unwrap();
        assert_eq!(parsed, Value::from(":brand"));
    }

    #[test]
    fn test_untagged_json() {
        let value: Value = serde_json::from_str(r#"[1, 2.5, "x", true, null]"#).unwrap();
        assert_eq!(
            value,
            Value::Array(vec![
                Value::Int(1),
                Value::Float(2.5),
                Value::from("x"),
                Value::Bool(true),
                Value::Null,
            ])
        );
    }
}

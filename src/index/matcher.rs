//! In-memory evaluation of criteria against loaded documents
//!
//! Used to restrict embedded associations after the root rows come back
//! from SQLite. Comparisons follow the SQL translation: booleans compare
//! as 0/1, numbers sort before text, missing values behave like NULL,
//! LIKE-style matching is ASCII case-insensitive and a path crossing a
//! to-many association matches when any element does.

use serde_json::Value as JsonValue;
use std::cmp::Ordering;

use crate::criteria::{Criteria, FieldSorting, Filter, RangeBound, SortDirection};
use crate::parser::Combinator;
use crate::schema::EntityMetadata;
use crate::value::Value;

/// A comparable scalar, ordered the way SQLite orders them
#[derive(Debug, PartialEq, PartialOrd)]
enum Scalar<'a> {
    Number(f64),
    Text(&'a str),
}

fn json_scalar(json: Option<&JsonValue>) -> Option<Scalar<'_>> {
    match json? {
        JsonValue::Bool(b) => Some(Scalar::Number(if *b { 1.0 } else { 0.0 })),
        JsonValue::Number(n) => n.as_f64().map(Scalar::Number),
        JsonValue::String(s) => Some(Scalar::Text(s)),
        JsonValue::Null | JsonValue::Array(_) | JsonValue::Object(_) => None,
    }
}

fn value_scalar(value: &Value) -> Option<Scalar<'_>> {
    match value {
        Value::Bool(b) => Some(Scalar::Number(if *b { 1.0 } else { 0.0 })),
        Value::Int(i) => Some(Scalar::Number(*i as f64)),
        Value::Float(f) => Some(Scalar::Number(*f)),
        Value::String(s) => Some(Scalar::Text(s)),
        Value::Null | Value::Array(_) | Value::Parameter(_) => None,
    }
}

fn equals(json: Option<&JsonValue>, value: &Value) -> bool {
    if value.is_null() {
        return json_scalar(json).is_none();
    }
    match (json_scalar(json), value_scalar(value)) {
        (Some(left), Some(right)) => left == right,
        _ => false,
    }
}

fn in_range(json: Option<&JsonValue>, bound: RangeBound, value: &Value) -> bool {
    let (Some(left), Some(right)) = (json_scalar(json), value_scalar(value)) else {
        return false;
    };
    match left.partial_cmp(&right) {
        Some(Ordering::Greater) => matches!(bound, RangeBound::Gt | RangeBound::Gte),
        Some(Ordering::Less) => matches!(bound, RangeBound::Lt | RangeBound::Lte),
        Some(Ordering::Equal) => matches!(bound, RangeBound::Gte | RangeBound::Lte),
        None => false,
    }
}

/// Text a LIKE comparison sees for a stored value
fn like_text(json: Option<&JsonValue>) -> Option<String> {
    match json? {
        JsonValue::String(s) => Some(s.to_ascii_lowercase()),
        JsonValue::Number(n) => Some(n.to_string()),
        JsonValue::Bool(b) => Some(if *b { "1" } else { "0" }.to_string()),
        JsonValue::Null | JsonValue::Array(_) | JsonValue::Object(_) => None,
    }
}

fn like_needle(value: &Value) -> String {
    value
        .as_str()
        .map(str::to_string)
        .unwrap_or_else(|| value.to_string())
        .to_ascii_lowercase()
}

/// Walk to-one paths only; sortings never cross to-many associations
fn sort_key<'a>(document: &'a JsonValue, field: &str) -> Option<Scalar<'a>> {
    let value = field
        .split('.')
        .try_fold(document, |current, segment| current.get(segment));
    json_scalar(value)
}

fn compare(a: &JsonValue, b: &JsonValue, sortings: &[FieldSorting]) -> Ordering {
    for sorting in sortings {
        // NULL sorts first, as in SQLite
        let ordering = sort_key(a, &sorting.field)
            .partial_cmp(&sort_key(b, &sorting.field))
            .unwrap_or(Ordering::Equal);
        let ordering = match sorting.direction {
            SortDirection::Asc => ordering,
            SortDirection::Desc => ordering.reverse(),
        };
        if ordering != Ordering::Equal {
            return ordering;
        }
    }
    Ordering::Equal
}

/// Evaluates filters for documents of a given entity
pub(crate) struct DocumentMatcher<'a> {
    metadata: &'a dyn EntityMetadata,
}

impl<'a> DocumentMatcher<'a> {
    pub(crate) fn new(metadata: &'a dyn EntityMetadata) -> Self {
        Self { metadata }
    }

    /// Keep the items matching `criteria`, ordered by its sortings and cut
    /// to its offset/limit
    pub(crate) fn restrict(&self, entity: &str, items: &mut Vec<JsonValue>, criteria: &Criteria) {
        items.retain(|item| self.matches_all(entity, item, &criteria.filters));

        if !criteria.sortings.is_empty() {
            // Stable, so ties keep document order
            items.sort_by(|a, b| compare(a, b, &criteria.sortings));
        }

        let offset = criteria.offset.unwrap_or(0).min(items.len());
        items.drain(..offset);
        if let Some(limit) = criteria.limit {
            items.truncate(limit);
        }
    }

    /// Top-level filters are ANDed
    pub(crate) fn matches_all(&self, entity: &str, document: &JsonValue, filters: &[Filter]) -> bool {
        filters.iter().all(|filter| self.matches(entity, document, filter))
    }

    pub(crate) fn matches(&self, entity: &str, document: &JsonValue, filter: &Filter) -> bool {
        match filter {
            Filter::Equals { field, value } => {
                self.on_field(entity, document, field, &|json: Option<&JsonValue>| {
                    equals(json, value)
                })
            }
            Filter::EqualsAny { field, values } => {
                self.on_field(entity, document, field, &|json: Option<&JsonValue>| {
                    values.iter().any(|value| equals(json, value))
                })
            }
            Filter::Range { field, bound, value } => {
                self.on_field(entity, document, field, &|json: Option<&JsonValue>| {
                    in_range(json, *bound, value)
                })
            }
            Filter::Contains { field, value } => {
                let needle = like_needle(value);
                self.on_field(entity, document, field, &|json: Option<&JsonValue>| {
                    like_text(json).map_or(false, |text| text.contains(&needle))
                })
            }
            Filter::Prefix { field, value } => {
                let needle = like_needle(value);
                self.on_field(entity, document, field, &|json: Option<&JsonValue>| {
                    like_text(json).map_or(false, |text| text.starts_with(&needle))
                })
            }
            Filter::Suffix { field, value } => {
                let needle = like_needle(value);
                self.on_field(entity, document, field, &|json: Option<&JsonValue>| {
                    like_text(json).map_or(false, |text| text.ends_with(&needle))
                })
            }
            Filter::Not { operator, queries } => !self.combine(entity, document, *operator, queries),
            Filter::Multi { operator, queries } => self.combine(entity, document, *operator, queries),
        }
    }

    fn combine(&self, entity: &str, document: &JsonValue, operator: Combinator, queries: &[Filter]) -> bool {
        match operator {
            Combinator::And => queries.iter().all(|query| self.matches(entity, document, query)),
            Combinator::Or => {
                queries.is_empty() || queries.iter().any(|query| self.matches(entity, document, query))
            }
        }
    }

    /// Walk `field` from `entity` and apply `predicate` to the value found.
    /// A missing to-one hop yields a missing value, a to-many hop matches
    /// when any element does.
    fn on_field<F>(&self, entity: &str, document: &JsonValue, field: &str, predicate: &F) -> bool
    where
        F: Fn(Option<&JsonValue>) -> bool,
    {
        let Some((segment, rest)) = field.split_once('.') else {
            return predicate(document.get(field));
        };
        let Some(info) = self.metadata.association_info(entity, segment) else {
            return false;
        };

        match document.get(segment) {
            Some(JsonValue::Array(items)) if info.cardinality.is_to_many() => items
                .iter()
                .any(|item| self.on_field(&info.entity, item, rest, predicate)),
            _ if info.cardinality.is_to_many() => false,
            Some(nested) => self.on_field(&info.entity, nested, rest, predicate),
            None => self.on_field(&info.entity, &JsonValue::Null, rest, predicate),
        }
    }
}

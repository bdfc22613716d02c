//! Criteria to SQL translation over the JSON `documents` table
//!
//! Field paths become `json_extract` calls on the document. A to-many
//! association segment opens an `EXISTS (... json_each ...)` scope and the
//! rest of the path is resolved against each element.

use regex::Regex;
use rusqlite::types::Value as SqlValue;

use crate::criteria::{FieldSorting, Filter};
use crate::error::{QueryError, Result};
use crate::parser::Combinator;
use crate::schema::EntityMetadata;
use crate::value::Value;

lazy_static::lazy_static! {
    static ref SEGMENT_REGEX: Regex = Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").unwrap();
}

/// Root document column, aliased as `d` in every query
pub(crate) const ROOT_SOURCE: &str = "d.data";

/// A WHERE clause with its positional parameters in placeholder order
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct WhereClause {
    pub sql: String,
    pub params: Vec<SqlValue>,
}

pub(crate) struct SqlTranslator<'a> {
    metadata: &'a dyn EntityMetadata,
    params: Vec<SqlValue>,
    scopes: usize,
}

impl<'a> SqlTranslator<'a> {
    pub fn new(metadata: &'a dyn EntityMetadata) -> Self {
        Self {
            metadata,
            params: Vec::new(),
            scopes: 0,
        }
    }

    /// Restrict to `entity` and AND all top-level filters
    pub fn where_clause(mut self, entity: &str, filters: &[Filter]) -> Result<WhereClause> {
        let mut parts = vec!["d.entity = ?".to_string()];
        self.params.push(SqlValue::Text(entity.to_string()));

        for filter in filters {
            let sql = self.filter(entity, ROOT_SOURCE, filter)?;
            parts.push(sql);
        }

        Ok(WhereClause {
            sql: parts.join(" AND "),
            params: self.params,
        })
    }

    /// ORDER BY terms; the insertion order breaks ties
    pub fn order_clause(&self, entity: &str, sortings: &[FieldSorting]) -> Result<String> {
        let mut terms = Vec::with_capacity(sortings.len() + 1);
        for sorting in sortings {
            let expr = self.scalar_expression(entity, &sorting.field)?;
            terms.push(format!("{} {}", expr, sorting.direction.keyword()));
        }
        terms.push("d.rowid ASC".to_string());
        Ok(terms.join(", "))
    }

    /// `json_extract` for a path that stays on the root row (scalar fields
    /// and to-one associations only)
    pub fn scalar_expression(&self, entity: &str, field: &str) -> Result<String> {
        let segments: Vec<&str> = field.split('.').collect();
        let mut current = entity.to_string();
        let mut path = String::from("$");

        for (idx, segment) in segments.iter().enumerate() {
            self.check_segment(&current, field, segment)?;
            path = format!("{}.{}", path, segment);
            if idx + 1 == segments.len() {
                break;
            }

            let info = self
                .metadata
                .association_info(&current, segment)
                .ok_or_else(|| self.invalid_property(&current, field))?;
            if info.cardinality.is_to_many() {
                return Err(QueryError::usage(format!(
                    "'{}' crosses the to-many association '{}' and cannot be sorted or aggregated",
                    field, segment
                )));
            }
            current = info.entity;
        }

        Ok(format!("json_extract({}, '{}')", ROOT_SOURCE, path))
    }

    fn filter(&mut self, entity: &str, source: &str, filter: &Filter) -> Result<String> {
        match filter {
            Filter::Equals { field, value } => self.on_field(entity, source, field, |t, expr| {
                if value.is_null() {
                    Ok(format!("{} IS NULL", expr))
                } else {
                    t.bind(value);
                    Ok(format!("{} = ?", expr))
                }
            }),
            Filter::EqualsAny { field, values } => {
                self.on_field(entity, source, field, |t, expr| Ok(t.equals_any(expr, values)))
            }
            Filter::Range { field, bound, value } => {
                self.on_field(entity, source, field, |t, expr| {
                    t.bind(value);
                    Ok(format!("{} {} ?", expr, bound.sql_operator()))
                })
            }
            Filter::Contains { field, value } => {
                self.on_field(entity, source, field, |t, expr| Ok(t.like(expr, "%", value, "%")))
            }
            Filter::Prefix { field, value } => {
                self.on_field(entity, source, field, |t, expr| Ok(t.like(expr, "", value, "%")))
            }
            Filter::Suffix { field, value } => {
                self.on_field(entity, source, field, |t, expr| Ok(t.like(expr, "%", value, "")))
            }
            // Missing fields make the inner predicate NULL; they count as
            // "not matching" so the negation includes them
            Filter::Not { operator, queries } => {
                let inner = self.combine(entity, source, *operator, queries)?;
                Ok(format!("NOT COALESCE({}, 0)", inner))
            }
            Filter::Multi { operator, queries } => self.combine(entity, source, *operator, queries),
        }
    }

    fn combine(
        &mut self,
        entity: &str,
        source: &str,
        operator: Combinator,
        queries: &[Filter],
    ) -> Result<String> {
        if queries.is_empty() {
            return Ok("1".to_string());
        }

        let parts = queries
            .iter()
            .map(|query| self.filter(entity, source, query))
            .collect::<Result<Vec<_>>>()?;
        let separator = format!(" {} ", operator.keyword());
        Ok(format!("({})", parts.join(separator.as_str())))
    }

    /// Walk `field` from `entity`, then hand the final `json_extract`
    /// expression to `predicate`
    fn on_field<F>(&mut self, entity: &str, source: &str, field: &str, predicate: F) -> Result<String>
    where
        F: FnOnce(&mut Self, &str) -> Result<String>,
    {
        let segments: Vec<&str> = field.split('.').collect();
        let mut current = entity.to_string();
        let mut path = String::from("$");

        for (idx, segment) in segments.iter().enumerate() {
            self.check_segment(&current, field, segment)?;

            if idx + 1 == segments.len() {
                let expr = format!("json_extract({}, '{}.{}')", source, path, segment);
                return predicate(self, &expr);
            }

            let info = self
                .metadata
                .association_info(&current, segment)
                .ok_or_else(|| self.invalid_property(&current, field))?;

            if info.cardinality.is_to_many() {
                self.scopes += 1;
                let alias = format!("j{}", self.scopes);
                let element = format!("{}.value", alias);
                let rest = segments[idx + 1..].join(".");
                let inner = self.on_field(&info.entity, &element, &rest, predicate)?;
                return Ok(format!(
                    "EXISTS (SELECT 1 FROM json_each({}, '{}.{}') AS {} WHERE {})",
                    source, path, segment, alias, inner
                ));
            }

            path = format!("{}.{}", path, segment);
            current = info.entity;
        }

        Err(self.invalid_property(&current, field))
    }

    fn equals_any(&mut self, expr: &str, values: &[Value]) -> String {
        if values.is_empty() {
            return "0".to_string();
        }

        let mut placeholders = Vec::new();
        let mut matches_null = false;
        for value in values {
            if value.is_null() {
                matches_null = true;
            } else {
                self.bind(value);
                placeholders.push("?");
            }
        }

        match (placeholders.is_empty(), matches_null) {
            (true, _) => format!("{} IS NULL", expr),
            (false, false) => format!("{} IN ({})", expr, placeholders.join(", ")),
            (false, true) => format!("({} IN ({}) OR {} IS NULL)", expr, placeholders.join(", "), expr),
        }
    }

    fn like(&mut self, expr: &str, before: &str, value: &Value, after: &str) -> String {
        let text = value.as_str().map(str::to_string).unwrap_or_else(|| value.to_string());
        let pattern = format!("{}{}{}", before, escape_like_wildcards(&text), after);
        self.params.push(SqlValue::Text(pattern));
        format!("{} LIKE ? ESCAPE '\\'", expr)
    }

    fn bind(&mut self, value: &Value) {
        self.params.push(to_sql_value(value));
    }

    /// Path segments are inlined into JSON paths, so only plain identifiers
    /// are accepted
    fn check_segment(&self, entity: &str, field: &str, segment: &str) -> Result<()> {
        if SEGMENT_REGEX.is_match(segment) {
            Ok(())
        } else {
            Err(self.invalid_property(entity, field))
        }
    }

    fn invalid_property(&self, entity: &str, field: &str) -> QueryError {
        QueryError::InvalidProperty {
            entity: entity.to_string(),
            property: field.to_string(),
            available_fields: self.metadata.available_fields(entity),
            available_associations: self.metadata.available_associations(entity),
        }
    }
}

/// Escape `%`, `_` and `\` for a LIKE pattern using `\` as the escape character
pub(crate) fn escape_like_wildcards(input: &str) -> String {
    let mut escaped = String::with_capacity(input.len());
    for c in input.chars() {
        if matches!(c, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

/// Booleans are bound as integers to match what `json_extract` returns
pub(crate) fn to_sql_value(value: &Value) -> SqlValue {
    match value {
        Value::Null => SqlValue::Null,
        Value::Bool(b) => SqlValue::Integer(i64::from(*b)),
        Value::Int(i) => SqlValue::Integer(*i),
        Value::Float(f) => SqlValue::Real(*f),
        Value::String(s) => SqlValue::Text(s.clone()),
        Value::Parameter(_) | Value::Array(_) => SqlValue::Text(value.to_string()),
    }
}

pub(crate) fn to_json_value(value: SqlValue) -> serde_json::Value {
    match value {
        SqlValue::Null | SqlValue::Blob(_) => serde_json::Value::Null,
        SqlValue::Integer(i) => serde_json::Value::from(i),
        SqlValue::Real(f) => serde_json::Number::from_f64(f)
            .map(serde_json::Value::Number)
            .unwrap_or(serde_json::Value::Null),
        SqlValue::Text(s) => serde_json::Value::String(s),
    }
}

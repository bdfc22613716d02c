//! Criteria graph types - the compile target handed to a repository
//!
//! - Criteria: filters, sortings, aggregations, limit/offset and nested
//!   association criteria
//! - Filter: one node of the filter tree
//! - FieldSorting / Aggregation: ordering and named aggregates

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use crate::error::QueryError;
use crate::parser::Combinator;
use crate::value::Value;

/// Filter tree node
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Filter {
    /// Exact match (a null value matches missing/null fields)
    Equals { field: String, value: Value },
    /// Field equals any of the values
    EqualsAny { field: String, values: Vec<Value> },
    /// One-sided range comparison
    Range {
        field: String,
        bound: RangeBound,
        value: Value,
    },
    /// Substring match
    Contains { field: String, value: Value },
    /// Prefix match
    Prefix { field: String, value: Value },
    /// Suffix match
    Suffix { field: String, value: Value },
    /// Negation of the combined children
    Not {
        operator: Combinator,
        queries: Vec<Filter>,
    },
    /// Children joined by AND/OR
    Multi {
        operator: Combinator,
        queries: Vec<Filter>,
    },
}

impl Filter {
    pub fn and(queries: Vec<Filter>) -> Self {
        Filter::Multi {
            operator: Combinator::And,
            queries,
        }
    }

    pub fn or(queries: Vec<Filter>) -> Self {
        Filter::Multi {
            operator: Combinator::Or,
            queries,
        }
    }

    pub fn not(query: Filter) -> Self {
        Filter::Not {
            operator: Combinator::And,
            queries: vec![query],
        }
    }

    /// The field of a leaf filter
    pub fn field(&self) -> Option<&str> {
        match self {
            Filter::Equals { field, .. }
            | Filter::EqualsAny { field, .. }
            | Filter::Range { field, .. }
            | Filter::Contains { field, .. }
            | Filter::Prefix { field, .. }
            | Filter::Suffix { field, .. } => Some(field),
            Filter::Not { .. } | Filter::Multi { .. } => None,
        }
    }

    /// Children of a combinator filter
    pub fn queries(&self) -> &[Filter] {
        match self {
            Filter::Not { queries, .. } | Filter::Multi { queries, .. } => queries,
            _ => &[],
        }
    }
}

/// Which side of a range a value bounds
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum RangeBound {
    Gt,
    Gte,
    Lt,
    Lte,
}

impl RangeBound {
    pub fn from_operator(operator: &str) -> Option<Self> {
        match operator {
            ">" => Some(RangeBound::Gt),
            ">=" => Some(RangeBound::Gte),
            "<" => Some(RangeBound::Lt),
            "<=" => Some(RangeBound::Lte),
            _ => None,
        }
    }

    pub fn sql_operator(self) -> &'static str {
        match self {
            RangeBound::Gt => ">",
            RangeBound::Gte => ">=",
            RangeBound::Lt => "<",
            RangeBound::Lte => "<=",
        }
    }
}

/// Sort direction.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "UPPERCASE")]
pub enum SortDirection {
    #[default]
    Asc,
    Desc,
}

impl SortDirection {
    pub fn keyword(self) -> &'static str {
        match self {
            SortDirection::Asc => "ASC",
            SortDirection::Desc => "DESC",
        }
    }
}

impl fmt::Display for SortDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.keyword())
    }
}

impl FromStr for SortDirection {
    type Err = QueryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "asc" => Ok(SortDirection::Asc),
            "desc" => Ok(SortDirection::Desc),
            other => Err(QueryError::usage(format!(
                "invalid sort direction '{}', expected ASC or DESC",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldSorting {
    pub field: String,
    pub direction: SortDirection,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum AggregationKind {
    Count,
    Sum,
    Avg,
    Min,
    Max,
}

impl AggregationKind {
    pub fn sql_function(self) -> &'static str {
        match self {
            AggregationKind::Count => "COUNT",
            AggregationKind::Sum => "SUM",
            AggregationKind::Avg => "AVG",
            AggregationKind::Min => "MIN",
            AggregationKind::Max => "MAX",
        }
    }
}

/// A named aggregation over one field
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Aggregation {
    pub name: String,
    pub kind: AggregationKind,
    pub field: String,
}

/// Compiled query for one entity (or one association of it).
///
/// Top-level filters are mutually conjunctive.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Criteria {
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub filters: Vec<Filter>,

    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub sortings: Vec<FieldSorting>,

    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub aggregations: Vec<Aggregation>,

    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub associations: BTreeMap<String, Criteria>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub limit: Option<usize>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub offset: Option<usize>,
}

impl Criteria {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_filter(&mut self, filter: Filter) {
        self.filters.push(filter);
    }

    pub fn add_sorting(&mut self, sorting: FieldSorting) {
        self.sortings.push(sorting);
    }

    pub fn add_aggregation(&mut self, aggregation: Aggregation) {
        self.aggregations.push(aggregation);
    }

    pub fn has_association(&self, path: &str) -> bool {
        self.association(path).is_some()
    }

    /// Look up a (possibly dotted) association path
    pub fn association(&self, path: &str) -> Option<&Criteria> {
        path.split('.')
            .try_fold(self, |node, segment| node.associations.get(segment))
    }

    /// Get or create the criteria node for a dotted association path,
    /// creating intermediate nodes along the way
    pub fn association_mut(&mut self, path: &str) -> &mut Criteria {
        path.split('.').fold(self, |node, segment| {
            node.associations.entry(segment.to_string()).or_default()
        })
    }

    /// Merge another criteria into this one: filters, sortings and
    /// aggregations are appended, limit/offset are taken when set, and
    /// associations are merged recursively.
    pub fn merge(&mut self, other: Criteria) {
        self.filters.extend(other.filters);
        self.sortings.extend(other.sortings);
        self.aggregations.extend(other.aggregations);
        if other.limit.is_some() {
            self.limit = other.limit;
        }
        if other.offset.is_some() {
            self.offset = other.offset;
        }
        for (name, nested) in other.associations {
            self.associations.entry(name).or_default().merge(nested);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn equals(field: &str, value: impl Into<Value>) -> Filter {
        Filter::Equals {
            field: field.to_string(),
            value: value.into(),
        }
    }

    #[test]
    fn test_association_mut_creates_nested_nodes() {
        let mut criteria = Criteria::new();
        criteria.association_mut("manufacturer.country").limit = Some(1);

        assert!(criteria.has_association("manufacturer"));
        assert_eq!(criteria.associations.len(), 1);
        assert_eq!(criteria.association("manufacturer.country").unwrap().limit, Some(1));
        assert!(criteria.association("country").is_none());
    }

    #[test]
    fn test_merge_is_recursive() {
        let mut target = Criteria::new();
        target.add_filter(equals("active", true));
        target.association_mut("country").add_filter(equals("iso", "DE"));

        let mut other = Criteria::new();
        other.add_filter(equals("name", "Acme"));
        other.limit = Some(5);
        other.association_mut("country").add_filter(equals("name", "Germany"));
        other.association_mut("country.region");

        target.merge(other);

        assert_eq!(target.filters.len(), 2);
        assert_eq!(target.limit, Some(5));
        assert_eq!(target.offset, None);
        assert_eq!(target.association("country").unwrap().filters.len(), 2);
        assert!(target.has_association("country.region"));
    }

    #[test]
    fn test_filter_serialization_shape() {
        let filter = Filter::or(vec![
            equals("status", "a"),
            Filter::not(Filter::EqualsAny {
                field: "id".to_string(),
                values: vec![Value::Int(1)],
            }),
        ]);

        let json = serde_json::to_value(&filter).unwrap();
        assert_eq!(json["type"], "multi");
        assert_eq!(json["operator"], "OR");
        assert_eq!(json["queries"][0]["type"], "equals");
        assert_eq!(json["queries"][1]["type"], "not");
        assert_eq!(json["queries"][1]["queries"][0]["values"][0], 1);
    }

    #[test]
    fn test_sort_direction_from_str() {
        assert_eq!("desc".parse::<SortDirection>().unwrap(), SortDirection::Desc);
        assert_eq!(" ASC ".parse::<SortDirection>().unwrap(), SortDirection::Asc);
        assert!("sideways".parse::<SortDirection>().is_err());
    }
}

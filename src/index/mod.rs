//! Index module - the repository seam and its SQLite document store

mod database;
mod matcher;
mod sql;

use serde::Serialize;
use std::collections::BTreeMap;

use crate::criteria::{AggregationKind, Criteria};
use crate::error::Result;

pub use database::{Database, IndexStats, INDEX_DIR};

/// Executes compiled criteria against stored entities
pub trait Repository {
    /// Matching entities (respecting limit/offset), the total match count
    /// and any requested aggregations
    fn search(&self, entity: &str, criteria: &Criteria) -> Result<SearchResult>;

    fn search_ids(&self, entity: &str, criteria: &Criteria) -> Result<Vec<String>>;

    /// Number of matches, ignoring limit/offset
    fn count(&self, entity: &str, criteria: &Criteria) -> Result<usize>;
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SearchResult {
    pub entities: Vec<serde_json::Value>,
    pub total: usize,

    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub aggregations: BTreeMap<String, AggregationResult>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AggregationResult {
    pub kind: AggregationKind,
    pub field: String,
    pub value: serde_json::Value,
}

//! SQLite document store

use anyhow::{bail, Context};
use rusqlite::types::Value as SqlValue;
use rusqlite::{params, params_from_iter, Connection};
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use tracing::debug;

use super::matcher::DocumentMatcher;
use super::sql::{to_json_value, SqlTranslator, WhereClause};
use super::{AggregationResult, Repository, SearchResult};
use crate::criteria::{Aggregation, Criteria};
use crate::error::{QueryError, Result};
use crate::schema::{EntityMetadata, IDENTITY_FIELD};

/// Directory (under the project root) holding the index
pub const INDEX_DIR: &str = ".querycraft";

/// Database handle
pub struct Database {
    conn: Connection,
    metadata: Arc<dyn EntityMetadata>,
}

impl Database {
    /// Open or create the index under `root`
    pub fn open(root: &Path, metadata: Arc<dyn EntityMetadata>) -> anyhow::Result<Self> {
        let db_dir = root.join(INDEX_DIR);
        std::fs::create_dir_all(&db_dir)
            .with_context(|| format!("Failed to create {} directory: {}", INDEX_DIR, db_dir.display()))?;

        let db_path = db_dir.join("index.db");
        let conn = Connection::open(&db_path)
            .with_context(|| format!("Failed to open database: {}", db_path.display()))?;

        let db = Database { conn, metadata };
        db.initialize()?;

        Ok(db)
    }

    /// Open an in-memory database (for testing)
    #[cfg(test)]
    pub fn open_in_memory(metadata: Arc<dyn EntityMetadata>) -> anyhow::Result<Self> {
        let conn = Connection::open_in_memory()?;
        let db = Database { conn, metadata };
        db.initialize()?;
        Ok(db)
    }

    fn initialize(&self) -> anyhow::Result<()> {
        self.conn
            .execute_batch(
                r#"
            PRAGMA journal_mode = WAL;

            -- One JSON document per entity instance, associations embedded
            CREATE TABLE IF NOT EXISTS documents (
                entity TEXT NOT NULL,
                id TEXT NOT NULL,
                data TEXT NOT NULL,
                created_at INTEGER,
                updated_at INTEGER,
                PRIMARY KEY (entity, id)
            );

            CREATE INDEX IF NOT EXISTS idx_documents_entity ON documents(entity);
        "#,
            )
            .context("Failed to initialize database schema")?;

        Ok(())
    }

    /// Insert or replace one document. It must carry an `id`.
    pub fn insert(&mut self, entity: &str, document: &serde_json::Value) -> anyhow::Result<()> {
        self.insert_documents(entity, std::slice::from_ref(document))?;
        Ok(())
    }

    /// Insert or replace documents in one transaction, returning how many
    /// were written. Replacing keeps the original `created_at`.
    pub fn insert_documents(&mut self, entity: &str, documents: &[serde_json::Value]) -> anyhow::Result<usize> {
        if !self.metadata.has_entity(entity) {
            bail!("Unknown entity '{}'", entity);
        }

        let tx = self.conn.transaction()?;
        let now = chrono::Utc::now().timestamp();

        for document in documents {
            let Some(id) = document_id(document) else {
                bail!("Document for '{}' has no '{}': {}", entity, IDENTITY_FIELD, document);
            };
            let data = serde_json::to_string(document)?;

            tx.execute(
                r#"INSERT INTO documents (entity, id, data, created_at, updated_at)
                   VALUES (?, ?, ?, ?, ?)
                   ON CONFLICT(entity, id) DO UPDATE SET
                       data = excluded.data,
                       updated_at = excluded.updated_at"#,
                params![entity, &id, &data, now, now],
            )?;
        }

        tx.commit()?;
        debug!(entity, count = documents.len(), "stored documents");
        Ok(documents.len())
    }

    /// Remove one document, returning whether it existed
    pub fn remove(&mut self, entity: &str, id: &str) -> anyhow::Result<bool> {
        let removed = self.conn.execute(
            "DELETE FROM documents WHERE entity = ? AND id = ?",
            params![entity, id],
        )?;
        Ok(removed > 0)
    }

    /// Get statistics about the index
    pub fn stats(&self) -> anyhow::Result<IndexStats> {
        let mut stmt = self
            .conn
            .prepare("SELECT entity, COUNT(*) FROM documents GROUP BY entity ORDER BY entity")?;
        let rows = stmt.query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?)))?;

        let mut entities = BTreeMap::new();
        for row in rows {
            let (entity, count) = row?;
            entities.insert(entity, count as usize);
        }

        Ok(IndexStats {
            document_count: entities.values().sum(),
            entities,
        })
    }

    fn ensure_entity(&self, entity: &str) -> Result<()> {
        if self.metadata.has_entity(entity) {
            Ok(())
        } else {
            Err(QueryError::UnknownEntity(entity.to_string()))
        }
    }

    fn where_clause(&self, entity: &str, criteria: &Criteria) -> Result<WhereClause> {
        SqlTranslator::new(self.metadata.as_ref()).where_clause(entity, &criteria.filters)
    }

    /// SELECT `column` for the current page of matches
    fn select_page(&self, column: &str, entity: &str, criteria: &Criteria) -> Result<Vec<String>> {
        let clause = self.where_clause(entity, criteria)?;
        let order = SqlTranslator::new(self.metadata.as_ref()).order_clause(entity, &criteria.sortings)?;

        let sql = format!(
            "SELECT {} FROM documents d WHERE {} ORDER BY {} LIMIT ? OFFSET ?",
            column, clause.sql, order
        );
        debug!(%sql, "executing search");

        let mut params = clause.params;
        // LIMIT -1 means no limit in SQLite
        params.push(SqlValue::Integer(criteria.limit.map_or(-1, to_i64)));
        params.push(SqlValue::Integer(criteria.offset.map_or(0, to_i64)));

        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map(params_from_iter(params.iter()), |row| row.get::<_, String>(0))?;
        rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
    }

    fn count_where(&self, clause: &WhereClause) -> Result<usize> {
        let sql = format!("SELECT COUNT(*) FROM documents d WHERE {}", clause.sql);
        let count: i64 = self
            .conn
            .query_row(&sql, params_from_iter(clause.params.iter()), |row| row.get(0))?;
        Ok(count as usize)
    }

    /// Aggregations run over every match, ignoring limit/offset
    fn aggregate(
        &self,
        entity: &str,
        clause: &WhereClause,
        aggregations: &[Aggregation],
    ) -> Result<BTreeMap<String, AggregationResult>> {
        let translator = SqlTranslator::new(self.metadata.as_ref());
        let mut results = BTreeMap::new();

        for aggregation in aggregations {
            let expr = translator.scalar_expression(entity, &aggregation.field)?;
            let sql = format!(
                "SELECT {}({}) FROM documents d WHERE {}",
                aggregation.kind.sql_function(),
                expr,
                clause.sql
            );
            let value: SqlValue = self
                .conn
                .query_row(&sql, params_from_iter(clause.params.iter()), |row| row.get(0))?;

            results.insert(
                aggregation.name.clone(),
                AggregationResult {
                    kind: aggregation.kind,
                    field: aggregation.field.clone(),
                    value: to_json_value(value),
                },
            );
        }

        Ok(results)
    }

    /// Association criteria are applied to the embedded documents, so they
    /// are checked once up front: fields must exist, sortings must stay on
    /// to-one paths and aggregations only run on the root query
    fn check_association_criteria(&self, entity: &str, criteria: &Criteria) -> Result<()> {
        for (name, nested) in &criteria.associations {
            let info = self.metadata.association_info(entity, name).ok_or_else(|| {
                QueryError::InvalidAssociation {
                    entity: entity.to_string(),
                    association: name.clone(),
                    available: self.metadata.available_associations(entity),
                }
            })?;

            if !nested.aggregations.is_empty() {
                return Err(QueryError::usage(format!(
                    "aggregations on the association '{}' are not supported, aggregate on the root query",
                    name
                )));
            }
            SqlTranslator::new(self.metadata.as_ref()).where_clause(&info.entity, &nested.filters)?;
            SqlTranslator::new(self.metadata.as_ref()).order_clause(&info.entity, &nested.sortings)?;

            self.check_association_criteria(&info.entity, nested)?;
        }
        Ok(())
    }

    /// Strip embedded associations that were not requested. Requested
    /// to-many collections are filtered, sorted and paged by their criteria;
    /// a to-one association failing its filters is replaced by null.
    fn project(&self, entity: &str, document: &mut serde_json::Value, criteria: &Criteria) {
        let Some(object) = document.as_object_mut() else {
            return;
        };
        let matcher = DocumentMatcher::new(self.metadata.as_ref());

        for name in self.metadata.available_associations(entity) {
            let Some(nested) = criteria.associations.get(&name) else {
                object.remove(&name);
                continue;
            };
            let Some(info) = self.metadata.association_info(entity, &name) else {
                continue;
            };

            match object.get_mut(&name) {
                Some(serde_json::Value::Array(items)) => {
                    matcher.restrict(&info.entity, items, nested);
                    for item in items {
                        self.project(&info.entity, item, nested);
                    }
                }
                Some(value) if !value.is_null() => {
                    if matcher.matches_all(&info.entity, value, &nested.filters) {
                        self.project(&info.entity, value, nested);
                    } else {
                        *value = serde_json::Value::Null;
                    }
                }
                _ => {}
            }
        }
    }
}

impl Repository for Database {
    fn search(&self, entity: &str, criteria: &Criteria) -> Result<SearchResult> {
        self.ensure_entity(entity)?;
        self.check_association_criteria(entity, criteria)?;

        let mut entities = Vec::new();
        for data in self.select_page("d.data", entity, criteria)? {
            let mut document: serde_json::Value = serde_json::from_str(&data)?;
            self.project(entity, &mut document, criteria);
            entities.push(document);
        }

        let clause = self.where_clause(entity, criteria)?;
        let total = self.count_where(&clause)?;
        let aggregations = self.aggregate(entity, &clause, &criteria.aggregations)?;

        debug!(entity, returned = entities.len(), total, "search finished");
        Ok(SearchResult {
            entities,
            total,
            aggregations,
        })
    }

    fn search_ids(&self, entity: &str, criteria: &Criteria) -> Result<Vec<String>> {
        self.ensure_entity(entity)?;
        self.select_page("d.id", entity, criteria)
    }

    fn count(&self, entity: &str, criteria: &Criteria) -> Result<usize> {
        self.ensure_entity(entity)?;
        let clause = self.where_clause(entity, criteria)?;
        self.count_where(&clause)
    }
}

/// Index statistics
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct IndexStats {
    pub document_count: usize,
    pub entities: BTreeMap<String, usize>,
}

/// String ids are used as-is, numeric ids by their decimal form
fn document_id(document: &serde_json::Value) -> Option<String> {
    match document.get(IDENTITY_FIELD)? {
        serde_json::Value::String(s) if !s.is_empty() => Some(s.clone()),
        serde_json::Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn to_i64(n: usize) -> i64 {
    i64::try_from(n).unwrap_or(i64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::{QueryBuilder, SortDirection};
    use crate::testing::sample_metadata;
    use serde_json::json;

    fn products() -> Vec<serde_json::Value> {
        vec![
            json!({
                "id": "p1", "name": "Shirt", "stock": 12, "price": 19.5, "active": true,
                "status": "new",
                "manufacturer": {"id": "m1", "name": "Acme", "country": {"id": "de", "name": "Germany", "iso": "DE"}},
                "categories": [{"id": "c1", "name": "Clothing", "active": true}]
            }),
            json!({
                "id": "p2", "name": "100% Wool Socks", "stock": 0, "price": 5.0, "active": true,
                "status": "sale",
                "manufacturer": {"id": "m2", "name": "Knit Co", "country": {"id": "fr", "name": "France", "iso": "FR"}},
                "categories": [{"id": "c1", "name": "Clothing", "active": true}, {"id": "c2", "name": "Winter", "active": false}]
            }),
            json!({
                "id": "p3", "name": "Shoes", "stock": 3, "price": 60.0, "active": false,
                "manufacturer": {"id": "m1", "name": "Acme", "country": {"id": "de", "name": "Germany", "iso": "DE"}},
                "categories": []
            }),
        ]
    }

    fn repository() -> Arc<dyn Repository> {
        let mut db = Database::open_in_memory(sample_metadata()).unwrap();
        db.insert_documents("product", &products()).unwrap();
        Arc::new(db)
    }

    fn query(repository: &Arc<dyn Repository>) -> QueryBuilder {
        QueryBuilder::new("product", sample_metadata())
            .unwrap()
            .with_repository(Arc::clone(repository))
    }

    fn ids(values: &[serde_json::Value]) -> Vec<&str> {
        values.iter().map(|v| v["id"].as_str().unwrap()).collect()
    }

    #[test]
    fn test_database_initialization() {
        let db = Database::open_in_memory(sample_metadata()).unwrap();
        let stats = db.stats().unwrap();
        assert_eq!(stats.document_count, 0);
    }

    #[test]
    fn test_insert_replace_and_remove() {
        let mut db = Database::open_in_memory(sample_metadata()).unwrap();
        db.insert_documents("product", &products()).unwrap();
        db.insert("product", &json!({"id": "p1", "name": "Renamed"})).unwrap();
        db.insert("country", &json!({"id": 7, "name": "Italy"})).unwrap();

        let stats = db.stats().unwrap();
        assert_eq!(stats.document_count, 4);
        assert_eq!(stats.entities.get("product"), Some(&3));

        assert!(db.remove("country", "7").unwrap());
        assert!(!db.remove("country", "7").unwrap());
    }

    #[test]
    fn test_insert_rejects_bad_input() {
        let mut db = Database::open_in_memory(sample_metadata()).unwrap();
        assert!(db.insert("product", &json!({"name": "no id"})).is_err());
        assert!(db.insert("order", &json!({"id": "o1"})).is_err());
    }

    #[test]
    fn test_filter_sort_and_limit() {
        let repository = repository();
        let mut q = query(&repository);
        q.and_where("active = true")
            .unwrap()
            .order_by("price", SortDirection::Desc)
            .unwrap();

        let result = q.search().unwrap();
        assert_eq!(ids(&result.entities), vec!["p1", "p2"]);
        assert_eq!(result.total, 2);

        q.limit(1);
        let result = q.search().unwrap();
        assert_eq!(ids(&result.entities), vec!["p1"]);
        assert_eq!(result.total, 2);
        assert_eq!(q.count().unwrap(), 2);
    }

    #[test]
    fn test_to_one_and_to_many_paths() {
        let repository = repository();

        let mut q = query(&repository);
        q.and_where("manufacturer.country.iso = 'DE'").unwrap();
        assert_eq!(q.get_ids().unwrap(), vec!["p1", "p3"]);

        let mut q = query(&repository);
        q.and_where("categories.name = 'Winter'").unwrap();
        assert_eq!(q.get_ids().unwrap(), vec!["p2"]);

        let mut q = query(&repository);
        q.with_alias("categories", "c")
            .unwrap()
            .and_where("c.active = false")
            .unwrap();
        assert_eq!(q.get_ids().unwrap(), vec!["p2"]);
    }

    #[test]
    fn test_or_groups_and_negation() {
        let repository = repository();

        let mut q = query(&repository);
        q.or_where_group(|g| {
            g.and_where("stock = 0")?.and_where("price > 50")?;
            Ok(())
        })
        .unwrap();
        assert_eq!(q.get_ids().unwrap(), vec!["p2", "p3"]);

        // p3 has no status and still differs from 'new'
        let mut q = query(&repository);
        q.and_where("status != 'new'").unwrap();
        assert_eq!(q.get_ids().unwrap(), vec!["p2", "p3"]);

        let mut q = query(&repository);
        q.where_null("status").unwrap();
        assert_eq!(q.get_ids().unwrap(), vec!["p3"]);
    }

    #[test]
    fn test_string_matching_escapes_wildcards() {
        let repository = repository();

        let mut q = query(&repository);
        q.and_where("name contains '100%'").unwrap();
        assert_eq!(q.get_ids().unwrap(), vec!["p2"]);

        // `_` is literal, not a single-character wildcard
        let mut q = query(&repository);
        q.and_where("name contains 'S_oes'").unwrap();
        assert!(q.get_ids().unwrap().is_empty());

        let mut q = query(&repository);
        q.where_starts_with("name", "Sh").unwrap();
        assert_eq!(q.get_ids().unwrap(), vec!["p1", "p3"]);

        let mut q = query(&repository);
        q.where_ends_with("name", "es").unwrap();
        assert_eq!(q.get_ids().unwrap(), vec!["p3"]);
    }

    #[test]
    fn test_in_lists_and_parameters() {
        let repository = repository();

        let mut q = query(&repository);
        q.and_where("id IN (:a, :b)")
            .unwrap()
            .set_parameters(vec![("a", "p1"), ("b", "p3")])
            .unwrap();
        assert_eq!(q.get_ids().unwrap(), vec!["p1", "p3"]);

        let mut q = query(&repository);
        q.where_in("id", Vec::<String>::new()).unwrap();
        assert!(!q.exists().unwrap());

        let mut q = query(&repository);
        q.where_not_in("id", vec!["p1"]).unwrap();
        assert_eq!(q.count().unwrap(), 2);
    }

    #[test]
    fn test_projection_keeps_only_requested_associations() {
        let repository = repository();

        let mut q = query(&repository);
        q.and_where("id = 'p1'").unwrap();
        let plain = q.first().unwrap().unwrap();
        assert!(plain.get("manufacturer").is_none());
        assert!(plain.get("categories").is_none());

        let mut q = query(&repository);
        q.and_where("id = 'p1'").unwrap().with("manufacturer").unwrap();
        let loaded = q.first().unwrap().unwrap();
        assert_eq!(loaded["manufacturer"]["name"], "Acme");
        assert!(loaded["manufacturer"].get("country").is_none());

        let mut q = query(&repository);
        q.and_where("id = 'p1'")
            .unwrap()
            .with("manufacturer.country")
            .unwrap();
        let nested = q.first().unwrap().unwrap();
        assert_eq!(nested["manufacturer"]["country"]["iso"], "DE");
    }

    #[test]
    fn test_association_criteria_restrict_loaded_items() {
        let repository = repository();

        let mut q = query(&repository);
        q.and_where("id = 'p2'")
            .unwrap()
            .with_criteria("categories", |c| {
                c.and_where("active = true")?.limit(1);
                Ok(())
            })
            .unwrap();
        let product = q.first().unwrap().unwrap();
        assert_eq!(product["categories"], json!([{"id": "c1", "name": "Clothing", "active": true}]));

        let mut q = query(&repository);
        q.and_where("id = 'p2'")
            .unwrap()
            .with_criteria("categories", |c| {
                c.order_by("name", SortDirection::Desc)?.limit(1);
                Ok(())
            })
            .unwrap();
        let product = q.first().unwrap().unwrap();
        assert_eq!(product["categories"][0]["name"], "Winter");
        assert_eq!(product["categories"].as_array().unwrap().len(), 1);

        // Root matches are not narrowed by association criteria
        let mut q = query(&repository);
        q.order_by("id", SortDirection::Asc)
            .unwrap()
            .with_criteria("manufacturer", |m| {
                m.and_where("name = 'Acme'")?;
                Ok(())
            })
            .unwrap();
        let result = q.search().unwrap();
        assert_eq!(ids(&result.entities), vec!["p1", "p2", "p3"]);
        assert_eq!(result.entities[0]["manufacturer"]["name"], "Acme");
        assert!(result.entities[1]["manufacturer"].is_null());
    }

    #[test]
    fn test_association_aggregations_are_rejected() {
        let repository = repository();
        let mut q = query(&repository);
        q.with_criteria("categories", |c| {
            c.add_count(None, "categories")?;
            Ok(())
        })
        .unwrap();
        assert!(matches!(q.search(), Err(QueryError::Usage(_))));
    }

    #[test]
    fn test_aggregations_ignore_paging() {
        let repository = repository();

        let mut q = query(&repository);
        q.add_count(None, "products")
            .unwrap()
            .add_sum("stock", "stock")
            .unwrap()
            .add_max("price", "max_price")
            .unwrap()
            .limit(1);

        let result = q.search().unwrap();
        assert_eq!(result.entities.len(), 1);
        assert_eq!(result.aggregations["products"].value, json!(3));
        assert_eq!(result.aggregations["stock"].value, json!(15));
        assert_eq!(result.aggregations["max_price"].value, json!(60.0));
    }

    #[test]
    fn test_paginated_results() {
        let repository = repository();

        let mut q = query(&repository);
        q.order_by("id", SortDirection::Asc).unwrap().paginate(2, 2).unwrap();

        let page = q.get_paginated().unwrap();
        assert_eq!(ids(&page.data), vec!["p3"]);
        assert_eq!(page.total, 3);
        assert_eq!(page.last_page, 2);
        assert!(!page.has_more_pages);
    }

    #[test]
    fn test_to_many_sort_is_rejected() {
        let repository = repository();
        let mut q = query(&repository);
        q.order_by("categories.name", SortDirection::Asc).unwrap();
        assert!(matches!(q.get(), Err(QueryError::Usage(_))));
    }
}

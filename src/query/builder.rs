//! Fluent query builder
//!
//! A `QueryBuilder` accumulates conditions, OR-groups, associations,
//! sortings, aggregations and paging for one entity. Nested scopes (where
//! groups, association criteria) are child builders that start from a
//! snapshot of the parent's alias map.

use regex::Regex;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use super::condition::{Condition, ConditionGroup, ConditionLeaf};
use super::pagination::{Paginated, Pagination};
use super::parameters::ParameterStore;
use crate::criteria::{Aggregation, AggregationKind, Criteria, CriteriaCompiler, FieldSorting, SortDirection};
use crate::error::{QueryError, Result};
use crate::index::{Repository, SearchResult};
use crate::parser::{self, Combinator};
use crate::schema::{EntityMetadata, IDENTITY_FIELD};
use crate::value::Value;

lazy_static::lazy_static! {
    static ref ALIAS_REGEX: Regex = Regex::new(r"^[A-Za-z_]\w*$").unwrap();
}

/// A registered association and its optional scoped builder
pub type AssociationEntry = (String, Option<QueryBuilder>);

pub struct QueryBuilder {
    entity: String,
    metadata: Arc<dyn EntityMetadata>,
    repository: Option<Arc<dyn Repository>>,

    /// Alias naming this builder's own entity (set for aliased association scopes)
    own_alias: Option<String>,

    /// alias -> association path
    aliases: BTreeMap<String, String>,

    /// Top-level conditions, implicitly AND'd
    conditions: Vec<Condition>,

    /// Each entry is OR'd internally and AND'd with everything else
    or_groups: Vec<Vec<Condition>>,

    associations: Vec<AssociationEntry>,
    sortings: Vec<FieldSorting>,
    limit: Option<usize>,
    offset: Option<usize>,
    pagination: Option<Pagination>,
    aggregations: Vec<Aggregation>,
    parameters: ParameterStore,
}

impl QueryBuilder {
    pub fn new(entity: &str, metadata: Arc<dyn EntityMetadata>) -> Result<Self> {
        if !metadata.has_entity(entity) {
            return Err(QueryError::UnknownEntity(entity.to_string()));
        }

        Ok(Self {
            entity: entity.to_string(),
            metadata,
            repository: None,
            own_alias: None,
            aliases: BTreeMap::new(),
            conditions: Vec::new(),
            or_groups: Vec::new(),
            associations: Vec::new(),
            sortings: Vec::new(),
            limit: None,
            offset: None,
            pagination: None,
            aggregations: Vec::new(),
            parameters: ParameterStore::new(),
        })
    }

    /// Attach the repository used by the execution helpers
    pub fn with_repository(mut self, repository: Arc<dyn Repository>) -> Self {
        self.repository = Some(repository);
        self
    }

    /// A fresh builder for a nested scope. The alias map is copied, so
    /// aliases registered on `self` afterwards are not visible to it.
    fn child(&self, entity: &str, own_alias: Option<String>) -> QueryBuilder {
        QueryBuilder {
            entity: entity.to_string(),
            metadata: Arc::clone(&self.metadata),
            repository: None,
            own_alias,
            aliases: self.aliases.clone(),
            conditions: Vec::new(),
            or_groups: Vec::new(),
            associations: Vec::new(),
            sortings: Vec::new(),
            limit: None,
            offset: None,
            pagination: None,
            aggregations: Vec::new(),
            parameters: ParameterStore::new(),
        }
    }

    // ------------------------------------------------------------------
    // Conditions
    // ------------------------------------------------------------------

    /// Add a condition string. Compound strings (`a = 1 AND b = 2`) become
    /// one group with their combinator.
    pub fn and_where(&mut self, expression: &str) -> Result<&mut Self> {
        let condition = self.condition_from_expression(expression)?;
        self.conditions.push(condition);
        Ok(self)
    }

    /// Add a nested AND group built by `callback`
    pub fn and_where_group<F>(&mut self, callback: F) -> Result<&mut Self>
    where
        F: FnOnce(&mut QueryBuilder) -> Result<()>,
    {
        self.where_group(callback, Combinator::And)
    }

    /// Add a nested group built by `callback`, joined by `combinator`
    pub fn where_group<F>(&mut self, callback: F, combinator: Combinator) -> Result<&mut Self>
    where
        F: FnOnce(&mut QueryBuilder) -> Result<()>,
    {
        let expressions = self.collect_scope(callback)?;
        if !expressions.is_empty() {
            self.conditions
                .push(ConditionGroup::new(expressions, combinator)?.into());
        }
        Ok(self)
    }

    /// Add a condition string as a new OR-group
    pub fn or_where(&mut self, expression: &str) -> Result<&mut Self> {
        let condition = self.condition_from_expression(expression)?;
        self.or_groups.push(vec![condition]);
        Ok(self)
    }

    /// Add the conditions built by `callback` as one OR-group: each of them
    /// is one alternative
    pub fn or_where_group<F>(&mut self, callback: F) -> Result<&mut Self>
    where
        F: FnOnce(&mut QueryBuilder) -> Result<()>,
    {
        let expressions = self.collect_scope(callback)?;
        if !expressions.is_empty() {
            self.or_groups.push(expressions);
        }
        Ok(self)
    }

    /// Add one condition without going through the expression parser
    pub fn where_condition(
        &mut self,
        field: &str,
        operator: &str,
        value: impl Into<Value>,
    ) -> Result<&mut Self> {
        let leaf = self.leaf(field, operator, value.into())?;
        self.conditions.push(leaf);
        Ok(self)
    }

    /// `field >= min` and `field <= max` as two top-level conditions
    pub fn where_between(
        &mut self,
        field: &str,
        min: impl Into<Value>,
        max: impl Into<Value>,
    ) -> Result<&mut Self> {
        self.where_condition(field, ">=", min)?;
        self.where_condition(field, "<=", max)
    }

    pub fn where_in(&mut self, field: &str, values: impl Into<Value>) -> Result<&mut Self> {
        self.where_condition(field, "in", values)
    }

    pub fn where_not_in(&mut self, field: &str, values: impl Into<Value>) -> Result<&mut Self> {
        self.where_condition(field, "not in", values)
    }

    pub fn where_null(&mut self, field: &str) -> Result<&mut Self> {
        self.where_condition(field, "is null", Value::Null)
    }

    pub fn where_not_null(&mut self, field: &str) -> Result<&mut Self> {
        self.where_condition(field, "is not null", Value::Null)
    }

    pub fn where_starts_with(&mut self, field: &str, prefix: impl Into<Value>) -> Result<&mut Self> {
        self.where_condition(field, "starts with", prefix)
    }

    pub fn where_ends_with(&mut self, field: &str, suffix: impl Into<Value>) -> Result<&mut Self> {
        self.where_condition(field, "ends with", suffix)
    }

    fn condition_from_expression(&self, expression: &str) -> Result<Condition> {
        let parsed = parser::parse(expression)?;

        let mut leaves = parsed
            .conditions
            .into_iter()
            .map(|c| self.leaf(&c.field, &c.operator, c.value))
            .collect::<Result<Vec<_>>>()?;

        match parsed.operator {
            Some(combinator) if parsed.is_compound => {
                Ok(ConditionGroup::new(leaves, combinator)?.into())
            }
            _ => leaves
                .pop()
                .ok_or_else(|| QueryError::parse(expression, "no condition found")),
        }
    }

    fn leaf(&self, field: &str, operator: &str, value: Value) -> Result<Condition> {
        let resolved = self.resolve_property_with_alias(field)?;
        Ok(ConditionLeaf::new(resolved, operator, value)?.into())
    }

    /// Run `callback` on a child scope of the same entity and return its
    /// conditions. The child's OR-groups are folded in as OR groups. Its
    /// parameters, aliases, associations, sortings and aggregations are
    /// carried over to `self`; paging inside a group is rejected.
    fn collect_scope<F>(&mut self, callback: F) -> Result<Vec<Condition>>
    where
        F: FnOnce(&mut QueryBuilder) -> Result<()>,
    {
        let mut scope = self.child(&self.entity, self.own_alias.clone());
        callback(&mut scope)?;

        if scope.limit.is_some() || scope.offset.is_some() || scope.pagination.is_some() {
            return Err(QueryError::usage(
                "limit, offset and paginate apply to the whole query, set them outside where groups",
            ));
        }

        self.parameters = self.parameters.layered(&scope.parameters);
        self.aliases.extend(scope.aliases);
        for (path, nested) in scope.associations {
            self.store_association(path, nested);
        }
        self.sortings.extend(scope.sortings);
        for aggregation in scope.aggregations {
            self.push_aggregation(aggregation);
        }

        let mut expressions = scope.conditions;
        for mut group in scope.or_groups {
            if group.len() == 1 {
                expressions.append(&mut group);
            } else {
                expressions.push(ConditionGroup::new(group, Combinator::Or)?.into());
            }
        }
        Ok(expressions)
    }

    // ------------------------------------------------------------------
    // Associations and aliases
    // ------------------------------------------------------------------

    /// Eager-load an association (dotted paths load nested associations)
    pub fn with(&mut self, association: &str) -> Result<&mut Self> {
        self.add_association(association, None)?;
        Ok(self)
    }

    /// Load an association and register `alias` for it
    pub fn with_alias(&mut self, association: &str, alias: &str) -> Result<&mut Self> {
        self.add_association(association, Some(alias))?;
        Ok(self)
    }

    /// Load an association and restrict it with a scoped builder
    pub fn with_criteria<F>(&mut self, association: &str, callback: F) -> Result<&mut Self>
    where
        F: FnOnce(&mut QueryBuilder) -> Result<()>,
    {
        let (path, target) = self.add_association(association, None)?;
        let mut scope = self.child(&target, None);
        callback(&mut scope)?;
        self.store_association(path, Some(scope));
        Ok(self)
    }

    /// Aliased variant of [`with_criteria`](Self::with_criteria). The alias
    /// is registered before `callback` runs.
    pub fn with_alias_criteria<F>(
        &mut self,
        association: &str,
        alias: &str,
        callback: F,
    ) -> Result<&mut Self>
    where
        F: FnOnce(&mut QueryBuilder) -> Result<()>,
    {
        let (path, target) = self.add_association(association, Some(alias))?;
        let mut scope = self.child(&target, Some(alias.to_string()));
        callback(&mut scope)?;
        self.store_association(path, Some(scope));
        Ok(self)
    }

    /// Resolve, register and (optionally) alias an association path.
    /// Returns the resolved path and its target entity.
    fn add_association(&mut self, association: &str, alias: Option<&str>) -> Result<(String, String)> {
        let (path, target) = self.resolve_association_path(association)?;

        if let Some(alias) = alias {
            if !ALIAS_REGEX.is_match(alias) {
                return Err(QueryError::usage(format!(
                    "invalid alias '{}': expected a single word",
                    alias
                )));
            }
            tracing::debug!(entity = %self.entity, alias, path = %path, "registered alias");
            self.aliases.insert(alias.to_string(), path.clone());
        }

        tracing::debug!(entity = %self.entity, path = %path, target = %target, "registered association");
        self.store_association(path.clone(), None);
        Ok((path, target))
    }

    /// Keep registration order; a later scoped registration replaces an
    /// unscoped one, never the other way round
    fn store_association(&mut self, path: String, scope: Option<QueryBuilder>) {
        match self.associations.iter_mut().find(|(p, _)| *p == path) {
            Some(entry) => {
                if scope.is_some() {
                    entry.1 = scope;
                }
            }
            None => self.associations.push((path, scope)),
        }
    }

    /// Expand an alias prefix and check that every segment is an
    /// association. Returns the expanded path and the final target entity.
    fn resolve_association_path(&self, association: &str) -> Result<(String, String)> {
        let path = self.expand_alias(association);

        let mut entity = self.entity.clone();
        for segment in path.split('.') {
            let info = self
                .metadata
                .association_info(&entity, segment)
                .ok_or_else(|| QueryError::InvalidAssociation {
                    entity: entity.clone(),
                    association: segment.to_string(),
                    available: self.metadata.available_associations(&entity),
                })?;
            entity = info.entity;
        }

        Ok((path, entity))
    }

    fn expand_alias(&self, path: &str) -> String {
        match path.split_once('.') {
            Some((prefix, rest)) if self.own_alias.as_deref() == Some(prefix) => rest.to_string(),
            Some((prefix, rest)) => match self.aliases.get(prefix) {
                Some(target) => format!("{}.{}", target, rest),
                None => path.to_string(),
            },
            None => self
                .aliases
                .get(path)
                .cloned()
                .unwrap_or_else(|| path.to_string()),
        }
    }

    /// Resolve a field reference to a path relative to this builder's entity.
    ///
    /// - `alias.rest` where `alias` names this scope: `rest`, validated here
    /// - `alias.rest` with a registered alias: the alias path joined with
    ///   `rest`, not validated further
    /// - anything else: validated as a (possibly nested) property
    pub fn resolve_property_with_alias(&self, property: &str) -> Result<String> {
        if let Some((prefix, rest)) = property.split_once('.') {
            if self.own_alias.as_deref() == Some(prefix) {
                self.validate_property(rest)?;
                return Ok(rest.to_string());
            }
            if let Some(target) = self.aliases.get(prefix) {
                return Ok(format!("{}.{}", target, rest));
            }
        }

        self.validate_property(property)?;
        Ok(property.to_string())
    }

    /// Walk a dotted property path through associations
    fn validate_property(&self, path: &str) -> Result<()> {
        let segments: Vec<&str> = path.split('.').collect();
        let mut entity = self.entity.clone();

        for (idx, segment) in segments.iter().enumerate() {
            if idx + 1 == segments.len() {
                if self.metadata.has_field(&entity, segment) {
                    return Ok(());
                }
            } else if let Some(info) = self.metadata.association_info(&entity, segment) {
                entity = info.entity;
                continue;
            }

            return Err(QueryError::InvalidProperty {
                entity: entity.clone(),
                property: path.to_string(),
                available_fields: self.metadata.available_fields(&entity),
                available_associations: self.metadata.available_associations(&entity),
            });
        }

        Ok(())
    }

    // ------------------------------------------------------------------
    // Sorting, paging, aggregations, parameters
    // ------------------------------------------------------------------

    pub fn order_by(&mut self, field: &str, direction: SortDirection) -> Result<&mut Self> {
        let field = self.resolve_property_with_alias(field)?;
        self.sortings.push(FieldSorting { field, direction });
        Ok(self)
    }

    /// Explicit limit. Drops any page settings from [`paginate`](Self::paginate).
    pub fn limit(&mut self, limit: usize) -> &mut Self {
        self.limit = Some(limit);
        self.pagination = None;
        self
    }

    /// Explicit offset. Drops any page settings from [`paginate`](Self::paginate).
    pub fn offset(&mut self, offset: usize) -> &mut Self {
        self.offset = Some(offset);
        self.pagination = None;
        self
    }

    /// Set limit/offset for a 1-based page and remember the page settings
    /// for [`get_paginated`](Self::get_paginated)
    pub fn paginate(&mut self, page: usize, per_page: usize) -> Result<&mut Self> {
        if page < 1 || per_page < 1 {
            return Err(QueryError::usage(format!(
                "page and per_page must be at least 1 (got page={}, per_page={})",
                page, per_page
            )));
        }

        let pagination = Pagination { page, per_page };
        self.limit = Some(pagination.limit());
        self.offset = Some(pagination.offset());
        self.pagination = Some(pagination);
        Ok(self)
    }

    /// Count aggregation; without a field the identity field is counted
    pub fn add_count(&mut self, field: Option<&str>, name: &str) -> Result<&mut Self> {
        self.add_aggregation(AggregationKind::Count, field.unwrap_or(IDENTITY_FIELD), name)
    }

    pub fn add_sum(&mut self, field: &str, name: &str) -> Result<&mut Self> {
        self.add_aggregation(AggregationKind::Sum, field, name)
    }

    pub fn add_avg(&mut self, field: &str, name: &str) -> Result<&mut Self> {
        self.add_aggregation(AggregationKind::Avg, field, name)
    }

    pub fn add_min(&mut self, field: &str, name: &str) -> Result<&mut Self> {
        self.add_aggregation(AggregationKind::Min, field, name)
    }

    pub fn add_max(&mut self, field: &str, name: &str) -> Result<&mut Self> {
        self.add_aggregation(AggregationKind::Max, field, name)
    }

    fn add_aggregation(&mut self, kind: AggregationKind, field: &str, name: &str) -> Result<&mut Self> {
        let field = self.resolve_property_with_alias(field)?;
        self.push_aggregation(Aggregation {
            name: name.to_string(),
            kind,
            field,
        });
        Ok(self)
    }

    /// Names are unique, the latest registration wins
    fn push_aggregation(&mut self, aggregation: Aggregation) {
        match self.aggregations.iter_mut().find(|a| a.name == aggregation.name) {
            Some(existing) => *existing = aggregation,
            None => self.aggregations.push(aggregation),
        }
    }

    pub fn set_parameter(&mut self, name: &str, value: impl Into<Value>) -> Result<&mut Self> {
        self.parameters.set(name, value)?;
        Ok(self)
    }

    pub fn set_parameters<I, K, V>(&mut self, parameters: I) -> Result<&mut Self>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<Value>,
    {
        for (name, value) in parameters {
            self.parameters.set(name.as_ref(), value)?;
        }
        Ok(self)
    }

    // ------------------------------------------------------------------
    // Accessors
    // ------------------------------------------------------------------

    pub fn entity(&self) -> &str {
        &self.entity
    }

    pub fn own_alias(&self) -> Option<&str> {
        self.own_alias.as_deref()
    }

    pub fn aliases(&self) -> &BTreeMap<String, String> {
        &self.aliases
    }

    pub fn conditions(&self) -> &[Condition] {
        &self.conditions
    }

    pub fn or_groups(&self) -> &[Vec<Condition>] {
        &self.or_groups
    }

    pub fn associations(&self) -> &[AssociationEntry] {
        &self.associations
    }

    pub fn sortings(&self) -> &[FieldSorting] {
        &self.sortings
    }

    pub fn aggregations(&self) -> &[Aggregation] {
        &self.aggregations
    }

    pub fn limit_value(&self) -> Option<usize> {
        self.limit
    }

    pub fn offset_value(&self) -> Option<usize> {
        self.offset
    }

    pub fn pagination(&self) -> Option<Pagination> {
        self.pagination
    }

    pub fn parameters(&self) -> &ParameterStore {
        &self.parameters
    }

    // ------------------------------------------------------------------
    // Compilation and execution
    // ------------------------------------------------------------------

    /// Compile the accumulated state into criteria
    pub fn build(&self) -> Result<Criteria> {
        CriteriaCompiler::new().build(self)
    }

    fn repository(&self) -> Result<&Arc<dyn Repository>> {
        self.repository.as_ref().ok_or_else(|| {
            QueryError::usage("no repository attached, call with_repository() before executing")
        })
    }

    /// Execute and return entities, total and aggregation results
    pub fn search(&self) -> Result<SearchResult> {
        let repository = self.repository()?;
        let criteria = self.build()?;
        repository.search(&self.entity, &criteria)
    }

    pub fn get(&self) -> Result<Vec<serde_json::Value>> {
        Ok(self.search()?.entities)
    }

    pub fn get_ids(&self) -> Result<Vec<String>> {
        let repository = self.repository()?;
        let criteria = self.build()?;
        repository.search_ids(&self.entity, &criteria)
    }

    pub fn first(&self) -> Result<Option<serde_json::Value>> {
        let repository = self.repository()?;
        let mut criteria = self.build()?;
        criteria.limit = Some(1);
        Ok(repository.search(&self.entity, &criteria)?.entities.into_iter().next())
    }

    /// Number of matches, ignoring limit and offset
    pub fn count(&self) -> Result<usize> {
        let repository = self.repository()?;
        let criteria = self.build()?;
        repository.count(&self.entity, &criteria)
    }

    pub fn exists(&self) -> Result<bool> {
        Ok(self.count()? > 0)
    }

    /// The current page with pagination metadata. Requires [`paginate`](Self::paginate).
    pub fn get_paginated(&self) -> Result<Paginated<serde_json::Value>> {
        let pagination = self.pagination.ok_or_else(|| {
            QueryError::usage("call paginate() before requesting paginated results")
        })?;

        let result = self.search()?;
        Ok(Paginated::new(result.entities, result.total, pagination))
    }
}

impl fmt::Debug for QueryBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QueryBuilder")
            .field("entity", &self.entity)
            .field("own_alias", &self.own_alias)
            .field("aliases", &self.aliases)
            .field("conditions", &self.conditions)
            .field("or_groups", &self.or_groups)
            .field("associations", &self.associations)
            .field("sortings", &self.sortings)
            .field("limit", &self.limit)
            .field("offset", &self.offset)
            .field("aggregations", &self.aggregations)
            .field("parameters", &self.parameters)
            .finish_non_exhaustive()
    }
}

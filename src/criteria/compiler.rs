//! Builder state to criteria compilation
//!
//! Top-level conditions are AND'd. Every OR-group becomes its own top-level
//! filter, so `(A) AND (B OR C) AND (D OR E)` is what several OR-groups mean.
//! Associations compile recursively into nested criteria.

use tracing::debug;

use super::factory::FilterFactory;
use super::types::{Criteria, Filter};
use crate::error::Result;
use crate::query::{Condition, ParameterStore, QueryBuilder};

#[derive(Debug, Clone, Copy, Default)]
pub struct CriteriaCompiler {
    factory: FilterFactory,
}

impl CriteriaCompiler {
    pub fn new() -> Self {
        Self {
            factory: FilterFactory::new(),
        }
    }

    /// Compile a builder into fresh criteria
    pub fn build(&self, query: &QueryBuilder) -> Result<Criteria> {
        let criteria = self.compile(query, &ParameterStore::new())?;
        debug!(
            entity = query.entity(),
            filters = criteria.filters.len(),
            associations = criteria.associations.len(),
            "compiled criteria"
        );
        Ok(criteria)
    }

    /// Child builders see their parent's parameters, with their own taking
    /// precedence
    fn compile(&self, query: &QueryBuilder, inherited: &ParameterStore) -> Result<Criteria> {
        let parameters = inherited.layered(query.parameters());
        let mut criteria = Criteria::new();

        let mut filters = self.lower_all(query.conditions(), &parameters)?;
        match filters.len() {
            0 => {}
            1 => criteria.add_filter(filters.remove(0)),
            _ => criteria.add_filter(Filter::and(filters)),
        }

        for group in query.or_groups() {
            let mut alternatives = self.lower_all(group, &parameters)?;
            match alternatives.len() {
                0 => {}
                1 => criteria.add_filter(alternatives.remove(0)),
                _ => criteria.add_filter(Filter::or(alternatives)),
            }
        }

        for (path, scope) in query.associations() {
            let nested = match scope {
                Some(scope) => self.compile(scope, &parameters)?,
                None => Criteria::new(),
            };
            criteria.association_mut(path).merge(nested);
        }

        for sorting in query.sortings() {
            criteria.add_sorting(sorting.clone());
        }

        for aggregation in query.aggregations() {
            criteria.add_aggregation(aggregation.clone());
        }

        criteria.limit = query.limit_value();
        criteria.offset = query.offset_value();

        Ok(criteria)
    }

    fn lower_all(&self, conditions: &[Condition], parameters: &ParameterStore) -> Result<Vec<Filter>> {
        conditions
            .iter()
            .map(|condition| self.lower(condition, parameters))
            .collect()
    }

    fn lower(&self, condition: &Condition, parameters: &ParameterStore) -> Result<Filter> {
        match condition {
            Condition::Leaf(leaf) => {
                let value = parameters.resolve(leaf.value())?;
                self.factory.create(leaf.field(), leaf.operator(), value)
            }
            Condition::Group(group) => Ok(Filter::Multi {
                operator: group.combinator(),
                queries: self.lower_all(group.expressions(), parameters)?,
            }),
        }
    }
}

//! Querycraft - a fluent query builder over an entity/criteria data layer
//!
//! Chained builder calls (`and_where`, `with`, `order_by`, aggregations) are
//! accumulated into a condition tree and compiled into a [`Criteria`] graph
//! that a [`Repository`] can execute.

pub mod criteria;
pub mod error;
pub mod index;
pub mod parser;
pub mod query;
pub mod schema;
pub mod value;

#[cfg(test)]
pub(crate) mod testing;

pub use criteria::{Criteria, CriteriaCompiler, Filter};
pub use error::{QueryError, Result};
pub use index::{Database, Repository};
pub use parser::{Combinator, FilterType};
pub use query::{Condition, QueryBuilder, SortDirection};
pub use schema::{EntityMetadata, Schema};
pub use value::Value;

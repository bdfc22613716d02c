//! Criteria - the compiled, storage-agnostic form of a query

mod compiler;
mod factory;
mod types;

pub use compiler::CriteriaCompiler;
pub use factory::FilterFactory;
pub use types::{
    Aggregation, AggregationKind, Criteria, FieldSorting, Filter, RangeBound, SortDirection,
};

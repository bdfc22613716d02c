//! Query builder state - conditions, associations, aliases, paging and
//! parameters accumulated before compilation

mod builder;
mod condition;
mod pagination;
mod parameters;

pub use builder::{AssociationEntry, QueryBuilder};
pub use condition::{Condition, ConditionGroup, ConditionLeaf};
pub use pagination::{Paginated, Pagination};
pub use parameters::ParameterStore;

pub use crate::criteria::SortDirection;

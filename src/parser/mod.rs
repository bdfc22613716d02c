//! Parser module - expression strings, operator table and literal coercion

pub mod expression;
pub mod literal;
pub mod operators;

pub use expression::{
    extract_parameter_name, is_compound_expression, is_parameter, parse, ParsedCondition,
    ParsedExpression,
};
pub use operators::{Combinator, FilterType};

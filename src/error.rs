//! Error types for parsing, resolution, compilation and execution

use thiserror::Error;

/// Every failure the query pipeline can surface.
///
/// Errors are raised where they are detected and propagate unchanged to the
/// caller; nothing in the pipeline retries or substitutes defaults.
#[derive(Debug, Error)]
pub enum QueryError {
    /// Malformed or ambiguous expression string
    #[error("malformed expression '{expression}': {reason}")]
    Parse { expression: String, reason: String },

    #[error(
        "property '{property}' does not exist on entity '{entity}'. Available fields: [{}]. Available associations: [{}]",
        .available_fields.join(", "),
        .available_associations.join(", ")
    )]
    InvalidProperty {
        entity: String,
        property: String,
        available_fields: Vec<String>,
        available_associations: Vec<String>,
    },

    #[error(
        "association '{association}' does not exist on entity '{entity}'. Available associations: [{}]",
        .available.join(", ")
    )]
    InvalidAssociation {
        entity: String,
        association: String,
        available: Vec<String>,
    },

    #[error("unknown entity '{0}'")]
    UnknownEntity(String),

    #[error("unknown operator '{operator}'. Supported operators: {}", .supported.join(", "))]
    InvalidOperator {
        operator: String,
        supported: Vec<String>,
    },

    #[error("invalid parameter name '{0}': expected [A-Za-z_] followed by word characters")]
    InvalidParameterName(String),

    #[error("parameter '{0}' is not set")]
    MissingParameter(String),

    /// Programmer error: a precondition of the called operation does not hold
    #[error("{0}")]
    Usage(String),

    #[error("storage error: {0}")]
    Storage(#[from] rusqlite::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl QueryError {
    pub(crate) fn parse(expression: &str, reason: impl Into<String>) -> Self {
        QueryError::Parse {
            expression: expression.to_string(),
            reason: reason.into(),
        }
    }

    pub(crate) fn usage(message: impl Into<String>) -> Self {
        QueryError::Usage(message.into())
    }
}

pub type Result<T, E = QueryError> = std::result::Result<T, E>;

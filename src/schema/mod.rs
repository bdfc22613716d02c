//! Schema module - entity metadata loaded from schema.yaml

mod types;
pub mod loader;
mod metadata;
mod validator;

pub use types::*;
pub use loader::{create_default_schema, load_schema, parse_schema, IDENTITY_FIELD};
pub use metadata::{AssociationInfo, EntityMetadata};
pub use validator::{validate_schema, ValidationError};

//! Shared fixtures for unit tests

use std::sync::Arc;

use crate::schema::{parse_schema, EntityMetadata, Schema};

pub(crate) const SAMPLE_SCHEMA: &str = r#"
entities:
  product:
    fields:
      name:
        type: string
      stock:
        type: int
      price:
        type: float
      active:
        type: bool
      status:
        type: string
      releaseDate:
        type: date
    associations:
      manufacturer:
        entity: product_manufacturer
        cardinality: many_to_one
      categories:
        entity: category
        cardinality: many_to_many
  product_manufacturer:
    fields:
      name:
        type: string
    associations:
      country:
        entity: country
        cardinality: many_to_one
  country:
    fields:
      name:
        type: string
      iso:
        type: string
  category:
    fields:
      name:
        type: string
      active:
        type: bool
"#;

pub(crate) fn sample_schema() -> Schema {
    parse_schema(SAMPLE_SCHEMA).unwrap()
}

pub(crate) fn sample_metadata() -> Arc<dyn EntityMetadata> {
    Arc::new(sample_schema())
}

//! Schema loader - parses schema.yaml

use anyhow::{Context, Result};
use std::path::Path;

use super::{FieldDefinition, FieldType, Schema};

/// Name of the identity field every entity carries
pub const IDENTITY_FIELD: &str = "id";

/// Load schema from a project's schema.yaml
pub fn load_schema(root: &Path) -> Result<Schema> {
    let schema_path = root.join("schema.yaml");

    if !schema_path.exists() {
        // No entities: every builder will fail with an unknown entity
        return Ok(Schema::default());
    }

    let contents = std::fs::read_to_string(&schema_path)
        .with_context(|| format!("Failed to read schema file: {}", schema_path.display()))?;

    parse_schema(&contents)
        .with_context(|| format!("Failed to parse schema file: {}", schema_path.display()))
}

/// Parse schema YAML and fill in implicit fields
pub fn parse_schema(contents: &str) -> Result<Schema> {
    let mut schema: Schema = serde_yaml::from_str(contents)?;

    // Ensure every entity has its identity field
    for entity in schema.entities.values_mut() {
        entity
            .fields
            .entry(IDENTITY_FIELD.to_string())
            .or_insert(FieldDefinition {
                field_type: FieldType::Id,
            });
    }

    Ok(schema)
}

/// Create a default schema.yaml file
pub fn create_default_schema(root: &Path) -> Result<()> {
    let schema_path = root.join("schema.yaml");

    let default_schema = r#"# Querycraft Schema
# Declare entities, their fields and associations here.
# Every entity implicitly has an `id` field.

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

    std::fs::write(&schema_path, default_schema)
        .with_context(|| format!("Failed to write schema file: {}", schema_path.display()))?;

    Ok(())
}

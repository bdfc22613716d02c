//! Schema validator - checks entity definitions for dangling references

use super::Schema;

/// Validation error with context
#[derive(Debug, Clone)]
pub struct ValidationError {
    pub entity: String,
    pub property: String,
    pub message: String,
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}: {}", self.entity, self.property, self.message)
    }
}

/// Validate every entity of a schema
pub fn validate_schema(schema: &Schema) -> Vec<ValidationError> {
    let mut errors = Vec::new();

    for (entity_name, entity) in &schema.entities {
        for (name, assoc) in &entity.associations {
            // Association targets must be declared entities
            if !schema.entities.contains_key(&assoc.entity) {
                errors.push(ValidationError {
                    entity: entity_name.clone(),
                    property: name.clone(),
                    message: format!("Association targets unknown entity '{}'", assoc.entity),
                });
            }

            if entity.fields.contains_key(name) {
                errors.push(ValidationError {
                    entity: entity_name.clone(),
                    property: name.clone(),
                    message: "Declared both as field and association".to_string(),
                });
            }
        }

        for name in entity.fields.keys().chain(entity.associations.keys()) {
            if name.contains('.') {
                errors.push(ValidationError {
                    entity: entity_name.clone(),
                    property: name.clone(),
                    message: "Property names cannot contain '.'".to_string(),
                });
            }
        }
    }

    errors
}

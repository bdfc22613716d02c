//! Entity metadata lookups used for property and association validation

use serde::Serialize;

use super::{Cardinality, Schema};

/// Resolved association target
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AssociationInfo {
    pub property_name: String,
    pub entity: String,
    pub cardinality: Cardinality,
}

/// Read-only view over entity definitions.
///
/// Field lookups count associations as fields: `has_field` is true for both,
/// `is_association` tells them apart.
pub trait EntityMetadata {
    fn has_entity(&self, entity: &str) -> bool;

    fn has_field(&self, entity: &str, field: &str) -> bool;

    fn is_association(&self, entity: &str, field: &str) -> bool;

    fn association_info(&self, entity: &str, field: &str) -> Option<AssociationInfo>;

    /// Scalar field names, sorted
    fn available_fields(&self, entity: &str) -> Vec<String>;

    /// Association names, sorted
    fn available_associations(&self, entity: &str) -> Vec<String>;
}

impl EntityMetadata for Schema {
    fn has_entity(&self, entity: &str) -> bool {
        self.entities.contains_key(entity)
    }

    fn has_field(&self, entity: &str, field: &str) -> bool {
        self.entities
            .get(entity)
            .map_or(false, |def| def.has_property(field))
    }

    fn is_association(&self, entity: &str, field: &str) -> bool {
        self.entities
            .get(entity)
            .map_or(false, |def| def.associations.contains_key(field))
    }

    fn association_info(&self, entity: &str, field: &str) -> Option<AssociationInfo> {
        let assoc = self.entities.get(entity)?.associations.get(field)?;
        Some(AssociationInfo {
            property_name: field.to_string(),
            entity: assoc.entity.clone(),
            cardinality: assoc.cardinality,
        })
    }

    fn available_fields(&self, entity: &str) -> Vec<String> {
        self.entities
            .get(entity)
            .map(|def| def.fields.keys().cloned().collect())
            .unwrap_or_default()
    }

    fn available_associations(&self, entity: &str) -> Vec<String> {
        self.entities
            .get(entity)
            .map(|def| def.associations.keys().cloned().collect())
            .unwrap_or_default()
    }
}

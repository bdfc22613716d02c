//! Schema type definitions

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// The complete entity schema loaded from schema.yaml
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Schema {
    #[serde(default)]
    pub entities: BTreeMap<String, EntityDefinition>,
}

/// Definition of an entity (product, manufacturer, category, etc.)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EntityDefinition {
    #[serde(default)]
    pub fields: BTreeMap<String, FieldDefinition>,

    #[serde(default)]
    pub associations: BTreeMap<String, AssociationDefinition>,
}

/// Definition of a scalar field
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FieldDefinition {
    #[serde(rename = "type")]
    pub field_type: FieldType,
}

/// Field types supported by the schema
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum FieldType {
    Id,
    String,
    Int,
    Float,
    Bool,
    Date,
    Datetime,
    Json,
}

/// Definition of an association to another entity
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssociationDefinition {
    /// Target entity name
    pub entity: String,

    #[serde(default)]
    pub cardinality: Cardinality,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Cardinality {
    OneToOne,
    #[default]
    ManyToOne,
    OneToMany,
    ManyToMany,
}

impl Cardinality {
    /// To-many associations are embedded as collections
    pub fn is_to_many(self) -> bool {
        matches!(self, Cardinality::OneToMany | Cardinality::ManyToMany)
    }
}

impl EntityDefinition {
    /// Fields and associations share one namespace on an entity
    pub fn has_property(&self, name: &str) -> bool {
        self.fields.contains_key(name) || self.associations.contains_key(name)
    }
}

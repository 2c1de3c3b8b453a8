//! Descriptor types for the YAML data model.
//!
//! Nodes, relationships and properties are plain value-typed descriptors,
//! deserialized straight from the model documents.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Declared type of a node or edge property.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum PropType {
    #[default]
    String,
    Int,
    Float,
    Boolean,
    Date,
    DateTime,
    Array,
    Object,
}

impl PropType {
    /// Name as written in the model documents.
    pub fn name(&self) -> &'static str {
        match self {
            PropType::String => "String",
            PropType::Int => "Int",
            PropType::Float => "Float",
            PropType::Boolean => "Boolean",
            PropType::Date => "Date",
            PropType::DateTime => "DateTime",
            PropType::Array => "Array",
            PropType::Object => "Object",
        }
    }
}

/// Cardinality constraint on a relationship.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Multiplicity {
    OneToOne,
    OneToMany,
    ManyToOne,
    ManyToMany,
}

impl Multiplicity {
    /// Name as written in the model documents.
    pub fn name(&self) -> &'static str {
        match self {
            Multiplicity::OneToOne => "one_to_one",
            Multiplicity::OneToMany => "one_to_many",
            Multiplicity::ManyToOne => "many_to_one",
            Multiplicity::ManyToMany => "many_to_many",
        }
    }

    /// Multiplicities under which a child keeps at most one outgoing edge of
    /// a given label, so an existing edge must be replaced or rejected.
    pub fn is_single_parent(&self) -> bool {
        matches!(self, Multiplicity::OneToOne | Multiplicity::ManyToOne)
    }
}

/// Descriptor for a single declared property.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct PropertyDescriptor {
    /// Declared value type
    #[serde(rename = "type", default)]
    pub prop_type: PropType,
    /// Whether the property must be present and non-empty
    #[serde(default)]
    pub required: bool,
    /// Allowed values for String properties
    #[serde(rename = "enum", skip_serializing_if = "Option::is_none")]
    pub enum_values: Option<Vec<String>>,
    /// Inclusive lower bound for numeric properties
    #[serde(skip_serializing_if = "Option::is_none")]
    pub minimum: Option<f64>,
    /// Inclusive upper bound for numeric properties
    #[serde(skip_serializing_if = "Option::is_none")]
    pub maximum: Option<f64>,
    /// Measurement unit; generates a `<prop>_unit` sibling property
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unit: Option<String>,
}

/// Descriptor for a node kind.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct NodeDescriptor {
    /// Property name to descriptor
    #[serde(default)]
    pub props: BTreeMap<String, PropertyDescriptor>,
}

/// One (source, target) pair a relationship connects.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelationshipEnd {
    /// Child node kind the edge starts from
    pub source: String,
    /// Parent node kind the edge points to
    pub target: String,
}

/// Descriptor for an edge label.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelationshipDescriptor {
    /// Cardinality constraint
    pub multiplicity: Multiplicity,
    /// Node-kind pairs this label connects
    pub ends: Vec<RelationshipEnd>,
    /// Properties carried on the edge itself
    #[serde(default)]
    pub props: BTreeMap<String, PropertyDescriptor>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_property_descriptor_defaults() {
        let d: PropertyDescriptor = serde_yaml::from_str("{}").unwrap();
        assert_eq!(d.prop_type, PropType::String);
        assert!(!d.required);
        assert!(d.enum_values.is_none());
    }

    #[test]
    fn test_relationship_descriptor_yaml() {
        let yaml = r#"
multiplicity: many_to_one
ends:
  - source: sample
    target: case
props:
  collection_date: { type: Date }
"#;
        let d: RelationshipDescriptor = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(d.multiplicity, Multiplicity::ManyToOne);
        assert!(d.multiplicity.is_single_parent());
        assert_eq!(d.ends.len(), 1);
        assert_eq!(d.props["collection_date"].prop_type, PropType::Date);
    }
}

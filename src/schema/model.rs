//! The merged schema model: node kinds, relationships and loader properties.
//!
//! Built from a sequence of YAML documents; later documents override earlier
//! ones key by key. All typing questions the rest of the engine asks are
//! answered here.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;
use uuid::Uuid;

use super::props::GraphProperties;
use super::types::{Multiplicity, NodeDescriptor, PropType, PropertyDescriptor, RelationshipDescriptor};
use crate::coerce;
use crate::value::Value;

/// Reserved column naming the row's node kind.
pub const TYPE_COLUMN: &str = "type";

/// Property under which generated identity is stored.
pub const UUID_FIELD: &str = "uuid";

/// Errors raised while building a schema model.
#[derive(Error, Debug)]
pub enum SchemaError {
    /// A schema file could not be read
    #[error("cannot read schema file {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },

    /// A schema file could not be parsed
    #[error("cannot parse schema file {path}: {source}")]
    Yaml {
        path: String,
        source: serde_yaml::Error,
    },

    /// The merged documents declare no node kinds
    #[error("schema documents declare no node kinds")]
    Empty,
}

/// One YAML document of a schema sequence. A model document carries `nodes`
/// and `relationships`; a properties document carries `properties`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SchemaDocument {
    #[serde(default)]
    pub nodes: BTreeMap<String, NodeDescriptor>,
    #[serde(default)]
    pub relationships: BTreeMap<String, RelationshipDescriptor>,
    #[serde(default)]
    pub properties: Option<GraphProperties>,
}

/// A resolved relationship between two node kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RelationshipRef<'a> {
    /// Edge label
    pub label: &'a str,
    /// Cardinality constraint
    pub multiplicity: Multiplicity,
}

/// Outcome of validating one record against the model.
#[derive(Debug, Clone, Default)]
pub struct NodeValidation {
    /// No errors found (warnings may still be present)
    pub ok: bool,
    /// At least one warning found
    pub warning: bool,
    /// Human-readable findings
    pub messages: Vec<String>,
    /// (column, value) pairs for invalid data
    pub data_messages: Vec<ViolationDetail>,
    /// (column, value) pairs for invalid parent pointers
    pub rel_messages: Vec<ViolationDetail>,
    /// (column, value) pairs for parent pointers with no declared relationship
    pub undefined_relationships: Vec<ViolationDetail>,
}

/// Offending column and value of one violation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ViolationDetail {
    pub column: String,
    pub value: String,
}

impl ViolationDetail {
    fn new(column: &str, value: &str) -> Self {
        Self {
            column: column.to_string(),
            value: value.to_string(),
        }
    }
}

/// True when a column header is a parent pointer (`parent_kind.id_field`).
pub fn is_parent_pointer(column: &str) -> bool {
    column.contains('.')
}

/// Split a parent-pointer header into (parent kind, parent id field).
pub fn split_parent_pointer(column: &str) -> Option<(&str, &str)> {
    column.split_once('.')
}

/// The merged schema model.
#[derive(Debug, Clone)]
pub struct SchemaModel {
    nodes: BTreeMap<String, NodeDescriptor>,
    relationships: BTreeMap<String, RelationshipDescriptor>,
    props: GraphProperties,
}

impl SchemaModel {
    /// Build a model from YAML files fed as a sequence. Files may contain
    /// multiple `---`-separated documents.
    pub fn from_files<P: AsRef<Path>>(paths: &[P]) -> Result<Self, SchemaError> {
        let mut documents = Vec::new();
        for path in paths {
            let path = path.as_ref();
            let text = fs::read_to_string(path).map_err(|source| SchemaError::Io {
                path: path.display().to_string(),
                source,
            })?;
            for document in serde_yaml::Deserializer::from_str(&text) {
                let doc =
                    SchemaDocument::deserialize(document).map_err(|source| SchemaError::Yaml {
                        path: path.display().to_string(),
                        source,
                    })?;
                documents.push(doc);
            }
        }
        Self::from_documents(documents)
    }

    /// Merge a document sequence into a model. Later documents override
    /// earlier ones for the same node kind, edge label or properties section.
    pub fn from_documents(documents: Vec<SchemaDocument>) -> Result<Self, SchemaError> {
        let mut nodes = BTreeMap::new();
        let mut relationships = BTreeMap::new();
        let mut props = GraphProperties::default();
        for doc in documents {
            nodes.extend(doc.nodes);
            relationships.extend(doc.relationships);
            if let Some(p) = doc.properties {
                props = p;
            }
        }
        if nodes.is_empty() {
            return Err(SchemaError::Empty);
        }
        debug!(
            nodes = nodes.len(),
            relationships = relationships.len(),
            "schema model built"
        );
        Ok(Self {
            nodes,
            relationships,
            props,
        })
    }

    /// Loader properties section.
    pub fn props(&self) -> &GraphProperties {
        &self.props
    }

    /// All declared node kinds.
    pub fn nodes(&self) -> &BTreeMap<String, NodeDescriptor> {
        &self.nodes
    }

    /// Descriptor for one node kind.
    pub fn node(&self, kind: &str) -> Option<&NodeDescriptor> {
        self.nodes.get(kind)
    }

    /// Declared id property of a node kind.
    pub fn id_field(&self, kind: &str) -> Option<&str> {
        self.props.id_fields.get(kind).map(String::as_str)
    }

    /// Declared type of a property. `owner` may be a node kind or an edge
    /// label (for relationship-property columns).
    pub fn prop_type(&self, owner: &str, prop: &str) -> Option<PropType> {
        if let Some(node) = self.nodes.get(owner) {
            if let Some(d) = node.props.get(prop) {
                return Some(d.prop_type);
            }
        }
        self.relationships
            .get(owner)
            .and_then(|rel| rel.props.get(prop))
            .map(|d| d.prop_type)
    }

    /// Declared properties of a node kind.
    pub fn props_for_node(&self, kind: &str) -> Option<&BTreeMap<String, PropertyDescriptor>> {
        self.nodes.get(kind).map(|n| &n.props)
    }

    /// Find the declared relationship from `src` to `dst`.
    pub fn relationship(&self, src: &str, dst: &str) -> Option<RelationshipRef<'_>> {
        self.relationships.iter().find_map(|(label, rel)| {
            rel.ends
                .iter()
                .any(|end| end.source == src && end.target == dst)
                .then_some(RelationshipRef {
                    label: label.as_str(),
                    multiplicity: rel.multiplicity,
                })
        })
    }

    /// Descriptor for an edge label.
    pub fn relationship_by_label(&self, label: &str) -> Option<&RelationshipDescriptor> {
        self.relationships.get(label)
    }

    /// True when a column header attaches a property to an edge
    /// (`edge_label<delim>property` with a known label).
    pub fn is_relationship_property(&self, column: &str) -> bool {
        self.split_relationship_property(column).is_some()
    }

    /// Split a relationship-property header into (edge label, property).
    pub fn split_relationship_property<'a>(&self, column: &'a str) -> Option<(&'a str, &'a str)> {
        let (label, prop) = column.split_once(&self.props.rel_prop_delimiter)?;
        self.relationships.contains_key(label).then_some((label, prop))
    }

    /// Extra properties generated by a (kind, property, value) triple, such
    /// as the `<prop>_unit` sibling of a unit-bearing property.
    pub fn extra_props(&self, kind: &str, prop: &str, value: &str) -> Vec<(String, Value)> {
        let mut extras = Vec::new();
        if value.is_empty() {
            return extras;
        }
        if let Some(d) = self.nodes.get(kind).and_then(|n| n.props.get(prop)) {
            if let Some(unit) = &d.unit {
                extras.push((format!("{}_unit", prop), Value::String(unit.clone())));
            }
        }
        extras
    }

    /// Deterministic UUIDv5 in a kind-scoped namespace under the configured
    /// domain.
    pub fn uuid_for_node(&self, kind: &str, signature: &str) -> Uuid {
        let domain_ns = Uuid::new_v5(&Uuid::NAMESPACE_URL, self.props.domain.as_bytes());
        let kind_ns = Uuid::new_v5(&domain_ns, kind.as_bytes());
        Uuid::new_v5(&kind_ns, signature.as_bytes())
    }

    /// All BTREE index specifications: id fields first, then the explicit
    /// `indexes` entries of the properties document.
    pub fn index_specs(&self) -> Vec<(String, Vec<String>)> {
        let mut specs = Vec::new();
        for (kind, id_field) in &self.props.id_fields {
            specs.push((kind.clone(), vec![id_field.clone()]));
        }
        for entry in &self.props.indexes {
            for (kind, columns) in entry {
                specs.push((kind.clone(), columns.clone()));
            }
        }
        specs
    }

    /// Validate one cleaned record against the model. Values are the raw
    /// (trimmed) cell strings, pre-coercion.
    pub fn validate_node(&self, kind: &str, record: &BTreeMap<String, String>) -> NodeValidation {
        let mut v = NodeValidation::default();
        let mut errors = 0usize;
        let mut warnings = 0usize;

        let Some(node) = self.nodes.get(kind) else {
            v.messages
                .push(format!("node kind \"{}\" is not defined in the model", kind));
            v.data_messages.push(ViolationDetail::new(TYPE_COLUMN, kind));
            return v;
        };

        for (name, d) in &node.props {
            if d.required && record.get(name).map(String::as_str).unwrap_or("").is_empty() {
                v.messages
                    .push(format!("required property \"{}\" is missing", name));
                v.data_messages.push(ViolationDetail::new(name, ""));
                errors += 1;
            }
        }

        for (column, value) in record {
            if column == TYPE_COLUMN || column == UUID_FIELD {
                continue;
            }
            if is_parent_pointer(column) {
                let Some((parent, field)) = split_parent_pointer(column) else {
                    continue;
                };
                if self.relationship(kind, parent).is_none() {
                    v.messages.push(format!(
                        "no relationship declared from \"{}\" to \"{}\"",
                        kind, parent
                    ));
                    v.undefined_relationships
                        .push(ViolationDetail::new(column, value));
                    errors += 1;
                } else if self
                    .nodes
                    .get(parent)
                    .map(|p| !p.props.contains_key(field))
                    .unwrap_or(true)
                {
                    v.messages.push(format!(
                        "parent pointer \"{}\" names an unknown property of \"{}\"",
                        column, parent
                    ));
                    v.rel_messages.push(ViolationDetail::new(column, value));
                    errors += 1;
                }
                continue;
            }
            if let Some((label, prop)) = self.split_relationship_property(column) {
                match self
                    .relationships
                    .get(label)
                    .and_then(|rel| rel.props.get(prop))
                {
                    Some(d) => {
                        if !value.is_empty() {
                            if let Err(reason) = check_value(d, value, &self.props.list_delimiter) {
                                v.messages.push(format!("column \"{}\": {}", column, reason));
                                v.data_messages.push(ViolationDetail::new(column, value));
                                errors += 1;
                            }
                        }
                    }
                    None => {
                        v.messages.push(format!(
                            "property \"{}\" is not declared on relationship \"{}\"",
                            prop, label
                        ));
                        v.data_messages.push(ViolationDetail::new(column, value));
                        warnings += 1;
                    }
                }
                continue;
            }
            match node.props.get(column) {
                Some(d) => {
                    if !value.is_empty() {
                        if let Err(reason) = check_value(d, value, &self.props.list_delimiter) {
                            v.messages.push(format!("column \"{}\": {}", column, reason));
                            v.data_messages.push(ViolationDetail::new(column, value));
                            errors += 1;
                        }
                    }
                }
                None => {
                    v.messages.push(format!(
                        "property \"{}\" is not defined for node kind \"{}\"",
                        column, kind
                    ));
                    v.data_messages.push(ViolationDetail::new(column, value));
                    warnings += 1;
                }
            }
        }

        v.ok = errors == 0;
        v.warning = warnings > 0;
        v
    }
}

/// Check one non-empty cell against a property descriptor.
fn check_value(d: &PropertyDescriptor, value: &str, list_delimiter: &str) -> Result<(), String> {
    match d.prop_type {
        PropType::Boolean => {
            coerce::parse_bool(value)
                .map(|_| ())
                .ok_or_else(|| format!("\"{}\" is not a Boolean", value))
        }
        PropType::Int => {
            let parsed: i64 = value
                .parse()
                .map_err(|_| format!("\"{}\" is not an Int", value))?;
            check_bounds(d, parsed as f64)
        }
        PropType::Float => {
            let parsed: f64 = value
                .parse()
                .map_err(|_| format!("\"{}\" is not a Float", value))?;
            check_bounds(d, parsed)
        }
        PropType::Date => coerce::reformat_date(value)
            .map(|_| ())
            .ok_or_else(|| format!("\"{}\" is not a Date", value)),
        PropType::DateTime => coerce::reformat_datetime(value)
            .map(|_| ())
            .ok_or_else(|| format!("\"{}\" is not a DateTime", value)),
        PropType::Array => {
            if let Some(allowed) = &d.enum_values {
                for item in coerce::split_list(value, list_delimiter) {
                    if !allowed.contains(&item) {
                        return Err(format!("\"{}\" is not an allowed value", item));
                    }
                }
            }
            Ok(())
        }
        PropType::String => {
            if let Some(allowed) = &d.enum_values {
                if !allowed.iter().any(|a| a == value) {
                    return Err(format!("\"{}\" is not an allowed value", value));
                }
            }
            Ok(())
        }
        PropType::Object => Ok(()),
    }
}

fn check_bounds(d: &PropertyDescriptor, value: f64) -> Result<(), String> {
    if let Some(min) = d.minimum {
        if value < min {
            return Err(format!("{} is below the minimum of {}", value, min));
        }
    }
    if let Some(max) = d.maximum {
        if value > max {
            return Err(format!("{} is above the maximum of {}", value, max));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn model() -> SchemaModel {
        let yaml = r#"
nodes:
  case:
    props:
      case_id: { type: String, required: true }
      breed: { type: String, enum: [Poodle, Labrador] }
      weight: { type: Float, unit: kg, minimum: 0 }
      neutered: { type: Boolean }
      enrolled: { type: Date }
  sample:
    props:
      sample_id: { type: String, required: true }
      volume: { type: Float }
relationships:
  of_case:
    multiplicity: many_to_one
    ends:
      - source: sample
        target: case
    props:
      collection_date: { type: Date }
---
properties:
  domain: canine.example.org
  id_fields:
    case: case_id
    sample: sample_id
  indexes:
    - case: [breed]
  save_parent_id: [sample]
"#;
        let mut docs = Vec::new();
        for document in serde_yaml::Deserializer::from_str(yaml) {
            docs.push(SchemaDocument::deserialize(document).unwrap());
        }
        SchemaModel::from_documents(docs).unwrap()
    }

    fn record(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_lookups() {
        let m = model();
        assert_eq!(m.prop_type("case", "weight"), Some(PropType::Float));
        assert_eq!(m.prop_type("of_case", "collection_date"), Some(PropType::Date));
        assert_eq!(m.prop_type("case", "bogus"), None);
        assert_eq!(m.id_field("case"), Some("case_id"));
        assert_eq!(m.id_field("unknown"), None);

        let rel = m.relationship("sample", "case").unwrap();
        assert_eq!(rel.label, "of_case");
        assert_eq!(rel.multiplicity, Multiplicity::ManyToOne);
        assert!(m.relationship("case", "sample").is_none());
    }

    #[test]
    fn test_relationship_property_split() {
        let m = model();
        assert!(m.is_relationship_property("of_case$collection_date"));
        assert!(!m.is_relationship_property("nonsense$collection_date"));
        assert!(!m.is_relationship_property("breed"));
        assert_eq!(
            m.split_relationship_property("of_case$collection_date"),
            Some(("of_case", "collection_date"))
        );
    }

    #[test]
    fn test_extra_props() {
        let m = model();
        let extras = m.extra_props("case", "weight", "12.5");
        assert_eq!(
            extras,
            vec![("weight_unit".to_string(), Value::String("kg".into()))]
        );
        assert!(m.extra_props("case", "weight", "").is_empty());
        assert!(m.extra_props("case", "breed", "Poodle").is_empty());
    }

    #[test]
    fn test_uuid_is_deterministic_and_scoped() {
        let m = model();
        let a = m.uuid_for_node("case", "C1");
        let b = m.uuid_for_node("case", "C1");
        let c = m.uuid_for_node("sample", "C1");
        let d = m.uuid_for_node("case", "C2");
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_ne!(a, d);
    }

    #[test]
    fn test_index_specs() {
        let m = model();
        let specs = m.index_specs();
        assert!(specs.contains(&("case".to_string(), vec!["case_id".to_string()])));
        assert!(specs.contains(&("case".to_string(), vec!["breed".to_string()])));
        assert!(specs.contains(&("sample".to_string(), vec!["sample_id".to_string()])));
    }

    #[test]
    fn test_validate_clean_record() {
        let m = model();
        let v = m.validate_node(
            "case",
            &record(&[("type", "case"), ("case_id", "C1"), ("breed", "Poodle")]),
        );
        assert!(v.ok);
        assert!(!v.warning);
        assert!(v.messages.is_empty());
    }

    #[test]
    fn test_validate_missing_required() {
        let m = model();
        let v = m.validate_node("case", &record(&[("type", "case"), ("breed", "Poodle")]));
        assert!(!v.ok);
        assert_eq!(v.data_messages[0].column, "case_id");
    }

    #[test]
    fn test_validate_enum_and_bounds() {
        let m = model();
        let v = m.validate_node(
            "case",
            &record(&[("type", "case"), ("case_id", "C1"), ("breed", "Beagle")]),
        );
        assert!(!v.ok);

        let v = m.validate_node(
            "case",
            &record(&[("type", "case"), ("case_id", "C1"), ("weight", "-2.0")]),
        );
        assert!(!v.ok);

        let v = m.validate_node(
            "case",
            &record(&[("type", "case"), ("case_id", "C1"), ("weight", "heavy")]),
        );
        assert!(!v.ok);
    }

    #[test]
    fn test_validate_unknown_property_is_warning() {
        let m = model();
        let v = m.validate_node(
            "case",
            &record(&[("type", "case"), ("case_id", "C1"), ("color", "brown")]),
        );
        assert!(v.ok);
        assert!(v.warning);
        assert_eq!(v.data_messages[0].column, "color");
    }

    #[test]
    fn test_validate_parent_pointers() {
        let m = model();
        let v = m.validate_node(
            "sample",
            &record(&[
                ("type", "sample"),
                ("sample_id", "S1"),
                ("case.case_id", "C1"),
            ]),
        );
        assert!(v.ok);

        let v = m.validate_node(
            "sample",
            &record(&[
                ("type", "sample"),
                ("sample_id", "S1"),
                ("study.study_id", "X"),
            ]),
        );
        assert!(!v.ok);
        assert_eq!(v.undefined_relationships[0].column, "study.study_id");

        let v = m.validate_node(
            "sample",
            &record(&[
                ("type", "sample"),
                ("sample_id", "S1"),
                ("case.bogus_id", "C1"),
            ]),
        );
        assert!(!v.ok);
        assert_eq!(v.rel_messages[0].column, "case.bogus_id");
    }

    #[test]
    fn test_validate_unknown_kind() {
        let m = model();
        let v = m.validate_node("visit", &record(&[("type", "visit")]));
        assert!(!v.ok);
        assert_eq!(v.data_messages[0].column, TYPE_COLUMN);
    }
}

//! Row preparation: from a raw tab-separated record to a typed node ready
//! for writing.
//!
//! The fixed order matters: trim, coerce, inject parent ids, expand extra
//! properties, then assign identity.

use std::collections::BTreeMap;

use thiserror::Error;
use tracing::{debug, warn};

use crate::coerce;
use crate::schema::{
    PropType, SchemaModel, TYPE_COLUMN, UUID_FIELD, is_parent_pointer, split_parent_pointer,
};
use crate::tsv::RawRecord;
use crate::value::Value;

/// Errors raised while preparing a row.
#[derive(Error, Debug)]
pub enum PrepareError {
    /// The reserved `type` column is absent or empty
    #[error("record has no \"type\" column")]
    MissingType,
}

/// A row after preparation: coerced values, injected parent ids, extra
/// properties and a guaranteed identity.
#[derive(Debug, Clone, PartialEq)]
pub struct PreparedNode {
    /// Declared node kind from the `type` column
    pub kind: String,
    /// All columns, coerced; the `type` column stays in as an own property.
    /// Parent-pointer and relationship-property columns keep their raw
    /// header names.
    pub props: BTreeMap<String, Value>,
}

impl PreparedNode {
    /// Declared id field of this node's kind.
    pub fn id_field<'a>(&self, schema: &'a SchemaModel) -> Option<&'a str> {
        schema.id_field(&self.kind)
    }

    /// Value of the declared id field, when present and non-null.
    pub fn id(&self, schema: &SchemaModel) -> Option<&Value> {
        let field = self.id_field(schema)?;
        match self.props.get(field) {
            Some(Value::Null) | None => None,
            Some(v) => Some(v),
        }
    }

    /// The generated or supplied uuid property.
    pub fn uuid(&self) -> Option<&Value> {
        self.props.get(UUID_FIELD)
    }

    /// Own properties: everything except parent pointers and relationship
    /// properties.
    pub fn own_props(&self, schema: &SchemaModel) -> BTreeMap<&str, &Value> {
        self.props
            .iter()
            .filter(|(k, _)| !is_parent_pointer(k) && !schema.is_relationship_property(k))
            .map(|(k, v)| (k.as_str(), v))
            .collect()
    }

    /// Parent-pointer columns as (column, parent kind, parent id field,
    /// value) tuples.
    pub fn parent_pointers<'a>(&'a self) -> Vec<(&'a str, &'a str, &'a str, &'a Value)> {
        self.props
            .iter()
            .filter_map(|(k, v)| {
                split_parent_pointer(k).map(|(parent, field)| (k.as_str(), parent, field, v))
            })
            .collect()
    }

    /// Relationship properties grouped by edge label.
    pub fn relationship_props(&self, schema: &SchemaModel) -> BTreeMap<String, BTreeMap<String, Value>> {
        let mut grouped: BTreeMap<String, BTreeMap<String, Value>> = BTreeMap::new();
        for (column, value) in &self.props {
            if let Some((label, prop)) = schema.split_relationship_property(column) {
                grouped
                    .entry(label.to_string())
                    .or_default()
                    .insert(prop.to_string(), value.clone());
            }
        }
        grouped
    }

    /// Canonical signature over own properties: keys sorted, formatted
    /// `{ k1: v1, k2: v2 }`. Parent pointers, relationship properties and
    /// the uuid itself are excluded, so rows differing only in their parent
    /// pointers share a signature.
    pub fn signature(&self, schema: &SchemaModel) -> String {
        let parts: Vec<String> = self
            .props
            .iter()
            .filter(|(k, _)| {
                k.as_str() != UUID_FIELD
                    && !is_parent_pointer(k)
                    && !schema.is_relationship_property(k)
            })
            .map(|(k, v)| format!("{}: {}", k, v))
            .collect();
        format!("{{ {} }}", parts.join(", "))
    }
}

/// Turns raw records into prepared nodes according to the schema.
pub struct RowPreparer<'a> {
    schema: &'a SchemaModel,
}

impl<'a> RowPreparer<'a> {
    pub fn new(schema: &'a SchemaModel) -> Self {
        Self { schema }
    }

    /// Trim leading and trailing whitespace on every key and value.
    pub fn cleanup(record: &RawRecord) -> RawRecord {
        record
            .iter()
            .map(|(k, v)| (k.trim().to_string(), v.trim().to_string()))
            .collect()
    }

    /// Run the full preparation pipeline on one record.
    pub fn prepare(&self, record: &RawRecord) -> Result<PreparedNode, PrepareError> {
        let cleaned = Self::cleanup(record);
        let kind = cleaned
            .get(TYPE_COLUMN)
            .filter(|v| !v.is_empty())
            .cloned()
            .ok_or(PrepareError::MissingType)?;

        let mut props: BTreeMap<String, Value> = BTreeMap::new();
        for (column, value) in &cleaned {
            let (owner, key) = if let Some((parent, field)) = split_parent_pointer(column) {
                if column.matches('.').count() > 1 {
                    warn!(column = %column, "column header has multiple periods");
                }
                (parent, field)
            } else if let Some((label, prop)) = self.schema.split_relationship_property(column) {
                (label, prop)
            } else {
                (kind.as_str(), column.as_str())
            };
            props.insert(
                column.clone(),
                self.coerce_value(self.schema.prop_type(owner, key), value),
            );
        }

        // Parent id scalars for kinds that keep them inline
        if self.schema.props().saves_parent_id(&kind) {
            let injected: Vec<(String, Value)> = props
                .iter()
                .filter_map(|(column, value)| {
                    let (parent, field) = split_parent_pointer(column)?;
                    let name = if props.contains_key(field) {
                        debug!(
                            column = %column,
                            "field exists on both child and parent, prefixing with parent kind"
                        );
                        format!("{}_{}", parent, field)
                    } else {
                        field.to_string()
                    };
                    Some((name, value.clone()))
                })
                .collect();
            props.extend(injected);
        }

        // Unit siblings and other generated properties
        let extras: Vec<(String, Value)> = cleaned
            .iter()
            .flat_map(|(column, value)| self.schema.extra_props(&kind, column, value))
            .collect();
        props.extend(extras);

        let mut prepared = PreparedNode { kind, props };
        if prepared.uuid().is_none() {
            let id_field = prepared.id_field(self.schema);
            let uuid = match prepared.id(self.schema) {
                Some(id) if id_field != Some(UUID_FIELD) => Some(
                    self.schema
                        .uuid_for_node(&prepared.kind, &id.to_string()),
                ),
                Some(_) => None,
                None => Some(
                    self.schema
                        .uuid_for_node(&prepared.kind, &prepared.signature(self.schema)),
                ),
            };
            if let Some(uuid) = uuid {
                prepared
                    .props
                    .insert(UUID_FIELD.to_string(), Value::String(uuid.to_string()));
            }
        }
        Ok(prepared)
    }

    fn coerce_value(&self, prop_type: Option<PropType>, value: &str) -> Value {
        match prop_type {
            Some(PropType::Boolean) => match coerce::parse_bool(value) {
                Some(b) => Value::Bool(b),
                None => {
                    if !value.is_empty() {
                        debug!(value = %value, "unsupported Boolean value");
                    }
                    Value::Null
                }
            },
            Some(PropType::Int) => value.parse().map(Value::Int).unwrap_or(Value::Null),
            Some(PropType::Float) => value.parse().map(Value::Float).unwrap_or(Value::Null),
            Some(PropType::Date) => {
                if value.is_empty() {
                    Value::Null
                } else {
                    Value::String(
                        coerce::reformat_date(value).unwrap_or_else(|| value.to_string()),
                    )
                }
            }
            Some(PropType::DateTime) => {
                if value.is_empty() {
                    Value::Null
                } else {
                    Value::String(
                        coerce::reformat_datetime(value).unwrap_or_else(|| value.to_string()),
                    )
                }
            }
            Some(PropType::Array) => {
                let items = coerce::split_list(value, &self.schema.props().list_delimiter);
                Value::String(serde_json::to_string(&items).unwrap_or_else(|_| "[]".to_string()))
            }
            _ => Value::String(value.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::SchemaDocument;
    use serde::Deserialize;

    fn model() -> SchemaModel {
        let yaml = r#"
nodes:
  case:
    props:
      case_id: { type: String, required: true }
      breed: { type: String }
      weight: { type: Float, unit: kg }
      neutered: { type: Boolean }
      enrolled: { type: Date }
      visit_count: { type: Int }
      diagnoses: { type: Array }
  sample:
    props:
      sample_id: { type: String, required: true }
      case_id: { type: String }
relationships:
  of_case:
    multiplicity: many_to_one
    ends:
      - source: sample
        target: case
    props:
      collection_date: { type: Date }
properties:
  domain: canine.example.org
  id_fields:
    case: case_id
    sample: sample_id
  save_parent_id: [sample]
"#;
        let mut docs = Vec::new();
        for document in serde_yaml::Deserializer::from_str(yaml) {
            docs.push(SchemaDocument::deserialize(document).unwrap());
        }
        SchemaModel::from_documents(docs).unwrap()
    }

    fn record(pairs: &[(&str, &str)]) -> RawRecord {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_cleanup_trims_keys_and_values() {
        let raw = record(&[(" case_id ", " C1 "), ("breed", "Poodle")]);
        let cleaned = RowPreparer::cleanup(&raw);
        assert_eq!(cleaned["case_id"], "C1");
        assert_eq!(cleaned["breed"], "Poodle");
    }

    #[test]
    fn test_coercion() {
        let m = model();
        let p = RowPreparer::new(&m)
            .prepare(&record(&[
                ("type", "case"),
                ("case_id", "C1"),
                ("neutered", "Yes"),
                ("visit_count", "3"),
                ("weight", "12.5"),
                ("enrolled", "03/05/2021"),
                ("diagnoses", "lymphoma; osteosarcoma"),
            ]))
            .unwrap();
        assert_eq!(p.kind, "case");
        assert_eq!(p.props["neutered"], Value::Bool(true));
        assert_eq!(p.props["visit_count"], Value::Int(3));
        assert_eq!(p.props["weight"], Value::Float(12.5));
        assert_eq!(p.props["enrolled"], Value::String("2021-03-05".into()));
        assert_eq!(
            p.props["diagnoses"],
            Value::String(r#"["lymphoma","osteosarcoma"]"#.into())
        );
    }

    #[test]
    fn test_unparseable_cells_become_null() {
        let m = model();
        let p = RowPreparer::new(&m)
            .prepare(&record(&[
                ("type", "case"),
                ("case_id", "C1"),
                ("neutered", "maybe"),
                ("visit_count", "many"),
                ("weight", ""),
            ]))
            .unwrap();
        assert_eq!(p.props["neutered"], Value::Null);
        assert_eq!(p.props["visit_count"], Value::Null);
        assert_eq!(p.props["weight"], Value::Null);
    }

    #[test]
    fn test_unit_extra_property() {
        let m = model();
        let p = RowPreparer::new(&m)
            .prepare(&record(&[("type", "case"), ("case_id", "C1"), ("weight", "12.5")]))
            .unwrap();
        assert_eq!(p.props["weight_unit"], Value::String("kg".into()));
    }

    #[test]
    fn test_parent_id_injection_with_collision() {
        let m = model();
        // sample declares its own case_id column, so the injected scalar is
        // prefixed with the parent kind
        let p = RowPreparer::new(&m)
            .prepare(&record(&[
                ("type", "sample"),
                ("sample_id", "S1"),
                ("case_id", "local"),
                ("case.case_id", "C1"),
            ]))
            .unwrap();
        assert_eq!(p.props["case_case_id"], Value::String("C1".into()));
        assert_eq!(p.props["case_id"], Value::String("local".into()));

        let p = RowPreparer::new(&m)
            .prepare(&record(&[
                ("type", "sample"),
                ("sample_id", "S1"),
                ("case.case_id", "C1"),
            ]))
            .unwrap();
        assert_eq!(p.props["case_id"], Value::String("C1".into()));
    }

    #[test]
    fn test_uuid_from_explicit_id() {
        let m = model();
        let preparer = RowPreparer::new(&m);
        let p = preparer
            .prepare(&record(&[("type", "case"), ("case_id", "C1"), ("breed", "Poodle")]))
            .unwrap();
        let expected = m.uuid_for_node("case", "C1");
        assert_eq!(p.uuid().unwrap(), &Value::String(expected.to_string()));
    }

    #[test]
    fn test_uuid_ignores_parent_pointers() {
        let m = model();
        let preparer = RowPreparer::new(&m);
        // case is not in save_parent_id, so only the pointer column differs
        let a = preparer
            .prepare(&record(&[("type", "case"), ("breed", "Poodle")]))
            .unwrap();
        let b = preparer
            .prepare(&record(&[
                ("type", "case"),
                ("breed", "Poodle"),
                ("owner.owner_id", "O1"),
            ]))
            .unwrap();
        assert_eq!(a.uuid(), b.uuid());
    }

    #[test]
    fn test_signature_shape() {
        let m = model();
        let p = RowPreparer::new(&m)
            .prepare(&record(&[("type", "case"), ("breed", "Poodle")]))
            .unwrap();
        assert_eq!(p.signature(&m), "{ breed: Poodle, type: case }");
    }

    #[test]
    fn test_signature_distinguishes_kinds() {
        let m = model();
        let preparer = RowPreparer::new(&m);
        let a = preparer
            .prepare(&record(&[("type", "case"), ("breed", "Poodle")]))
            .unwrap();
        let b = preparer
            .prepare(&record(&[("type", "sample"), ("breed", "Poodle")]))
            .unwrap();
        assert_ne!(a.signature(&m), b.signature(&m));
    }

    #[test]
    fn test_missing_type_is_rejected() {
        let m = model();
        let err = RowPreparer::new(&m).prepare(&record(&[("case_id", "C1")]));
        assert!(matches!(err, Err(PrepareError::MissingType)));
    }

    #[test]
    fn test_relationship_props_grouping() {
        let m = model();
        let p = RowPreparer::new(&m)
            .prepare(&record(&[
                ("type", "sample"),
                ("sample_id", "S1"),
                ("case.case_id", "C1"),
                ("of_case$collection_date", "2021-03-05"),
            ]))
            .unwrap();
        let grouped = p.relationship_props(&m);
        assert_eq!(
            grouped["of_case"]["collection_date"],
            Value::String("2021-03-05".into())
        );
        let pointers = p.parent_pointers();
        assert_eq!(pointers.len(), 1);
        assert_eq!(pointers[0].1, "case");
    }
}

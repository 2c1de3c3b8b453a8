//! Schema model: YAML-declared node kinds, relationships and loader
//! properties, plus per-record validation.

pub mod model;
pub mod props;
pub mod types;

pub use model::{
    NodeValidation, RelationshipRef, SchemaDocument, SchemaError, SchemaModel, TYPE_COLUMN,
    UUID_FIELD, ViolationDetail, is_parent_pointer, split_parent_pointer,
};
pub use props::GraphProperties;
pub use types::{
    Multiplicity, NodeDescriptor, PropType, PropertyDescriptor, RelationshipDescriptor,
    RelationshipEnd,
};

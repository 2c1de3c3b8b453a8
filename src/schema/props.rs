//! The properties document: loader-facing settings that accompany the model.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

fn default_domain() -> String {
    "data.example.org".to_string()
}

fn default_rel_prop_delimiter() -> String {
    "$".to_string()
}

fn default_list_delimiter() -> String {
    ";".to_string()
}

/// Settings from the `properties` document of a schema sequence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphProperties {
    /// Namespace domain for UUIDv5 identity
    #[serde(default = "default_domain")]
    pub domain: String,
    /// Delimiter separating edge label from property in column headers
    #[serde(default = "default_rel_prop_delimiter")]
    pub rel_prop_delimiter: String,
    /// Delimiter between items of an Array cell
    #[serde(default = "default_list_delimiter")]
    pub list_delimiter: String,
    /// Node kind to its declared id property
    #[serde(default)]
    pub id_fields: BTreeMap<String, String>,
    /// Extra BTREE indexes, each entry mapping a kind to a property list
    #[serde(default)]
    pub indexes: Vec<BTreeMap<String, Vec<String>>>,
    /// Node kinds that copy parent id values inline onto the child
    #[serde(default)]
    pub save_parent_id: Vec<String>,
}

impl Default for GraphProperties {
    fn default() -> Self {
        Self {
            domain: default_domain(),
            rel_prop_delimiter: default_rel_prop_delimiter(),
            list_delimiter: default_list_delimiter(),
            id_fields: BTreeMap::new(),
            indexes: Vec::new(),
            save_parent_id: Vec::new(),
        }
    }
}

impl GraphProperties {
    /// Whether the given kind copies parent ids inline.
    pub fn saves_parent_id(&self, kind: &str) -> bool {
        self.save_parent_id.iter().any(|k| k == kind)
    }
}

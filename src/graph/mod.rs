//! Graph store abstraction: the seam between the engine and the property
//! graph database.
//!
//! The engine only needs a small set of node/edge primitives plus
//! transaction control, so backends stay interchangeable: `MemoryGraph` for
//! tests and embedding, `BoltGraph` for a real database over the Bolt
//! protocol.

pub mod cypher;
pub mod memory;

#[cfg(feature = "bolt")]
pub mod bolt;

use std::collections::{BTreeMap, BTreeSet};

use chrono::{SecondsFormat, Utc};
use thiserror::Error;

use crate::value::Value;

pub use memory::MemoryGraph;

#[cfg(feature = "bolt")]
pub use bolt::BoltGraph;

/// Property holding the creation timestamp of a node or edge.
pub const CREATED: &str = "created";

/// Property holding the last-update timestamp of a node or edge.
pub const UPDATED: &str = "updated";

/// Errors raised by graph store backends.
#[derive(Error, Debug)]
pub enum GraphError {
    /// An operation requires an open transaction
    #[error("no open transaction")]
    NoTransaction,

    /// `begin` was called while a transaction is already open
    #[error("a transaction is already open")]
    TransactionOpen,

    /// Backend-specific failure
    #[error("graph backend error: {0}")]
    Backend(String),
}

/// Counters reported by a single write, mirroring the database's own
/// update summary.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WriteSummary {
    pub nodes_created: usize,
    pub nodes_updated: usize,
    pub nodes_deleted: usize,
    pub relationships_created: usize,
    pub relationships_updated: usize,
    pub relationships_deleted: usize,
}

impl WriteSummary {
    /// Accumulate another summary into this one.
    pub fn merge(&mut self, other: &WriteSummary) {
        self.nodes_created += other.nodes_created;
        self.nodes_updated += other.nodes_updated;
        self.nodes_deleted += other.nodes_deleted;
        self.relationships_created += other.relationships_created;
        self.relationships_updated += other.relationships_updated;
        self.relationships_deleted += other.relationships_deleted;
    }
}

/// Reference to a node by kind, id field and id value.
#[derive(Debug, Clone, Copy)]
pub struct NodeRef<'a> {
    pub kind: &'a str,
    pub id_field: &'a str,
    pub id: &'a Value,
}

/// A node read back from the store.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredNode {
    pub kind: String,
    pub props: BTreeMap<String, Value>,
}

/// Identity of a BTREE index: label plus sorted property tuple.
pub type IndexKey = (String, Vec<String>);

/// Timestamp string written into `created`/`updated` properties.
pub(crate) fn now_string() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Build the presence-check key of an index.
pub fn index_key(kind: &str, props: &[String]) -> IndexKey {
    let mut sorted = props.to_vec();
    sorted.sort();
    (kind.to_string(), sorted)
}

/// The store seam. All write operations require an open transaction; a
/// backend must release any open transaction (rollback) when dropped.
pub trait GraphStore {
    /// Open a transaction.
    fn begin(&mut self) -> Result<(), GraphError>;

    /// Commit the open transaction.
    fn commit(&mut self) -> Result<(), GraphError>;

    /// Roll back the open transaction.
    fn rollback(&mut self) -> Result<(), GraphError>;

    /// Whether a node with the given identity exists.
    fn node_exists(&mut self, node: NodeRef<'_>) -> Result<bool, GraphError>;

    /// MERGE a node by identity: create with `created` timestamp or update
    /// with `updated` timestamp, setting `props` in both branches.
    fn merge_node(
        &mut self,
        node: NodeRef<'_>,
        props: &BTreeMap<String, Value>,
    ) -> Result<WriteSummary, GraphError>;

    /// CREATE a node unconditionally with the given properties.
    fn create_node(
        &mut self,
        kind: &str,
        props: &BTreeMap<String, Value>,
    ) -> Result<WriteSummary, GraphError>;

    /// Detach-delete one node and all its edges.
    fn detach_delete(&mut self, node: NodeRef<'_>) -> Result<WriteSummary, GraphError>;

    /// Children of `node` whose every outgoing parent edge targets `node`.
    fn children_with_single_parent(
        &mut self,
        node: NodeRef<'_>,
    ) -> Result<Vec<StoredNode>, GraphError>;

    /// Id of the parent currently linked from `child` over `label`, if any.
    fn linked_parent_id(
        &mut self,
        child: NodeRef<'_>,
        label: &str,
        parent_kind: &str,
        parent_id_field: &str,
    ) -> Result<Option<Value>, GraphError>;

    /// Whether some other child already links to `parent` over `label`.
    fn parent_has_other_child(
        &mut self,
        child: NodeRef<'_>,
        label: &str,
        parent: NodeRef<'_>,
    ) -> Result<bool, GraphError>;

    /// Delete the edge of `label` from `child` to any node of `parent_kind`.
    fn delete_edge(
        &mut self,
        child: NodeRef<'_>,
        label: &str,
        parent_kind: &str,
    ) -> Result<WriteSummary, GraphError>;

    /// MERGE the edge `child -[label]-> parent` with `created`/`updated`
    /// semantics and the given edge properties set in both branches.
    fn merge_edge(
        &mut self,
        child: NodeRef<'_>,
        label: &str,
        parent: NodeRef<'_>,
        props: &BTreeMap<String, Value>,
    ) -> Result<WriteSummary, GraphError>;

    /// Detach-delete the entire graph.
    fn wipe(&mut self) -> Result<WriteSummary, GraphError>;

    /// Detach-delete up to `limit` nodes; used by batched wipes.
    fn wipe_batch(&mut self, limit: usize) -> Result<WriteSummary, GraphError>;

    /// Existing BTREE indexes by (label, sorted property tuple).
    fn btree_indexes(&mut self) -> Result<BTreeSet<IndexKey>, GraphError>;

    /// Create a BTREE index.
    fn create_index(&mut self, kind: &str, props: &[String]) -> Result<(), GraphError>;
}

//! In-memory graph store.
//!
//! The reference implementation of `GraphStore`: HashMap-backed nodes and
//! edges with snapshot-based transactions. Used by tests and for dry
//! evaluation of datasets without a database; rollback restores the state
//! captured at `begin`.

use std::collections::{BTreeMap, BTreeSet};

use tracing::debug;

use super::{
    CREATED, GraphError, GraphStore, IndexKey, NodeRef, StoredNode, UPDATED, WriteSummary,
    index_key, now_string,
};
use crate::value::Value;

#[derive(Debug, Clone)]
struct MemNode {
    kind: String,
    props: BTreeMap<String, Value>,
}

#[derive(Debug, Clone)]
struct MemEdge {
    label: String,
    src: u64,
    dst: u64,
    props: BTreeMap<String, Value>,
}

#[derive(Debug, Clone, Default)]
struct State {
    nodes: BTreeMap<u64, MemNode>,
    edges: BTreeMap<u64, MemEdge>,
    indexes: BTreeSet<IndexKey>,
    next_node: u64,
    next_edge: u64,
}

/// HashMap-backed property graph with snapshot transactions.
#[derive(Debug, Default)]
pub struct MemoryGraph {
    state: State,
    snapshot: Option<State>,
}

/// Setting a property to null removes it, matching database semantics.
fn set_props(target: &mut BTreeMap<String, Value>, props: &BTreeMap<String, Value>) {
    for (key, value) in props {
        if value.is_null() {
            target.remove(key);
        } else {
            target.insert(key.clone(), value.clone());
        }
    }
}

impl MemoryGraph {
    pub fn new() -> Self {
        Self::default()
    }

    fn require_tx(&self) -> Result<(), GraphError> {
        if self.snapshot.is_none() {
            return Err(GraphError::NoTransaction);
        }
        Ok(())
    }

    fn find(&self, node: NodeRef<'_>) -> Option<u64> {
        self.state.nodes.iter().find_map(|(id, n)| {
            (n.kind == node.kind && n.props.get(node.id_field) == Some(node.id)).then_some(*id)
        })
    }

    fn remove_node(&mut self, id: u64) -> WriteSummary {
        let mut summary = WriteSummary::default();
        let edge_ids: Vec<u64> = self
            .state
            .edges
            .iter()
            .filter(|(_, e)| e.src == id || e.dst == id)
            .map(|(eid, _)| *eid)
            .collect();
        for eid in edge_ids {
            self.state.edges.remove(&eid);
            summary.relationships_deleted += 1;
        }
        if self.state.nodes.remove(&id).is_some() {
            summary.nodes_deleted += 1;
        }
        summary
    }

    // Inspection helpers for embedding and tests; these read the current
    // state regardless of transactions.

    /// Number of nodes, optionally restricted to one kind.
    pub fn node_count(&self, kind: Option<&str>) -> usize {
        match kind {
            Some(kind) => self.state.nodes.values().filter(|n| n.kind == kind).count(),
            None => self.state.nodes.len(),
        }
    }

    /// Number of edges, optionally restricted to one label.
    pub fn edge_count(&self, label: Option<&str>) -> usize {
        match label {
            Some(label) => self.state.edges.values().filter(|e| e.label == label).count(),
            None => self.state.edges.len(),
        }
    }

    /// Properties of the node with the given identity.
    pub fn node_props(
        &self,
        kind: &str,
        id_field: &str,
        id: &Value,
    ) -> Option<&BTreeMap<String, Value>> {
        self.state
            .nodes
            .values()
            .find(|n| n.kind == kind && n.props.get(id_field) == Some(id))
            .map(|n| &n.props)
    }

    /// Outgoing edges of a node as (label, parent kind, parent properties).
    pub fn edges_from(
        &self,
        kind: &str,
        id_field: &str,
        id: &Value,
    ) -> Vec<(String, String, BTreeMap<String, Value>)> {
        let Some(src) = self.state.nodes.iter().find_map(|(nid, n)| {
            (n.kind == kind && n.props.get(id_field) == Some(id)).then_some(*nid)
        }) else {
            return Vec::new();
        };
        self.state
            .edges
            .values()
            .filter(|e| e.src == src)
            .filter_map(|e| {
                self.state
                    .nodes
                    .get(&e.dst)
                    .map(|dst| (e.label.clone(), dst.kind.clone(), dst.props.clone()))
            })
            .collect()
    }

    /// Whether an index on (kind, properties) exists.
    pub fn has_index(&self, kind: &str, props: &[String]) -> bool {
        self.state.indexes.contains(&index_key(kind, props))
    }
}

impl GraphStore for MemoryGraph {
    fn begin(&mut self) -> Result<(), GraphError> {
        if self.snapshot.is_some() {
            return Err(GraphError::TransactionOpen);
        }
        self.snapshot = Some(self.state.clone());
        Ok(())
    }

    fn commit(&mut self) -> Result<(), GraphError> {
        self.snapshot.take().ok_or(GraphError::NoTransaction)?;
        Ok(())
    }

    fn rollback(&mut self) -> Result<(), GraphError> {
        self.state = self.snapshot.take().ok_or(GraphError::NoTransaction)?;
        debug!("memory graph rolled back to snapshot");
        Ok(())
    }

    fn node_exists(&mut self, node: NodeRef<'_>) -> Result<bool, GraphError> {
        self.require_tx()?;
        Ok(self.find(node).is_some())
    }

    fn merge_node(
        &mut self,
        node: NodeRef<'_>,
        props: &BTreeMap<String, Value>,
    ) -> Result<WriteSummary, GraphError> {
        self.require_tx()?;
        let mut summary = WriteSummary::default();
        match self.find(node) {
            Some(id) => {
                let existing = self.state.nodes.get_mut(&id).ok_or_else(|| {
                    GraphError::Backend("node vanished during merge".to_string())
                })?;
                set_props(&mut existing.props, props);
                existing
                    .props
                    .insert(UPDATED.to_string(), Value::String(now_string()));
                summary.nodes_updated = 1;
            }
            None => {
                let id = self.state.next_node;
                self.state.next_node += 1;
                let mut stored = BTreeMap::new();
                set_props(&mut stored, props);
                stored.insert(node.id_field.to_string(), node.id.clone());
                stored.insert(CREATED.to_string(), Value::String(now_string()));
                self.state.nodes.insert(
                    id,
                    MemNode {
                        kind: node.kind.to_string(),
                        props: stored,
                    },
                );
                summary.nodes_created = 1;
            }
        }
        Ok(summary)
    }

    fn create_node(
        &mut self,
        kind: &str,
        props: &BTreeMap<String, Value>,
    ) -> Result<WriteSummary, GraphError> {
        self.require_tx()?;
        let id = self.state.next_node;
        self.state.next_node += 1;
        let mut stored = BTreeMap::new();
        set_props(&mut stored, props);
        self.state.nodes.insert(
            id,
            MemNode {
                kind: kind.to_string(),
                props: stored,
            },
        );
        Ok(WriteSummary {
            nodes_created: 1,
            ..Default::default()
        })
    }

    fn detach_delete(&mut self, node: NodeRef<'_>) -> Result<WriteSummary, GraphError> {
        self.require_tx()?;
        match self.find(node) {
            Some(id) => Ok(self.remove_node(id)),
            None => Ok(WriteSummary::default()),
        }
    }

    fn children_with_single_parent(
        &mut self,
        node: NodeRef<'_>,
    ) -> Result<Vec<StoredNode>, GraphError> {
        self.require_tx()?;
        let Some(target) = self.find(node) else {
            return Ok(Vec::new());
        };
        let children: BTreeSet<u64> = self
            .state
            .edges
            .values()
            .filter(|e| e.dst == target)
            .map(|e| e.src)
            .collect();
        let mut result = Vec::new();
        for child in children {
            let single = self
                .state
                .edges
                .values()
                .filter(|e| e.src == child)
                .all(|e| e.dst == target);
            if single {
                if let Some(n) = self.state.nodes.get(&child) {
                    result.push(StoredNode {
                        kind: n.kind.clone(),
                        props: n.props.clone(),
                    });
                }
            }
        }
        Ok(result)
    }

    fn linked_parent_id(
        &mut self,
        child: NodeRef<'_>,
        label: &str,
        parent_kind: &str,
        parent_id_field: &str,
    ) -> Result<Option<Value>, GraphError> {
        self.require_tx()?;
        let Some(src) = self.find(child) else {
            return Ok(None);
        };
        Ok(self
            .state
            .edges
            .values()
            .filter(|e| e.src == src && e.label == label)
            .find_map(|e| {
                let dst = self.state.nodes.get(&e.dst)?;
                (dst.kind == parent_kind)
                    .then(|| dst.props.get(parent_id_field).cloned())
                    .flatten()
            }))
    }

    fn parent_has_other_child(
        &mut self,
        child: NodeRef<'_>,
        label: &str,
        parent: NodeRef<'_>,
    ) -> Result<bool, GraphError> {
        self.require_tx()?;
        let Some(target) = self.find(parent) else {
            return Ok(false);
        };
        let this_child = self.find(child);
        Ok(self
            .state
            .edges
            .values()
            .filter(|e| e.dst == target && e.label == label)
            .any(|e| Some(e.src) != this_child))
    }

    fn delete_edge(
        &mut self,
        child: NodeRef<'_>,
        label: &str,
        parent_kind: &str,
    ) -> Result<WriteSummary, GraphError> {
        self.require_tx()?;
        let mut summary = WriteSummary::default();
        let Some(src) = self.find(child) else {
            return Ok(summary);
        };
        let doomed: Vec<u64> = self
            .state
            .edges
            .iter()
            .filter(|(_, e)| {
                e.src == src
                    && e.label == label
                    && self
                        .state
                        .nodes
                        .get(&e.dst)
                        .map(|n| n.kind == parent_kind)
                        .unwrap_or(false)
            })
            .map(|(id, _)| *id)
            .collect();
        for id in doomed {
            self.state.edges.remove(&id);
            summary.relationships_deleted += 1;
        }
        Ok(summary)
    }

    fn merge_edge(
        &mut self,
        child: NodeRef<'_>,
        label: &str,
        parent: NodeRef<'_>,
        props: &BTreeMap<String, Value>,
    ) -> Result<WriteSummary, GraphError> {
        self.require_tx()?;
        let mut summary = WriteSummary::default();
        let (Some(src), Some(dst)) = (self.find(child), self.find(parent)) else {
            // MATCH found nothing, the MERGE never ran
            return Ok(summary);
        };
        let existing = self
            .state
            .edges
            .iter()
            .find(|(_, e)| e.src == src && e.dst == dst && e.label == label)
            .map(|(id, _)| *id);
        match existing {
            Some(id) => {
                let edge = self.state.edges.get_mut(&id).ok_or_else(|| {
                    GraphError::Backend("edge vanished during merge".to_string())
                })?;
                set_props(&mut edge.props, props);
                edge.props
                    .insert(UPDATED.to_string(), Value::String(now_string()));
                summary.relationships_updated = 1;
            }
            None => {
                let id = self.state.next_edge;
                self.state.next_edge += 1;
                let mut stored = BTreeMap::new();
                set_props(&mut stored, props);
                stored.insert(CREATED.to_string(), Value::String(now_string()));
                self.state.edges.insert(
                    id,
                    MemEdge {
                        label: label.to_string(),
                        src,
                        dst,
                        props: stored,
                    },
                );
                summary.relationships_created = 1;
            }
        }
        Ok(summary)
    }

    fn wipe(&mut self) -> Result<WriteSummary, GraphError> {
        self.require_tx()?;
        let summary = WriteSummary {
            nodes_deleted: self.state.nodes.len(),
            relationships_deleted: self.state.edges.len(),
            ..Default::default()
        };
        self.state.nodes.clear();
        self.state.edges.clear();
        Ok(summary)
    }

    fn wipe_batch(&mut self, limit: usize) -> Result<WriteSummary, GraphError> {
        self.require_tx()?;
        let batch: Vec<u64> = self.state.nodes.keys().take(limit).copied().collect();
        let mut summary = WriteSummary::default();
        for id in batch {
            summary.merge(&self.remove_node(id));
        }
        Ok(summary)
    }

    fn btree_indexes(&mut self) -> Result<BTreeSet<IndexKey>, GraphError> {
        Ok(self.state.indexes.clone())
    }

    fn create_index(&mut self, kind: &str, props: &[String]) -> Result<(), GraphError> {
        self.require_tx()?;
        self.state.indexes.insert(index_key(kind, props));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(v: &str) -> Value {
        Value::String(v.to_string())
    }

    fn props(pairs: &[(&str, &str)]) -> BTreeMap<String, Value> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), id(v)))
            .collect()
    }

    #[test]
    fn test_merge_creates_then_updates() {
        let mut g = MemoryGraph::new();
        g.begin().unwrap();
        let case_id = id("C1");
        let node = NodeRef {
            kind: "case",
            id_field: "case_id",
            id: &case_id,
        };
        let summary = g.merge_node(node, &props(&[("breed", "Poodle")])).unwrap();
        assert_eq!(summary.nodes_created, 1);
        let summary = g.merge_node(node, &props(&[("breed", "Labrador")])).unwrap();
        assert_eq!(summary.nodes_created, 0);
        assert_eq!(summary.nodes_updated, 1);
        g.commit().unwrap();

        assert_eq!(g.node_count(Some("case")), 1);
        let stored = g.node_props("case", "case_id", &case_id).unwrap();
        assert_eq!(stored["breed"], id("Labrador"));
        assert!(stored.contains_key(CREATED));
        assert!(stored.contains_key(UPDATED));
    }

    #[test]
    fn test_rollback_restores_snapshot() {
        let mut g = MemoryGraph::new();
        let case_id = id("C1");
        let node = NodeRef {
            kind: "case",
            id_field: "case_id",
            id: &case_id,
        };
        g.begin().unwrap();
        g.merge_node(node, &BTreeMap::new()).unwrap();
        g.commit().unwrap();

        g.begin().unwrap();
        g.wipe().unwrap();
        assert_eq!(g.node_count(None), 0);
        g.rollback().unwrap();
        assert_eq!(g.node_count(None), 1);
    }

    #[test]
    fn test_writes_require_transaction() {
        let mut g = MemoryGraph::new();
        let case_id = id("C1");
        let node = NodeRef {
            kind: "case",
            id_field: "case_id",
            id: &case_id,
        };
        assert!(matches!(
            g.merge_node(node, &BTreeMap::new()),
            Err(GraphError::NoTransaction)
        ));
    }

    #[test]
    fn test_edge_merge_and_single_parent_children() {
        let mut g = MemoryGraph::new();
        g.begin().unwrap();
        let c1 = id("C1");
        let s1 = id("S1");
        let case = NodeRef {
            kind: "case",
            id_field: "case_id",
            id: &c1,
        };
        let sample = NodeRef {
            kind: "sample",
            id_field: "sample_id",
            id: &s1,
        };
        g.merge_node(case, &BTreeMap::new()).unwrap();
        g.merge_node(sample, &BTreeMap::new()).unwrap();

        let summary = g.merge_edge(sample, "of_case", case, &BTreeMap::new()).unwrap();
        assert_eq!(summary.relationships_created, 1);
        let summary = g.merge_edge(sample, "of_case", case, &BTreeMap::new()).unwrap();
        assert_eq!(summary.relationships_created, 0);
        assert_eq!(summary.relationships_updated, 1);
        assert_eq!(g.edge_count(Some("of_case")), 1);

        let children = g.children_with_single_parent(case).unwrap();
        assert_eq!(children.len(), 1);
        assert_eq!(children[0].kind, "sample");

        assert_eq!(
            g.linked_parent_id(sample, "of_case", "case", "case_id").unwrap(),
            Some(c1.clone())
        );
        g.commit().unwrap();
    }

    #[test]
    fn test_wipe_batch() {
        let mut g = MemoryGraph::new();
        g.begin().unwrap();
        for i in 0..5 {
            let node_id = id(&format!("C{i}"));
            g.merge_node(
                NodeRef {
                    kind: "case",
                    id_field: "case_id",
                    id: &node_id,
                },
                &BTreeMap::new(),
            )
            .unwrap();
        }
        let summary = g.wipe_batch(3).unwrap();
        assert_eq!(summary.nodes_deleted, 3);
        let summary = g.wipe_batch(3).unwrap();
        assert_eq!(summary.nodes_deleted, 2);
        let summary = g.wipe_batch(3).unwrap();
        assert_eq!(summary.nodes_deleted, 0);
        g.commit().unwrap();
    }

    #[test]
    fn test_index_bookkeeping() {
        let mut g = MemoryGraph::new();
        g.begin().unwrap();
        g.create_index("case", &["case_id".to_string()]).unwrap();
        g.commit().unwrap();
        assert!(g.has_index("case", &["case_id".to_string()]));
        let keys = g.btree_indexes().unwrap();
        assert!(keys.contains(&("case".to_string(), vec!["case_id".to_string()])));
    }
}

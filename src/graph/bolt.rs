//! Bolt-backed graph store.
//!
//! Wraps an async neo4rs driver behind the synchronous `GraphStore` trait:
//! the store owns a private runtime and blocks on each call, so the engine
//! keeps its single thread of control and a single active transaction.
//!
//! neo4rs does not surface the server's update counters on `run`, so
//! created/matched outcomes are derived from an existence probe issued
//! before each MERGE.

use std::collections::{BTreeMap, BTreeSet};

use neo4rs::{BoltType, ConfigBuilder, Graph, Query, Txn, query};
use tokio::runtime::Runtime;
use tracing::{debug, warn};

use super::{
    GraphError, GraphStore, IndexKey, NodeRef, StoredNode, WriteSummary, cypher, index_key,
};
use crate::value::Value;

fn backend_err(e: impl std::fmt::Display) -> GraphError {
    GraphError::Backend(e.to_string())
}

fn to_bolt(value: &Value) -> BoltType {
    match value {
        Value::Null => BoltType::Null(neo4rs::BoltNull::default()),
        Value::Bool(b) => BoltType::Boolean(neo4rs::BoltBoolean::new(*b)),
        Value::Int(i) => BoltType::Integer(neo4rs::BoltInteger::new(*i)),
        Value::Float(f) => BoltType::Float(neo4rs::BoltFloat::new(*f)),
        Value::String(s) => BoltType::String(neo4rs::BoltString::new(s)),
    }
}

fn with_params(statement: &str, params: &BTreeMap<String, Value>) -> Query {
    let mut q = query(statement);
    for (key, value) in params {
        q = q.param(key.as_str(), to_bolt(value));
    }
    q
}

/// Graph store over the Bolt protocol.
pub struct BoltGraph {
    rt: Runtime,
    graph: Graph,
    txn: Option<Txn>,
}

impl BoltGraph {
    /// Connect to a database. The connection is verified eagerly so auth and
    /// availability problems surface before any load work starts.
    pub fn connect(uri: &str, user: &str, password: &str) -> Result<Self, GraphError> {
        let rt = Runtime::new().map_err(backend_err)?;
        let config = ConfigBuilder::default()
            .uri(uri)
            .user(user)
            .password(password)
            .build()
            .map_err(backend_err)?;
        let graph = rt.block_on(Graph::connect(config)).map_err(backend_err)?;
        debug!(uri, "connected to graph database");
        Ok(Self {
            rt,
            graph,
            txn: None,
        })
    }

    fn run(&mut self, q: Query) -> Result<(), GraphError> {
        let txn = self.txn.as_mut().ok_or(GraphError::NoTransaction)?;
        self.rt.block_on(txn.run(q)).map_err(backend_err)
    }

    fn read_rows(&mut self, q: Query) -> Result<Vec<neo4rs::Row>, GraphError> {
        let txn = self.txn.as_mut().ok_or(GraphError::NoTransaction)?;
        self.rt
            .block_on(async {
                let mut rows = Vec::new();
                let mut stream = txn.execute(q).await?;
                while let Some(row) = stream.next(txn.handle()).await? {
                    rows.push(row);
                }
                Ok::<_, neo4rs::Error>(rows)
            })
            .map_err(backend_err)
    }

    fn read_count(&mut self, q: Query) -> Result<usize, GraphError> {
        let rows = self.read_rows(q)?;
        match rows.first() {
            Some(row) => {
                let count: i64 = row.get("c").map_err(backend_err)?;
                Ok(count.max(0) as usize)
            }
            None => Ok(0),
        }
    }

    fn node_params(node: NodeRef<'_>, props: &BTreeMap<String, Value>) -> BTreeMap<String, Value> {
        let mut params = props.clone();
        params.insert(node.id_field.to_string(), node.id.clone());
        params
    }

    fn id_param(node: NodeRef<'_>) -> BTreeMap<String, Value> {
        BTreeMap::from([(node.id_field.to_string(), node.id.clone())])
    }
}

impl GraphStore for BoltGraph {
    fn begin(&mut self) -> Result<(), GraphError> {
        if self.txn.is_some() {
            return Err(GraphError::TransactionOpen);
        }
        let txn = self
            .rt
            .block_on(self.graph.start_txn())
            .map_err(backend_err)?;
        self.txn = Some(txn);
        Ok(())
    }

    fn commit(&mut self) -> Result<(), GraphError> {
        let txn = self.txn.take().ok_or(GraphError::NoTransaction)?;
        self.rt.block_on(txn.commit()).map_err(backend_err)
    }

    fn rollback(&mut self) -> Result<(), GraphError> {
        let txn = self.txn.take().ok_or(GraphError::NoTransaction)?;
        self.rt.block_on(txn.rollback()).map_err(backend_err)
    }

    fn node_exists(&mut self, node: NodeRef<'_>) -> Result<bool, GraphError> {
        let q = with_params(
            &cypher::node_exists(node.kind, node.id_field),
            &Self::id_param(node),
        );
        let count = self.read_count(q)?;
        if count > 1 {
            warn!(kind = node.kind, "more than one node found for one identity");
        }
        Ok(count >= 1)
    }

    fn merge_node(
        &mut self,
        node: NodeRef<'_>,
        props: &BTreeMap<String, Value>,
    ) -> Result<WriteSummary, GraphError> {
        let existed = self.node_exists(node)?;
        let keys: Vec<&str> = props.keys().map(String::as_str).collect();
        let statement = cypher::upsert_node(node.kind, node.id_field, &keys);
        self.run(with_params(&statement, &Self::node_params(node, props)))?;
        Ok(WriteSummary {
            nodes_created: usize::from(!existed),
            nodes_updated: usize::from(existed),
            ..Default::default()
        })
    }

    fn create_node(
        &mut self,
        kind: &str,
        props: &BTreeMap<String, Value>,
    ) -> Result<WriteSummary, GraphError> {
        let keys: Vec<&str> = props.keys().map(String::as_str).collect();
        let statement = cypher::new_node(kind, &keys);
        self.run(with_params(&statement, props))?;
        Ok(WriteSummary {
            nodes_created: 1,
            ..Default::default()
        })
    }

    fn detach_delete(&mut self, node: NodeRef<'_>) -> Result<WriteSummary, GraphError> {
        if !self.node_exists(node)? {
            return Ok(WriteSummary::default());
        }
        let edges = self.read_count(with_params(
            &cypher::count_node_edges(node.kind, node.id_field),
            &Self::id_param(node),
        ))?;
        self.run(with_params(
            &cypher::detach_delete(node.kind, node.id_field),
            &Self::id_param(node),
        ))?;
        Ok(WriteSummary {
            nodes_deleted: 1,
            relationships_deleted: edges,
            ..Default::default()
        })
    }

    fn children_with_single_parent(
        &mut self,
        node: NodeRef<'_>,
    ) -> Result<Vec<StoredNode>, GraphError> {
        let q = with_params(
            &cypher::children_with_single_parent(node.kind, node.id_field),
            &Self::id_param(node),
        );
        let rows = self.read_rows(q)?;
        let mut children = Vec::new();
        for row in rows {
            let child: neo4rs::Node = row.get("m").map_err(backend_err)?;
            let kind = child
                .labels()
                .first()
                .map(|l| l.to_string())
                .unwrap_or_default();
            let raw: BTreeMap<String, serde_json::Value> = child.to().map_err(backend_err)?;
            let props = raw
                .iter()
                .map(|(k, v)| (k.clone(), Value::from_json(v)))
                .collect();
            children.push(StoredNode { kind, props });
        }
        Ok(children)
    }

    fn linked_parent_id(
        &mut self,
        child: NodeRef<'_>,
        label: &str,
        parent_kind: &str,
        parent_id_field: &str,
    ) -> Result<Option<Value>, GraphError> {
        let q = with_params(
            &cypher::linked_parent(child.kind, child.id_field, label, parent_kind, parent_id_field),
            &Self::id_param(child),
        );
        let rows = self.read_rows(q)?;
        match rows.first() {
            Some(row) => {
                let raw: serde_json::Value = row.get("parent_id").map_err(backend_err)?;
                Ok(Some(Value::from_json(&raw)))
            }
            None => Ok(None),
        }
    }

    fn parent_has_other_child(
        &mut self,
        child: NodeRef<'_>,
        label: &str,
        parent: NodeRef<'_>,
    ) -> Result<bool, GraphError> {
        let mut params = Self::id_param(child);
        params.insert(cypher::PARENT_ID_PARAM.to_string(), parent.id.clone());
        let q = with_params(
            &cypher::parent_has_other_child(
                child.kind,
                child.id_field,
                label,
                parent.kind,
                parent.id_field,
            ),
            &params,
        );
        Ok(self.read_count(q)? > 0)
    }

    fn delete_edge(
        &mut self,
        child: NodeRef<'_>,
        label: &str,
        parent_kind: &str,
    ) -> Result<WriteSummary, GraphError> {
        let linked = self.read_count(with_params(
            &cypher::count_linked_edges(child.kind, child.id_field, label, parent_kind),
            &Self::id_param(child),
        ))?;
        self.run(with_params(
            &cypher::delete_linked_edge(child.kind, child.id_field, label, parent_kind),
            &Self::id_param(child),
        ))?;
        Ok(WriteSummary {
            relationships_deleted: linked,
            ..Default::default()
        })
    }

    fn merge_edge(
        &mut self,
        child: NodeRef<'_>,
        label: &str,
        parent: NodeRef<'_>,
        props: &BTreeMap<String, Value>,
    ) -> Result<WriteSummary, GraphError> {
        let mut params = Self::node_params(child, props);
        params.insert(cypher::PARENT_ID_PARAM.to_string(), parent.id.clone());

        let existed = self.read_count(with_params(
            &cypher::edge_exists(child.kind, child.id_field, label, parent.kind, parent.id_field),
            &params,
        ))? > 0;

        let keys: Vec<&str> = props.keys().map(String::as_str).collect();
        let statement = cypher::merge_edge(
            child.kind,
            child.id_field,
            label,
            parent.kind,
            parent.id_field,
            &keys,
        );
        self.run(with_params(&statement, &params))?;
        Ok(WriteSummary {
            relationships_created: usize::from(!existed),
            relationships_updated: usize::from(existed),
            ..Default::default()
        })
    }

    fn wipe(&mut self) -> Result<WriteSummary, GraphError> {
        let nodes = self.read_count(query(&cypher::count_nodes()))?;
        let relationships = self.read_count(query(&cypher::count_relationships()))?;
        self.run(query(&cypher::wipe()))?;
        Ok(WriteSummary {
            nodes_deleted: nodes,
            relationships_deleted: relationships,
            ..Default::default()
        })
    }

    fn wipe_batch(&mut self, limit: usize) -> Result<WriteSummary, GraphError> {
        let nodes_before = self.read_count(query(&cypher::count_nodes()))?;
        let rels_before = self.read_count(query(&cypher::count_relationships()))?;
        self.run(query(&cypher::wipe_batch(limit)))?;
        let nodes_after = self.read_count(query(&cypher::count_nodes()))?;
        let rels_after = self.read_count(query(&cypher::count_relationships()))?;
        Ok(WriteSummary {
            nodes_deleted: nodes_before.saturating_sub(nodes_after),
            relationships_deleted: rels_before.saturating_sub(rels_after),
            ..Default::default()
        })
    }

    fn btree_indexes(&mut self) -> Result<BTreeSet<IndexKey>, GraphError> {
        let rows = self.read_rows(query(&cypher::show_indexes()))?;
        let mut keys = BTreeSet::new();
        for row in rows {
            let index_type: String = match row.get("type") {
                Ok(t) => t,
                Err(_) => continue,
            };
            if index_type != "BTREE" {
                continue;
            }
            let labels: Vec<String> = row.get("labelsOrTypes").map_err(backend_err)?;
            let properties: Vec<String> = row.get("properties").map_err(backend_err)?;
            if let Some(label) = labels.first() {
                keys.insert(index_key(label, &properties));
            }
        }
        Ok(keys)
    }

    fn create_index(&mut self, kind: &str, props: &[String]) -> Result<(), GraphError> {
        self.run(query(&cypher::create_index(kind, props)))
    }
}

impl Drop for BoltGraph {
    /// An interrupted load must not leave a dangling transaction behind.
    fn drop(&mut self) {
        if let Some(txn) = self.txn.take() {
            let _ = self.rt.block_on(txn.rollback());
        }
    }
}

//! Graph writer: applies prepared nodes and their edges to a store.
//!
//! Owns the mode semantics (upsert, insert-only, delete cascade), the
//! multiplicity handling on edges, the missing-parent plugin delegation and
//! the index creation. Counters accumulate in a pending set and only move to
//! the committed set when the orchestrator confirms a commit, so a rollback
//! never leaks counted writes.

use std::collections::{BTreeMap, BTreeSet, VecDeque};

use tracing::{debug, error, info, warn};

use crate::config::{LoadMode, RebindPolicy};
use crate::error::LoadError;
use crate::graph::{GraphStore, NodeRef, index_key};
use crate::plugin::{LoaderPlugin, PluginEvent, PluginEventKind};
use crate::prepare::PreparedNode;
use crate::schema::{Multiplicity, SchemaModel, TYPE_COLUMN};
use crate::stats::LoadCounters;
use crate::validation::{MISSING_PLACEHOLDER, ValidationReporter, ViolationReason};
use crate::value::Value;

/// Column name reported when a row's parent pointers all failed to resolve.
const PARENT_RELATIONSHIPS_COLUMN: &str = "!PARENT RELATIONSHIPS!";

struct ResolvedEdge {
    label: String,
    multiplicity: Multiplicity,
    parent_kind: String,
    parent_id_field: String,
    parent_id: Value,
}

/// Writes prepared nodes and edges through a `GraphStore`.
pub struct GraphWriter<'a> {
    schema: &'a SchemaModel,
    pending: LoadCounters,
    committed: LoadCounters,
    indexes_created: usize,
}

impl<'a> GraphWriter<'a> {
    pub fn new(schema: &'a SchemaModel) -> Self {
        Self {
            schema,
            pending: LoadCounters::new(),
            committed: LoadCounters::new(),
            indexes_created: 0,
        }
    }

    /// Counters confirmed by a commit.
    pub fn counters(&self) -> &LoadCounters {
        &self.committed
    }

    /// Number of indexes created by `create_indexes`.
    pub fn indexes_created(&self) -> usize {
        self.indexes_created
    }

    /// Move pending counters into the committed set after the store
    /// confirmed a commit.
    pub fn commit_pending(&mut self) {
        let pending = std::mem::take(&mut self.pending);
        self.committed.merge(&pending);
    }

    /// Drop pending counters after a rollback.
    pub fn discard_pending(&mut self) {
        self.pending = LoadCounters::new();
    }

    /// Create every missing BTREE index declared by the schema. Presence is
    /// checked by (label, sorted property tuple).
    pub fn create_indexes(&mut self, store: &mut dyn GraphStore) -> Result<usize, LoadError> {
        let mut existing = store.btree_indexes()?;
        let mut created = 0usize;
        for (kind, props) in self.schema.index_specs() {
            if existing.insert(index_key(&kind, &props)) {
                store.create_index(&kind, &props)?;
                created += 1;
                info!(kind = %kind, props = ?props, "index created");
            }
        }
        self.indexes_created += created;
        Ok(created)
    }

    /// Apply one prepared node according to the loading mode.
    pub fn write_node(
        &mut self,
        store: &mut dyn GraphStore,
        prepared: &PreparedNode,
        mode: LoadMode,
        line: usize,
        filename: &str,
        reporter: &mut ValidationReporter,
    ) -> Result<(), LoadError> {
        let Some(id_field) = prepared.id_field(self.schema) else {
            reporter.violation(
                filename,
                &[line],
                MISSING_PLACEHOLDER,
                MISSING_PLACEHOLDER,
                ViolationReason::MissingIdField,
            )?;
            return Err(LoadError::MissingId { line });
        };
        let Some(id) = prepared.id(self.schema).cloned() else {
            reporter.violation(
                filename,
                &[line],
                id_field,
                MISSING_PLACEHOLDER,
                ViolationReason::MissingId,
            )?;
            return Err(LoadError::MissingId { line });
        };
        let node = NodeRef {
            kind: &prepared.kind,
            id_field,
            id: &id,
        };
        match mode {
            LoadMode::Upsert => {
                let props = self.own_props(prepared, Some(id_field));
                let summary = store.merge_node(node, &props)?;
                self.pending.record_node(&prepared.kind, &summary);
            }
            LoadMode::New => {
                if store.node_exists(node)? {
                    reporter.violation(
                        filename,
                        &[line],
                        id_field,
                        &id.to_string(),
                        ViolationReason::NodeExists,
                    )?;
                    return Err(LoadError::NodeExists {
                        line,
                        kind: prepared.kind.clone(),
                        id_field: id_field.to_string(),
                        id: id.to_string(),
                    });
                }
                let props = self.own_props(prepared, None);
                let summary = store.create_node(&prepared.kind, &props)?;
                self.pending.record_node(&prepared.kind, &summary);
            }
            LoadMode::Delete => self.delete_cascade(store, node)?,
        }
        Ok(())
    }

    /// Delete a node and, recursively, every child whose only parent sits
    /// inside the cascade rooted here. The traversal queries the live store
    /// and completes before the first deletion, so a child holding a parent
    /// outside the cascade is retained with its other edges.
    pub fn delete_cascade(
        &mut self,
        store: &mut dyn GraphStore,
        root: NodeRef<'_>,
    ) -> Result<(), LoadError> {
        let mut queue: VecDeque<(String, String, Value)> = VecDeque::new();
        let mut visited: BTreeSet<(String, String)> = BTreeSet::new();
        let mut doomed: Vec<(String, String, Value)> = Vec::new();

        queue.push_back((
            root.kind.to_string(),
            root.id_field.to_string(),
            root.id.clone(),
        ));
        visited.insert((root.kind.to_string(), root.id.to_string()));

        while let Some((kind, id_field, id)) = queue.pop_front() {
            let node = NodeRef {
                kind: &kind,
                id_field: &id_field,
                id: &id,
            };
            for child in store.children_with_single_parent(node)? {
                let Some(child_id_field) = self.schema.id_field(&child.kind) else {
                    warn!(kind = %child.kind, "child kind has no id field, skipping cascade");
                    continue;
                };
                let Some(child_id) = child
                    .props
                    .get(child_id_field)
                    .filter(|v| !v.is_null())
                    .cloned()
                else {
                    warn!(kind = %child.kind, "child has no id value, skipping cascade");
                    continue;
                };
                if visited.insert((child.kind.clone(), child_id.to_string())) {
                    queue.push_back((child.kind, child_id_field.to_string(), child_id));
                }
            }
            doomed.push((kind, id_field, id));
        }

        for (kind, id_field, id) in doomed {
            let summary = store.detach_delete(NodeRef {
                kind: &kind,
                id_field: &id_field,
                id: &id,
            })?;
            self.pending.record_deleted(&kind, &summary);
        }
        Ok(())
    }

    /// Resolve and write every edge a prepared row encodes. Returns the
    /// number of nodes synthesized by plugins along the way.
    #[allow(clippy::too_many_arguments)]
    pub fn write_edges(
        &mut self,
        store: &mut dyn GraphStore,
        prepared: &PreparedNode,
        mode: LoadMode,
        rebind_policy: RebindPolicy,
        line: usize,
        filename: &str,
        reporter: &mut ValidationReporter,
        plugins: &mut [Box<dyn LoaderPlugin>],
    ) -> Result<usize, LoadError> {
        let pointers = prepared.parent_pointers();
        if pointers.is_empty() {
            return Ok(0);
        }
        let Some(id_field) = prepared.id_field(self.schema) else {
            return Err(LoadError::MissingId { line });
        };
        let Some(id) = prepared.id(self.schema).cloned() else {
            return Err(LoadError::MissingId { line });
        };
        let child = NodeRef {
            kind: &prepared.kind,
            id_field,
            id: &id,
        };
        let rel_props = prepared.relationship_props(self.schema);

        let mut resolved: Vec<ResolvedEdge> = Vec::new();
        let mut intermediate = 0usize;

        for &(column, parent_kind, parent_field, value) in &pointers {
            let Some(rel) = self.schema.relationship(&prepared.kind, parent_kind) else {
                error!(line, column = %column, "relationship not found");
                reporter.violation(
                    filename,
                    &[line],
                    column,
                    MISSING_PLACEHOLDER,
                    ViolationReason::UndefinedRelationship,
                )?;
                return Err(LoadError::UndefinedRelationship {
                    line,
                    column: column.to_string(),
                });
            };
            if value.is_null() {
                warn!(line, column = %column, "parent pointer has no value");
                continue;
            }
            let parent = NodeRef {
                kind: parent_kind,
                id_field: parent_field,
                id: value,
            };
            if !store.node_exists(parent)? {
                let mut created = false;
                for plugin in plugins.iter_mut() {
                    if !plugin.should_run(parent_kind, PluginEventKind::MissingParent) {
                        continue;
                    }
                    let event = PluginEvent::MissingParent {
                        line,
                        kind: parent_kind,
                        id_field: parent_field,
                        id: value,
                        row: prepared,
                    };
                    if plugin.handle(store, &event)? {
                        created = true;
                        intermediate += 1;
                        resolved.push(ResolvedEdge {
                            label: rel.label.to_string(),
                            multiplicity: rel.multiplicity,
                            parent_kind: parent_kind.to_string(),
                            parent_id_field: parent_field.to_string(),
                            parent_id: (*value).clone(),
                        });
                        break;
                    }
                    error!(
                        line,
                        kind = %parent_kind,
                        "could not create parent node automatically"
                    );
                }
                if !created {
                    warn!(
                        line,
                        "parent node (:{} {{ {}: \"{}\" }}) not found",
                        parent_kind,
                        parent_field,
                        value
                    );
                }
            } else if rel.multiplicity == Multiplicity::OneToOne
                && store.parent_has_other_child(child, rel.label, parent)?
            {
                error!(
                    line,
                    "one_to_one relationship failed, parent already has a child"
                );
            } else {
                resolved.push(ResolvedEdge {
                    label: rel.label.to_string(),
                    multiplicity: rel.multiplicity,
                    parent_kind: parent_kind.to_string(),
                    parent_id_field: parent_field.to_string(),
                    parent_id: (*value).clone(),
                });
            }
        }

        if resolved.is_empty() {
            let values = pointers
                .iter()
                .map(|(_, _, _, v)| v.to_string())
                .collect::<Vec<_>>()
                .join(",");
            reporter.violation(
                filename,
                &[line],
                PARENT_RELATIONSHIPS_COLUMN,
                &values,
                ViolationReason::InvalidRelationship,
            )?;
            return Err(LoadError::NoParentsFound { line });
        }

        for edge in &resolved {
            let parent = NodeRef {
                kind: &edge.parent_kind,
                id_field: &edge.parent_id_field,
                id: &edge.parent_id,
            };
            if edge.multiplicity.is_single_parent() {
                match mode {
                    LoadMode::Upsert => {
                        let old = store.linked_parent_id(
                            child,
                            &edge.label,
                            &edge.parent_kind,
                            &edge.parent_id_field,
                        )?;
                        if let Some(old) = old {
                            if old != edge.parent_id {
                                warn!(
                                    line,
                                    "old parent is different from new parent, \
                                     removing relationship to (:{} {{ {}: \"{}\" }})",
                                    edge.parent_kind,
                                    edge.parent_id_field,
                                    old
                                );
                                if rebind_policy == RebindPolicy::Deny {
                                    return Err(LoadError::RebindDenied { line });
                                }
                                let summary =
                                    store.delete_edge(child, &edge.label, &edge.parent_kind)?;
                                self.pending.record_relationship(&edge.label, &summary);
                            }
                        }
                    }
                    LoadMode::New => {
                        let existing = store.linked_parent_id(
                            child,
                            &edge.label,
                            &edge.parent_kind,
                            &edge.parent_id_field,
                        )?;
                        if existing.is_some() {
                            reporter.violation(
                                filename,
                                &[line],
                                &edge.parent_id_field,
                                &edge.parent_id.to_string(),
                                ViolationReason::RelationshipExists,
                            )?;
                            return Err(LoadError::RelationshipExists { line });
                        }
                    }
                    LoadMode::Delete => {}
                }
            } else {
                debug!(multiplicity = edge.multiplicity.name(), "no edge cleanup needed");
            }
            let props = rel_props.get(&edge.label).cloned().unwrap_or_default();
            let summary = store.merge_edge(child, &edge.label, parent, &props)?;
            self.pending.record_relationship(&edge.label, &summary);
        }

        for plugin in plugins.iter_mut() {
            if plugin.should_run(&prepared.kind, PluginEventKind::NodeLoaded) {
                let event = PluginEvent::NodeLoaded {
                    line,
                    row: prepared,
                };
                if plugin.handle(store, &event)? {
                    intermediate += 1;
                }
            }
        }
        Ok(intermediate)
    }

    /// Record a wipe's deletions into the pending counters.
    pub fn record_wipe(&mut self, summary: &crate::graph::WriteSummary) {
        self.pending.record_wipe(summary);
    }

    /// Own properties as write parameters. The `type` column is the node's
    /// label, never a stored property, so it is excluded here even though it
    /// participates in signatures.
    fn own_props(
        &self,
        prepared: &PreparedNode,
        exclude_id: Option<&str>,
    ) -> BTreeMap<String, Value> {
        prepared
            .own_props(self.schema)
            .into_iter()
            .filter(|(key, _)| *key != TYPE_COLUMN && Some(*key) != exclude_id)
            .map(|(key, value)| (key.to_string(), value.clone()))
            .collect()
    }
}

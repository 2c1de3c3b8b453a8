//! Explicit load counters, passed through the call chain and merged on
//! commit.

use std::collections::BTreeMap;

use serde::Serialize;
use tracing::info;

use crate::graph::WriteSummary;

/// Totals and per-kind / per-label statistics for one load.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct LoadCounters {
    pub nodes_created: usize,
    pub nodes_updated: usize,
    pub nodes_deleted: usize,
    pub relationships_created: usize,
    pub relationships_updated: usize,
    pub relationships_deleted: usize,
    /// Nodes created per kind
    pub nodes_by_kind: BTreeMap<String, usize>,
    /// Nodes deleted per kind
    pub nodes_deleted_by_kind: BTreeMap<String, usize>,
    /// Relationships created per label
    pub relationships_by_label: BTreeMap<String, usize>,
}

impl LoadCounters {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a node write of the given kind.
    pub fn record_node(&mut self, kind: &str, summary: &WriteSummary) {
        self.nodes_created += summary.nodes_created;
        self.nodes_updated += summary.nodes_updated;
        if summary.nodes_created > 0 {
            *self.nodes_by_kind.entry(kind.to_string()).or_default() += summary.nodes_created;
        }
    }

    /// Record an edge write of the given label.
    pub fn record_relationship(&mut self, label: &str, summary: &WriteSummary) {
        self.relationships_created += summary.relationships_created;
        self.relationships_updated += summary.relationships_updated;
        self.relationships_deleted += summary.relationships_deleted;
        if summary.relationships_created > 0 {
            *self
                .relationships_by_label
                .entry(label.to_string())
                .or_default() += summary.relationships_created;
        }
    }

    /// Record a node deletion of the given kind (cascade steps included).
    pub fn record_deleted(&mut self, kind: &str, summary: &WriteSummary) {
        self.nodes_deleted += summary.nodes_deleted;
        self.relationships_deleted += summary.relationships_deleted;
        if summary.nodes_deleted > 0 {
            *self
                .nodes_deleted_by_kind
                .entry(kind.to_string())
                .or_default() += summary.nodes_deleted;
        }
    }

    /// Record a whole-graph wipe.
    pub fn record_wipe(&mut self, summary: &WriteSummary) {
        self.nodes_deleted += summary.nodes_deleted;
        self.relationships_deleted += summary.relationships_deleted;
    }

    /// Accumulate another counter set into this one.
    pub fn merge(&mut self, other: &LoadCounters) {
        self.nodes_created += other.nodes_created;
        self.nodes_updated += other.nodes_updated;
        self.nodes_deleted += other.nodes_deleted;
        self.relationships_created += other.relationships_created;
        self.relationships_updated += other.relationships_updated;
        self.relationships_deleted += other.relationships_deleted;
        for (kind, count) in &other.nodes_by_kind {
            *self.nodes_by_kind.entry(kind.clone()).or_default() += count;
        }
        for (kind, count) in &other.nodes_deleted_by_kind {
            *self.nodes_deleted_by_kind.entry(kind.clone()).or_default() += count;
        }
        for (label, count) in &other.relationships_by_label {
            *self.relationships_by_label.entry(label.clone()).or_default() += count;
        }
    }

    /// Log per-kind, per-label and total statistics.
    pub fn log_totals(&self) {
        for (kind, count) in &self.nodes_by_kind {
            info!("node (:{}) loaded: {}", kind, count);
        }
        for (label, count) in &self.relationships_by_label {
            info!("relationship [:{}] loaded: {}", label, count);
        }
        info!(
            "{} nodes and {} relationships loaded",
            self.nodes_created, self.relationships_created
        );
        info!(
            "{} nodes and {} relationships deleted",
            self.nodes_deleted, self.relationships_deleted
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_and_merge() {
        let created = WriteSummary {
            nodes_created: 1,
            ..Default::default()
        };
        let mut a = LoadCounters::new();
        a.record_node("case", &created);
        a.record_node("case", &created);
        a.record_relationship(
            "of_case",
            &WriteSummary {
                relationships_created: 1,
                ..Default::default()
            },
        );

        let mut b = LoadCounters::new();
        b.record_node("case", &created);
        b.record_deleted(
            "sample",
            &WriteSummary {
                nodes_deleted: 2,
                relationships_deleted: 1,
                ..Default::default()
            },
        );

        a.merge(&b);
        assert_eq!(a.nodes_created, 3);
        assert_eq!(a.nodes_by_kind["case"], 3);
        assert_eq!(a.relationships_by_label["of_case"], 1);
        assert_eq!(a.nodes_deleted, 2);
        assert_eq!(a.nodes_deleted_by_kind["sample"], 2);
    }

    #[test]
    fn test_matched_writes_do_not_count_as_created() {
        let mut c = LoadCounters::new();
        c.record_node(
            "case",
            &WriteSummary {
                nodes_updated: 1,
                ..Default::default()
            },
        );
        assert_eq!(c.nodes_created, 0);
        assert_eq!(c.nodes_updated, 1);
        assert!(c.nodes_by_kind.is_empty());
    }
}

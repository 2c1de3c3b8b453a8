//! Graph data loader - projects tab-separated biomedical dataset files into
//! a property graph shaped by a YAML schema.
//!
//! Provides:
//! - Schema model loading and per-record validation
//! - Row preparation (coercion, parent-id injection, UUIDv5 identity)
//! - Pre-load file validation with a machine-readable violation log
//! - A graph store seam with in-memory and Bolt backends
//! - The two-pass (nodes, then edges) load protocol with upsert,
//!   insert-only and cascading delete modes
//! - A plugin port for synthesizing missing parents and post-load nodes

pub mod backup;
pub mod coerce;
pub mod config;
pub mod error;
pub mod graph;
pub mod loader;
pub mod plugin;
pub mod prepare;
pub mod schema;
pub mod stats;
pub mod tsv;
pub mod validation;
pub mod value;
pub mod writer;

#[cfg(feature = "cli")]
pub mod cli;

// Re-export commonly used types
pub use backup::{BackupProvider, Neo4jAdminBackup};
pub use config::{LoadMode, LoadOptions, LoaderConfig, PluginConfig, RebindPolicy};
pub use error::LoadError;
#[cfg(feature = "bolt")]
pub use graph::BoltGraph;
pub use graph::{GraphStore, MemoryGraph, NodeRef, StoredNode, WriteSummary};
pub use loader::{BATCH_SIZE, DataLoader, LoadReport};
pub use plugin::{LoaderPlugin, PluginEvent, PluginEventKind, PluginRegistry};
pub use prepare::{PreparedNode, RowPreparer};
pub use schema::{SchemaDocument, SchemaModel};
pub use stats::LoadCounters;
pub use validation::{FileValidator, ValidationReporter, ViolationReason};
pub use value::Value;
pub use writer::GraphWriter;

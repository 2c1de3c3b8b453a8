//! Load-time errors.
//!
//! Validation findings are reported through the validation log; the variants
//! here abort the current transaction instead.

use std::path::PathBuf;

use thiserror::Error;

use crate::graph::GraphError;
use crate::prepare::PrepareError;
use crate::schema::SchemaError;
use crate::tsv::TsvError;
use crate::validation::ValidateError;

/// Errors that abort a load.
#[derive(Error, Debug)]
pub enum LoadError {
    /// An input file is missing or not a regular file
    #[error("file \"{0}\" does not exist")]
    FileNotFound(PathBuf),

    /// Pre-load validation found errors; nothing was written
    #[error("file validation failed, nothing was loaded")]
    ValidationFailed,

    /// Contradictory or incomplete options
    #[error("invalid configuration: {0}")]
    Config(String),

    /// Input file could not be read
    #[error(transparent)]
    Tsv(#[from] TsvError),

    /// Graph store failure
    #[error(transparent)]
    Graph(#[from] GraphError),

    /// Schema files could not be loaded
    #[error(transparent)]
    Schema(#[from] SchemaError),

    /// A row could not be prepared
    #[error("line {line}: {source}")]
    Prepare { line: usize, source: PrepareError },

    /// A row carries no usable identity
    #[error("line {line}: no id found, abort loading")]
    MissingId { line: usize },

    /// Insert-only mode hit an existing node
    #[error("line {line}: node (:{kind} {{ {id_field}: {id} }}) exists, abort loading")]
    NodeExists {
        line: usize,
        kind: String,
        id_field: String,
        id: String,
    },

    /// A parent pointer names no declared relationship
    #[error("line {line}: undefined relationship for column \"{column}\", abort loading")]
    UndefinedRelationship { line: usize, column: String },

    /// Insert-only mode hit an existing edge of the same label
    #[error("line {line}: relationship already exists, abort loading")]
    RelationshipExists { line: usize },

    /// A row provided parent pointers but none resolved
    #[error("line {line}: no parents found, abort loading")]
    NoParentsFound { line: usize },

    /// The rebind policy forbids moving a bound edge to a different parent
    #[error("line {line}: relationship already bound to a different parent")]
    RebindDenied { line: usize },

    /// The validation log could not be written
    #[error("cannot write validation log: {0}")]
    Report(#[from] std::io::Error),

    /// Database backup failed
    #[error("backup failed: {0}")]
    Backup(String),

    /// Validation could not run at all
    #[error(transparent)]
    Validate(#[from] ValidateError),

    /// A plugin reported a failure
    #[error("plugin \"{name}\" failed: {reason}")]
    Plugin { name: String, reason: String },

    /// Configuration names a plugin the registry does not know
    #[error("unknown plugin \"{0}\"")]
    UnknownPlugin(String),
}

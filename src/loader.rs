//! Load orchestrator: runs the full protocol against a graph store.
//!
//! Order of operations: file checks, validation, backup, index session,
//! optional wipe, node pass, edge pass, post-load plugins. Index creation
//! and data writes never share a transaction.

use std::path::Path;
use std::time::{Duration, Instant};

use chrono::Utc;
use tracing::{info, info_span, warn};

use crate::backup::BackupProvider;
use crate::config::{LoadMode, LoadOptions};
use crate::error::LoadError;
use crate::graph::GraphStore;
use crate::plugin::LoaderPlugin;
use crate::prepare::RowPreparer;
use crate::schema::{SchemaModel, is_parent_pointer};
use crate::stats::LoadCounters;
use crate::tsv;
use crate::validation::{FileValidator, ValidationReporter};
use crate::writer::GraphWriter;

/// Rows per transaction in split-transaction mode.
pub const BATCH_SIZE: usize = 1000;

/// Outcome of a load run.
#[derive(Debug)]
pub struct LoadReport {
    /// Merged engine and plugin counters
    pub counters: LoadCounters,
    /// Indexes created during the schema session
    pub indexes_created: usize,
    /// Whether this was a dry run (zero writes)
    pub dry_run: bool,
    /// Restore instructions from the backup step, when one was taken
    pub restore_command: Option<String>,
    /// Wall-clock duration of the run
    pub duration: Duration,
}

/// Drives validation, node and edge passes over a set of input files.
pub struct DataLoader<'a> {
    schema: &'a SchemaModel,
    plugins: Vec<Box<dyn LoaderPlugin>>,
    backup: Option<Box<dyn BackupProvider>>,
}

impl<'a> DataLoader<'a> {
    pub fn new(schema: &'a SchemaModel) -> Self {
        Self {
            schema,
            plugins: Vec::new(),
            backup: None,
        }
    }

    /// Attach plugins discovered from the configuration.
    pub fn with_plugins(mut self, plugins: Vec<Box<dyn LoaderPlugin>>) -> Self {
        self.plugins = plugins;
        self
    }

    /// Attach a backup provider for the pre-load backup step.
    pub fn with_backup(mut self, provider: Box<dyn BackupProvider>) -> Self {
        self.backup = Some(provider);
        self
    }

    /// Run the full load protocol. On failure the current transaction is
    /// rolled back and pending counters are discarded; in split-transaction
    /// mode previously committed batches persist.
    pub fn load<P: AsRef<Path>>(
        &mut self,
        store: &mut dyn GraphStore,
        files: &[P],
        options: &LoadOptions,
        reporter: &mut ValidationReporter,
    ) -> Result<LoadReport, LoadError> {
        let _span = info_span!("load", mode = %options.mode, dry_run = options.dry_run).entered();
        let start = Instant::now();

        options
            .validate()
            .map_err(|e| LoadError::Config(e.to_string()))?;
        self.check_files(files)?;

        let validator = FileValidator::new(self.schema);
        if !validator.validate_files(files, options.cheat_mode, options.max_violations, reporter)? {
            return Err(LoadError::ValidationFailed);
        }
        reporter.section("No file validation errors. Loading validation errors below.")?;

        let mut restore_command = None;
        if !options.no_backup && !options.dry_run {
            let provider = self.backup.as_ref().ok_or_else(|| {
                LoadError::Config("backup is enabled but no backup provider is configured".into())
            })?;
            let folder = options
                .backup_folder
                .as_ref()
                .ok_or_else(|| LoadError::Config("backup folder not specified".into()))?;
            let name = Utc::now().format("%Y%m%d-%H%M%S").to_string();
            let command = provider.backup(folder, &name)?;
            info!("{}", command);
            restore_command = Some(command);
        }

        if options.dry_run {
            info!("dry run mode, no nodes or relationships loaded");
            info!(seconds = start.elapsed().as_secs_f64(), "running time");
            return Ok(LoadReport {
                counters: LoadCounters::new(),
                indexes_created: 0,
                dry_run: true,
                restore_command,
                duration: start.elapsed(),
            });
        }

        let mut writer = GraphWriter::new(self.schema);

        // Index creation gets its own session-level transaction.
        store.begin()?;
        match writer.create_indexes(store) {
            Ok(count) => {
                store.commit()?;
                info!(indexes = count, "index pass complete");
            }
            Err(e) => {
                let _ = store.rollback();
                return Err(e);
            }
        }

        let result = if options.split_transactions {
            self.run_split(store, &mut writer, files, options, reporter)
        } else {
            self.run_single(store, &mut writer, files, options, reporter)
        };
        if let Err(e) = result {
            let _ = store.rollback();
            writer.discard_pending();
            return Err(e);
        }

        let mut counters = writer.counters().clone();
        for plugin in &self.plugins {
            counters.merge(plugin.counters());
        }
        counters.log_totals();
        info!(indexes = writer.indexes_created(), "new indexes created");
        let duration = start.elapsed();
        info!(seconds = duration.as_secs_f64(), "loading time");

        Ok(LoadReport {
            counters,
            indexes_created: writer.indexes_created(),
            dry_run: false,
            restore_command,
            duration,
        })
    }

    fn check_files<P: AsRef<Path>>(&self, files: &[P]) -> Result<(), LoadError> {
        if files.is_empty() {
            return Err(LoadError::Config("no input files to load".into()));
        }
        for file in files {
            let path = file.as_ref();
            if !path.is_file() {
                return Err(LoadError::FileNotFound(path.to_path_buf()));
            }
        }
        Ok(())
    }

    /// One transaction per pass; failure rolls the whole pass back.
    fn run_single<P: AsRef<Path>>(
        &mut self,
        store: &mut dyn GraphStore,
        writer: &mut GraphWriter<'a>,
        files: &[P],
        options: &LoadOptions,
        reporter: &mut ValidationReporter,
    ) -> Result<(), LoadError> {
        store.begin()?;
        if options.wipe_db {
            let summary = store.wipe()?;
            info!(
                nodes = summary.nodes_deleted,
                relationships = summary.relationships_deleted,
                "database wiped"
            );
            writer.record_wipe(&summary);
        }
        for file in files {
            self.node_pass_file(store, writer, file.as_ref(), options, reporter, false)?;
        }
        store.commit()?;
        writer.commit_pending();

        if options.mode != LoadMode::Delete {
            store.begin()?;
            for file in files {
                self.edge_pass_file(store, writer, file.as_ref(), options, reporter, false)?;
            }
            store.commit()?;
            writer.commit_pending();
        }
        Ok(())
    }

    /// Commit every `BATCH_SIZE` rows; committed batches survive a failure.
    fn run_split<P: AsRef<Path>>(
        &mut self,
        store: &mut dyn GraphStore,
        writer: &mut GraphWriter<'a>,
        files: &[P],
        options: &LoadOptions,
        reporter: &mut ValidationReporter,
    ) -> Result<(), LoadError> {
        if options.wipe_db {
            self.wipe_split(store, writer)?;
        }
        store.begin()?;
        for file in files {
            self.node_pass_file(store, writer, file.as_ref(), options, reporter, true)?;
        }
        store.commit()?;
        writer.commit_pending();

        if options.mode != LoadMode::Delete {
            store.begin()?;
            for file in files {
                self.edge_pass_file(store, writer, file.as_ref(), options, reporter, true)?;
            }
            store.commit()?;
            writer.commit_pending();
        }
        Ok(())
    }

    /// Batched wipe: keep deleting until two consecutive batches remove
    /// nothing, each batch in its own transaction.
    fn wipe_split(
        &self,
        store: &mut dyn GraphStore,
        writer: &mut GraphWriter<'a>,
    ) -> Result<(), LoadError> {
        let mut empty_batches = 0usize;
        while empty_batches < 2 {
            store.begin()?;
            match store.wipe_batch(BATCH_SIZE) {
                Ok(summary) => {
                    store.commit()?;
                    if summary.nodes_deleted == 0 && summary.relationships_deleted == 0 {
                        empty_batches += 1;
                    } else {
                        empty_batches = 0;
                        info!(
                            nodes = summary.nodes_deleted,
                            relationships = summary.relationships_deleted,
                            "wipe batch"
                        );
                    }
                    writer.record_wipe(&summary);
                    writer.commit_pending();
                }
                Err(e) => {
                    let _ = store.rollback();
                    return Err(e.into());
                }
            }
        }
        Ok(())
    }

    fn node_pass_file(
        &mut self,
        store: &mut dyn GraphStore,
        writer: &mut GraphWriter<'a>,
        path: &Path,
        options: &LoadOptions,
        reporter: &mut ValidationReporter,
        split: bool,
    ) -> Result<(), LoadError> {
        let action = match options.mode {
            LoadMode::New => "loading new",
            LoadMode::Upsert => "loading",
            LoadMode::Delete => "deleting",
        };
        info!(file = %path.display(), "{} nodes", action);
        let file = tsv::read_tsv(path)?;
        let filename = path.display().to_string();
        let preparer = RowPreparer::new(self.schema);
        let mut batch = 0usize;
        for (index, row) in file.rows.iter().enumerate() {
            let line = file.line_of(index);
            let prepared = preparer
                .prepare(row)
                .map_err(|source| LoadError::Prepare { line, source })?;
            writer.write_node(store, &prepared, options.mode, line, &filename, reporter)?;
            batch += 1;
            if split && batch >= BATCH_SIZE {
                store.commit()?;
                writer.commit_pending();
                store.begin()?;
                batch = 0;
                info!(rows = line - 1, file = %filename, "rows loaded");
            }
        }
        Ok(())
    }

    fn edge_pass_file(
        &mut self,
        store: &mut dyn GraphStore,
        writer: &mut GraphWriter<'a>,
        path: &Path,
        options: &LoadOptions,
        reporter: &mut ValidationReporter,
        split: bool,
    ) -> Result<(), LoadError> {
        info!(file = %path.display(), "loading relationships");
        let file = tsv::read_tsv(path)?;
        let filename = path.display().to_string();
        let preparer = RowPreparer::new(self.schema);

        if !file.headers.iter().any(|h| is_parent_pointer(h)) {
            warn!(file = %filename, "no parent mapping columns in this file");
            return Ok(());
        }

        let mut intermediate = 0usize;
        let mut batch = 0usize;
        for (index, row) in file.rows.iter().enumerate() {
            let line = file.line_of(index);
            let prepared = preparer
                .prepare(row)
                .map_err(|source| LoadError::Prepare { line, source })?;
            intermediate += writer.write_edges(
                store,
                &prepared,
                options.mode,
                options.rebind_policy,
                line,
                &filename,
                reporter,
                &mut self.plugins,
            )?;
            batch += 1;
            if split && batch >= BATCH_SIZE {
                store.commit()?;
                writer.commit_pending();
                store.begin()?;
                batch = 0;
                info!(rows = line - 1, file = %filename, "rows loaded");
            }
        }
        if intermediate > 0 {
            info!(count = intermediate, "intermediate nodes loaded");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::MemoryGraph;
    use crate::schema::SchemaDocument;
    use serde::Deserialize;
    use std::fs;
    use tempfile::TempDir;

    fn model() -> SchemaModel {
        let yaml = r#"
nodes:
  case:
    props:
      case_id: { type: String, required: true }
      breed: { type: String }
  sample:
    props:
      sample_id: { type: String, required: true }
relationships:
  of_case:
    multiplicity: many_to_one
    ends:
      - source: sample
        target: case
properties:
  id_fields:
    case: case_id
    sample: sample_id
"#;
        let mut docs = Vec::new();
        for document in serde_yaml::Deserializer::from_str(yaml) {
            docs.push(SchemaDocument::deserialize(document).unwrap());
        }
        SchemaModel::from_documents(docs).unwrap()
    }

    fn options() -> LoadOptions {
        LoadOptions {
            no_backup: true,
            ..Default::default()
        }
    }

    fn write_file(dir: &TempDir, name: &str, content: &str) -> std::path::PathBuf {
        let path = dir.path().join(name);
        fs::write(&path, content).unwrap();
        path
    }

    #[test]
    fn test_missing_file_aborts() {
        let schema = model();
        let mut store = MemoryGraph::new();
        let dir = TempDir::new().unwrap();
        let mut reporter = ValidationReporter::to_path(&dir.path().join("v.log")).unwrap();
        let err = DataLoader::new(&schema).load(
            &mut store,
            &[dir.path().join("absent.txt")],
            &options(),
            &mut reporter,
        );
        assert!(matches!(err, Err(LoadError::FileNotFound(_))));
    }

    #[test]
    fn test_validation_failure_writes_nothing() {
        let schema = model();
        let mut store = MemoryGraph::new();
        let dir = TempDir::new().unwrap();
        let file = write_file(
            &dir,
            "cases.txt",
            "type\tcase_id\tbreed\ncase\tC1\tPoodle\ncase\tC1\tLabrador\n",
        );
        let mut reporter = ValidationReporter::to_path(&dir.path().join("v.log")).unwrap();
        let err = DataLoader::new(&schema).load(&mut store, &[file], &options(), &mut reporter);
        assert!(matches!(err, Err(LoadError::ValidationFailed)));
        assert_eq!(store.node_count(None), 0);
    }

    #[test]
    fn test_dry_run_reports_zero_writes() {
        let schema = model();
        let mut store = MemoryGraph::new();
        let dir = TempDir::new().unwrap();
        let file = write_file(&dir, "cases.txt", "type\tcase_id\ncase\tC1\n");
        let mut reporter = ValidationReporter::to_path(&dir.path().join("v.log")).unwrap();
        let opts = LoadOptions {
            dry_run: true,
            no_backup: true,
            ..Default::default()
        };
        let report = DataLoader::new(&schema)
            .load(&mut store, &[file], &opts, &mut reporter)
            .unwrap();
        assert!(report.dry_run);
        assert_eq!(report.counters.nodes_created, 0);
        assert_eq!(store.node_count(None), 0);
    }

    #[test]
    fn test_backup_required_without_provider() {
        let schema = model();
        let mut store = MemoryGraph::new();
        let dir = TempDir::new().unwrap();
        let file = write_file(&dir, "cases.txt", "type\tcase_id\ncase\tC1\n");
        let mut reporter = ValidationReporter::to_path(&dir.path().join("v.log")).unwrap();
        let opts = LoadOptions {
            backup_folder: Some(dir.path().join("backup")),
            ..Default::default()
        };
        let err = DataLoader::new(&schema).load(&mut store, &[file], &opts, &mut reporter);
        assert!(matches!(err, Err(LoadError::Config(_))));
    }

    #[test]
    fn test_load_creates_nodes_edges_and_indexes() {
        let schema = model();
        let mut store = MemoryGraph::new();
        let dir = TempDir::new().unwrap();
        let cases = write_file(&dir, "cases.txt", "type\tcase_id\tbreed\ncase\tC1\tPoodle\n");
        let samples = write_file(
            &dir,
            "samples.txt",
            "type\tsample_id\tcase.case_id\nsample\tS1\tC1\n",
        );
        let mut reporter = ValidationReporter::to_path(&dir.path().join("v.log")).unwrap();
        let report = DataLoader::new(&schema)
            .load(&mut store, &[cases, samples], &options(), &mut reporter)
            .unwrap();
        assert_eq!(report.counters.nodes_created, 2);
        assert_eq!(report.counters.relationships_created, 1);
        assert_eq!(report.indexes_created, 2);
        assert!(store.has_index("case", &["case_id".to_string()]));
        assert_eq!(store.edge_count(Some("of_case")), 1);
    }

    #[test]
    fn test_wipe_db_clears_existing_graph() {
        let schema = model();
        let mut store = MemoryGraph::new();
        let dir = TempDir::new().unwrap();
        let cases = write_file(&dir, "cases.txt", "type\tcase_id\ncase\tC1\n");
        let mut reporter = ValidationReporter::to_path(&dir.path().join("v.log")).unwrap();

        let mut loader = DataLoader::new(&schema);
        loader
            .load(&mut store, &[cases.clone()], &options(), &mut reporter)
            .unwrap();

        let other = write_file(&dir, "other.txt", "type\tcase_id\ncase\tC2\n");
        let opts = LoadOptions {
            wipe_db: true,
            no_backup: true,
            ..Default::default()
        };
        let report = loader
            .load(&mut store, &[other], &opts, &mut reporter)
            .unwrap();
        assert_eq!(report.counters.nodes_deleted, 1);
        assert_eq!(store.node_count(None), 1);
        assert!(
            store
                .node_props("case", "case_id", &crate::value::Value::String("C2".into()))
                .is_some()
        );
    }

    #[test]
    fn test_split_mode_wipes_in_batches() {
        let schema = model();
        let mut store = MemoryGraph::new();
        let dir = TempDir::new().unwrap();
        let cases = write_file(&dir, "cases.txt", "type\tcase_id\ncase\tC1\n");
        let mut reporter = ValidationReporter::to_path(&dir.path().join("v.log")).unwrap();

        struct NoopBackup;
        impl crate::backup::BackupProvider for NoopBackup {
            fn backup(&self, _folder: &Path, _name: &str) -> Result<String, LoadError> {
                Ok("restore instructions".to_string())
            }
        }

        let mut loader = DataLoader::new(&schema).with_backup(Box::new(NoopBackup));
        let opts = LoadOptions {
            split_transactions: true,
            wipe_db: true,
            backup_folder: Some(dir.path().join("backup")),
            ..Default::default()
        };
        let report = loader
            .load(&mut store, &[cases], &opts, &mut reporter)
            .unwrap();
        assert_eq!(report.counters.nodes_created, 1);
        assert_eq!(report.restore_command.as_deref(), Some("restore instructions"));
    }
}

//! Pre-load file validation: header checks, id uniqueness, per-row schema
//! validation.

use std::collections::BTreeMap;
use std::path::Path;

use sha2::{Digest, Sha256};
use thiserror::Error;
use tracing::{error, info, warn};

use super::report::{MISSING_PLACEHOLDER, ValidationReporter, ViolationReason};
use crate::prepare::RowPreparer;
use crate::schema::{SchemaModel, TYPE_COLUMN, is_parent_pointer, split_parent_pointer};
use crate::tsv::{self, RawRecord, TsvError};

/// Hard failures while validating (as opposed to validation findings, which
/// are reported and returned as a boolean outcome).
#[derive(Error, Debug)]
pub enum ValidateError {
    /// The input file could not be read or parsed
    #[error(transparent)]
    Tsv(#[from] TsvError),

    /// The validation log could not be written
    #[error("cannot write validation log: {0}")]
    Report(#[from] std::io::Error),
}

/// Id occurrence bookkeeping within one file.
struct IdEntry {
    digest: String,
    lines: Vec<usize>,
}

/// Validates input files against the schema before any write happens.
pub struct FileValidator<'a> {
    schema: &'a SchemaModel,
}

impl<'a> FileValidator<'a> {
    pub fn new(schema: &'a SchemaModel) -> Self {
        Self { schema }
    }

    /// Validate every file; returns true when all pass. In cheat mode all
    /// validation is skipped.
    pub fn validate_files<P: AsRef<Path>>(
        &self,
        files: &[P],
        cheat_mode: bool,
        max_violations: usize,
        reporter: &mut ValidationReporter,
    ) -> Result<bool, ValidateError> {
        if cheat_mode {
            info!("cheat mode enabled, all validations skipped");
            return Ok(true);
        }
        let mut all_passed = true;
        for file in files {
            if !self.validate_file(file.as_ref(), max_violations, reporter)? {
                error!(file = %file.as_ref().display(), "file validation failed");
                all_passed = false;
            }
        }
        Ok(all_passed)
    }

    /// Validate one file. Returns false when any violation classified as an
    /// error was found; short-circuits once `max_violations` errors are
    /// reached (`0` means unlimited).
    pub fn validate_file(
        &self,
        path: &Path,
        max_violations: usize,
        reporter: &mut ValidationReporter,
    ) -> Result<bool, ValidateError> {
        info!(file = %path.display(), "validating file");
        let file = tsv::read_tsv(path)?;
        let filename = path.display().to_string();

        if file.rows.is_empty() {
            warn!(file = %filename, "file has no data rows");
            return Ok(true);
        }
        let kind = file.rows[0]
            .get(TYPE_COLUMN)
            .map(|v| v.trim().to_string())
            .unwrap_or_default();

        if !self.validate_header(&filename, &file.headers, &kind, reporter)? {
            return Ok(false);
        }

        let mut validation_failed = false;
        let mut violations = 0usize;
        let mut ids: BTreeMap<String, IdEntry> = BTreeMap::new();

        for (index, row) in file.rows.iter().enumerate() {
            let line = file.line_of(index);
            let cleaned = RowPreparer::cleanup(row);
            let row_kind = cleaned
                .get(TYPE_COLUMN)
                .cloned()
                .unwrap_or_else(|| kind.clone());

            if let Some(id_field) = self.schema.id_field(&row_kind) {
                let node_id = cleaned
                    .get(id_field)
                    .filter(|v| !v.is_empty())
                    .cloned();
                if let Some(node_id) = node_id {
                    let digest = own_props_digest(self.schema, &cleaned);
                    match ids.get_mut(&node_id) {
                        Some(entry) => {
                            let mut lines = entry.lines.clone();
                            lines.push(line);
                            if entry.digest != digest {
                                error!(
                                    line,
                                    id = %node_id,
                                    "duplicate {} with different properties",
                                    id_field
                                );
                                reporter.violation(
                                    &filename,
                                    &lines,
                                    id_field,
                                    &node_id,
                                    ViolationReason::DuplicateId,
                                )?;
                                validation_failed = true;
                                violations += 1;
                            } else {
                                // Same id, same properties: usually one object
                                // pointed at multiple parents. Loaded once.
                                reporter.violation(
                                    &filename,
                                    &lines,
                                    id_field,
                                    &node_id,
                                    ViolationReason::DuplicateData,
                                )?;
                            }
                            entry.lines.push(line);
                        }
                        None => {
                            ids.insert(node_id, IdEntry { digest, lines: vec![line] });
                        }
                    }
                }
            }

            let result = self.schema.validate_node(&row_kind, &cleaned);
            if !result.ok || result.warning {
                for msg in &result.messages {
                    if result.ok {
                        warn!(line, "{}", msg);
                    } else {
                        error!(line, "{}", msg);
                    }
                }
                for detail in &result.data_messages {
                    reporter.violation(
                        &filename,
                        &[line],
                        &detail.column,
                        &detail.value,
                        ViolationReason::InvalidData,
                    )?;
                }
                for detail in &result.rel_messages {
                    reporter.violation(
                        &filename,
                        &[line],
                        &detail.column,
                        &detail.value,
                        ViolationReason::InvalidRelationship,
                    )?;
                }
                for detail in &result.undefined_relationships {
                    reporter.violation(
                        &filename,
                        &[line],
                        &detail.column,
                        &detail.value,
                        ViolationReason::UndefinedRelationship,
                    )?;
                }
            }
            if !result.ok {
                validation_failed = true;
                violations += 1;
                if max_violations > 0 && violations >= max_violations {
                    error!(file = %filename, violations, "maximum violations reached");
                    return Ok(false);
                }
            }
        }
        Ok(!validation_failed)
    }

    /// Check every header column against the schema. Unknown own properties
    /// are warnings; parent pointers that resolve to nothing are fatal.
    fn validate_header(
        &self,
        filename: &str,
        headers: &[String],
        kind: &str,
        reporter: &mut ValidationReporter,
    ) -> Result<bool, ValidateError> {
        let mut passed = true;
        for header in headers {
            let header = header.trim();
            if header == TYPE_COLUMN {
                continue;
            }
            if is_parent_pointer(header) {
                let Some((parent, field)) = split_parent_pointer(header) else {
                    continue;
                };
                if self.schema.relationship(kind, parent).is_none() {
                    error!(column = %header, "parent pointer names an undeclared relationship");
                    reporter.violation(
                        filename,
                        &[1],
                        header,
                        MISSING_PLACEHOLDER,
                        ViolationReason::UndefinedRelationship,
                    )?;
                    passed = false;
                } else if self
                    .schema
                    .props_for_node(parent)
                    .map(|props| !props.contains_key(field))
                    .unwrap_or(true)
                {
                    error!(column = %header, "parent pointer not found in data model");
                    reporter.violation(
                        filename,
                        &[1],
                        header,
                        MISSING_PLACEHOLDER,
                        ViolationReason::InvalidRelationship,
                    )?;
                    passed = false;
                }
                continue;
            }
            if self.schema.is_relationship_property(header) {
                continue;
            }
            let known = self
                .schema
                .props_for_node(kind)
                .map(|props| props.contains_key(header))
                .unwrap_or(false);
            if !known {
                warn!(column = %header, "property not found in data model");
            }
        }
        if !passed {
            error!(file = %filename, "parent pointer not found in the data model, abort loading");
        }
        Ok(passed)
    }
}

/// Digest over a record's own properties, used to distinguish duplicate ids
/// with identical data from conflicting ones. Parent pointers and
/// relationship properties never participate.
fn own_props_digest(schema: &SchemaModel, record: &RawRecord) -> String {
    let mut hasher = Sha256::new();
    for (column, value) in record {
        if is_parent_pointer(column) || schema.is_relationship_property(column) {
            continue;
        }
        hasher.update(column.as_bytes());
        hasher.update(b"=");
        hasher.update(value.as_bytes());
        hasher.update(b"\n");
    }
    format!("{:x}", hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;
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

    fn write_file(dir: &TempDir, name: &str, content: &str) -> std::path::PathBuf {
        let path = dir.path().join(name);
        fs::write(&path, content).unwrap();
        path
    }

    fn validate(path: &std::path::Path, log: &std::path::Path) -> bool {
        let schema = model();
        let mut reporter = ValidationReporter::to_path(log).unwrap();
        FileValidator::new(&schema)
            .validate_file(path, 10, &mut reporter)
            .unwrap()
    }

    #[test]
    fn test_clean_file_passes() {
        let dir = TempDir::new().unwrap();
        let path = write_file(
            &dir,
            "cases.txt",
            "type\tcase_id\tbreed\ncase\tC1\tPoodle\ncase\tC2\tLabrador\n",
        );
        assert!(validate(&path, &dir.path().join("v.log")));
    }

    #[test]
    fn test_duplicate_id_same_props_is_warning() {
        let dir = TempDir::new().unwrap();
        let path = write_file(
            &dir,
            "cases.txt",
            "type\tcase_id\tbreed\ncase\tC1\tPoodle\ncase\tC1\tPoodle\n",
        );
        let log = dir.path().join("v.log");
        assert!(validate(&path, &log));
        let text = fs::read_to_string(&log).unwrap();
        assert!(text.contains("DUPLICATE_DATA"));
        assert!(!text.contains("DUPLICATE_ID\n"));
    }

    #[test]
    fn test_duplicate_id_different_props_fails() {
        let dir = TempDir::new().unwrap();
        let path = write_file(
            &dir,
            "cases.txt",
            "type\tcase_id\tbreed\ncase\tC1\tPoodle\ncase\tC1\tLabrador\n",
        );
        let log = dir.path().join("v.log");
        assert!(!validate(&path, &log));
        let text = fs::read_to_string(&log).unwrap();
        assert!(text.contains("DUPLICATE_ID"));
        assert!(text.contains("2,3"));
    }

    #[test]
    fn test_undefined_parent_pointer_fails() {
        let dir = TempDir::new().unwrap();
        let path = write_file(
            &dir,
            "samples.txt",
            "type\tsample_id\tstudy.study_id\nsample\tS1\tX\n",
        );
        let log = dir.path().join("v.log");
        assert!(!validate(&path, &log));
        let text = fs::read_to_string(&log).unwrap();
        assert!(text.contains("UNDEFINED_RELATIONSHIP"));
    }

    #[test]
    fn test_unknown_column_is_warning() {
        let dir = TempDir::new().unwrap();
        let path = write_file(
            &dir,
            "cases.txt",
            "type\tcase_id\tcolor\ncase\tC1\tbrown\n",
        );
        let log = dir.path().join("v.log");
        assert!(validate(&path, &log));
        let text = fs::read_to_string(&log).unwrap();
        assert!(text.contains("INVALID_DATA"));
    }

    #[test]
    fn test_missing_required_fails() {
        let dir = TempDir::new().unwrap();
        let path = write_file(&dir, "cases.txt", "type\tbreed\ncase\tPoodle\n");
        let log = dir.path().join("v.log");
        assert!(!validate(&path, &log));
    }

    #[test]
    fn test_max_violations_short_circuits() {
        let dir = TempDir::new().unwrap();
        let mut content = String::from("type\tbreed\n");
        for _ in 0..20 {
            content.push_str("case\tPoodle\n");
        }
        let path = write_file(&dir, "cases.txt", &content);
        let schema = model();
        let mut reporter = ValidationReporter::to_path(&dir.path().join("v.log")).unwrap();
        let passed = FileValidator::new(&schema)
            .validate_file(&path, 3, &mut reporter)
            .unwrap();
        assert!(!passed);
        // one missing-required violation per row, capped at three rows
        assert_eq!(reporter.violations(), 3);
    }
}

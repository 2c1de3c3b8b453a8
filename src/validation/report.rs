//! Machine-readable validation log.
//!
//! Tab-separated, one record per violation, preceded by a banner naming the
//! data-model version and the input files of the batch.

use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::Path;

/// Column separator of the validation log.
pub const VALIDATION_DELIMITER: &str = "\t";

/// Placeholder written when a column or value is absent.
pub const MISSING_PLACEHOLDER: &str = "!MISSING!";

/// Closed set of violation reasons.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ViolationReason {
    MissingId,
    MissingIdField,
    DuplicateId,
    DuplicateData,
    InvalidData,
    InvalidRelationship,
    NodeExists,
    RelationshipExists,
    UndefinedRelationship,
}

impl ViolationReason {
    /// Stable identifier written to the log.
    pub fn as_str(&self) -> &'static str {
        match self {
            ViolationReason::MissingId => "MISSING_ID",
            ViolationReason::MissingIdField => "MISSING_ID_FIELD",
            ViolationReason::DuplicateId => "DUPLICATE_ID",
            ViolationReason::DuplicateData => "DUPLICATE_DATA",
            ViolationReason::InvalidData => "INVALID_DATA",
            ViolationReason::InvalidRelationship => "INVALID_RELATIONSHIP",
            ViolationReason::NodeExists => "NODE_EXISTS",
            ViolationReason::RelationshipExists => "RELATIONSHIP_EXISTS",
            ViolationReason::UndefinedRelationship => "UNDEFINED_RELATIONSHIP",
        }
    }
}

impl std::fmt::Display for ViolationReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Writes the validation log. Line numbers may be plural for duplicate ids,
/// so they are joined into a single column.
pub struct ValidationReporter {
    out: Box<dyn Write + Send>,
    violations: usize,
}

impl ValidationReporter {
    /// Report into a file, creating parent directories as needed.
    pub fn to_path(path: &Path) -> io::Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        Ok(Self::to_writer(Box::new(BufWriter::new(File::create(
            path,
        )?))))
    }

    /// Report into an arbitrary writer.
    pub fn to_writer(out: Box<dyn Write + Send>) -> Self {
        Self { out, violations: 0 }
    }

    /// Number of violation records written so far.
    pub fn violations(&self) -> usize {
        self.violations
    }

    /// Write the banner: data-model version, batch file names, then the
    /// column header row.
    pub fn write_banner<P: AsRef<Path>>(
        &mut self,
        data_model_version: &str,
        files: &[P],
    ) -> io::Result<()> {
        writeln!(self.out, "DataModelVersion: {}", data_model_version)?;
        writeln!(self.out, "BatchFilenames")?;
        for file in files {
            writeln!(self.out, "{}", file.as_ref().display())?;
        }
        writeln!(
            self.out,
            "Filename{d}LineNumber{d}OffendingColumn{d}OffendingValue{d}OffendingReason",
            d = VALIDATION_DELIMITER
        )?;
        self.out.flush()
    }

    /// Write one violation record.
    pub fn violation(
        &mut self,
        filename: &str,
        lines: &[usize],
        column: &str,
        value: &str,
        reason: ViolationReason,
    ) -> io::Result<()> {
        let lines = lines
            .iter()
            .map(|l| l.to_string())
            .collect::<Vec<_>>()
            .join(",");
        let column = if column.is_empty() {
            MISSING_PLACEHOLDER
        } else {
            column
        };
        let value = if value.is_empty() {
            MISSING_PLACEHOLDER
        } else {
            value
        };
        writeln!(
            self.out,
            "{f}{d}{l}{d}{c}{d}{v}{d}{r}",
            f = filename,
            l = lines,
            c = column,
            v = value,
            r = reason,
            d = VALIDATION_DELIMITER
        )?;
        self.violations += 1;
        self.out.flush()
    }

    /// Write a free-form section marker between the validation and loading
    /// phases.
    pub fn section(&mut self, text: &str) -> io::Result<()> {
        writeln!(self.out, "################")?;
        writeln!(self.out, "# {}", text)?;
        writeln!(self.out, "################")?;
        self.out.flush()
    }

    /// Mark the end of a successful run.
    pub fn done(&mut self) -> io::Result<()> {
        writeln!(self.out, "Done.")?;
        self.out.flush()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_log_format() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("validation.log");
        {
            let mut reporter = ValidationReporter::to_path(&path).unwrap();
            reporter.write_banner("1.2.0", &["a.txt", "b.txt"]).unwrap();
            reporter
                .violation("a.txt", &[2, 5], "case_id", "C1", ViolationReason::DuplicateId)
                .unwrap();
            reporter
                .violation("a.txt", &[3], "breed", "", ViolationReason::InvalidData)
                .unwrap();
            assert_eq!(reporter.violations(), 2);
        }
        let text = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "DataModelVersion: 1.2.0");
        assert_eq!(lines[1], "BatchFilenames");
        assert_eq!(lines[2], "a.txt");
        assert_eq!(lines[3], "b.txt");
        assert_eq!(
            lines[4],
            "Filename\tLineNumber\tOffendingColumn\tOffendingValue\tOffendingReason"
        );
        assert_eq!(lines[5], "a.txt\t2,5\tcase_id\tC1\tDUPLICATE_ID");
        assert_eq!(lines[6], "a.txt\t3\tbreed\t!MISSING!\tINVALID_DATA");
    }
}

//! Tab-separated input files: encoding detection and record reading.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use thiserror::Error;
use tracing::debug;

/// A raw record: column header to cell string.
pub type RawRecord = BTreeMap<String, String>;

/// Errors raised while reading an input file.
#[derive(Error, Debug)]
pub enum TsvError {
    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Malformed tab-separated content
    #[error("TSV parsing error: {0}")]
    Csv(#[from] csv::Error),

    /// The file has no header row
    #[error("file has no header row: {0}")]
    NoHeader(String),
}

/// Detected file encoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileEncoding {
    Utf8,
    Windows1252,
}

/// Detect the encoding of a file: strict UTF-8 first, windows-1252 fallback.
pub fn check_encoding(path: &Path) -> Result<FileEncoding, TsvError> {
    let bytes = fs::read(path)?;
    if std::str::from_utf8(&bytes).is_ok() {
        Ok(FileEncoding::Utf8)
    } else {
        Ok(FileEncoding::Windows1252)
    }
}

/// Read a whole file to a string using the detected encoding.
pub fn read_decoded(path: &Path) -> Result<String, TsvError> {
    let encoding = check_encoding(path)?;
    let bytes = fs::read(path)?;
    let (text, _, _) = match encoding {
        FileEncoding::Utf8 => encoding_rs::UTF_8.decode(&bytes),
        FileEncoding::Windows1252 => {
            debug!(path = %path.display(), "falling back to windows-1252");
            encoding_rs::WINDOWS_1252.decode(&bytes)
        }
    };
    Ok(text.into_owned())
}

/// A fully read tab-separated file.
#[derive(Debug, Clone)]
pub struct TsvFile {
    /// Header columns in file order
    pub headers: Vec<String>,
    /// Data rows in file order; row `i` sits on line `i + 2` of the file
    pub rows: Vec<RawRecord>,
}

impl TsvFile {
    /// Line number of row index `i` (the header is line 1).
    pub fn line_of(&self, index: usize) -> usize {
        index + 2
    }
}

/// Read a tab-separated file into headers and records.
pub fn read_tsv(path: &Path) -> Result<TsvFile, TsvError> {
    let text = read_decoded(path)?;
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(b'\t')
        .flexible(true)
        .from_reader(text.as_bytes());

    let headers: Vec<String> = reader
        .headers()
        .map_err(TsvError::from)?
        .iter()
        .map(|h| h.to_string())
        .collect();
    if headers.is_empty() {
        return Err(TsvError::NoHeader(path.display().to_string()));
    }

    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record?;
        let row: RawRecord = headers
            .iter()
            .cloned()
            .zip(record.iter().map(|cell| cell.to_string()))
            .collect();
        rows.push(row);
    }
    Ok(TsvFile { headers, rows })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::TempDir;

    #[test]
    fn test_read_tsv() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("cases.txt");
        let mut file = fs::File::create(&path).unwrap();
        writeln!(file, "type\tcase_id\tbreed").unwrap();
        writeln!(file, "case\tC1\tPoodle").unwrap();
        writeln!(file, "case\tC2\tLabrador").unwrap();

        let tsv = read_tsv(&path).unwrap();
        assert_eq!(tsv.headers, vec!["type", "case_id", "breed"]);
        assert_eq!(tsv.rows.len(), 2);
        assert_eq!(tsv.rows[0]["breed"], "Poodle");
        assert_eq!(tsv.line_of(1), 3);
    }

    #[test]
    fn test_windows_1252_fallback() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("latin.txt");
        // 0xE9 is é in windows-1252 and invalid standalone UTF-8
        fs::write(&path, b"type\tname\ncase\tAndr\xe9\n").unwrap();

        assert_eq!(check_encoding(&path).unwrap(), FileEncoding::Windows1252);
        let tsv = read_tsv(&path).unwrap();
        assert_eq!(tsv.rows[0]["name"], "André");
    }

    #[test]
    fn test_utf8_detection() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("plain.txt");
        fs::write(&path, "type\tname\ncase\tRex\n").unwrap();
        assert_eq!(check_encoding(&path).unwrap(), FileEncoding::Utf8);
    }
}

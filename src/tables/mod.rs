//! Record table collaborator
//!
//! The pipeline only needs two operations from its tabular storage: read
//! rows as records and append artifacts as records. Tables are JSON row
//! documents; the multi-region book mirrors the marker-delimited workbook
//! regions the downstream tooling consumes (one named start/end marker pair
//! per nested sub-table).

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// One row, keyed by column name
pub type Record = serde_json::Map<String, Value>;

#[derive(Debug, Error)]
pub enum TableError {
    #[error("failed to access table {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("table {path} is not a valid row document: {source}")]
    Format {
        path: PathBuf,
        source: serde_json::Error,
    },
}

/// A flat JSON row table
#[derive(Debug, Clone)]
pub struct JsonTable {
    path: PathBuf,
}

impl JsonTable {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Reads all rows; a missing file is an empty table
    pub fn read_records(&self) -> Result<Vec<Record>, TableError> {
        let raw = match fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => {
                return Err(TableError::Io {
                    path: self.path.clone(),
                    source: e,
                })
            }
        };

        serde_json::from_str(&raw).map_err(|e| TableError::Format {
            path: self.path.clone(),
            source: e,
        })
    }

    /// Replaces the table contents with the given rows
    pub fn write_records(&self, rows: &[Record]) -> Result<(), TableError> {
        self.write_value(&serde_json::to_value(rows).expect("records serialize"))
    }

    /// Appends rows to whatever the table already holds
    pub fn append_records(&self, rows: &[Record]) -> Result<(), TableError> {
        let mut existing = self.read_records()?;
        existing.extend(rows.iter().cloned());
        self.write_records(&existing)
    }

    fn write_value(&self, value: &Value) -> Result<(), TableError> {
        let io_err = |e: std::io::Error| TableError::Io {
            path: self.path.clone(),
            source: e,
        };

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).map_err(io_err)?;
            }
        }

        let pretty = serde_json::to_string_pretty(value).expect("value serializes");
        let tmp = self.path.with_extension("tmp");
        fs::write(&tmp, pretty).map_err(io_err)?;
        fs::rename(&tmp, &self.path).map_err(io_err)
    }
}

/// One marker-delimited region of a region book
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Region {
    pub start_marker: String,
    pub end_marker: String,
    pub rows: Vec<Record>,
}

/// A document of named sub-tables, each delimited by start/end markers.
///
/// Stands in for the multi-sheet workbook the original tooling writes;
/// regions keep their markers so the downstream consumer can locate each
/// nested step/allocation table.
#[derive(Debug, Clone)]
pub struct RegionBook {
    path: PathBuf,
}

impl RegionBook {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn read_regions(&self) -> Result<Vec<Region>, TableError> {
        let raw = match fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => {
                return Err(TableError::Io {
                    path: self.path.clone(),
                    source: e,
                })
            }
        };

        serde_json::from_str(&raw).map_err(|e| TableError::Format {
            path: self.path.clone(),
            source: e,
        })
    }

    /// Writes the region, replacing any existing region with the same
    /// marker pair (the original tooling deletes the old range first)
    pub fn write_region(&self, region: Region) -> Result<(), TableError> {
        let mut regions = self.read_regions()?;
        regions.retain(|r| {
            !(r.start_marker == region.start_marker && r.end_marker == region.end_marker)
        });
        regions.push(region);

        let io_err = |e: std::io::Error| TableError::Io {
            path: self.path.clone(),
            source: e,
        };

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).map_err(io_err)?;
            }
        }

        let pretty = serde_json::to_string_pretty(&regions).expect("regions serialize");
        let tmp = self.path.with_extension("tmp");
        fs::write(&tmp, pretty).map_err(io_err)?;
        fs::rename(&tmp, &self.path).map_err(io_err)
    }

    pub fn find_region(
        &self,
        start_marker: &str,
        end_marker: &str,
    ) -> Result<Option<Region>, TableError> {
        Ok(self
            .read_regions()?
            .into_iter()
            .find(|r| r.start_marker == start_marker && r.end_marker == end_marker))
    }
}

/// Extracts the rows of an artifact's `output` list as records.
///
/// Every stage schema wraps its rows in an `output` array; list entries are
/// objects by construction once validation has passed.
pub fn artifact_rows(value: &Value) -> Vec<Record> {
    value
        .get("output")
        .and_then(|v| v.as_array())
        .map(|rows| {
            rows.iter()
                .filter_map(|row| row.as_object().cloned())
                .collect()
        })
        .unwrap_or_default()
}

/// Renders a record as pretty JSON for prompt embedding
pub fn render_record(record: &Record) -> String {
    serde_json::to_string_pretty(&Value::Object(record.clone()))
        .unwrap_or_else(|_| format!("{:?}", record))
}

/// Renders a whole table as pretty JSON for prompt embedding
pub fn render_records(records: &[Record]) -> String {
    let rows: Vec<Value> = records.iter().cloned().map(Value::Object).collect();
    serde_json::to_string_pretty(&Value::Array(rows)).unwrap_or_else(|_| "[]".to_string())
}

/// Reads a string-valued column from a record, tolerating numeric ids
pub fn record_id(record: &Record, column: &str) -> Option<String> {
    match record.get(column)? {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

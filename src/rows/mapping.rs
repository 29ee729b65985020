//! Row mapping log and its in-memory index.
//!
//! The mapping log is newline-delimited JSON written by the row-lineage
//! export: one record per (source row, target row) pair produced by a model
//! run. The index answers "which source rows produced this target row" in
//! constant time.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fs::Metadata;
use std::io::{self, BufRead};
use std::path::PathBuf;
use std::time::SystemTime;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serialize;
use serde_json::Value;

/// One source row feeding one target row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MappingRecord {
    pub source_model: String,
    pub target_model: String,
    pub source_trace_id: String,
    pub target_trace_id: String,
    pub compiled_sql: String,
    pub executed_at: String,
}

impl MappingRecord {
    /// Build a record from one decoded log line.
    ///
    /// Returns `None` unless all four identifier fields are present and
    /// non-empty. Non-string scalars are stringified.
    pub fn from_value(value: &Value) -> Option<Self> {
        let object = value.as_object()?;
        let field = |name: &str| -> String {
            match object.get(name) {
                Some(Value::String(s)) => s.clone(),
                Some(Value::Null) | None => String::new(),
                Some(other) => other.to_string(),
            }
        };

        let record = Self {
            source_model: field("source_model"),
            target_model: field("target_model"),
            source_trace_id: field("source_trace_id"),
            target_trace_id: field("target_trace_id"),
            compiled_sql: field("compiled_sql"),
            executed_at: field("executed_at"),
        };
        let complete = !record.source_model.is_empty()
            && !record.target_model.is_empty()
            && !record.source_trace_id.is_empty()
            && !record.target_trace_id.is_empty();
        complete.then_some(record)
    }
}

/// Identity of a file version: modification time and size.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileSignature {
    pub modified: Option<SystemTime>,
    pub size: u64,
}

impl FileSignature {
    pub fn from_metadata(metadata: &Metadata) -> Self {
        Self {
            modified: metadata.modified().ok(),
            size: metadata.len(),
        }
    }

    /// Modification time as an RFC 3339 UTC timestamp.
    pub fn modified_rfc3339(&self) -> Option<String> {
        self.modified
            .map(|t| DateTime::<Utc>::from(t).to_rfc3339_opts(SecondsFormat::Secs, true))
    }
}

/// Parsed mapping log.
///
/// Immutable once built; a changed file produces a new index.
#[derive(Debug, Clone, Default)]
pub struct MappingIndex {
    /// Resolved file, when one was found.
    pub path: Option<PathBuf>,
    /// Path reported to callers, even when nothing exists there.
    pub path_display: String,
    pub available: bool,
    pub signature: Option<FileSignature>,
    /// Number of indexed records.
    pub count: usize,
    /// target model -> target trace id -> records.
    by_target: HashMap<String, HashMap<String, Vec<MappingRecord>>>,
    pub mappings_as_target: BTreeMap<String, usize>,
    pub models: BTreeSet<String>,
    /// Target models never used as a source.
    pub roots: Vec<String>,
    /// Problems met while parsing.
    pub warnings: Vec<String>,
}

impl MappingIndex {
    /// An index standing in for a log that is missing or disabled.
    pub fn unavailable(path: Option<PathBuf>, path_display: impl Into<String>) -> Self {
        Self {
            path,
            path_display: path_display.into(),
            ..Default::default()
        }
    }

    /// Parse a mapping log. Bad lines become warnings; only I/O errors fail.
    pub fn from_reader<R: BufRead>(reader: R) -> io::Result<Self> {
        let mut index = MappingIndex {
            available: true,
            ..Default::default()
        };
        let mut sources: BTreeSet<String> = BTreeSet::new();
        let mut targets: BTreeSet<String> = BTreeSet::new();

        for (number, line) in reader.split(b'\n').enumerate() {
            let line = line?;
            let line = String::from_utf8_lossy(&line);
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            let line_number = number + 1;

            let value: Value = match serde_json::from_str(line) {
                Ok(value) => value,
                Err(_) => {
                    index
                        .warnings
                        .push(format!("Invalid JSON in row lineage mapping at line {line_number}."));
                    continue;
                }
            };
            let Some(record) = MappingRecord::from_value(&value) else {
                index
                    .warnings
                    .push(format!("Incomplete row lineage mapping at line {line_number}."));
                continue;
            };

            *index
                .mappings_as_target
                .entry(record.target_model.clone())
                .or_default() += 1;
            index.models.insert(record.source_model.clone());
            index.models.insert(record.target_model.clone());
            sources.insert(record.source_model.clone());
            targets.insert(record.target_model.clone());
            index
                .by_target
                .entry(record.target_model.clone())
                .or_default()
                .entry(record.target_trace_id.clone())
                .or_default()
                .push(record);
            index.count += 1;
        }

        index.roots = targets.difference(&sources).cloned().collect();
        if index.roots.is_empty() {
            index.roots = if targets.is_empty() {
                sources.into_iter().collect()
            } else {
                targets.into_iter().collect()
            };
        }
        Ok(index)
    }

    /// Records whose target is the given row.
    pub fn parents(&self, target_model: &str, target_trace_id: &str) -> &[MappingRecord] {
        self.by_target
            .get(target_model)
            .and_then(|rows| rows.get(target_trace_id))
            .map_or(&[], Vec::as_slice)
    }

    pub fn is_root(&self, model: &str) -> bool {
        self.roots.iter().any(|root| root == model)
    }

    pub fn mappings_as_target(&self, model: &str) -> usize {
        self.mappings_as_target.get(model).copied().unwrap_or(0)
    }
}

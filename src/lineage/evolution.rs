//! Column differences between two artifact versions.

use std::collections::{BTreeMap, BTreeSet};

use serde::Serialize;

use super::columns::{collect_columns, ColumnMeta};
use super::types::column_id;
use crate::artifacts::{Catalog, Manifest, VersionInfo};

/// A field whose value differs between versions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangedField {
    Description,
    DataType,
    Tags,
}

/// Classification of a column in the current version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ColumnStatus {
    Added,
    Changed,
    Unchanged,
}

/// Snapshot of the compared fields of one column.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ColumnSnapshot {
    pub name: String,
    pub description: Option<String>,
    pub data_type: Option<String>,
    pub tags: Vec<String>,
}

impl ColumnSnapshot {
    fn from_meta(meta: &ColumnMeta) -> Self {
        Self {
            name: meta.name.clone(),
            description: meta.description.clone(),
            data_type: meta.data_type.clone(),
            tags: meta.tags.clone(),
        }
    }

    /// Fields that differ; `None` and empty compare equal, tags as sets.
    fn diff(&self, current: &ColumnSnapshot) -> Vec<ChangedField> {
        let mut changed = Vec::new();
        if self.description.as_deref().unwrap_or("") != current.description.as_deref().unwrap_or("") {
            changed.push(ChangedField::Description);
        }
        if self.data_type.as_deref().unwrap_or("") != current.data_type.as_deref().unwrap_or("") {
            changed.push(ChangedField::DataType);
        }
        let before: BTreeSet<&String> = self.tags.iter().collect();
        let after: BTreeSet<&String> = current.tags.iter().collect();
        if before != after {
            changed.push(ChangedField::Tags);
        }
        changed
    }
}

/// A column present in only one version.
#[derive(Debug, Clone, Serialize)]
pub struct EvolutionEntry {
    pub column_id: String,
    pub model_id: String,
    pub model_name: String,
    pub column: String,
    pub meta: ColumnSnapshot,
}

/// A column present in both versions with differing fields.
#[derive(Debug, Clone, Serialize)]
pub struct EvolutionChange {
    pub column_id: String,
    pub model_id: String,
    pub model_name: String,
    pub column: String,
    pub previous: ColumnSnapshot,
    pub current: ColumnSnapshot,
    pub changed_fields: Vec<ChangedField>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct EvolutionSummary {
    pub added: usize,
    pub removed: usize,
    pub changed: usize,
    pub unchanged: usize,
}

/// Full diff between a baseline and the current version.
#[derive(Debug, Clone, Default, Serialize)]
pub struct EvolutionReport {
    pub summary: EvolutionSummary,
    /// Status of every column in the current version.
    pub status_by_id: BTreeMap<String, ColumnStatus>,
    pub added: Vec<EvolutionEntry>,
    pub removed: Vec<EvolutionEntry>,
    pub changed: Vec<EvolutionChange>,
}

/// Service-level answer: either a report, or why there is none.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ColumnEvolution {
    pub available: bool,
    pub message: Option<String>,
    pub current_version: Option<VersionInfo>,
    pub baseline_version: Option<VersionInfo>,
    pub report: Option<EvolutionReport>,
}

impl ColumnEvolution {
    pub fn unavailable(message: impl Into<String>, current_version: Option<VersionInfo>) -> Self {
        Self {
            available: false,
            message: Some(message.into()),
            current_version,
            ..Default::default()
        }
    }
}

/// Diff the columns of two artifact versions.
pub fn diff(
    current: &Manifest,
    current_catalog: Option<&Catalog>,
    baseline: &Manifest,
    baseline_catalog: Option<&Catalog>,
) -> EvolutionReport {
    let current_columns = collect_columns(current.lineage_nodes(), current_catalog);
    let baseline_columns = collect_columns(baseline.lineage_nodes(), baseline_catalog);
    let empty = BTreeMap::new();

    let model_ids: BTreeSet<&String> = current_columns.keys().chain(baseline_columns.keys()).collect();
    let mut report = EvolutionReport::default();

    for model_id in model_ids {
        let now = current_columns.get(model_id).unwrap_or(&empty);
        let before = baseline_columns.get(model_id).unwrap_or(&empty);
        let model_name = display_name(model_id, current, baseline);

        let names: BTreeSet<&String> = now.keys().chain(before.keys()).collect();
        for name in names {
            let id = column_id(model_id, name);
            match (before.get(name), now.get(name)) {
                (None, Some(meta)) => {
                    report.status_by_id.insert(id.clone(), ColumnStatus::Added);
                    report.added.push(EvolutionEntry {
                        column_id: id,
                        model_id: model_id.clone(),
                        model_name: model_name.clone(),
                        column: name.clone(),
                        meta: ColumnSnapshot::from_meta(meta),
                    });
                }
                (Some(meta), None) => report.removed.push(EvolutionEntry {
                    column_id: id,
                    model_id: model_id.clone(),
                    model_name: model_name.clone(),
                    column: name.clone(),
                    meta: ColumnSnapshot::from_meta(meta),
                }),
                (Some(old), Some(new)) => {
                    let previous = ColumnSnapshot::from_meta(old);
                    let current = ColumnSnapshot::from_meta(new);
                    let changed_fields = previous.diff(&current);
                    if changed_fields.is_empty() {
                        report.summary.unchanged += 1;
                        report.status_by_id.insert(id, ColumnStatus::Unchanged);
                    } else {
                        report.status_by_id.insert(id.clone(), ColumnStatus::Changed);
                        report.changed.push(EvolutionChange {
                            column_id: id,
                            model_id: model_id.clone(),
                            model_name: model_name.clone(),
                            column: name.clone(),
                            previous,
                            current,
                            changed_fields,
                        });
                    }
                }
                (None, None) => {}
            }
        }
    }

    report.summary.added = report.added.len();
    report.summary.removed = report.removed.len();
    report.summary.changed = report.changed.len();
    report
}

/// alias -> name, current version first, then the id.
fn display_name(model_id: &str, current: &Manifest, baseline: &Manifest) -> String {
    [current, baseline]
        .into_iter()
        .filter_map(|manifest| manifest.nodes.get(model_id))
        .find_map(|node| node.table_name())
        .unwrap_or(model_id)
        .to_string()
}

//! Graph shapes produced by the lineage builders.
//!
//! Every collection is emitted in a stable order (nodes by id, edges by
//! `(source, target)`) so results can be compared and cached byte for byte.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::artifacts::ResourceType;

// =============================================================================
// Model level
// =============================================================================

/// A model, source, seed or snapshot on the model graph.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LineageNode {
    pub id: String,
    pub label: String,
    #[serde(rename = "type")]
    pub resource_type: ResourceType,
    pub database: Option<String>,
    pub schema: Option<String>,
    pub tags: Vec<String>,
}

/// `target` depends on `source`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct LineageEdge {
    pub source: String,
    pub target: String,
}

impl LineageEdge {
    pub fn new(source: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            target: target.into(),
        }
    }
}

/// What a group clusters its members by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum GroupKind {
    Schema,
    ResourceType,
    Tag,
}

/// A named cluster of model ids, used by the UI for grouping.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LineageGroup {
    /// `schema:<key>`, `resource:<type>` or `tag:<tag>`.
    pub id: String,
    pub label: String,
    #[serde(rename = "type")]
    pub kind: GroupKind,
    /// Sorted member ids.
    pub members: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct LineageGraph {
    pub nodes: Vec<LineageNode>,
    pub edges: Vec<LineageEdge>,
    pub groups: Vec<LineageGroup>,
    pub warnings: Vec<String>,
}

/// Description and type of one column in a model detail view.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ColumnSummary {
    pub description: Option<String>,
    #[serde(rename = "type")]
    pub data_type: Option<String>,
}

/// Immediate neighbourhood and metadata of a single model.
#[derive(Debug, Clone, Serialize)]
pub struct ModelLineageDetail {
    pub model_id: String,
    pub parents: Vec<String>,
    pub children: Vec<String>,
    pub columns: BTreeMap<String, ColumnSummary>,
    pub tags: Vec<String>,
    pub schema: Option<String>,
    pub database: Option<String>,
}

// =============================================================================
// Column level
// =============================================================================

/// A column of a model on the column graph.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ColumnNode {
    /// `<model_id>.<column>`
    pub id: String,
    pub column: String,
    pub model_id: String,
    /// `<model label>:<column>`
    pub label: String,
    #[serde(rename = "type")]
    pub resource_type: ResourceType,
    pub database: Option<String>,
    pub schema: Option<String>,
    pub tags: Vec<String>,
    pub data_type: Option<String>,
    pub description: Option<String>,
}

/// Data flows from `source` into `target`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct ColumnLineageEdge {
    pub source: String,
    pub target: String,
    pub source_column: String,
    pub target_column: String,
}

impl ColumnLineageEdge {
    pub fn new(source_model: &str, source_column: &str, target_model: &str, target_column: &str) -> Self {
        Self {
            source: column_id(source_model, source_column),
            target: column_id(target_model, target_column),
            source_column: source_column.to_string(),
            target_column: target_column.to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ColumnLineageGraph {
    pub nodes: Vec<ColumnNode>,
    pub edges: Vec<ColumnLineageEdge>,
}

/// Column id: `<model_id>.<column>`.
pub fn column_id(model_id: &str, column: &str) -> String {
    format!("{model_id}.{column}")
}

//! Backward row traces.
//!
//! Starting from one row of one model, follow the mapping log from target
//! rows to the source rows that produced them, fetching each row from the
//! warehouse so the graph can show actual values.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use serde::Serialize;
use tracing::{debug, info, warn};

use super::mapping::MappingIndex;
use super::resolve::{ManifestResolver, RelationInfo, WarningLog};
use super::trace_id::{ensure_trace_id, row_trace_id, TRACE_COLUMN};
use super::warehouse::{Row, SqlExecutor, WarehouseResult};
use crate::graph::bounded_bfs;

pub(crate) const HEURISTIC_TRACE_WARNING: &str =
    "Some tables do not contain _row_trace_id; trace ids are computed heuristically for browsing.";

// =============================================================================
// Output
// =============================================================================

/// One row in a trace graph.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RowLineageNode {
    /// `row:<model>:<trace id>`.
    pub id: String,
    pub label: String,
    #[serde(rename = "type")]
    pub node_type: &'static str,
    pub model_name: String,
    pub trace_id: String,
    pub model_unique_id: Option<String>,
    pub schema: Option<String>,
    pub database: Option<String>,
    pub relation_name: Option<String>,
    pub row: Option<Row>,
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub struct RowLineageEdge {
    pub source: String,
    pub target: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RowLineageGraph {
    pub nodes: Vec<RowLineageNode>,
    pub edges: Vec<RowLineageEdge>,
}

/// One mapping record walked during the trace, with both rows.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RowLineageHop {
    pub source_model: String,
    pub target_model: String,
    pub source_trace_id: String,
    pub target_trace_id: String,
    pub compiled_sql: String,
    pub executed_at: String,
    pub source_row: Option<Row>,
    pub target_row: Option<Row>,
}

/// The row the trace started from.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RowLineageTarget {
    pub model_unique_id: Option<String>,
    pub model_name: String,
    pub trace_id: String,
    pub relation_name: String,
    pub schema: Option<String>,
    pub database: Option<String>,
    pub row: Option<Row>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RowTraceResponse {
    pub target: RowLineageTarget,
    pub graph: RowLineageGraph,
    pub hops: Vec<RowLineageHop>,
    /// A row at the hop bound still had parents.
    pub truncated: bool,
    pub warnings: Vec<String>,
}

pub fn node_id(model_name: &str, trace_id: &str) -> String {
    format!("row:{model_name}:{trace_id}")
}

/// Model name over a shortened trace id.
pub fn node_label(model_name: &str, trace_id: &str) -> String {
    if trace_id.chars().count() > 8 {
        let short: String = trace_id.chars().take(8).collect();
        format!("{model_name}\n{short}...")
    } else {
        format!("{model_name}\n{trace_id}")
    }
}

// =============================================================================
// Row fetching
// =============================================================================

/// Row lookups for one trace, memoized per (model, trace id).
pub struct RowFetcher<'a> {
    resolver: &'a ManifestResolver<'a>,
    warehouse: &'a dyn SqlExecutor,
    scan_max_rows: usize,
    relations: HashMap<String, Option<RelationInfo>>,
    rows: HashMap<(String, String), Option<Row>>,
    trace_columns: HashMap<String, bool>,
}

impl<'a> RowFetcher<'a> {
    pub fn new(resolver: &'a ManifestResolver<'a>, warehouse: &'a dyn SqlExecutor, scan_max_rows: usize) -> Self {
        Self {
            resolver,
            warehouse,
            scan_max_rows: scan_max_rows.max(1),
            relations: HashMap::new(),
            rows: HashMap::new(),
            trace_columns: HashMap::new(),
        }
    }

    /// Pin a model name to an already-resolved relation.
    pub fn seed_relation(&mut self, relation: RelationInfo) {
        self.relations.insert(relation.model_name.clone(), Some(relation));
    }

    pub fn relation(&mut self, model_name: &str, warnings: &mut WarningLog) -> Option<RelationInfo> {
        if let Some(cached) = self.relations.get(model_name) {
            return cached.clone();
        }
        let resolved = self.resolver.relation_for_name(model_name, warnings);
        self.relations.insert(model_name.to_string(), resolved.clone());
        resolved
    }

    /// Row already fetched for this key, if any.
    pub fn cached(&self, model_name: &str, trace_id: &str) -> Option<Row> {
        self.rows
            .get(&(model_name.to_string(), trace_id.to_string()))
            .cloned()
            .flatten()
    }

    pub fn fetch(&mut self, model_name: &str, trace_id: &str, warnings: &mut WarningLog) -> Option<Row> {
        let key = (model_name.to_string(), trace_id.to_string());
        if let Some(cached) = self.rows.get(&key) {
            return cached.clone();
        }

        let row = match self.relation(model_name, warnings) {
            Some(relation) => self.fetch_from(&relation, trace_id, warnings),
            None => None,
        };
        let row = row.map(|mut row| {
            if !row.contains_key(TRACE_COLUMN) {
                row.insert(TRACE_COLUMN.to_string(), trace_id.into());
            }
            row
        });
        self.rows.insert(key, row.clone());
        row
    }

    fn has_trace_column(&mut self, relation: &RelationInfo) -> WarehouseResult<bool> {
        if let Some(present) = self.trace_columns.get(&relation.relation_name) {
            return Ok(*present);
        }
        let present = self
            .warehouse
            .column_exists(relation.schema.as_deref(), &relation.table, TRACE_COLUMN)?;
        self.trace_columns.insert(relation.relation_name.clone(), present);
        Ok(present)
    }

    fn fetch_from(&mut self, relation: &RelationInfo, trace_id: &str, warnings: &mut WarningLog) -> Option<Row> {
        let result = self.has_trace_column(relation).and_then(|present| {
            if present {
                self.warehouse
                    .fetch_by_column(&relation.relation_name, TRACE_COLUMN, trace_id)
            } else {
                warnings.push(HEURISTIC_TRACE_WARNING);
                let rows = self.warehouse.execute(&relation.relation_name, self.scan_max_rows)?;
                Ok(rows.into_iter().find_map(|mut row| {
                    ensure_trace_id(&mut row);
                    (row_trace_id(&row).as_deref() == Some(trace_id)).then_some(row)
                }))
            }
        });

        match result {
            Ok(row) => row,
            Err(err) => {
                warn!(relation = %relation.relation_name, error = %err, "row fetch failed");
                warnings.push(format!(
                    "Failed to fetch rows from '{}': {err}",
                    relation.relation_name
                ));
                None
            }
        }
    }
}

// =============================================================================
// Trace
// =============================================================================

/// Builds one backward trace.
pub struct RowTraceBuilder<'a> {
    index: &'a MappingIndex,
    fetcher: RowFetcher<'a>,
    warnings: WarningLog,
    nodes: BTreeMap<String, RowLineageNode>,
    edges: BTreeSet<RowLineageEdge>,
    hops: Vec<RowLineageHop>,
}

impl<'a> RowTraceBuilder<'a> {
    /// `warnings` carries anything already reported for this request, such
    /// as mapping-log problems; new warnings are appended without repeats.
    pub fn new(index: &'a MappingIndex, fetcher: RowFetcher<'a>, warnings: WarningLog) -> Self {
        Self {
            index,
            fetcher,
            warnings,
            nodes: BTreeMap::new(),
            edges: BTreeSet::new(),
            hops: Vec::new(),
        }
    }

    /// Trace `trace_id` in `start` back through at most `max_hops` mappings.
    pub fn trace(mut self, start: RelationInfo, trace_id: &str, max_hops: usize) -> RowTraceResponse {
        let start_model = start.model_name.clone();
        self.fetcher.seed_relation(start.clone());
        let target_row = self.fetcher.fetch(&start_model, trace_id, &mut self.warnings);

        let index = self.index;
        let walk = bounded_bfs(
            [(start_model.clone(), trace_id.to_string())],
            Some(max_hops),
            |(model, trace)| {
                index
                    .parents(model, trace)
                    .iter()
                    .map(|m| (m.source_model.clone(), m.source_trace_id.clone()))
                    .collect::<Vec<_>>()
            },
        );
        debug!(
            model = %start_model,
            trace_id,
            reached = walk.visits.len(),
            truncated = walk.truncated,
            "walked row mappings"
        );

        for visit in &walk.visits {
            let (model, trace) = &visit.node;
            let row = self.fetcher.cached(model, trace);
            self.ensure_node(model, trace, row);
            if !visit.expanded {
                continue;
            }

            for mapping in index.parents(model, trace) {
                let source_row = self
                    .fetcher
                    .fetch(&mapping.source_model, &mapping.source_trace_id, &mut self.warnings);
                let target_row = self
                    .fetcher
                    .fetch(&mapping.target_model, &mapping.target_trace_id, &mut self.warnings);

                let source = self.ensure_node(&mapping.source_model, &mapping.source_trace_id, source_row.clone());
                let target = self.ensure_node(&mapping.target_model, &mapping.target_trace_id, target_row.clone());
                self.edges.insert(RowLineageEdge { source, target });
                self.hops.push(RowLineageHop {
                    source_model: mapping.source_model.clone(),
                    target_model: mapping.target_model.clone(),
                    source_trace_id: mapping.source_trace_id.clone(),
                    target_trace_id: mapping.target_trace_id.clone(),
                    compiled_sql: mapping.compiled_sql.clone(),
                    executed_at: mapping.executed_at.clone(),
                    source_row,
                    target_row,
                });
            }
        }

        info!(
            model = %start_model,
            nodes = self.nodes.len(),
            hops = self.hops.len(),
            "built row trace"
        );

        RowTraceResponse {
            target: RowLineageTarget {
                model_unique_id: start.model_unique_id,
                model_name: start.model_name,
                trace_id: trace_id.to_string(),
                relation_name: start.relation_name,
                schema: start.schema,
                database: start.database,
                row: target_row,
            },
            graph: RowLineageGraph {
                nodes: self.nodes.into_values().collect(),
                edges: self.edges.into_iter().collect(),
            },
            hops: self.hops,
            truncated: walk.truncated,
            warnings: self.warnings.into_vec(),
        }
    }

    /// Add the node for a row, or fill in its row if it was added without one.
    fn ensure_node(&mut self, model_name: &str, trace_id: &str, row: Option<Row>) -> String {
        let id = node_id(model_name, trace_id);
        if let Some(existing) = self.nodes.get_mut(&id) {
            if existing.row.is_none() {
                existing.row = row;
            }
            return id;
        }

        let relation = self.fetcher.relation(model_name, &mut self.warnings);
        let (model_unique_id, schema, database, relation_name) = match relation {
            Some(r) => (r.model_unique_id, r.schema, r.database, Some(r.relation_name)),
            None => (None, None, None, None),
        };
        self.nodes.insert(
            id.clone(),
            RowLineageNode {
                id: id.clone(),
                label: node_label(model_name, trace_id),
                node_type: "row",
                model_name: model_name.to_string(),
                trace_id: trace_id.to_string(),
                model_unique_id,
                schema,
                database,
                relation_name,
                row,
            },
        );
        id
    }
}

//! Column-level lineage graph.
//!
//! Column edges come from a [`ColumnProvenanceStrategy`]. Models the strategy
//! could not explain fall back to name matching against their model-level
//! parents, so every dependency still shows up at column level when the
//! column names line up.

use std::collections::{BTreeSet, HashMap};

use tracing::debug;

use super::columns::{collect_columns, ColumnMap};
use super::model_graph::ModelGraphBuilder;
use super::types::{column_id, ColumnLineageEdge, ColumnLineageGraph, ColumnNode, LineageEdge};
use crate::artifacts::{Catalog, Manifest};
use crate::sql::{self, Dialect, KnownColumns, RelationLookup};

/// Inputs every strategy sees.
#[derive(Debug, Clone, Copy)]
pub struct ColumnContext<'a> {
    pub manifest: &'a Manifest,
    pub columns: &'a ColumnMap,
    pub model_edges: &'a [LineageEdge],
}

/// Edges a strategy produced, and the models it fully explained.
#[derive(Debug, Clone, Default)]
pub struct StrategyOutput {
    pub edges: BTreeSet<ColumnLineageEdge>,
    pub processed: BTreeSet<String>,
}

/// A way of deriving column-to-column data flow.
pub trait ColumnProvenanceStrategy: Send + Sync {
    fn name(&self) -> &'static str;

    fn infer(&self, ctx: &ColumnContext<'_>) -> StrategyOutput;
}

// =============================================================================
// Strategies
// =============================================================================

/// Parses each model's compiled SQL.
#[derive(Debug, Clone, Copy, Default)]
pub struct SqlAstStrategy;

impl ColumnProvenanceStrategy for SqlAstStrategy {
    fn name(&self) -> &'static str {
        "sql"
    }

    fn infer(&self, ctx: &ColumnContext<'_>) -> StrategyOutput {
        let relations = RelationLookup::build(ctx.manifest.lineage_nodes());
        let dialect = Dialect::from_adapter(ctx.manifest.adapter_type());

        let mut known = KnownColumns::new();
        for (model_id, columns) in ctx.columns {
            known.insert_model(model_id, columns.keys());
        }

        let mut output = StrategyOutput::default();
        for node in ctx.manifest.lineage_nodes() {
            if !node.kind().has_column_sql() {
                continue;
            }
            let Some(compiled_sql) = node.compiled_sql() else {
                continue;
            };
            let Some(own_columns) = ctx.columns.get(&node.unique_id).filter(|c| !c.is_empty()) else {
                continue;
            };

            let inference = sql::infer(
                compiled_sql,
                own_columns.keys().map(String::as_str),
                &relations,
                &known,
                dialect,
            );
            if !inference.parsed {
                debug!(model = %node.unique_id, "falling back to name matching");
                continue;
            }
            if inference.edges.is_empty() {
                continue;
            }

            output.processed.insert(node.unique_id.clone());
            for flow in inference.edges {
                output.edges.insert(ColumnLineageEdge::new(
                    &flow.source_model,
                    &flow.source_column,
                    &node.unique_id,
                    &flow.target_column,
                ));
            }
        }
        output
    }
}

/// Connects equally named columns across model-level edges.
#[derive(Debug, Clone, Copy, Default)]
pub struct NameMatchStrategy;

impl NameMatchStrategy {
    /// Name-matched edges, restricted to targets accepted by `allow`.
    pub fn edges_where<F>(ctx: &ColumnContext<'_>, allow: F) -> BTreeSet<ColumnLineageEdge>
    where
        F: Fn(&str) -> bool,
    {
        let mut edges = BTreeSet::new();
        for model_edge in ctx.model_edges {
            if !allow(model_edge.target.as_str()) {
                continue;
            }
            let (Some(sources), Some(targets)) = (
                ctx.columns.get(&model_edge.source),
                ctx.columns.get(&model_edge.target),
            ) else {
                continue;
            };
            let target_lookup: HashMap<String, &str> = targets
                .keys()
                .map(|name| (name.to_lowercase(), name.as_str()))
                .collect();
            for source_column in sources.keys() {
                if let Some(target_column) = target_lookup.get(&source_column.to_lowercase()) {
                    edges.insert(ColumnLineageEdge::new(
                        &model_edge.source,
                        source_column,
                        &model_edge.target,
                        target_column,
                    ));
                }
            }
        }
        edges
    }
}

impl ColumnProvenanceStrategy for NameMatchStrategy {
    fn name(&self) -> &'static str {
        "name_match"
    }

    fn infer(&self, ctx: &ColumnContext<'_>) -> StrategyOutput {
        StrategyOutput {
            edges: Self::edges_where(ctx, |_| true),
            processed: BTreeSet::new(),
        }
    }
}

// =============================================================================
// Builder
// =============================================================================

/// Builds the column graph with a strategy chosen at construction.
pub struct ColumnGraphBuilder {
    strategy: Box<dyn ColumnProvenanceStrategy>,
}

impl ColumnGraphBuilder {
    /// SQL parsing when enabled, name matching otherwise.
    pub fn new(sql_enabled: bool) -> Self {
        if sql_enabled {
            Self::with_strategy(Box::new(SqlAstStrategy))
        } else {
            Self::with_strategy(Box::new(NameMatchStrategy))
        }
    }

    pub fn with_strategy(strategy: Box<dyn ColumnProvenanceStrategy>) -> Self {
        Self { strategy }
    }

    pub fn strategy_name(&self) -> &'static str {
        self.strategy.name()
    }

    pub fn build(&self, manifest: &Manifest, catalog: Option<&Catalog>) -> ColumnLineageGraph {
        let columns = collect_columns(manifest.lineage_nodes(), catalog);
        let model_edges = ModelGraphBuilder::new(manifest).edges();
        let ctx = ColumnContext {
            manifest,
            columns: &columns,
            model_edges: &model_edges,
        };

        let StrategyOutput {
            mut edges,
            processed,
        } = self.strategy.infer(&ctx);
        let explained = edges.len();

        edges.extend(NameMatchStrategy::edges_where(&ctx, |target| {
            !processed.contains(target)
        }));
        if edges.is_empty() {
            edges = NameMatchStrategy::edges_where(&ctx, |_| true);
        }

        debug!(
            strategy = self.strategy.name(),
            explained,
            processed = processed.len(),
            total = edges.len(),
            "built column graph"
        );

        ColumnLineageGraph {
            nodes: column_nodes(manifest, &columns),
            edges: edges.into_iter().collect(),
        }
    }
}

fn column_nodes(manifest: &Manifest, columns: &ColumnMap) -> Vec<ColumnNode> {
    let mut nodes = Vec::new();
    for (model_id, model_columns) in columns {
        let Some(node) = manifest.nodes.get(model_id) else {
            continue;
        };
        for (name, meta) in model_columns {
            nodes.push(ColumnNode {
                id: column_id(model_id, name),
                column: name.clone(),
                model_id: model_id.clone(),
                label: format!("{}:{}", node.label(), name),
                resource_type: node.kind(),
                database: node.database.clone(),
                schema: node.schema.clone(),
                tags: meta.tags.clone(),
                data_type: meta.data_type.clone(),
                description: meta.description.clone(),
            });
        }
    }
    nodes
}

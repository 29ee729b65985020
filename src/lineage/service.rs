//! Request-level entry points for model and column lineage.

use std::sync::Arc;

use tracing::{debug, info};

use super::column_graph::ColumnGraphBuilder;
use super::evolution::{self, ColumnEvolution};
use super::impact::{impact, ColumnImpact, ModelImpact};
use super::model_graph::ModelGraphBuilder;
use super::types::{ColumnLineageGraph, LineageGraph, LineageGroup, ModelLineageDetail};
use crate::artifacts::{ArtifactStore, Catalog, Manifest, CATALOG, MANIFEST};
use crate::config::LineageSettings;
use crate::error::{LineageError, LineageResult};

const MANIFEST_NOT_LOADED: &str = "manifest.json has not been loaded yet.";

/// Lineage queries over whatever the artifact store currently holds.
///
/// Holds no graph state; every call reads the current artifacts.
pub struct LineageService {
    store: Arc<dyn ArtifactStore>,
    settings: LineageSettings,
}

impl LineageService {
    pub fn new(store: Arc<dyn ArtifactStore>, settings: LineageSettings) -> Self {
        Self { store, settings }
    }

    fn artifacts(&self) -> (Option<Manifest>, Option<Catalog>) {
        (self.store.manifest(), self.store.catalog())
    }

    /// Model graph. `None` applies the configured initial depth.
    pub fn build_model_graph(&self, max_depth: Option<usize>) -> LineageGraph {
        let Some(manifest) = self.store.manifest() else {
            return LineageGraph {
                warnings: vec![MANIFEST_NOT_LOADED.to_string()],
                ..Default::default()
            };
        };
        let depth = max_depth.or_else(|| self.settings.default_depth());

        let mut graph = ModelGraphBuilder::new(&manifest).build(depth);
        let mut warnings = manifest.warnings;
        warnings.append(&mut graph.warnings);
        graph.warnings = warnings;
        graph
    }

    pub fn build_column_graph(&self) -> ColumnLineageGraph {
        let (Some(manifest), catalog) = self.artifacts() else {
            return ColumnLineageGraph::default();
        };
        ColumnGraphBuilder::new(self.settings.sql_column_lineage).build(&manifest, catalog.as_ref())
    }

    /// Groups over the full, unpruned node set.
    pub fn grouping_metadata(&self) -> Vec<LineageGroup> {
        self.build_model_graph(Some(0)).groups
    }

    pub fn model_lineage(&self, model_id: &str) -> LineageResult<ModelLineageDetail> {
        let (Some(manifest), catalog) = self.artifacts() else {
            return Err(LineageError::ModelNotFound(model_id.to_string()));
        };
        ModelGraphBuilder::new(&manifest).detail(model_id, catalog.as_ref())
    }

    /// Impact over the unlimited model graph.
    pub fn model_impact(&self, model_id: &str) -> ModelImpact {
        let graph = self.build_model_graph(Some(0));
        let edges = graph.edges.iter().map(|e| (e.source.as_str(), e.target.as_str()));
        ModelImpact {
            model_id: model_id.to_string(),
            impact: impact(model_id, edges),
        }
    }

    pub fn column_impact(&self, column_id: &str) -> ColumnImpact {
        let graph = self.build_column_graph();
        let edges = graph.edges.iter().map(|e| (e.source.as_str(), e.target.as_str()));
        ColumnImpact {
            column_id: column_id.to_string(),
            impact: impact(column_id, edges),
        }
    }

    /// Column changes between `baseline` (default: the previous manifest
    /// version) and the current version.
    pub fn column_evolution(&self, baseline: Option<u64>) -> ColumnEvolution {
        let Some(current) = self.store.current_version(MANIFEST) else {
            return ColumnEvolution::unavailable(MANIFEST_NOT_LOADED, None);
        };
        let current_info = current.info();

        let baseline = baseline.or_else(|| current.version.checked_sub(1)).filter(|v| *v >= 1);
        let Some(baseline) = baseline else {
            return ColumnEvolution::unavailable(
                "Need at least two manifest versions to compute evolution.",
                Some(current_info),
            );
        };
        let Some(previous) = self.store.version(MANIFEST, baseline) else {
            return ColumnEvolution::unavailable(
                format!("Manifest version {baseline} is not available."),
                Some(current_info),
            );
        };

        let current_catalog = self
            .store
            .current_version(CATALOG)
            .map(|v| Catalog::from_value(&v.content));
        let baseline_catalog = self
            .store
            .version(CATALOG, baseline)
            .map(|v| Catalog::from_value(&v.content));

        debug!(current = current.version, baseline, "diffing manifest versions");
        let report = evolution::diff(
            &Manifest::from_value(&current.content),
            current_catalog.as_ref(),
            &Manifest::from_value(&previous.content),
            baseline_catalog.as_ref(),
        );
        info!(
            added = report.summary.added,
            removed = report.summary.removed,
            changed = report.summary.changed,
            "computed column evolution"
        );

        ColumnEvolution {
            available: true,
            message: None,
            current_version: Some(current_info),
            baseline_version: Some(previous.info()),
            report: Some(report),
        }
    }
}

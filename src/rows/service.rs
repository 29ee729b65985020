//! Request-level entry points for row lineage.

use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, info, warn};

use super::cache::MappingCache;
use super::mapping::MappingIndex;
use super::paths::{resolve_mapping_path, MappingLocations};
use super::resolve::{ManifestResolver, WarningLog};
use super::trace::{RowFetcher, RowTraceBuilder, RowTraceResponse};
use super::trace_id::{ensure_trace_id, TRACE_COLUMN};
use super::warehouse::{Row, SqlExecutor};
use crate::artifacts::{ArtifactStore, Manifest};
use crate::config::RowLineageSettings;
use crate::error::{LineageError, LineageResult};

const DEFAULT_PREVIEW_LIMIT: usize = 100;

const PREVIEW_HEURISTIC_WARNING: &str =
    "Table does not contain _row_trace_id; trace ids are computed heuristically for browsing.";

const PARQUET_UNSUPPORTED: &str =
    "Row lineage mappings in Parquet format are not supported; export JSONL mappings instead.";

// =============================================================================
// Responses
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RowLineageStatus {
    pub enabled: bool,
    /// Enabled and a mapping log was loaded.
    pub available: bool,
    pub mapping_path: String,
    pub mapping_mtime: Option<String>,
    pub mapping_count: usize,
    pub roots: Vec<String>,
    pub models: Vec<String>,
    pub warnings: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RowLineageModelInfo {
    pub model_name: String,
    pub model_unique_id: Option<String>,
    pub schema: Option<String>,
    pub database: Option<String>,
    pub relation_name: Option<String>,
    pub is_root: bool,
    pub mappings_as_target: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RowLineageModels {
    pub roots: Vec<RowLineageModelInfo>,
    /// Every model in the log, roots first.
    pub models: Vec<RowLineageModelInfo>,
    pub warnings: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RowLineagePreview {
    pub model_unique_id: String,
    pub model_name: String,
    pub relation_name: String,
    pub schema: Option<String>,
    pub database: Option<String>,
    pub trace_column: String,
    pub trace_column_present: bool,
    pub columns: Vec<String>,
    pub rows: Vec<Row>,
    pub warnings: Vec<String>,
}

// =============================================================================
// Service
// =============================================================================

/// Row lineage over the mapping log, the manifest and the warehouse.
pub struct RowLineageService {
    settings: RowLineageSettings,
    locations: MappingLocations,
    store: Arc<dyn ArtifactStore>,
    warehouse: Arc<dyn SqlExecutor>,
    cache: Arc<MappingCache>,
}

impl RowLineageService {
    pub fn new(
        settings: RowLineageSettings,
        locations: MappingLocations,
        store: Arc<dyn ArtifactStore>,
        warehouse: Arc<dyn SqlExecutor>,
        cache: Arc<MappingCache>,
    ) -> Self {
        Self {
            settings,
            locations,
            store,
            warehouse,
            cache,
        }
    }

    fn manifest(&self) -> Manifest {
        self.store.manifest().unwrap_or_default()
    }

    /// Current mapping index plus path-resolution and parse warnings.
    fn mappings(&self) -> (Arc<MappingIndex>, WarningLog) {
        let resolved = resolve_mapping_path(&self.locations, &self.settings.mapping_relative_path);
        let mut warnings = WarningLog::new();
        warnings.extend(resolved.warnings);

        let path = match resolved.path {
            Some(path) if self.settings.enabled => path,
            path => {
                return (
                    Arc::new(MappingIndex::unavailable(path, resolved.display)),
                    warnings,
                )
            }
        };
        if path.extension().is_some_and(|ext| ext == "parquet") {
            warnings.push(PARQUET_UNSUPPORTED);
            return (
                Arc::new(MappingIndex::unavailable(Some(path), resolved.display)),
                warnings,
            );
        }

        let index = self.cache.load(&path, &resolved.display);
        warnings.extend(index.warnings.iter().cloned());
        (index, warnings)
    }

    /// Drop cached mapping indexes, e.g. after a new export.
    pub fn invalidate_mappings(&self) {
        debug!("invalidating row mapping cache");
        self.cache.invalidate();
    }

    pub fn status(&self) -> RowLineageStatus {
        let (index, mut warnings) = self.mappings();
        let manifest = self.manifest();
        let resolver = ManifestResolver::new(&manifest);
        for model in &index.models {
            resolver.resolve_name(model, &mut warnings);
        }

        RowLineageStatus {
            enabled: self.settings.enabled,
            available: self.settings.enabled && index.available,
            mapping_path: index.path_display.clone(),
            mapping_mtime: index.signature.and_then(|s| s.modified_rfc3339()),
            mapping_count: index.count,
            roots: index.roots.clone(),
            models: index.models.iter().cloned().collect(),
            warnings: warnings.into_vec(),
        }
    }

    pub fn list_models(&self) -> RowLineageModels {
        let (index, mut warnings) = self.mappings();
        let manifest = self.manifest();
        let resolver = ManifestResolver::new(&manifest);

        let mut describe = |model_name: &str, is_root: bool| {
            let relation = resolver.relation_for_name(model_name, &mut warnings);
            RowLineageModelInfo {
                model_name: model_name.to_string(),
                model_unique_id: relation.as_ref().and_then(|r| r.model_unique_id.clone()),
                schema: relation.as_ref().and_then(|r| r.schema.clone()),
                database: relation.as_ref().and_then(|r| r.database.clone()),
                relation_name: relation.map(|r| r.relation_name),
                is_root,
                mappings_as_target: index.mappings_as_target(model_name),
            }
        };

        let roots: Vec<_> = index.roots.iter().map(|name| describe(name, true)).collect();
        let mut ordered: Vec<&String> = index.models.iter().collect();
        ordered.sort_by(|a, b| (!index.is_root(a), a).cmp(&(!index.is_root(b), b)));
        let models: Vec<_> = ordered
            .into_iter()
            .map(|name| describe(name, index.is_root(name)))
            .collect();

        RowLineageModels {
            roots,
            models,
            warnings: warnings.into_vec(),
        }
    }

    /// First rows of a model's table, each carrying a trace id.
    ///
    /// `limit` defaults to 100 and is clamped to `[1, preview_limit_max]`.
    /// Warehouse failures come back as a warning with no rows.
    pub fn preview_model(&self, model_unique_id: &str, limit: Option<usize>) -> LineageResult<RowLineagePreview> {
        let manifest = self.manifest();
        let relation = ManifestResolver::new(&manifest)
            .relation_for_unique_id(model_unique_id)
            .ok_or_else(|| LineageError::ModelNotFound(model_unique_id.to_string()))?;

        let max = (self.settings.preview_limit_max as usize).max(1);
        let limit = limit.unwrap_or(DEFAULT_PREVIEW_LIMIT).clamp(1, max);

        let mut warnings = Vec::new();
        let sampled = self
            .warehouse
            .columns(relation.schema.as_deref(), &relation.table)
            .and_then(|columns| {
                let rows = self.warehouse.execute(&relation.relation_name, limit)?;
                Ok((columns, rows))
            });
        let (mut columns, mut rows, trace_column_present) = match sampled {
            Ok((columns, rows)) => {
                let present = columns.iter().any(|c| c == TRACE_COLUMN);
                if !present {
                    warnings.push(PREVIEW_HEURISTIC_WARNING.to_string());
                }
                (columns, rows, present)
            }
            Err(err) => {
                warn!(relation = %relation.relation_name, error = %err, "preview fetch failed");
                warnings.push(format!(
                    "Failed to fetch rows from '{}': {err}",
                    relation.relation_name
                ));
                (Vec::new(), Vec::new(), false)
            }
        };
        for row in &mut rows {
            ensure_trace_id(row);
        }

        if columns.is_empty() {
            if let Some(first) = rows.first() {
                columns = first.keys().cloned().collect();
            }
        }
        if !columns.iter().any(|c| c == TRACE_COLUMN) {
            columns.push(TRACE_COLUMN.to_string());
        }

        Ok(RowLineagePreview {
            model_unique_id: model_unique_id.to_string(),
            model_name: relation.model_name,
            relation_name: relation.relation_name,
            schema: relation.schema,
            database: relation.database,
            trace_column: TRACE_COLUMN.to_string(),
            trace_column_present,
            columns,
            rows,
            warnings,
        })
    }

    /// Trace one row back through the mapping log.
    ///
    /// `max_hops` defaults to the configured bound and is clamped to
    /// `[1, configured]`.
    pub fn trace(&self, model_unique_id: &str, trace_id: &str, max_hops: Option<usize>) -> LineageResult<RowTraceResponse> {
        let (index, warnings) = self.mappings();
        let manifest = self.manifest();
        let resolver = ManifestResolver::new(&manifest);
        let start = resolver
            .relation_for_unique_id(model_unique_id)
            .ok_or_else(|| LineageError::ModelNotFound(model_unique_id.to_string()))?;

        let configured = (self.settings.max_hops as usize).max(1);
        let hops = max_hops.map_or(configured, |h| h.clamp(1, configured));
        info!(model = model_unique_id, trace_id, max_hops = hops, "tracing row");

        let fetcher = RowFetcher::new(
            &resolver,
            self.warehouse.as_ref(),
            self.settings.scan_max_rows as usize,
        );
        Ok(RowTraceBuilder::new(&index, fetcher, warnings).trace(start, trace_id, hops))
    }
}

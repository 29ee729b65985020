//! Model- and column-level lineage over dbt artifacts.
//!
//! # Components
//!
//! - [`model_graph`]: nodes, dependency edges, groups and depth pruning
//! - [`column_graph`]: column edges via SQL parsing with name-match fallback
//! - [`evolution`]: column differences between two artifact versions
//! - [`impact`]: transitive upstream/downstream sets
//! - [`service`]: request-level façade over an [`ArtifactStore`](crate::artifacts::ArtifactStore)

pub mod column_graph;
pub mod columns;
pub mod evolution;
pub mod impact;
pub mod model_graph;
pub mod service;
pub mod types;

pub use column_graph::{
    ColumnContext, ColumnGraphBuilder, ColumnProvenanceStrategy, NameMatchStrategy, SqlAstStrategy,
    StrategyOutput,
};
pub use columns::{collect_columns, ColumnMap, ColumnMeta};
pub use evolution::{
    diff, ChangedField, ColumnEvolution, ColumnSnapshot, ColumnStatus, EvolutionChange,
    EvolutionEntry, EvolutionReport, EvolutionSummary,
};
pub use impact::{impact, ColumnImpact, ImpactSets, ModelImpact};
pub use model_graph::{build_groups, limit_depth, ModelGraphBuilder};
pub use service::LineageService;
pub use types::{
    column_id, ColumnLineageEdge, ColumnLineageGraph, ColumnNode, ColumnSummary, GroupKind,
    LineageEdge, LineageGraph, LineageGroup, LineageNode, ModelLineageDetail,
};

//! # dbt-lineage
//!
//! Lineage and provenance over dbt build artifacts.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │        Artifacts (manifest.json, catalog.json)           │
//! │        versioned in an ArtifactStore                     │
//! └─────────────────────────────────────────────────────────┘
//!              │                              │
//!              ▼ [lineage]                    ▼ [sql]
//! ┌──────────────────────────┐   ┌──────────────────────────┐
//! │ Model graph, groups,     │   │ Compiled SQL provenance  │
//! │ impact, evolution        │◄──│ (output col -> sources)  │
//! └──────────────────────────┘   └──────────────────────────┘
//!                          │
//!                          ▼ [rows]
//! ┌─────────────────────────────────────────────────────────┐
//! │  Mapping log index + warehouse lookups -> row traces     │
//! └─────────────────────────────────────────────────────────┘
//! ```
//!
//! [`graph`] holds the traversal shared by depth pruning, impact analysis
//! and row tracing.

pub mod artifacts;
pub mod config;
pub mod error;
pub mod graph;
pub mod lineage;
pub mod logging;
pub mod rows;
pub mod sql;

pub use error::{LineageError, LineageResult};

/// Re-exports for convenient usage.
pub mod prelude {
    pub use crate::artifacts::{
        ArtifactStore, Catalog, DirectoryArtifactStore, Manifest, ManifestNode, ResourceType,
        VersionedArtifactStore,
    };
    pub use crate::config::Settings;
    pub use crate::error::{LineageError, LineageResult};
    pub use crate::lineage::{
        ColumnEvolution, ColumnGraphBuilder, ColumnImpact, ColumnLineageGraph, LineageGraph,
        LineageService, ModelGraphBuilder, ModelImpact,
    };
    pub use crate::rows::{
        MappingCache, MappingIndex, RowLineageService, RowTraceResponse, SqlExecutor,
        SqliteWarehouse,
    };
    pub use crate::sql::Dialect;
}

//! Unified error type for the lineage engine.
//!
//! Most conditions the engine meets are soft: a missing manifest, a bad line
//! in the mapping log or an unparseable SQL statement all degrade the result
//! and add a warning. Only the variants below ever reach a caller, and of
//! those only [`LineageError::ModelNotFound`] is expected in normal operation.

use std::path::PathBuf;

use crate::config::SettingsError;
use crate::rows::warehouse::WarehouseError;

/// Result type for engine operations.
pub type LineageResult<T> = Result<T, LineageError>;

/// Errors surfaced by the lineage engine.
#[derive(Debug, thiserror::Error)]
pub enum LineageError {
    /// A specifically requested model does not exist in the manifest.
    #[error("model not found: '{0}'")]
    ModelNotFound(String),

    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid artifact JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("warehouse error: {0}")]
    Warehouse(#[from] WarehouseError),

    #[error("configuration error: {0}")]
    Settings(#[from] SettingsError),
}

impl LineageError {
    /// Whether the boundary layer should answer with a 404-equivalent.
    pub fn is_not_found(&self) -> bool {
        matches!(self, LineageError::ModelNotFound(_))
    }
}

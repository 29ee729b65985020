//! Access to dbt build artifacts.
//!
//! The engine only ever reads artifacts. [`ArtifactStore`] is the seam to
//! whatever produces them: [`DirectoryArtifactStore`] reads the files a dbt
//! run leaves in its target directory, and [`VersionedArtifactStore`] keeps
//! an in-memory history that an external watcher appends to, which is what
//! the evolution differencer needs.

mod hash;
pub mod manifest;

pub use hash::{compute_hash, hash_bytes};
pub use manifest::{
    project_from_unique_id, Catalog, CatalogColumn, CatalogNode, DependsOn, Manifest,
    ManifestColumn, ManifestMetadata, ManifestNode, ResourceType,
};

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::RwLock;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, warn};

/// File name of the dependency manifest.
pub const MANIFEST: &str = "manifest.json";

/// File name of the column catalog.
pub const CATALOG: &str = "catalog.json";

/// One stored version of an artifact.
#[derive(Debug, Clone)]
pub struct ArtifactVersion {
    /// Monotonic version number, starting at 1.
    pub version: u64,
    /// When this version was observed (UTC).
    pub timestamp: Option<DateTime<Utc>>,
    /// SHA256 of the content.
    pub checksum: String,
    pub content: Value,
}

impl ArtifactVersion {
    pub fn info(&self) -> VersionInfo {
        VersionInfo {
            version: self.version,
            timestamp: self.timestamp,
            checksum: self.checksum.clone(),
        }
    }
}

/// Version metadata without the content.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VersionInfo {
    pub version: u64,
    pub timestamp: Option<DateTime<Utc>>,
    pub checksum: String,
}

/// Read-only access to dbt artifacts.
pub trait ArtifactStore: Send + Sync {
    /// Latest version of an artifact, if one has been seen.
    fn current_version(&self, artifact: &str) -> Option<ArtifactVersion>;

    /// A specific historical version.
    fn version(&self, artifact: &str, version: u64) -> Option<ArtifactVersion>;

    /// The current manifest, parsed.
    fn manifest(&self) -> Option<Manifest> {
        self.current_version(MANIFEST)
            .map(|v| Manifest::from_value(&v.content))
    }

    /// The current catalog, parsed.
    fn catalog(&self) -> Option<Catalog> {
        self.current_version(CATALOG)
            .map(|v| Catalog::from_value(&v.content))
    }
}

// =============================================================================
// Directory-backed store
// =============================================================================

/// Reads artifacts straight from a dbt target directory.
///
/// Only the current file is available; it is always reported as version 1.
#[derive(Debug, Clone)]
pub struct DirectoryArtifactStore {
    base_path: PathBuf,
}

impl DirectoryArtifactStore {
    pub fn new(base_path: impl Into<PathBuf>) -> Self {
        Self {
            base_path: base_path.into(),
        }
    }

    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    fn load(&self, artifact: &str) -> Option<ArtifactVersion> {
        let path = self.base_path.join(artifact);
        let bytes = match fs::read(&path) {
            Ok(bytes) => bytes,
            Err(err) => {
                debug!(path = %path.display(), error = %err, "artifact not readable");
                return None;
            }
        };
        let content: Value = match serde_json::from_slice(&bytes) {
            Ok(value) => value,
            Err(err) => {
                warn!(path = %path.display(), error = %err, "artifact is not valid JSON");
                return None;
            }
        };
        let timestamp = fs::metadata(&path)
            .and_then(|m| m.modified())
            .ok()
            .map(DateTime::<Utc>::from);

        Some(ArtifactVersion {
            version: 1,
            timestamp,
            checksum: hash_bytes(&bytes),
            content,
        })
    }
}

impl ArtifactStore for DirectoryArtifactStore {
    fn current_version(&self, artifact: &str) -> Option<ArtifactVersion> {
        self.load(artifact)
    }

    fn version(&self, artifact: &str, version: u64) -> Option<ArtifactVersion> {
        if version == 1 {
            self.load(artifact)
        } else {
            None
        }
    }
}

// =============================================================================
// In-memory versioned store
// =============================================================================

/// Keeps every version of each artifact it is handed.
///
/// An external watcher calls [`VersionedArtifactStore::record`] whenever a
/// build produces new artifacts; content identical to the current version is
/// not stored twice.
#[derive(Debug, Default)]
pub struct VersionedArtifactStore {
    history: RwLock<HashMap<String, Vec<ArtifactVersion>>>,
}

impl VersionedArtifactStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a new version and return its version number.
    pub fn record(&self, artifact: &str, content: Value) -> u64 {
        let checksum = compute_hash(&content).unwrap_or_default();
        let mut history = match self.history.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        let versions = history.entry(artifact.to_string()).or_default();

        if let Some(last) = versions.last() {
            if last.checksum == checksum {
                return last.version;
            }
        }

        let version = versions.last().map_or(1, |v| v.version + 1);
        debug!(artifact, version, "recorded artifact version");
        versions.push(ArtifactVersion {
            version,
            timestamp: Some(Utc::now()),
            checksum,
            content,
        });
        version
    }

    /// Number of versions held for an artifact.
    pub fn version_count(&self, artifact: &str) -> usize {
        self.read(|history| history.get(artifact).map_or(0, Vec::len))
    }

    fn read<R>(&self, f: impl FnOnce(&HashMap<String, Vec<ArtifactVersion>>) -> R) -> R {
        match self.history.read() {
            Ok(guard) => f(&*guard),
            Err(poisoned) => f(&*poisoned.into_inner()),
        }
    }
}

impl ArtifactStore for VersionedArtifactStore {
    fn current_version(&self, artifact: &str) -> Option<ArtifactVersion> {
        self.read(|history| history.get(artifact).and_then(|v| v.last().cloned()))
    }

    fn version(&self, artifact: &str, version: u64) -> Option<ArtifactVersion> {
        self.read(|history| {
            history
                .get(artifact)
                .and_then(|versions| versions.iter().find(|v| v.version == version).cloned())
        })
    }
}

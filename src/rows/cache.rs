//! Process-wide cache of parsed mapping logs.
//!
//! Entries are keyed by resolved path and stamped with the file's
//! [`FileSignature`]; a changed file is re-parsed on the next load. The lock
//! only guards the lookup and the store, never the file read, so concurrent
//! loads of a changed file may both parse it and the last store wins.

use std::collections::HashMap;
use std::fs::{self, File};
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

use tracing::{debug, info, warn};

use super::mapping::{FileSignature, MappingIndex};

#[derive(Debug, Default)]
pub struct MappingCache {
    entries: Mutex<HashMap<PathBuf, Arc<MappingIndex>>>,
}

impl MappingCache {
    pub fn new() -> Self {
        Self::default()
    }

    fn entries(&self) -> MutexGuard<'_, HashMap<PathBuf, Arc<MappingIndex>>> {
        match self.entries.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Load the index for `path`, parsing only when the file changed.
    ///
    /// A missing or unreadable file yields an unavailable index, which is
    /// never cached.
    pub fn load(&self, path: &Path, path_display: &str) -> Arc<MappingIndex> {
        let metadata = match fs::metadata(path) {
            Ok(metadata) if metadata.is_file() => metadata,
            _ => {
                debug!(path = %path.display(), "no mapping file");
                return Arc::new(MappingIndex::unavailable(Some(path.to_path_buf()), path_display));
            }
        };
        let signature = FileSignature::from_metadata(&metadata);

        if let Some(cached) = self.entries().get(path) {
            if cached.signature == Some(signature) {
                debug!(path = %path.display(), "mapping cache hit");
                return Arc::clone(cached);
            }
        }

        let parsed = File::open(path).and_then(|file| MappingIndex::from_reader(BufReader::new(file)));
        let mut index = match parsed {
            Ok(index) => index,
            Err(err) => {
                warn!(path = %path.display(), error = %err, "failed to read mapping file");
                let mut index = MappingIndex::unavailable(Some(path.to_path_buf()), path_display);
                index
                    .warnings
                    .push(format!("Failed to read row lineage mapping file: {err}"));
                return Arc::new(index);
            }
        };
        index.path = Some(path.to_path_buf());
        index.path_display = path_display.to_string();
        index.signature = Some(signature);
        info!(
            path = %path.display(),
            records = index.count,
            warnings = index.warnings.len(),
            "loaded row mappings"
        );

        let index = Arc::new(index);
        self.entries().insert(path.to_path_buf(), Arc::clone(&index));
        index
    }

    /// Drop every cached index.
    pub fn invalidate(&self) {
        self.entries().clear();
    }

    /// Drop the index for one path.
    pub fn evict(&self, path: &Path) -> bool {
        self.entries().remove(path).is_some()
    }

    pub fn len(&self) -> usize {
        self.entries().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries().is_empty()
    }
}

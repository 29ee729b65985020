//! Locating the row mapping log on disk.
//!
//! The export may leave the log in the artifacts directory, in the project's
//! `target/` or `output/` directory, or wherever `dbt_project.yml` points it
//! with `vars.rowlineage_export_path`. Candidates are tried in a fixed order
//! and may never resolve outside the base directory they are joined to.

use std::env;
use std::ffi::OsString;
use std::fs;
use std::path::{Component, Path, PathBuf};

use serde_yaml::Value as YamlValue;
use tracing::debug;

/// Default location of the log, relative to a base directory.
pub const DEFAULT_MAPPING_PATH: &str = "lineage/lineage.jsonl";

/// Directories the log may live under.
#[derive(Debug, Clone)]
pub struct MappingLocations {
    /// Where dbt artifacts are published.
    pub artifacts_dir: PathBuf,
    /// Checkout of the project in the current workspace, if any.
    pub workspace_project: Option<PathBuf>,
    /// Configured dbt project directory.
    pub dbt_project: PathBuf,
}

impl MappingLocations {
    /// The workspace checkout when it exists, else the configured project.
    pub fn project_root(&self) -> PathBuf {
        match &self.workspace_project {
            Some(path) if path.exists() => resolve_path(path),
            _ => resolve_path(&self.dbt_project),
        }
    }
}

/// File format the export writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExportFormat {
    #[default]
    Jsonl,
    Parquet,
}

impl ExportFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExportFormat::Jsonl => "jsonl",
            ExportFormat::Parquet => "parquet",
        }
    }

    fn parse(raw: &str) -> Self {
        match raw.trim().to_lowercase().as_str() {
            "parquet" => ExportFormat::Parquet,
            _ => ExportFormat::Jsonl,
        }
    }
}

/// Outcome of path resolution.
#[derive(Debug, Clone)]
pub struct ResolvedMappingPath {
    /// Existing file, or the first valid candidate when none exists.
    pub path: Option<PathBuf>,
    pub display: String,
    pub warnings: Vec<String>,
}

/// Find the mapping log.
///
/// Relative candidates: the export directory from `dbt_project.yml` (if
/// any), then `mapping_relative_path`; each also under `target/` and
/// `output/`. Bases: artifacts, workspace project, configured project.
pub fn resolve_mapping_path(locations: &MappingLocations, mapping_relative_path: &str) -> ResolvedMappingPath {
    let mut warnings = Vec::new();

    let relative = match mapping_relative_path.trim_matches('/') {
        "" => DEFAULT_MAPPING_PATH,
        path => path,
    };
    let project_root = locations.project_root();
    let (export_dir, format) = project_export_info(&project_root, &mut warnings);

    let mut base_relatives = vec![relative.to_string()];
    if let Some(dir) = export_dir {
        base_relatives.insert(0, format!("{dir}/lineage.{}", format.as_str()));
    }

    let mut candidates: Vec<String> = Vec::new();
    for rel in base_relatives {
        let mut push = |candidate: String| {
            if !candidates.contains(&candidate) {
                candidates.push(candidate);
            }
        };
        push(rel.clone());
        if !rel.starts_with("target/") {
            push(format!("target/{rel}"));
        }
        if !rel.starts_with("output/") {
            push(format!("output/{rel}"));
        }
    }

    let artifacts = locations.artifacts_dir.clone();
    let mut bases: Vec<(&str, PathBuf)> = vec![("artifacts", artifacts.clone())];
    let artifacts_resolved = resolve_path(&artifacts);
    if project_root != artifacts_resolved {
        bases.push(("workspace_project", project_root.clone()));
    }
    let configured = resolve_path(&locations.dbt_project);
    if configured != artifacts_resolved && configured != project_root {
        bases.push(("dbt_project", locations.dbt_project.clone()));
    }

    let mut first_valid: Option<PathBuf> = None;
    for (label, base) in &bases {
        let base_resolved = resolve_path(base);
        for rel in &candidates {
            let raw = base.join(rel);
            let resolved = resolve_path(&raw);
            if !resolved.starts_with(&base_resolved) {
                warnings.push(format!(
                    "Row lineage mapping path escapes the {label} directory: {}",
                    raw.display()
                ));
                continue;
            }
            if first_valid.is_none() {
                first_valid = Some(resolved.clone());
            }
            if resolved.is_file() {
                if *label != "artifacts" {
                    warnings.push(format!(
                        "Using row lineage mappings from {label} path: {}",
                        resolved.display()
                    ));
                }
                debug!(path = %resolved.display(), base = label, "found mapping log");
                return ResolvedMappingPath {
                    display: resolved.display().to_string(),
                    path: Some(resolved),
                    warnings,
                };
            }
        }
    }

    match first_valid {
        Some(path) => ResolvedMappingPath {
            display: path.display().to_string(),
            path: Some(path),
            warnings,
        },
        None => ResolvedMappingPath {
            path: None,
            display: artifacts.join(relative).display().to_string(),
            warnings,
        },
    }
}

/// Export directory (relative to the project root) and format from
/// `dbt_project.yml`.
fn project_export_info(project_root: &Path, warnings: &mut Vec<String>) -> (Option<String>, ExportFormat) {
    let project_file = project_root.join("dbt_project.yml");
    let Ok(text) = fs::read_to_string(&project_file) else {
        return (None, ExportFormat::Jsonl);
    };
    let config: YamlValue = match serde_yaml::from_str(&text) {
        Ok(config) => config,
        Err(err) => {
            warnings.push(format!(
                "Failed to parse dbt_project.yml for row lineage export path: {err}"
            ));
            return (None, ExportFormat::Jsonl);
        }
    };

    let Some(vars) = config.get("vars").filter(|v| v.is_mapping()) else {
        return (None, ExportFormat::Jsonl);
    };
    let Some(candidate) = vars
        .get("rowlineage_export_path")
        .and_then(YamlValue::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
    else {
        return (None, ExportFormat::Jsonl);
    };
    let format = vars
        .get("rowlineage_export_format")
        .and_then(YamlValue::as_str)
        .map(ExportFormat::parse)
        .unwrap_or_default();

    let mut candidate = PathBuf::from(candidate);
    if matches!(
        candidate.extension().and_then(|e| e.to_str()),
        Some("jsonl" | "parquet")
    ) {
        candidate = candidate.parent().map(Path::to_path_buf).unwrap_or_default();
    }

    if candidate.is_absolute() {
        return match resolve_path(&candidate).strip_prefix(project_root) {
            Ok(relative) if relative.as_os_str().is_empty() => (Some(".".to_string()), format),
            Ok(relative) => (Some(relative.display().to_string()), format),
            Err(_) => {
                warnings.push("Row lineage export path is outside the project root; ignoring.".to_string());
                (None, format)
            }
        };
    }

    let normalized = match candidate.display().to_string().trim_start_matches('/') {
        "" => ".".to_string(),
        path => path.to_string(),
    };
    if !resolve_path(&project_root.join(&normalized)).starts_with(project_root) {
        warnings.push("Row lineage export path escapes the project root; ignoring.".to_string());
        return (None, format);
    }
    (Some(normalized), format)
}

/// Absolute, `..`-free form of a path with symlinks resolved as far as the
/// path exists. Never fails.
pub fn resolve_path(path: &Path) -> PathBuf {
    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        env::current_dir().unwrap_or_default().join(path)
    };
    let normalized = normalize_lexically(&absolute);

    let mut existing = normalized.clone();
    let mut missing: Vec<OsString> = Vec::new();
    loop {
        if let Ok(canonical) = fs::canonicalize(&existing) {
            let mut resolved = canonical;
            for part in missing.iter().rev() {
                resolved.push(part);
            }
            return resolved;
        }
        let (Some(name), Some(parent)) = (existing.file_name(), existing.parent()) else {
            return normalized;
        };
        missing.push(name.to_os_string());
        existing = parent.to_path_buf();
    }
}

fn normalize_lexically(path: &Path) -> PathBuf {
    let mut normalized = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                normalized.pop();
            }
            other => normalized.push(other.as_os_str()),
        }
    }
    normalized
}

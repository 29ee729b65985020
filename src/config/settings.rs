//! TOML-based configuration for the lineage engine.
//!
//! Supports a config file (lineage.toml) with environment variable expansion.
//!
//! Example configuration:
//! ```toml
//! [paths]
//! artifacts = "${DBT_ARTIFACTS_PATH}"
//! project = "./jaffle_shop"
//!
//! [lineage]
//! max_initial_depth = 0        # 0 = unlimited
//! sql_column_lineage = true
//!
//! [row_lineage]
//! enabled = true
//! mapping_relative_path = "lineage/lineage.jsonl"
//! max_hops = 5
//! scan_max_rows = 5000
//!
//! [warehouse]
//! url = "./warehouse.db"
//! ```

use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

/// Error type for settings.
#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    #[error("Config file not found: {0}")]
    FileNotFound(PathBuf),

    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),

    #[error("Failed to parse config file: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("Missing environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

/// Root configuration structure.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct Settings {
    /// Artifact and project locations.
    pub paths: PathSettings,

    /// Model and column lineage settings.
    pub lineage: LineageSettings,

    /// Row-level provenance settings.
    pub row_lineage: RowLineageSettings,

    /// Warehouse used for fetching live rows.
    pub warehouse: WarehouseSettings,
}

/// Artifact and project locations.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct PathSettings {
    /// Directory holding manifest.json / catalog.json (supports ${ENV_VAR}).
    pub artifacts: String,

    /// Root of the dbt project (where dbt_project.yml lives).
    pub project: String,
}

impl Default for PathSettings {
    fn default() -> Self {
        Self {
            artifacts: "./target".to_string(),
            project: ".".to_string(),
        }
    }
}

impl PathSettings {
    pub fn artifacts_dir(&self) -> Result<PathBuf, SettingsError> {
        expand_env_vars(&self.artifacts).map(PathBuf::from)
    }

    pub fn project_dir(&self) -> Result<PathBuf, SettingsError> {
        expand_env_vars(&self.project).map(PathBuf::from)
    }
}

/// Model and column lineage settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LineageSettings {
    /// Depth applied when a caller asks for the model graph without one.
    /// Zero means unlimited.
    pub max_initial_depth: u32,

    /// Parse compiled SQL for column lineage. When false, only name matching
    /// between connected models is used.
    pub sql_column_lineage: bool,
}

impl LineageSettings {
    /// Depth to apply when the caller did not ask for one.
    pub fn default_depth(&self) -> Option<usize> {
        match self.max_initial_depth {
            0 => None,
            depth => Some(depth as usize),
        }
    }
}

impl Default for LineageSettings {
    fn default() -> Self {
        Self {
            max_initial_depth: 0,
            sql_column_lineage: true,
        }
    }
}

/// Row-level provenance settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RowLineageSettings {
    pub enabled: bool,

    /// Mapping log location, relative to the artifacts directory.
    pub mapping_relative_path: String,

    /// Upper bound on trace depth; caller-supplied hops are clamped to it.
    pub max_hops: u32,

    /// Rows scanned when a table has no trace column.
    pub scan_max_rows: u32,

    /// Upper bound on preview rows.
    pub preview_limit_max: u32,
}

impl Default for RowLineageSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            mapping_relative_path: "lineage/lineage.jsonl".to_string(),
            max_hops: 5,
            scan_max_rows: 5000,
            preview_limit_max: 500,
        }
    }
}

/// Warehouse connection settings.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct WarehouseSettings {
    /// Database URL or file path (supports ${ENV_VAR}). Empty means in-memory.
    pub url: String,
}

impl WarehouseSettings {
    /// Get the URL with environment variables expanded.
    pub fn resolved_url(&self) -> Result<String, SettingsError> {
        expand_env_vars(&self.url)
    }
}

impl Settings {
    /// Load settings from a TOML file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, SettingsError> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(SettingsError::FileNotFound(path.to_path_buf()));
        }

        let content = fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    /// Parse settings from TOML text and validate them.
    pub fn from_toml(content: &str) -> Result<Self, SettingsError> {
        let settings: Settings = toml::from_str(content)?;
        settings.validate()?;
        Ok(settings)
    }

    /// Load settings from the default config file locations.
    ///
    /// Searches in order:
    /// 1. Environment variable `LINEAGE_CONFIG`
    /// 2. `./lineage.toml`
    /// 3. `~/.config/dbt-lineage/config.toml`
    pub fn load() -> Result<Self, SettingsError> {
        if let Ok(path) = env::var("LINEAGE_CONFIG") {
            return Self::from_file(&path);
        }

        let local_config = PathBuf::from("lineage.toml");
        if local_config.exists() {
            return Self::from_file(&local_config);
        }

        if let Some(config_dir) = dirs::config_dir() {
            let user_config = config_dir.join("dbt-lineage").join("config.toml");
            if user_config.exists() {
                return Self::from_file(&user_config);
            }
        }

        Ok(Settings::default())
    }

    fn validate(&self) -> Result<(), SettingsError> {
        if self.row_lineage.max_hops == 0 {
            return Err(SettingsError::InvalidConfig(
                "row_lineage.max_hops must be at least 1".to_string(),
            ));
        }
        if self.row_lineage.mapping_relative_path.trim_matches('/').is_empty() {
            return Err(SettingsError::InvalidConfig(
                "row_lineage.mapping_relative_path must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}

/// Expand environment variables in a string.
///
/// Supports `${VAR}` and `$VAR` syntax.
pub fn expand_env_vars(s: &str) -> Result<String, SettingsError> {
    let mut result = String::with_capacity(s.len());
    let mut chars = s.chars().peekable();

    while let Some(c) = chars.next() {
        if c != '$' {
            result.push(c);
            continue;
        }

        let mut var_name = String::new();
        if chars.peek() == Some(&'{') {
            chars.next();
            for ch in chars.by_ref() {
                if ch == '}' {
                    break;
                }
                var_name.push(ch);
            }
        } else {
            while let Some(&ch) = chars.peek() {
                if !(ch.is_alphanumeric() || ch == '_') {
                    break;
                }
                var_name.push(ch);
                chars.next();
            }
            if var_name.is_empty() {
                // Just a lone $, keep it
                result.push('$');
                continue;
            }
        }

        let value =
            env::var(&var_name).map_err(|_| SettingsError::MissingEnvVar(var_name.clone()))?;
        result.push_str(&value);
    }

    Ok(result)
}

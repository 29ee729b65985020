//! Configuration module.
//!
//! Handles artifact locations, lineage limits and warehouse settings.

mod settings;

pub use settings::{
    expand_env_vars, LineageSettings, PathSettings, RowLineageSettings, Settings, SettingsError,
    WarehouseSettings,
};

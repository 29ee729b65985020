//! Typed view of the dbt manifest and catalog.
//!
//! dbt artifacts are large, loosely-typed JSON documents whose shape drifts
//! between dbt versions. They are parsed here once, node by node: a node that
//! does not fit the expected shape is dropped with a warning instead of
//! failing the whole document, and every algorithm downstream works on these
//! structs rather than on raw maps.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;

// =============================================================================
// Resource kinds
// =============================================================================

/// The dbt resource type of a manifest node.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ResourceType {
    Model,
    Source,
    Seed,
    Snapshot,
    Test,
    Other(String),
}

impl ResourceType {
    pub fn as_str(&self) -> &str {
        match self {
            ResourceType::Model => "model",
            ResourceType::Source => "source",
            ResourceType::Seed => "seed",
            ResourceType::Snapshot => "snapshot",
            ResourceType::Test => "test",
            ResourceType::Other(name) => name,
        }
    }

    /// Tests never appear on a lineage surface.
    pub fn is_lineage(&self) -> bool {
        !matches!(self, ResourceType::Test)
    }

    /// Kinds whose compiled SQL describes how their columns are produced.
    pub fn has_column_sql(&self) -> bool {
        matches!(
            self,
            ResourceType::Model | ResourceType::Snapshot | ResourceType::Seed | ResourceType::Source
        )
    }
}

impl From<&str> for ResourceType {
    fn from(value: &str) -> Self {
        match value {
            "model" => ResourceType::Model,
            "source" => ResourceType::Source,
            "seed" => ResourceType::Seed,
            "snapshot" => ResourceType::Snapshot,
            "test" => ResourceType::Test,
            other => ResourceType::Other(other.to_string()),
        }
    }
}

impl fmt::Display for ResourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for ResourceType {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for ResourceType {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Ok(ResourceType::from(raw.as_str()))
    }
}

/// Treat an explicit JSON `null` the same as a missing field.
fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

// =============================================================================
// Manifest
// =============================================================================

/// Manifest-level metadata.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ManifestMetadata {
    #[serde(default)]
    pub project_name: Option<String>,
    #[serde(default)]
    pub adapter_type: Option<String>,
}

/// Declared dependencies of a node.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct DependsOn {
    #[serde(default, deserialize_with = "null_as_default")]
    pub nodes: Vec<String>,
}

/// A column as declared in a model's YAML.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ManifestColumn {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub data_type: Option<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub tags: Vec<String>,
}

/// A model, source, seed, snapshot or test from the manifest.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ManifestNode {
    /// Filled from the map key, which is authoritative.
    #[serde(skip)]
    pub unique_id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub alias: Option<String>,
    /// Raw resource type; `None` when the manifest omits it.
    #[serde(default)]
    pub resource_type: Option<ResourceType>,
    #[serde(default)]
    pub database: Option<String>,
    #[serde(default)]
    pub schema: Option<String>,
    #[serde(default)]
    pub relation_name: Option<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub tags: Vec<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub columns: BTreeMap<String, ManifestColumn>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub depends_on: DependsOn,
    /// dbt >= 1.3.
    #[serde(default)]
    pub compiled_code: Option<String>,
    /// Pre-1.3 name; used when `compiled_code` is absent or blank.
    #[serde(default, rename = "compiled_sql")]
    pub legacy_compiled_sql: Option<String>,
}

impl ManifestNode {
    /// Resource kind, defaulting to model when the manifest omits it.
    pub fn kind(&self) -> ResourceType {
        self.resource_type.clone().unwrap_or(ResourceType::Model)
    }

    /// Display label: alias, then name, then the unique id.
    pub fn label(&self) -> &str {
        non_empty(&self.alias)
            .or_else(|| non_empty(&self.name))
            .unwrap_or(&self.unique_id)
    }

    /// Physical table name: alias, then name.
    pub fn table_name(&self) -> Option<&str> {
        non_empty(&self.alias).or_else(|| non_empty(&self.name))
    }

    /// Compiled SQL, if the node has any non-blank SQL.
    pub fn compiled_sql(&self) -> Option<&str> {
        fn non_blank(sql: &Option<String>) -> Option<&str> {
            sql.as_deref().filter(|s| !s.trim().is_empty())
        }
        non_blank(&self.compiled_code).or_else(|| non_blank(&self.legacy_compiled_sql))
    }

    /// The dbt project segment of a unique id (`model.<project>.<name>`).
    pub fn project(&self) -> Option<&str> {
        project_from_unique_id(&self.unique_id)
    }
}

/// Extract the project segment from `kind.project.name[...]`.
pub fn project_from_unique_id(unique_id: &str) -> Option<&str> {
    let mut parts = unique_id.split('.');
    let _kind = parts.next()?;
    let project = parts.next()?;
    parts.next()?;
    Some(project)
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|s| !s.is_empty())
}

/// A parsed dbt manifest.
///
/// `nodes` merges the manifest's `nodes` and `sources` maps; on a key
/// collision the source entry wins.
#[derive(Debug, Clone, Default)]
pub struct Manifest {
    pub metadata: ManifestMetadata,
    pub nodes: BTreeMap<String, ManifestNode>,
    /// Problems found while parsing; never fatal.
    pub warnings: Vec<String>,
}

impl Manifest {
    /// Parse a manifest from raw JSON.
    pub fn from_value(value: &Value) -> Self {
        let mut manifest = Manifest::default();
        let Some(root) = value.as_object() else {
            manifest
                .warnings
                .push("manifest.json is not a JSON object.".to_string());
            return manifest;
        };

        if let Some(metadata) = root.get("metadata") {
            match ManifestMetadata::deserialize(metadata) {
                Ok(parsed) => manifest.metadata = parsed,
                Err(err) => manifest
                    .warnings
                    .push(format!("Ignoring malformed manifest metadata: {err}")),
            }
        }

        for section in ["nodes", "sources"] {
            let Some(entries) = root.get(section).and_then(Value::as_object) else {
                continue;
            };
            for (unique_id, raw) in entries {
                match ManifestNode::deserialize(raw) {
                    Ok(mut node) => {
                        node.unique_id = unique_id.clone();
                        manifest.nodes.insert(unique_id.clone(), node);
                    }
                    Err(err) => manifest
                        .warnings
                        .push(format!("Skipping malformed manifest node '{unique_id}': {err}")),
                }
            }
        }

        manifest
    }

    /// Nodes that may appear on a lineage surface (everything but tests).
    pub fn lineage_nodes(&self) -> impl Iterator<Item = &ManifestNode> {
        self.nodes.values().filter(|node| node.kind().is_lineage())
    }

    /// Look up a lineage node by unique id.
    pub fn lineage_node(&self, unique_id: &str) -> Option<&ManifestNode> {
        self.nodes
            .get(unique_id)
            .filter(|node| node.kind().is_lineage())
    }

    pub fn project_name(&self) -> Option<&str> {
        non_empty(&self.metadata.project_name)
    }

    pub fn adapter_type(&self) -> Option<&str> {
        non_empty(&self.metadata.adapter_type)
    }
}

// =============================================================================
// Catalog
// =============================================================================

/// A column as observed in the warehouse.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CatalogColumn {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default, rename = "type")]
    pub data_type: Option<String>,
    #[serde(default)]
    pub comment: Option<String>,
}

/// Physical metadata for one relation.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CatalogNode {
    #[serde(default, deserialize_with = "null_as_default")]
    pub columns: BTreeMap<String, CatalogColumn>,
}

/// A parsed dbt catalog (`nodes` and `sources` merged).
#[derive(Debug, Clone, Default)]
pub struct Catalog {
    pub nodes: BTreeMap<String, CatalogNode>,
    pub warnings: Vec<String>,
}

impl Catalog {
    /// Parse a catalog from raw JSON.
    pub fn from_value(value: &Value) -> Self {
        let mut catalog = Catalog::default();
        let Some(root) = value.as_object() else {
            catalog
                .warnings
                .push("catalog.json is not a JSON object.".to_string());
            return catalog;
        };

        for section in ["nodes", "sources"] {
            let Some(entries) = root.get(section).and_then(Value::as_object) else {
                continue;
            };
            for (unique_id, raw) in entries {
                match CatalogNode::deserialize(raw) {
                    Ok(node) => {
                        catalog.nodes.insert(unique_id.clone(), node);
                    }
                    Err(err) => catalog
                        .warnings
                        .push(format!("Skipping malformed catalog node '{unique_id}': {err}")),
                }
            }
        }

        catalog
    }
}

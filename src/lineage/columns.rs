//! Merging declared (manifest) and observed (catalog) column metadata.

use std::collections::{BTreeMap, BTreeSet};

use serde::Serialize;

use crate::artifacts::{Catalog, CatalogColumn, ManifestColumn, ManifestNode};

/// Merged metadata for one column.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ColumnMeta {
    pub name: String,
    pub description: Option<String>,
    #[serde(rename = "type")]
    pub data_type: Option<String>,
    pub tags: Vec<String>,
}

/// model unique id -> column key -> metadata, both sorted.
pub type ColumnMap = BTreeMap<String, BTreeMap<String, ColumnMeta>>;

/// Merge manifest and catalog columns for every node.
///
/// The key set is the union of both sources. The catalog's physical type
/// wins over the declared `data_type`; the manifest description wins over
/// the catalog comment. Tags only exist in the manifest.
pub fn collect_columns<'a, I>(nodes: I, catalog: Option<&Catalog>) -> ColumnMap
where
    I: IntoIterator<Item = &'a ManifestNode>,
{
    let empty = BTreeMap::new();
    let mut columns = ColumnMap::new();

    for node in nodes {
        let catalog_columns = catalog
            .and_then(|c| c.nodes.get(&node.unique_id))
            .map_or(&empty, |n| &n.columns);

        let names: BTreeSet<&String> = node.columns.keys().chain(catalog_columns.keys()).collect();
        let merged = names
            .into_iter()
            .map(|name| {
                let meta = merge(name, node.columns.get(name), catalog_columns.get(name));
                (name.clone(), meta)
            })
            .collect();
        columns.insert(node.unique_id.clone(), merged);
    }

    columns
}

fn merge(key: &str, declared: Option<&ManifestColumn>, observed: Option<&CatalogColumn>) -> ColumnMeta {
    let declared_name = declared.and_then(|c| present(&c.name));
    let observed_name = observed.and_then(|c| present(&c.name));

    ColumnMeta {
        name: declared_name.or(observed_name).unwrap_or(key).to_string(),
        description: declared
            .and_then(|c| present(&c.description))
            .or_else(|| observed.and_then(|c| present(&c.comment)))
            .map(str::to_string),
        data_type: observed
            .and_then(|c| present(&c.data_type))
            .or_else(|| declared.and_then(|c| present(&c.data_type)))
            .map(str::to_string),
        tags: declared.map(|c| c.tags.clone()).unwrap_or_default(),
    }
}

fn present(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|s| !s.is_empty())
}

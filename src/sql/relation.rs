//! Relation-name normalization and lookup.
//!
//! Compiled SQL refers to models by their physical relation names in whatever
//! quoting the adapter uses. Every name that could refer to a node is reduced
//! to one normal form and mapped back to the node's unique id.

use std::collections::HashMap;

use crate::artifacts::ManifestNode;

/// Normalize a relation name: strip `"`, `` ` ``, `[`, `]`, trim and lowercase.
///
/// Returns `None` when nothing is left.
pub fn normalize_relation(name: &str) -> Option<String> {
    let normalized: String = name
        .chars()
        .filter(|c| !matches!(c, '"' | '`' | '[' | ']'))
        .collect::<String>()
        .trim()
        .to_lowercase();
    if normalized.is_empty() {
        None
    } else {
        Some(normalized)
    }
}

/// Normalized relation name to node unique id.
#[derive(Debug, Clone, Default)]
pub struct RelationLookup {
    keys: HashMap<String, String>,
}

impl RelationLookup {
    /// Index every name a node can be referenced by: its relation name, its
    /// table name (alias or name), `schema.table` and `database.schema.table`.
    ///
    /// When two nodes share a key, the first one seen keeps it.
    pub fn build<'a, I>(nodes: I) -> Self
    where
        I: IntoIterator<Item = &'a ManifestNode>,
    {
        let mut keys = HashMap::new();
        for node in nodes {
            let table = node.table_name();
            let schema = node.schema.as_deref().filter(|s| !s.is_empty());
            let database = node.database.as_deref().filter(|s| !s.is_empty());

            let mut candidates: Vec<String> = Vec::with_capacity(4);
            if let Some(relation) = node.relation_name.as_deref() {
                candidates.push(relation.to_string());
            }
            if let Some(table) = table {
                candidates.push(table.to_string());
                if let Some(schema) = schema {
                    candidates.push(format!("{schema}.{table}"));
                    if let Some(database) = database {
                        candidates.push(format!("{database}.{schema}.{table}"));
                    }
                }
            }

            for candidate in candidates {
                if let Some(key) = normalize_relation(&candidate) {
                    keys.entry(key).or_insert_with(|| node.unique_id.clone());
                }
            }
        }
        Self { keys }
    }

    /// Resolve a raw relation reference to a unique id.
    pub fn resolve(&self, name: &str) -> Option<&str> {
        normalize_relation(name).and_then(|key| self.keys.get(&key).map(String::as_str))
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

//! Resolving model names from the mapping log to manifest nodes.
//!
//! The mapping log records bare model names. Several manifest nodes can
//! share a name (a model and a seed, or packages that define the same model),
//! so resolution prefers the root project, then the more specific resource
//! kind, then the lexically smallest unique id.

use std::collections::{HashMap, HashSet};

use serde::Serialize;

use crate::artifacts::{project_from_unique_id, Manifest, ManifestNode, ResourceType};

/// Warnings in insertion order, without duplicates.
#[derive(Debug, Clone, Default)]
pub struct WarningLog {
    messages: Vec<String>,
    seen: HashSet<String>,
}

impl WarningLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, message: impl Into<String>) {
        let message = message.into();
        if self.seen.insert(message.clone()) {
            self.messages.push(message);
        }
    }

    pub fn extend<I, S>(&mut self, messages: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        for message in messages {
            self.push(message);
        }
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn into_vec(self) -> Vec<String> {
        self.messages
    }
}

/// Physical location of a model's table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RelationInfo {
    /// Bare model name, as used in the mapping log.
    pub model_name: String,
    pub model_unique_id: Option<String>,
    pub database: Option<String>,
    pub schema: Option<String>,
    /// `database.schema.table` with missing parts left out.
    pub relation_name: String,
    pub table: String,
    pub resource_type: Option<ResourceType>,
}

impl RelationInfo {
    pub fn from_node(node: &ManifestNode) -> Self {
        let model_name = node
            .name
            .as_deref()
            .filter(|n| !n.is_empty())
            .unwrap_or(&node.unique_id)
            .to_string();
        let table = node.table_name().unwrap_or(&model_name).to_string();
        let database = node.database.clone().filter(|d| !d.is_empty());
        let schema = node.schema.clone().filter(|s| !s.is_empty());
        let relation_name = [database.as_deref(), schema.as_deref(), Some(table.as_str())]
            .into_iter()
            .flatten()
            .collect::<Vec<_>>()
            .join(".");

        Self {
            model_name,
            model_unique_id: Some(node.unique_id.clone()),
            database,
            schema,
            relation_name,
            table,
            resource_type: node.resource_type.clone(),
        }
    }
}

/// Rank of a resource kind when several nodes share a name.
fn resource_rank(resource_type: Option<&ResourceType>) -> u8 {
    match resource_type {
        Some(ResourceType::Model) => 0,
        Some(ResourceType::Seed) => 1,
        Some(ResourceType::Snapshot) => 2,
        Some(_) => 50,
        None => 99,
    }
}

/// Name -> node resolution over one manifest.
#[derive(Debug)]
pub struct ManifestResolver<'a> {
    manifest: &'a Manifest,
    by_name: HashMap<&'a str, Vec<&'a ManifestNode>>,
}

impl<'a> ManifestResolver<'a> {
    pub fn new(manifest: &'a Manifest) -> Self {
        let mut by_name: HashMap<&'a str, Vec<&'a ManifestNode>> = HashMap::new();
        for node in manifest.nodes.values() {
            if let Some(name) = node.name.as_deref().filter(|n| !n.is_empty()) {
                by_name.entry(name).or_default().push(node);
            }
        }

        let project = manifest.project_name();
        let rank = |node: &ManifestNode| -> (u8, u8) {
            let project_rank = match project {
                Some(p) if project_from_unique_id(&node.unique_id) == Some(p) => 0,
                _ => 1,
            };
            (project_rank, resource_rank(node.resource_type.as_ref()))
        };
        for candidates in by_name.values_mut() {
            candidates.sort_by(|a, b| {
                rank(a)
                    .cmp(&rank(b))
                    .then_with(|| a.unique_id.cmp(&b.unique_id))
            });
        }

        Self { manifest, by_name }
    }

    /// Best node for a bare model name.
    pub fn resolve_name(&self, model_name: &str, warnings: &mut WarningLog) -> Option<&'a ManifestNode> {
        let Some(candidates) = self.by_name.get(model_name) else {
            warnings.push(format!("Model '{model_name}' not found in manifest."));
            return None;
        };
        let best = candidates.first()?;
        if candidates.len() > 1 {
            warnings.push(format!(
                "Multiple manifest nodes match model '{model_name}'. Using '{}'.",
                best.unique_id
            ));
        }
        Some(best)
    }

    pub fn relation_for_name(&self, model_name: &str, warnings: &mut WarningLog) -> Option<RelationInfo> {
        self.resolve_name(model_name, warnings)
            .map(RelationInfo::from_node)
    }

    pub fn relation_for_unique_id(&self, unique_id: &str) -> Option<RelationInfo> {
        self.manifest.nodes.get(unique_id).map(RelationInfo::from_node)
    }
}

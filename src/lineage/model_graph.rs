//! Model-level lineage graph.

use std::collections::{BTreeMap, BTreeSet};

use tracing::{debug, warn};

use super::columns::collect_columns;
use super::types::{
    ColumnSummary, GroupKind, LineageEdge, LineageGraph, LineageGroup, LineageNode,
    ModelLineageDetail,
};
use crate::artifacts::{Catalog, Manifest};
use crate::error::{LineageError, LineageResult};
use crate::graph::{bounded_bfs, Adjacency};

/// Builds the model graph from a parsed manifest.
#[derive(Debug, Clone, Copy)]
pub struct ModelGraphBuilder<'a> {
    manifest: &'a Manifest,
}

impl<'a> ModelGraphBuilder<'a> {
    pub fn new(manifest: &'a Manifest) -> Self {
        Self { manifest }
    }

    /// Build the graph, optionally pruned to `max_depth` hops from the roots.
    ///
    /// `None` and `Some(0)` both mean unlimited. Groups are always computed
    /// over the full node set.
    pub fn build(&self, max_depth: Option<usize>) -> LineageGraph {
        let nodes = self.nodes();
        let edges = self.edges();
        let groups = build_groups(&nodes);
        let warnings = cycle_warnings(&edges);
        let (nodes, edges) = limit_depth(nodes, edges, max_depth);
        debug!(
            nodes = nodes.len(),
            edges = edges.len(),
            groups = groups.len(),
            "built model graph"
        );
        LineageGraph {
            nodes,
            edges,
            groups,
            warnings,
        }
    }

    /// Every lineage node, sorted by id.
    pub fn nodes(&self) -> Vec<LineageNode> {
        self.manifest
            .lineage_nodes()
            .map(|node| LineageNode {
                id: node.unique_id.clone(),
                label: node.label().to_string(),
                resource_type: node.kind(),
                database: node.database.clone(),
                schema: node.schema.clone(),
                tags: node.tags.clone(),
            })
            .collect()
    }

    /// Dependency edges between lineage nodes, sorted and de-duplicated.
    ///
    /// A dependency on anything that is not itself a lineage node (a macro,
    /// a test, a node missing from this build) is dropped.
    pub fn edges(&self) -> Vec<LineageEdge> {
        let mut edges = BTreeSet::new();
        for node in self.manifest.lineage_nodes() {
            for parent in &node.depends_on.nodes {
                if self.manifest.lineage_node(parent).is_some() {
                    edges.insert(LineageEdge::new(parent.as_str(), node.unique_id.as_str()));
                }
            }
        }
        edges.into_iter().collect()
    }

    /// Parents, children and merged column metadata for one model.
    pub fn detail(&self, model_id: &str, catalog: Option<&Catalog>) -> LineageResult<ModelLineageDetail> {
        let node = self
            .manifest
            .lineage_node(model_id)
            .ok_or_else(|| LineageError::ModelNotFound(model_id.to_string()))?;

        let parents: BTreeSet<String> = node
            .depends_on
            .nodes
            .iter()
            .filter(|parent| self.manifest.lineage_node(parent).is_some())
            .cloned()
            .collect();
        let children: BTreeSet<String> = self
            .manifest
            .lineage_nodes()
            .filter(|child| child.depends_on.nodes.iter().any(|p| p == model_id))
            .map(|child| child.unique_id.clone())
            .collect();

        let columns = collect_columns([node], catalog)
            .remove(model_id)
            .unwrap_or_default()
            .into_iter()
            .map(|(name, meta)| {
                (
                    name,
                    ColumnSummary {
                        description: meta.description,
                        data_type: meta.data_type,
                    },
                )
            })
            .collect();

        Ok(ModelLineageDetail {
            model_id: model_id.to_string(),
            parents: parents.into_iter().collect(),
            children: children.into_iter().collect(),
            columns,
            tags: node.tags.clone(),
            schema: node.schema.clone(),
            database: node.database.clone(),
        })
    }
}

/// Group nodes by `database.schema`, resource type and tag.
///
/// Groups come out schema first, then resource type, then tag; each kind
/// sorted by key.
pub fn build_groups(nodes: &[LineageNode]) -> Vec<LineageGroup> {
    let mut schemas: BTreeMap<String, Vec<String>> = BTreeMap::new();
    let mut resources: BTreeMap<String, Vec<String>> = BTreeMap::new();
    let mut tags: BTreeMap<String, Vec<String>> = BTreeMap::new();

    for node in nodes {
        let parts: Vec<&str> = [node.database.as_deref(), node.schema.as_deref()]
            .into_iter()
            .flatten()
            .filter(|part| !part.is_empty())
            .collect();
        let schema_key = if parts.is_empty() {
            "default".to_string()
        } else {
            parts.join(".")
        };
        schemas.entry(schema_key).or_default().push(node.id.clone());
        resources
            .entry(node.resource_type.as_str().to_string())
            .or_default()
            .push(node.id.clone());
        for tag in &node.tags {
            tags.entry(tag.clone()).or_default().push(node.id.clone());
        }
    }

    let kinds = [
        (GroupKind::Schema, "schema", schemas),
        (GroupKind::ResourceType, "resource", resources),
        (GroupKind::Tag, "tag", tags),
    ];
    kinds
        .into_iter()
        .flat_map(|(kind, prefix, groups)| {
            groups.into_iter().map(move |(key, mut members)| {
                members.sort();
                members.dedup();
                LineageGroup {
                    id: format!("{prefix}:{key}"),
                    label: key,
                    kind,
                    members,
                }
            })
        })
        .collect()
}

/// Keep nodes within `max_depth` hops of a root, and the edges between them.
///
/// Roots are nodes without incoming edges; when every node has one (a cycle
/// covers the graph) every node is a root.
pub fn limit_depth(
    nodes: Vec<LineageNode>,
    edges: Vec<LineageEdge>,
    max_depth: Option<usize>,
) -> (Vec<LineageNode>, Vec<LineageEdge>) {
    let Some(max_depth) = max_depth.filter(|depth| *depth >= 1) else {
        return (nodes, edges);
    };

    let adjacency = Adjacency::from_edges(edges.iter().map(|e| (e.source.clone(), e.target.clone())));
    let mut roots: Vec<String> = nodes
        .iter()
        .filter(|node| !adjacency.has_incoming(&node.id))
        .map(|node| node.id.clone())
        .collect();
    if roots.is_empty() {
        roots = nodes.iter().map(|node| node.id.clone()).collect();
    }

    let kept = bounded_bfs(roots, Some(max_depth), |id| adjacency.successors(id).to_vec()).nodes();

    let nodes = nodes.into_iter().filter(|n| kept.contains(&n.id)).collect();
    let edges = edges
        .into_iter()
        .filter(|e| kept.contains(&e.source) && kept.contains(&e.target))
        .collect();
    (nodes, edges)
}

fn cycle_warnings(edges: &[LineageEdge]) -> Vec<String> {
    let adjacency = Adjacency::from_edges(edges.iter().map(|e| (e.source.as_str(), e.target.as_str())));
    let mut cycles: Vec<Vec<&str>> = adjacency
        .cycles()
        .into_iter()
        .map(|mut members| {
            members.sort_unstable();
            members
        })
        .collect();
    cycles.sort();

    cycles
        .into_iter()
        .map(|members| {
            let message = format!("Dependency cycle detected between: {}.", members.join(", "));
            warn!("{message}");
            message
        })
        .collect()
}

//! Upstream/downstream reachability.

use std::collections::HashSet;

use serde::Serialize;

use crate::graph::{reachable, Adjacency};

/// Everything a node depends on and everything that depends on it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ImpactSets {
    pub upstream: Vec<String>,
    pub downstream: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ModelImpact {
    pub model_id: String,
    pub impact: ImpactSets,
}

#[derive(Debug, Clone, Serialize)]
pub struct ColumnImpact {
    pub column_id: String,
    pub impact: ImpactSets,
}

/// Transitive upstream and downstream sets of `node_id` over `edges`.
///
/// The start node is never part of either set, even on a cycle. An unknown
/// node yields two empty sets.
pub fn impact<'a, I>(node_id: &'a str, edges: I) -> ImpactSets
where
    I: IntoIterator<Item = (&'a str, &'a str)>,
{
    let adjacency = Adjacency::from_edges(edges);
    if !adjacency.contains(&node_id) {
        return ImpactSets::default();
    }

    ImpactSets {
        upstream: sorted(reachable(&node_id, |n| adjacency.predecessors(n).to_vec())),
        downstream: sorted(reachable(&node_id, |n| adjacency.successors(n).to_vec())),
    }
}

fn sorted(set: HashSet<&str>) -> Vec<String> {
    let mut ids: Vec<String> = set.into_iter().map(str::to_string).collect();
    ids.sort();
    ids
}

//! Breadth-first traversal shared by every graph walk in the engine.
//!
//! Depth pruning of the model graph, impact analysis and the backward row
//! trace are all the same walk: a work queue, a visited set and an optional
//! hop bound over an adjacency built once per call.

use std::collections::{HashMap, HashSet, VecDeque};
use std::hash::Hash;

use petgraph::algo::tarjan_scc;
use petgraph::graph::{DiGraph, NodeIndex};

/// Forward and backward adjacency over an edge list.
#[derive(Debug, Clone)]
pub struct Adjacency<N> {
    forward: HashMap<N, Vec<N>>,
    backward: HashMap<N, Vec<N>>,
}

impl<N: Clone + Eq + Hash> Adjacency<N> {
    /// Build adjacency from `(source, target)` pairs.
    pub fn from_edges<I>(edges: I) -> Self
    where
        I: IntoIterator<Item = (N, N)>,
    {
        let mut forward: HashMap<N, Vec<N>> = HashMap::new();
        let mut backward: HashMap<N, Vec<N>> = HashMap::new();
        for (source, target) in edges {
            forward
                .entry(source.clone())
                .or_default()
                .push(target.clone());
            backward.entry(target).or_default().push(source);
        }
        Self { forward, backward }
    }

    /// Nodes this node points to.
    pub fn successors(&self, node: &N) -> &[N] {
        self.forward.get(node).map_or(&[], Vec::as_slice)
    }

    /// Nodes pointing at this node.
    pub fn predecessors(&self, node: &N) -> &[N] {
        self.backward.get(node).map_or(&[], Vec::as_slice)
    }

    pub fn has_incoming(&self, node: &N) -> bool {
        !self.predecessors(node).is_empty()
    }

    pub fn contains(&self, node: &N) -> bool {
        self.forward.contains_key(node) || self.backward.contains_key(node)
    }

    /// Strongly connected components that form a cycle.
    ///
    /// A single node only counts when it has a self-loop.
    pub fn cycles(&self) -> Vec<Vec<N>> {
        let mut graph: DiGraph<N, ()> = DiGraph::new();
        let mut index: HashMap<N, NodeIndex> = HashMap::new();
        let mut node_for = |graph: &mut DiGraph<N, ()>, node: &N| -> NodeIndex {
            *index
                .entry(node.clone())
                .or_insert_with(|| graph.add_node(node.clone()))
        };

        for (source, targets) in &self.forward {
            let from = node_for(&mut graph, source);
            for target in targets {
                let to = node_for(&mut graph, target);
                graph.add_edge(from, to, ());
            }
        }

        tarjan_scc(&graph)
            .into_iter()
            .filter(|scc| {
                scc.len() > 1 || graph.edges_connecting(scc[0], scc[0]).next().is_some()
            })
            .map(|scc| {
                scc.into_iter()
                    .filter_map(|idx| graph.node_weight(idx).cloned())
                    .collect()
            })
            .collect()
    }
}

/// A node reached by a traversal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Visit<N> {
    pub node: N,
    /// Hops from the nearest start node.
    pub depth: usize,
    /// Whether the node's neighbors were followed (false at the hop bound).
    pub expanded: bool,
}

/// Result of a bounded traversal.
#[derive(Debug, Clone)]
pub struct Traversal<N> {
    /// Every reached node, in discovery order, each exactly once.
    pub visits: Vec<Visit<N>>,
    /// A node at the hop bound still had neighbors.
    pub truncated: bool,
}

impl<N: Clone + Eq + Hash> Traversal<N> {
    pub fn nodes(&self) -> HashSet<N> {
        self.visits.iter().map(|v| v.node.clone()).collect()
    }
}

/// Breadth-first walk from `starts`, following `neighbors`.
///
/// Start nodes sit at depth 0. With `max_depth = Some(k)`, nodes at depth `k`
/// are reached but not expanded; if any of them has neighbors the traversal
/// is marked truncated. Each node is visited once, so cycles terminate.
pub fn bounded_bfs<N, S, F, I>(starts: S, max_depth: Option<usize>, mut neighbors: F) -> Traversal<N>
where
    N: Clone + Eq + Hash,
    S: IntoIterator<Item = N>,
    F: FnMut(&N) -> I,
    I: IntoIterator<Item = N>,
{
    let mut visited: HashSet<N> = HashSet::new();
    let mut queue: VecDeque<(N, usize)> = VecDeque::new();
    for start in starts {
        if visited.insert(start.clone()) {
            queue.push_back((start, 0));
        }
    }

    let mut visits = Vec::new();
    let mut truncated = false;

    while let Some((node, depth)) = queue.pop_front() {
        let at_bound = max_depth.is_some_and(|max| depth >= max);
        if at_bound {
            if neighbors(&node).into_iter().next().is_some() {
                truncated = true;
            }
        } else {
            for next in neighbors(&node) {
                if visited.insert(next.clone()) {
                    queue.push_back((next, depth + 1));
                }
            }
        }
        visits.push(Visit {
            node,
            depth,
            expanded: !at_bound,
        });
    }

    Traversal { visits, truncated }
}

/// Every node reachable from `start` (excluding `start` itself).
pub fn reachable<N, F, I>(start: &N, neighbors: F) -> HashSet<N>
where
    N: Clone + Eq + Hash,
    F: FnMut(&N) -> I,
    I: IntoIterator<Item = N>,
{
    let mut nodes = bounded_bfs([start.clone()], None, neighbors).nodes();
    nodes.remove(start);
    nodes
}

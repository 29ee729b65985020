//! Graph utilities shared across lineage surfaces.

pub mod traverse;

pub use traverse::{bounded_bfs, reachable, Adjacency, Traversal, Visit};

//! Dependency Graph
//!
//! This module implements the graph that tracks which state variables read
//! which others.
//!
//! # Overview
//!
//! The dependency graph is a directed graph where:
//!
//! - Nodes represent state variables (essential, computed or display)
//! - Edges represent dependencies: if A reads B, there is an edge from B to A
//!
//! When an essential variable changes, we traverse the graph to find all
//! affected nodes and mark them as maybe-dirty. Evaluation later pulls values
//! through the graph and recomputes only what a read actually needs.
//!
//! # Design Decisions
//!
//! 1. We use a centralized arena rather than per-variable subscriber lists:
//!    - Aliased components share variables by sharing arena indices
//!    - Cycle detection needs a global view
//!    - Invalidation is a plain BFS over indices
//!
//! 2. The graph is indexed by `VarId` for O(1) lookups.
//!
//! 3. We maintain both forward (dependencies) and reverse (dependents) edges
//!    to enable efficient traversal in both directions.

mod node;
mod scheduler;

pub use node::{DirtyState, Node, NodeKind, VarId};
pub use scheduler::DependencyGraph;

//! Invalidation Scheduler
//!
//! The dependency graph owns every node and decides which nodes an
//! essential write invalidates.
//!
//! # Algorithm
//!
//! Invalidation is push, evaluation is pull:
//!
//! 1. When an essential node changes, mark all its direct dependents as
//!    "maybe dirty"
//! 2. Propagate "maybe dirty" to their dependents, recursively
//! 3. Nothing is recomputed here. A maybe-dirty node recomputes on its next
//!    read, and only if a dependency's generation actually moved
//!
//! Declared edges are checked for cycles as they are added, so the declared
//! part of the graph is always a DAG. Edges discovered while computing are
//! not checked here; a cycle through them shows up as a re-entrant read.

use std::collections::{HashMap, HashSet, VecDeque};

use super::node::{Node, NodeKind, VarId};

/// The dependency graph over all state variables.
#[derive(Debug, Default)]
pub struct DependencyGraph {
    /// All nodes, indexed by `VarId`.
    nodes: Vec<Node>,
}

impl DependencyGraph {
    /// Create a new empty graph.
    pub fn new() -> Self {
        Self { nodes: Vec::new() }
    }

    /// Add a node to the graph.
    pub fn add_node(&mut self, kind: NodeKind) -> VarId {
        let id = VarId::from_index(self.nodes.len());
        self.nodes.push(Node::new(id, kind));
        id
    }

    pub fn get_node(&self, node_id: VarId) -> Option<&Node> {
        self.nodes.get(node_id.index())
    }

    pub fn get_node_mut(&mut self, node_id: VarId) -> Option<&mut Node> {
        self.nodes.get_mut(node_id.index())
    }

    /// Generation of a node, zero for unknown ids.
    pub fn generation(&self, node_id: VarId) -> u64 {
        self.get_node(node_id).map_or(0, Node::generation)
    }

    /// Whether adding the edge `dependency -> dependent` would close a cycle.
    pub fn would_cycle(&self, dependency: VarId, dependent: VarId) -> bool {
        dependency == dependent || self.reaches(dependent, dependency)
    }

    /// Whether `to` is downstream of `from`.
    pub fn reaches(&self, from: VarId, to: VarId) -> bool {
        let mut visited = HashSet::new();
        let mut stack = vec![from];
        while let Some(node_id) = stack.pop() {
            if node_id == to {
                return true;
            }
            if !visited.insert(node_id) {
                continue;
            }
            if let Some(node) = self.get_node(node_id) {
                stack.extend(node.dependents().iter().copied());
            }
        }
        false
    }

    /// Add a declared dependency edge: `dependent` reads `dependency`.
    ///
    /// Callers check [`would_cycle`](Self::would_cycle) first.
    pub fn add_edge(&mut self, dependency: VarId, dependent: VarId) {
        if let Some(dep_node) = self.get_node_mut(dependency) {
            dep_node.add_dependent(dependent);
        }
        if let Some(dependent_node) = self.get_node_mut(dependent) {
            dependent_node.add_dependency(dependency);
        }
    }

    /// Add an edge discovered during computation.
    pub fn add_dynamic_edge(&mut self, dependency: VarId, dependent: VarId) {
        let added = self
            .get_node_mut(dependent)
            .is_some_and(|node| node.add_dynamic_dependency(dependency));
        if added {
            if let Some(dep_node) = self.get_node_mut(dependency) {
                dep_node.add_dependent(dependent);
            }
        }
    }

    /// Forget the dynamic edges of a node before it recomputes.
    pub fn reset_dynamic_edges(&mut self, node_id: VarId) {
        let dropped = match self.get_node_mut(node_id) {
            Some(node) => node.take_dynamic_dependencies(),
            None => return,
        };
        for dependency in dropped {
            if let Some(dep_node) = self.get_node_mut(dependency) {
                dep_node.remove_dependent(node_id);
            }
        }
    }

    /// Mark a changed node's transitive dependents maybe-dirty.
    ///
    /// Returns the affected nodes, dependencies before dependents.
    pub fn mark_changed(&mut self, source_id: VarId) -> Vec<VarId> {
        let mut to_process = Vec::new();
        let mut visited = HashSet::new();
        let mut queue = VecDeque::new();

        if let Some(source) = self.get_node(source_id) {
            queue.extend(source.dependents().iter().copied());
        }

        // BFS to propagate maybe-dirty status
        while let Some(node_id) = queue.pop_front() {
            if !visited.insert(node_id) {
                continue;
            }

            if let Some(node) = self.get_node_mut(node_id) {
                node.mark_maybe_dirty();
                to_process.push(node_id);
                queue.extend(node.dependents().iter().copied());
            }
        }

        self.topological_sort(to_process)
    }

    /// Force a node to recompute and invalidate everything downstream.
    pub fn mark_dirty(&mut self, node_id: VarId) -> Vec<VarId> {
        if let Some(node) = self.get_node_mut(node_id) {
            node.mark_dirty();
        }
        self.mark_changed(node_id)
    }

    /// Perform a topological sort of the given nodes.
    ///
    /// Returns nodes in order such that dependencies come before dependents.
    /// Nodes on a cycle are left out.
    pub fn topological_sort(&self, nodes: Vec<VarId>) -> Vec<VarId> {
        let node_set: HashSet<_> = nodes.iter().copied().collect();
        let mut in_degree: HashMap<VarId, usize> = HashMap::new();
        let mut result = Vec::new();
        let mut queue = VecDeque::new();

        // Calculate in-degrees (only counting edges within the node set)
        for &node_id in &nodes {
            if let Some(node) = self.get_node(node_id) {
                let degree = node
                    .dependencies()
                    .iter()
                    .filter(|d| node_set.contains(d))
                    .count();
                in_degree.insert(node_id, degree);
                if degree == 0 {
                    queue.push_back(node_id);
                }
            }
        }

        // Kahn's algorithm
        while let Some(node_id) = queue.pop_front() {
            result.push(node_id);

            if let Some(node) = self.get_node(node_id) {
                for dependent_id in node.dependents() {
                    if let Some(degree) = in_degree.get_mut(dependent_id) {
                        *degree = degree.saturating_sub(1);
                        if *degree == 0 {
                            queue.push_back(*dependent_id);
                        }
                    }
                }
            }
        }

        result
    }

    /// Get the total number of nodes in the graph.
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }
}

//! Graph Nodes
//!
//! This module defines the node types that live in the dependency graph.
//! Each state variable owns exactly one node.

use indexmap::IndexSet;
use smallvec::SmallVec;

/// Arena index of a state variable (and of its graph node).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct VarId(u32);

impl VarId {
    /// Get the arena index.
    pub fn index(self) -> usize {
        self.0 as usize
    }

    pub(crate) fn from_index(index: usize) -> Self {
        Self(index as u32)
    }
}

impl From<u32> for VarId {
    fn from(id: u32) -> Self {
        Self(id)
    }
}

/// The kind of node in the dependency graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    /// An essential variable. Written directly, never computed.
    /// It has dependents but no dependencies.
    Essential,

    /// A computed variable. Caches the result of its definition.
    Computed,

    /// A display variable: a formatting view of another variable.
    Display,
}

/// Dirty state of a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DirtyState {
    /// The cached value is up-to-date.
    Clean,

    /// Something upstream was written. On the next read the node checks
    /// whether any dependency's generation actually moved.
    MaybeDirty,

    /// The node has never been computed, or must recompute unconditionally.
    Dirty,

    /// Evaluation hit a structural error. Reads keep failing.
    Broken,
}

/// A node in the dependency graph.
#[derive(Debug)]
pub struct Node {
    id: VarId,
    kind: NodeKind,
    dirty: DirtyState,

    /// Bumped whenever the node's value actually changes.
    generation: u64,

    /// Nodes this node reads, in declaration order. The first
    /// `static_count` are declared; the rest were read dynamically during
    /// the last computation.
    dependencies: SmallVec<[VarId; 4]>,
    static_count: usize,

    /// Generation of each dependency as seen by the last computation.
    observed: SmallVec<[u64; 4]>,

    /// Nodes that read this node.
    dependents: IndexSet<VarId>,

    /// Why the node broke, if it did.
    broken_reason: Option<String>,
}

impl Node {
    /// Create a new node with the given kind.
    pub fn new(id: VarId, kind: NodeKind) -> Self {
        Self {
            id,
            kind,
            dirty: match kind {
                NodeKind::Essential => DirtyState::Clean,
                NodeKind::Computed | NodeKind::Display => DirtyState::Dirty,
            },
            generation: 0,
            dependencies: SmallVec::new(),
            static_count: 0,
            observed: SmallVec::new(),
            dependents: IndexSet::new(),
            broken_reason: None,
        }
    }

    pub fn id(&self) -> VarId {
        self.id
    }

    pub fn kind(&self) -> NodeKind {
        self.kind
    }

    pub fn dirty_state(&self) -> DirtyState {
        self.dirty
    }

    pub fn is_clean(&self) -> bool {
        self.dirty == DirtyState::Clean
    }

    pub fn is_broken(&self) -> bool {
        self.dirty == DirtyState::Broken
    }

    pub fn broken_reason(&self) -> Option<&str> {
        self.broken_reason.as_deref()
    }

    pub fn mark_clean(&mut self) {
        if !self.is_broken() {
            self.dirty = DirtyState::Clean;
        }
    }

    /// Mark as maybe dirty (a dependency might have changed).
    pub fn mark_maybe_dirty(&mut self) {
        if self.dirty == DirtyState::Clean {
            self.dirty = DirtyState::MaybeDirty;
        }
    }

    /// Mark as definitely dirty.
    pub fn mark_dirty(&mut self) {
        if !self.is_broken() {
            self.dirty = DirtyState::Dirty;
        }
    }

    pub fn mark_broken(&mut self, reason: impl Into<String>) {
        self.dirty = DirtyState::Broken;
        self.broken_reason.get_or_insert_with(|| reason.into());
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub(crate) fn bump_generation(&mut self) {
        self.generation += 1;
    }

    /// Add a declared dependency. Declared dependencies precede dynamic ones.
    pub fn add_dependency(&mut self, node_id: VarId) {
        self.dependencies.insert(self.static_count, node_id);
        self.static_count += 1;
    }

    /// Add a dependency discovered while computing. Duplicates are ignored.
    pub fn add_dynamic_dependency(&mut self, node_id: VarId) -> bool {
        if self.dependencies.contains(&node_id) {
            return false;
        }
        self.dependencies.push(node_id);
        true
    }

    /// Drop dynamic dependencies, returning them.
    pub(crate) fn take_dynamic_dependencies(&mut self) -> SmallVec<[VarId; 4]> {
        self.dependencies.drain(self.static_count..).collect()
    }

    pub fn dependencies(&self) -> &[VarId] {
        &self.dependencies
    }

    pub fn static_dependencies(&self) -> &[VarId] {
        &self.dependencies[..self.static_count]
    }

    pub fn observed(&self) -> &[u64] {
        &self.observed
    }

    pub(crate) fn set_observed(&mut self, observed: SmallVec<[u64; 4]>) {
        self.observed = observed;
    }

    pub fn add_dependent(&mut self, node_id: VarId) {
        self.dependents.insert(node_id);
    }

    pub fn remove_dependent(&mut self, node_id: VarId) {
        self.dependents.shift_remove(&node_id);
    }

    pub fn dependents(&self) -> &IndexSet<VarId> {
        &self.dependents
    }
}

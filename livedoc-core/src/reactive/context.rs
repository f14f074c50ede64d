//! Evaluation Context
//!
//! The evaluation stack tracks which state variables are currently being
//! computed. A variable that is requested again while it is still on the
//! stack is a re-entrant read: its definition (directly or through other
//! variables) depends on its own value, which is a structural error rather
//! than something to recurse into.
//!
//! # Implementation
//!
//! The stack is owned by the [`Runtime`](super::Runtime) rather than kept in
//! thread-local storage. The engine is single threaded and every evaluation
//! goes through the runtime, so the owner is always at hand.

use crate::graph::VarId;

/// The "currently evaluating" marker.
#[derive(Debug, Default)]
pub struct EvalStack {
    frames: Vec<VarId>,
}

impl EvalStack {
    pub fn new() -> Self {
        Self { frames: Vec::new() }
    }

    /// Enter the computation of `id`.
    pub fn push(&mut self, id: VarId) {
        self.frames.push(id);
    }

    /// Leave the computation of `id`.
    pub fn pop(&mut self, id: VarId) {
        let popped = self.frames.pop();

        // Frames must be popped in the order they were pushed.
        debug_assert_eq!(
            popped,
            Some(id),
            "EvalStack mismatch: expected {:?}, got {:?}",
            id,
            popped
        );
    }

    /// Whether `id` is being computed right now.
    pub fn contains(&self, id: VarId) -> bool {
        self.frames.contains(&id)
    }

    /// The innermost computation, if any.
    pub fn current(&self) -> Option<VarId> {
        self.frames.last().copied()
    }

    pub fn depth(&self) -> usize {
        self.frames.len()
    }

    pub fn is_active(&self) -> bool {
        !self.frames.is_empty()
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

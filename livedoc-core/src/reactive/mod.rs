//! Reactive Store
//!
//! This module implements the state-variable store and its pull-based
//! evaluator.
//!
//! # Concepts
//!
//! ## State Variables
//!
//! A [`StateVar`] is a shared handle to one named slot of a component. Its
//! [`Definition`] says whether the slot is essential (stored, written
//! directly) or derived (computed from other slots).
//!
//! ## Lazy Evaluation
//!
//! Writes only invalidate. A derived variable runs its definition when it
//! is next read, and caches the result until one of its inputs changes.
//!
//! ## Dependency Tracking
//!
//! Dependencies are declared when a variable is created. A computed
//! definition may also read further variables through its [`Scope`]; those
//! reads are recorded as dynamic dependencies for the current computation.
//!
//! # Implementation Notes
//!
//! All state lives in one [`Runtime`]. There are no ambient globals: the
//! evaluation stack, the arena and the graph are fields of the runtime and
//! every operation is a method on it.

mod context;
mod definition;
mod runtime;
mod state_var;

pub use context::EvalStack;
pub use definition::{ComputeFn, Definition, InverseFn, InverseRequest, Scope};
pub use runtime::{Runtime, RuntimeStats, Tier, DOCUMENT};
pub use state_var::StateVar;

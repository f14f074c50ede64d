//! Livedoc Core
//!
//! This crate provides the state-variable engine behind interactive
//! structured documents. It implements:
//!
//! - A pull-based, memoized dependency graph of state variables
//! - Two-tier (live and committed) editable values with changed flags
//! - Inversion of committed edits back through bindings
//! - Aliased components sharing whole variable sets
//! - Declarative triggers with edge firing and chain-after sequencing
//!
//! # Architecture
//!
//! The crate is organized into several modules:
//!
//! - `value`: values, math expressions, parsing, rounding, solving
//! - `graph`: the dependency graph and invalidation
//! - `reactive`: state variables, definitions and the lazy evaluator
//! - `editable`, `binding`, `extend`, `display`: the layers on top
//! - `action`: triggers and the external-action executor
//! - `builder`: programmatic document construction
//!
//! Every mutating entry point on [`Runtime`] is one transaction: it applies
//! the change, settles triggers and returns a [`TransactionReport`].
//!
//! # Example
//!
//! ```rust,ignore
//! use livedoc_core::{DocumentBuilder, InputSpec, VarRef};
//!
//! let mut runtime = DocumentBuilder::new()
//!     .input("a", InputSpec::math().prefill("x+1"))
//!     .input("b", InputSpec::math().bind_to(VarRef::value("a")))
//!     .build()?;
//!
//! runtime.set_immediate_text("b", "x+12")?;
//! runtime.commit("b")?;
//! // a.value is now x+12
//! ```

pub mod action;
pub mod binding;
pub mod builder;
pub mod component;
pub mod config;
pub mod display;
pub mod editable;
pub mod error;
pub mod extend;
pub mod graph;
pub mod point;
pub mod reactive;
pub mod transaction;
pub mod value;

pub use action::{ActionCall, ActionExecutor, ActionStep, Firing, NewValue, RecordingExecutor};
pub use binding::Transform;
pub use builder::{Content, DerivedSpec, DocumentBuilder, InputSpec, PointSpec, TriggerSpec};
pub use component::{ComponentId, ComponentKind, VarRef};
pub use config::RuntimeConfig;
pub use editable::EditableView;
pub use error::{ActionError, EngineError, EngineResult, InversionError, ParseError};
pub use extend::ExtendOptions;
pub use reactive::{Runtime, Tier};
pub use transaction::{FiringReport, TransactionReport, UiEvent};
pub use value::{FormatOptions, Value, ValueKind};

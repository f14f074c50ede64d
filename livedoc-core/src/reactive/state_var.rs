//! State Variables
//!
//! A state variable is one named slot of a component. It holds the cached
//! value and the definition that produces it; dirtiness, generations and
//! edges live in the dependency graph under the same [`VarId`].
//!
//! # Sharing
//!
//! Components never own variable records directly. They hold [`StateVar`]
//! handles, and an alias holds clones of its source's handles. Two handles
//! refer to the same variable exactly when [`StateVar::ptr_eq`] says so;
//! equal values are not enough.

use std::fmt;
use std::sync::Arc;

use parking_lot::RwLock;

use super::definition::Definition;
use crate::component::ComponentId;
use crate::graph::VarId;
use crate::value::Value;

/// The record behind a [`StateVar`] handle.
pub(crate) struct VarRecord {
    id: VarId,
    owner: ComponentId,
    label: String,
    value: Value,
    definition: Definition,
    fixed: bool,
}

/// Shared handle to one state variable.
#[derive(Clone)]
pub struct StateVar {
    inner: Arc<RwLock<VarRecord>>,
}

impl StateVar {
    pub(crate) fn new(
        id: VarId,
        owner: ComponentId,
        label: String,
        definition: Definition,
    ) -> Self {
        let value = match &definition {
            Definition::Essential { default, .. } => default.clone(),
            _ => Value::Missing,
        };
        Self {
            inner: Arc::new(RwLock::new(VarRecord {
                id,
                owner,
                label,
                value,
                definition,
                fixed: false,
            })),
        }
    }

    /// Arena index of the variable.
    pub fn id(&self) -> VarId {
        self.inner.read().id
    }

    /// The component that declared the variable.
    pub fn owner(&self) -> ComponentId {
        self.inner.read().owner
    }

    /// `component.variable`, used in logs and errors.
    pub fn label(&self) -> String {
        self.inner.read().label.clone()
    }

    /// The cached value, which may be stale. Reads that need a current
    /// value go through [`Runtime::get_value`](crate::Runtime::get_value).
    pub fn cached(&self) -> Value {
        self.inner.read().value.clone()
    }

    pub(crate) fn store(&self, value: Value) {
        self.inner.write().value = value;
    }

    pub fn definition(&self) -> Definition {
        self.inner.read().definition.clone()
    }

    pub fn is_essential(&self) -> bool {
        matches!(self.inner.read().definition, Definition::Essential { .. })
    }

    /// A fixed variable never accepts a write through inversion.
    pub fn is_fixed(&self) -> bool {
        self.inner.read().fixed
    }

    pub(crate) fn set_fixed(&self, fixed: bool) {
        self.inner.write().fixed = fixed;
    }

    /// Whether both handles refer to the same variable.
    pub fn ptr_eq(&self, other: &StateVar) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl fmt::Debug for StateVar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let record = self.inner.read();
        f.debug_struct("StateVar")
            .field("id", &record.id)
            .field("label", &record.label)
            .field("value", &record.value)
            .field("definition", &record.definition)
            .finish()
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

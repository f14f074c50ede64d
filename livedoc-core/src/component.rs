//! Components
//!
//! A document is a tree of typed components. Each component owns a set of
//! named state variables; aliased components own the *same* variables, so a
//! component's variable map holds shared handles rather than records.

use std::fmt;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::error::{EngineError, EngineResult};
use crate::reactive::StateVar;
use crate::value::ValueKind;

/// Stable identity of a component.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ComponentId(u32);

impl ComponentId {
    pub fn index(self) -> usize {
        self.0 as usize
    }

    pub(crate) fn from_index(index: usize) -> Self {
        Self(index as u32)
    }
}

/// The closed set of component kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ComponentKind {
    Document,
    MathInput,
    NumberInput,
    TextInput,
    BooleanInput,
    Math,
    Number,
    Text,
    Boolean,
    Point,
    UpdateValue,
    CallAction,
    TriggerSet,
    Button,
}

/// What a component kind can do.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Capabilities {
    /// Owns essential variables with persisted defaults.
    pub essential_holder: bool,
    /// Owns variables computed from other variables.
    pub derived: bool,
    /// Its settled value may be bound to another variable.
    pub binding_target: bool,
    /// Fires action steps.
    pub trigger: bool,
    /// Exposes the two-tier immediate/settled protocol.
    pub editable: bool,
}

impl ComponentKind {
    pub fn capabilities(self) -> Capabilities {
        use ComponentKind::*;
        match self {
            Document => Capabilities::default(),
            MathInput | NumberInput | TextInput | BooleanInput => Capabilities {
                essential_holder: true,
                derived: true,
                binding_target: true,
                editable: true,
                ..Default::default()
            },
            Math | Number | Text | Boolean | Point => Capabilities {
                essential_holder: true,
                derived: true,
                ..Default::default()
            },
            UpdateValue | CallAction | TriggerSet | Button => Capabilities {
                trigger: true,
                ..Default::default()
            },
        }
    }

    /// The type of the component's `value`, for kinds that have one.
    pub fn value_kind(self) -> Option<ValueKind> {
        use ComponentKind::*;
        match self {
            MathInput | Math => Some(ValueKind::Math),
            NumberInput | Number | Point => Some(ValueKind::Number),
            TextInput | Text => Some(ValueKind::Text),
            BooleanInput | Boolean => Some(ValueKind::Boolean),
            Document | UpdateValue | CallAction | TriggerSet | Button => None,
        }
    }

    pub fn is_editable(self) -> bool {
        self.capabilities().editable
    }

    pub fn is_trigger(self) -> bool {
        self.capabilities().trigger
    }
}

/// Address of a state variable: component name plus variable name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct VarRef {
    pub component: String,
    pub variable: String,
}

impl VarRef {
    pub fn new(component: impl Into<String>, variable: impl Into<String>) -> Self {
        Self {
            component: component.into(),
            variable: variable.into(),
        }
    }

    /// The settled `value` of a component.
    pub fn value(component: impl Into<String>) -> Self {
        Self::new(component, "value")
    }

    /// Parse `component.variable`. A bare name addresses `value`.
    pub fn parse(text: &str) -> Self {
        match text.split_once('.') {
            Some((component, variable)) => Self::new(component.trim(), variable.trim()),
            None => Self::value(text.trim()),
        }
    }
}

impl fmt::Display for VarRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.component, self.variable)
    }
}

/// A node of the document tree.
#[derive(Debug, Clone)]
pub struct Component {
    id: ComponentId,
    name: String,
    kind: ComponentKind,
    parent: Option<ComponentId>,
    children: Vec<ComponentId>,
    vars: IndexMap<String, StateVar>,
    fixed: bool,
    extends: Option<ComponentId>,
}

impl Component {
    pub(crate) fn new(id: ComponentId, name: impl Into<String>, kind: ComponentKind) -> Self {
        Self {
            id,
            name: name.into(),
            kind,
            parent: None,
            children: Vec::new(),
            vars: IndexMap::new(),
            fixed: false,
            extends: None,
        }
    }

    pub fn id(&self) -> ComponentId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> ComponentKind {
        self.kind
    }

    pub fn parent(&self) -> Option<ComponentId> {
        self.parent
    }

    pub fn children(&self) -> &[ComponentId] {
        &self.children
    }

    pub(crate) fn set_parent(&mut self, parent: ComponentId) {
        self.parent = Some(parent);
    }

    pub(crate) fn add_child(&mut self, child: ComponentId) {
        self.children.push(child);
    }

    pub(crate) fn remove_child(&mut self, child: ComponentId) {
        self.children.retain(|c| *c != child);
    }

    /// A fixed component rejects every write that arrives through inversion.
    pub fn is_fixed(&self) -> bool {
        self.fixed
    }

    pub(crate) fn set_fixed(&mut self, fixed: bool) {
        self.fixed = fixed;
    }

    /// The component this one is an alias of.
    pub fn extends(&self) -> Option<ComponentId> {
        self.extends
    }

    pub(crate) fn set_extends(&mut self, source: ComponentId) {
        self.extends = Some(source);
    }

    pub fn var(&self, name: &str) -> Option<&StateVar> {
        self.vars.get(name)
    }

    /// Look up a variable, failing with the component's name in the error.
    pub fn require_var(&self, name: &str) -> EngineResult<&StateVar> {
        self.vars.get(name).ok_or_else(|| EngineError::UnknownVariable {
            component: self.name.clone(),
            variable: name.to_string(),
        })
    }

    pub fn vars(&self) -> &IndexMap<String, StateVar> {
        &self.vars
    }

    pub(crate) fn insert_var(&mut self, name: impl Into<String>, var: StateVar) {
        self.vars.insert(name.into(), var);
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

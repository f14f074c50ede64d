//! Actions & Triggers
//!
//! Trigger components fire ordered lists of steps. A step either writes a
//! new value into a state variable, calls an external action, or fires
//! another trigger.
//!
//! # Firing
//!
//! A trigger fires when
//!
//! - it is invoked directly (a click),
//! - its predicate goes from false to true, or
//! - a trigger it follows has finished all of its steps.
//!
//! A trigger placed inside a group gives up its own firing configuration;
//! only the group decides when its members run.

mod executor;
mod trigger;

pub use executor::{ActionExecutor, RecordingExecutor};
pub use trigger::{Trigger, TriggerState, TriggerTable};

use std::fmt;
use std::sync::Arc;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::component::{ComponentId, VarRef};
use crate::value::{Expr, Value};

/// An opaque call into the external-action collaborator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionCall {
    /// Name of the component the action is aimed at.
    pub target: String,
    pub action: String,
    #[serde(default)]
    pub args: Vec<Value>,
}

impl ActionCall {
    pub fn new(target: impl Into<String>, action: impl Into<String>) -> Self {
        Self {
            target: target.into(),
            action: action.into(),
            args: Vec::new(),
        }
    }

    pub fn arg(mut self, value: impl Into<Value>) -> Self {
        self.args.push(value.into());
        self
    }
}

impl fmt::Display for ActionCall {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.target, self.action)
    }
}

/// When a trigger fires on its own.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum Firing {
    /// Only when invoked.
    #[default]
    Manual,
    /// On each false-to-true transition of a boolean variable.
    When(VarRef),
    /// After any of these triggers completes.
    After(Vec<ComponentId>),
}

/// Function form of a new value: current values of `reads` in, value out.
pub type NewValueFn = Arc<dyn Fn(&[Value]) -> Value + Send + Sync>;

/// How an update step computes the value it writes.
#[derive(Clone)]
pub enum NewValue {
    Literal(Value),
    /// Math over named variables, evaluated when the step runs.
    Expression {
        expr: Expr,
        inputs: IndexMap<String, VarRef>,
    },
    Function {
        reads: Vec<VarRef>,
        compute: NewValueFn,
    },
}

impl NewValue {
    pub fn literal(value: impl Into<Value>) -> Self {
        NewValue::Literal(value.into())
    }

    pub fn expression(expr: Expr) -> Self {
        NewValue::Expression {
            expr,
            inputs: IndexMap::new(),
        }
    }

    /// Add an input to an expression. Other forms are returned unchanged.
    pub fn input(mut self, symbol: impl Into<String>, var: VarRef) -> Self {
        if let NewValue::Expression { inputs, .. } = &mut self {
            inputs.insert(symbol.into(), var);
        }
        self
    }

    pub fn function<F>(reads: Vec<VarRef>, compute: F) -> Self
    where
        F: Fn(&[Value]) -> Value + Send + Sync + 'static,
    {
        NewValue::Function {
            reads,
            compute: Arc::new(compute),
        }
    }

    /// Variables the value is computed from.
    pub fn references(&self) -> Vec<&VarRef> {
        match self {
            NewValue::Literal(_) => Vec::new(),
            NewValue::Expression { inputs, .. } => inputs.values().collect(),
            NewValue::Function { reads, .. } => reads.iter().collect(),
        }
    }
}

impl fmt::Debug for NewValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NewValue::Literal(value) => f.debug_tuple("Literal").field(value).finish(),
            NewValue::Expression { expr, inputs } => f
                .debug_struct("Expression")
                .field("expr", &expr.to_string())
                .field("inputs", inputs)
                .finish(),
            NewValue::Function { reads, .. } => {
                f.debug_struct("Function").field("reads", reads).finish()
            }
        }
    }
}

/// One step of a trigger.
#[derive(Debug, Clone)]
pub enum ActionStep {
    UpdateValue { target: VarRef, new_value: NewValue },
    External(ActionCall),
    Fire(ComponentId),
}

//! Definitions
//!
//! A definition says where a state variable's value comes from.
//!
//! # Kinds
//!
//! - **Essential**: the value is stored, never computed. It starts at a
//!   persisted default and changes only through writes.
//! - **Computed**: a pure function of declared dependencies, plus any
//!   variables the function reads through its [`Scope`] while running.
//!   Optionally carries an inverse that maps a requested value back onto
//!   the dependencies.
//! - **Expression**: a math expression over named inputs. Inverted by
//!   solving for the single input that may change.
//! - **Display**: a rounded view of another variable, formatted with the
//!   display options in effect for a component.
//!
//! Computed functions run lazily, at most once per invalidation, and their
//! results are cached until a dependency's generation moves.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use indexmap::{IndexMap, IndexSet};

use super::runtime::Runtime;
use crate::component::{ComponentId, VarRef};
use crate::config::RuntimeConfig;
use crate::error::{EngineResult, InversionError};
use crate::graph::{NodeKind, VarId};
use crate::value::{Expr, Value, ValueKind};

/// Forward function of a computed variable.
pub type ComputeFn = Arc<dyn Fn(&mut Scope<'_>) -> EngineResult<Value> + Send + Sync>;

/// Inverse function of a computed variable.
///
/// Returns the values to request for some of the declared dependencies,
/// by position.
pub type InverseFn =
    Arc<dyn Fn(&InverseRequest<'_>) -> Result<Vec<(usize, Value)>, InversionError> + Send + Sync>;

/// What an inverse function gets to work with.
#[derive(Debug)]
pub struct InverseRequest<'a> {
    /// The value the variable is asked to take.
    pub desired: &'a Value,
    /// Current values of the declared dependencies.
    pub deps: &'a [Value],
    /// Current generations of the declared dependencies.
    pub generations: &'a [u64],
}

#[derive(Clone)]
pub enum Definition {
    Essential {
        kind: ValueKind,
        default: Value,
    },
    Computed {
        deps: Vec<VarId>,
        compute: ComputeFn,
        inverse: Option<InverseFn>,
    },
    Expression {
        expr: Expr,
        /// Symbol name to the variable substituted for it.
        inputs: IndexMap<String, VarId>,
        /// Inputs held constant when inverting.
        held: IndexSet<String>,
        kind: ValueKind,
    },
    Display {
        source: VarId,
        /// Whose display options apply.
        component: ComponentId,
    },
}

impl Definition {
    pub fn essential(kind: ValueKind, default: Value) -> Self {
        Definition::Essential {
            default: kind.coerce(default),
            kind,
        }
    }

    pub fn computed<F>(deps: Vec<VarId>, compute: F) -> Self
    where
        F: Fn(&mut Scope<'_>) -> EngineResult<Value> + Send + Sync + 'static,
    {
        Definition::Computed {
            deps,
            compute: Arc::new(compute),
            inverse: None,
        }
    }

    /// Attach an inverse to a computed definition. Other kinds are
    /// returned unchanged.
    pub fn with_inverse<F>(self, inverse: F) -> Self
    where
        F: Fn(&InverseRequest<'_>) -> Result<Vec<(usize, Value)>, InversionError>
            + Send
            + Sync
            + 'static,
    {
        match self {
            Definition::Computed { deps, compute, .. } => Definition::Computed {
                deps,
                compute,
                inverse: Some(Arc::new(inverse)),
            },
            other => other,
        }
    }

    pub fn node_kind(&self) -> NodeKind {
        match self {
            Definition::Essential { .. } => NodeKind::Essential,
            Definition::Computed { .. } | Definition::Expression { .. } => NodeKind::Computed,
            Definition::Display { .. } => NodeKind::Display,
        }
    }

    /// Declared dependencies, in the order the definition sees them.
    pub fn dependencies(&self) -> Vec<VarId> {
        match self {
            Definition::Essential { .. } => Vec::new(),
            Definition::Computed { deps, .. } => deps.clone(),
            Definition::Expression { inputs, .. } => inputs.values().copied().collect(),
            Definition::Display { source, .. } => vec![*source],
        }
    }

    /// Copy of the definition with dependencies renamed through `map`.
    /// Display definitions are moved to `component`.
    pub(crate) fn remap(&self, map: &HashMap<VarId, VarId>, component: ComponentId) -> Self {
        let rename = |id: &VarId| map.get(id).copied().unwrap_or(*id);
        match self {
            Definition::Essential { .. } => self.clone(),
            Definition::Computed {
                deps,
                compute,
                inverse,
            } => Definition::Computed {
                deps: deps.iter().map(rename).collect(),
                compute: Arc::clone(compute),
                inverse: inverse.clone(),
            },
            Definition::Expression {
                expr,
                inputs,
                held,
                kind,
            } => Definition::Expression {
                expr: expr.clone(),
                inputs: inputs
                    .iter()
                    .map(|(symbol, id)| (symbol.clone(), rename(id)))
                    .collect(),
                held: held.clone(),
                kind: *kind,
            },
            Definition::Display { source, .. } => Definition::Display {
                source: rename(source),
                component,
            },
        }
    }
}

impl fmt::Debug for Definition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Definition::Essential { kind, default } => f
                .debug_struct("Essential")
                .field("kind", kind)
                .field("default", default)
                .finish(),
            Definition::Computed { deps, inverse, .. } => f
                .debug_struct("Computed")
                .field("deps", deps)
                .field("invertible", &inverse.is_some())
                .finish(),
            Definition::Expression {
                expr, inputs, held, ..
            } => f
                .debug_struct("Expression")
                .field("expr", &expr.to_string())
                .field("inputs", inputs)
                .field("held", held)
                .finish(),
            Definition::Display { source, component } => f
                .debug_struct("Display")
                .field("source", source)
                .field("component", component)
                .finish(),
        }
    }
}

static MISSING: Value = Value::Missing;

/// The view a computed function gets of the world while it runs.
///
/// Declared dependencies are resolved before the function is called.
/// Anything else it reads goes through [`Scope::read`], which records a
/// dynamic dependency so the variable is invalidated when that input
/// changes too.
pub struct Scope<'a> {
    runtime: &'a mut Runtime,
    current: VarId,
    deps: &'a [Value],
    generations: &'a [u64],
}

impl<'a> Scope<'a> {
    pub(crate) fn new(
        runtime: &'a mut Runtime,
        current: VarId,
        deps: &'a [Value],
        generations: &'a [u64],
    ) -> Self {
        Self {
            runtime,
            current,
            deps,
            generations,
        }
    }

    /// The variable being computed.
    pub fn current(&self) -> VarId {
        self.current
    }

    /// Value of the declared dependency at `index`, `Missing` if there is none.
    pub fn dep(&self, index: usize) -> &Value {
        self.deps.get(index).unwrap_or(&MISSING)
    }

    pub fn deps(&self) -> &[Value] {
        self.deps
    }

    /// Generation of the declared dependency at `index`.
    pub fn generation(&self, index: usize) -> u64 {
        self.generations.get(index).copied().unwrap_or(0)
    }

    /// Read another variable and depend on it from now on.
    pub fn read(&mut self, id: VarId) -> EngineResult<Value> {
        let value = self.runtime.resolve(id)?;
        self.runtime.graph.add_dynamic_edge(id, self.current);
        Ok(value)
    }

    /// [`read`](Self::read) by name.
    pub fn read_ref(&mut self, var: &VarRef) -> EngineResult<Value> {
        let id = self.runtime.lookup(var)?.id();
        self.read(id)
    }

    pub fn config(&self) -> &RuntimeConfig {
        self.runtime.config()
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dependencies_by_kind() {
        let a = VarId::from(1);
        let b = VarId::from(2);

        let mut inputs = IndexMap::new();
        inputs.insert("a".to_string(), a);
        inputs.insert("b".to_string(), b);
        let expr = Definition::Expression {
            expr: Expr::add(Expr::sym("a"), Expr::sym("b")),
            inputs,
            held: IndexSet::new(),
            kind: ValueKind::Number,
        };
        assert_eq!(expr.dependencies(), vec![a, b]);
        assert_eq!(expr.node_kind(), NodeKind::Computed);

        let essential = Definition::essential(ValueKind::Number, Value::from(2.0));
        assert!(essential.dependencies().is_empty());
        assert_eq!(essential.node_kind(), NodeKind::Essential);
    }

    #[test]
    fn remap_renames_dependencies() {
        let old = VarId::from(1);
        let new = VarId::from(7);
        let map = HashMap::from([(old, new)]);

        let computed = Definition::computed(vec![old, VarId::from(2)], |scope| {
            Ok(scope.dep(0).clone())
        });
        assert_eq!(
            computed.remap(&map, ComponentId::from_index(0)).dependencies(),
            vec![new, VarId::from(2)]
        );

        let display = Definition::Display {
            source: old,
            component: ComponentId::from_index(0),
        };
        match display.remap(&map, ComponentId::from_index(3)) {
            Definition::Display { source, component } => {
                assert_eq!(source, new);
                assert_eq!(component, ComponentId::from_index(3));
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn with_inverse_only_applies_to_computed() {
        let computed = Definition::computed(vec![], |_| Ok(Value::Missing))
            .with_inverse(|request| Ok(vec![(0, request.desired.clone())]));
        assert!(matches!(
            computed,
            Definition::Computed {
                inverse: Some(_),
                ..
            }
        ));

        let essential = Definition::essential(ValueKind::Text, Value::text("x"))
            .with_inverse(|_| Ok(vec![]));
        assert!(matches!(essential, Definition::Essential { .. }));
    }
}

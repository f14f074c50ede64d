//! Binding & Inversion
//!
//! A bound variable computes its settled value from another variable
//! through a [`Transform`]. Committing a new value to it asks the engine to
//! push that value back upstream.
//!
//! # Planning
//!
//! Requests are planned before anything is written. Starting from the
//! requested variable, the planner walks definitions backwards:
//!
//! - essential variables take the value (two different values requested for
//!   the same slot is a conflict)
//! - computed variables with an inverse hand the request on to their
//!   dependencies
//! - expression variables solve for their single modifiable input
//! - fixed variables, and variables with no inverse, refuse
//!
//! Either the whole [`UpdatePlan`] is applied or nothing is. A refused plan
//! leaves every variable untouched, so the dependent snaps back to the
//! forward value of its unchanged source.

use indexmap::{IndexMap, IndexSet};
use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use crate::error::{EngineError, EngineResult, InversionError};
use crate::graph::VarId;
use crate::reactive::{Definition, InverseRequest, Runtime};
use crate::value::{solve_for, Expr, Value, ValueKind};

/// How a bound variable derives its value from its source.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum Transform {
    /// The source value itself.
    #[default]
    Identity,
    /// `expr` with the source value substituted for `symbol`.
    Expression { expr: Expr, symbol: String },
}

impl Transform {
    pub fn expression(expr: Expr, symbol: impl Into<String>) -> Self {
        Transform::Expression {
            expr,
            symbol: symbol.into(),
        }
    }

    pub fn forward(&self, source: &Value, kind: ValueKind) -> Value {
        match self {
            Transform::Identity => kind.coerce(source.clone()),
            Transform::Expression { expr, symbol } => match source.to_expr() {
                Some(value) => {
                    let replacements = IndexMap::from([(symbol.clone(), value)]);
                    kind.coerce(Value::Math(expr.substitute(&replacements).simplify()))
                }
                None => kind.coerce(source.clone()),
            },
        }
    }

    /// The source value that makes [`forward`](Self::forward) produce `desired`.
    pub fn inverse(&self, desired: &Value) -> Result<Value, InversionError> {
        match self {
            Transform::Identity => Ok(desired.clone()),
            Transform::Expression { expr, symbol } => {
                let target = desired.to_expr().ok_or_else(|| {
                    InversionError::Unsolvable(format!("{} is not a math value", desired))
                })?;
                Ok(Value::Math(solve_for(expr, symbol, target)?))
            }
        }
    }
}

/// Definition of a variable bound to `source` through `transform`.
pub fn bound_definition(source: VarId, transform: Transform, kind: ValueKind) -> Definition {
    let forward = transform.clone();
    Definition::computed(vec![source], move |scope| {
        Ok(forward.forward(scope.dep(0), kind))
    })
    .with_inverse(move |request| Ok(vec![(0, transform.inverse(request.desired)?)]))
}

/// Forward evaluation of an expression definition.
///
/// An input without a math view (missing, unparseable, plain text) makes
/// the whole result missing.
pub(crate) fn evaluate_expression(
    expr: &Expr,
    inputs: &IndexMap<String, VarId>,
    values: &[Value],
    kind: ValueKind,
) -> Value {
    let mut replacements = IndexMap::with_capacity(inputs.len());
    for (symbol, value) in inputs.keys().zip(values) {
        match value.to_expr() {
            Some(e) => {
                replacements.insert(symbol.clone(), e);
            }
            None => return Value::Missing,
        }
    }
    kind.coerce(Value::Math(expr.substitute(&replacements).simplify()))
}

/// The essential writes that realize a requested value.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UpdatePlan {
    writes: IndexMap<VarId, Value>,
    path: IndexSet<VarId>,
}

impl UpdatePlan {
    /// Essential variables to write, in the order they were reached.
    pub fn writes(&self) -> &IndexMap<VarId, Value> {
        &self.writes
    }

    /// Every variable the request passed through, the requested one first.
    pub fn path(&self) -> &IndexSet<VarId> {
        &self.path
    }

    pub fn contains(&self, id: VarId) -> bool {
        self.path.contains(&id)
    }

    pub fn is_empty(&self) -> bool {
        self.writes.is_empty()
    }
}

impl Runtime {
    /// Plan the writes that would make `id` take `desired`.
    pub(crate) fn plan_update(
        &mut self,
        id: VarId,
        desired: Value,
    ) -> Result<UpdatePlan, InversionError> {
        let mut plan = UpdatePlan::default();
        self.plan_into(id, desired, &mut plan, 0)?;
        debug!(
            variable = %self.var(id).label(),
            writes = plan.writes.len(),
            path = plan.path.len(),
            "planned update"
        );
        Ok(plan)
    }

    fn plan_into(
        &mut self,
        id: VarId,
        desired: Value,
        plan: &mut UpdatePlan,
        depth: usize,
    ) -> Result<(), InversionError> {
        let var = self.var(id).clone();
        let label = var.label();
        if depth >= self.config.max_eval_depth {
            return Err(EngineError::DepthExceeded {
                variable: label,
                limit: self.config.max_eval_depth,
            }
            .into());
        }
        if self.is_fixed(&var) {
            return Err(InversionError::Fixed(label));
        }
        plan.path.insert(id);
        trace!(variable = %label, desired = %desired, "planning");

        match var.definition() {
            Definition::Essential { kind, .. } => {
                let value = kind.coerce(desired);
                match plan.writes.get(&id) {
                    Some(existing) if *existing != value => Err(InversionError::Conflict(label)),
                    Some(_) => Ok(()),
                    None => {
                        plan.writes.insert(id, value);
                        Ok(())
                    }
                }
            }
            Definition::Computed {
                deps,
                inverse: Some(inverse),
                ..
            } => {
                let mut values = Vec::with_capacity(deps.len());
                for dep in &deps {
                    values.push(self.resolve(*dep)?);
                }
                let generations: Vec<u64> =
                    deps.iter().map(|dep| self.graph.generation(*dep)).collect();
                let requests = inverse(&InverseRequest {
                    desired: &desired,
                    deps: &values,
                    generations: &generations,
                })?;
                for (index, value) in requests {
                    let dep = deps
                        .get(index)
                        .copied()
                        .ok_or_else(|| InversionError::NoInverse(label.clone()))?;
                    self.plan_into(dep, value, plan, depth + 1)?;
                }
                Ok(())
            }
            Definition::Computed { inverse: None, .. } | Definition::Display { .. } => {
                Err(InversionError::NoInverse(label))
            }
            Definition::Expression {
                expr,
                inputs,
                held,
                ..
            } => {
                let (input, solution) = self.solve_expression(&label, &expr, &inputs, &held, &desired)?;
                self.plan_into(input, Value::Math(solution), plan, depth + 1)
            }
        }
    }

    /// Solve an expression definition for its single modifiable input.
    fn solve_expression(
        &mut self,
        label: &str,
        expr: &Expr,
        inputs: &IndexMap<String, VarId>,
        held: &IndexSet<String>,
        desired: &Value,
    ) -> Result<(VarId, Expr), InversionError> {
        if inputs.is_empty() {
            return Err(InversionError::NoInverse(label.to_string()));
        }

        let mut values = Vec::with_capacity(inputs.len());
        for id in inputs.values() {
            values.push(self.resolve(*id)?);
        }

        let free: Vec<(&String, VarId)> = inputs
            .iter()
            .filter(|(symbol, id)| !held.contains(*symbol) && !self.is_fixed(self.var(**id)))
            .map(|(symbol, id)| (symbol, *id))
            .collect();
        let (symbol, input) = match free.as_slice() {
            [single] => *single,
            [] => return Err(InversionError::Fixed(label.to_string())),
            _ => {
                return Err(InversionError::Underdetermined {
                    variable: label.to_string(),
                    free: free.len(),
                })
            }
        };

        let mut replacements = IndexMap::new();
        for ((name, _), value) in inputs.iter().zip(&values) {
            if name == symbol {
                continue;
            }
            let e = value.to_expr().ok_or_else(|| {
                InversionError::Unsolvable(format!("{} has no math value", name))
            })?;
            replacements.insert(name.clone(), e);
        }

        let target = desired.to_expr().ok_or_else(|| {
            InversionError::Unsolvable(format!("{} is not a math value", desired))
        })?;
        let solution = solve_for(&expr.substitute(&replacements), symbol, target)?;
        Ok((input, solution))
    }

    /// Write every essential value of a plan.
    pub(crate) fn apply_plan(&mut self, plan: &UpdatePlan) -> EngineResult<()> {
        for (id, value) in &plan.writes {
            self.write_essential(*id, value.clone())?;
        }
        Ok(())
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

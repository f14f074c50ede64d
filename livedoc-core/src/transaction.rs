//! Transactions
//!
//! One user-originated change is one transaction: the change is applied,
//! then triggers are settled to quiescence before the call returns. Nothing
//! interleaves; the runtime is `&mut` for the whole of it.

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::action::ActionCall;
use crate::component::{ComponentKind, VarRef};
use crate::editable::VALUE;
use crate::error::{EngineError, EngineResult, InversionError};
use crate::reactive::{Runtime, Tier};
use crate::value::Value;

/// What the trigger subsystem did during one transaction.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FiringReport {
    /// Triggers that fired, in firing order.
    pub fired: Vec<String>,
    /// Triggers asked to fire while already firing.
    pub skipped: Vec<String>,
    pub external_calls: Vec<ActionCall>,
    pub failed_actions: Vec<String>,
    /// Update steps whose target refused the new value.
    pub rejected_updates: Vec<String>,
}

/// Outcome of one transaction.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionReport {
    pub firing: FiringReport,
    /// Variables that refused a requested value.
    pub rejected: Vec<String>,
    /// The edit was discarded and the live value snapped back.
    pub reverted: bool,
}

/// Discrete events the rendering layer sends in.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum UiEvent {
    SetImmediate { component: String, text: String },
    Commit { component: String },
    Click { component: String },
    Drag { component: String, dx: f64, dy: f64 },
}

impl Runtime {
    pub(crate) fn transaction<F>(&mut self, name: &str, apply: F) -> EngineResult<TransactionReport>
    where
        F: FnOnce(&mut Runtime, &mut TransactionReport) -> EngineResult<()>,
    {
        debug!(transaction = name, "begin");
        let mut report = TransactionReport::default();
        apply(self, &mut report)?;
        self.settle_triggers(&mut report.firing)?;
        debug!(
            transaction = name,
            fired = report.firing.fired.len(),
            reverted = report.reverted,
            "end"
        );
        Ok(report)
    }

    /// Apply one UI event.
    pub fn dispatch(&mut self, event: UiEvent) -> EngineResult<TransactionReport> {
        match event {
            UiEvent::SetImmediate { component, text } => self.set_immediate_text(&component, &text),
            UiEvent::Commit { component } => self.commit(&component),
            UiEvent::Click { component } => self.click(&component),
            UiEvent::Drag { component, dx, dy } => self.drag(&component, dx, dy),
        }
    }

    /// A click fires a trigger or toggles a boolean input.
    pub fn click(&mut self, component: &str) -> EngineResult<TransactionReport> {
        let id = self.component_id(component)?;
        let kind = self.component_by_id(id).kind();
        if kind.is_trigger() {
            return self.fire(component);
        }
        if kind != ComponentKind::BooleanInput {
            return Err(EngineError::NotTrigger(component.to_string()));
        }
        self.transaction("toggle", |rt, report| {
            let value = rt.component_by_id(id).require_var(VALUE)?.id();
            let current = rt.resolve(value)?;
            rt.write_immediate(id, Value::Bool(!current.as_bool()), None, report)?;
            rt.commit_editable(id, report)
        })
    }

    /// Write a variable directly, as one transaction.
    ///
    /// `Tier::Immediate` goes to the live tier of the variable's editable
    /// component. `Tier::Settled` stores into an essential variable, or
    /// routes the value through inversion when the variable is computed.
    pub fn set_essential(
        &mut self,
        var: &VarRef,
        value: Value,
        tier: Tier,
    ) -> EngineResult<TransactionReport> {
        let handle = self.lookup(var)?;
        match tier {
            Tier::Immediate => {
                let id = self.component_id(&var.component)?;
                self.transaction("set_immediate", |rt, report| {
                    rt.write_immediate(id, value, None, report)
                })
            }
            Tier::Settled if handle.is_essential() => self.transaction("set_essential", |rt, _| {
                rt.write_essential(handle.id(), value).map(|_| ())
            }),
            Tier::Settled => self.transaction("set_essential", |rt, report| {
                match rt.plan_update(handle.id(), value) {
                    Ok(plan) => rt.apply_plan(&plan),
                    Err(InversionError::Structural(err)) => Err(err),
                    Err(InversionError::NoInverse(_)) => {
                        Err(EngineError::NotEssential(handle.label()))
                    }
                    Err(err) => {
                        warn!(variable = %var, error = %err, "write reverted");
                        report.rejected.push(handle.label());
                        report.reverted = true;
                        Ok(())
                    }
                }
            }),
        }
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

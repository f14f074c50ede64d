//! Two-Tier Editable Values
//!
//! An editable component keeps two values for what the user is editing:
//!
//! - `immediateValue`, the live value, rewritten on every keystroke
//! - `value`, the settled value, rewritten only by a commit or by an
//!   upstream change pushed through a binding
//!
//! Each tier has its own changed flag (`immediateValueChanged`,
//! `valueChanged`). `valueForDisplay` is the rounded view of the settled
//! value, and `rawText` is the text to show in the input box.
//!
//! # Implementation
//!
//! The typed value is stored in an internal essential slot together with a
//! basis: the generation of `value` at the time of typing. `immediateValue`
//! shows the typed value only while `value` still has that generation. Once
//! the settled value moves (a commit, or a forced overwrite from upstream)
//! the live tier falls back to it on the next read without anyone having to
//! reset it.

use serde::Serialize;
use tracing::debug;

use crate::component::{Component, ComponentId};
use crate::error::{EngineError, EngineResult, InversionError};
use crate::graph::VarId;
use crate::reactive::{Definition, Runtime};
use crate::transaction::TransactionReport;
use crate::value::{serialize, ResolvedFormat, Value, ValueKind};

pub const VALUE: &str = "value";
pub const IMMEDIATE_VALUE: &str = "immediateValue";
pub const VALUE_CHANGED: &str = "valueChanged";
pub const IMMEDIATE_VALUE_CHANGED: &str = "immediateValueChanged";
pub const VALUE_FOR_DISPLAY: &str = "valueForDisplay";
pub const RAW_TEXT: &str = "rawText";

pub(crate) const TYPED_VALUE: &str = "__typedValue";
pub(crate) const TYPED_BASIS: &str = "__typedBasis";
pub(crate) const TYPED_TEXT: &str = "__typedText";

/// Basis meaning "nothing typed since the last commit".
const NO_BASIS: f64 = -1.0;

/// Per-instance slots that aliases with their own settled value must not share.
pub(crate) const TIER_STATE: [&str; 5] = [
    TYPED_VALUE,
    TYPED_BASIS,
    TYPED_TEXT,
    VALUE_CHANGED,
    IMMEDIATE_VALUE_CHANGED,
];

/// What the rendering layer needs to draw one editable component.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EditableView {
    pub immediate: Value,
    pub settled: Value,
    pub value_for_display: Value,
    /// `valueForDisplay` as text.
    pub display_text: String,
    pub raw_text: String,
    pub value_changed: bool,
    pub immediate_value_changed: bool,
}

/// Variable ids of one editable component.
#[derive(Debug, Clone, Copy)]
struct EditableVars {
    kind: ValueKind,
    value: VarId,
    immediate: VarId,
    typed_text: VarId,
    basis: VarId,
    value_changed: VarId,
    immediate_changed: VarId,
}

impl EditableVars {
    fn of(component: &Component) -> EngineResult<Self> {
        let kind = component
            .kind()
            .value_kind()
            .filter(|_| component.kind().is_editable())
            .ok_or_else(|| EngineError::NotEditable(component.name().to_string()))?;
        Ok(Self {
            kind,
            value: component.require_var(VALUE)?.id(),
            immediate: component.require_var(IMMEDIATE_VALUE)?.id(),
            typed_text: component.require_var(TYPED_TEXT)?.id(),
            basis: component.require_var(TYPED_BASIS)?.id(),
            value_changed: component.require_var(VALUE_CHANGED)?.id(),
            immediate_changed: component.require_var(IMMEDIATE_VALUE_CHANGED)?.id(),
        })
    }
}

fn immediate_definition(value: VarId, typed: VarId, basis: VarId) -> Definition {
    Definition::computed(vec![value, typed, basis], |scope| {
        let live = scope.dep(2).as_number() == Some(scope.generation(0) as f64);
        Ok(if live {
            scope.dep(1).clone()
        } else {
            scope.dep(0).clone()
        })
    })
    .with_inverse(|request| {
        let basis = request.generations.first().copied().unwrap_or(0);
        Ok(vec![
            (1, request.desired.clone()),
            (2, Value::Number(basis as f64)),
        ])
    })
}

fn raw_text_definition(kind: ValueKind, immediate: VarId, typed_text: VarId) -> Definition {
    Definition::computed(vec![immediate, typed_text], move |scope| {
        let live = scope.dep(0);
        if let Value::Text(text) = scope.dep(1) {
            if kind.parse(text) == *live {
                return Ok(Value::Text(text.clone()));
            }
        }
        Ok(Value::Text(serialize(live, &ResolvedFormat::exact())))
    })
}

impl Runtime {
    /// Create the editable variable set of a component around `settled`,
    /// the definition of its `value`.
    pub(crate) fn install_editable(
        &mut self,
        id: ComponentId,
        kind: ValueKind,
        settled: Definition,
    ) -> EngineResult<()> {
        let value = self.add_var(id, VALUE, settled)?.id();
        let typed = self
            .add_var(id, TYPED_VALUE, Definition::essential(kind, Value::Missing))?
            .id();
        let basis = self
            .add_var(
                id,
                TYPED_BASIS,
                Definition::essential(ValueKind::Number, Value::Number(NO_BASIS)),
            )?
            .id();
        let typed_text = self
            .add_var(id, TYPED_TEXT, Definition::essential(ValueKind::Text, Value::Missing))?
            .id();
        let immediate = self
            .add_var(id, IMMEDIATE_VALUE, immediate_definition(value, typed, basis))?
            .id();
        self.add_var(id, RAW_TEXT, raw_text_definition(kind, immediate, typed_text))?;
        self.add_var(
            id,
            VALUE_CHANGED,
            Definition::essential(ValueKind::Boolean, Value::Bool(false)),
        )?;
        self.add_var(
            id,
            IMMEDIATE_VALUE_CHANGED,
            Definition::essential(ValueKind::Boolean, Value::Bool(false)),
        )?;
        self.add_var(
            id,
            VALUE_FOR_DISPLAY,
            Definition::Display {
                source: value,
                component: id,
            },
        )?;
        Ok(())
    }

    fn editable_vars(&self, id: ComponentId) -> EngineResult<EditableVars> {
        EditableVars::of(self.component_by_id(id))
    }

    /// Type text into an editable component's live tier.
    pub fn set_immediate_text(
        &mut self,
        component: &str,
        text: &str,
    ) -> EngineResult<TransactionReport> {
        let id = self.component_id(component)?;
        self.transaction("set_immediate_text", |rt, report| {
            let kind = rt.editable_vars(id)?.kind;
            rt.write_immediate(id, kind.parse(text), Some(text), report)
        })
    }

    /// Put a value into an editable component's live tier.
    pub fn set_immediate(
        &mut self,
        component: &str,
        value: Value,
    ) -> EngineResult<TransactionReport> {
        let id = self.component_id(component)?;
        self.transaction("set_immediate", |rt, report| {
            rt.write_immediate(id, value, None, report)
        })
    }

    /// Commit an editable component's live value.
    pub fn commit(&mut self, component: &str) -> EngineResult<TransactionReport> {
        let id = self.component_id(component)?;
        self.transaction("commit", |rt, report| rt.commit_editable(id, report))
    }

    pub(crate) fn write_immediate(
        &mut self,
        id: ComponentId,
        value: Value,
        text: Option<&str>,
        report: &mut TransactionReport,
    ) -> EngineResult<()> {
        let vars = self.editable_vars(id)?;
        let value = vars.kind.coerce(value);
        let settled = self.resolve(vars.value)?;

        let plan = match self.plan_update(vars.immediate, value.clone()) {
            Ok(plan) => plan,
            Err(InversionError::Structural(err)) => return Err(err),
            Err(err) => {
                debug!(
                    component = %self.component_by_id(id).name(),
                    error = %err,
                    "immediate write refused"
                );
                report.rejected.push(self.var(vars.immediate).label());
                return Ok(());
            }
        };

        self.write_essential(
            vars.typed_text,
            text.map(Value::text).unwrap_or(Value::Missing),
        )?;
        self.apply_plan(&plan)?;
        if value != settled {
            self.write_essential(vars.immediate_changed, Value::Bool(true))?;
        }
        debug!(
            component = %self.component_by_id(id).name(),
            value = %value,
            "immediate write"
        );
        Ok(())
    }

    pub(crate) fn commit_editable(
        &mut self,
        id: ComponentId,
        report: &mut TransactionReport,
    ) -> EngineResult<()> {
        let vars = self.editable_vars(id)?;
        let name = self.component_by_id(id).name().to_string();
        let pre = self.resolve(vars.value)?;
        let live = self.resolve(vars.immediate)?;

        if live.is_unparseable() {
            debug!(component = %name, text = %live, "discarding unparseable edit");
            report.reverted = true;
        } else if live != pre {
            match self.plan_update(vars.value, live.clone()) {
                Ok(plan) => {
                    let watched = self.editables_on_path(plan.path())?;
                    let mut before = Vec::with_capacity(watched.len());
                    for (value, changed) in watched {
                        before.push((value, changed, self.resolve(value)?));
                    }

                    self.apply_plan(&plan)?;

                    for (value, changed, previous) in before {
                        if self.resolve(value)? != previous {
                            self.write_essential(changed, Value::Bool(true))?;
                        }
                    }
                    debug!(component = %name, value = %live, "committed");
                }
                Err(InversionError::Structural(err)) => return Err(err),
                Err(err) => {
                    debug!(component = %name, error = %err, "commit reverted");
                    report.rejected.push(self.var(vars.value).label());
                    report.reverted = true;
                }
            }
        }

        self.write_essential(vars.basis, Value::Number(NO_BASIS))?;
        Ok(())
    }

    /// `(value, valueChanged)` of every editable whose settled variable is
    /// on `path`. Aliases sharing a settled variable appear once.
    fn editables_on_path(
        &self,
        path: &indexmap::IndexSet<VarId>,
    ) -> EngineResult<Vec<(VarId, VarId)>> {
        let mut found: Vec<(VarId, VarId)> = Vec::new();
        for component in &self.components {
            if !component.kind().is_editable() {
                continue;
            }
            let value = component.require_var(VALUE)?.id();
            if !path.contains(&value) || found.iter().any(|(v, _)| *v == value) {
                continue;
            }
            found.push((value, component.require_var(VALUE_CHANGED)?.id()));
        }
        Ok(found)
    }

    /// Everything the rendering layer shows for an editable component.
    pub fn editable_view(&mut self, component: &str) -> EngineResult<EditableView> {
        let id = self.component_id(component)?;
        let vars = self.editable_vars(id)?;
        let display = self.component_by_id(id).require_var(VALUE_FOR_DISPLAY)?.id();
        let raw = self.component_by_id(id).require_var(RAW_TEXT)?.id();

        let value_for_display = self.resolve(display)?;
        Ok(EditableView {
            immediate: self.resolve(vars.immediate)?,
            settled: self.resolve(vars.value)?,
            display_text: serialize(&value_for_display, &ResolvedFormat::exact()),
            value_for_display,
            raw_text: self.resolve(raw)?.to_string(),
            value_changed: self.resolve(vars.value_changed)?.as_bool(),
            immediate_value_changed: self.resolve(vars.immediate_changed)?.as_bool(),
        })
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::component::{ComponentKind, VarRef};
    use crate::reactive::Tier;
    use crate::value::parse_math;

    fn math(text: &str) -> Value {
        Value::Math(parse_math(text).unwrap())
    }

    fn input(runtime: &mut Runtime, name: &str, prefill: &str) -> ComponentId {
        let id = runtime
            .add_component(name, ComponentKind::MathInput, None)
            .unwrap();
        runtime
            .install_editable(
                id,
                ValueKind::Math,
                Definition::essential(ValueKind::Math, math(prefill)),
            )
            .unwrap();
        id
    }

    #[test]
    fn typing_only_touches_the_live_tier() {
        let mut runtime = Runtime::default();
        input(&mut runtime, "a", "x+1");

        runtime.set_immediate_text("a", "x + 2").unwrap();
        let view = runtime.editable_view("a").unwrap();
        assert_eq!(view.immediate, math("x+2"));
        assert_eq!(view.settled, math("x+1"));
        assert_eq!(view.raw_text, "x + 2");
        assert!(view.immediate_value_changed);
        assert!(!view.value_changed);
    }

    #[test]
    fn commit_settles_and_flags() {
        let mut runtime = Runtime::default();
        input(&mut runtime, "a", "x+1");

        runtime.set_immediate_text("a", "x+2").unwrap();
        let report = runtime.commit("a").unwrap();
        assert!(!report.reverted);

        let view = runtime.editable_view("a").unwrap();
        assert_eq!(view.settled, math("x+2"));
        assert_eq!(view.immediate, math("x+2"));
        assert!(view.value_changed);
    }

    #[test]
    fn unparseable_edit_snaps_back() {
        let mut runtime = Runtime::default();
        input(&mut runtime, "a", "x+1");

        runtime.set_immediate_text("a", "x+").unwrap();
        assert!(runtime.editable_view("a").unwrap().immediate.is_unparseable());
        assert_eq!(runtime.editable_view("a").unwrap().raw_text, "x+");

        let report = runtime.commit("a").unwrap();
        assert!(report.reverted);
        let view = runtime.editable_view("a").unwrap();
        assert_eq!(view.immediate, math("x+1"));
        assert_eq!(view.raw_text, "x+1");
        assert!(!view.value_changed);
    }

    #[test]
    fn live_flag_compares_against_current_settled() {
        let mut runtime = Runtime::default();
        input(&mut runtime, "a", "x");

        runtime.set_immediate_text("a", "x").unwrap();
        assert!(!runtime.editable_view("a").unwrap().immediate_value_changed);

        runtime
            .set_essential(&VarRef::value("a"), math("y"), Tier::Settled)
            .unwrap();
        assert_eq!(runtime.editable_view("a").unwrap().immediate, math("y"));

        runtime.set_immediate_text("a", "x").unwrap();
        assert!(runtime.editable_view("a").unwrap().immediate_value_changed);
    }

    #[test]
    fn not_editable() {
        let mut runtime = Runtime::default();
        runtime.add_component("m", ComponentKind::Math, None).unwrap();
        assert_eq!(
            runtime.set_immediate_text("m", "1").unwrap_err(),
            EngineError::NotEditable("m".into())
        );
    }
}

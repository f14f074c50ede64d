//! Reactive Runtime
//!
//! The runtime owns the whole document: components, the variable arena, the
//! dependency graph and the trigger table. Everything else in the crate is
//! a set of `impl Runtime` blocks on top of the store and evaluator here.
//!
//! # How It Works
//!
//! 1. Writing an essential variable stores the value, bumps its generation
//!    and marks every transitive dependent "maybe dirty". Nothing recomputes.
//!
//! 2. Reading a variable resolves it:
//!    a. Clean: return the cache
//!    b. Maybe dirty: resolve the dependencies; if none of their
//!       generations moved since the last computation, the cache is still
//!       good (early cutoff)
//!    c. Otherwise run the definition and cache the result, bumping the
//!       generation only if the value actually changed
//!
//! 3. Writes between two reads coalesce: only the values at read time are
//!    ever observed, so no dependent sees a half-updated set of inputs.
//!
//! # Structural Errors
//!
//! A variable requested while it is already being computed is a re-entrant
//! read. The variables involved are marked broken and keep failing with
//! [`EngineError::Broken`]; the rest of the document is unaffected.

use std::sync::Arc;

use indexmap::IndexMap;
use serde::Serialize;
use smallvec::SmallVec;
use tracing::{trace, warn};

use super::context::EvalStack;
use super::definition::{Definition, Scope};
use super::state_var::StateVar;
use crate::action::{ActionExecutor, RecordingExecutor, TriggerTable};
use crate::binding::evaluate_expression;
use crate::component::{Component, ComponentId, ComponentKind, VarRef};
use crate::config::RuntimeConfig;
use crate::display::DisplayTable;
use crate::error::{EngineError, EngineResult};
use crate::graph::{DependencyGraph, DirtyState, NodeKind, VarId};
use crate::value::{round_value, Value};

/// Name of the implicit root component.
pub const DOCUMENT: &str = "document";

/// Which tier of an editable variable a write goes to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Tier {
    /// The live, per-keystroke tier.
    Immediate,
    /// The committed tier.
    Settled,
}

/// Evaluation counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RuntimeStats {
    /// Definitions actually run.
    pub recomputes: u64,
    /// Reads of computed variables answered from a clean cache.
    pub cache_hits: u64,
    /// Maybe-dirty variables found clean without recomputing.
    pub cutoffs: u64,
    /// Essential writes that changed a value.
    pub essential_writes: u64,
}

/// The owner of one document's state.
pub struct Runtime {
    pub(crate) config: RuntimeConfig,
    pub(crate) graph: DependencyGraph,
    pub(crate) vars: Vec<StateVar>,
    pub(crate) components: Vec<Component>,
    pub(crate) names: IndexMap<String, ComponentId>,
    pub(crate) stack: EvalStack,
    pub(crate) display: DisplayTable,
    pub(crate) triggers: TriggerTable,
    pub(crate) executor: Box<dyn ActionExecutor>,
    pub(crate) stats: RuntimeStats,
}

impl Default for Runtime {
    fn default() -> Self {
        Self::new(RuntimeConfig::default())
    }
}

impl Runtime {
    /// Create a runtime holding only the document root.
    pub fn new(config: RuntimeConfig) -> Self {
        let root = Component::new(ComponentId::from_index(0), DOCUMENT, ComponentKind::Document);
        let mut names = IndexMap::new();
        names.insert(DOCUMENT.to_string(), root.id());

        let mut display = DisplayTable::new();
        display.register(root.id());

        Self {
            config,
            graph: DependencyGraph::new(),
            vars: Vec::new(),
            components: vec![root],
            names,
            stack: EvalStack::new(),
            display,
            triggers: TriggerTable::new(),
            executor: Box::new(RecordingExecutor::default()),
            stats: RuntimeStats::default(),
        }
    }

    /// Replace the external-action executor.
    pub fn with_executor(mut self, executor: impl ActionExecutor + 'static) -> Self {
        self.executor = Box::new(executor);
        self
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    pub fn stats(&self) -> RuntimeStats {
        self.stats
    }

    pub fn reset_stats(&mut self) {
        self.stats = RuntimeStats::default();
    }

    pub fn root(&self) -> ComponentId {
        ComponentId::from_index(0)
    }

    // ------------------------------------------------------------------
    // Components
    // ------------------------------------------------------------------

    pub(crate) fn add_component(
        &mut self,
        name: &str,
        kind: ComponentKind,
        parent: Option<ComponentId>,
    ) -> EngineResult<ComponentId> {
        if self.names.contains_key(name) {
            return Err(EngineError::DuplicateComponent(name.to_string()));
        }
        let id = ComponentId::from_index(self.components.len());
        let parent = parent.unwrap_or_else(|| self.root());

        let mut component = Component::new(id, name, kind);
        component.set_parent(parent);
        self.components.push(component);
        self.components[parent.index()].add_child(id);
        self.names.insert(name.to_string(), id);
        self.display.register(id);
        Ok(id)
    }

    pub fn component_id(&self, name: &str) -> EngineResult<ComponentId> {
        self.names
            .get(name)
            .copied()
            .ok_or_else(|| EngineError::UnknownComponent(name.to_string()))
    }

    pub fn component(&self, name: &str) -> EngineResult<&Component> {
        let id = self.component_id(name)?;
        Ok(&self.components[id.index()])
    }

    pub(crate) fn component_by_id(&self, id: ComponentId) -> &Component {
        &self.components[id.index()]
    }

    pub(crate) fn component_mut(&mut self, id: ComponentId) -> &mut Component {
        &mut self.components[id.index()]
    }

    /// Component names in registration order, the root first.
    pub fn component_names(&self) -> impl Iterator<Item = &str> {
        self.names.keys().map(String::as_str)
    }

    // ------------------------------------------------------------------
    // Variables
    // ------------------------------------------------------------------

    /// Create a variable on `owner`, wiring its declared dependencies.
    ///
    /// A variable of the same name already on `owner` is replaced in the
    /// component's map; other holders of the old handle keep it.
    pub(crate) fn add_var(
        &mut self,
        owner: ComponentId,
        name: &str,
        definition: Definition,
    ) -> EngineResult<StateVar> {
        let deps = definition.dependencies();
        if let Some(missing) = deps.iter().find(|dep| dep.index() >= self.vars.len()) {
            return Err(EngineError::InvalidDeclaration {
                component: self.component_by_id(owner).name().to_string(),
                reason: format!("{} depends on undeclared variable {:?}", name, missing),
            });
        }

        let id = self.graph.add_node(definition.node_kind());
        for dep in deps {
            self.graph.add_edge(dep, id);
        }

        let label = format!("{}.{}", self.component_by_id(owner).name(), name);
        trace!(variable = %label, kind = ?definition.node_kind(), "declared state variable");
        let var = StateVar::new(id, owner, label, definition);
        self.vars.push(var.clone());
        self.component_mut(owner).insert_var(name, var.clone());
        Ok(var)
    }

    pub(crate) fn var(&self, id: VarId) -> &StateVar {
        &self.vars[id.index()]
    }

    /// The handle a reference names.
    pub fn lookup(&self, var: &VarRef) -> EngineResult<StateVar> {
        self.component(&var.component)?
            .require_var(&var.variable)
            .cloned()
    }

    /// Whether inversion may write this variable.
    pub(crate) fn is_fixed(&self, var: &StateVar) -> bool {
        var.is_fixed() || self.component_by_id(var.owner()).is_fixed()
    }

    pub fn dirty_state(&self, var: &VarRef) -> EngineResult<DirtyState> {
        let id = self.lookup(var)?.id();
        Ok(self
            .graph
            .get_node(id)
            .map_or(DirtyState::Dirty, |node| node.dirty_state()))
    }

    // ------------------------------------------------------------------
    // Reads
    // ------------------------------------------------------------------

    /// Current value of a variable, recomputing whatever is stale.
    pub fn get_value(&mut self, var: &VarRef) -> EngineResult<Value> {
        let id = self.lookup(var)?.id();
        self.resolve(id)
    }

    /// Current settled `value` of a component.
    pub fn value_of(&mut self, component: &str) -> EngineResult<Value> {
        self.get_value(&VarRef::value(component))
    }

    pub(crate) fn resolve(&mut self, id: VarId) -> EngineResult<Value> {
        let var = self.var(id).clone();
        let (state, kind) = match self.graph.get_node(id) {
            Some(node) => (node.dirty_state(), node.kind()),
            None => return Err(EngineError::UnknownVariable {
                component: self.component_by_id(var.owner()).name().to_string(),
                variable: var.label(),
            }),
        };

        match state {
            DirtyState::Clean => {
                if kind != NodeKind::Essential {
                    self.stats.cache_hits += 1;
                    trace!(variable = %var.label(), "cache hit");
                }
                return Ok(var.cached());
            }
            DirtyState::Broken => {
                let reason = self
                    .graph
                    .get_node(id)
                    .and_then(|node| node.broken_reason())
                    .unwrap_or_default()
                    .to_string();
                return Err(EngineError::Broken {
                    variable: var.label(),
                    reason,
                });
            }
            DirtyState::MaybeDirty | DirtyState::Dirty => {}
        }

        if self.stack.contains(id) {
            let err = EngineError::ReentrantRead(var.label());
            self.poison(id, &err);
            return Err(err);
        }
        if self.stack.depth() >= self.config.max_eval_depth {
            let err = EngineError::DepthExceeded {
                variable: var.label(),
                limit: self.config.max_eval_depth,
            };
            self.poison(id, &err);
            return Err(err);
        }

        self.stack.push(id);
        let result = self.refresh(id, &var, state);
        self.stack.pop(id);

        if let Err(err) = &result {
            if err.is_structural() {
                self.poison(id, err);
            }
        }
        result
    }

    fn refresh(&mut self, id: VarId, var: &StateVar, state: DirtyState) -> EngineResult<Value> {
        if state == DirtyState::MaybeDirty {
            let deps = self.dependencies_of(id);
            for dep in &deps {
                self.resolve(*dep)?;
            }
            let current = self.generations_of(&deps);
            let unchanged = self
                .graph
                .get_node(id)
                .is_some_and(|node| node.observed() == current.as_slice());
            if unchanged {
                if let Some(node) = self.graph.get_node_mut(id) {
                    node.mark_clean();
                }
                self.stats.cutoffs += 1;
                trace!(variable = %var.label(), "inputs unchanged, keeping cached value");
                return Ok(var.cached());
            }
        }

        self.graph.reset_dynamic_edges(id);

        let definition = var.definition();
        let deps = definition.dependencies();
        let mut values = Vec::with_capacity(deps.len());
        for dep in &deps {
            values.push(self.resolve(*dep)?);
        }
        let generations: Vec<u64> = deps.iter().map(|dep| self.graph.generation(*dep)).collect();

        let computed = match &definition {
            Definition::Essential { .. } => var.cached(),
            Definition::Computed { compute, .. } => {
                let compute = Arc::clone(compute);
                let mut scope = Scope::new(self, id, &values, &generations);
                compute(&mut scope)?
            }
            Definition::Expression {
                expr, inputs, kind, ..
            } => evaluate_expression(expr, inputs, &values, *kind),
            Definition::Display { component, .. } => {
                let format = self.resolved_format(*component);
                values
                    .first()
                    .map(|value| round_value(value, &format))
                    .unwrap_or(Value::Missing)
            }
        };

        let observed = self.generations_of(&self.dependencies_of(id));
        let changed = computed != var.cached();
        if let Some(node) = self.graph.get_node_mut(id) {
            node.set_observed(observed);
            node.mark_clean();
            if changed {
                node.bump_generation();
            }
        }
        if changed {
            var.store(computed.clone());
        }

        self.stats.recomputes += 1;
        trace!(variable = %var.label(), changed, "recomputed");
        Ok(computed)
    }

    fn dependencies_of(&self, id: VarId) -> Vec<VarId> {
        self.graph
            .get_node(id)
            .map(|node| node.dependencies().to_vec())
            .unwrap_or_default()
    }

    fn generations_of(&self, deps: &[VarId]) -> SmallVec<[u64; 4]> {
        deps.iter().map(|dep| self.graph.generation(*dep)).collect()
    }

    fn poison(&mut self, id: VarId, err: &EngineError) {
        let label = self.var(id).label();
        if let Some(node) = self.graph.get_node_mut(id) {
            if !node.is_broken() {
                warn!(variable = %label, error = %err, "state variable is broken");
            }
            node.mark_broken(err.to_string());
        }
    }

    // ------------------------------------------------------------------
    // Writes
    // ------------------------------------------------------------------

    /// Store a new value in an essential variable.
    ///
    /// Returns whether the value changed. Equal values do not invalidate
    /// anything.
    pub(crate) fn write_essential(&mut self, id: VarId, value: Value) -> EngineResult<bool> {
        let var = self.var(id).clone();
        let Definition::Essential { kind, .. } = var.definition() else {
            return Err(EngineError::NotEssential(var.label()));
        };

        let value = kind.coerce(value);
        if value == var.cached() {
            return Ok(false);
        }

        var.store(value);
        if let Some(node) = self.graph.get_node_mut(id) {
            node.bump_generation();
        }
        self.stats.essential_writes += 1;
        let invalidated = self.graph.mark_changed(id);
        trace!(
            variable = %var.label(),
            invalidated = invalidated.len(),
            "essential write"
        );
        Ok(true)
    }

    /// Force a computed variable to recompute on its next read.
    pub(crate) fn invalidate(&mut self, id: VarId) {
        self.graph.mark_dirty(id);
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::ValueKind;

    fn number(runtime: &mut Runtime, owner: ComponentId, name: &str, n: f64) -> VarId {
        runtime
            .add_var(owner, name, Definition::essential(ValueKind::Number, Value::from(n)))
            .unwrap()
            .id()
    }

    fn doubled(runtime: &mut Runtime, owner: ComponentId, name: &str, dep: VarId) -> VarId {
        runtime
            .add_var(
                owner,
                name,
                Definition::computed(vec![dep], |scope| {
                    Ok(Value::from(scope.dep(0).as_number().unwrap_or(f64::NAN) * 2.0))
                }),
            )
            .unwrap()
            .id()
    }

    fn setup() -> (Runtime, ComponentId) {
        let mut runtime = Runtime::default();
        let owner = runtime.add_component("n", ComponentKind::Number, None).unwrap();
        (runtime, owner)
    }

    #[test]
    fn lazy_and_memoized() {
        let (mut runtime, owner) = setup();
        let source = number(&mut runtime, owner, "value", 3.0);
        let derived = doubled(&mut runtime, owner, "double", source);

        assert_eq!(runtime.stats().recomputes, 0);
        assert_eq!(runtime.resolve(derived).unwrap(), Value::from(6.0));
        assert_eq!(runtime.resolve(derived).unwrap(), Value::from(6.0));

        let stats = runtime.stats();
        assert_eq!(stats.recomputes, 1);
        assert_eq!(stats.cache_hits, 1);
    }

    #[test]
    fn writes_coalesce_until_read() {
        let (mut runtime, owner) = setup();
        let source = number(&mut runtime, owner, "value", 1.0);
        let derived = doubled(&mut runtime, owner, "double", source);
        runtime.resolve(derived).unwrap();

        runtime.write_essential(source, Value::from(2.0)).unwrap();
        runtime.write_essential(source, Value::from(5.0)).unwrap();
        assert_eq!(runtime.stats().recomputes, 1);

        assert_eq!(runtime.resolve(derived).unwrap(), Value::from(10.0));
        assert_eq!(runtime.stats().recomputes, 2);
    }

    #[test]
    fn equal_write_is_a_no_op() {
        let (mut runtime, owner) = setup();
        let source = number(&mut runtime, owner, "value", 1.0);
        let derived = doubled(&mut runtime, owner, "double", source);
        runtime.resolve(derived).unwrap();

        assert!(!runtime.write_essential(source, Value::from(1.0)).unwrap());
        assert!(runtime.graph.get_node(derived).unwrap().is_clean());
    }

    #[test]
    fn early_cutoff_skips_unaffected_dependents() {
        let (mut runtime, owner) = setup();
        let source = number(&mut runtime, owner, "value", 1.0);
        let sign = runtime
            .add_var(
                owner,
                "positive",
                Definition::computed(vec![source], |scope| {
                    Ok(Value::from(scope.dep(0).as_number().unwrap_or(0.0) > 0.0))
                }),
            )
            .unwrap()
            .id();
        let label = runtime
            .add_var(
                owner,
                "label",
                Definition::computed(vec![sign], |scope| {
                    Ok(Value::text(if scope.dep(0).as_bool() { "up" } else { "down" }))
                }),
            )
            .unwrap()
            .id();

        runtime.resolve(label).unwrap();
        runtime.write_essential(source, Value::from(7.0)).unwrap();
        runtime.reset_stats();

        assert_eq!(runtime.resolve(label).unwrap(), Value::text("up"));
        let stats = runtime.stats();
        assert_eq!(stats.recomputes, 1);
        assert_eq!(stats.cutoffs, 1);
    }

    #[test]
    fn dynamic_reads_are_tracked() {
        let (mut runtime, owner) = setup();
        let source = number(&mut runtime, owner, "value", 4.0);
        let reader = runtime
            .add_var(
                owner,
                "reader",
                Definition::computed(vec![], move |scope| scope.read(source)),
            )
            .unwrap()
            .id();

        let by_name = runtime
            .add_var(
                owner,
                "by_name",
                Definition::computed(vec![], |scope| scope.read_ref(&VarRef::value("n"))),
            )
            .unwrap()
            .id();

        assert_eq!(runtime.resolve(reader).unwrap(), Value::from(4.0));
        assert_eq!(runtime.resolve(by_name).unwrap(), Value::from(4.0));
        runtime.write_essential(source, Value::from(9.0)).unwrap();
        assert_eq!(runtime.resolve(reader).unwrap(), Value::from(9.0));
        assert_eq!(runtime.resolve(by_name).unwrap(), Value::from(9.0));
    }

    #[test]
    fn reentrant_read_breaks_the_subgraph() {
        let (mut runtime, owner) = setup();
        let first = VarId::from_index(runtime.vars.len());
        let second = VarId::from_index(runtime.vars.len() + 1);
        runtime
            .add_var(owner, "first", Definition::computed(vec![], move |scope| scope.read(second)))
            .unwrap();
        runtime
            .add_var(owner, "second", Definition::computed(vec![], move |scope| scope.read(first)))
            .unwrap();

        assert_eq!(
            runtime.resolve(first).unwrap_err(),
            EngineError::ReentrantRead("n.first".into())
        );
        assert!(matches!(
            runtime.resolve(second),
            Err(EngineError::Broken { .. })
        ));
        assert!(matches!(runtime.resolve(first), Err(EngineError::Broken { .. })));
    }

    #[test]
    fn writes_only_reach_essentials() {
        let (mut runtime, owner) = setup();
        let source = number(&mut runtime, owner, "value", 1.0);
        let derived = doubled(&mut runtime, owner, "double", source);
        assert_eq!(
            runtime.write_essential(derived, Value::from(1.0)).unwrap_err(),
            EngineError::NotEssential("n.double".into())
        );
    }

    #[test]
    fn duplicate_component_names_are_rejected() {
        let (mut runtime, _) = setup();
        assert_eq!(
            runtime.add_component("n", ComponentKind::Math, None).unwrap_err(),
            EngineError::DuplicateComponent("n".into())
        );
    }
}

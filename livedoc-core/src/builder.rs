//! Document Builder
//!
//! Programmatic construction of a document's component tree. Components may
//! be declared in any order; `build()` orders them by what they read,
//! rejects cycles and unknown references, and returns a ready [`Runtime`].
//!
//! # Example
//!
//! ```rust,ignore
//! let mut runtime = DocumentBuilder::new()
//!     .input("a", InputSpec::math().prefill("x+1"))
//!     .input("b", InputSpec::math().bind_to(VarRef::value("a")))
//!     .build()?;
//! ```

use std::collections::HashMap;

use indexmap::{IndexMap, IndexSet};
use tracing::{debug, warn};

use crate::action::{ActionCall, ActionExecutor, ActionStep, Firing, NewValue};
use crate::binding::{bound_definition, Transform};
use crate::component::{ComponentId, ComponentKind, VarRef};
use crate::config::RuntimeConfig;
use crate::editable::{VALUE, VALUE_FOR_DISPLAY};
use crate::error::{EngineError, EngineResult};
use crate::extend::{ExtendOptions, Override};
use crate::graph::{DependencyGraph, NodeKind, VarId};
use crate::point::{X, Y};
use crate::reactive::{Definition, Runtime, DOCUMENT};
use crate::value::{parse_math, FormatOptions, Value, ValueKind};

/// Initial content of a value: a literal, or math over other variables.
#[derive(Debug, Clone, PartialEq)]
pub enum Content {
    Literal(Value),
    Expression {
        text: String,
        inputs: IndexMap<String, VarRef>,
        /// Inputs inversion must leave alone.
        held: IndexSet<String>,
    },
}

impl Content {
    pub fn literal(value: impl Into<Value>) -> Self {
        Content::Literal(value.into())
    }

    pub fn expression(text: impl Into<String>) -> Self {
        Content::Expression {
            text: text.into(),
            inputs: IndexMap::new(),
            held: IndexSet::new(),
        }
    }

    /// Bind `symbol` of an expression to a variable.
    pub fn input(mut self, symbol: impl Into<String>, var: VarRef) -> Self {
        if let Content::Expression { inputs, .. } = &mut self {
            inputs.insert(symbol.into(), var);
        }
        self
    }

    /// Mark an input as not modifiable by inversion.
    pub fn hold(mut self, symbol: impl Into<String>) -> Self {
        if let Content::Expression { held, .. } = &mut self {
            held.insert(symbol.into());
        }
        self
    }

    fn references(&self) -> impl Iterator<Item = &VarRef> {
        let inputs = match self {
            Content::Literal(_) => None,
            Content::Expression { inputs, .. } => Some(inputs.values()),
        };
        inputs.into_iter().flatten()
    }
}

/// An editable input.
#[derive(Debug, Clone, PartialEq)]
pub struct InputSpec {
    kind: ComponentKind,
    prefill: Option<String>,
    literal: Option<Value>,
    bind: Option<VarRef>,
    transform: Transform,
    display: Option<FormatOptions>,
    fixed: bool,
}

impl InputSpec {
    fn new(kind: ComponentKind) -> Self {
        Self {
            kind,
            prefill: None,
            literal: None,
            bind: None,
            transform: Transform::Identity,
            display: None,
            fixed: false,
        }
    }

    pub fn math() -> Self {
        Self::new(ComponentKind::MathInput)
    }

    pub fn number() -> Self {
        Self::new(ComponentKind::NumberInput)
    }

    pub fn text() -> Self {
        Self::new(ComponentKind::TextInput)
    }

    pub fn boolean() -> Self {
        Self::new(ComponentKind::BooleanInput)
    }

    /// Initial text, used when nothing else provides a value.
    pub fn prefill(mut self, text: impl Into<String>) -> Self {
        self.prefill = Some(text.into());
        self
    }

    /// Literal content. Wins over a binding and a prefill.
    pub fn literal(mut self, value: impl Into<Value>) -> Self {
        self.literal = Some(value.into());
        self
    }

    pub fn bind_to(mut self, source: VarRef) -> Self {
        self.bind = Some(source);
        self
    }

    pub fn transform(mut self, transform: Transform) -> Self {
        self.transform = transform;
        self
    }

    pub fn display(mut self, options: FormatOptions) -> Self {
        self.display = Some(options);
        self
    }

    pub fn fixed(mut self) -> Self {
        self.fixed = true;
        self
    }
}

/// A non-editable value component.
#[derive(Debug, Clone, PartialEq)]
pub struct DerivedSpec {
    kind: ComponentKind,
    content: Content,
    display: Option<FormatOptions>,
    fixed: bool,
}

impl DerivedSpec {
    pub fn new(kind: ComponentKind, content: Content) -> Self {
        Self {
            kind,
            content,
            display: None,
            fixed: false,
        }
    }

    /// Math content. Without inputs it is a literal expression.
    pub fn math(text: impl Into<String>) -> Self {
        Self::new(ComponentKind::Math, Content::expression(text))
    }

    pub fn number(n: f64) -> Self {
        Self::new(ComponentKind::Number, Content::literal(n))
    }

    pub fn text(text: &str) -> Self {
        Self::new(ComponentKind::Text, Content::literal(text))
    }

    pub fn boolean(b: bool) -> Self {
        Self::new(ComponentKind::Boolean, Content::literal(b))
    }

    pub fn expression(kind: ComponentKind, text: impl Into<String>) -> Self {
        Self::new(kind, Content::expression(text))
    }

    pub fn input(mut self, symbol: impl Into<String>, var: VarRef) -> Self {
        self.content = self.content.input(symbol, var);
        self
    }

    pub fn hold(mut self, symbol: impl Into<String>) -> Self {
        self.content = self.content.hold(symbol);
        self
    }

    pub fn display(mut self, options: FormatOptions) -> Self {
        self.display = Some(options);
        self
    }

    pub fn fixed(mut self) -> Self {
        self.fixed = true;
        self
    }
}

/// A draggable point.
#[derive(Debug, Clone, PartialEq)]
pub struct PointSpec {
    x: Content,
    y: Content,
    fixed: bool,
}

impl PointSpec {
    pub fn new(x: Content, y: Content) -> Self {
        Self { x, y, fixed: false }
    }

    pub fn at(x: f64, y: f64) -> Self {
        Self::new(Content::literal(x), Content::literal(y))
    }

    pub fn fixed(mut self) -> Self {
        self.fixed = true;
        self
    }
}

#[derive(Debug, Clone)]
enum FiringSpec {
    Manual,
    When(VarRef),
    After(Vec<String>),
}

#[derive(Debug, Clone)]
enum StepSpec {
    Update { target: VarRef, new_value: NewValue },
    Call(ActionCall),
    Fire(String),
}

/// A trigger component.
#[derive(Debug, Clone)]
pub struct TriggerSpec {
    kind: ComponentKind,
    firing: FiringSpec,
    steps: Vec<StepSpec>,
    members: Vec<String>,
}

impl TriggerSpec {
    fn new(kind: ComponentKind) -> Self {
        Self {
            kind,
            firing: FiringSpec::Manual,
            steps: Vec::new(),
            members: Vec::new(),
        }
    }

    pub fn update_value(target: VarRef, new_value: NewValue) -> Self {
        Self::new(ComponentKind::UpdateValue).update(target, new_value)
    }

    pub fn call_action(call: ActionCall) -> Self {
        Self::new(ComponentKind::CallAction).call(call)
    }

    /// A group that runs its members in order. Members lose their own
    /// firing configuration.
    pub fn trigger_set<I, S>(members: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut spec = Self::new(ComponentKind::TriggerSet);
        for member in members {
            let member = member.into();
            spec.steps.push(StepSpec::Fire(member.clone()));
            spec.members.push(member);
        }
        spec
    }

    /// A button firing other triggers, which keep their own configuration.
    pub fn button<I, S>(targets: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut spec = Self::new(ComponentKind::Button);
        spec.steps
            .extend(targets.into_iter().map(|t| StepSpec::Fire(t.into())));
        spec
    }

    /// Append an update step.
    pub fn update(mut self, target: VarRef, new_value: NewValue) -> Self {
        self.steps.push(StepSpec::Update { target, new_value });
        self
    }

    /// Append an external action step.
    pub fn call(mut self, call: ActionCall) -> Self {
        self.steps.push(StepSpec::Call(call));
        self
    }

    /// Fire on each false-to-true transition of `predicate`.
    pub fn when(mut self, predicate: VarRef) -> Self {
        self.firing = FiringSpec::When(predicate);
        self
    }

    /// Fire after any of `sources` completes.
    pub fn after<I, S>(mut self, sources: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.firing = FiringSpec::After(sources.into_iter().map(Into::into).collect());
        self
    }
}

#[derive(Debug, Clone)]
enum ComponentSpec {
    Input(InputSpec),
    Derived(DerivedSpec),
    Point(PointSpec),
    Extend {
        source: String,
        options: ExtendOptions,
    },
    Trigger(TriggerSpec),
}

impl ComponentSpec {
    /// Components whose variables this one reads while being built.
    fn references(&self) -> IndexSet<&str> {
        match self {
            ComponentSpec::Input(spec) => spec
                .bind
                .iter()
                .map(|var| var.component.as_str())
                .collect(),
            ComponentSpec::Derived(spec) => spec
                .content
                .references()
                .map(|var| var.component.as_str())
                .collect(),
            ComponentSpec::Point(spec) => spec
                .x
                .references()
                .chain(spec.y.references())
                .map(|var| var.component.as_str())
                .collect(),
            ComponentSpec::Extend { source, options } => {
                let mut refs = IndexSet::new();
                refs.insert(source.as_str());
                for (_, replacement) in &options.overrides {
                    if let Override::Bind { source, .. } = replacement {
                        refs.insert(source.component.as_str());
                    }
                }
                refs
            }
            ComponentSpec::Trigger(_) => IndexSet::new(),
        }
    }
}

/// Builds a [`Runtime`] from component declarations.
pub struct DocumentBuilder {
    config: RuntimeConfig,
    specs: Vec<(String, ComponentSpec)>,
    executor: Option<Box<dyn ActionExecutor>>,
}

impl Default for DocumentBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl DocumentBuilder {
    pub fn new() -> Self {
        Self {
            config: RuntimeConfig::default(),
            specs: Vec::new(),
            executor: None,
        }
    }

    pub fn with_config(mut self, config: RuntimeConfig) -> Self {
        self.config = config;
        self
    }

    pub fn executor(mut self, executor: impl ActionExecutor + 'static) -> Self {
        self.executor = Some(Box::new(executor));
        self
    }

    pub fn input(mut self, name: impl Into<String>, spec: InputSpec) -> Self {
        self.specs.push((name.into(), ComponentSpec::Input(spec)));
        self
    }

    pub fn derived(mut self, name: impl Into<String>, spec: DerivedSpec) -> Self {
        self.specs.push((name.into(), ComponentSpec::Derived(spec)));
        self
    }

    pub fn point(mut self, name: impl Into<String>, spec: PointSpec) -> Self {
        self.specs.push((name.into(), ComponentSpec::Point(spec)));
        self
    }

    pub fn extend(
        mut self,
        name: impl Into<String>,
        source: impl Into<String>,
        options: ExtendOptions,
    ) -> Self {
        self.specs.push((
            name.into(),
            ComponentSpec::Extend {
                source: source.into(),
                options,
            },
        ));
        self
    }

    pub fn trigger(mut self, name: impl Into<String>, spec: TriggerSpec) -> Self {
        self.specs.push((name.into(), ComponentSpec::Trigger(spec)));
        self
    }

    /// Validate the declarations and instantiate them.
    pub fn build(self) -> EngineResult<Runtime> {
        self.config.validate()?;
        let order = self.instantiation_order()?;

        let DocumentBuilder {
            config,
            specs,
            executor,
        } = self;
        let mut runtime = Runtime::new(config);
        if let Some(executor) = executor {
            runtime.executor = executor;
        }

        let mut specs: Vec<Option<(String, ComponentSpec)>> = specs.into_iter().map(Some).collect();
        for index in order {
            let Some((name, spec)) = specs[index].take() else {
                continue;
            };
            match spec {
                ComponentSpec::Input(spec) => runtime.build_input(&name, spec)?,
                ComponentSpec::Derived(spec) => runtime.build_derived(&name, spec)?,
                ComponentSpec::Point(spec) => runtime.build_point(&name, spec)?,
                ComponentSpec::Extend { source, options } => {
                    runtime.extend(&name, &source, options)?;
                }
                ComponentSpec::Trigger(_) => {}
            }
        }

        let triggers: Vec<(String, TriggerSpec)> = specs
            .into_iter()
            .flatten()
            .filter_map(|(name, spec)| match spec {
                ComponentSpec::Trigger(spec) => Some((name, spec)),
                _ => None,
            })
            .collect();
        runtime.build_triggers(triggers)?;

        debug!(
            components = runtime.component_names().count(),
            variables = runtime.vars.len(),
            "document built"
        );
        Ok(runtime)
    }

    /// Spec indices of value components, sources before readers.
    fn instantiation_order(&self) -> EngineResult<Vec<usize>> {
        let mut positions: HashMap<&str, usize> = HashMap::new();
        for (index, (name, _)) in self.specs.iter().enumerate() {
            if name == DOCUMENT || positions.insert(name.as_str(), index).is_some() {
                return Err(EngineError::DuplicateComponent(name.clone()));
            }
        }

        let mut graph = DependencyGraph::new();
        let mut nodes: HashMap<usize, VarId> = HashMap::new();
        let mut specs: HashMap<VarId, usize> = HashMap::new();
        for (index, (_, spec)) in self.specs.iter().enumerate() {
            if matches!(spec, ComponentSpec::Trigger(_)) {
                continue;
            }
            let node = graph.add_node(NodeKind::Computed);
            nodes.insert(index, node);
            specs.insert(node, index);
        }

        for (index, (name, spec)) in self.specs.iter().enumerate() {
            let Some(&dependent) = nodes.get(&index) else {
                continue;
            };
            for reference in spec.references() {
                if reference == name.as_str() {
                    if matches!(spec, ComponentSpec::Point(_)) {
                        continue;
                    }
                    return Err(EngineError::Cycle {
                        dependency: name.clone(),
                        dependent: name.clone(),
                    });
                }
                let source = positions
                    .get(reference)
                    .ok_or_else(|| EngineError::UnknownComponent(reference.to_string()))?;
                // Reading a trigger fails later, with the variable's name.
                let Some(&dependency) = nodes.get(source) else {
                    continue;
                };
                if graph.would_cycle(dependency, dependent) {
                    return Err(EngineError::Cycle {
                        dependency: reference.to_string(),
                        dependent: name.clone(),
                    });
                }
                graph.add_edge(dependency, dependent);
            }
        }

        let all: Vec<VarId> = (0..graph.node_count()).map(VarId::from_index).collect();
        Ok(graph
            .topological_sort(all)
            .into_iter()
            .filter_map(|node| specs.get(&node).copied())
            .collect())
    }
}

fn invalid(component: &str, reason: impl Into<String>) -> EngineError {
    EngineError::InvalidDeclaration {
        component: component.to_string(),
        reason: reason.into(),
    }
}

impl Runtime {
    fn build_input(&mut self, name: &str, spec: InputSpec) -> EngineResult<()> {
        let kind = spec
            .kind
            .value_kind()
            .ok_or_else(|| invalid(name, "inputs need a value type"))?;
        let id = self.add_component(name, spec.kind, None)?;

        let settled = match (spec.literal, spec.bind) {
            (Some(literal), bind) => {
                if let Some(source) = bind {
                    warn!(component = name, source = %source, "literal content overrides binding");
                }
                Definition::essential(kind, kind.coerce(literal))
            }
            (None, Some(source)) => {
                let upstream = self.lookup(&source)?;
                let bound_to = self.component_id(&source.component)?;
                self.display.set_inherit(id, bound_to);
                bound_definition(upstream.id(), spec.transform, kind)
            }
            (None, None) => {
                let initial = spec
                    .prefill
                    .as_deref()
                    .map_or_else(|| kind.default_value(), |text| kind.parse(text));
                Definition::essential(kind, initial)
            }
        };

        self.install_editable(id, kind, settled)?;
        self.finish_component(id, spec.display, spec.fixed);
        Ok(())
    }

    fn build_derived(&mut self, name: &str, spec: DerivedSpec) -> EngineResult<()> {
        use ComponentKind::*;
        let kind = match spec.kind {
            Math | Number | Text | Boolean => spec.kind.value_kind(),
            _ => None,
        }
        .ok_or_else(|| invalid(name, format!("{:?} is not a value component", spec.kind)))?;

        let id = self.add_component(name, spec.kind, None)?;
        let definition = self.content_definition(name, kind, &spec.content)?;
        let value = self.add_var(id, VALUE, definition)?.id();
        self.add_var(
            id,
            VALUE_FOR_DISPLAY,
            Definition::Display {
                source: value,
                component: id,
            },
        )?;
        self.finish_component(id, spec.display, spec.fixed);
        Ok(())
    }

    fn build_point(&mut self, name: &str, spec: PointSpec) -> EngineResult<()> {
        let id = self.add_component(name, ComponentKind::Point, None)?;
        for (coordinate, content) in [(X, &spec.x), (Y, &spec.y)] {
            let definition = self.content_definition(name, ValueKind::Number, content)?;
            self.add_var(id, coordinate, definition)?;
        }
        self.finish_component(id, None, spec.fixed);
        Ok(())
    }

    fn finish_component(&mut self, id: ComponentId, display: Option<FormatOptions>, fixed: bool) {
        if let Some(options) = display {
            self.display.set_local(id, options);
        }
        if fixed {
            self.component_mut(id).set_fixed(true);
        }
    }

    fn content_definition(
        &self,
        owner: &str,
        kind: ValueKind,
        content: &Content,
    ) -> EngineResult<Definition> {
        let (text, inputs, held) = match content {
            Content::Literal(value) => {
                return Ok(Definition::essential(kind, kind.coerce(value.clone())))
            }
            Content::Expression { text, inputs, held } => (text, inputs, held),
        };

        let expr = parse_math(text).map_err(|err| invalid(owner, err.to_string()))?;
        if inputs.is_empty() {
            return Ok(Definition::essential(kind, kind.coerce(Value::Math(expr))));
        }
        if let Some(symbol) = held.iter().find(|symbol| !inputs.contains_key(*symbol)) {
            return Err(invalid(owner, format!("held symbol {} is not an input", symbol)));
        }

        let mut ids = IndexMap::with_capacity(inputs.len());
        for (symbol, var) in inputs {
            ids.insert(symbol.clone(), self.lookup(var)?.id());
        }
        Ok(Definition::Expression {
            expr,
            inputs: ids,
            held: held.clone(),
            kind,
        })
    }

    fn build_triggers(&mut self, specs: Vec<(String, TriggerSpec)>) -> EngineResult<()> {
        // Steps and chains name other triggers, so every trigger exists first.
        let mut ids = Vec::with_capacity(specs.len());
        for (name, spec) in &specs {
            ids.push(self.add_component(name, spec.kind, None)?);
        }

        for ((name, spec), id) in specs.iter().zip(&ids) {
            let steps = spec
                .steps
                .iter()
                .map(|step| self.resolve_step(step))
                .collect::<EngineResult<Vec<_>>>()?;
            let firing = match &spec.firing {
                FiringSpec::Manual => Firing::Manual,
                FiringSpec::When(predicate) => {
                    self.lookup(predicate)?;
                    Firing::When(predicate.clone())
                }
                FiringSpec::After(sources) => Firing::After(
                    sources
                        .iter()
                        .map(|source| self.component_id(source))
                        .collect::<EngineResult<_>>()?,
                ),
            };
            debug!(trigger = %name, steps = steps.len(), firing = ?firing, "declared trigger");
            self.register_trigger(*id, firing, steps)?;
        }

        for ((_, spec), group) in specs.iter().zip(&ids) {
            for member in &spec.members {
                let member = self.component_id(member)?;
                self.assign_group(member, *group)?;
                self.reparent(member, *group);
            }
        }

        self.finish_triggers()
    }

    fn resolve_step(&self, step: &StepSpec) -> EngineResult<ActionStep> {
        Ok(match step {
            StepSpec::Update { target, new_value } => {
                self.lookup(target)?;
                for var in new_value.references() {
                    self.lookup(var)?;
                }
                ActionStep::UpdateValue {
                    target: target.clone(),
                    new_value: new_value.clone(),
                }
            }
            StepSpec::Call(call) => ActionStep::External(call.clone()),
            StepSpec::Fire(name) => {
                let id = self.component_id(name)?;
                if !self.component_by_id(id).kind().is_trigger() {
                    return Err(EngineError::NotTrigger(name.clone()));
                }
                ActionStep::Fire(id)
            }
        })
    }

    fn reparent(&mut self, child: ComponentId, parent: ComponentId) {
        if let Some(previous) = self.component_by_id(child).parent() {
            self.component_mut(previous).remove_child(child);
        }
        self.component_mut(child).set_parent(parent);
        self.component_mut(parent).add_child(child);
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

//! Extension (Aliasing)
//!
//! `extend` creates a component whose variables are the *same* variables as
//! its source's: the alias holds clones of the source's handles, so a write
//! through either side is a write to both and extension is transitive.
//!
//! An alias may override individual variables. An overridden variable gets a
//! fresh record on the alias, and so does every variable of the component
//! that depends on it, rewired to the override. Everything else stays
//! shared.

use std::collections::{HashMap, VecDeque};

use indexmap::{IndexMap, IndexSet};
use tracing::debug;

use crate::binding::{bound_definition, Transform};
use crate::component::{ComponentId, VarRef};
use crate::editable::{IMMEDIATE_VALUE, TIER_STATE};
use crate::error::{EngineError, EngineResult};
use crate::graph::VarId;
use crate::reactive::{Definition, Runtime};
use crate::value::{FormatOptions, Value, ValueKind};

/// Local replacement for one inherited variable.
#[derive(Debug, Clone, PartialEq)]
pub enum Override {
    /// A stored value of the alias's own.
    Literal(Value),
    /// A binding of the alias's own.
    Bind { source: VarRef, transform: Transform },
}

/// How an alias departs from its source.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExtendOptions {
    pub overrides: Vec<(String, Override)>,
    pub display: Option<FormatOptions>,
}

impl ExtendOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn literal(mut self, variable: impl Into<String>, value: impl Into<Value>) -> Self {
        self.overrides
            .push((variable.into(), Override::Literal(value.into())));
        self
    }

    pub fn bind(mut self, variable: impl Into<String>, source: VarRef, transform: Transform) -> Self {
        self.overrides
            .push((variable.into(), Override::Bind { source, transform }));
        self
    }

    pub fn display(mut self, options: FormatOptions) -> Self {
        self.display = Some(options);
        self
    }
}

impl Runtime {
    /// Create `name` as an alias of `source`.
    pub fn extend(
        &mut self,
        name: &str,
        source: &str,
        options: ExtendOptions,
    ) -> EngineResult<ComponentId> {
        let source_id = self.component_id(source)?;
        let original = self.component_by_id(source_id).clone();
        if original.kind().is_trigger() || original.kind().value_kind().is_none() {
            return Err(EngineError::InvalidDeclaration {
                component: name.to_string(),
                reason: format!("{} cannot be extended", source),
            });
        }

        let id = self.add_component(name, original.kind(), None)?;
        {
            let alias = self.component_mut(id);
            alias.set_extends(source_id);
            alias.set_fixed(original.is_fixed());
            for (var_name, var) in original.vars() {
                alias.insert_var(var_name.clone(), var.clone());
            }
        }
        self.display.set_inherit(id, source_id);

        let mut replaced = IndexMap::new();
        for (var_name, replacement) in &options.overrides {
            let current = original.require_var(var_name)?;
            let kind = match current.definition() {
                Definition::Essential { kind, .. } | Definition::Expression { kind, .. } => kind,
                _ => original.kind().value_kind().unwrap_or(ValueKind::Math),
            };
            let definition = match replacement {
                Override::Literal(value) => Definition::essential(kind, value.clone()),
                Override::Bind { source, transform } => {
                    let upstream = self.lookup(source)?;
                    let bound_to = self.component_id(&source.component)?;
                    self.display.set_inherit(id, bound_to);
                    bound_definition(upstream.id(), transform.clone(), kind)
                }
            };
            replaced.insert(var_name.clone(), definition);
        }

        let mut localize = IndexSet::new();
        if let Some(display) = options.display {
            self.display.set_local(id, display);
            localize.extend(self.display_var_names(id));
        }

        self.reinstantiate(id, replaced, localize)?;
        debug!(
            component = name,
            source,
            overrides = options.overrides.len(),
            "extended component"
        );
        Ok(id)
    }

    /// Give an alias its own display variables so its own options apply.
    pub(crate) fn localize_display(&mut self, id: ComponentId) -> EngineResult<()> {
        let borrowed: IndexSet<String> = self
            .component_by_id(id)
            .vars()
            .iter()
            .filter(|(_, var)| {
                matches!(var.definition(), Definition::Display { component, .. } if component != id)
            })
            .map(|(name, _)| name.clone())
            .collect();
        if borrowed.is_empty() {
            return Ok(());
        }
        self.reinstantiate(id, IndexMap::new(), borrowed)
    }

    fn display_var_names(&self, id: ComponentId) -> Vec<String> {
        self.component_by_id(id)
            .vars()
            .iter()
            .filter(|(_, var)| matches!(var.definition(), Definition::Display { .. }))
            .map(|(name, _)| name.clone())
            .collect()
    }

    /// Give `id` fresh records for `replaced` (with new definitions), for
    /// `localize` (with their current definitions) and for every variable
    /// of the component downstream of those.
    fn reinstantiate(
        &mut self,
        id: ComponentId,
        mut replaced: IndexMap<String, Definition>,
        localize: IndexSet<String>,
    ) -> EngineResult<()> {
        let component = self.component_by_id(id).clone();
        let names: HashMap<VarId, String> = component
            .vars()
            .iter()
            .map(|(name, var)| (var.id(), name.clone()))
            .collect();

        let mut closure = IndexSet::new();
        for name in replaced.keys().chain(localize.iter()) {
            closure.insert(component.require_var(name)?.id());
        }

        let mut queue: VecDeque<VarId> = closure.iter().copied().collect();
        while let Some(current) = queue.pop_front() {
            let dependents = self
                .graph
                .get_node(current)
                .map(|node| node.dependents().iter().copied().collect::<Vec<_>>())
                .unwrap_or_default();
            for dependent in dependents {
                if names.contains_key(&dependent) && closure.insert(dependent) {
                    queue.push_back(dependent);
                }
            }
        }

        // A new live tier needs its own typed value and flags.
        let own_tier = component
            .var(IMMEDIATE_VALUE)
            .is_some_and(|immediate| closure.contains(&immediate.id()));
        if own_tier {
            for slot in TIER_STATE {
                if let Some(var) = component.var(slot) {
                    closure.insert(var.id());
                }
            }
        }

        let order = self.graph.topological_sort(closure.into_iter().collect());
        let mut remap = HashMap::new();
        for old in order {
            let Some(name) = names.get(&old) else {
                continue;
            };
            let previous = self.var(old).clone();
            let definition = match replaced.shift_remove(name) {
                Some(definition) => definition,
                None => previous.definition().remap(&remap, id),
            };
            let fresh = self.add_var(id, name, definition)?;
            if previous.is_fixed() {
                fresh.set_fixed(true);
            }
            remap.insert(old, fresh.id());
        }
        Ok(())
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

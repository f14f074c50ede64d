//! Display Options
//!
//! Display options are configuration, not state. Each component has a layer
//! of [`FormatOptions`] and may inherit from the component it is bound to or
//! extends. Resolution order: the component's own layer, then the inherited
//! chain, then the runtime's global default.
//!
//! Changing options only invalidates display variables. Settled values are
//! never touched.

use indexmap::IndexSet;
use tracing::debug;

use crate::component::ComponentId;
use crate::error::EngineResult;
use crate::reactive::{Definition, Runtime};
use crate::transaction::TransactionReport;
use crate::value::{FormatOptions, ResolvedFormat};

/// Display options of one component.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DisplayLayer {
    pub local: FormatOptions,
    pub inherit: Option<ComponentId>,
}

/// Display layers of every component, indexed by component id.
#[derive(Debug, Default)]
pub struct DisplayTable {
    layers: Vec<DisplayLayer>,
}

impl DisplayTable {
    pub fn new() -> Self {
        Self { layers: Vec::new() }
    }

    pub(crate) fn register(&mut self, id: ComponentId) {
        if self.layers.len() <= id.index() {
            self.layers.resize_with(id.index() + 1, DisplayLayer::default);
        }
    }

    pub fn layer(&self, id: ComponentId) -> Option<&DisplayLayer> {
        self.layers.get(id.index())
    }

    pub(crate) fn set_local(&mut self, id: ComponentId, options: FormatOptions) {
        if let Some(layer) = self.layers.get_mut(id.index()) {
            layer.local = options;
        }
    }

    pub(crate) fn set_inherit(&mut self, id: ComponentId, source: ComponentId) {
        if id == source {
            return;
        }
        if let Some(layer) = self.layers.get_mut(id.index()) {
            layer.inherit = Some(source);
        }
    }

    /// Layers of `id` and everything it inherits from, nearest first.
    pub fn chain(&self, id: ComponentId) -> Vec<&FormatOptions> {
        let mut seen = IndexSet::new();
        let mut layers = Vec::new();
        let mut next = Some(id);
        while let Some(current) = next {
            if !seen.insert(current) {
                break;
            }
            match self.layer(current) {
                Some(layer) => {
                    layers.push(&layer.local);
                    next = layer.inherit;
                }
                None => break,
            }
        }
        layers
    }

    /// Whether `id` is `ancestor` or inherits from it.
    pub fn inherits_from(&self, id: ComponentId, ancestor: ComponentId) -> bool {
        let mut seen = IndexSet::new();
        let mut next = Some(id);
        while let Some(current) = next {
            if current == ancestor {
                return true;
            }
            if !seen.insert(current) {
                return false;
            }
            next = self.layer(current).and_then(|layer| layer.inherit);
        }
        false
    }
}

impl Runtime {
    /// Options in effect for a component.
    pub(crate) fn resolved_format(&self, id: ComponentId) -> ResolvedFormat {
        let mut layers = self.display.chain(id);
        layers.push(&self.config.display);
        FormatOptions::resolve(layers)
    }

    /// Options in effect for a component, by name.
    pub fn display_format(&self, component: &str) -> EngineResult<ResolvedFormat> {
        Ok(self.resolved_format(self.component_id(component)?))
    }

    /// Replace a component's own display options.
    pub fn set_display_options(
        &mut self,
        component: &str,
        options: FormatOptions,
    ) -> EngineResult<TransactionReport> {
        let id = self.component_id(component)?;
        self.transaction("set_display_options", |rt, _| {
            rt.display.set_local(id, options);
            rt.localize_display(id)?;

            let stale: Vec<_> = rt
                .vars
                .iter()
                .filter_map(|var| match var.definition() {
                    Definition::Display { component, .. }
                        if rt.display.inherits_from(component, id) =>
                    {
                        Some(var.id())
                    }
                    _ => None,
                })
                .collect();
            debug!(
                component = %rt.component_by_id(id).name(),
                invalidated = stale.len(),
                "display options changed"
            );
            for var in stale {
                rt.invalidate(var);
            }
            Ok(())
        })
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

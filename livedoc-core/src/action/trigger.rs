//! Trigger Implementation
//!
//! A trigger is a component that runs an ordered list of [`ActionStep`]s.
//!
//! # How Triggers Fire
//!
//! 1. Firing moves the trigger from `Idle` to `Firing`, runs its steps in
//!    declared order and moves it back to `Idle`. A trigger asked to fire
//!    while it is already firing is skipped.
//!
//! 2. When a firing completes, every trigger chained after it is queued.
//!
//! 3. At the end of every transaction the queue is drained and predicate
//!    triggers are edge-checked: a trigger fires when its predicate reads
//!    true now and read false at the previous check. Firing may change
//!    state again, so this repeats until nothing fires.
//!
//! # Groups
//!
//! A trigger inside a trigger set runs only when the set runs. Its own
//! firing configuration is dropped when it joins the group.

use std::collections::{HashMap, VecDeque};

use indexmap::IndexMap;
use tracing::{debug, warn};

use super::{ActionStep, Firing, NewValue};
use crate::binding::evaluate_expression;
use crate::component::{ComponentId, VarRef};
use crate::error::{EngineError, EngineResult, InversionError};
use crate::graph::{DependencyGraph, NodeKind, VarId};
use crate::reactive::Runtime;
use crate::transaction::{FiringReport, TransactionReport};
use crate::value::{Value, ValueKind};

/// Firing state of a trigger.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum TriggerState {
    #[default]
    Idle,
    Firing,
}

/// Runtime record of one trigger component.
#[derive(Debug, Clone)]
pub struct Trigger {
    component: ComponentId,
    name: String,
    firing: Firing,
    steps: Vec<ActionStep>,
    state: TriggerState,
    /// Predicate value at the previous edge check.
    last: bool,
    group: Option<ComponentId>,
    fire_count: u64,
}

impl Trigger {
    pub(crate) fn new(
        component: ComponentId,
        name: impl Into<String>,
        firing: Firing,
        steps: Vec<ActionStep>,
    ) -> Self {
        Self {
            component,
            name: name.into(),
            firing,
            steps,
            state: TriggerState::Idle,
            last: false,
            group: None,
            fire_count: 0,
        }
    }

    pub fn component(&self) -> ComponentId {
        self.component
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn firing(&self) -> &Firing {
        &self.firing
    }

    pub fn steps(&self) -> &[ActionStep] {
        &self.steps
    }

    pub fn state(&self) -> TriggerState {
        self.state
    }

    /// The trigger set this trigger belongs to.
    pub fn group(&self) -> Option<ComponentId> {
        self.group
    }

    /// Number of completed or running firings.
    pub fn fire_count(&self) -> u64 {
        self.fire_count
    }
}

/// All triggers of a document, in registration order.
#[derive(Debug, Default)]
pub struct TriggerTable {
    triggers: IndexMap<ComponentId, Trigger>,
    /// Chain-after edges: source -> triggers that run after it.
    followers: HashMap<ComponentId, Vec<ComponentId>>,
    pending: VecDeque<ComponentId>,
}

impl TriggerTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn insert(&mut self, trigger: Trigger) {
        self.triggers.insert(trigger.component, trigger);
    }

    pub fn get(&self, id: ComponentId) -> Option<&Trigger> {
        self.triggers.get(&id)
    }

    pub(crate) fn get_mut(&mut self, id: ComponentId) -> Option<&mut Trigger> {
        self.triggers.get_mut(&id)
    }

    pub fn followers(&self, id: ComponentId) -> &[ComponentId] {
        self.followers.get(&id).map_or(&[], Vec::as_slice)
    }

    /// Predicate triggers that fire on their own, in registration order.
    pub(crate) fn predicates(&self) -> Vec<(ComponentId, VarRef)> {
        self.triggers
            .values()
            .filter(|trigger| trigger.group.is_none())
            .filter_map(|trigger| match &trigger.firing {
                Firing::When(var) => Some((trigger.component, var.clone())),
                _ => None,
            })
            .collect()
    }

    /// Record a predicate reading, returning the previous one.
    pub(crate) fn set_last(&mut self, id: ComponentId, now: bool) -> bool {
        match self.triggers.get_mut(&id) {
            Some(trigger) => std::mem::replace(&mut trigger.last, now),
            None => now,
        }
    }

    pub fn len(&self) -> usize {
        self.triggers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.triggers.is_empty()
    }
}

impl Runtime {
    /// Declare a trigger component's firing configuration and steps.
    pub(crate) fn register_trigger(
        &mut self,
        id: ComponentId,
        firing: Firing,
        steps: Vec<ActionStep>,
    ) -> EngineResult<()> {
        let component = self.component_by_id(id);
        if !component.kind().is_trigger() {
            return Err(EngineError::NotTrigger(component.name().to_string()));
        }
        let trigger = Trigger::new(id, component.name(), firing, steps);
        self.triggers.insert(trigger);
        Ok(())
    }

    /// Place `member` inside the trigger set `group`.
    pub(crate) fn assign_group(&mut self, member: ComponentId, group: ComponentId) -> EngineResult<()> {
        let group_name = self.component_by_id(group).name().to_string();
        let member_name = self.component_by_id(member).name().to_string();
        let trigger = self
            .triggers
            .get_mut(member)
            .ok_or(EngineError::NotTrigger(member_name))?;
        if trigger.firing != Firing::Manual {
            warn!(
                trigger = %trigger.name,
                group = %group_name,
                "firing configuration superseded by enclosing group"
            );
            trigger.firing = Firing::Manual;
        }
        trigger.group = Some(group);
        Ok(())
    }

    /// Wire chain-after edges and take the first predicate readings.
    pub(crate) fn finish_triggers(&mut self) -> EngineResult<()> {
        let ids: Vec<ComponentId> = self.triggers.triggers.keys().copied().collect();
        let mut scratch = DependencyGraph::new();
        let nodes: HashMap<ComponentId, VarId> = ids
            .iter()
            .map(|id| (*id, scratch.add_node(NodeKind::Computed)))
            .collect();

        let mut followers: HashMap<ComponentId, Vec<ComponentId>> = HashMap::new();
        for id in &ids {
            let sources = match self.triggers.get(*id).map(Trigger::firing) {
                Some(Firing::After(sources)) => sources.clone(),
                _ => continue,
            };
            for source in sources {
                let (Some(from), Some(to)) = (nodes.get(&source), nodes.get(id)) else {
                    return Err(EngineError::NotTrigger(
                        self.component_by_id(source).name().to_string(),
                    ));
                };
                if scratch.would_cycle(*from, *to) {
                    return Err(EngineError::TriggerCycle(
                        self.component_by_id(source).name().to_string(),
                    ));
                }
                scratch.add_edge(*from, *to);
                followers.entry(source).or_default().push(*id);
            }
        }
        self.triggers.followers = followers;

        for (id, var) in self.triggers.predicates() {
            let now = self.predicate_value(&var);
            self.triggers.set_last(id, now);
        }
        debug!(triggers = ids.len(), "triggers wired");
        Ok(())
    }

    fn predicate_value(&mut self, var: &VarRef) -> bool {
        match self.get_value(var) {
            Ok(value) => value.as_bool(),
            Err(err) => {
                warn!(predicate = %var, error = %err, "predicate unreadable, treating as false");
                false
            }
        }
    }

    /// A trigger record, by component name.
    pub fn trigger(&self, name: &str) -> EngineResult<&Trigger> {
        let id = self.component_id(name)?;
        self.triggers
            .get(id)
            .ok_or_else(|| EngineError::NotTrigger(name.to_string()))
    }

    /// Fire a trigger as its own transaction.
    pub fn fire(&mut self, name: &str) -> EngineResult<TransactionReport> {
        let id = self.component_id(name)?;
        if self.triggers.get(id).is_none() {
            return Err(EngineError::NotTrigger(name.to_string()));
        }
        self.transaction("fire", |rt, report| rt.fire_now(id, &mut report.firing))
    }

    /// Run a trigger's steps now and queue its followers.
    pub(crate) fn fire_now(&mut self, id: ComponentId, report: &mut FiringReport) -> EngineResult<()> {
        let (name, steps) = match self.triggers.get_mut(id) {
            Some(trigger) if trigger.state == TriggerState::Firing => {
                warn!(trigger = %trigger.name, "already firing, skipped");
                report.skipped.push(trigger.name.clone());
                return Ok(());
            }
            Some(trigger) => {
                trigger.state = TriggerState::Firing;
                trigger.fire_count += 1;
                (trigger.name.clone(), trigger.steps.clone())
            }
            None => {
                return Err(EngineError::NotTrigger(
                    self.component_by_id(id).name().to_string(),
                ))
            }
        };

        debug!(trigger = %name, steps = steps.len(), "firing");
        report.fired.push(name.clone());
        let mut result = Ok(());
        for step in &steps {
            result = self.run_step(&name, step, report);
            if result.is_err() {
                break;
            }
        }

        if let Some(trigger) = self.triggers.get_mut(id) {
            trigger.state = TriggerState::Idle;
        }
        result?;

        let followers = self.triggers.followers(id).to_vec();
        self.triggers.pending.extend(followers);
        Ok(())
    }

    fn run_step(&mut self, trigger: &str, step: &ActionStep, report: &mut FiringReport) -> EngineResult<()> {
        match step {
            ActionStep::UpdateValue { target, new_value } => {
                let value = self.evaluate_new_value(new_value)?;
                let var = self.lookup(target)?;
                if var.is_essential() {
                    self.write_essential(var.id(), value)?;
                    return Ok(());
                }
                match self.plan_update(var.id(), value) {
                    Ok(plan) => self.apply_plan(&plan),
                    Err(InversionError::Structural(err)) => Err(err),
                    Err(err) => {
                        debug!(trigger, target = %target, error = %err, "update refused");
                        report.rejected_updates.push(target.to_string());
                        Ok(())
                    }
                }
            }
            ActionStep::External(call) => {
                match self.executor.execute(call) {
                    Ok(()) => report.external_calls.push(call.clone()),
                    Err(err) => {
                        warn!(trigger, action = %call, error = %err, "external action failed");
                        report.failed_actions.push(call.to_string());
                    }
                }
                Ok(())
            }
            ActionStep::Fire(other) => self.fire_now(*other, report),
        }
    }

    fn evaluate_new_value(&mut self, new_value: &NewValue) -> EngineResult<Value> {
        match new_value {
            NewValue::Literal(value) => Ok(value.clone()),
            NewValue::Expression { expr, inputs } => {
                let mut ids = IndexMap::with_capacity(inputs.len());
                let mut values = Vec::with_capacity(inputs.len());
                for (symbol, var) in inputs {
                    let id = self.lookup(var)?.id();
                    ids.insert(symbol.clone(), id);
                    values.push(self.resolve(id)?);
                }
                Ok(evaluate_expression(expr, &ids, &values, ValueKind::Math))
            }
            NewValue::Function { reads, compute } => {
                let mut values = Vec::with_capacity(reads.len());
                for var in reads {
                    values.push(self.get_value(var)?);
                }
                Ok(compute(&values))
            }
        }
    }

    /// Run queued and predicate triggers until nothing fires.
    pub(crate) fn settle_triggers(&mut self, report: &mut FiringReport) -> EngineResult<()> {
        let result = self.settle_rounds(report);
        if result.is_err() {
            self.triggers.pending.clear();
        }
        result
    }

    fn settle_rounds(&mut self, report: &mut FiringReport) -> EngineResult<()> {
        let limit = self.config.max_trigger_rounds;
        let budget = limit.saturating_mul(self.triggers.len().max(1));

        for _ in 0..limit {
            let mut fired = false;

            let mut drained = 0;
            while let Some(next) = self.triggers.pending.pop_front() {
                drained += 1;
                if drained > budget {
                    warn!(limit, "chain-after queue did not drain");
                    return Err(EngineError::TriggerLoop(limit));
                }
                self.fire_now(next, report)?;
                fired = true;
            }

            for (id, var) in self.triggers.predicates() {
                let now = self.predicate_value(&var);
                let was = self.triggers.set_last(id, now);
                if now && !was {
                    self.fire_now(id, report)?;
                    fired = true;
                }
            }

            if !fired && self.triggers.pending.is_empty() {
                return Ok(());
            }
        }

        warn!(limit, "triggers did not settle");
        Err(EngineError::TriggerLoop(limit))
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

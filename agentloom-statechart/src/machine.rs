//! ABOUTME: Running statechart instance: six-phase send, history, nested machines

use crate::definition::{StateNode, StatechartDefinition, TransitionDef};
use agentloom_core::error::{LoomError, Result};
use chrono::{DateTime, Utc};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

/// Event name that bypasses the innermost machine and is handled by its
/// parent. Lets a nested flow hand control back explicitly.
pub const ESCAPE_EVENT: &str = "_escape";

pub type GuardFn = Arc<dyn Fn(&Map<String, Value>) -> bool + Send + Sync>;
pub type ActionFn = Arc<dyn Fn(&mut Map<String, Value>) + Send + Sync>;

/// Named callbacks a chart may reference. Resolved once at machine
/// construction; an unresolved name is a configuration error, not a
/// runtime surprise.
#[derive(Default, Clone)]
pub struct StatechartBindings {
    guards: HashMap<String, GuardFn>,
    actions: HashMap<String, ActionFn>,
}

impl StatechartBindings {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn guard<F>(mut self, name: impl Into<String>, f: F) -> Self
    where
        F: Fn(&Map<String, Value>) -> bool + Send + Sync + 'static,
    {
        self.guards.insert(name.into(), Arc::new(f));
        self
    }

    pub fn action<F>(mut self, name: impl Into<String>, f: F) -> Self
    where
        F: Fn(&mut Map<String, Value>) + Send + Sync + 'static,
    {
        self.actions.insert(name.into(), Arc::new(f));
        self
    }
}

/// One recorded transition.
#[derive(Debug, Clone)]
pub struct TransitionRecord {
    pub from: String,
    pub to: String,
    pub event: String,
    pub timestamp: DateTime<Utc>,
}

/// A live statechart.
pub struct Statechart {
    definition: StatechartDefinition,
    bindings: Arc<StatechartBindings>,
    current: String,
    context: Map<String, Value>,
    history: Vec<TransitionRecord>,
    sub: Option<Box<Statechart>>,
}

impl Statechart {
    /// Build and start a machine: validates the chart, resolves every
    /// referenced guard and action, enters the initial state (running its
    /// entry actions), and activates its sub-machine if it has one.
    pub fn new(definition: StatechartDefinition, bindings: StatechartBindings) -> Result<Self> {
        Self::with_shared_bindings(definition, Arc::new(bindings))
    }

    fn with_shared_bindings(
        definition: StatechartDefinition,
        bindings: Arc<StatechartBindings>,
    ) -> Result<Self> {
        definition.validate()?;
        let (guards, actions) = definition.referenced_callbacks();
        for name in &guards {
            if !bindings.guards.contains_key(name) {
                return Err(LoomError::configuration(format!(
                    "statechart '{}' references unbound guard '{name}'",
                    definition.id
                )));
            }
        }
        for name in &actions {
            if !bindings.actions.contains_key(name) {
                return Err(LoomError::configuration(format!(
                    "statechart '{}' references unbound action '{name}'",
                    definition.id
                )));
            }
        }

        let mut machine = Self {
            current: definition.initial_state.clone(),
            context: definition.context.clone(),
            history: Vec::new(),
            sub: None,
            bindings,
            definition,
        };
        machine.enter_current()?;
        Ok(machine)
    }

    pub fn current_state(&self) -> &str {
        &self.current
    }

    pub fn context(&self) -> &Map<String, Value> {
        &self.context
    }

    pub fn history(&self) -> &[TransitionRecord] {
        &self.history
    }

    pub fn is_final(&self) -> bool {
        self.current_node().is_final
    }

    fn current_node(&self) -> &StateNode {
        self.definition
            .states
            .get(&self.current)
            .expect("current state always declared")
    }

    fn run_actions(&mut self, names: &[String]) {
        for name in names {
            let action = self.bindings.actions[name].clone();
            action(&mut self.context);
        }
    }

    /// Entry phase for the current state: entry actions, then sub-machine
    /// activation.
    fn enter_current(&mut self) -> Result<()> {
        let entry = self.current_node().entry.clone();
        self.run_actions(&entry);
        if let Some(sub_def) = self.current_node().sub_machine.clone() {
            let sub = Statechart::with_shared_bindings(*sub_def, self.bindings.clone())?;
            self.sub = Some(Box::new(sub));
        }
        Ok(())
    }

    /// Deliver one event.
    ///
    /// Phases: innermost routing, guard selection, exit actions, transition
    /// actions, target switch with history append, entry actions. A final
    /// state refuses all further events.
    pub fn send(&mut self, event: &str) -> Result<&str> {
        if self.is_final() {
            return Err(LoomError::FinalState {
                state: self.current.clone(),
            });
        }

        // Innermost machine first; the escape token stays at this level.
        if event != ESCAPE_EVENT {
            if let Some(sub) = self.sub.as_mut() {
                if !sub.is_final() {
                    sub.send(event)?;
                    return Ok(&self.current);
                }
            }
        }

        let transitions = self.current_node().on.get(event).cloned().ok_or_else(|| {
            LoomError::Statechart {
                message: format!(
                    "state '{}' has no transition for event '{event}'",
                    self.current
                ),
                state: Some(self.current.clone()),
            }
        })?;

        let Some(transition) = self.select_transition(&transitions) else {
            return Err(LoomError::Statechart {
                message: format!(
                    "no guard admitted event '{event}' in state '{}'",
                    self.current
                ),
                state: Some(self.current.clone()),
            });
        };

        match &transition.target {
            None => {
                // Internal transition: actions only, no exit/entry
                debug!(chart = %self.definition.id, state = %self.current, event, "internal transition");
                self.run_actions(&transition.actions);
            }
            Some(target) => {
                let target = target.clone();
                debug!(chart = %self.definition.id, from = %self.current, to = %target, event, "transition");
                let exit = self.current_node().exit.clone();
                self.run_actions(&exit);
                self.run_actions(&transition.actions);

                self.history.push(TransitionRecord {
                    from: self.current.clone(),
                    to: target.clone(),
                    event: event.to_string(),
                    timestamp: Utc::now(),
                });
                self.sub = None;
                self.current = target;
                self.enter_current()?;
            }
        }

        Ok(&self.current)
    }

    fn select_transition(&self, transitions: &[TransitionDef]) -> Option<TransitionDef> {
        transitions
            .iter()
            .find(|t| match &t.guard {
                Some(name) => (self.bindings.guards[name])(&self.context),
                None => true,
            })
            .cloned()
    }

    /// Apply events in order, stopping at the first final state reached.
    pub fn execute(&mut self, events: &[&str]) -> Result<&str> {
        for event in events {
            if self.is_final() {
                break;
            }
            self.send(event)?;
        }
        Ok(&self.current)
    }
}

//! ABOUTME: Statechart definition types: states, transitions, nesting

use agentloom_core::error::{LoomError, Result};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// One possible transition out of a state for an event. The first
/// transition whose guard holds wins; a transition without a target is
/// internal and only runs its actions.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TransitionDef {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub guard: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub actions: Vec<String>,
}

/// A single state: entry/exit actions, an event table, and an optional
/// nested sub-machine.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StateNode {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub entry: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub exit: Vec<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub on: BTreeMap<String, Vec<TransitionDef>>,
    /// A final state refuses further events
    #[serde(rename = "final", default)]
    pub is_final: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sub_machine: Option<Box<StatechartDefinition>>,
}

/// A statechart: initial state, mutable context, and the state table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatechartDefinition {
    pub id: String,
    pub initial_state: String,
    #[serde(default)]
    pub context: Map<String, Value>,
    pub states: BTreeMap<String, StateNode>,
}

impl StatechartDefinition {
    /// Structural validation: the initial state and every transition target
    /// must name a declared state, recursively through sub-machines.
    pub fn validate(&self) -> Result<()> {
        if !self.states.contains_key(&self.initial_state) {
            return Err(LoomError::Statechart {
                message: format!(
                    "initial state '{}' is not declared in '{}'",
                    self.initial_state, self.id
                ),
                state: Some(self.initial_state.clone()),
            });
        }
        for (name, node) in &self.states {
            for (event, transitions) in &node.on {
                for transition in transitions {
                    if let Some(target) = &transition.target {
                        if !self.states.contains_key(target) {
                            return Err(LoomError::Statechart {
                                message: format!(
                                    "state '{name}' routes '{event}' to undeclared state '{target}'"
                                ),
                                state: Some(name.clone()),
                            });
                        }
                    }
                }
            }
            if let Some(sub) = &node.sub_machine {
                sub.validate()?;
            }
        }
        Ok(())
    }

    /// Every guard and action name referenced anywhere in the chart,
    /// recursively. Used to resolve bindings once at construction.
    pub fn referenced_callbacks(&self) -> (Vec<String>, Vec<String>) {
        let mut guards = Vec::new();
        let mut actions = Vec::new();
        self.collect_callbacks(&mut guards, &mut actions);
        guards.sort();
        guards.dedup();
        actions.sort();
        actions.dedup();
        (guards, actions)
    }

    fn collect_callbacks(&self, guards: &mut Vec<String>, actions: &mut Vec<String>) {
        for node in self.states.values() {
            actions.extend(node.entry.iter().cloned());
            actions.extend(node.exit.iter().cloned());
            for transitions in node.on.values() {
                for transition in transitions {
                    if let Some(guard) = &transition.guard {
                        guards.push(guard.clone());
                    }
                    actions.extend(transition.actions.iter().cloned());
                }
            }
            if let Some(sub) = &node.sub_machine {
                sub.collect_callbacks(guards, actions);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_definition_parse_and_validate() {
        let doc = json!({
            "id": "review-flow",
            "initial_state": "drafting",
            "context": {"revisions": 0},
            "states": {
                "drafting": {
                    "entry": ["reset_notes"],
                    "on": {"submit": [{"target": "review"}]}
                },
                "review": {
                    "on": {
                        "approve": [{"target": "done", "guard": "notes_empty"}],
                        "reject": [{"target": "drafting", "actions": ["bump_revisions"]}]
                    }
                },
                "done": {"final": true}
            }
        });
        let def: StatechartDefinition = serde_json::from_value(doc).unwrap();
        def.validate().unwrap();

        let (guards, actions) = def.referenced_callbacks();
        assert_eq!(guards, vec!["notes_empty"]);
        assert_eq!(actions, vec!["bump_revisions", "reset_notes"]);
    }

    #[test]
    fn test_undeclared_target_rejected() {
        let doc = json!({
            "id": "broken",
            "initial_state": "start",
            "states": {
                "start": {"on": {"go": [{"target": "missing"}]}}
            }
        });
        let def: StatechartDefinition = serde_json::from_value(doc).unwrap();
        assert!(def.validate().is_err());
    }

    #[test]
    fn test_undeclared_initial_rejected() {
        let doc = json!({
            "id": "broken",
            "initial_state": "ghost",
            "states": {"start": {}}
        });
        let def: StatechartDefinition = serde_json::from_value(doc).unwrap();
        assert!(def.validate().is_err());
    }
}

//! ABOUTME: Reactive statechart engine for long-lived, event-driven flows
//! ABOUTME: Guards and actions are named callbacks resolved at machine construction

pub mod definition;
pub mod machine;

pub use definition::{StateNode, StatechartDefinition, TransitionDef};
pub use machine::{
    Statechart, StatechartBindings, TransitionRecord, ESCAPE_EVENT,
};

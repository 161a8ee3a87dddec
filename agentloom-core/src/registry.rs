//! ABOUTME: Generic versioned registry for agent and workflow definitions
//! ABOUTME: Validates on registration, rejects duplicates, supports predicate discovery

use crate::error::{LoomError, Result};
use crate::types::workflow::WorkflowDefinition;
use crate::types::{agent::AgentDefinition, Version};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

/// A registrable definition: named, versioned, and self-validating.
pub trait Definition: Clone + Send + Sync + 'static {
    fn name(&self) -> &str;
    fn version(&self) -> &Version;
    fn validate(&self) -> Result<()>;
}

impl Definition for AgentDefinition {
    fn name(&self) -> &str {
        &self.name
    }

    fn version(&self) -> &Version {
        &self.version
    }

    fn validate(&self) -> Result<()> {
        AgentDefinition::validate(self)
    }
}

impl Definition for WorkflowDefinition {
    fn name(&self) -> &str {
        &self.name
    }

    fn version(&self) -> &Version {
        &self.version
    }

    fn validate(&self) -> Result<()> {
        WorkflowDefinition::validate(self)
    }
}

/// Stores definitions by unique name, several versions per name. Lookup by
/// bare name returns the latest version.
///
/// # Examples
///
/// ```
/// use agentloom_core::{AgentDefinition, AgentRole, Registry};
///
/// let registry = Registry::new("agent");
/// let def = AgentDefinition::builder("helper")
///     .role(AgentRole::Worker)
///     .build()
///     .unwrap();
/// registry.register(def).unwrap();
///
/// assert!(registry.contains("helper"));
/// assert_eq!(registry.get("helper").unwrap().name, "helper");
/// assert!(registry.get("stranger").is_err());
/// ```
pub struct Registry<T: Definition> {
    /// Human-readable kind used in NotFound errors ("agent", "workflow")
    kind: &'static str,
    entries: RwLock<HashMap<String, Vec<Arc<T>>>>,
}

impl<T: Definition> Registry<T> {
    pub fn new(kind: &'static str) -> Self {
        Self {
            kind,
            entries: RwLock::new(HashMap::new()),
        }
    }

    /// Validate and store a definition. A (name, version) pair may only be
    /// registered once; definitions are immutable afterwards.
    pub fn register(&self, definition: T) -> Result<()> {
        definition.validate()?;
        let name = definition.name().to_string();
        let mut entries = self.entries.write();
        let versions = entries.entry(name.clone()).or_default();
        if versions
            .iter()
            .any(|existing| existing.version() == definition.version())
        {
            return Err(LoomError::validation(format!(
                "{} '{}' version {} is already registered",
                self.kind,
                name,
                definition.version()
            )));
        }
        debug!(kind = self.kind, name = %name, version = %definition.version(), "registered definition");
        versions.push(Arc::new(definition));
        versions.sort_by(|a, b| a.version().cmp(b.version()));
        Ok(())
    }

    /// Latest registered version under the given name
    pub fn get(&self, name: &str) -> Result<Arc<T>> {
        self.entries
            .read()
            .get(name)
            .and_then(|versions| versions.last().cloned())
            .ok_or_else(|| LoomError::NotFound {
                kind: self.kind,
                name: name.to_string(),
            })
    }

    /// A specific registered version
    pub fn get_version(&self, name: &str, version: &Version) -> Result<Arc<T>> {
        self.entries
            .read()
            .get(name)
            .and_then(|versions| {
                versions
                    .iter()
                    .find(|def| def.version() == version)
                    .cloned()
            })
            .ok_or_else(|| LoomError::NotFound {
                kind: self.kind,
                name: format!("{name}@{version}"),
            })
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.read().contains_key(name)
    }

    /// Registered names, sorted
    pub fn list(&self) -> Vec<String> {
        let mut names: Vec<String> = self.entries.read().keys().cloned().collect();
        names.sort();
        names
    }

    /// Latest versions matching a predicate (discovery by role, tag, ...)
    pub fn find<F>(&self, predicate: F) -> Vec<Arc<T>>
    where
        F: Fn(&T) -> bool,
    {
        let mut found: Vec<Arc<T>> = self
            .entries
            .read()
            .values()
            .filter_map(|versions| versions.last())
            .filter(|def| predicate(def))
            .cloned()
            .collect();
        found.sort_by(|a, b| a.name().cmp(b.name()));
        found
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

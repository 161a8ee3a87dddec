//! ABOUTME: Agent definition types with one-shot registration validation
//! ABOUTME: Provides AgentDefinition, its builder, roles, and numeric constraints

use super::params::ParamSpec;
use super::{validate_identifier, Version};
use crate::error::{LoomError, Result};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// Role an agent plays inside a workflow. Free-form behavior lives in the
/// prompt; the role is part of the agent's identity line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AgentRole {
    Orchestrator,
    Director,
    Worker,
    Reviewer,
    Researcher,
    Validator,
}

impl AgentRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Orchestrator => "orchestrator",
            Self::Director => "director",
            Self::Worker => "worker",
            Self::Reviewer => "reviewer",
            Self::Researcher => "researcher",
            Self::Validator => "validator",
        }
    }
}

/// Numeric execution constraints for an agent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConstraints {
    /// Maximum completion tokens requested from the provider
    pub max_tokens: u32,

    /// Wall-clock bound around a single LLM call, in seconds
    pub timeout_seconds: u64,

    /// Retry budget beyond the first attempt
    pub max_retries: u32,

    /// Whether invocations of this agent may run concurrently within a run
    pub parallel_allowed: bool,
}

impl Default for AgentConstraints {
    fn default() -> Self {
        Self {
            max_tokens: 4096,
            timeout_seconds: 120,
            max_retries: 2,
            parallel_allowed: true,
        }
    }
}

impl AgentConstraints {
    fn validate(&self) -> Result<()> {
        if !(100..=200_000).contains(&self.max_tokens) {
            return Err(LoomError::validation_field(
                format!("max_tokens {} outside [100, 200000]", self.max_tokens),
                "constraints.max_tokens",
            ));
        }
        if !(10..=3600).contains(&self.timeout_seconds) {
            return Err(LoomError::validation_field(
                format!("timeout_seconds {} outside [10, 3600]", self.timeout_seconds),
                "constraints.timeout_seconds",
            ));
        }
        if self.max_retries > 10 {
            return Err(LoomError::validation_field(
                format!("max_retries {} outside [0, 10]", self.max_retries),
                "constraints.max_retries",
            ));
        }
        Ok(())
    }
}

/// Explicit prompt templates. When absent, the runtime synthesizes a system
/// prompt from the definition's description and schemas.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PromptTemplates {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,
}

/// Opaque authorship metadata.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AgentMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
}

/// A typed prompt template over an LLM: declared inputs, outputs, and
/// constraints. Immutable once registered.
///
/// # Examples
///
/// ```
/// use agentloom_core::{AgentDefinition, AgentRole, ParamSpec, ParamType};
///
/// let def = AgentDefinition::builder("summarizer")
///     .role(AgentRole::Worker)
///     .description("Condense a document into a short summary")
///     .input("document", ParamSpec::required(ParamType::String))
///     .output("summary", ParamSpec::required(ParamType::String))
///     .build()
///     .unwrap();
///
/// assert_eq!(def.name, "summarizer");
/// assert_eq!(def.version.to_string(), "0.1.0");
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentDefinition {
    /// Unique per registry; lowercase with hyphens
    pub name: String,

    /// Semantic version; several versions of one name may coexist
    #[serde(default = "default_version")]
    pub version: Version,

    pub role: AgentRole,

    /// At most 500 characters; becomes part of the system prompt
    #[serde(default)]
    pub description: String,

    /// Free-form capability tags, opaque to the engine
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub capabilities: Vec<String>,

    /// Declared input parameters, keyed by name
    #[serde(default)]
    pub inputs: BTreeMap<String, ParamSpec>,

    /// Declared output parameters, keyed by name
    #[serde(default)]
    pub outputs: BTreeMap<String, ParamSpec>,

    /// Explicit prompt templates, when synthesis is not wanted
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prompts: Option<PromptTemplates>,

    #[serde(default)]
    pub constraints: AgentConstraints,

    #[serde(default)]
    pub metadata: AgentMetadata,
}

fn default_version() -> Version {
    Version::new(0, 1, 0)
}

impl AgentDefinition {
    /// Start building a definition with defaults for everything but the name
    pub fn builder(name: impl Into<String>) -> AgentDefinitionBuilder {
        AgentDefinitionBuilder::new(name)
    }

    /// Validate the definition. Called once at registration time.
    pub fn validate(&self) -> Result<()> {
        validate_identifier(&self.name, "name")?;
        if self.description.len() > 500 {
            return Err(LoomError::validation_field(
                format!(
                    "description is {} characters, maximum is 500",
                    self.description.len()
                ),
                "description",
            ));
        }
        self.constraints.validate()?;
        for (name, spec) in &self.inputs {
            if let Some(default) = &spec.default {
                if !spec.accepts(default) {
                    return Err(LoomError::validation_field(
                        format!("default for input '{name}' does not match its declared type"),
                        format!("inputs.{name}"),
                    ));
                }
            }
        }
        Ok(())
    }

    /// Validate a caller-supplied input map against the declared inputs and
    /// return the effective map with defaults applied.
    pub fn resolve_inputs(&self, provided: &Map<String, Value>) -> Result<Map<String, Value>> {
        let mut effective = provided.clone();
        for (name, spec) in &self.inputs {
            match effective.get(name) {
                Some(value) => {
                    if !spec.accepts(value) {
                        return Err(LoomError::validation_field(
                            format!("input '{name}' does not match its declared type"),
                            name.clone(),
                        ));
                    }
                }
                None => {
                    if let Some(default) = &spec.default {
                        effective.insert(name.clone(), default.clone());
                    } else if spec.required {
                        return Err(LoomError::validation_field(
                            format!("required input '{name}' is missing"),
                            name.clone(),
                        ));
                    }
                }
            }
        }
        Ok(effective)
    }
}

/// Builder for [`AgentDefinition`], in the workspace's usual builder idiom.
pub struct AgentDefinitionBuilder {
    def: AgentDefinition,
}

impl AgentDefinitionBuilder {
    fn new(name: impl Into<String>) -> Self {
        Self {
            def: AgentDefinition {
                name: name.into(),
                version: default_version(),
                role: AgentRole::Worker,
                description: String::new(),
                capabilities: Vec::new(),
                inputs: BTreeMap::new(),
                outputs: BTreeMap::new(),
                prompts: None,
                constraints: AgentConstraints::default(),
                metadata: AgentMetadata::default(),
            },
        }
    }

    pub fn version(mut self, version: Version) -> Self {
        self.def.version = version;
        self
    }

    pub fn role(mut self, role: AgentRole) -> Self {
        self.def.role = role;
        self
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.def.description = description.into();
        self
    }

    pub fn capability(mut self, capability: impl Into<String>) -> Self {
        self.def.capabilities.push(capability.into());
        self
    }

    pub fn input(mut self, name: impl Into<String>, spec: ParamSpec) -> Self {
        self.def.inputs.insert(name.into(), spec);
        self
    }

    pub fn output(mut self, name: impl Into<String>, spec: ParamSpec) -> Self {
        self.def.outputs.insert(name.into(), spec);
        self
    }

    pub fn prompts(mut self, prompts: PromptTemplates) -> Self {
        self.def.prompts = Some(prompts);
        self
    }

    pub fn constraints(mut self, constraints: AgentConstraints) -> Self {
        self.def.constraints = constraints;
        self
    }

    pub fn metadata(mut self, metadata: AgentMetadata) -> Self {
        self.def.metadata = metadata;
        self
    }

    /// Validate and return the finished definition
    pub fn build(self) -> Result<AgentDefinition> {
        self.def.validate()?;
        Ok(self.def)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::params::ParamType;
    use serde_json::json;

    fn minimal() -> AgentDefinitionBuilder {
        AgentDefinition::builder("test-agent")
            .role(AgentRole::Worker)
            .description("test")
    }

    #[test]
    fn test_builder_defaults() {
        let def = minimal().build().unwrap();
        assert_eq!(def.version, Version::new(0, 1, 0));
        assert!(def.constraints.parallel_allowed);
        assert_eq!(def.constraints.max_retries, 2);
    }

    #[test]
    fn test_name_rules_enforced() {
        assert!(AgentDefinition::builder("Bad-Name")
            .role(AgentRole::Worker)
            .build()
            .is_err());
        assert!(AgentDefinition::builder("x")
            .role(AgentRole::Worker)
            .build()
            .is_err());
    }

    #[test]
    fn test_description_length_cap() {
        let result = minimal().description("x".repeat(501)).build();
        assert!(result.is_err());
    }

    #[test]
    fn test_constraint_ranges() {
        let result = minimal()
            .constraints(AgentConstraints {
                max_tokens: 50,
                ..AgentConstraints::default()
            })
            .build();
        assert!(result.is_err());

        let result = minimal()
            .constraints(AgentConstraints {
                timeout_seconds: 5,
                ..AgentConstraints::default()
            })
            .build();
        assert!(result.is_err());

        let result = minimal()
            .constraints(AgentConstraints {
                max_retries: 11,
                ..AgentConstraints::default()
            })
            .build();
        assert!(result.is_err());
    }

    #[test]
    fn test_resolve_inputs_applies_defaults_and_rejects_missing() {
        let def = minimal()
            .input("topic", ParamSpec::required(ParamType::String))
            .input(
                "depth",
                ParamSpec::optional(ParamType::Number).with_default(json!(2)),
            )
            .build()
            .unwrap();

        let mut provided = Map::new();
        provided.insert("topic".into(), json!("rust"));
        let effective = def.resolve_inputs(&provided).unwrap();
        assert_eq!(effective["depth"], json!(2));

        let err = def.resolve_inputs(&Map::new()).unwrap_err();
        assert!(err.to_string().contains("required input 'topic'"));
    }

    #[test]
    fn test_resolve_inputs_type_mismatch() {
        let def = minimal()
            .input("count", ParamSpec::required(ParamType::Number))
            .build()
            .unwrap();
        let mut provided = Map::new();
        provided.insert("count".into(), json!("three"));
        assert!(def.resolve_inputs(&provided).is_err());
    }

    #[test]
    fn test_definition_document_roundtrip() {
        let doc = json!({
            "name": "researcher",
            "version": "1.0.2",
            "role": "researcher",
            "description": "Find sources",
            "capabilities": ["web-search"],
            "inputs": {
                "query": {"type": "string", "required": true}
            },
            "outputs": {
                "sources": {"type": "array", "required": true}
            },
            "constraints": {
                "max_tokens": 2000,
                "timeout_seconds": 60,
                "max_retries": 1,
                "parallel_allowed": false
            }
        });
        let def: AgentDefinition = serde_json::from_value(doc).unwrap();
        def.validate().unwrap();
        assert_eq!(def.version, Version::new(1, 0, 2));
        assert!(!def.constraints.parallel_allowed);
    }
}

//! ABOUTME: Parameter descriptors shared by agent and workflow definitions
//! ABOUTME: Provides ParamType and ParamSpec with value conformance checks

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Declared type of a parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParamType {
    String,
    Number,
    Boolean,
    Array,
    Object,
    Path,
}

impl ParamType {
    /// Check that a JSON value conforms to this declared type.
    /// `path` parameters travel as strings.
    pub fn accepts(&self, value: &Value) -> bool {
        match self {
            Self::String | Self::Path => value.is_string(),
            Self::Number => value.is_number(),
            Self::Boolean => value.is_boolean(),
            Self::Array => value.is_array(),
            Self::Object => value.is_object(),
        }
    }
}

/// Descriptor for a single named input or output parameter.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParamSpec {
    /// Declared type
    #[serde(rename = "type")]
    pub param_type: ParamType,

    /// Human-readable description (becomes part of synthesized prompts)
    #[serde(default)]
    pub description: String,

    /// Whether the parameter must be supplied by the caller
    #[serde(default)]
    pub required: bool,

    /// Default value applied when the parameter is absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,

    /// Closed set of admissible values, when the parameter is enumerated
    #[serde(rename = "enum", default, skip_serializing_if = "Option::is_none")]
    pub enum_values: Option<Vec<Value>>,
}

impl ParamSpec {
    /// Shorthand for a required parameter of the given type
    pub fn required(param_type: ParamType) -> Self {
        Self {
            param_type,
            description: String::new(),
            required: true,
            default: None,
            enum_values: None,
        }
    }

    /// Shorthand for an optional parameter of the given type
    pub fn optional(param_type: ParamType) -> Self {
        Self {
            param_type,
            description: String::new(),
            required: false,
            default: None,
            enum_values: None,
        }
    }

    /// Attach a description
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Attach a default value
    pub fn with_default(mut self, default: Value) -> Self {
        self.default = Some(default);
        self
    }

    /// Check a concrete value against type and enum constraints.
    pub fn accepts(&self, value: &Value) -> bool {
        if !self.param_type.accepts(value) {
            return false;
        }
        match &self.enum_values {
            Some(allowed) => allowed.contains(value),
            None => true,
        }
    }
}

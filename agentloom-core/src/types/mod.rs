//! ABOUTME: Core data model for agent and workflow definitions
//! ABOUTME: Provides Version plus the agent, workflow, result, and LLM types

pub mod agent;
pub mod checkpoint;
pub mod llm;
pub mod params;
pub mod result;
pub mod workflow;

use crate::error::{LoomError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Semantic version attached to every registered definition.
///
/// Serializes to and from the `MAJOR.MINOR.PATCH` string form used in
/// definition documents.
///
/// # Examples
///
/// ```
/// use agentloom_core::Version;
///
/// let v1: Version = "1.2.3".parse().unwrap();
/// let v2 = Version::new(1, 3, 0);
/// assert!(v2 > v1);
/// assert!(v1.is_compatible_with(&v2));
/// assert_eq!(v1.to_string(), "1.2.3");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Version {
    pub major: u32,
    pub minor: u32,
    pub patch: u32,
}

impl Version {
    pub const fn new(major: u32, minor: u32, patch: u32) -> Self {
        Self {
            major,
            minor,
            patch,
        }
    }

    /// Check if this version is compatible with another (same major version)
    pub fn is_compatible_with(&self, other: &Version) -> bool {
        self.major == other.major
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

impl FromStr for Version {
    type Err = LoomError;

    fn from_str(s: &str) -> Result<Self> {
        let parts: Vec<&str> = s.split('.').collect();
        if parts.len() != 3 {
            return Err(LoomError::validation_field(
                format!("version '{s}' is not MAJOR.MINOR.PATCH"),
                "version",
            ));
        }
        let parse = |p: &str| {
            p.parse::<u32>().map_err(|_| {
                LoomError::validation_field(
                    format!("version '{s}' has a non-numeric component"),
                    "version",
                )
            })
        };
        Ok(Self {
            major: parse(parts[0])?,
            minor: parse(parts[1])?,
            patch: parse(parts[2])?,
        })
    }
}

impl TryFrom<String> for Version {
    type Error = LoomError;

    fn try_from(s: String) -> Result<Self> {
        s.parse()
    }
}

impl From<Version> for String {
    fn from(v: Version) -> Self {
        v.to_string()
    }
}

/// Validate a definition or step identifier: lowercase with hyphens,
/// 2-64 chars, matching `^[a-z][a-z0-9-]*$`.
pub fn validate_identifier(name: &str, field: &str) -> Result<()> {
    if name.len() < 2 || name.len() > 64 {
        return Err(LoomError::validation_field(
            format!("{field} '{name}' must be 2-64 characters"),
            field,
        ));
    }
    let mut chars = name.chars();
    let first = chars.next().unwrap();
    if !first.is_ascii_lowercase() {
        return Err(LoomError::validation_field(
            format!("{field} '{name}' must start with a lowercase letter"),
            field,
        ));
    }
    if !chars.all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-') {
        return Err(LoomError::validation_field(
            format!("{field} '{name}' may only contain lowercase letters, digits, and hyphens"),
            field,
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version_parse_roundtrip() {
        let v: Version = "2.10.0".parse().unwrap();
        assert_eq!(v, Version::new(2, 10, 0));
        assert_eq!(v.to_string(), "2.10.0");

        let json = serde_json::to_string(&v).unwrap();
        assert_eq!(json, "\"2.10.0\"");
        let back: Version = serde_json::from_str(&json).unwrap();
        assert_eq!(back, v);
    }

    #[test]
    fn test_version_parse_rejects_malformed() {
        assert!("1.2".parse::<Version>().is_err());
        assert!("1.2.x".parse::<Version>().is_err());
        assert!("1.2.3.4".parse::<Version>().is_err());
    }

    #[test]
    fn test_version_ordering() {
        let v1: Version = "1.0.0".parse().unwrap();
        let v2: Version = "1.1.0".parse().unwrap();
        let v3: Version = "2.0.0".parse().unwrap();
        assert!(v1 < v2);
        assert!(v2 < v3);
        assert!(v1.is_compatible_with(&v2));
        assert!(!v1.is_compatible_with(&v3));
    }

    #[test]
    fn test_identifier_validation() {
        assert!(validate_identifier("my-agent", "name").is_ok());
        assert!(validate_identifier("a2", "name").is_ok());
        assert!(validate_identifier("a", "name").is_err());
        assert!(validate_identifier("My-Agent", "name").is_err());
        assert!(validate_identifier("2agent", "name").is_err());
        assert!(validate_identifier("agent_one", "name").is_err());
        assert!(validate_identifier(&"a".repeat(65), "name").is_err());
    }
}

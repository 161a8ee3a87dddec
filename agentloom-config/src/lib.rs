//! ABOUTME: Central configuration for agentloom deployments
//! ABOUTME: TOML file discovery, serde-defaulted sections, AGENTLOOM_* env overrides

use agentloom_core::error::{LoomError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::debug;

/// Configuration file discovery order
const CONFIG_SEARCH_PATHS: &[&str] = &[
    "agentloom.toml",
    ".agentloom.toml",
    "config/agentloom.toml",
];

/// Environment variable prefix
const ENV_PREFIX: &str = "AGENTLOOM_";

/// One prefix route in the provider table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RouteConfig {
    pub prefix: String,
    pub provider: String,
}

/// A provider endpoint the deployment talks to. Keys stay in the process
/// environment; only the variable name is configured.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderEndpoint {
    pub base_url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key_env: Option<String>,
}

/// Provider wiring: default provider/model and the prefix route table.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProvidersConfig {
    pub default_provider: String,
    pub default_model: String,
    pub routes: Vec<RouteConfig>,
    pub endpoints: std::collections::BTreeMap<String, ProviderEndpoint>,
}

impl Default for ProvidersConfig {
    fn default() -> Self {
        Self {
            default_provider: "openai".to_string(),
            default_model: "gpt-4o-mini".to_string(),
            routes: Vec::new(),
            endpoints: std::collections::BTreeMap::new(),
        }
    }
}

/// Executor defaults applied when a workflow leaves them unset.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutionDefaults {
    pub parallel_limit: usize,
    pub step_timeout_seconds: u64,
}

impl Default for ExecutionDefaults {
    fn default() -> Self {
        Self {
            parallel_limit: 4,
            step_timeout_seconds: 300,
        }
    }
}

/// Sensor kernel tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SensorDefaults {
    pub dedup_capacity: usize,
    pub dedup_ttl_seconds: u64,
}

impl Default for SensorDefaults {
    fn default() -> Self {
        Self {
            dedup_capacity: 256,
            dedup_ttl_seconds: 600,
        }
    }
}

/// Central agentloom configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct LoomConfig {
    pub providers: ProvidersConfig,
    pub execution: ExecutionDefaults,
    pub sensors: SensorDefaults,
}

impl LoomConfig {
    /// Parse a TOML document.
    pub fn from_toml(text: &str) -> Result<Self> {
        let mut config: Self = toml::from_str(text).map_err(|e| {
            LoomError::configuration(format!("failed to parse configuration: {e}"))
        })?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Load a specific file.
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| {
            LoomError::configuration(format!("cannot read {}: {e}", path.display()))
        })?;
        debug!(path = %path.display(), "loading configuration");
        Self::from_toml(&text)
    }

    /// Walk the discovery list from `base_dir`; defaults (plus env
    /// overrides) apply when no file exists.
    pub fn discover(base_dir: &Path) -> Result<Self> {
        for candidate in CONFIG_SEARCH_PATHS {
            let path = base_dir.join(candidate);
            if path.is_file() {
                return Self::load_from_file(&path);
            }
        }
        debug!("no configuration file found, using defaults");
        let mut config = Self::default();
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// `AGENTLOOM_DEFAULT_PROVIDER`, `AGENTLOOM_DEFAULT_MODEL`, and
    /// `AGENTLOOM_PARALLEL_LIMIT` override their file counterparts.
    fn apply_env_overrides(&mut self) {
        if let Ok(value) = std::env::var(format!("{ENV_PREFIX}DEFAULT_PROVIDER")) {
            self.providers.default_provider = value;
        }
        if let Ok(value) = std::env::var(format!("{ENV_PREFIX}DEFAULT_MODEL")) {
            self.providers.default_model = value;
        }
        if let Ok(value) = std::env::var(format!("{ENV_PREFIX}PARALLEL_LIMIT")) {
            if let Ok(limit) = value.parse() {
                self.execution.parallel_limit = limit;
            }
        }
    }

    fn validate(&self) -> Result<()> {
        if !(1..=32).contains(&self.execution.parallel_limit) {
            return Err(LoomError::configuration(format!(
                "execution.parallel_limit {} outside [1, 32]",
                self.execution.parallel_limit
            )));
        }
        if self.providers.default_model.is_empty() {
            return Err(LoomError::configuration(
                "providers.default_model must not be empty",
            ));
        }
        Ok(())
    }

    /// Resolve a provider endpoint's API key from the environment.
    pub fn api_key(&self, provider: &str) -> Option<String> {
        self.providers
            .endpoints
            .get(provider)
            .and_then(|endpoint| endpoint.api_key_env.as_ref())
            .and_then(|var| std::env::var(var).ok())
    }
}

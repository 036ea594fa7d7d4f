//! Configuration for load runs
//!
//! Sources, lowest precedence first:
//! - Hardcoded defaults
//! - /etc/roundtrip/roundtrip.{toml,yaml,...}
//! - ./config/roundtrip.{toml,yaml,...}
//! - File named by ROUNDTRIP_CONFIG
//! - ROUNDTRIP_* environment variables (e.g. ROUNDTRIP_SLA_BOUND_MS=5000)
//! - PROMPT environment variable, for the prompt only

use crate::harness::DEFAULT_PROMPT;
use crate::target::{Target, DEFAULT_GENERATE_URL, DEFAULT_MODEL};
use config::builder::DefaultState;
use config::{Config, ConfigBuilder, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Prefix for environment overrides.
pub const ENV_PREFIX: &str = "ROUNDTRIP";

/// Settings for a load run and the worker around it.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct HarnessConfig {
    /// Generation endpoint used when no agent is discovered.
    pub generate_url: String,

    /// Model identity sent to the generation endpoint.
    pub model: String,

    /// Prompt sent by every unit.
    pub prompt: String,

    /// Number of concurrent units (N).
    pub concurrency: usize,

    /// Per-call timeout in milliseconds.
    pub call_timeout_ms: u64,

    /// Maximum acceptable round trip in milliseconds.
    pub sla_bound_ms: u64,

    /// Optional cap on units in a call at once.
    #[serde(default)]
    pub max_in_flight: Option<usize>,

    /// Agent listing endpoint; when set the target is discovered there.
    #[serde(default)]
    pub agents_url: Option<String>,

    /// Name of the agent to target on the listing endpoint.
    pub agent_role: String,

    /// Listen address for the /metrics endpoint.
    pub metrics_addr: String,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            generate_url: DEFAULT_GENERATE_URL.to_string(),
            model: DEFAULT_MODEL.to_string(),
            prompt: DEFAULT_PROMPT.to_string(),
            concurrency: 100,
            call_timeout_ms: 30_000,
            sla_bound_ms: 5_000,
            max_in_flight: None,
            agents_url: None,
            agent_role: "Coder".to_string(),
            metrics_addr: "0.0.0.0:9100".to_string(),
        }
    }
}

impl HarnessConfig {
    /// Load configuration from files and environment.
    pub fn load() -> Result<Self, ConfigError> {
        let mut builder = Self::defaults()?
            .add_source(File::with_name("/etc/roundtrip/roundtrip").required(false))
            .add_source(File::with_name("./config/roundtrip").required(false));

        if let Ok(config_path) = std::env::var("ROUNDTRIP_CONFIG") {
            builder = builder.add_source(File::with_name(&config_path).required(false));
        }

        builder = builder.add_source(
            Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        Self::from_builder(builder, std::env::var("PROMPT").ok())
    }

    /// Builder pre-populated with default values.
    pub fn defaults() -> Result<ConfigBuilder<DefaultState>, ConfigError> {
        let d = Self::default();
        Config::builder()
            .set_default("generate_url", d.generate_url)?
            .set_default("model", d.model)?
            .set_default("prompt", d.prompt)?
            .set_default("concurrency", d.concurrency as u64)?
            .set_default("call_timeout_ms", d.call_timeout_ms)?
            .set_default("sla_bound_ms", d.sla_bound_ms)?
            .set_default("agent_role", d.agent_role)?
            .set_default("metrics_addr", d.metrics_addr)
    }

    /// Build, apply the prompt override and validate.
    ///
    /// An empty prompt, from any source, falls back to the default prompt.
    pub fn from_builder(
        builder: ConfigBuilder<DefaultState>,
        prompt_override: Option<String>,
    ) -> Result<Self, ConfigError> {
        let mut config: HarnessConfig = builder.build()?.try_deserialize()?;

        if let Some(prompt) = prompt_override.filter(|p| !p.is_empty()) {
            config.prompt = prompt;
        }
        if config.prompt.is_empty() {
            config.prompt = DEFAULT_PROMPT.to_string();
        }

        config.validate()?;
        Ok(config)
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.concurrency == 0 {
            return Err(ConfigError::Message("concurrency must be > 0".to_string()));
        }

        if self.call_timeout_ms == 0 {
            return Err(ConfigError::Message("call_timeout_ms must be > 0".to_string()));
        }

        if self.sla_bound_ms == 0 {
            return Err(ConfigError::Message("sla_bound_ms must be > 0".to_string()));
        }

        if self.max_in_flight == Some(0) {
            return Err(ConfigError::Message("max_in_flight must be > 0".to_string()));
        }

        if self.generate_url.is_empty() {
            return Err(ConfigError::Message("generate_url cannot be empty".to_string()));
        }

        if matches!(&self.agents_url, Some(url) if url.is_empty()) {
            return Err(ConfigError::Message("agents_url cannot be empty".to_string()));
        }

        Ok(())
    }

    pub fn call_timeout(&self) -> Duration {
        Duration::from_millis(self.call_timeout_ms)
    }

    pub fn sla_bound(&self) -> Duration {
        Duration::from_millis(self.sla_bound_ms)
    }

    /// Direct generation target built from `generate_url` and `model`.
    pub fn generate_target(&self) -> Target {
        Target::generate(&self.generate_url, &self.model)
    }
}

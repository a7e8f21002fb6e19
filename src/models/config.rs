//! Configuration models for mobgen.
//!
//! All I^R (resolvable ignorance) is parameterized here and loaded from TOML.
//! The coordinator itself never reads the file: it receives the
//! `WorkflowConfig` and `OutputConfig` sections by value.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Top-level configuration for mobgen.
///
/// I^R resolved: every tunable of a run is an explicit field.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Chat-completion endpoint used by the inference services
    #[serde(default)]
    pub llm: LlmConfig,

    /// Geocoding lookup settings
    #[serde(default)]
    pub geocoding: GeocodingConfig,

    /// Retry loop and timeout settings
    #[serde(default)]
    pub workflow: WorkflowConfig,

    /// Defaults attached to the trace-engine parameter block
    #[serde(default)]
    pub output: OutputConfig,
}

/// OpenAI-compatible endpoint configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    /// API key (can also be set via the env var named in `api_key_env`)
    #[serde(default)]
    pub api_key: Option<String>,

    /// Environment variable name for API key
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,

    /// Base URL for the chat completions API
    #[serde(default = "default_llm_base_url")]
    pub base_url: String,

    /// Per-request timeout in seconds; must stay below the branch timeout
    #[serde(default = "default_llm_timeout")]
    pub timeout_secs: u64,

    /// Maximum transport-level retries per request
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Model used for every inference call
    #[serde(default)]
    pub model: ModelSpec,
}

fn default_api_key_env() -> String {
    "GROQ_API_KEY".to_string()
}

fn default_llm_base_url() -> String {
    "https://api.groq.com/openai/v1".to_string()
}

fn default_llm_timeout() -> u64 {
    10
}

fn default_max_retries() -> u32 {
    3
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            api_key_env: default_api_key_env(),
            base_url: default_llm_base_url(),
            timeout_secs: default_llm_timeout(),
            max_retries: default_max_retries(),
            model: ModelSpec::default(),
        }
    }
}

/// Specification for a model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelSpec {
    /// Model ID as known to the endpoint
    #[serde(default = "default_model_id")]
    pub id: String,

    /// Maximum tokens per completion
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    /// Sampling temperature; structured output wants this low
    #[serde(default)]
    pub temperature: f64,
}

fn default_model_id() -> String {
    "llama-3.1-70b-versatile".to_string()
}

fn default_max_tokens() -> u32 {
    2048
}

impl Default for ModelSpec {
    fn default() -> Self {
        Self {
            id: default_model_id(),
            max_tokens: default_max_tokens(),
            temperature: 0.0,
        }
    }
}

/// Geocoding configuration (Nominatim-compatible search API).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeocodingConfig {
    /// Base URL of the search API
    #[serde(default = "default_geocoding_base_url")]
    pub base_url: String,

    /// User agent sent with every lookup (Nominatim requires one)
    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    /// Half-size of the bounding box around the resolved center, in km
    #[serde(default = "default_bounds_size_km")]
    pub bounds_size_km: f64,

    /// Request timeout in seconds
    #[serde(default = "default_geocoding_timeout")]
    pub timeout_secs: u64,

    /// Whether lookups are cached
    #[serde(default = "default_true")]
    pub cache_enabled: bool,

    /// Cache entry lifetime in seconds
    #[serde(default = "default_cache_ttl")]
    pub cache_ttl_secs: u64,
}

fn default_geocoding_base_url() -> String {
    "https://nominatim.openstreetmap.org".to_string()
}

fn default_user_agent() -> String {
    "mobgen".to_string()
}

fn default_bounds_size_km() -> f64 {
    5.0
}

fn default_geocoding_timeout() -> u64 {
    10
}

fn default_cache_ttl() -> u64 {
    3600
}

fn default_true() -> bool {
    true
}

impl Default for GeocodingConfig {
    fn default() -> Self {
        Self {
            base_url: default_geocoding_base_url(),
            user_agent: default_user_agent(),
            bounds_size_km: default_bounds_size_km(),
            timeout_secs: default_geocoding_timeout(),
            cache_enabled: true,
            cache_ttl_secs: default_cache_ttl(),
        }
    }
}

impl GeocodingConfig {
    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs)
    }
}

/// Settings injected into the coordinator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowConfig {
    /// Additional validation attempts allowed after the first
    #[serde(default = "default_retry_bound")]
    pub retry_bound: u32,

    /// Timeout applied to every external call (extraction, each branch, each suggestion)
    #[serde(default = "default_branch_timeout")]
    pub branch_timeout_secs: u64,

    /// Tolerance for the distribution sum check
    #[serde(default = "default_tolerance")]
    pub tolerance_epsilon: f64,

    /// Ask the advisory service to correct soft-only outcomes too
    #[serde(default)]
    pub retry_on_warnings: bool,

    /// Tick count used when the query does not state one
    #[serde(default = "default_num_ticks")]
    pub default_num_ticks: u32,

    /// Entity count used when neither the query nor the inference step give one
    #[serde(default = "default_entity_count")]
    pub default_entity_count: u32,
}

fn default_retry_bound() -> u32 {
    2
}

fn default_branch_timeout() -> u64 {
    30
}

fn default_tolerance() -> f64 {
    1e-6
}

fn default_num_ticks() -> u32 {
    50
}

fn default_entity_count() -> u32 {
    100
}

impl Default for WorkflowConfig {
    fn default() -> Self {
        Self {
            retry_bound: default_retry_bound(),
            branch_timeout_secs: default_branch_timeout(),
            tolerance_epsilon: default_tolerance(),
            retry_on_warnings: false,
            default_num_ticks: default_num_ticks(),
            default_entity_count: default_entity_count(),
        }
    }
}

impl WorkflowConfig {
    pub fn branch_timeout(&self) -> Duration {
        Duration::from_secs(self.branch_timeout_secs)
    }
}

/// Fixed values the trace engine expects alongside the inferred parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputConfig {
    #[serde(default = "default_simulation_duration")]
    pub simulation_duration_secs: u64,

    #[serde(default = "default_tick_interval")]
    pub tick_interval_secs: f64,

    #[serde(default = "default_num_batches")]
    pub num_batches: u32,

    #[serde(default = "default_rng_seed")]
    pub rng_seed: u64,

    /// Grid x-dimension in meters
    #[serde(default = "default_grid_dims")]
    pub lon_x_dims: u32,

    /// Grid y-dimension in meters
    #[serde(default = "default_grid_dims")]
    pub lon_y_dims: u32,
}

fn default_simulation_duration() -> u64 {
    3600
}

fn default_tick_interval() -> f64 {
    0.01
}

fn default_num_batches() -> u32 {
    1
}

fn default_rng_seed() -> u64 {
    42
}

fn default_grid_dims() -> u32 {
    100
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            simulation_duration_secs: default_simulation_duration(),
            tick_interval_secs: default_tick_interval(),
            num_batches: default_num_batches(),
            rng_seed: default_rng_seed(),
            lon_x_dims: default_grid_dims(),
            lon_y_dims: default_grid_dims(),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn from_file(path: &std::path::Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::FileRead {
            path: path.to_owned(),
            source: e,
        })?;

        Self::from_toml_str(&content).map_err(|e| ConfigError::Parse {
            path: path.to_owned(),
            source: e,
        })
    }

    /// Parse configuration from TOML text.
    pub fn from_toml_str(content: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(content)
    }

    /// Resolve the LLM API key from config or environment.
    pub fn resolve_api_key(&self) -> Result<String, ConfigError> {
        if let Some(key) = &self.llm.api_key {
            return Ok(expand_env_vars(key));
        }

        std::env::var(&self.llm.api_key_env).map_err(|_| ConfigError::MissingApiKey {
            env_var: self.llm.api_key_env.clone(),
        })
    }

    /// Check values the TOML types cannot express.
    ///
    /// K_i: one HTTP request always fits inside one branch timeout.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.workflow.tolerance_epsilon > 0.0 && self.workflow.tolerance_epsilon < 1.0) {
            return Err(ConfigError::Invalid(format!(
                "workflow.tolerance_epsilon must be in (0, 1), got {}",
                self.workflow.tolerance_epsilon
            )));
        }
        if self.workflow.branch_timeout_secs == 0 {
            return Err(ConfigError::Invalid(
                "workflow.branch_timeout_secs must be positive".to_string(),
            ));
        }
        // Transport retries run inside one branch, so a single request must fit in it.
        if self.llm.timeout_secs >= self.workflow.branch_timeout_secs {
            return Err(ConfigError::Invalid(format!(
                "llm.timeout_secs ({}) must be below workflow.branch_timeout_secs ({})",
                self.llm.timeout_secs, self.workflow.branch_timeout_secs
            )));
        }
        if self.geocoding.timeout_secs >= self.workflow.branch_timeout_secs {
            return Err(ConfigError::Invalid(format!(
                "geocoding.timeout_secs ({}) must be below workflow.branch_timeout_secs ({})",
                self.geocoding.timeout_secs, self.workflow.branch_timeout_secs
            )));
        }
        if self.workflow.default_num_ticks == 0 || self.workflow.default_entity_count == 0 {
            return Err(ConfigError::Invalid(
                "workflow defaults for ticks and entity count must be positive".to_string(),
            ));
        }
        if self.geocoding.bounds_size_km <= 0.0 {
            return Err(ConfigError::Invalid(format!(
                "geocoding.bounds_size_km must be positive, got {}",
                self.geocoding.bounds_size_km
            )));
        }
        Ok(())
    }
}

/// Expand environment variables in a string.
///
/// Supports ${VAR_NAME} syntax.
/// If the variable is not set, the placeholder is left unchanged.
pub fn expand_env_vars(s: &str) -> String {
    let Ok(re) = regex::Regex::new(r"\$\{([^}]+)\}") else {
        return s.to_string();
    };

    let mut result = s.to_string();
    for cap in re.captures_iter(s) {
        if let Ok(value) = std::env::var(&cap[1]) {
            result = result.replace(&cap[0], &value);
        }
    }
    result
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    FileRead {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error("Missing API key: set {env_var} env var or llm.api_key in config")]
    MissingApiKey { env_var: String },

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_config_uses_defaults() {
        let config = Config::from_toml_str("").unwrap();
        assert_eq!(config.workflow.retry_bound, 2);
        assert_eq!(config.workflow.branch_timeout(), Duration::from_secs(30));
        assert_eq!(config.workflow.tolerance_epsilon, 1e-6);
        assert!(!config.workflow.retry_on_warnings);
        assert_eq!(config.output.rng_seed, 42);
        assert!(config.geocoding.cache_enabled);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_sections_override() {
        let config = Config::from_toml_str(
            r#"
[workflow]
retry_bound = 4
retry_on_warnings = true

[llm.model]
id = "local-model"
"#,
        )
        .unwrap();
        assert_eq!(config.workflow.retry_bound, 4);
        assert!(config.workflow.retry_on_warnings);
        assert_eq!(config.workflow.default_num_ticks, 50);
        assert_eq!(config.llm.model.id, "local-model");
        assert_eq!(config.llm.model.max_tokens, 2048);
    }

    #[test]
    fn test_validate_rejects_bad_tolerance() {
        let mut config = Config::default();
        config.workflow.tolerance_epsilon = 0.0;
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_validate_rejects_request_timeout_not_below_branch_timeout() {
        let mut config = Config::default();
        assert!(config.llm.timeout_secs < config.workflow.branch_timeout_secs);

        config.llm.timeout_secs = 60;
        match config.validate() {
            Err(ConfigError::Invalid(msg)) => assert!(msg.contains("llm.timeout_secs")),
            other => panic!("expected invalid config, got {other:?}"),
        }

        config.llm.timeout_secs = 30;
        assert!(config.validate().is_err());

        config.workflow.branch_timeout_secs = 90;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_explicit_api_key_wins() {
        let mut config = Config::default();
        config.llm.api_key = Some("literal-key".to_string());
        assert_eq!(config.resolve_api_key().unwrap(), "literal-key");
    }

    #[test]
    fn test_expand_env_vars_leaves_unknown_placeholders() {
        let out = expand_env_vars("prefix-${MOBGEN_SURELY_UNSET_VAR}");
        assert_eq!(out, "prefix-${MOBGEN_SURELY_UNSET_VAR}");
    }
}

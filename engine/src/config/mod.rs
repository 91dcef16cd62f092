//! Configuration management
//!
//! This module handles loading and validation of the SkillPath configuration.
//! Configuration is stored in TOML format; every section has usable defaults
//! so an empty file (or no file at all) yields a runnable local setup.
//!
//! # Configuration Sections
//!
//! - **core**: Log level
//! - **server**: Bind address and overall request deadline
//! - **retrieval**: Semantic-search collaborator (endpoint, collection, limits)
//! - **reasoning**: LLM collaborator (endpoint, model)
//! - **tools**: Tool gateway (endpoint, per-skill course cap)
//! - **sandbox**: Code-execution collaborator (endpoint, retry policy)
//! - **trace**: Tracing sink (optional endpoint, project name)
//!
//! # Credentials
//!
//! API keys are never stored in the TOML file. They are resolved from
//! environment variables at load time (`RETRIEVAL_API_KEY`, `REASONING_API_KEY`,
//! `TOOLS_API_KEY`, `SANDBOX_API_KEY`, `TRACE_API_KEY`); a missing variable
//! leaves the key unset and the client degrades per its failure policy.

use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

/// Errors that can occur while loading or validating configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub core: CoreConfig,

    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub retrieval: RetrievalConfig,

    #[serde(default)]
    pub reasoning: ReasoningConfig,

    #[serde(default)]
    pub tools: ToolsConfig,

    #[serde(default)]
    pub sandbox: SandboxConfig,

    #[serde(default)]
    pub trace: TraceConfig,
}

/// Core engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoreConfig {
    /// Log level (error, warn, info, debug, trace)
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

/// Inbound HTTP server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Bind address for the API server
    #[serde(default = "default_bind")]
    pub bind: String,

    /// Parent-level deadline for a whole request, in seconds. When it fires,
    /// all in-flight collaborator calls are cancelled.
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

/// Semantic retrieval collaborator configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievalConfig {
    #[serde(default = "default_retrieval_url")]
    pub base_url: String,

    /// Knowledge collection to query
    #[serde(default = "default_collection")]
    pub collection: String,

    /// Maximum documents per query
    #[serde(default = "default_retrieval_limit")]
    pub limit: usize,

    /// Minimum similarity score; results below it are dropped
    #[serde(default = "default_min_score")]
    pub min_score: f64,

    #[serde(default = "default_retrieval_timeout")]
    pub timeout_secs: u64,

    /// Resolved from RETRIEVAL_API_KEY, never from the file
    #[serde(skip)]
    pub api_key: Option<String>,
}

/// Reasoning (LLM) collaborator configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReasoningConfig {
    /// Base URL of an OpenAI-compatible chat completion endpoint
    #[serde(default = "default_reasoning_url")]
    pub base_url: String,

    #[serde(default = "default_model")]
    pub model: String,

    #[serde(default = "default_reasoning_timeout")]
    pub timeout_secs: u64,

    /// Resolved from REASONING_API_KEY, never from the file
    #[serde(skip)]
    pub api_key: Option<String>,
}

/// Tool gateway configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolsConfig {
    #[serde(default = "default_tools_url")]
    pub base_url: String,

    /// Per-call timeout for each concurrent course fetch
    #[serde(default = "default_tools_timeout")]
    pub timeout_secs: u64,

    /// Upper bound on courses returned per skill
    #[serde(default = "default_max_courses")]
    pub max_courses_per_skill: usize,

    /// Resolved from TOOLS_API_KEY, never from the file
    #[serde(skip)]
    pub api_key: Option<String>,
}

/// Sandbox collaborator configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SandboxConfig {
    #[serde(default = "default_sandbox_url")]
    pub base_url: String,

    /// Hard wall-clock timeout for snippet execution
    #[serde(default = "default_sandbox_timeout")]
    pub timeout_secs: u64,

    /// Retries for sandbox provisioning (auth failures are never retried)
    #[serde(default = "default_provision_retries")]
    pub provision_retries: u32,

    /// Resolved from SANDBOX_API_KEY, never from the file
    #[serde(skip)]
    pub api_key: Option<String>,
}

/// Tracing sink configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TraceConfig {
    /// External sink endpoint; when unset, traces stay in process memory
    #[serde(default)]
    pub endpoint: Option<String>,

    #[serde(default = "default_project")]
    pub project: String,

    /// Resolved from TRACE_API_KEY, never from the file
    #[serde(skip)]
    pub api_key: Option<String>,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_bind() -> String {
    "127.0.0.1:8000".to_string()
}

fn default_request_timeout() -> u64 {
    60
}

fn default_retrieval_url() -> String {
    "http://localhost:8080".to_string()
}

fn default_collection() -> String {
    "JobKnowledge".to_string()
}

fn default_retrieval_limit() -> usize {
    5
}

fn default_min_score() -> f64 {
    0.7
}

fn default_retrieval_timeout() -> u64 {
    5
}

fn default_reasoning_url() -> String {
    "https://api.friendli.ai/serverless/v1".to_string()
}

fn default_model() -> String {
    "meta-llama-3.1-8b-instruct".to_string()
}

fn default_reasoning_timeout() -> u64 {
    15
}

fn default_tools_url() -> String {
    "http://localhost:8090".to_string()
}

fn default_tools_timeout() -> u64 {
    5
}

fn default_max_courses() -> usize {
    5
}

fn default_sandbox_url() -> String {
    "http://localhost:8070".to_string()
}

fn default_sandbox_timeout() -> u64 {
    30
}

fn default_provision_retries() -> u32 {
    1
}

fn default_project() -> String {
    "skillpath".to_string()
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            request_timeout_secs: default_request_timeout(),
        }
    }
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            base_url: default_retrieval_url(),
            collection: default_collection(),
            limit: default_retrieval_limit(),
            min_score: default_min_score(),
            timeout_secs: default_retrieval_timeout(),
            api_key: None,
        }
    }
}

impl Default for ReasoningConfig {
    fn default() -> Self {
        Self {
            base_url: default_reasoning_url(),
            model: default_model(),
            timeout_secs: default_reasoning_timeout(),
            api_key: None,
        }
    }
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            base_url: default_tools_url(),
            timeout_secs: default_tools_timeout(),
            max_courses_per_skill: default_max_courses(),
            api_key: None,
        }
    }
}

impl Default for SandboxConfig {
    fn default() -> Self {
        Self {
            base_url: default_sandbox_url(),
            timeout_secs: default_sandbox_timeout(),
            provision_retries: default_provision_retries(),
            api_key: None,
        }
    }
}

impl Default for TraceConfig {
    fn default() -> Self {
        Self {
            endpoint: None,
            project: default_project(),
            api_key: None,
        }
    }
}

impl Config {
    /// Load configuration from a TOML file, then resolve credentials from the
    /// environment and validate.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path)?;
        let mut config: Config = toml::from_str(&raw)?;
        config.resolve_credentials();
        config.validate()?;
        Ok(config)
    }

    /// Load from the given path if present, otherwise fall back to defaults.
    pub fn load_or_default(path: Option<&Path>) -> Result<Self, ConfigError> {
        match path {
            Some(p) if p.exists() => Self::load(p),
            Some(p) => {
                tracing::warn!("Config file {:?} not found, using defaults", p);
                Ok(Self::with_env_credentials())
            }
            None => Ok(Self::with_env_credentials()),
        }
    }

    /// Default configuration with credentials resolved from the environment.
    pub fn with_env_credentials() -> Self {
        let mut config = Config::default();
        config.resolve_credentials();
        config
    }

    fn resolve_credentials(&mut self) {
        self.retrieval.api_key = env_opt("RETRIEVAL_API_KEY");
        self.reasoning.api_key = env_opt("REASONING_API_KEY");
        self.tools.api_key = env_opt("TOOLS_API_KEY");
        self.sandbox.api_key = env_opt("SANDBOX_API_KEY");
        self.trace.api_key = env_opt("TRACE_API_KEY");
    }

    /// Validate value ranges that serde defaults cannot enforce.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(0.0..=1.0).contains(&self.retrieval.min_score) {
            return Err(ConfigError::Invalid(format!(
                "retrieval.min_score must be within [0.0, 1.0], got {}",
                self.retrieval.min_score
            )));
        }
        if self.retrieval.limit == 0 {
            return Err(ConfigError::Invalid(
                "retrieval.limit must be at least 1".to_string(),
            ));
        }
        if self.tools.max_courses_per_skill == 0 {
            return Err(ConfigError::Invalid(
                "tools.max_courses_per_skill must be at least 1".to_string(),
            ));
        }
        for (name, secs) in [
            ("retrieval.timeout_secs", self.retrieval.timeout_secs),
            ("reasoning.timeout_secs", self.reasoning.timeout_secs),
            ("tools.timeout_secs", self.tools.timeout_secs),
            ("sandbox.timeout_secs", self.sandbox.timeout_secs),
            ("server.request_timeout_secs", self.server.request_timeout_secs),
        ] {
            if secs == 0 {
                return Err(ConfigError::Invalid(format!("{} must be nonzero", name)));
            }
        }
        Ok(())
    }
}

fn env_opt(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.is_empty())
}

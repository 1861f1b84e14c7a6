//! Configuration for the triage router
//!
//! Loaded from a TOML file when one is present, otherwise assembled from the
//! Azure-style environment variables (`AZURE_OPENAI_ENDPOINT`, `PORT`, ...).
//! Secrets are never stored in the file; `api_key_env` names the variable
//! that holds them and is resolved at startup.

use crate::triage::AgentLabel;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::warn;

/// Default locations searched when no `--config` is given
pub const DEFAULT_CONFIG_PATHS: &[&str] = &["router.toml", "config/router.toml"];

const DEFAULT_FRONTEND_URL: &str = "http://localhost:8501";

/// Main router configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RouterConfig {
    #[serde(default)]
    pub server: ServerSection,
    pub llm: LlmSection,
    #[serde(default)]
    pub triage: TriageSection,
    #[serde(default)]
    pub chat: ChatSection,
    /// Per-agent overrides keyed by label (`technical-support`, ...)
    #[serde(default)]
    pub agents: HashMap<String, AgentSection>,
}

/// HTTP server section
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ServerSection {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// `development` or `production`; production adds HSTS and the Host check
    #[serde(default = "default_environment")]
    pub environment: String,
    /// Primary browser origin allowed by CORS
    pub frontend_url: Option<String>,
    /// Additional CORS origins
    #[serde(default)]
    pub cors_origins: Vec<String>,
    /// Host names accepted in production; `*` and `*.example.com` patterns
    /// are allowed. Empty means `localhost`.
    #[serde(default)]
    pub allowed_hosts: Vec<String>,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8000
}

fn default_environment() -> String {
    "development".to_string()
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            environment: default_environment(),
            frontend_url: None,
            cors_origins: Vec::new(),
            allowed_hosts: Vec::new(),
        }
    }
}

impl ServerSection {
    pub fn is_production(&self) -> bool {
        self.environment.eq_ignore_ascii_case("production")
    }

    /// Host names the production Host check accepts: the configured
    /// hosts (or `localhost`) plus the frontend's host
    pub fn trusted_hosts(&self) -> Vec<String> {
        let mut hosts: Vec<String> = if self.allowed_hosts.is_empty() {
            vec!["localhost".to_string()]
        } else {
            self.allowed_hosts
                .iter()
                .map(|h| h.trim().to_ascii_lowercase())
                .filter(|h| !h.is_empty())
                .collect()
        };
        let frontend_host = self
            .frontend_url
            .as_deref()
            .and_then(|raw| url::Url::parse(raw).ok())
            .and_then(|url| url.host_str().map(str::to_ascii_lowercase));
        if let Some(host) = frontend_host {
            if !hosts.contains(&host) {
                hosts.push(host);
            }
        }
        hosts
    }

    /// Origins allowed by CORS, deduplicated, in insertion order
    pub fn allowed_origins(&self) -> Vec<String> {
        let mut origins = vec![self
            .frontend_url
            .clone()
            .unwrap_or_else(|| DEFAULT_FRONTEND_URL.to_string())];
        origins.extend(self.cors_origins.iter().cloned());
        if self.environment.eq_ignore_ascii_case("development") {
            origins.push(DEFAULT_FRONTEND_URL.to_string());
            origins.push("http://127.0.0.1:8501".to_string());
        }

        let mut seen = Vec::with_capacity(origins.len());
        for origin in origins {
            let origin = origin.trim_end_matches('/').to_string();
            if !seen.contains(&origin) {
                seen.push(origin);
            }
        }
        seen
    }
}

/// Hosted model API flavour
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    Azure,
    OpenAi,
}

/// Hosted model section
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LlmSection {
    #[serde(default = "default_provider")]
    pub provider: ProviderKind,
    /// Azure resource endpoint, or the OpenAI base URL
    pub endpoint: String,
    /// Environment variable containing the API key
    pub api_key_env: String,
    /// Model name, or deployment name for Azure
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_api_version")]
    pub api_version: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Transport-level retries inside the client. The router's own
    /// classifier retry is configured under `[triage]`.
    #[serde(default)]
    pub max_retries: u32,
}

fn default_provider() -> ProviderKind {
    ProviderKind::Azure
}

fn default_model() -> String {
    "gpt-4".to_string()
}

fn default_api_version() -> String {
    "2024-10-21".to_string()
}

fn default_timeout_secs() -> u64 {
    60
}

/// Triage strategy selection
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum TriageStrategy {
    /// Ask the hosted model
    #[default]
    Llm,
    /// Deterministic keyword rules
    Keyword,
    /// Always the same agent (agentless mode)
    Fixed,
}

impl TriageStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            TriageStrategy::Llm => "llm",
            TriageStrategy::Keyword => "keyword",
            TriageStrategy::Fixed => "fixed",
        }
    }
}

impl std::str::FromStr for TriageStrategy {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "llm" => Ok(TriageStrategy::Llm),
            "keyword" => Ok(TriageStrategy::Keyword),
            "fixed" => Ok(TriageStrategy::Fixed),
            other => Err(ConfigError::InvalidConfig(format!(
                "Unknown triage strategy '{other}' (expected llm, keyword or fixed)"
            ))),
        }
    }
}

/// Triage section
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TriageSection {
    #[serde(default)]
    pub strategy: TriageStrategy,
    /// Model used for classification; defaults to `llm.model`
    pub model: Option<String>,
    /// Agent used by the fixed strategy
    #[serde(default)]
    pub fixed_agent: AgentLabel,
    #[serde(default)]
    pub temperature: f32,
    /// Retries after the first failed classification
    #[serde(default = "default_triage_retries")]
    pub max_retries: u32,
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,
    /// Per-attempt classification timeout
    #[serde(default = "default_triage_timeout_secs")]
    pub timeout_secs: u64,
    /// Earlier turns shown to the classifier
    #[serde(default = "default_triage_history_window")]
    pub history_window: usize,
    /// Send the decision schema as a `json_schema` response format instead
    /// of plain JSON mode; needs a model with structured-output support
    #[serde(default)]
    pub structured_output: bool,
}

fn default_triage_retries() -> u32 {
    1
}

fn default_retry_delay_ms() -> u64 {
    250
}

fn default_triage_timeout_secs() -> u64 {
    15
}

fn default_triage_history_window() -> usize {
    6
}

impl Default for TriageSection {
    fn default() -> Self {
        Self {
            strategy: TriageStrategy::default(),
            model: None,
            fixed_agent: AgentLabel::DEFAULT,
            temperature: 0.0,
            max_retries: default_triage_retries(),
            retry_delay_ms: default_retry_delay_ms(),
            timeout_secs: default_triage_timeout_secs(),
            history_window: default_triage_history_window(),
            structured_output: false,
        }
    }
}

/// Chat section
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChatSection {
    /// Earlier turns forwarded to the agent as context
    #[serde(default = "default_chat_history_window")]
    pub history_window: usize,
    /// Longest gap allowed between upstream chunks
    #[serde(default = "default_stream_idle_timeout_secs")]
    pub stream_idle_timeout_secs: u64,
    /// Maximum accepted message length in characters
    #[serde(default = "default_max_message_chars")]
    pub max_message_chars: usize,
}

fn default_chat_history_window() -> usize {
    20
}

fn default_stream_idle_timeout_secs() -> u64 {
    60
}

fn default_max_message_chars() -> usize {
    8000
}

impl Default for ChatSection {
    fn default() -> Self {
        Self {
            history_window: default_chat_history_window(),
            stream_idle_timeout_secs: default_stream_idle_timeout_secs(),
            max_message_chars: default_max_message_chars(),
        }
    }
}

/// Per-agent overrides
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct AgentSection {
    pub name: Option<String>,
    pub instructions: Option<String>,
    /// Model or deployment override
    pub model: Option<String>,
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
}

/// Configuration loading errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    FileRead(#[from] std::io::Error),
    #[error("Failed to parse TOML: {0}")]
    TomlParse(#[from] toml::de::Error),
    #[error("Environment variable not found: {0}")]
    EnvVarNotFound(String),
    #[error("Invalid URL '{url}': {reason}")]
    InvalidUrl { url: String, reason: String },
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl RouterConfig {
    /// Load configuration from a TOML file
    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    /// Parse and validate TOML content
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: RouterConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Resolve configuration: explicit file, then default paths, then environment
    pub fn load(explicit: Option<&Path>) -> Result<(Self, ConfigSource), ConfigError> {
        if let Some(path) = explicit {
            return Ok((
                Self::load_from_file(path)?,
                ConfigSource::File(path.to_path_buf()),
            ));
        }

        for candidate in DEFAULT_CONFIG_PATHS {
            let path = Path::new(candidate);
            if path.exists() {
                return Ok((
                    Self::load_from_file(path)?,
                    ConfigSource::File(path.to_path_buf()),
                ));
            }
        }

        Ok((Self::from_env()?, ConfigSource::Environment))
    }

    /// Build configuration from process environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_env_with(|name| std::env::var(name).ok())
    }

    /// Build configuration from an arbitrary variable lookup
    pub fn from_env_with<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        let endpoint = get("AZURE_OPENAI_ENDPOINT")
            .ok_or_else(|| ConfigError::EnvVarNotFound("AZURE_OPENAI_ENDPOINT".to_string()))?;

        let port = match get("PORT") {
            Some(raw) => raw.trim().parse::<u16>().map_err(|_| {
                ConfigError::InvalidConfig(format!("PORT must be a port number, got '{raw}'"))
            })?,
            None => default_port(),
        };

        let mut triage = TriageSection::default();
        if let Some(strategy) = get("TRIAGE_STRATEGY") {
            triage.strategy = strategy.parse()?;
        } else if let Some(flag) = get("USE_AZURE_AI_AGENT") {
            if !is_truthy(&flag) {
                triage.strategy = TriageStrategy::Fixed;
            }
        }
        if let Some(agent) = get("TRIAGE_FIXED_AGENT") {
            triage.fixed_agent = agent
                .parse()
                .map_err(|e| ConfigError::InvalidConfig(format!("TRIAGE_FIXED_AGENT: {e}")))?;
        }

        let config = RouterConfig {
            server: ServerSection {
                port,
                environment: get("ENVIRONMENT").unwrap_or_else(default_environment),
                frontend_url: get("FRONTEND_URL"),
                allowed_hosts: get("ALLOWED_HOST")
                    .map(|host| vec![host.trim().to_string()])
                    .unwrap_or_default(),
                ..Default::default()
            },
            llm: LlmSection {
                provider: ProviderKind::Azure,
                endpoint,
                api_key_env: "AZURE_OPENAI_API_KEY".to_string(),
                model: get("AZURE_OPENAI_DEPLOYMENT_NAME").unwrap_or_else(default_model),
                api_version: get("AZURE_OPENAI_API_VERSION").unwrap_or_else(default_api_version),
                timeout_secs: default_timeout_secs(),
                max_retries: 0,
            },
            triage,
            chat: ChatSection::default(),
            agents: HashMap::new(),
        };

        config.validate()?;
        Ok(config)
    }

    /// Check cross-field consistency
    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_url(&self.llm.endpoint)?;
        if let Some(frontend) = &self.server.frontend_url {
            validate_url(frontend)?;
        }
        for origin in &self.server.cors_origins {
            validate_url(origin)?;
        }

        if self.llm.api_key_env.trim().is_empty() {
            return Err(ConfigError::InvalidConfig(
                "llm.api_key_env must name an environment variable".to_string(),
            ));
        }
        if self.llm.model.trim().is_empty() {
            return Err(ConfigError::InvalidConfig(
                "llm.model must not be empty".to_string(),
            ));
        }
        if self.llm.timeout_secs == 0 || self.chat.stream_idle_timeout_secs == 0 {
            return Err(ConfigError::InvalidConfig(
                "timeouts must be greater than zero".to_string(),
            ));
        }
        if self.triage.timeout_secs == 0 {
            return Err(ConfigError::InvalidConfig(
                "triage.timeout_secs must be greater than zero".to_string(),
            ));
        }
        if self.chat.max_message_chars == 0 {
            return Err(ConfigError::InvalidConfig(
                "chat.max_message_chars must be greater than zero".to_string(),
            ));
        }
        validate_temperature("triage.temperature", Some(self.triage.temperature))?;
        if self.triage.max_retries > 1 {
            return Err(ConfigError::InvalidConfig(format!(
                "triage.max_retries allows at most one retry, got {}",
                self.triage.max_retries
            )));
        }
        if self.llm.max_retries > 0 && self.triage.strategy == TriageStrategy::Llm {
            warn!(
                llm_max_retries = self.llm.max_retries,
                "llm.max_retries also applies to classification calls; one classification may reach the model more than twice"
            );
        }

        for (key, agent) in &self.agents {
            key.parse::<AgentLabel>()
                .map_err(|e| ConfigError::InvalidConfig(format!("[agents.{key}]: {e}")))?;
            validate_temperature(&format!("agents.{key}.temperature"), agent.temperature)?;
        }

        Ok(())
    }

    /// Override for one agent, if configured
    pub fn agent_override(&self, label: AgentLabel) -> Option<&AgentSection> {
        self.agents
            .iter()
            .find(|(key, _)| key.parse::<AgentLabel>().ok() == Some(label))
            .map(|(_, section)| section)
    }

    /// Model used for classification
    pub fn triage_model(&self) -> &str {
        self.triage.model.as_deref().unwrap_or(&self.llm.model)
    }

    /// Get LLM API key from environment variable
    pub fn get_llm_api_key(&self) -> Result<String, ConfigError> {
        get_env_var_required(&self.llm.api_key_env)
    }

    /// Render as TOML for `config --show`
    pub fn to_toml_string(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self)
            .map_err(|e| ConfigError::InvalidConfig(format!("Failed to render config: {e}")))
    }

    /// Create a test configuration for unit testing
    #[cfg(test)]
    pub fn test_config() -> Self {
        let toml_content = r#"
[llm]
provider = "azure"
endpoint = "https://example.openai.azure.com"
api_key_env = "AZURE_OPENAI_API_KEY"
model = "gpt-4o"

[triage]
retry_delay_ms = 10
"#;
        toml::from_str(toml_content).expect("Test config should parse")
    }
}

/// Where the active configuration came from
#[derive(Debug, Clone, PartialEq)]
pub enum ConfigSource {
    File(PathBuf),
    Environment,
}

impl std::fmt::Display for ConfigSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigSource::File(path) => write!(f, "{}", path.display()),
            ConfigSource::Environment => f.write_str("environment"),
        }
    }
}

fn get_env_var_required(env_var_name: &str) -> Result<String, ConfigError> {
    std::env::var(env_var_name)
        .ok()
        .filter(|v| !v.trim().is_empty())
        .ok_or_else(|| ConfigError::EnvVarNotFound(env_var_name.to_string()))
}

fn is_truthy(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "true" | "1" | "yes" | "on"
    )
}

fn validate_url(raw: &str) -> Result<(), ConfigError> {
    let parsed = url::Url::parse(raw).map_err(|e| ConfigError::InvalidUrl {
        url: raw.to_string(),
        reason: e.to_string(),
    })?;
    match parsed.scheme() {
        "http" | "https" => Ok(()),
        scheme => Err(ConfigError::InvalidUrl {
            url: raw.to_string(),
            reason: format!("unsupported scheme '{scheme}'"),
        }),
    }
}

fn validate_temperature(field: &str, value: Option<f32>) -> Result<(), ConfigError> {
    match value {
        Some(t) if !(0.0..=2.0).contains(&t) => Err(ConfigError::InvalidConfig(format!(
            "{field} must be between 0.0 and 2.0, got {t}"
        ))),
        _ => Ok(()),
    }
}

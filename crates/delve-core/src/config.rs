//! Configuration loading and validation.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{DelveError, Result};

/// Top-level Delve configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<ModelConfig>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub agent: Option<AgentConfig>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub search: Option<SearchConfig>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub fetch: Option<FetchConfig>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub browser: Option<BrowserConfig>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub cache: Option<CacheConfig>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub logging: Option<LoggingConfig>,
}

/// Chat-completions endpoint settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Model name, optionally prefixed with a provider (`"vllm:qwen3-32b"`).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key_env: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,

    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            model: None,
            api_key: None,
            api_key_env: None,
            max_tokens: None,
            temperature: None,
            connect_timeout_secs: default_connect_timeout(),
        }
    }
}

impl ModelConfig {
    pub fn resolve_api_key(&self) -> Option<String> {
        resolve_secret_field(&self.api_key, &self.api_key_env)
    }
}

fn default_base_url() -> String {
    "http://localhost:8000".into()
}

fn default_connect_timeout() -> u64 {
    10
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    /// Start a tool call as soon as its arguments are complete, while the
    /// model keeps streaming.
    #[serde(default = "default_true")]
    pub early_tool_execution: bool,

    #[serde(default = "default_doc_max_iterations")]
    pub doc_max_iterations: u32,

    #[serde(default = "default_synthesis_max_iterations")]
    pub synthesis_max_iterations: u32,

    #[serde(default = "default_max_concurrent_tools")]
    pub max_concurrent_tools: usize,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            early_tool_execution: true,
            doc_max_iterations: default_doc_max_iterations(),
            synthesis_max_iterations: default_synthesis_max_iterations(),
            max_concurrent_tools: default_max_concurrent_tools(),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_doc_max_iterations() -> u32 {
    25
}

fn default_synthesis_max_iterations() -> u32 {
    3
}

fn default_max_concurrent_tools() -> usize {
    8
}

/// Web search backend (SearXNG or Brave).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchConfig {
    /// URL for the search API. Brave is assumed when it points at
    /// `api.search.brave.com`, SearXNG otherwise.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_url: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key_env: Option<String>,

    #[serde(default = "default_max_results")]
    pub max_results: usize,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            api_url: None,
            api_key: None,
            api_key_env: None,
            max_results: default_max_results(),
        }
    }
}

impl SearchConfig {
    pub fn resolve_api_key(&self) -> Option<String> {
        resolve_secret_field(&self.api_key, &self.api_key_env)
    }
}

fn default_max_results() -> usize {
    4
}

/// Settings for one fetch tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TierSettings {
    pub timeout_ms: u64,

    #[serde(default)]
    pub retries: u32,

    #[serde(default)]
    pub retry_delay_ms: u64,

    /// Wait after page load before reading the DOM (render tiers only).
    #[serde(default)]
    pub settle_ms: u64,
}

impl TierSettings {
    pub fn direct() -> Self {
        Self {
            timeout_ms: 30_000,
            retries: 2,
            retry_delay_ms: 1_000,
            settle_ms: 0,
        }
    }

    pub fn render() -> Self {
        Self {
            timeout_ms: 30_000,
            retries: 0,
            retry_delay_ms: 0,
            settle_ms: 1_000,
        }
    }

    pub fn stealth() -> Self {
        Self {
            timeout_ms: 45_000,
            retries: 0,
            retry_delay_ms: 0,
            settle_ms: 2_000,
        }
    }

    pub fn timeout(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.timeout_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetchConfig {
    #[serde(default = "TierSettings::direct")]
    pub direct: TierSettings,

    #[serde(default = "TierSettings::render")]
    pub render: TierSettings,

    #[serde(default = "TierSettings::stealth")]
    pub stealth: TierSettings,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_agent: Option<String>,

    /// Maximum response body size kept by the direct tier.
    #[serde(default = "default_max_bytes")]
    pub max_bytes: usize,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            direct: TierSettings::direct(),
            render: TierSettings::render(),
            stealth: TierSettings::stealth(),
            user_agent: None,
            max_bytes: default_max_bytes(),
        }
    }
}

fn default_max_bytes() -> usize {
    5_000_000
}

/// Headless browser configuration for the render tiers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrowserConfig {
    /// Path to Chrome/Chromium binary (auto-detected if omitted).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub chrome_path: Option<String>,

    #[serde(default = "default_true")]
    pub headless: bool,

    /// Maximum concurrent browser pages per profile.
    #[serde(default = "default_max_pages")]
    pub max_pages: usize,
}

impl Default for BrowserConfig {
    fn default() -> Self {
        Self {
            chrome_path: None,
            headless: true,
            max_pages: default_max_pages(),
        }
    }
}

fn default_max_pages() -> usize {
    4
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CacheConfig {
    /// SQLite database path, or `":memory:"`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log format: "plain" (default) or "json".
    #[serde(default = "default_log_format")]
    pub format: String,

    /// Log level override (trace/debug/info/warn/error).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub level: Option<String>,

    /// Per-crate level directives (e.g. "delve_fetch=debug").
    #[serde(default)]
    pub filters: Vec<String>,
}

fn default_log_format() -> String {
    "plain".into()
}

/// Resolve a secret: check the direct value first, then the env-var reference.
pub fn resolve_secret_field(direct: &Option<String>, env_var: &Option<String>) -> Option<String> {
    if let Some(val) = direct {
        if !val.is_empty() {
            return Some(val.clone());
        }
    }
    if let Some(env) = env_var {
        if let Ok(val) = std::env::var(env) {
            if !val.is_empty() {
                return Some(val);
            }
        }
    }
    None
}

/// Substitute `${ENV_VAR}` patterns with their environment values; unset
/// variables become empty strings.
fn substitute_env_vars(input: &str) -> Result<String> {
    let re = regex::Regex::new(r"\$\{([^}]+)\}").map_err(|e| DelveError::Config(e.to_string()))?;
    Ok(re
        .replace_all(input, |caps: &regex::Captures| {
            std::env::var(&caps[1]).unwrap_or_default()
        })
        .into_owned())
}

/// Split a `"provider:model"` spec, returning the model part.
pub fn model_name(spec: &str) -> &str {
    spec.split_once(':').map(|(_, model)| model).unwrap_or(spec)
}

impl Config {
    /// Load config from a JSON5 file. A missing file yields the defaults.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let raw = std::fs::read_to_string(path)?;
        Self::parse(&raw)
    }

    pub fn parse(raw: &str) -> Result<Self> {
        let substituted = substitute_env_vars(raw)?;
        json5::from_str(&substituted).map_err(|e| DelveError::Config(e.to_string()))
    }

    /// Default config file location: `~/.delve/config.json`.
    pub fn default_path() -> PathBuf {
        data_dir().join("config.json")
    }

    pub fn model_config(&self) -> ModelConfig {
        self.model.clone().unwrap_or_default()
    }

    pub fn agent_config(&self) -> AgentConfig {
        self.agent.clone().unwrap_or_default()
    }

    pub fn search_config(&self) -> SearchConfig {
        self.search.clone().unwrap_or_default()
    }

    pub fn fetch_config(&self) -> FetchConfig {
        self.fetch.clone().unwrap_or_default()
    }

    pub fn browser_config(&self) -> BrowserConfig {
        self.browser.clone().unwrap_or_default()
    }

    /// Model name with any provider prefix removed.
    pub fn model_name(&self) -> Option<&str> {
        self.model
            .as_ref()
            .and_then(|m| m.model.as_deref())
            .map(model_name)
    }

    pub fn max_results(&self) -> usize {
        self.search
            .as_ref()
            .map(|s| s.max_results)
            .unwrap_or_else(default_max_results)
    }

    /// SQLite cache location; `None` means in-memory.
    pub fn cache_path(&self) -> Option<PathBuf> {
        match self.cache.as_ref().and_then(|c| c.path.as_deref()) {
            Some(":memory:") => None,
            Some(path) => Some(PathBuf::from(shellexpand::tilde(path).as_ref())),
            None => Some(data_dir().join("search_cache.db")),
        }
    }

    /// Get a config value by dotted path (e.g. "fetch.direct.timeout_ms").
    pub fn get_path(&self, path: &str) -> Option<serde_json::Value> {
        let json = serde_json::to_value(self).ok()?;
        let mut current = &json;
        for segment in path.split('.') {
            current = current.get(segment)?;
        }
        Some(current.clone())
    }

    /// Validate config, returning (warnings, errors).
    pub fn validate(&self) -> (Vec<String>, Vec<String>) {
        let mut warnings = Vec::new();
        let mut errors = Vec::new();

        let model = self.model_config();
        if self.model_name().is_none_or(str::is_empty) {
            errors.push("No model configured (set model.model)".to_string());
        }
        if model.resolve_api_key().is_none() {
            warnings.push(format!(
                "No API key configured for model endpoint {}",
                model.base_url
            ));
        }

        match &self.search {
            Some(search) if search.api_url.is_some() => {
                if search.max_results == 0 {
                    errors.push("search.max_results must be at least 1".to_string());
                }
            }
            _ => warnings.push("No search backend configured (set search.api_url)".to_string()),
        }

        let fetch = self.fetch_config();
        for (name, tier) in [
            ("direct", fetch.direct),
            ("render", fetch.render),
            ("stealth", fetch.stealth),
        ] {
            if tier.timeout_ms == 0 {
                errors.push(format!("fetch.{name}.timeout_ms cannot be 0"));
            }
        }

        let agent = self.agent_config();
        if agent.doc_max_iterations == 0 || agent.synthesis_max_iterations == 0 {
            errors.push("agent iteration caps must be at least 1".to_string());
        }
        if agent.max_concurrent_tools == 0 {
            errors.push("agent.max_concurrent_tools must be at least 1".to_string());
        }

        (warnings, errors)
    }

    /// Save config to a file.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }
}

/// Base directory for Delve data: `~/.delve/`
pub fn data_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".delve")
}

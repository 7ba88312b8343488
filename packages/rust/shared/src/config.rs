//! Application configuration for docqa.
//!
//! User config lives at `~/.docqa/docqa.toml`.
//! Environment variables override config file values, which override defaults.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{DocQaError, Result};
use crate::types::SearchDepth;

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "docqa.toml";

/// Default config directory name under the user's home.
const CONFIG_DIR_NAME: &str = ".docqa";

/// Upper bound for any timeout, deadline or interval setting (one day).
const MAX_DURATION_SECS: u64 = 86_400;

// ---------------------------------------------------------------------------
// Config structs (matching docqa.toml schema)
// ---------------------------------------------------------------------------

/// Top-level application config, deserialized from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Conversation and loop limits.
    #[serde(default)]
    pub agent: AgentSection,

    /// Web search settings.
    #[serde(default)]
    pub search: SearchSection,

    /// Page retrieval settings.
    #[serde(default)]
    pub scrape: ScrapeSection,

    /// OpenRouter (reasoning) settings.
    #[serde(default)]
    pub openrouter: OpenRouterConfig,

    /// Domain allow-list source.
    #[serde(default)]
    pub domains: DomainsSection,
}

/// `[agent]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentSection {
    /// Name reported in logs and `config show`.
    #[serde(default = "default_instance_name")]
    pub instance_name: String,

    /// Turns of conversation memory kept per session.
    #[serde(default = "default_max_turns")]
    pub max_turns: usize,

    /// Idle time after which a session is forgotten.
    #[serde(default = "default_session_ttl")]
    pub session_ttl_secs: u64,

    /// How often the background sweep removes idle sessions.
    #[serde(default = "default_sweep_interval")]
    pub sweep_interval_secs: u64,

    /// Reasoning calls allowed per question.
    #[serde(default = "default_max_iterations")]
    pub max_iterations: u32,

    /// Wall-clock budget for answering one question.
    #[serde(default = "default_request_deadline")]
    pub request_deadline_secs: u64,

    /// Extra attempts for a reasoning call that timed out or could not connect.
    #[serde(default = "default_reasoning_retries")]
    pub reasoning_retries: u32,
}

impl Default for AgentSection {
    fn default() -> Self {
        Self {
            instance_name: default_instance_name(),
            max_turns: default_max_turns(),
            session_ttl_secs: default_session_ttl(),
            sweep_interval_secs: default_sweep_interval(),
            max_iterations: default_max_iterations(),
            request_deadline_secs: default_request_deadline(),
            reasoning_retries: default_reasoning_retries(),
        }
    }
}

fn default_instance_name() -> String {
    "docqa".into()
}
fn default_max_turns() -> usize {
    5
}
fn default_session_ttl() -> u64 {
    3600
}
fn default_sweep_interval() -> u64 {
    60
}
fn default_max_iterations() -> u32 {
    5
}
fn default_request_deadline() -> u64 {
    120
}
fn default_reasoning_retries() -> u32 {
    1
}

/// `[search]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchSection {
    /// Name of the env var holding the Tavily API key (never store the key itself).
    #[serde(default = "default_search_key_env")]
    pub api_key_env: String,

    #[serde(default = "default_search_base_url")]
    pub base_url: String,

    #[serde(default = "default_max_results")]
    pub max_results: u32,

    #[serde(default)]
    pub depth: SearchDepth,

    /// Byte ceiling for each search snippet.
    #[serde(default = "default_search_ceiling")]
    pub content_ceiling: usize,

    #[serde(default = "default_capability_timeout")]
    pub timeout_secs: u64,
}

impl Default for SearchSection {
    fn default() -> Self {
        Self {
            api_key_env: default_search_key_env(),
            base_url: default_search_base_url(),
            max_results: default_max_results(),
            depth: SearchDepth::default(),
            content_ceiling: default_search_ceiling(),
            timeout_secs: default_capability_timeout(),
        }
    }
}

fn default_search_key_env() -> String {
    "TAVILY_API_KEY".into()
}
fn default_search_base_url() -> String {
    "https://api.tavily.com".into()
}
fn default_max_results() -> u32 {
    10
}
fn default_search_ceiling() -> usize {
    10_000
}
fn default_capability_timeout() -> u64 {
    30
}

/// `[scrape]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScrapeSection {
    /// Byte ceiling for scraped page text.
    #[serde(default = "default_scrape_ceiling")]
    pub content_ceiling: usize,

    #[serde(default = "default_capability_timeout")]
    pub timeout_secs: u64,

    /// Permit loopback/private targets (local testing only).
    #[serde(default)]
    pub allow_private_hosts: bool,
}

impl Default for ScrapeSection {
    fn default() -> Self {
        Self {
            content_ceiling: default_scrape_ceiling(),
            timeout_secs: default_capability_timeout(),
            allow_private_hosts: false,
        }
    }
}

fn default_scrape_ceiling() -> usize {
    20_000
}

/// `[openrouter]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenRouterConfig {
    /// Name of the env var holding the API key (never store the key itself).
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,

    #[serde(default = "default_openrouter_base_url")]
    pub base_url: String,

    /// Model used for reasoning.
    #[serde(default = "default_model")]
    pub model: String,

    #[serde(default = "default_temperature")]
    pub temperature: f32,

    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    #[serde(default = "default_llm_timeout")]
    pub timeout_secs: u64,
}

impl Default for OpenRouterConfig {
    fn default() -> Self {
        Self {
            api_key_env: default_api_key_env(),
            base_url: default_openrouter_base_url(),
            model: default_model(),
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
            timeout_secs: default_llm_timeout(),
        }
    }
}

fn default_api_key_env() -> String {
    "OPENROUTER_API_KEY".into()
}
fn default_openrouter_base_url() -> String {
    "https://openrouter.ai/api/v1".into()
}
fn default_model() -> String {
    "openai/gpt-4o-mini".into()
}
fn default_temperature() -> f32 {
    0.1
}
fn default_max_tokens() -> u32 {
    3000
}
fn default_llm_timeout() -> u64 {
    60
}

/// `[domains]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DomainsSection {
    /// Path to the CSV allow-list (`domain_key,hostname,description`).
    #[serde(default = "default_sites_source")]
    pub source: String,
}

impl Default for DomainsSection {
    fn default() -> Self {
        Self {
            source: default_sites_source(),
        }
    }
}

fn default_sites_source() -> String {
    "sites_data.csv".into()
}

// ---------------------------------------------------------------------------
// Agent config (runtime, derived from AppConfig)
// ---------------------------------------------------------------------------

/// Runtime limits consumed by the session store and the orchestration loop.
#[derive(Debug, Clone)]
pub struct AgentConfig {
    pub max_turns: usize,
    pub session_ttl: Duration,
    pub sweep_interval: Duration,
    pub max_search_results: u32,
    pub search_depth: SearchDepth,
    pub max_iterations: u32,
    pub reasoning_timeout: Duration,
    pub search_timeout: Duration,
    pub scrape_timeout: Duration,
    pub request_deadline: Duration,
    pub reasoning_retries: u32,
    pub search_content_ceiling: usize,
    pub scrape_content_ceiling: usize,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self::from(&AppConfig::default())
    }
}

impl From<&AppConfig> for AgentConfig {
    fn from(config: &AppConfig) -> Self {
        Self {
            max_turns: config.agent.max_turns,
            session_ttl: Duration::from_secs(config.agent.session_ttl_secs),
            sweep_interval: Duration::from_secs(config.agent.sweep_interval_secs),
            max_search_results: config.search.max_results,
            search_depth: config.search.depth,
            max_iterations: config.agent.max_iterations,
            reasoning_timeout: Duration::from_secs(config.openrouter.timeout_secs),
            search_timeout: Duration::from_secs(config.search.timeout_secs),
            scrape_timeout: Duration::from_secs(config.scrape.timeout_secs),
            request_deadline: Duration::from_secs(config.agent.request_deadline_secs),
            reasoning_retries: config.agent.reasoning_retries,
            search_content_ceiling: config.search.content_ceiling,
            scrape_content_ceiling: config.scrape.content_ceiling,
        }
    }
}

// ---------------------------------------------------------------------------
// Environment overrides
// ---------------------------------------------------------------------------

impl AppConfig {
    /// Apply `DOCQA_*` overrides from the process environment.
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    /// Apply overrides using `lookup` to resolve variable names.
    ///
    /// Unparsable values are logged and ignored so a typo never takes the
    /// service down.
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        override_parsed(&lookup, "DOCQA_MAX_RESULTS", &mut self.search.max_results);
        override_parsed(&lookup, "DOCQA_MAX_CONTENT_SIZE", &mut self.search.content_ceiling);
        override_parsed(&lookup, "DOCQA_MAX_SCRAPE_LENGTH", &mut self.scrape.content_ceiling);
        override_parsed(&lookup, "DOCQA_MAX_ITERATIONS", &mut self.agent.max_iterations);
        override_parsed(&lookup, "DOCQA_REQUEST_TIMEOUT", &mut self.search.timeout_secs);
        override_parsed(&lookup, "DOCQA_REQUEST_TIMEOUT", &mut self.scrape.timeout_secs);
        override_parsed(&lookup, "DOCQA_LLM_TIMEOUT", &mut self.openrouter.timeout_secs);
        override_parsed(&lookup, "DOCQA_LLM_TEMPERATURE", &mut self.openrouter.temperature);
        override_parsed(&lookup, "DOCQA_LLM_MAX_TOKENS", &mut self.openrouter.max_tokens);

        if let Some(depth) = lookup("DOCQA_SEARCH_DEPTH") {
            self.search.depth = depth.parse().unwrap_or_else(|e| {
                tracing::warn!(error = %e, "invalid DOCQA_SEARCH_DEPTH, using shallow");
                SearchDepth::Shallow
            });
        }
        if let Some(path) = lookup("DOCQA_SITES_FILE").filter(|v| !v.trim().is_empty()) {
            self.domains.source = path;
        }
        if let Some(name) = lookup("DOCQA_INSTANCE_NAME").filter(|v| !v.trim().is_empty()) {
            self.agent.instance_name = name;
        }
    }
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

impl AppConfig {
    /// Reject values the runtime cannot honour.
    pub fn validate(&self) -> Result<()> {
        let durations = [
            ("agent.sweep_interval_secs", self.agent.sweep_interval_secs),
            ("agent.session_ttl_secs", self.agent.session_ttl_secs),
            ("agent.request_deadline_secs", self.agent.request_deadline_secs),
            ("search.timeout_secs", self.search.timeout_secs),
            ("scrape.timeout_secs", self.scrape.timeout_secs),
            ("openrouter.timeout_secs", self.openrouter.timeout_secs),
        ];
        for (key, secs) in durations {
            if !(1..=MAX_DURATION_SECS).contains(&secs) {
                return Err(DocQaError::config(format!(
                    "{key} must be between 1 and {MAX_DURATION_SECS} seconds, got {secs}"
                )));
            }
        }

        let counts = [
            ("agent.max_turns", self.agent.max_turns),
            ("agent.max_iterations", self.agent.max_iterations as usize),
            ("search.max_results", self.search.max_results as usize),
            ("search.content_ceiling", self.search.content_ceiling),
            ("scrape.content_ceiling", self.scrape.content_ceiling),
        ];
        for (key, value) in counts {
            if value == 0 {
                return Err(DocQaError::config(format!("{key} must be greater than zero")));
            }
        }
        Ok(())
    }
}

fn override_parsed<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str, target: &mut T)
where
    T: std::str::FromStr + std::fmt::Display,
{
    let Some(raw) = lookup(key) else {
        return;
    };
    match raw.trim().parse::<T>() {
        Ok(value) => *target = value,
        Err(_) => tracing::warn!(key, value = %raw, current = %target, "invalid override, keeping current value"),
    }
}

// ---------------------------------------------------------------------------
// Config loading
// ---------------------------------------------------------------------------

/// Get the path to the config directory (`~/.docqa/`).
pub fn config_dir() -> Result<PathBuf> {
    let home =
        dirs::home_dir().ok_or_else(|| DocQaError::config("could not determine home directory"))?;
    Ok(home.join(CONFIG_DIR_NAME))
}

/// Get the path to the config file (`~/.docqa/docqa.toml`).
pub fn config_file_path() -> Result<PathBuf> {
    Ok(config_dir()?.join(CONFIG_FILE_NAME))
}

/// Load the application config from disk. Returns defaults if the file does not exist.
pub fn load_config() -> Result<AppConfig> {
    let path = config_file_path()?;

    if !path.exists() {
        tracing::debug!(?path, "config file not found, using defaults");
        return Ok(AppConfig::default());
    }

    load_config_from(&path)
}

/// Load the application config from a specific file path.
pub fn load_config_from(path: &Path) -> Result<AppConfig> {
    let content = std::fs::read_to_string(path).map_err(|e| DocQaError::io(path, e))?;

    toml::from_str(&content)
        .map_err(|e| DocQaError::config(format!("failed to parse {}: {e}", path.display())))
}

/// Create the config directory and write a default config file.
/// Returns the path to the created file.
pub fn init_config() -> Result<PathBuf> {
    let dir = config_dir()?;
    std::fs::create_dir_all(&dir).map_err(|e| DocQaError::io(&dir, e))?;

    let path = dir.join(CONFIG_FILE_NAME);
    let config = AppConfig::default();
    let content = toml::to_string_pretty(&config).map_err(|e| DocQaError::config(e.to_string()))?;

    std::fs::write(&path, content).map_err(|e| DocQaError::io(&path, e))?;
    tracing::info!(?path, "created default config file");

    Ok(path)
}

/// Check that both the OpenRouter and search API key env vars are set and non-empty.
pub fn validate_api_keys(config: &AppConfig) -> Result<()> {
    for var_name in [&config.openrouter.api_key_env, &config.search.api_key_env] {
        match std::env::var(var_name) {
            Ok(val) if !val.trim().is_empty() => {}
            _ => {
                return Err(DocQaError::config(format!(
                    "API key not found. Set the {var_name} environment variable."
                )));
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    #[test]
    fn default_config_serializes() {
        let config = AppConfig::default();
        let toml_str = toml::to_string_pretty(&config).expect("serialize default config");
        assert!(toml_str.contains("max_turns"));
        assert!(toml_str.contains("OPENROUTER_API_KEY"));
        assert!(toml_str.contains("TAVILY_API_KEY"));
    }

    #[test]
    fn config_roundtrip() {
        let config = AppConfig::default();
        let toml_str = toml::to_string_pretty(&config).expect("serialize");
        let parsed: AppConfig = toml::from_str(&toml_str).expect("deserialize");
        assert_eq!(parsed.agent.max_turns, 5);
        assert_eq!(parsed.search.depth, SearchDepth::Shallow);
        assert_eq!(parsed.openrouter.api_key_env, "OPENROUTER_API_KEY");
    }

    #[test]
    fn partial_file_keeps_defaults() {
        let toml_str = r#"
[agent]
max_iterations = 3

[search]
depth = "thorough"
"#;
        let config: AppConfig = toml::from_str(toml_str).expect("parse");
        assert_eq!(config.agent.max_iterations, 3);
        assert_eq!(config.agent.max_turns, 5);
        assert_eq!(config.search.depth, SearchDepth::Thorough);
        assert_eq!(config.scrape.content_ceiling, 20_000);
    }

    #[test]
    fn agent_config_from_app_config() {
        let app = AppConfig::default();
        let agent = AgentConfig::from(&app);
        assert_eq!(agent.max_turns, 5);
        assert_eq!(agent.session_ttl, Duration::from_secs(3600));
        assert_eq!(agent.max_iterations, 5);
        assert_eq!(agent.search_content_ceiling, 10_000);
        assert!(agent.scrape_content_ceiling > agent.search_content_ceiling);
    }

    #[test]
    fn overrides_apply_and_ignore_garbage() {
        let vars: HashMap<&str, &str> = HashMap::from([
            ("DOCQA_MAX_RESULTS", "4"),
            ("DOCQA_MAX_ITERATIONS", "lots"),
            ("DOCQA_SEARCH_DEPTH", "advanced"),
            ("DOCQA_SITES_FILE", "/etc/docqa/sites.csv"),
            ("DOCQA_LLM_TEMPERATURE", "0.3"),
        ]);

        let mut config = AppConfig::default();
        config.apply_overrides(|k| vars.get(k).map(|v| v.to_string()));

        assert_eq!(config.search.max_results, 4);
        assert_eq!(config.agent.max_iterations, 5);
        assert_eq!(config.search.depth, SearchDepth::Thorough);
        assert_eq!(config.domains.source, "/etc/docqa/sites.csv");
        assert!((config.openrouter.temperature - 0.3).abs() < f32::EPSILON);
    }

    #[test]
    fn unknown_depth_override_falls_back_to_shallow() {
        let mut config = AppConfig::default();
        config.search.depth = SearchDepth::Thorough;
        config.apply_overrides(|k| (k == "DOCQA_SEARCH_DEPTH").then(|| "deep".to_string()));
        assert_eq!(config.search.depth, SearchDepth::Shallow);
    }

    #[test]
    fn default_config_is_valid() {
        assert!(AppConfig::default().validate().is_ok());
    }

    #[test]
    fn validation_rejects_unusable_limits() {
        let mut config = AppConfig::default();
        config.agent.sweep_interval_secs = 0;
        let err = config.validate().unwrap_err();
        assert!(matches!(err, DocQaError::Config { .. }));
        assert!(err.to_string().contains("agent.sweep_interval_secs"));

        let mut config = AppConfig::default();
        config.agent.request_deadline_secs = u64::MAX;
        assert!(config.validate().unwrap_err().to_string().contains("request_deadline_secs"));

        let mut config = AppConfig::default();
        config.openrouter.timeout_secs = 10_000_000;
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.agent.max_iterations = 0;
        assert!(config.validate().unwrap_err().to_string().contains("max_iterations"));
    }

    #[test]
    fn api_key_validation() {
        let mut config = AppConfig::default();
        // Use unique env var names to avoid interfering with other tests
        config.openrouter.api_key_env = "DOCQA_TEST_NONEXISTENT_KEY_12345".into();
        let result = validate_api_keys(&config);
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("DOCQA_TEST_NONEXISTENT_KEY_12345"));
    }
}

//! Configuration file handling.
//!
//! This module handles loading, validating and merging configuration from
//! `.audit-router.toml` files.

use crate::routing::IntentLabel;
use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

/// Default config file name, looked up in the current directory.
pub const CONFIG_FILE_NAME: &str = ".audit-router.toml";

/// Root configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// General settings.
    #[serde(default)]
    pub general: GeneralConfig,

    /// Text generation settings.
    #[serde(default)]
    pub model: ModelConfig,

    /// Agent selection settings.
    #[serde(default)]
    pub routing: RoutingConfig,

    /// Fan-out settings.
    #[serde(default)]
    pub dispatch: DispatchConfig,

    /// Citation and summary settings.
    #[serde(default)]
    pub citations: CitationConfig,

    /// Knowledge corpus location.
    #[serde(default)]
    pub knowledge: KnowledgeConfig,

    /// Per-agent capability overrides, keyed by agent id.
    #[serde(default)]
    pub agents: BTreeMap<String, AgentOverride>,
}

/// General application settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneralConfig {
    /// Output file. Stdout when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<String>,

    /// Report format: `markdown` or `json`.
    #[serde(default = "default_format")]
    pub format: String,

    /// Enable verbose logging by default.
    #[serde(default)]
    pub verbose: bool,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            output: None,
            format: default_format(),
            verbose: false,
        }
    }
}

fn default_format() -> String {
    "markdown".to_string()
}

/// Language model settings. Temperature and token limit apply to synthesis;
/// agents use their own profile values.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    /// Model name.
    #[serde(default = "default_model")]
    pub name: String,

    /// Ollama API URL.
    #[serde(default = "default_ollama_url")]
    pub ollama_url: String,

    /// Temperature for synthesis.
    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// Maximum tokens for synthesis.
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    /// HTTP request timeout in seconds.
    #[serde(default = "default_timeout")]
    pub timeout_seconds: u64,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            name: default_model(),
            ollama_url: default_ollama_url(),
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
            timeout_seconds: default_timeout(),
        }
    }
}

fn default_model() -> String {
    "llama3.2:latest".to_string()
}

fn default_ollama_url() -> String {
    "http://localhost:11434".to_string()
}

fn default_temperature() -> f32 {
    0.2
}

fn default_max_tokens() -> u32 {
    3000
}

fn default_timeout() -> u64 {
    120
}

/// Agent selection settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoutingConfig {
    /// Maximum number of agents per query (fan-out width).
    #[serde(default = "default_max_agents")]
    pub max_agents: usize,

    /// Agents must score strictly above this to be selected.
    #[serde(default = "default_selection_threshold")]
    pub selection_threshold: f64,
}

impl Default for RoutingConfig {
    fn default() -> Self {
        Self {
            max_agents: default_max_agents(),
            selection_threshold: default_selection_threshold(),
        }
    }
}

fn default_max_agents() -> usize {
    4
}

fn default_selection_threshold() -> f64 {
    1.0
}

/// Fan-out settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatchConfig {
    /// Per-agent call timeout in seconds.
    #[serde(default = "default_agent_timeout")]
    pub agent_timeout_seconds: u64,

    /// Documents retrieved per agent.
    #[serde(default = "default_top_k")]
    pub top_k: usize,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            agent_timeout_seconds: default_agent_timeout(),
            top_k: default_top_k(),
        }
    }
}

fn default_agent_timeout() -> u64 {
    90
}

fn default_top_k() -> usize {
    8
}

/// Citation and summary settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CitationConfig {
    /// Documents scoring above this are listed as high relevance.
    #[serde(default = "default_high_relevance")]
    pub high_relevance_threshold: f32,

    /// Characters of each agent's answer passed to synthesis.
    #[serde(default = "default_excerpt_chars")]
    pub excerpt_chars: usize,
}

impl Default for CitationConfig {
    fn default() -> Self {
        Self {
            high_relevance_threshold: default_high_relevance(),
            excerpt_chars: default_excerpt_chars(),
        }
    }
}

fn default_high_relevance() -> f32 {
    0.7
}

fn default_excerpt_chars() -> usize {
    500
}

/// Knowledge corpus location.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KnowledgeConfig {
    /// Root directory holding one subdirectory per namespace.
    #[serde(default = "default_knowledge_root")]
    pub root: String,

    /// Directory of `<agent>.md` prompt overrides.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prompt_dir: Option<String>,
}

impl Default for KnowledgeConfig {
    fn default() -> Self {
        Self {
            root: default_knowledge_root(),
            prompt_dir: None,
        }
    }
}

fn default_knowledge_root() -> String {
    "knowledge".to_string()
}

/// Optional capability override for one agent. Unset fields keep the
/// built-in profile; an unknown agent id registers a new agent.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AgentOverride {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub primary_intents: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secondary_intents: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub keywords: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub companies: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
}

impl Config {
    /// Load configuration from a file path.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        config
            .validate()
            .with_context(|| format!("Invalid config file: {}", path.display()))?;

        Ok(config)
    }

    /// Try to load configuration from the default location.
    ///
    /// Returns `Ok(None)` if the file doesn't exist, `Err` if it exists but can't be parsed.
    pub fn load_default() -> Result<Option<Self>> {
        let default_path = Path::new(CONFIG_FILE_NAME);

        if default_path.exists() {
            Ok(Some(Self::load(default_path)?))
        } else {
            Ok(None)
        }
    }

    /// Checks value ranges and intent names.
    pub fn validate(&self) -> Result<()> {
        if self.routing.max_agents == 0 {
            bail!("routing.max_agents must be at least 1");
        }
        if !self.routing.selection_threshold.is_finite() || self.routing.selection_threshold < 0.0
        {
            bail!("routing.selection_threshold must be a non-negative number");
        }
        if self.dispatch.agent_timeout_seconds == 0 {
            bail!("dispatch.agent_timeout_seconds must be at least 1");
        }
        if self.dispatch.top_k == 0 {
            bail!("dispatch.top_k must be at least 1");
        }
        if self.model.timeout_seconds == 0 {
            bail!("model.timeout_seconds must be at least 1");
        }
        if !(0.0..=1.0).contains(&self.citations.high_relevance_threshold) {
            bail!("citations.high_relevance_threshold must be within [0, 1]");
        }
        if !matches!(self.general.format.as_str(), "markdown" | "json") {
            bail!(
                "general.format must be 'markdown' or 'json', got '{}'",
                self.general.format
            );
        }

        for (id, agent) in &self.agents {
            let intents = agent
                .primary_intents
                .iter()
                .chain(agent.secondary_intents.iter())
                .flatten();
            for name in intents {
                name.parse::<IntentLabel>()
                    .map_err(|e| anyhow::anyhow!(e))
                    .with_context(|| format!("agents.{}", id))?;
            }
        }

        Ok(())
    }

    /// Generate a default configuration file content.
    pub fn default_toml() -> String {
        let config = Config::default();
        toml::to_string_pretty(&config).unwrap_or_else(|_| String::new())
    }
}

//! Command-line interface argument parsing.
//!
//! This module handles all CLI argument parsing using clap,
//! including validation and merging flags over the loaded config.

use audit_router::config::Config;
use audit_router::models::ResponseType;
use clap::Parser;
use std::path::PathBuf;

/// audit-router - route audit questions to specialist knowledge agents
///
/// Classifies the query, fans it out to the best-matching agents, numbers
/// every cited document and synthesizes one answer with cross-agent insights.
///
/// Examples:
///   audit-router --query "Generate a checklist for Hovione sterile manufacturing audit"
///   audit-router --query "What changed since last audit?" --company "Thermo Fisher"
///   audit-router --query "FDA warning letters for CDMOs" --explain
///   audit-router --init-config
#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Args {
    /// Audit question to answer
    #[arg(short = 'q', long, value_name = "TEXT", required_unless_present = "init_config")]
    pub query: Option<String>,

    /// Company the question is about (overrides detection from the text)
    #[arg(long, value_name = "NAME")]
    pub company: Option<String>,

    /// Shape of the answer
    #[arg(long, default_value = "general", value_name = "TYPE")]
    pub response_type: ResponseTypeArg,

    /// Path to configuration file
    ///
    /// If not specified, looks for .audit-router.toml in the current directory
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Knowledge corpus root (one subdirectory per agent namespace)
    #[arg(long, value_name = "DIR", env = "AUDIT_ROUTER_KNOWLEDGE")]
    pub knowledge_dir: Option<PathBuf>,

    /// Directory of `<agent>.md` system prompt overrides
    #[arg(long, value_name = "DIR")]
    pub prompt_dir: Option<PathBuf>,

    /// Ollama model to use
    #[arg(short, long, env = "AUDIT_ROUTER_MODEL")]
    pub model: Option<String>,

    /// Ollama API endpoint URL
    #[arg(long, env = "OLLAMA_URL")]
    pub ollama_url: Option<String>,

    /// Maximum number of agents per query
    #[arg(long, value_name = "NUM")]
    pub max_agents: Option<usize>,

    /// Per-agent timeout in seconds
    #[arg(long, value_name = "SECS")]
    pub timeout: Option<u64>,

    /// Output format (markdown, json)
    #[arg(long, value_name = "FORMAT")]
    pub format: Option<OutputFormat>,

    /// Output file path. Prints to stdout when absent.
    #[arg(short, long, value_name = "FILE")]
    pub output: Option<PathBuf>,

    /// Classify and select agents only; no agent or model calls
    #[arg(long)]
    pub explain: bool,

    /// Enable verbose logging output
    #[arg(short, long)]
    pub verbose: bool,

    /// Run in quiet mode (minimal output)
    #[arg(long)]
    pub quiet: bool,

    /// Generate a default .audit-router.toml configuration file
    #[arg(long)]
    pub init_config: bool,
}

/// Output format for the report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum OutputFormat {
    /// Markdown format (default)
    #[default]
    Markdown,
    /// JSON format
    Json,
}

impl OutputFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            OutputFormat::Markdown => "markdown",
            OutputFormat::Json => "json",
        }
    }

    /// Parses the `[general] format` config value.
    pub fn from_config(value: &str) -> Self {
        match value {
            "json" => OutputFormat::Json,
            _ => OutputFormat::Markdown,
        }
    }
}

/// Response type as accepted on the command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum ResponseTypeArg {
    #[default]
    General,
    Report,
    Checklist,
    Insights,
}

impl From<ResponseTypeArg> for ResponseType {
    fn from(arg: ResponseTypeArg) -> Self {
        match arg {
            ResponseTypeArg::General => ResponseType::General,
            ResponseTypeArg::Report => ResponseType::Report,
            ResponseTypeArg::Checklist => ResponseType::Checklist,
            ResponseTypeArg::Insights => ResponseType::Insights,
        }
    }
}

impl Args {
    /// Parse command-line arguments.
    pub fn parse_args() -> Self {
        Self::parse()
    }

    pub fn query_text(&self) -> &str {
        self.query.as_deref().unwrap_or("")
    }

    /// Validate the parsed arguments.
    pub fn validate(&self) -> Result<(), String> {
        if self.init_config {
            return Ok(());
        }

        if self.query_text().trim().is_empty() {
            return Err("Query must not be empty".to_string());
        }

        if let Some(ref url) = self.ollama_url {
            if !url.starts_with("http://") && !url.starts_with("https://") {
                return Err("Ollama URL must start with 'http://' or 'https://'".to_string());
            }
        }

        if self.max_agents == Some(0) {
            return Err("Max agents must be at least 1".to_string());
        }

        if self.timeout == Some(0) {
            return Err("Timeout must be at least 1 second".to_string());
        }

        if self.verbose && self.quiet {
            return Err("Cannot use both --verbose and --quiet".to_string());
        }

        if let Some(ref dir) = self.knowledge_dir {
            if !dir.is_dir() {
                return Err(format!(
                    "Knowledge directory does not exist: {}",
                    dir.display()
                ));
            }
        }

        Ok(())
    }

    /// Returns the log level from the flags and `general.verbose`. `--quiet` wins.
    pub fn log_level(&self, config: &Config) -> tracing::Level {
        if self.quiet {
            tracing::Level::ERROR
        } else if self.verbose || config.general.verbose {
            tracing::Level::DEBUG
        } else {
            tracing::Level::INFO
        }
    }

    /// Applies explicit flags over the loaded configuration.
    pub fn apply_to(&self, config: &mut Config) {
        if let Some(ref model) = self.model {
            config.model.name = model.clone();
        }
        if let Some(ref url) = self.ollama_url {
            config.model.ollama_url = url.clone();
        }
        if let Some(max_agents) = self.max_agents {
            config.routing.max_agents = max_agents;
        }
        if let Some(timeout) = self.timeout {
            config.dispatch.agent_timeout_seconds = timeout;
        }
        if let Some(format) = self.format {
            config.general.format = format.as_str().to_string();
        }
        if let Some(ref output) = self.output {
            config.general.output = Some(output.display().to_string());
        }
        if let Some(ref dir) = self.knowledge_dir {
            config.knowledge.root = dir.display().to_string();
        }
        if let Some(ref dir) = self.prompt_dir {
            config.knowledge.prompt_dir = Some(dir.display().to_string());
        }
        if self.verbose {
            config.general.verbose = true;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_args() -> Args {
        Args {
            query: Some("Generate a checklist for Hovione".to_string()),
            company: None,
            response_type: ResponseTypeArg::General,
            config: None,
            knowledge_dir: None,
            prompt_dir: None,
            model: None,
            ollama_url: None,
            max_agents: None,
            timeout: None,
            format: None,
            output: None,
            explain: false,
            verbose: false,
            quiet: false,
            init_config: false,
        }
    }

    #[test]
    fn test_validation_empty_query() {
        let mut args = make_args();
        args.query = Some("   ".to_string());
        assert!(args.validate().is_err());

        args.init_config = true;
        assert!(args.validate().is_ok());
    }

    #[test]
    fn test_validation_conflicting_options() {
        let mut args = make_args();
        args.verbose = true;
        args.quiet = true;
        assert!(args.validate().is_err());
    }

    #[test]
    fn test_validation_limits() {
        let mut args = make_args();
        args.max_agents = Some(0);
        assert!(args.validate().is_err());

        let mut args = make_args();
        args.timeout = Some(0);
        assert!(args.validate().is_err());

        let mut args = make_args();
        args.ollama_url = Some("localhost:11434".to_string());
        assert!(args.validate().is_err());
    }

    #[test]
    fn test_log_level() {
        let config = Config::default();
        let mut args = make_args();
        assert_eq!(args.log_level(&config), tracing::Level::INFO);

        args.verbose = true;
        assert_eq!(args.log_level(&config), tracing::Level::DEBUG);

        args.verbose = false;
        args.quiet = true;
        assert_eq!(args.log_level(&config), tracing::Level::ERROR);
    }

    #[test]
    fn test_log_level_honors_config_verbose() {
        let mut config = Config::default();
        config.general.verbose = true;
        let mut args = make_args();
        assert_eq!(args.log_level(&config), tracing::Level::DEBUG);

        args.quiet = true;
        assert_eq!(args.log_level(&config), tracing::Level::ERROR);
    }

    #[test]
    fn test_apply_to_overrides_only_given_flags() {
        let mut args = make_args();
        args.model = Some("qwen2.5:14b".to_string());
        args.max_agents = Some(2);
        args.format = Some(OutputFormat::Json);

        let mut config = Config::default();
        args.apply_to(&mut config);

        assert_eq!(config.model.name, "qwen2.5:14b");
        assert_eq!(config.routing.max_agents, 2);
        assert_eq!(config.general.format, "json");
        assert_eq!(config.dispatch.agent_timeout_seconds, 90);
        assert_eq!(config.model.ollama_url, "http://localhost:11434");
    }

    #[test]
    fn test_parse_from_command_line() {
        let args = Args::try_parse_from([
            "audit-router",
            "--query",
            "What changed since last audit?",
            "--response-type",
            "checklist",
            "--format",
            "json",
            "--explain",
        ])
        .unwrap();

        assert!(args.explain);
        assert_eq!(ResponseType::from(args.response_type), ResponseType::Checklist);
        assert_eq!(args.format, Some(OutputFormat::Json));
    }

    #[test]
    fn test_query_required_without_init_config() {
        assert!(Args::try_parse_from(["audit-router"]).is_err());
        assert!(Args::try_parse_from(["audit-router", "--init-config"]).is_ok());
    }
}

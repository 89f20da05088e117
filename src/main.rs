//! audit-router - multi-agent audit query routing
//!
//! Routes an audit question to specialist knowledge agents and prints one
//! cited, cross-correlated answer.
//!
//! Exit codes:
//!   0 - Success (full or partial analysis)
//!   1 - Runtime error (config, knowledge base, invalid query, cancelled)
//!   2 - No data found (every selected agent failed)

mod cli;

use anyhow::{Context, Result};
use audit_router::agent::{
    knowledge_agents, AgentMap, LocalKnowledgeStore, OllamaGenerator, PromptSet,
};
use audit_router::config::{Config, CONFIG_FILE_NAME};
use audit_router::models::{AuditResponse, Query};
use audit_router::report;
use audit_router::routing::CapabilityRegistry;
use audit_router::{EngineConfig, QueryEngine, RouterError};
use cli::{Args, OutputFormat};
use indicatif::{ProgressBar, ProgressStyle};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use tracing_subscriber::FmtSubscriber;

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse_args();

    if let Err(e) = args.validate() {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }

    // Handle --init-config early (no logging needed)
    if args.init_config {
        return handle_init_config();
    }

    // `general.verbose` feeds the log level, so config loads first
    let (mut config, source) = match load_config(&args) {
        Ok(loaded) => loaded,
        Err(e) => {
            eprintln!("\n❌ Error: {:#}", e);
            std::process::exit(1);
        }
    };
    args.apply_to(&mut config);

    init_logging(args.log_level(&config));

    info!("audit-router v{}", env!("CARGO_PKG_VERSION"));
    debug!("Arguments: {:?}", args);
    source.log();

    match run(args, config).await {
        Ok(exit_code) => std::process::exit(exit_code),
        Err(e) => {
            error!("Query failed: {:#}", e);
            eprintln!("\n❌ Error: {:#}", e);
            std::process::exit(1);
        }
    }
}

/// Handle --init-config: write a default config file.
fn handle_init_config() -> Result<()> {
    let path = Path::new(CONFIG_FILE_NAME);

    if path.exists() {
        eprintln!(
            "⚠️  {} already exists. Remove it first or edit it manually.",
            CONFIG_FILE_NAME
        );
        std::process::exit(1);
    }

    std::fs::write(path, Config::default_toml())
        .with_context(|| format!("Failed to write {}", CONFIG_FILE_NAME))?;

    println!("✅ Created {} with default settings.", CONFIG_FILE_NAME);
    println!("   Edit it to customize the model, routing limits and agent capabilities.");
    Ok(())
}

fn init_logging(level: tracing::Level) {
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .compact()
        .finish();

    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Failed to set tracing subscriber: {}", e);
    }
}

/// Run one query end to end. Returns the process exit code.
async fn run(args: Args, config: Config) -> Result<i32> {
    config.validate().context("Invalid settings")?;

    let registry = CapabilityRegistry::from_config(&config)?;
    let prompts = match config.knowledge.prompt_dir {
        Some(ref dir) => {
            PromptSet::load(Path::new(dir))
                .with_context(|| format!("Failed to load prompts from {}", dir))?
        }
        None => PromptSet::defaults(),
    };

    let query = Query::new(args.query_text())
        .with_company(args.company.clone().unwrap_or_default())
        .with_response_type(args.response_type.into());

    let format = OutputFormat::from_config(&config.general.format);
    let generator = Arc::new(OllamaGenerator::new(&config.model)?);

    if args.explain {
        let engine = QueryEngine::new(
            registry,
            AgentMap::new(),
            generator,
            &prompts,
            EngineConfig::from(&config),
        );
        let plan = engine.plan(&query)?;
        emit(&report::generate_plan_report(&plan), config.general.output.as_deref())?;
        return Ok(0);
    }

    let root = Path::new(&config.knowledge.root);
    let store = LocalKnowledgeStore::open(root)
        .with_context(|| format!("Failed to open knowledge base at {}", root.display()))?;
    info!("Knowledge namespaces: {:?}", store.namespaces());

    let agents = knowledge_agents(
        &registry,
        Arc::new(store),
        generator.clone(),
        &prompts,
        config.dispatch.top_k,
    );
    let engine = QueryEngine::new(
        registry,
        agents,
        generator,
        &prompts,
        EngineConfig::from(&config),
    );

    let cancel = CancellationToken::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, cancelling pending agents");
            on_interrupt.cancel();
        }
    });

    let spinner = (!args.quiet).then(|| start_spinner(&config.model.name));
    let outcome = engine.run_with_cancel(query, &cancel).await;
    if let Some(spinner) = spinner {
        spinner.finish_and_clear();
    }

    let response = match outcome {
        Ok(response) => response,
        Err(RouterError::NoData { attempted, failures }) => {
            eprintln!("\n⛔ No data found: all {} selected agent(s) failed.", attempted);
            for failure in &failures {
                eprintln!("   - {}: {}", failure.agent_id, failure.reason);
            }
            return Ok(2);
        }
        Err(e) => return Err(e.into()),
    };

    let rendered = match format {
        OutputFormat::Json => report::generate_json_report(&response)?,
        OutputFormat::Markdown => report::generate_markdown_report(&response),
    };
    emit(&rendered, config.general.output.as_deref())?;

    if !args.quiet {
        print_summary(&response);
    }

    Ok(0)
}

fn start_spinner(model: &str) -> ProgressBar {
    let spinner = ProgressBar::new_spinner();
    if let Ok(style) =
        ProgressStyle::default_spinner().template("{spinner:.green} [{elapsed}] {msg}")
    {
        spinner.set_style(style);
    }
    spinner.set_message(format!("Consulting agents ({})...", model));
    spinner.enable_steady_tick(Duration::from_millis(120));
    spinner
}

/// Write to the output file, or stdout when none is configured.
fn emit(content: &str, output: Option<&str>) -> Result<()> {
    match output {
        Some(path) => {
            report::write_report(content, Path::new(path))?;
            eprintln!("✅ Report saved to: {}", path);
        }
        None => println!("{}", content),
    }
    Ok(())
}

fn print_summary(response: &AuditResponse) {
    eprintln!("\n📊 Query Summary:");
    eprintln!(
        "   Intent: {} ({:.2})",
        response.intent, response.intent_confidence
    );
    eprintln!("   {}", response.tier);
    eprintln!(
        "   Documents: {} | Insights: {} | Diagnostics: {}",
        response.summary.total_documents,
        response.insights.len(),
        response.diagnostics.len()
    );
    if !response.citation_check.is_clean() {
        eprintln!(
            "   ⚠️  Unknown citations in answer: {}",
            response.citation_check.unknown.join(", ")
        );
    }
    eprintln!("   Duration: {:.1}s", response.elapsed_ms as f64 / 1000.0);
}

/// Where the configuration came from. Logged once tracing is up.
enum ConfigSource {
    Explicit(PathBuf),
    DefaultFile,
    Builtin,
    Unreadable(anyhow::Error),
}

impl ConfigSource {
    fn log(&self) {
        match self {
            ConfigSource::Explicit(path) => info!("Loaded config from: {}", path.display()),
            ConfigSource::DefaultFile => info!("Loaded default config from {}", CONFIG_FILE_NAME),
            ConfigSource::Builtin => debug!("No config file found, using defaults"),
            ConfigSource::Unreadable(e) => warn!("Failed to load config: {:#}", e),
        }
    }
}

/// Load configuration from file or use defaults.
fn load_config(args: &Args) -> Result<(Config, ConfigSource)> {
    if let Some(ref config_path) = args.config {
        let config = Config::load(config_path)?;
        return Ok((config, ConfigSource::Explicit(config_path.clone())));
    }

    Ok(match Config::load_default() {
        Ok(Some(config)) => (config, ConfigSource::DefaultFile),
        Ok(None) => (Config::default(), ConfigSource::Builtin),
        Err(e) => (Config::default(), ConfigSource::Unreadable(e)),
    })
}

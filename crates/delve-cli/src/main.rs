use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use delve_agent::AgentSettings;
use delve_browser::BrowserPool;
use delve_core::config::Config;
use delve_fetch::{DocumentCache, FetchPipeline};
use delve_providers::{ChatClient, OpenAiClient};
use delve_research::{DocAgent, ResearchSettings, Researcher, WebSearch};

#[derive(Parser)]
#[command(
    name = "delve",
    about = "Web research agent: search, fetch, analyze each source, synthesize one answer",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Config file path
    #[arg(short, long, global = true)]
    config: Option<String>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Research a query across the web
    Research {
        query: String,

        /// Number of search results to analyze
        #[arg(short = 'n', long)]
        max_results: Option<usize>,

        /// Print the full report as JSON
        #[arg(long)]
        json: bool,
    },

    /// Analyze one cached document without searching
    Analyze {
        /// Document cache id
        doc_id: i64,
        query: String,
    },

    /// Fetch URLs into the document cache
    Fetch {
        #[arg(required = true)]
        urls: Vec<String>,
    },

    /// Configuration management
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },

    /// Show configuration and cache status
    Status,
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Show current configuration
    Show,
    /// Get a specific config value by dotted path
    Get { key: String },
    /// Check the configuration for problems
    Validate,
}

fn init_logging(config: &Config, verbose: bool) {
    let logging = config.logging.clone().unwrap_or_default();
    let level = if verbose {
        "debug".to_string()
    } else {
        logging.level.clone().unwrap_or_else(|| "info".to_string())
    };
    let directives = std::iter::once(level).chain(logging.filters).collect::<Vec<_>>().join(",");
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(directives));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if logging.format == "json" {
        builder.json().flatten_event(true).init();
    } else {
        builder.init();
    }
}

fn open_cache(config: &Config) -> anyhow::Result<Arc<DocumentCache>> {
    let cache = match config.cache_path() {
        Some(path) => DocumentCache::open(&path)
            .with_context(|| format!("opening document cache at {}", path.display()))?,
        None => DocumentCache::open_in_memory()?,
    };
    Ok(Arc::new(cache))
}

fn model_client(config: &Config) -> anyhow::Result<Arc<dyn ChatClient>> {
    let client = OpenAiClient::from_config(&config.model_config()).context("building model client")?;
    Ok(Arc::new(client))
}

fn fetch_pipeline(config: &Config, cache: Arc<DocumentCache>) -> anyhow::Result<Arc<FetchPipeline>> {
    let pool = Arc::new(BrowserPool::new(config.browser_config()));
    if !BrowserPool::is_supported() {
        tracing::warn!("Built without the browser feature; render tiers will be skipped");
    }
    Ok(Arc::new(FetchPipeline::from_config(&config.fetch_config(), pool, cache)?))
}

/// Cancel on Ctrl-C so in-flight tool tasks are aborted.
fn cancel_on_ctrl_c() -> CancellationToken {
    let token = CancellationToken::new();
    let child = token.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupted, cancelling");
            child.cancel();
        }
    });
    token
}

fn print_status(config: &Config, config_path: &Path) -> anyhow::Result<()> {
    println!("Delve v{}", env!("CARGO_PKG_VERSION"));
    println!("Config: {}", config_path.display());
    let model = config.model_config();
    println!("Model endpoint: {}", model.base_url);
    println!("Model: {}", config.model_name().unwrap_or("(not set)"));
    println!(
        "Search backend: {}",
        config.search_config().api_url.as_deref().unwrap_or("(not set)")
    );
    println!(
        "Browser tiers: {}",
        if BrowserPool::is_supported() { "enabled" } else { "disabled" }
    );
    match config.cache_path() {
        Some(path) => {
            println!("Cache: {}", path.display());
            if path.exists() {
                let cache = DocumentCache::open(&path)?;
                println!("Cached documents: {}", cache.count()?);
                for (id, link, len) in cache.recent(5)? {
                    println!("  #{id} {link} ({len} bytes)");
                }
            }
        }
        None => println!("Cache: in-memory"),
    }
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config_path = cli
        .config
        .map(PathBuf::from)
        .unwrap_or_else(Config::default_path);
    let config = Config::load(&config_path)
        .with_context(|| format!("loading config from {}", config_path.display()))?;

    init_logging(&config, cli.verbose);

    match cli.command {
        Commands::Research {
            query,
            max_results,
            json,
        } => {
            let search = Arc::new(WebSearch::from_config(&config.search_config())?);
            let pipeline = fetch_pipeline(&config, open_cache(&config)?)?;
            let settings = ResearchSettings::from_config(
                &config.model_config(),
                &config.agent_config(),
                max_results.unwrap_or_else(|| config.max_results()),
            );
            let researcher = Researcher::new(model_client(&config)?, search, pipeline, settings)
                .with_cancellation(cancel_on_ctrl_c());

            let report = researcher.research(&query).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                println!("{}", report.answer);
                if !report.sources.is_empty() {
                    println!("\nSources:");
                    for source in &report.sources {
                        println!("  [{}] {}", source.method, source.link);
                    }
                }
            }
        }
        Commands::Analyze { doc_id, query } => {
            let agent_config = config.agent_config();
            let settings = AgentSettings::from_config(
                &config.model_config(),
                &agent_config,
                agent_config.doc_max_iterations,
            );
            let agent = DocAgent::new(model_client(&config)?, open_cache(&config)?, settings)
                .with_cancellation(cancel_on_ctrl_c());
            let analysis = agent.analyze(doc_id, &query).await?;
            println!("{analysis}");
        }
        Commands::Fetch { urls } => {
            let pipeline = fetch_pipeline(&config, open_cache(&config)?)?;
            for outcome in pipeline.fetch_all(&urls).await {
                let id = outcome.doc_id.map(|id| id.to_string()).unwrap_or_else(|| "-".into());
                println!("{id}\t{}\t{}", outcome.method, outcome.link);
            }
        }
        Commands::Config { action } => match action {
            ConfigAction::Show => {
                let json = serde_json::to_string_pretty(&config)?;
                println!("{json}");
            }
            ConfigAction::Get { key } => match config.get_path(&key) {
                Some(value) => println!("{}", serde_json::to_string_pretty(&value)?),
                None => anyhow::bail!("no config value at '{key}'"),
            },
            ConfigAction::Validate => {
                let (warnings, errors) = config.validate();
                for warning in &warnings {
                    println!("warning: {warning}");
                }
                for error in &errors {
                    println!("error: {error}");
                }
                if !errors.is_empty() {
                    anyhow::bail!("configuration has {} error(s)", errors.len());
                }
                println!("Configuration OK");
            }
        },
        Commands::Status => print_status(&config, &config_path)?,
    }

    Ok(())
}

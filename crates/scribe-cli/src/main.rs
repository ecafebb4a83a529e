//! CLI entry point for Scribe.
//!
//! The `scribe` command runs a single chat turn against a configured
//! provider, lists providers, and shows the agent's persisted memory.

mod output;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use scribe_core::{
    AUTO_PROVIDER, ChatListener, DocumentSink, KeyValueStore, MEMORY_KEY, MemoryItem,
    NamedProvider, NullSink, PREFER_FREE_MODEL_KEY, ProviderConfig, ProviderContext,
    ProviderRegistry, ReqwestBackend, ScribeConfig,
};
use scribe_store::SqliteStore;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use crate::output::{FileSink, PrintingListener};

// ---------------------------------------------------------------------------
// CLI definition
// ---------------------------------------------------------------------------

/// Scribe: streaming chat against pluggable LLM providers.
#[derive(Parser)]
#[command(
    name = "scribe",
    version,
    about = "Scribe: streaming chat against pluggable LLM providers"
)]
struct Cli {
    /// Path to the TOML configuration file.
    #[arg(long, short, default_value = "scribe.toml")]
    config: PathBuf,

    /// Path to the SQLite database holding memory and flags.
    #[arg(long, default_value = "scribe.db")]
    db: PathBuf,

    /// Append everything the agent writes to this document.
    #[arg(long)]
    document: Option<PathBuf>,

    /// Log at debug level.
    #[arg(long, short)]
    verbose: bool,

    /// Emit logs as JSON lines.
    #[arg(long)]
    log_json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run one chat turn and stream the answer to stdout.
    Chat {
        /// Provider name; defaults to the configured default, then the first.
        #[arg(long, short)]
        provider: Option<String>,

        /// Text substituted for `{content}` in the prompt.
        #[arg(long, short, default_value = "")]
        selection: String,

        /// The prompt template.
        prompt: String,
    },

    /// List the configured providers.
    Providers,

    /// Show the agent's persisted memory.
    Memory,
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(if cli.verbose { "debug" } else { "info" }, cli.log_json);
    dotenvy::dotenv().ok();

    match &cli.command {
        Commands::Chat {
            provider,
            selection,
            prompt,
        } => cmd_chat(&cli, provider.as_deref(), selection, prompt).await,
        Commands::Providers => cmd_providers(&cli),
        Commands::Memory => cmd_memory(&cli).await,
    }
}

// ---------------------------------------------------------------------------
// Subcommand: chat
// ---------------------------------------------------------------------------

async fn cmd_chat(cli: &Cli, provider: Option<&str>, selection: &str, prompt: &str) -> Result<()> {
    let config = load_config(&cli.config)?;
    let registry = build_registry(cli, &config)?;

    let name = provider
        .map(str::to_owned)
        .or_else(|| config.default_provider.clone())
        .unwrap_or_else(|| AUTO_PROVIDER.to_owned());
    let model = registry
        .get(&name)
        .with_context(|| format!("no provider named `{name}`"))?;
    info!(provider = model.name(), "starting chat turn");

    let listener: Arc<dyn ChatListener> = Arc::new(PrintingListener::stdout());
    let chat = model.chat(selection, prompt, listener);
    tokio::pin!(chat);

    // Ctrl-C aborts the request; the turn still closes with a FINAL message.
    let outcome = loop {
        tokio::select! {
            outcome = &mut chat => break outcome,
            _ = tokio::signal::ctrl_c() => {
                warn!("interrupted, stopping the request");
                model.stop();
            }
        }
    };
    outcome.context("chat turn failed")
}

// ---------------------------------------------------------------------------
// Subcommand: providers
// ---------------------------------------------------------------------------

fn cmd_providers(cli: &Cli) -> Result<()> {
    let config = load_config(&cli.config)?;
    let default = config
        .default_provider
        .clone()
        .or_else(|| config.providers.first().map(|entry| entry.name.clone()));

    if config.providers.is_empty() {
        println!("No providers configured.");
        return Ok(());
    }

    for entry in &config.providers {
        let marker = if default.as_deref() == Some(entry.name.as_str()) {
            "*"
        } else {
            " "
        };
        let model = entry.config.model_name().unwrap_or("-");
        let key = if entry.config.api_key().is_some() {
            "key set"
        } else {
            "no key"
        };
        println!("{marker} {:<16} {model:<40} {key}", entry.name);
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Subcommand: memory
// ---------------------------------------------------------------------------

async fn cmd_memory(cli: &Cli) -> Result<()> {
    let store = SqliteStore::open(&cli.db)
        .with_context(|| format!("failed to open database {}", cli.db.display()))?;

    let items: Vec<MemoryItem> = match store.get_async(MEMORY_KEY).await? {
        Some(raw) => serde_json::from_str(&raw).context("stored memory is not valid JSON")?,
        None => Vec::new(),
    };
    let prefers_free = store.get_async(PREFER_FREE_MODEL_KEY).await?;

    println!(
        "Prefer free model: {}",
        prefers_free.as_deref() == Some("true")
    );
    if items.is_empty() {
        println!("No memories yet.");
        return Ok(());
    }
    for item in &items {
        let tags: Vec<&str> = item.tags.iter().map(String::as_str).collect();
        println!(
            "[{}] ({}) {}",
            item.timestamp.format("%Y-%m-%d %H:%M:%S"),
            tags.join(", "),
            item.content.replace('\n', " / ")
        );
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Initialize the tracing subscriber with the given default level.
///
/// The `RUST_LOG` environment variable takes precedence. Logs go to stderr
/// so they never interleave with the streamed answer.
fn init_tracing(default_level: &str, json: bool) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr);
    if json {
        builder.json().init();
    } else {
        builder.compact().init();
    }
}

/// Read the config file, falling back to a single offline provider when it
/// does not exist, then apply `SCRIBE_*` environment overrides.
fn load_config(path: &Path) -> Result<ScribeConfig> {
    let mut config = if path.exists() {
        ScribeConfig::load(path).context("failed to load configuration")?
    } else {
        info!(path = %path.display(), "no configuration file, using the local provider");
        ScribeConfig {
            providers: vec![NamedProvider {
                name: "local".into(),
                config: ProviderConfig::default(),
            }],
            ..ScribeConfig::default()
        }
    };
    let applied = config.apply_env_overrides(std::env::vars());
    if applied > 0 {
        info!(applied, "environment overrides applied");
    }
    Ok(config)
}

fn build_registry(cli: &Cli, config: &ScribeConfig) -> Result<ProviderRegistry> {
    let backend = ReqwestBackend::new().context("failed to build HTTP client")?;
    let store: Arc<dyn KeyValueStore> = Arc::new(
        SqliteStore::open(&cli.db)
            .with_context(|| format!("failed to open database {}", cli.db.display()))?,
    );
    let sink: Arc<dyn DocumentSink> = match &cli.document {
        Some(path) => Arc::new(
            FileSink::open(path)
                .with_context(|| format!("failed to open document {}", path.display()))?,
        ),
        None => Arc::new(NullSink),
    };

    let context = ProviderContext::new(Arc::new(backend))
        .with_store(store)
        .with_sink(sink)
        .with_resilience(config.resilience.clone());
    let registry = ProviderRegistry::new(context);
    registry
        .register_all(config)
        .context("failed to register providers")?;
    Ok(registry)
}

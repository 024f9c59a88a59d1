//! # semvault
//!
//! Long-running semantic search service over local note vaults.
//!
//! semvault ingests Markdown (and arbitrary text) trees, chunks them
//! with awareness of document structure, embeds the chunks through a
//! remote model, and answers natural-language queries with reranked
//! retrieval. A file watcher keeps the index live; link-graph
//! analytics run over the stored metadata.
//!
//! ## Commands
//!
//! - `semvault index [--force]` - run a full indexing pass
//! - `semvault search <QUERY>` - query the index
//! - `semvault stats` - show index statistics
//! - `semvault serve [--watch]` - serve operations over stdio
//! - `semvault config <show|init|path>` - manage configuration

use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use semvault_api::Api;
use semvault_chunker::{HeuristicTokenizer, MarkdownChunker};
use semvault_core::{Embedder, Reranker, VectorRepository};
use semvault_embed::{CredentialProvider, HttpEmbedder, HttpReranker, KeyRing, StaticKey};
use semvault_index::{Indexer, SourceRegistry, VaultWatcher, WatcherConfig};
use semvault_query::{LinkAnalytics, QueryService};
use semvault_store::LanceStore;
use serde::Deserialize;
use serde_json::{json, Value};
use std::path::PathBuf;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;

mod config;

use config::Config;

#[derive(Parser)]
#[command(name = "semvault")]
#[command(about = "Semantic search over local note vaults")]
#[command(version)]
struct Cli {
    /// Path to config file (default: ~/.config/semvault/config.toml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Output format (text, json)
    #[arg(short, long, default_value = "text")]
    format: OutputFormat,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, Debug, Default, clap::ValueEnum)]
enum OutputFormat {
    #[default]
    Text,
    Json,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a full indexing pass over all sources
    Index {
        /// Reindex every file regardless of content hashes
        #[arg(short, long)]
        force: bool,
    },

    /// Query the index
    Search {
        /// Query string
        query: String,

        /// Maximum results
        #[arg(short, long, default_value = "5")]
        limit: usize,

        /// Folder filter
        #[arg(long)]
        folder: Option<String>,

        /// Comma-separated tag filter
        #[arg(long)]
        tags: Option<String>,

        /// Source filter
        #[arg(long)]
        source: Option<String>,
    },

    /// Show index statistics
    Stats,

    /// Serve named operations over standard streams
    Serve {
        /// Watch source roots for changes
        #[arg(short, long)]
        watch: bool,
    },

    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Show current configuration
    Show,
    /// Print sample configuration file
    Init,
    /// Show config file path
    Path,
}

/// One request line on the stdio transport.
#[derive(Deserialize)]
struct Request {
    #[serde(alias = "operation")]
    op: String,
    #[serde(default)]
    params: Option<Value>,
}

/// Build the full component stack behind the API surface.
async fn build_api(config: &Config) -> Result<Arc<Api>> {
    let sources = config.resolved_sources()?;
    let registry = Arc::new(SourceRegistry::new(sources)?);

    let store_path = config.resolved_store_path()?;
    let store = Arc::new(LanceStore::new(store_path, config.embedding.dimension));
    store.init().await.context("failed to initialize vector store")?;
    let repo: Arc<dyn VectorRepository> = store;

    let keys = config.embedding.resolved_keys();
    if keys.is_empty() {
        bail!(
            "no embedding API key configured; set SEMVAULT_API_KEY or add embedding.api_key to {}",
            Config::config_path()
                .map(|p| p.display().to_string())
                .unwrap_or_else(|| "the config file".to_string())
        );
    }
    let credentials: Arc<dyn CredentialProvider> = if keys.len() > 1 {
        Arc::new(KeyRing::new(keys))
    } else {
        Arc::new(StaticKey::new(keys.into_iter().next().unwrap()))
    };

    let mut embedder = HttpEmbedder::new(credentials)
        .with_model(config.embedding.model.clone(), config.embedding.dimension)
        .with_batch_size(config.embedding.batch_size);
    if let Some(ref endpoint) = config.embedding.endpoint {
        embedder = embedder.with_base_url(endpoint.clone());
    }
    let embedder: Arc<dyn Embedder> = Arc::new(embedder);

    let reranker: Option<Arc<dyn Reranker>> =
        match (config.rerank.enabled, config.rerank.endpoint.as_ref()) {
            (true, Some(endpoint)) => {
                let mut reranker =
                    HttpReranker::new(endpoint.clone()).with_model(config.rerank.model.clone());
                if let Some(ref key) = config.rerank.api_key {
                    reranker = reranker.with_api_key(key.clone());
                }
                Some(Arc::new(reranker))
            }
            (true, None) => {
                warn!("rerank enabled but no endpoint configured, running without reranking");
                None
            }
            (false, _) => None,
        };

    let chunker = Arc::new(MarkdownChunker::new(
        config.chunk.sizes(),
        Arc::new(HeuristicTokenizer),
    ));

    let indexer = Arc::new(Indexer::new(
        Arc::clone(&registry),
        Arc::clone(&repo),
        Arc::clone(&embedder),
        Arc::clone(&chunker),
        config.embedding.max_concurrent,
    ));

    let query = QueryService::new(Arc::clone(&repo), Arc::clone(&embedder), reranker);
    let analytics = LinkAnalytics::new(Arc::clone(&repo), Arc::clone(&embedder), chunker);

    Ok(Arc::new(Api::new(
        registry,
        repo,
        indexer,
        query,
        analytics,
        config.embedding.model.clone(),
    )))
}

/// Read `{"op": ..., "params": ...}` lines from stdin and write one
/// JSON response line per request.
async fn serve(api: Arc<Api>, config: &Config, watch: bool) -> Result<()> {
    // Offline move detection: purge entries for files deleted or
    // renamed while the service was down.
    let removed = api.indexer().reconcile().await?;
    if removed > 0 {
        info!(removed, "startup reconciliation removed stale entries");
    }

    let mut watcher = None;
    if watch || config.watch.enabled {
        let watcher_config = WatcherConfig {
            debounce: std::time::Duration::from_secs(config.watch.debounce_seconds),
            force_poll: config.watch.force_poll,
            ..WatcherConfig::default()
        };
        let mut vault_watcher = VaultWatcher::new(
            Arc::clone(api.registry()),
            Arc::clone(api.indexer()),
            watcher_config,
        );
        vault_watcher.start()?;
        watcher = Some(vault_watcher);
    }

    info!("serving operations on stdio");
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }

        let response = match serde_json::from_str::<Request>(&line) {
            Ok(request) => {
                let params = request.params.unwrap_or_else(|| json!({}));
                api.dispatch(&request.op, params).await
            }
            Err(e) => json!({
                "success": false,
                "error": "serialization",
                "detail": format!("malformed request: {e}"),
            }),
        };

        println!("{}", serde_json::to_string(&response)?);
    }

    if let Some(mut watcher) = watcher {
        watcher.stop();
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = Config::load_from(cli.config.clone()).context("failed to load config")?;

    let level = if cli.verbose {
        Level::DEBUG
    } else {
        config.logging.level.parse().unwrap_or(Level::INFO)
    };

    // Logs go to stderr; stdout belongs to the transport.
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)
        .context("failed to set tracing subscriber")?;

    match cli.command {
        Commands::Index { force } => {
            let api = build_api(&config).await?;
            let report = api
                .reindex_vault(semvault_api::ops::ReindexParams { force })
                .await?;

            match cli.format {
                OutputFormat::Json => {
                    println!("{}", serde_json::to_string_pretty(&report)?);
                }
                OutputFormat::Text => {
                    println!(
                        "Indexed {} files ({} skipped, {} chunks) in {:.2}s",
                        report.processed,
                        report.skipped,
                        report.chunks_created,
                        report.duration_seconds
                    );
                    for error in &report.errors {
                        eprintln!("  error: {error}");
                    }
                }
            }
        }

        Commands::Search {
            query,
            limit,
            folder,
            tags,
            source,
        } => {
            let api = build_api(&config).await?;
            let hits = api
                .semantic_search(semvault_api::ops::SearchParams {
                    query: query.clone(),
                    n_results: limit,
                    folder,
                    tags,
                    source,
                })
                .await?;

            match cli.format {
                OutputFormat::Json => {
                    println!("{}", serde_json::to_string_pretty(&hits)?);
                }
                OutputFormat::Text => {
                    if hits.is_empty() {
                        println!("No results found.");
                    }
                    for (i, hit) in hits.iter().enumerate() {
                        println!(
                            "{}. {} (score: {:.3})",
                            i + 1,
                            hit.file_path,
                            hit.similarity
                        );
                        if !hit.header_context.is_empty() {
                            println!("   {}", hit.header_context);
                        }
                        println!("   {}", truncate(&hit.text, 120));
                        println!();
                    }
                }
            }
        }

        Commands::Stats => {
            let store_path = config.resolved_store_path()?;
            let store = LanceStore::new(store_path, config.embedding.dimension);
            store.init().await?;
            let stats = store.stats().await.map_err(semvault_core::Error::Store)?;

            match cli.format {
                OutputFormat::Json => {
                    println!("{}", serde_json::to_string_pretty(&stats)?);
                }
                OutputFormat::Text => {
                    println!("Index statistics");
                    println!("  Chunks: {}", stats.total_chunks);
                    println!("  Files:  {}", stats.total_files);
                    println!("  Model:  {}", config.embedding.model);
                    if let Some(ref path) = stats.persist_path {
                        println!("  Store:  {path}");
                    }
                }
            }
        }

        Commands::Serve { watch } => {
            let api = build_api(&config).await?;
            serve(api, &config, watch).await?;
        }

        Commands::Config { action } => match action {
            ConfigAction::Show => match cli.format {
                OutputFormat::Json => {
                    println!("{}", serde_json::to_string_pretty(&config)?);
                }
                OutputFormat::Text => {
                    println!("{}", toml::to_string_pretty(&config)?);
                }
            },
            ConfigAction::Init => {
                println!("{}", Config::sample_toml());
            }
            ConfigAction::Path => {
                if let Some(path) = Config::config_path() {
                    println!("{}", path.display());
                } else {
                    println!("Could not determine config directory");
                }
            }
        },
    }

    Ok(())
}

/// Truncate a string for display, collapsing newlines.
fn truncate(s: &str, max_len: usize) -> String {
    let s = s.replace('\n', " ");
    if s.chars().count() <= max_len {
        s
    } else {
        let cut: String = s.chars().take(max_len.saturating_sub(3)).collect();
        format!("{cut}...")
    }
}

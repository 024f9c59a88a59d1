//! Configuration handling for the semvault service.
//!
//! Loaded from a TOML file (`--config`, or the XDG config dir).
//! Credentials may come from the environment instead of the file.

use directories::ProjectDirs;
use semvault_core::{Source, SourceKind};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Main configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// Ingestion roots
    #[serde(default)]
    pub sources: Vec<SourceConfig>,

    /// Directory for persistent vector data
    #[serde(default)]
    pub vector_store_path: Option<PathBuf>,

    /// Embedding upstream
    #[serde(default)]
    pub embedding: EmbeddingConfig,

    /// Rerank upstream
    #[serde(default)]
    pub rerank: RerankConfig,

    /// Chunk token thresholds
    #[serde(default)]
    pub chunk: ChunkConfig,

    /// File watcher
    #[serde(default)]
    pub watch: WatchConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// One configured source root.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceConfig {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    pub path: PathBuf,
    #[serde(default)]
    pub kind: SourceKind,
    #[serde(default)]
    pub include: Vec<String>,
    #[serde(default)]
    pub exclude: Vec<String>,
}

impl SourceConfig {
    pub fn to_source(&self) -> Source {
        Source {
            id: self.id.clone(),
            display_name: self.name.clone().unwrap_or_else(|| self.id.clone()),
            root_path: self.path.clone(),
            kind: self.kind,
            include: self.include.clone(),
            exclude: self.exclude.clone(),
        }
    }
}

/// Embedding-related configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingConfig {
    #[serde(default = "default_embedding_model")]
    pub model: String,

    #[serde(default = "default_embedding_dimension")]
    pub dimension: usize,

    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Endpoint override (tests, proxies, compatible providers)
    #[serde(default)]
    pub endpoint: Option<String>,

    /// Primary credential; `SEMVAULT_API_KEY` / `OPENAI_API_KEY`
    /// override this at runtime.
    #[serde(default)]
    pub api_key: Option<String>,

    /// Additional credentials rotated through on quota exhaustion.
    #[serde(default)]
    pub extra_api_keys: Vec<String>,

    /// Max concurrent embedding calls during indexing.
    #[serde(default = "default_concurrency")]
    pub max_concurrent: usize,
}

fn default_embedding_model() -> String {
    "text-embedding-3-small".to_string()
}

fn default_embedding_dimension() -> usize {
    1536
}

fn default_batch_size() -> usize {
    100
}

fn default_concurrency() -> usize {
    4
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            model: default_embedding_model(),
            dimension: default_embedding_dimension(),
            batch_size: default_batch_size(),
            endpoint: None,
            api_key: None,
            extra_api_keys: Vec::new(),
            max_concurrent: default_concurrency(),
        }
    }
}

impl EmbeddingConfig {
    /// Resolve credentials: environment first, then the config file.
    pub fn resolved_keys(&self) -> Vec<String> {
        let mut keys = Vec::new();
        for var in ["SEMVAULT_API_KEY", "OPENAI_API_KEY"] {
            if let Ok(key) = std::env::var(var) {
                if !key.is_empty() {
                    keys.push(key);
                    break;
                }
            }
        }
        if keys.is_empty() {
            if let Some(ref key) = self.api_key {
                keys.push(key.clone());
            }
        }
        keys.extend(self.extra_api_keys.iter().cloned());
        keys
    }
}

/// Rerank-related configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RerankConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default = "default_rerank_model")]
    pub model: String,

    /// Rerank endpoint; reranking is skipped when unset.
    #[serde(default)]
    pub endpoint: Option<String>,

    #[serde(default)]
    pub api_key: Option<String>,
}

fn default_true() -> bool {
    true
}

fn default_rerank_model() -> String {
    "ms-marco-TinyBERT-L-2-v2".to_string()
}

impl Default for RerankConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            model: default_rerank_model(),
            endpoint: None,
            api_key: None,
        }
    }
}

/// Chunk token thresholds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkConfig {
    #[serde(default = "default_chunk_target")]
    pub target: u32,

    #[serde(default = "default_chunk_max")]
    pub max: u32,

    #[serde(default = "default_chunk_min")]
    pub min: u32,

    #[serde(default = "default_chunk_overlap")]
    pub overlap: u32,
}

fn default_chunk_target() -> u32 {
    1000
}

fn default_chunk_max() -> u32 {
    2000
}

fn default_chunk_min() -> u32 {
    100
}

fn default_chunk_overlap() -> u32 {
    150
}

impl Default for ChunkConfig {
    fn default() -> Self {
        Self {
            target: default_chunk_target(),
            max: default_chunk_max(),
            min: default_chunk_min(),
            overlap: default_chunk_overlap(),
        }
    }
}

impl ChunkConfig {
    pub fn sizes(&self) -> semvault_core::ChunkSizes {
        semvault_core::ChunkSizes {
            target: self.target,
            max: self.max,
            min: self.min,
            overlap: self.overlap,
        }
    }
}

/// Watcher configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WatchConfig {
    #[serde(default)]
    pub enabled: bool,

    #[serde(default = "default_debounce_seconds")]
    pub debounce_seconds: u64,

    /// Use the polling backend for filesystems without recursive
    /// watch support.
    #[serde(default)]
    pub force_poll: bool,
}

fn default_debounce_seconds() -> u64 {
    30
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            debounce_seconds: default_debounce_seconds(),
            force_poll: false,
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl Config {
    /// Load from an explicit path, or the default location. A missing
    /// default file yields the built-in defaults.
    pub fn load_from(path: Option<PathBuf>) -> anyhow::Result<Self> {
        let path = match path {
            Some(p) => p,
            None => match Self::config_path() {
                Some(p) if p.exists() => p,
                _ => return Ok(Self::default()),
            },
        };

        let raw = std::fs::read_to_string(&path)?;
        let config: Config = toml::from_str(&raw)?;
        Ok(config)
    }

    /// Default config file path.
    pub fn config_path() -> Option<PathBuf> {
        if let Ok(dir) = std::env::var("SEMVAULT_CONFIG_DIR") {
            return Some(PathBuf::from(dir).join("config.toml"));
        }
        ProjectDirs::from("", "", "semvault").map(|dirs| dirs.config_dir().join("config.toml"))
    }

    /// Default data directory for the vector store.
    pub fn data_dir() -> Option<PathBuf> {
        if let Ok(dir) = std::env::var("SEMVAULT_DATA_DIR") {
            return Some(PathBuf::from(dir));
        }
        ProjectDirs::from("", "", "semvault").map(|dirs| dirs.data_dir().to_path_buf())
    }

    /// Where the vector store lives.
    pub fn resolved_store_path(&self) -> anyhow::Result<PathBuf> {
        if let Some(ref path) = self.vector_store_path {
            return Ok(path.clone());
        }
        Self::data_dir()
            .map(|d| d.join("index.lance"))
            .ok_or_else(|| anyhow::anyhow!("could not determine data directory"))
    }

    /// Sources, with the working directory as a fallback when none are
    /// configured.
    pub fn resolved_sources(&self) -> anyhow::Result<Vec<Source>> {
        if !self.sources.is_empty() {
            return Ok(self.sources.iter().map(SourceConfig::to_source).collect());
        }
        let cwd = std::env::current_dir()?;
        Ok(vec![Source::markdown("vault", cwd)])
    }

    /// Sample configuration file contents.
    pub fn sample_toml() -> String {
        let sample = Config {
            sources: vec![SourceConfig {
                id: "vault".to_string(),
                name: Some("Personal Vault".to_string()),
                path: PathBuf::from("~/vault"),
                kind: SourceKind::Markdown,
                include: vec!["**/*.md".to_string()],
                exclude: vec![".obsidian/**".to_string()],
            }],
            ..Default::default()
        };
        toml::to_string_pretty(&sample).unwrap_or_default()
    }
}

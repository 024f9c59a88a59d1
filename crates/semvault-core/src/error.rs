//! Error types for semvault.

use thiserror::Error;

/// Main error type for semvault operations.
#[derive(Error, Debug)]
pub enum Error {
    /// Chunking failed
    #[error("chunking error: {0}")]
    Chunking(#[from] ChunkError),

    /// Embedding generation failed
    #[error("embedding error: {0}")]
    Embedding(#[from] EmbedError),

    /// Reranking failed
    #[error("rerank error: {0}")]
    Rerank(#[from] RerankError),

    /// Vector repository operation failed
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// Path or id absent on disk or in the store
    #[error("not found: {0}")]
    NotFound(String),

    /// Path escapes its source root, or is under no configured source
    #[error("invalid path: {0}")]
    InvalidPath(String),

    /// Repository detected missing or duplicate ids
    #[error("index inconsistency: {0}")]
    Inconsistency(String),

    /// Cooperative cancellation
    #[error("operation cancelled")]
    Cancelled,

    /// I/O error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Configuration error
    #[error("config error: {0}")]
    Config(String),

    /// Generic error
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Machine-readable kind string used by the API error envelope.
    pub fn kind(&self) -> &'static str {
        match self {
            Error::Chunking(_) => "chunking",
            Error::Embedding(_) => "upstream_unavailable",
            Error::Rerank(_) => "upstream_unavailable",
            Error::Store(_) => "store",
            Error::NotFound(_) => "not_found",
            Error::InvalidPath(_) => "invalid_path",
            Error::Inconsistency(_) => "inconsistency",
            Error::Cancelled => "cancelled",
            Error::Io(_) => "io",
            Error::Serialization(_) => "serialization",
            Error::Config(_) => "config",
            Error::Other(_) => "internal",
        }
    }
}

/// Chunking errors.
#[derive(Error, Debug)]
pub enum ChunkError {
    #[error("chunking failed: {0}")]
    Failed(String),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

/// Embedding upstream errors.
#[derive(Error, Debug)]
pub enum EmbedError {
    /// Transport failure after retries were exhausted
    #[error("upstream unavailable: {0}")]
    Upstream(String),

    /// Upstream rejected the request (4xx other than rate limit)
    #[error("request rejected ({status}): {detail}")]
    Rejected { status: u16, detail: String },

    /// Rate or quota limit and the credential ring is exhausted
    #[error("quota exhausted on all credentials")]
    QuotaExhausted,

    /// Response did not match the expected shape
    #[error("invalid response: {0}")]
    InvalidResponse(String),
}

/// Reranker upstream errors.
#[derive(Error, Debug)]
pub enum RerankError {
    #[error("upstream unavailable: {0}")]
    Upstream(String),

    #[error("invalid response: {0}")]
    InvalidResponse(String),
}

/// Vector repository errors.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("store initialization failed: {0}")]
    Init(String),

    #[error("insert failed: {0}")]
    Insert(String),

    #[error("query failed: {0}")]
    Query(String),

    #[error("delete failed: {0}")]
    Delete(String),

    #[error("schema error: {0}")]
    Schema(String),
}

/// Result type alias for semvault operations.
pub type Result<T> = std::result::Result<T, Error>;

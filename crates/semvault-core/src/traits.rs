//! Core traits for semvault components.
//!
//! - [`Embedder`]: batched vector generation against an upstream model
//! - [`Reranker`]: cross-encoder scoring of `(query, document)` pairs
//! - [`VectorRepository`]: persistent store of chunks with k-NN search
//!
//! All components are constructor-injected behind these traits so tests
//! can substitute fakes without touching the rest of the system.

use async_trait::async_trait;

use crate::error::{EmbedError, RerankError, StoreError};
use crate::types::{FileVector, MetadataRow, NoteChunk, RepoStats, ScoredChunk, SearchFilter};

// ============================================================================
// Embedding
// ============================================================================

/// Batched vector generation. Treated as a pure function
/// `embed(texts) -> vectors`; batching, retries, and credential
/// rotation live behind this interface.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Upstream model identifier.
    fn model_name(&self) -> &str;

    /// Embedding dimension.
    fn dimension(&self) -> usize;

    /// Embed a batch of texts, one vector per input, in order.
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbedError>;

    /// Embed a single query string.
    async fn embed_query(&self, query: &str) -> Result<Vec<f32>, EmbedError> {
        let mut vectors = self.embed_batch(&[query.to_string()]).await?;
        if vectors.len() != 1 {
            return Err(EmbedError::InvalidResponse(format!(
                "expected 1 vector, got {}",
                vectors.len()
            )));
        }
        Ok(vectors.remove(0))
    }
}

// ============================================================================
// Reranking
// ============================================================================

/// Cross-encoder scoring of `(query, document)` pairs.
///
/// Scores are implementation-scaled floats (sometimes negative) and
/// must never be compared to cosine similarities.
#[async_trait]
pub trait Reranker: Send + Sync {
    /// Model identifier.
    fn model_name(&self) -> &str;

    /// Score each document against the query, one score per input, in order.
    async fn rerank(&self, query: &str, documents: &[String]) -> Result<Vec<f32>, RerankError>;
}

// ============================================================================
// Vector repository
// ============================================================================

/// Persistent store of `{id, vector, text, metadata}` rows.
///
/// Guarantees atomic per-key upsert and delete; safe for concurrent
/// readers with serialized writers per key. The chunk id is the
/// primary key.
#[async_trait]
pub trait VectorRepository: Send + Sync {
    /// Initialize the backing storage.
    async fn init(&self) -> Result<(), StoreError>;

    /// Insert or overwrite chunks, idempotent by primary key.
    async fn upsert(&self, chunks: &[NoteChunk]) -> Result<(), StoreError>;

    /// Remove all chunks for one file. Returns the number removed.
    async fn delete_by_path(&self, source_id: &str, file_path: &str) -> Result<u64, StoreError>;

    /// Primary-key delete. Returns the number removed.
    async fn delete_by_ids(&self, ids: &[String]) -> Result<u64, StoreError>;

    /// k-NN under cosine distance with a pre-applied metadata filter.
    /// Results are ordered by ascending distance.
    async fn query(
        &self,
        vector: &[f32],
        k: usize,
        filter: &SearchFilter,
    ) -> Result<Vec<ScoredChunk>, StoreError>;

    /// All chunks for a file, vectors included, ordered by chunk index.
    async fn get_by_path(
        &self,
        source_id: &str,
        file_path: &str,
    ) -> Result<Vec<NoteChunk>, StoreError>;

    /// Stored content hash for a file, if any chunks exist.
    async fn content_hash(
        &self,
        source_id: &str,
        file_path: &str,
    ) -> Result<Option<String>, StoreError>;

    /// Every `(source_id, file_path)` tuple currently indexed.
    async fn indexed_paths(&self) -> Result<Vec<(String, String)>, StoreError>;

    /// Full metadata projection for analytics.
    async fn scan_metadata(&self) -> Result<Vec<MetadataRow>, StoreError>;

    /// Every chunk vector with its owning file, for centroid analytics.
    async fn scan_vectors(&self) -> Result<Vec<FileVector>, StoreError>;

    /// Chunk count, distinct file count, collection identity.
    async fn stats(&self) -> Result<RepoStats, StoreError>;
}

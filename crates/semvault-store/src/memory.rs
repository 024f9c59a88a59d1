//! In-memory repository for testing without `LanceDB`.
//!
//! Brute-force cosine search over a `HashMap`. Not suitable for real
//! corpora, but exact, dependency-free, and fast to compile, which is
//! what tests and development builds want.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use async_trait::async_trait;
use semvault_core::{
    FileVector, MetadataRow, NoteChunk, RepoStats, ScoredChunk, SearchFilter, StoreError,
    VectorRepository,
};
use tokio::sync::RwLock;
use tracing::debug;

/// In-memory vector repository keyed by chunk id.
pub struct MemoryStore {
    chunks: Arc<RwLock<HashMap<String, NoteChunk>>>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self {
            chunks: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Cosine distance in `[0, 2]`.
    fn cosine_distance(a: &[f32], b: &[f32]) -> f32 {
        if a.len() != b.len() {
            return 2.0;
        }
        let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
        let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
        let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm_a == 0.0 || norm_b == 0.0 {
            return 2.0;
        }
        1.0 - dot / (norm_a * norm_b)
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl VectorRepository for MemoryStore {
    async fn init(&self) -> Result<(), StoreError> {
        Ok(())
    }

    async fn upsert(&self, chunks: &[NoteChunk]) -> Result<(), StoreError> {
        let mut store = self.chunks.write().await;
        for chunk in chunks {
            store.insert(chunk.id.clone(), chunk.clone());
        }
        debug!("upserted {} chunks", chunks.len());
        Ok(())
    }

    async fn delete_by_path(&self, source_id: &str, file_path: &str) -> Result<u64, StoreError> {
        let mut store = self.chunks.write().await;
        let before = store.len();
        store.retain(|_, c| !(c.source_id == source_id && c.file_path == file_path));
        let deleted = (before - store.len()) as u64;
        debug!(source_id, file_path, deleted, "deleted chunks for file");
        Ok(deleted)
    }

    async fn delete_by_ids(&self, ids: &[String]) -> Result<u64, StoreError> {
        let mut store = self.chunks.write().await;
        let mut deleted = 0;
        for id in ids {
            if store.remove(id).is_some() {
                deleted += 1;
            }
        }
        Ok(deleted)
    }

    async fn query(
        &self,
        vector: &[f32],
        k: usize,
        filter: &SearchFilter,
    ) -> Result<Vec<ScoredChunk>, StoreError> {
        let store = self.chunks.read().await;

        let mut scored: Vec<ScoredChunk> = store
            .values()
            .filter(|c| filter.matches(c))
            .filter_map(|c| {
                c.embedding.as_ref().map(|e| ScoredChunk {
                    chunk: c.clone(),
                    distance: Self::cosine_distance(vector, e),
                })
            })
            .collect();

        scored.sort_by(|a, b| {
            a.distance
                .partial_cmp(&b.distance)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        scored.truncate(k);
        Ok(scored)
    }

    async fn get_by_path(
        &self,
        source_id: &str,
        file_path: &str,
    ) -> Result<Vec<NoteChunk>, StoreError> {
        let store = self.chunks.read().await;
        let mut chunks: Vec<NoteChunk> = store
            .values()
            .filter(|c| c.source_id == source_id && c.file_path == file_path)
            .cloned()
            .collect();
        chunks.sort_by_key(|c| c.chunk_index);
        Ok(chunks)
    }

    async fn content_hash(
        &self,
        source_id: &str,
        file_path: &str,
    ) -> Result<Option<String>, StoreError> {
        let store = self.chunks.read().await;
        Ok(store
            .values()
            .find(|c| c.source_id == source_id && c.file_path == file_path)
            .map(|c| c.content_hash.clone()))
    }

    async fn indexed_paths(&self) -> Result<Vec<(String, String)>, StoreError> {
        let store = self.chunks.read().await;
        let unique: BTreeSet<(String, String)> = store
            .values()
            .map(|c| (c.source_id.clone(), c.file_path.clone()))
            .collect();
        Ok(unique.into_iter().collect())
    }

    async fn scan_metadata(&self) -> Result<Vec<MetadataRow>, StoreError> {
        let store = self.chunks.read().await;
        Ok(store
            .values()
            .map(|c| MetadataRow {
                source_id: c.source_id.clone(),
                file_path: c.file_path.clone(),
                note_title: c.note_title.clone(),
                tags: c.tags.clone(),
                outbound_links: c.outbound_links.clone(),
            })
            .collect())
    }

    async fn scan_vectors(&self) -> Result<Vec<FileVector>, StoreError> {
        let store = self.chunks.read().await;
        Ok(store
            .values()
            .filter_map(|c| {
                c.embedding.as_ref().map(|e| FileVector {
                    source_id: c.source_id.clone(),
                    file_path: c.file_path.clone(),
                    vector: e.clone(),
                })
            })
            .collect())
    }

    async fn stats(&self) -> Result<RepoStats, StoreError> {
        let store = self.chunks.read().await;
        let files: BTreeSet<(&str, &str)> = store
            .values()
            .map(|c| (c.source_id.as_str(), c.file_path.as_str()))
            .collect();
        Ok(RepoStats {
            total_chunks: store.len() as u64,
            total_files: files.len() as u64,
            collection_name: "memory".to_string(),
            persist_path: None,
        })
    }
}

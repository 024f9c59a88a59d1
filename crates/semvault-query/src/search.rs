//! Query execution: embed, filtered retrieval, rerank.

use std::sync::Arc;

use semvault_core::{
    Embedder, Error, Reranker, Result, ScoredChunk, SearchFilter, SearchHit, VectorRepository,
};
use tracing::debug;

/// Candidate over-fetch factor when reranking is enabled.
const FETCH_MULTIPLIER: usize = 5;

/// Runs the search pipeline: query embedding, metadata-filtered k-NN,
/// optional cross-encoder rerank, top-k slice.
pub struct QueryService {
    repo: Arc<dyn VectorRepository>,
    embedder: Arc<dyn Embedder>,
    reranker: Option<Arc<dyn Reranker>>,
}

impl QueryService {
    pub fn new(
        repo: Arc<dyn VectorRepository>,
        embedder: Arc<dyn Embedder>,
        reranker: Option<Arc<dyn Reranker>>,
    ) -> Self {
        Self {
            repo,
            embedder,
            reranker,
        }
    }

    pub fn rerank_enabled(&self) -> bool {
        self.reranker.is_some()
    }

    /// Search for the top `k` chunks matching `query` under `filter`.
    ///
    /// The emitted similarity is the reranker score when reranking is
    /// active, else `1 - distance`; the two scales are not comparable.
    pub async fn search(
        &self,
        query: &str,
        k: usize,
        filter: &SearchFilter,
    ) -> Result<Vec<SearchHit>> {
        if k == 0 {
            return Ok(vec![]);
        }

        let query_vector = self.embedder.embed_query(query).await?;

        let k_fetch = if self.reranker.is_some() {
            k * FETCH_MULTIPLIER
        } else {
            k
        };

        let candidates = self
            .repo
            .query(&query_vector, k_fetch, filter)
            .await
            .map_err(Error::Store)?;
        debug!(
            query,
            candidates = candidates.len(),
            rerank = self.reranker.is_some(),
            "retrieved candidates"
        );

        let hits = match &self.reranker {
            Some(reranker) => {
                let texts: Vec<String> =
                    candidates.iter().map(|c| c.chunk.text.clone()).collect();
                let scores = reranker.rerank(query, &texts).await?;

                let mut rescored: Vec<(f32, ScoredChunk)> =
                    scores.into_iter().zip(candidates).collect();
                rescored.sort_by(|a, b| {
                    b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal)
                });
                rescored
                    .into_iter()
                    .take(k)
                    .map(|(score, candidate)| to_hit(candidate, score))
                    .collect()
            }
            None => candidates
                .into_iter()
                .take(k)
                .map(|candidate| {
                    let similarity = candidate.similarity();
                    to_hit(candidate, similarity)
                })
                .collect(),
        };

        Ok(hits)
    }
}

fn to_hit(candidate: ScoredChunk, similarity: f32) -> SearchHit {
    let chunk = candidate.chunk;
    SearchHit {
        id: chunk.id,
        text: chunk.text,
        similarity,
        source_id: chunk.source_id,
        file_path: chunk.file_path,
        note_title: chunk.note_title,
        header_context: chunk.header_context,
        folder: chunk.folder,
        tags: chunk.tags,
        chunk_index: chunk.chunk_index,
        token_count: chunk.token_count,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use semvault_core::{chunk_id, EmbedError, NoteChunk, RerankError};
    use semvault_store::MemoryStore;

    const TEST_DIM: usize = 4;

    struct AxisEmbedder;

    #[async_trait]
    impl Embedder for AxisEmbedder {
        fn model_name(&self) -> &str {
            "axis"
        }

        fn dimension(&self) -> usize {
            TEST_DIM
        }

        async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbedError> {
            // Maps known words onto axes so tests control geometry.
            Ok(texts
                .iter()
                .map(|t| {
                    let mut v = vec![0.0; TEST_DIM];
                    if t.contains("gold") {
                        v[0] = 1.0;
                    }
                    if t.contains("silver") {
                        v[1] = 1.0;
                    }
                    if t.contains("bonds") {
                        v[2] = 1.0;
                    }
                    if v.iter().all(|&x| x == 0.0) {
                        v[3] = 1.0;
                    }
                    v
                })
                .collect())
        }
    }

    /// Scores documents by occurrences of the query's first word.
    struct KeywordReranker;

    #[async_trait]
    impl Reranker for KeywordReranker {
        fn model_name(&self) -> &str {
            "keyword"
        }

        async fn rerank(
            &self,
            query: &str,
            documents: &[String],
        ) -> Result<Vec<f32>, RerankError> {
            let needle = query.split_whitespace().next().unwrap_or("");
            Ok(documents
                .iter()
                .map(|d| d.matches(needle).count() as f32 - 0.5)
                .collect())
        }
    }

    fn chunk(path: &str, text: &str, vector: Vec<f32>, tags: &[&str]) -> NoteChunk {
        NoteChunk {
            id: chunk_id("vault", path, 0),
            source_id: "vault".to_string(),
            file_path: path.to_string(),
            note_title: semvault_core::note_title(path),
            folder: semvault_core::folder_of(path),
            chunk_index: 0,
            header_context: String::new(),
            content_hash: "h".to_string(),
            text: text.to_string(),
            token_count: 4,
            tags: tags.iter().map(|t| t.to_string()).collect(),
            outbound_links: vec![],
            embedding: Some(vector),
        }
    }

    async fn seeded_store() -> Arc<MemoryStore> {
        let store = Arc::new(MemoryStore::new());
        store
            .upsert(&[
                chunk("gold.md", "gold gold gold", vec![1.0, 0.0, 0.0, 0.0], &["work"]),
                chunk("mixed.md", "gold and silver", vec![0.7, 0.7, 0.0, 0.0], &["work"]),
                chunk("bonds.md", "bonds only", vec![0.0, 0.0, 1.0, 0.0], &["personal"]),
            ])
            .await
            .unwrap();
        store
    }

    #[tokio::test]
    async fn test_search_without_rerank_orders_by_distance() {
        let store = seeded_store().await;
        let service = QueryService::new(store, Arc::new(AxisEmbedder), None);

        let hits = service
            .search("gold", 2, &SearchFilter::default())
            .await
            .unwrap();

        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].file_path, "gold.md");
        assert_eq!(hits[1].file_path, "mixed.md");
        assert!(hits[0].similarity > hits[1].similarity);
        assert!(hits[0].similarity <= 1.0);
    }

    #[tokio::test]
    async fn test_search_with_rerank_orders_by_score() {
        let store = seeded_store().await;
        let service = QueryService::new(
            store,
            Arc::new(AxisEmbedder),
            Some(Arc::new(KeywordReranker)),
        );

        // Vector search alone favors gold.md; the cross-encoder sees
        // three "gold" occurrences there too, so it stays on top, and
        // every returned score is the reranker's scale.
        let hits = service
            .search("gold", 2, &SearchFilter::default())
            .await
            .unwrap();

        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].file_path, "gold.md");
        assert!((hits[0].similarity - 2.5).abs() < 1e-6);
        assert!(hits[0].similarity >= hits[1].similarity);
    }

    #[tokio::test]
    async fn test_search_applies_filter_pre_retrieval() {
        let store = seeded_store().await;
        let service = QueryService::new(store, Arc::new(AxisEmbedder), None);

        let filter = SearchFilter {
            tags: vec!["work".to_string()],
            ..Default::default()
        };
        let hits = service.search("bonds", 5, &filter).await.unwrap();

        assert!(hits.iter().all(|h| h.file_path != "bonds.md"));
    }

    #[tokio::test]
    async fn test_search_k_zero() {
        let store = seeded_store().await;
        let service = QueryService::new(store, Arc::new(AxisEmbedder), None);
        let hits = service
            .search("gold", 0, &SearchFilter::default())
            .await
            .unwrap();
        assert!(hits.is_empty());
    }

    #[tokio::test]
    async fn test_search_empty_store() {
        let store = Arc::new(MemoryStore::new());
        let service = QueryService::new(store, Arc::new(AxisEmbedder), None);
        let hits = service
            .search("anything", 5, &SearchFilter::default())
            .await
            .unwrap();
        assert!(hits.is_empty());
    }
}

//! Incremental indexing pipeline.
//!
//! Keeps the vector repository consistent with the union of configured
//! sources. Per file the pipeline is fixed: read, hash, compare, chunk,
//! embed, delete stale rows, upsert. Unchanged files (matching content
//! hash) are skipped without touching the embedding upstream.
//!
//! Concurrency: work on the same `(source, path)` is serialized through
//! an on-demand mutex map; across files a pass runs up to a configured
//! ceiling in parallel, with a semaphore bounding in-flight embedding
//! calls. A pass is cancellable at file boundaries.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use futures::stream::{self, StreamExt};
use semvault_core::{
    chunk_id, folder_of, note_title, ChunkPiece, Embedder, Error, IndexReport, NoteChunk, Result,
    VectorRepository,
};
use semvault_chunker::{extract_all_tags, extract_wikilinks, MarkdownChunker};
use tokio::sync::{Mutex, Semaphore};
use tracing::{debug, info, warn};

use crate::discover::SourceRegistry;

/// Default ceiling for files processed in parallel during a full pass.
pub const DEFAULT_CONCURRENCY: usize = 4;

/// Outcome of indexing one file.
#[derive(Debug, Clone, Copy, Default)]
pub struct SingleOutcome {
    pub chunks_indexed: u64,
    /// True when the stored content hash matched and nothing was done.
    pub skipped: bool,
}

/// Orchestrates discovery, hashing, chunking, embedding, and storage.
pub struct Indexer {
    registry: Arc<SourceRegistry>,
    repo: Arc<dyn VectorRepository>,
    embedder: Arc<dyn Embedder>,
    chunker: Arc<MarkdownChunker>,
    concurrency: usize,
    embed_limit: Arc<Semaphore>,
    path_locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
    cancelled: AtomicBool,
}

impl Indexer {
    pub fn new(
        registry: Arc<SourceRegistry>,
        repo: Arc<dyn VectorRepository>,
        embedder: Arc<dyn Embedder>,
        chunker: Arc<MarkdownChunker>,
        concurrency: usize,
    ) -> Self {
        let concurrency = concurrency.max(1);
        Self {
            registry,
            repo,
            embedder,
            chunker,
            concurrency,
            embed_limit: Arc::new(Semaphore::new(concurrency)),
            path_locks: Mutex::new(HashMap::new()),
            cancelled: AtomicBool::new(false),
        }
    }

    pub fn registry(&self) -> &SourceRegistry {
        &self.registry
    }

    /// Request cancellation of a running pass at the next file boundary.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    /// Index every source. Unchanged files are skipped unless `force`.
    /// Ends with a reconciliation pass; per-file failures are recorded
    /// and never abort the run.
    pub async fn index_all(&self, force: bool) -> IndexReport {
        self.cancelled.store(false, Ordering::SeqCst);
        let start = Instant::now();
        let mut report = IndexReport::default();

        info!(force, "starting full indexing pass");

        for source in self.registry.sources() {
            let files = match self.registry.discover(&source.id) {
                Ok(files) => files,
                Err(e) => {
                    report
                        .errors
                        .push(format!("{}: discovery failed: {e}", source.id));
                    continue;
                }
            };

            debug!(source = %source.id, files = files.len(), "discovered files");

            let outcomes: Vec<(String, Result<SingleOutcome>)> = stream::iter(files)
                .map(|(_abs, rel)| async move {
                    if self.cancelled.load(Ordering::SeqCst) {
                        return (rel, Err(Error::Cancelled));
                    }
                    let outcome = self.index_single_inner(&source.id, &rel, force).await;
                    (rel, outcome)
                })
                .buffer_unordered(self.concurrency)
                .collect()
                .await;

            for (rel, outcome) in outcomes {
                match outcome {
                    Ok(o) if o.skipped => report.skipped += 1,
                    Ok(o) => {
                        report.processed += 1;
                        report.chunks_created += o.chunks_indexed;
                    }
                    Err(Error::Cancelled) => {}
                    Err(e) => {
                        warn!(source = %source.id, path = %rel, error = %e, "failed to index file");
                        report.errors.push(format!("{}/{rel}: {e}", source.id));
                    }
                }
            }

            if self.cancelled.load(Ordering::SeqCst) {
                report.errors.push("indexing pass cancelled".to_string());
                report.duration_seconds = start.elapsed().as_secs_f64();
                return report;
            }
        }

        match self.reconcile().await {
            Ok(removed) if removed > 0 => {
                info!(removed, "reconciliation removed stale entries");
            }
            Ok(_) => {}
            Err(e) => report.errors.push(format!("reconcile failed: {e}")),
        }

        report.duration_seconds = start.elapsed().as_secs_f64();
        info!(
            processed = report.processed,
            skipped = report.skipped,
            chunks = report.chunks_created,
            errors = report.errors.len(),
            "indexing pass complete"
        );
        report
    }

    /// Index one file through the same pipeline.
    pub async fn index_single(&self, source_id: &str, rel_path: &str) -> Result<SingleOutcome> {
        self.index_single_inner(source_id, rel_path, false).await
    }

    async fn index_single_inner(
        &self,
        source_id: &str,
        rel_path: &str,
        force: bool,
    ) -> Result<SingleOutcome> {
        let source = self
            .registry
            .get(source_id)
            .ok_or_else(|| Error::NotFound(format!("source {source_id}")))?;
        let abs_path = source.root_path.join(rel_path);

        let _guard = self.lock_path(source_id, rel_path).await;

        let bytes = match tokio::fs::read(&abs_path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(Error::NotFound(format!("{source_id}/{rel_path}")));
            }
            Err(e) => return Err(e.into()),
        };

        let content_hash = blake3::hash(&bytes).to_hex().to_string();

        if !force {
            if let Some(stored) = self.repo.content_hash(source_id, rel_path).await? {
                if stored == content_hash {
                    debug!(source_id, rel_path, "content unchanged, skipping");
                    return Ok(SingleOutcome {
                        chunks_indexed: 0,
                        skipped: true,
                    });
                }
            }
        }

        let content = String::from_utf8_lossy(&bytes);
        let tags = extract_all_tags(&content);
        let outbound_links = extract_wikilinks(&content);
        let pieces = self.chunker.chunk(&content, Some(rel_path));

        if pieces.is_empty() {
            // Nothing to embed; drop whatever rows a previous version left.
            debug!(source_id, rel_path, "no chunks produced, clearing index entry");
            self.repo.delete_by_path(source_id, rel_path).await?;
            return Ok(SingleOutcome::default());
        }

        let texts: Vec<String> = pieces.iter().map(|p| p.text.clone()).collect();

        let vectors = {
            let _permit = self
                .embed_limit
                .acquire()
                .await
                .map_err(|e| Error::Other(format!("embed semaphore closed: {e}")))?;
            self.embedder.embed_batch(&texts).await?
        };

        if vectors.len() != pieces.len() {
            return Err(Error::Inconsistency(format!(
                "embedder returned {} vectors for {} chunks",
                vectors.len(),
                pieces.len()
            )));
        }

        let chunks = build_chunks(
            source_id,
            rel_path,
            &content_hash,
            &tags,
            &outbound_links,
            pieces,
            vectors,
        );

        // Clear stale rows before inserting so a shortened file leaves
        // no ghost chunks behind.
        self.repo.delete_by_path(source_id, rel_path).await?;
        self.repo.upsert(&chunks).await?;

        info!(source_id, rel_path, chunks = chunks.len(), "indexed file");
        Ok(SingleOutcome {
            chunks_indexed: chunks.len() as u64,
            skipped: false,
        })
    }

    /// Drop every stored row for one file.
    pub async fn remove_file(&self, source_id: &str, rel_path: &str) -> Result<u64> {
        let _guard = self.lock_path(source_id, rel_path).await;
        let removed = self.repo.delete_by_path(source_id, rel_path).await?;
        if removed > 0 {
            info!(source_id, rel_path, removed, "removed file from index");
        }
        Ok(removed)
    }

    /// Handle a rename by rewriting ids and metadata, reusing the
    /// stored embeddings. Returns `false` when the old path had no
    /// rows and the destination was indexed from scratch instead.
    pub async fn move_file(&self, source_id: &str, from: &str, to: &str) -> Result<bool> {
        // Lock both paths in a stable order.
        let (first, second) = if from <= to { (from, to) } else { (to, from) };
        let _guard_a = self.lock_path(source_id, first).await;
        let _guard_b = self.lock_path(source_id, second).await;

        let old_chunks = self.repo.get_by_path(source_id, from).await?;
        if old_chunks.is_empty() {
            drop(_guard_a);
            drop(_guard_b);
            self.index_single(source_id, to).await?;
            return Ok(false);
        }

        let new_title = note_title(to);
        let new_folder = folder_of(to);

        let moved: Vec<NoteChunk> = old_chunks
            .into_iter()
            .map(|mut chunk| {
                chunk.id = chunk_id(source_id, to, chunk.chunk_index);
                chunk.file_path = to.to_string();
                chunk.note_title = new_title.clone();
                chunk.folder = new_folder.clone();
                chunk
            })
            .collect();

        // Overwrite anything already at the destination, then insert
        // and drop the old rows. The removal is explicit to prevent
        // ghost entries.
        self.repo.delete_by_path(source_id, to).await?;
        self.repo.upsert(&moved).await?;
        self.repo.delete_by_path(source_id, from).await?;

        info!(source_id, from, to, chunks = moved.len(), "moved file in index");
        Ok(true)
    }

    /// Compare stored paths against directory contents, deleting
    /// entries whose files no longer exist. Runs at startup and after
    /// any full pass.
    pub async fn reconcile(&self) -> Result<u64> {
        let indexed = self.repo.indexed_paths().await?;

        let mut on_disk: HashSet<(String, String)> = HashSet::new();
        let mut unlistable: HashSet<String> = HashSet::new();

        for source in self.registry.sources() {
            match self.registry.discover(&source.id) {
                Ok(files) => {
                    for (_, rel) in files {
                        on_disk.insert((source.id.clone(), rel));
                    }
                }
                Err(e) => {
                    // Never mass-delete a source we could not enumerate.
                    warn!(source = %source.id, error = %e, "discovery failed, keeping entries");
                    unlistable.insert(source.id.clone());
                }
            }
        }

        let mut removed = 0u64;
        for (source_id, file_path) in indexed {
            if unlistable.contains(&source_id) {
                continue;
            }
            let known_source = self.registry.get(&source_id).is_some();
            if known_source && on_disk.contains(&(source_id.clone(), file_path.clone())) {
                continue;
            }
            removed += self.repo.delete_by_path(&source_id, &file_path).await?;
            debug!(source_id, file_path, "reconciled away stale entry");
        }

        Ok(removed)
    }

    async fn lock_path(&self, source_id: &str, rel_path: &str) -> tokio::sync::OwnedMutexGuard<()> {
        let key = format!("{source_id}::{rel_path}");
        let lock = {
            let mut locks = self.path_locks.lock().await;
            Arc::clone(locks.entry(key).or_insert_with(|| Arc::new(Mutex::new(()))))
        };
        lock.lock_owned().await
    }
}

fn build_chunks(
    source_id: &str,
    rel_path: &str,
    content_hash: &str,
    tags: &[String],
    outbound_links: &[String],
    pieces: Vec<ChunkPiece>,
    vectors: Vec<Vec<f32>>,
) -> Vec<NoteChunk> {
    let title = note_title(rel_path);
    let folder = folder_of(rel_path);

    pieces
        .into_iter()
        .zip(vectors)
        .enumerate()
        .map(|(index, (piece, vector))| {
            let index = index as u32;
            NoteChunk {
                id: chunk_id(source_id, rel_path, index),
                source_id: source_id.to_string(),
                file_path: rel_path.to_string(),
                note_title: title.clone(),
                folder: folder.clone(),
                chunk_index: index,
                header_context: piece.header_context,
                content_hash: content_hash.to_string(),
                text: piece.text,
                token_count: piece.token_count,
                tags: tags.to_vec(),
                outbound_links: outbound_links.to_vec(),
                embedding: Some(vector),
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use semvault_core::{EmbedError, Source};
    use semvault_store::MemoryStore;
    use std::path::Path;
    use std::sync::atomic::AtomicUsize;
    use tempfile::{tempdir, TempDir};

    const TEST_DIM: usize = 16;

    /// Deterministic embedder that counts upstream calls.
    struct MockEmbedder {
        calls: AtomicUsize,
    }

    impl MockEmbedder {
        fn new() -> Self {
            Self {
                calls: AtomicUsize::new(0),
            }
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl Embedder for MockEmbedder {
        fn model_name(&self) -> &str {
            "mock-embedder"
        }

        fn dimension(&self) -> usize {
            TEST_DIM
        }

        async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbedError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(texts
                .iter()
                .map(|text| {
                    let hash = blake3::hash(text.as_bytes());
                    let bytes = hash.as_bytes();
                    (0..TEST_DIM)
                        .map(|i| (f32::from(bytes[i % 32]) / 255.0) - 0.5)
                        .collect()
                })
                .collect())
        }
    }

    struct Harness {
        _temp: TempDir,
        root: std::path::PathBuf,
        indexer: Indexer,
        repo: Arc<MemoryStore>,
        embedder: Arc<MockEmbedder>,
    }

    fn harness() -> Harness {
        let temp = tempdir().unwrap();
        let root = temp.path().to_path_buf();
        let registry =
            Arc::new(SourceRegistry::new(vec![Source::markdown("vault", &root)]).unwrap());
        let repo = Arc::new(MemoryStore::new());
        let embedder = Arc::new(MockEmbedder::new());
        let indexer = Indexer::new(
            registry,
            Arc::clone(&repo) as Arc<dyn VectorRepository>,
            Arc::clone(&embedder) as Arc<dyn Embedder>,
            Arc::new(MarkdownChunker::with_defaults()),
            DEFAULT_CONCURRENCY,
        );
        Harness {
            _temp: temp,
            root,
            indexer,
            repo,
            embedder,
        }
    }

    fn write(root: &Path, rel: &str, content: &str) {
        let path = root.join(rel);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, content).unwrap();
    }

    #[tokio::test]
    async fn test_index_single_creates_chunks() {
        let h = harness();
        write(&h.root, "a.md", "# Title\n\nSome body text with #tag and [[Other]].");

        let outcome = h.indexer.index_single("vault", "a.md").await.unwrap();
        assert!(!outcome.skipped);
        assert_eq!(outcome.chunks_indexed, 1);

        let chunks = h.repo.get_by_path("vault", "a.md").await.unwrap();
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].id, "vault::a.md::0");
        assert_eq!(chunks[0].tags, vec!["tag"]);
        assert_eq!(chunks[0].outbound_links, vec!["Other"]);
        assert!(chunks[0].embedding.is_some());
    }

    #[tokio::test]
    async fn test_unchanged_file_skipped_without_embedding() {
        let h = harness();
        write(&h.root, "a.md", "# Title\n\nStable content.");

        h.indexer.index_single("vault", "a.md").await.unwrap();
        let calls_after_first = h.embedder.calls();

        let second = h.indexer.index_single("vault", "a.md").await.unwrap();
        assert!(second.skipped);
        assert_eq!(second.chunks_indexed, 0);
        assert_eq!(
            h.embedder.calls(),
            calls_after_first,
            "no embedding call for an unchanged file"
        );
    }

    #[tokio::test]
    async fn test_modified_file_replaces_stale_chunks() {
        let h = harness();
        // Long first version produces several chunks
        let long_body: String = (0..5)
            .map(|i| format!("## Section {i}\n\n{}\n\n", "word ".repeat(1200)))
            .collect();
        write(&h.root, "a.md", &long_body);
        h.indexer.index_single("vault", "a.md").await.unwrap();
        let first_count = h.repo.get_by_path("vault", "a.md").await.unwrap().len();
        assert!(first_count > 1);

        // Shortened second version
        write(&h.root, "a.md", "# Short\n\nnow tiny");
        h.indexer.index_single("vault", "a.md").await.unwrap();

        let chunks = h.repo.get_by_path("vault", "a.md").await.unwrap();
        assert_eq!(chunks.len(), 1, "stale chunks from the long version are gone");
        let indices: Vec<u32> = chunks.iter().map(|c| c.chunk_index).collect();
        assert_eq!(indices, vec![0]);
    }

    #[tokio::test]
    async fn test_empty_file_clears_entry() {
        let h = harness();
        write(&h.root, "a.md", "# Content\n\nbody");
        h.indexer.index_single("vault", "a.md").await.unwrap();

        write(&h.root, "a.md", "");
        let outcome = h.indexer.index_single("vault", "a.md").await.unwrap();
        assert_eq!(outcome.chunks_indexed, 0);

        let chunks = h.repo.get_by_path("vault", "a.md").await.unwrap();
        assert!(chunks.is_empty());
    }

    #[tokio::test]
    async fn test_missing_file_not_found() {
        let h = harness();
        let err = h.indexer.index_single("vault", "absent.md").await.unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }

    #[tokio::test]
    async fn test_index_all_incremental_skip() {
        let h = harness();
        write(&h.root, "a.md", "# A\n\nalpha");
        write(&h.root, "b.md", "# B\n\nbeta");

        let first = h.indexer.index_all(false).await;
        assert_eq!(first.processed, 2);
        assert_eq!(first.skipped, 0);
        assert!(first.errors.is_empty());

        let calls = h.embedder.calls();
        let second = h.indexer.index_all(false).await;
        assert_eq!(second.processed, 0);
        assert_eq!(second.skipped, 2);
        assert_eq!(second.chunks_created, 0);
        assert_eq!(h.embedder.calls(), calls, "incremental pass embeds nothing");
    }

    #[tokio::test]
    async fn test_index_all_force_reembeds() {
        let h = harness();
        write(&h.root, "a.md", "# A\n\nalpha");

        h.indexer.index_all(false).await;
        let report = h.indexer.index_all(true).await;
        assert_eq!(report.processed, 1);
        assert_eq!(report.skipped, 0);
    }

    #[tokio::test]
    async fn test_reconcile_removes_deleted_files() {
        let h = harness();
        write(&h.root, "keep.md", "# Keep\n\nstay");
        write(&h.root, "gone.md", "# Gone\n\nleave");
        h.indexer.index_all(false).await;

        std::fs::remove_file(h.root.join("gone.md")).unwrap();
        let removed = h.indexer.reconcile().await.unwrap();
        assert!(removed > 0);

        let paths = h.repo.indexed_paths().await.unwrap();
        assert_eq!(paths, vec![("vault".to_string(), "keep.md".to_string())]);

        // Quiescent: a second reconcile is a no-op
        assert_eq!(h.indexer.reconcile().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_index_all_runs_reconcile() {
        let h = harness();
        write(&h.root, "a.md", "# A\n\nalpha");
        h.indexer.index_all(false).await;

        std::fs::remove_file(h.root.join("a.md")).unwrap();
        h.indexer.index_all(false).await;

        assert!(h.repo.indexed_paths().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_move_file_reuses_embeddings() {
        let h = harness();
        write(&h.root, "old/a.md", "# A\n\nalpha content");
        h.indexer.index_single("vault", "old/a.md").await.unwrap();
        let hash_before = h
            .repo
            .content_hash("vault", "old/a.md")
            .await
            .unwrap()
            .unwrap();
        let calls = h.embedder.calls();

        let reused = h
            .indexer
            .move_file("vault", "old/a.md", "new/a.md")
            .await
            .unwrap();
        assert!(reused);
        assert_eq!(h.embedder.calls(), calls, "move must not re-embed");

        let old = h.repo.get_by_path("vault", "old/a.md").await.unwrap();
        assert!(old.is_empty());

        let new = h.repo.get_by_path("vault", "new/a.md").await.unwrap();
        assert_eq!(new.len(), 1);
        assert_eq!(new[0].id, "vault::new/a.md::0");
        assert_eq!(new[0].note_title, "a");
        assert_eq!(new[0].folder, "new");
        assert_eq!(new[0].content_hash, hash_before);
        assert!(new[0].embedding.is_some());
    }

    #[tokio::test]
    async fn test_move_unindexed_source_indexes_destination() {
        let h = harness();
        write(&h.root, "new/b.md", "# B\n\nbody");

        let reused = h
            .indexer
            .move_file("vault", "never-indexed.md", "new/b.md")
            .await
            .unwrap();
        assert!(!reused);
        assert_eq!(h.repo.get_by_path("vault", "new/b.md").await.unwrap().len(), 1);
    }

    /// Embedder that rejects any batch containing a poison marker.
    struct FlakyEmbedder {
        inner: MockEmbedder,
    }

    #[async_trait]
    impl Embedder for FlakyEmbedder {
        fn model_name(&self) -> &str {
            "flaky-embedder"
        }

        fn dimension(&self) -> usize {
            TEST_DIM
        }

        async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbedError> {
            if texts.iter().any(|t| t.contains("POISON")) {
                return Err(EmbedError::Upstream("synthetic failure".to_string()));
            }
            self.inner.embed_batch(texts).await
        }
    }

    #[tokio::test]
    async fn test_per_file_error_does_not_abort_pass() {
        let temp = tempdir().unwrap();
        let root = temp.path().to_path_buf();
        write(&root, "good.md", "# Good\n\nfine");
        write(&root, "bad.md", "# Bad\n\nPOISON text");

        let registry =
            Arc::new(SourceRegistry::new(vec![Source::markdown("vault", &root)]).unwrap());
        let repo = Arc::new(MemoryStore::new());
        let indexer = Indexer::new(
            registry,
            Arc::clone(&repo) as Arc<dyn VectorRepository>,
            Arc::new(FlakyEmbedder {
                inner: MockEmbedder::new(),
            }),
            Arc::new(MarkdownChunker::with_defaults()),
            DEFAULT_CONCURRENCY,
        );

        let report = indexer.index_all(false).await;
        assert_eq!(report.processed, 1);
        assert_eq!(report.errors.len(), 1);
        assert!(report.errors[0].contains("bad.md"));

        // The failed file left no partial rows behind
        assert!(repo.get_by_path("vault", "bad.md").await.unwrap().is_empty());
        assert_eq!(repo.get_by_path("vault", "good.md").await.unwrap().len(), 1);
    }
}

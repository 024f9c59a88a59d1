//! Link-graph analytics over the indexed corpus.
//!
//! All operations here derive from the implicit `[[wiki-link]]` graph
//! and the stored chunk vectors: link suggestions, orphan detection,
//! in-degree ranking, duplicate detection, and corpus statistics.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::path::Path;
use std::sync::Arc;

use semvault_core::{
    DuplicatePair, Embedder, Error, LinkCount, LinkSuggestion, Result, SearchFilter, TagCount,
    VaultStatistics, VectorRepository,
};
use semvault_chunker::{extract_wikilinks, MarkdownChunker};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Weight of the best-matching chunk in the combined suggestion score;
/// the remainder weights mean similarity (coverage).
const MAX_WEIGHT: f32 = 0.7;
const MEAN_WEIGHT: f32 = 0.3;

/// Default centroid similarity above which two files count as duplicates.
pub const DEFAULT_DUPLICATE_THRESHOLD: f32 = 0.95;

/// A note no other note links to.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrphanNote {
    pub source_id: String,
    pub file_path: String,
    pub note_title: String,
}

/// Options for link suggestion.
#[derive(Debug, Clone)]
pub struct SuggestOptions {
    pub n: usize,
    pub min_similarity: f32,
    pub exclude_current: bool,
    pub filter: SearchFilter,
}

impl Default for SuggestOptions {
    fn default() -> Self {
        Self {
            n: 5,
            min_similarity: 0.5,
            exclude_current: true,
            filter: SearchFilter::default(),
        }
    }
}

/// Graph-derived analytics over the vector repository.
pub struct LinkAnalytics {
    repo: Arc<dyn VectorRepository>,
    embedder: Arc<dyn Embedder>,
    chunker: Arc<MarkdownChunker>,
}

impl LinkAnalytics {
    pub fn new(
        repo: Arc<dyn VectorRepository>,
        embedder: Arc<dyn Embedder>,
        chunker: Arc<MarkdownChunker>,
    ) -> Self {
        Self {
            repo,
            embedder,
            chunker,
        }
    }

    /// Suggest related notes to link from the given note.
    ///
    /// Stored embeddings are reused when the on-disk content hash still
    /// matches; otherwise the current content is chunked and embedded
    /// on the fly. Targets already linked from the note (per the
    /// on-disk content, which is authoritative) are never suggested.
    pub async fn suggest_links(
        &self,
        source_id: &str,
        rel_path: &str,
        abs_path: &Path,
        opts: &SuggestOptions,
    ) -> Result<Vec<LinkSuggestion>> {
        let bytes = match tokio::fs::read(abs_path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(Error::NotFound(format!("{source_id}/{rel_path}")));
            }
            Err(e) => return Err(e.into()),
        };
        let content = String::from_utf8_lossy(&bytes);

        let existing_links: HashSet<String> =
            extract_wikilinks(&content).into_iter().collect();

        let current_hash = blake3::hash(&bytes).to_hex().to_string();
        let stored_hash = self.repo.content_hash(source_id, rel_path).await?;

        let embeddings: Vec<Vec<f32>> = if stored_hash.as_deref() == Some(current_hash.as_str()) {
            // Unchanged file: reuse the stored vectors.
            self.repo
                .get_by_path(source_id, rel_path)
                .await?
                .into_iter()
                .filter_map(|c| c.embedding)
                .collect()
        } else {
            debug!(source_id, rel_path, "content changed, embedding on the fly");
            let pieces = self.chunker.chunk(&content, Some(rel_path));
            let texts: Vec<String> = pieces.into_iter().map(|p| p.text).collect();
            if texts.is_empty() {
                vec![]
            } else {
                self.embedder.embed_batch(&texts).await?
            }
        };

        if embeddings.is_empty() {
            return Ok(vec![]);
        }

        // Collect per-target similarities across every chunk vector.
        struct Candidate {
            similarities: Vec<f32>,
            best_similarity: f32,
            note_title: String,
            header_context: String,
        }
        let mut candidates: HashMap<String, Candidate> = HashMap::new();

        for embedding in &embeddings {
            let matches = self
                .repo
                .query(embedding, opts.n * 2, &opts.filter)
                .await?;

            for scored in matches {
                let chunk = &scored.chunk;
                if opts.exclude_current
                    && chunk.source_id == source_id
                    && chunk.file_path == rel_path
                {
                    continue;
                }
                if existing_links.contains(&chunk.note_title) {
                    continue;
                }

                let similarity = scored.similarity();
                if similarity < opts.min_similarity {
                    continue;
                }

                let entry = candidates
                    .entry(chunk.file_path.clone())
                    .or_insert_with(|| Candidate {
                        similarities: Vec::new(),
                        best_similarity: f32::MIN,
                        note_title: chunk.note_title.clone(),
                        header_context: chunk.header_context.clone(),
                    });
                entry.similarities.push(similarity);
                if similarity > entry.best_similarity {
                    entry.best_similarity = similarity;
                    entry.header_context = chunk.header_context.clone();
                }
            }
        }

        let mut suggestions: Vec<LinkSuggestion> = candidates
            .into_iter()
            .map(|(file_path, candidate)| {
                let mean = candidate.similarities.iter().sum::<f32>()
                    / candidate.similarities.len() as f32;
                let combined = MAX_WEIGHT * candidate.best_similarity + MEAN_WEIGHT * mean;

                let suggested_link = format_link(&candidate.note_title, &candidate.header_context);
                LinkSuggestion {
                    file_path,
                    note_title: candidate.note_title,
                    similarity: combined,
                    reason: format!("Related to section: {}", candidate.header_context),
                    suggested_link,
                }
            })
            .collect();

        suggestions.sort_by(|a, b| {
            b.similarity
                .partial_cmp(&a.similarity)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        suggestions.truncate(opts.n);
        Ok(suggestions)
    }

    /// Files no chunk's outbound links refer to. Title matching is by
    /// filename without extension.
    pub async fn orphaned_notes(&self) -> Result<Vec<OrphanNote>> {
        let rows = self.repo.scan_metadata().await?;

        let mut files: BTreeSet<(String, String)> = BTreeSet::new();
        let mut title_to_files: HashMap<String, Vec<(String, String)>> = HashMap::new();
        for row in &rows {
            let key = (row.source_id.clone(), row.file_path.clone());
            if files.insert(key.clone()) {
                title_to_files
                    .entry(row.note_title.clone())
                    .or_default()
                    .push(key);
            }
        }

        let mut linked: HashSet<(String, String)> = HashSet::new();
        for row in &rows {
            for link in &row.outbound_links {
                if let Some(targets) = title_to_files.get(link.as_str()) {
                    linked.extend(targets.iter().cloned());
                }
            }
        }

        Ok(files
            .into_iter()
            .filter(|key| !linked.contains(key))
            .map(|(source_id, file_path)| OrphanNote {
                note_title: semvault_core::note_title(&file_path),
                source_id,
                file_path,
            })
            .collect())
    }

    /// Notes ranked by incoming-link count, descending.
    pub async fn most_linked(&self, n: usize) -> Result<Vec<LinkCount>> {
        let rows = self.repo.scan_metadata().await?;

        // Count per file so multi-chunk files don't inflate their own links.
        let mut per_file: HashMap<(String, String), &Vec<String>> = HashMap::new();
        for row in &rows {
            per_file
                .entry((row.source_id.clone(), row.file_path.clone()))
                .or_insert(&row.outbound_links);
        }

        let mut counts: HashMap<String, u64> = HashMap::new();
        for links in per_file.values() {
            for link in links.iter() {
                *counts.entry(link.clone()).or_default() += 1;
            }
        }

        let mut ranked: Vec<LinkCount> = counts
            .into_iter()
            .map(|(note, count)| LinkCount { note, count })
            .collect();
        ranked.sort_by(|a, b| b.count.cmp(&a.count).then(a.note.cmp(&b.note)));
        ranked.truncate(n);
        Ok(ranked)
    }

    /// Detailed corpus statistics from one metadata scan.
    pub async fn vault_statistics(&self) -> Result<VaultStatistics> {
        let rows = self.repo.scan_metadata().await?;

        let mut files: HashSet<(String, String)> = HashSet::new();
        let mut tag_counts: HashMap<String, u64> = HashMap::new();
        let mut link_counts: HashMap<String, u64> = HashMap::new();
        let mut total_links = 0u64;
        let mut total_tags = 0u64;

        for row in &rows {
            files.insert((row.source_id.clone(), row.file_path.clone()));
            for tag in &row.tags {
                *tag_counts.entry(tag.clone()).or_default() += 1;
                total_tags += 1;
            }
            for link in &row.outbound_links {
                *link_counts.entry(link.clone()).or_default() += 1;
                total_links += 1;
            }
        }

        let top = |counts: &HashMap<String, u64>| {
            let mut ranked: Vec<(String, u64)> =
                counts.iter().map(|(k, v)| (k.clone(), *v)).collect();
            ranked.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(&b.0)));
            ranked.truncate(10);
            ranked
        };

        Ok(VaultStatistics {
            total_files: files.len() as u64,
            total_chunks: rows.len() as u64,
            total_links,
            unique_links: link_counts.len() as u64,
            total_tags,
            unique_tags: tag_counts.len() as u64,
            most_linked_notes: top(&link_counts)
                .into_iter()
                .map(|(note, count)| LinkCount { note, count })
                .collect(),
            most_used_tags: top(&tag_counts)
                .into_iter()
                .map(|(tag, count)| TagCount { tag, count })
                .collect(),
        })
    }

    /// Pairs of files whose L2-normalized centroid vectors exceed the
    /// similarity threshold. Each unordered pair is emitted once.
    pub async fn duplicate_content(&self, threshold: f32) -> Result<Vec<DuplicatePair>> {
        let vectors = self.repo.scan_vectors().await?;

        // Accumulate per-file centroids.
        let mut sums: HashMap<(String, String), (Vec<f32>, usize)> = HashMap::new();
        for fv in vectors {
            let entry = sums
                .entry((fv.source_id, fv.file_path))
                .or_insert_with(|| (vec![0.0; fv.vector.len()], 0));
            if entry.0.len() == fv.vector.len() {
                for (slot, v) in entry.0.iter_mut().zip(&fv.vector) {
                    *slot += v;
                }
                entry.1 += 1;
            }
        }

        let mut keys: Vec<(String, String)> = Vec::with_capacity(sums.len());
        let mut centroids: Vec<Vec<f32>> = Vec::with_capacity(sums.len());
        for (key, (sum, count)) in sums {
            let mut centroid: Vec<f32> = sum.iter().map(|v| v / count as f32).collect();
            let norm = centroid.iter().map(|v| v * v).sum::<f32>().sqrt();
            if norm == 0.0 {
                continue;
            }
            for v in &mut centroid {
                *v /= norm;
            }
            keys.push(key);
            centroids.push(centroid);
        }

        // Pairwise similarity over normalized centroids, blocked to
        // keep the inner loops cache-friendly on large corpora.
        const BLOCK: usize = 256;
        let mut duplicates = Vec::new();
        for block_start in (0..centroids.len()).step_by(BLOCK) {
            let block_end = (block_start + BLOCK).min(centroids.len());
            for i in block_start..block_end {
                for j in (i + 1)..centroids.len() {
                    let dot: f32 = centroids[i]
                        .iter()
                        .zip(&centroids[j])
                        .map(|(a, b)| a * b)
                        .sum();
                    if dot >= threshold {
                        duplicates.push(DuplicatePair {
                            file_a: format!("{}::{}", keys[i].0, keys[i].1),
                            file_b: format!("{}::{}", keys[j].0, keys[j].1),
                            similarity: dot,
                        });
                    }
                }
            }
        }

        duplicates.sort_by(|a, b| {
            b.similarity
                .partial_cmp(&a.similarity)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        Ok(duplicates)
    }
}

/// `[[Title]]`, or `[[Title#Section]]` when a header context exists.
fn format_link(title: &str, header_context: &str) -> String {
    let clean_header = header_context
        .rsplit(" / ")
        .next()
        .unwrap_or("")
        .trim_start_matches('#')
        .trim();
    if clean_header.is_empty() {
        format!("[[{title}]]")
    } else {
        format!("[[{title}#{clean_header}]]")
    }
}

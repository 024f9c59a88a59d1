//! Core types for semvault.
//!
//! Shared data structures used across the workspace:
//!
//! ## Sources
//! - [`Source`]: a named, typed root directory for ingestion
//! - [`SourceKind`]: what kind of content a source holds
//!
//! ## Chunks
//! - [`NoteChunk`]: the unit of retrieval, one embedding per chunk
//! - [`ChunkPiece`]: raw chunker output before metadata is attached
//! - [`ChunkSizes`]: token thresholds for the chunker
//!
//! ## Search
//! - [`SearchFilter`]: metadata predicate applied before retrieval
//! - [`ScoredChunk`]: a repository match with its cosine distance
//! - [`SearchHit`]: a fully-shaped result returned by the query service
//!
//! ## Reporting
//! - [`IndexReport`]: outcome of an indexing pass
//! - [`RepoStats`] / [`VaultStatistics`]: repository and corpus stats

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

// ============================================================================
// Sources
// ============================================================================

/// Content kind of a source root.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    #[default]
    Markdown,
    Code,
    Text,
}

impl SourceKind {
    /// Default include globs for this kind of source.
    pub fn default_include(self) -> Vec<String> {
        match self {
            SourceKind::Markdown => vec!["**/*.md".to_string()],
            SourceKind::Code | SourceKind::Text => vec!["**/*".to_string()],
        }
    }
}

/// A named root directory for ingestion.
///
/// Immutable during a run; reconfiguration requires restart.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Source {
    /// Short stable identifier (e.g. `vault`, `current_project`)
    pub id: String,
    /// Human-readable name
    pub display_name: String,
    /// Absolute root path
    pub root_path: PathBuf,
    /// Content kind
    #[serde(default)]
    pub kind: SourceKind,
    /// Include globs, relative to the root
    #[serde(default)]
    pub include: Vec<String>,
    /// Exclude globs, relative to the root
    #[serde(default)]
    pub exclude: Vec<String>,
}

impl Source {
    /// Create a markdown source with default globs.
    pub fn markdown(id: impl Into<String>, root: impl Into<PathBuf>) -> Self {
        let id = id.into();
        Self {
            display_name: id.clone(),
            id,
            root_path: root.into(),
            kind: SourceKind::Markdown,
            include: SourceKind::Markdown.default_include(),
            exclude: Vec::new(),
        }
    }
}

// ============================================================================
// Chunk identifiers
// ============================================================================

/// Build the repository primary key for a chunk.
///
/// Literal format: `{source_id}::{relative_path}::{chunk_index}` where
/// the relative path uses forward slashes. Stable across restarts.
pub fn chunk_id(source_id: &str, file_path: &str, chunk_index: u32) -> String {
    format!("{source_id}::{file_path}::{chunk_index}")
}

/// Split a chunk id back into `(source_id, file_path, chunk_index)`.
///
/// The path component may itself contain `::` only if a file name does,
/// which the id format forbids; the first and last separators win.
pub fn parse_chunk_id(id: &str) -> Option<(&str, &str, u32)> {
    let (source_id, rest) = id.split_once("::")?;
    let (file_path, index) = rest.rsplit_once("::")?;
    let chunk_index = index.parse().ok()?;
    Some((source_id, file_path, chunk_index))
}

/// Normalize a relative path to the forward-slash form used in ids.
pub fn normalize_rel_path(path: &Path) -> String {
    let s = path.to_string_lossy();
    if std::path::MAIN_SEPARATOR == '/' {
        s.into_owned()
    } else {
        s.replace(std::path::MAIN_SEPARATOR, "/")
    }
}

/// Note title: file name without extension.
pub fn note_title(rel_path: &str) -> String {
    Path::new(rel_path)
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// Parent folder of a vault-relative path, empty for the root.
pub fn folder_of(rel_path: &str) -> String {
    match Path::new(rel_path).parent() {
        Some(p) if !p.as_os_str().is_empty() => normalize_rel_path(p),
        _ => String::new(),
    }
}

// ============================================================================
// Chunks
// ============================================================================

/// Raw chunker output: text plus its position in the header hierarchy.
#[derive(Debug, Clone, PartialEq)]
pub struct ChunkPiece {
    /// Chunk body
    pub text: String,
    /// "/"-joined ancestor Markdown headers at the chunk start
    pub header_context: String,
    /// Token estimate for the body
    pub token_count: u32,
}

/// The unit of retrieval stored in the vector repository.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NoteChunk {
    /// Primary key: `{source_id}::{relative_path}::{chunk_index}`
    pub id: String,
    /// Owning source
    pub source_id: String,
    /// Source-relative path, forward slashes
    pub file_path: String,
    /// File name without extension
    pub note_title: String,
    /// Parent folder relative to the source root, empty at the root
    pub folder: String,
    /// 0-based sequence within the file
    pub chunk_index: u32,
    /// "/"-joined ancestor headers
    pub header_context: String,
    /// Digest of the source file bytes (not of the chunk)
    pub content_hash: String,
    /// Chunk body
    pub text: String,
    /// Token estimate
    pub token_count: u32,
    /// Union of frontmatter tags and inline `#tag` occurrences
    pub tags: Vec<String>,
    /// Referenced note titles from `[[wiki-links]]`
    pub outbound_links: Vec<String>,
    /// Embedding vector; `None` before embedding
    #[serde(skip_serializing_if = "Option::is_none")]
    pub embedding: Option<Vec<f32>>,
}

/// Token thresholds for the chunker.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ChunkSizes {
    /// Aim for this many tokens per chunk
    pub target: u32,
    /// Never exceed this many tokens, except for a single atomic region
    pub max: u32,
    /// Merge chunks smaller than this into a sibling where possible
    pub min: u32,
    /// Trailing paragraphs up to this many tokens are carried forward
    /// into the next chunk when a section is subdivided
    pub overlap: u32,
}

impl Default for ChunkSizes {
    fn default() -> Self {
        Self {
            target: 1000,
            max: 2000,
            min: 100,
            overlap: 150,
        }
    }
}

// ============================================================================
// Search
// ============================================================================

/// Metadata predicate applied at the repository layer, pre-retrieval.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SearchFilter {
    /// Equality on the owning source
    pub source_id: Option<String>,
    /// Equality on the stored folder string
    pub folder: Option<String>,
    /// Set membership: every listed tag must be present on the chunk
    #[serde(default)]
    pub tags: Vec<String>,
}

impl SearchFilter {
    pub fn is_empty(&self) -> bool {
        self.source_id.is_none() && self.folder.is_none() && self.tags.is_empty()
    }

    /// Check a chunk's metadata against this filter.
    pub fn matches(&self, chunk: &NoteChunk) -> bool {
        if let Some(ref source) = self.source_id {
            if &chunk.source_id != source {
                return false;
            }
        }
        if let Some(ref folder) = self.folder {
            if &chunk.folder != folder {
                return false;
            }
        }
        self.tags
            .iter()
            .all(|t| chunk.tags.iter().any(|have| have == t))
    }
}

/// A repository match: the chunk plus its cosine distance in `[0, 2]`.
#[derive(Debug, Clone)]
pub struct ScoredChunk {
    pub chunk: NoteChunk,
    pub distance: f32,
}

impl ScoredChunk {
    /// `1 - distance`; for the ranges used here treated as `[0, 1]`.
    pub fn similarity(&self) -> f32 {
        1.0 - self.distance
    }
}

/// A fully-shaped search result emitted by the query service.
///
/// `similarity` is the reranker score when reranking is active, else
/// `1 - distance`. The two scales must not be compared.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchHit {
    pub id: String,
    pub text: String,
    pub similarity: f32,
    pub source_id: String,
    pub file_path: String,
    pub note_title: String,
    pub header_context: String,
    pub folder: String,
    pub tags: Vec<String>,
    pub chunk_index: u32,
    pub token_count: u32,
}

// ============================================================================
// Analytics
// ============================================================================

/// Metadata projection returned by a full repository scan.
#[derive(Debug, Clone)]
pub struct MetadataRow {
    pub source_id: String,
    pub file_path: String,
    pub note_title: String,
    pub tags: Vec<String>,
    pub outbound_links: Vec<String>,
}

/// One file's chunk vector, as returned by the vector scan.
#[derive(Debug, Clone)]
pub struct FileVector {
    pub source_id: String,
    pub file_path: String,
    pub vector: Vec<f32>,
}

/// A link suggestion for a note.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LinkSuggestion {
    pub file_path: String,
    pub note_title: String,
    pub similarity: f32,
    pub reason: String,
    pub suggested_link: String,
}

/// A pair of files whose centroids exceed the duplicate threshold.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DuplicatePair {
    pub file_a: String,
    pub file_b: String,
    pub similarity: f32,
}

/// A note with its incoming-link count.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LinkCount {
    pub note: String,
    pub count: u64,
}

/// A tag with its occurrence count.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TagCount {
    pub tag: String,
    pub count: u64,
}

/// Detailed corpus statistics.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct VaultStatistics {
    pub total_files: u64,
    pub total_chunks: u64,
    pub total_links: u64,
    pub unique_links: u64,
    pub total_tags: u64,
    pub unique_tags: u64,
    pub most_linked_notes: Vec<LinkCount>,
    pub most_used_tags: Vec<TagCount>,
}

// ============================================================================
// Reporting
// ============================================================================

/// Repository-level statistics.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RepoStats {
    pub total_chunks: u64,
    pub total_files: u64,
    pub collection_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub persist_path: Option<String>,
}

/// Outcome of an indexing pass.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IndexReport {
    /// Files that were (re-)embedded
    pub processed: u64,
    /// Files skipped because their content hash matched
    pub skipped: u64,
    /// Chunks written
    pub chunks_created: u64,
    /// Wall time of the pass
    pub duration_seconds: f64,
    /// Per-file error messages; a failure never aborts the pass
    pub errors: Vec<String>,
}

// ============================================================================
// File events
// ============================================================================

/// File system event delivered to the watcher.
#[derive(Debug, Clone)]
pub enum FileEvent {
    Created(PathBuf),
    Modified(PathBuf),
    Deleted(PathBuf),
    Moved { from: PathBuf, to: PathBuf },
}

#[cfg(test)]
mod tests {
    use super::*;

    // ==================== Chunk id tests ====================

    #[test]
    fn test_chunk_id_format() {
        assert_eq!(
            chunk_id("vault", "projects/trading.md", 3),
            "vault::projects/trading.md::3"
        );
    }

    #[test]
    fn test_parse_chunk_id_roundtrip() {
        let id = chunk_id("vault", "a/b/c.md", 12);
        let (source, path, idx) = parse_chunk_id(&id).unwrap();
        assert_eq!(source, "vault");
        assert_eq!(path, "a/b/c.md");
        assert_eq!(idx, 12);
    }

    #[test]
    fn test_parse_chunk_id_invalid() {
        assert!(parse_chunk_id("no-separators").is_none());
        assert!(parse_chunk_id("vault::only-one-part").is_none());
        assert!(parse_chunk_id("vault::a.md::not-a-number").is_none());
    }

    #[test]
    fn test_note_title_and_folder() {
        assert_eq!(note_title("projects/trading.md"), "trading");
        assert_eq!(folder_of("projects/trading.md"), "projects");
        assert_eq!(folder_of("trading.md"), "");
        assert_eq!(folder_of("a/b/c.md"), "a/b");
    }

    // ==================== Source tests ====================

    #[test]
    fn test_source_markdown_defaults() {
        let src = Source::markdown("vault", "/data/vault");
        assert_eq!(src.id, "vault");
        assert_eq!(src.kind, SourceKind::Markdown);
        assert_eq!(src.include, vec!["**/*.md".to_string()]);
        assert!(src.exclude.is_empty());
    }

    #[test]
    fn test_source_kind_serialization() {
        assert_eq!(
            serde_json::to_string(&SourceKind::Markdown).unwrap(),
            "\"markdown\""
        );
        assert_eq!(serde_json::to_string(&SourceKind::Code).unwrap(), "\"code\"");
    }

    // ==================== ChunkSizes tests ====================

    #[test]
    fn test_chunk_sizes_default() {
        let sizes = ChunkSizes::default();
        assert_eq!(sizes.target, 1000);
        assert_eq!(sizes.max, 2000);
        assert_eq!(sizes.min, 100);
        assert_eq!(sizes.overlap, 150);
    }

    // ==================== SearchFilter tests ====================

    fn sample_chunk() -> NoteChunk {
        NoteChunk {
            id: chunk_id("vault", "notes/gold.md", 0),
            source_id: "vault".to_string(),
            file_path: "notes/gold.md".to_string(),
            note_title: "gold".to_string(),
            folder: "notes".to_string(),
            chunk_index: 0,
            header_context: "# Markets".to_string(),
            content_hash: "abc".to_string(),
            text: "gold rallied".to_string(),
            token_count: 2,
            tags: vec!["trading".to_string(), "gold".to_string()],
            outbound_links: vec!["Silver".to_string()],
            embedding: None,
        }
    }

    #[test]
    fn test_filter_empty_matches_everything() {
        let filter = SearchFilter::default();
        assert!(filter.is_empty());
        assert!(filter.matches(&sample_chunk()));
    }

    #[test]
    fn test_filter_source_equality() {
        let filter = SearchFilter {
            source_id: Some("vault".to_string()),
            ..Default::default()
        };
        assert!(filter.matches(&sample_chunk()));

        let filter = SearchFilter {
            source_id: Some("current_project".to_string()),
            ..Default::default()
        };
        assert!(!filter.matches(&sample_chunk()));
    }

    #[test]
    fn test_filter_folder_equality() {
        let filter = SearchFilter {
            folder: Some("notes".to_string()),
            ..Default::default()
        };
        assert!(filter.matches(&sample_chunk()));

        let filter = SearchFilter {
            folder: Some("note".to_string()),
            ..Default::default()
        };
        assert!(!filter.matches(&sample_chunk()), "no prefix matching");
    }

    #[test]
    fn test_filter_tag_membership() {
        let filter = SearchFilter {
            tags: vec!["gold".to_string()],
            ..Default::default()
        };
        assert!(filter.matches(&sample_chunk()));

        let filter = SearchFilter {
            tags: vec!["gold".to_string(), "silver".to_string()],
            ..Default::default()
        };
        assert!(!filter.matches(&sample_chunk()), "all tags must be present");

        // Exact member, not substring of a member
        let filter = SearchFilter {
            tags: vec!["gol".to_string()],
            ..Default::default()
        };
        assert!(!filter.matches(&sample_chunk()));
    }

    // ==================== Scoring tests ====================

    #[test]
    fn test_scored_chunk_similarity() {
        let scored = ScoredChunk {
            chunk: sample_chunk(),
            distance: 0.25,
        };
        assert!((scored.similarity() - 0.75).abs() < 1e-6);
    }

    // ==================== Serialization tests ====================

    #[test]
    fn test_note_chunk_serialization() {
        let chunk = sample_chunk();
        let json = serde_json::to_string(&chunk).unwrap();
        let back: NoteChunk = serde_json::from_str(&json).unwrap();
        assert_eq!(back.id, chunk.id);
        assert_eq!(back.tags, chunk.tags);
        assert!(!json.contains("embedding"), "absent vector is skipped");
    }

    #[test]
    fn test_index_report_default() {
        let report = IndexReport::default();
        assert_eq!(report.processed, 0);
        assert_eq!(report.skipped, 0);
        assert!(report.errors.is_empty());
    }
}

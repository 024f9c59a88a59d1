//! The operation surface: typed handlers plus a thin name-based
//! dispatcher for the request/response transport.
//!
//! Handlers never panic and never crash the service; `dispatch`
//! converts every internal error into a structured
//! `{success: false, error, detail}` envelope.

use std::path::Path;
use std::sync::Arc;

use regex::RegexBuilder;
use semvault_core::{
    DuplicatePair, Error, IndexReport, LinkCount, Result, SearchFilter, SearchHit, Source,
    VaultStatistics, VectorRepository,
};
use semvault_chunker::{
    extract_all_tags, extract_frontmatter_tags, extract_inline_tags, extract_wikilinks,
};
use semvault_index::{Indexer, SourceRegistry};
use semvault_query::{LinkAnalytics, OrphanNote, QueryService, SuggestOptions};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::info;

use crate::paths::safe_join;

// ============================================================================
// Request parameters
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct SearchParams {
    pub query: String,
    #[serde(default = "default_n_results")]
    pub n_results: usize,
    #[serde(default)]
    pub folder: Option<String>,
    /// Comma-separated tags; every tag must be present on a hit.
    #[serde(default)]
    pub tags: Option<String>,
    #[serde(default)]
    pub source: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
pub struct ReindexParams {
    #[serde(default)]
    pub force: bool,
}

#[derive(Debug, Deserialize)]
pub struct NotePathParams {
    pub path: String,
    #[serde(default)]
    pub source: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct SuggestLinksParams {
    pub path: String,
    #[serde(default = "default_n_suggestions")]
    pub n_suggestions: usize,
    #[serde(default = "default_min_similarity")]
    pub min_similarity: f32,
    #[serde(default = "default_true")]
    pub exclude_current: bool,
    #[serde(default)]
    pub folder: Option<String>,
    #[serde(default)]
    pub tags: Option<String>,
    #[serde(default)]
    pub source: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct WriteNoteParams {
    pub path: String,
    pub content: String,
    #[serde(default = "default_true")]
    pub create_dirs: bool,
    #[serde(default)]
    pub source: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct AppendNoteParams {
    pub path: String,
    pub content: String,
    #[serde(default)]
    pub source: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct SearchNotesParams {
    pub pattern: String,
    #[serde(default)]
    pub root_path: Option<String>,
    #[serde(default = "default_max_results")]
    pub max_results: usize,
    #[serde(default)]
    pub source: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
pub struct StructureParams {
    #[serde(default)]
    pub root_path: Option<String>,
    #[serde(default = "default_depth")]
    pub depth: usize,
    #[serde(default)]
    pub source: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
pub struct MostLinkedParams {
    #[serde(default = "default_most_linked")]
    pub n_results: usize,
}

#[derive(Debug, Deserialize, Default)]
pub struct DuplicateParams {
    #[serde(default = "default_duplicate_threshold")]
    pub similarity_threshold: f32,
}

fn default_n_results() -> usize {
    5
}
fn default_n_suggestions() -> usize {
    5
}
fn default_min_similarity() -> f32 {
    0.5
}
fn default_true() -> bool {
    true
}
fn default_max_results() -> usize {
    50
}
fn default_depth() -> usize {
    2
}
fn default_most_linked() -> usize {
    10
}
fn default_duplicate_threshold() -> f32 {
    semvault_query::DEFAULT_DUPLICATE_THRESHOLD
}

// ============================================================================
// Responses
// ============================================================================

#[derive(Debug, Serialize)]
pub struct IndexNoteResult {
    pub success: bool,
    pub file_path: String,
    pub chunks_indexed: u64,
    pub skipped: bool,
}

#[derive(Debug, Serialize)]
pub struct IndexStatsResult {
    pub total_chunks: u64,
    pub total_files: u64,
    pub collection_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub persist_path: Option<String>,
    pub embedding_model: String,
    pub sources: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct NoteMetadata {
    pub note_title: String,
    pub folder: String,
    pub tags: Vec<String>,
    pub frontmatter_tags: Vec<String>,
    pub inline_tags: Vec<String>,
    pub wikilinks: Vec<String>,
    pub size_bytes: u64,
    /// RFC 3339 modification time, when the filesystem reports one.
    pub last_modified: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ReadNoteResult {
    pub success: bool,
    pub file_path: String,
    pub content: String,
    pub metadata: NoteMetadata,
}

#[derive(Debug, Serialize)]
pub struct WriteNoteResult {
    pub success: bool,
    pub file_path: String,
    pub was_created: bool,
    pub size_bytes: u64,
    pub chunks_indexed: u64,
}

#[derive(Debug, Serialize)]
pub struct AppendNoteResult {
    pub success: bool,
    pub file_path: String,
    pub size_bytes: u64,
    pub chunks_indexed: u64,
}

#[derive(Debug, Serialize)]
pub struct DeleteNoteResult {
    pub success: bool,
    pub file_path: String,
    pub deleted: bool,
}

// ============================================================================
// Api
// ============================================================================

/// The wired service surface. One instance per process; every handler
/// is request-scoped.
pub struct Api {
    registry: Arc<SourceRegistry>,
    repo: Arc<dyn VectorRepository>,
    indexer: Arc<Indexer>,
    query: QueryService,
    analytics: LinkAnalytics,
    embedding_model: String,
}

impl Api {
    pub fn new(
        registry: Arc<SourceRegistry>,
        repo: Arc<dyn VectorRepository>,
        indexer: Arc<Indexer>,
        query: QueryService,
        analytics: LinkAnalytics,
        embedding_model: String,
    ) -> Self {
        Self {
            registry,
            repo,
            indexer,
            query,
            analytics,
            embedding_model,
        }
    }

    pub fn indexer(&self) -> &Arc<Indexer> {
        &self.indexer
    }

    pub fn registry(&self) -> &Arc<SourceRegistry> {
        &self.registry
    }

    /// Resolve an optional source id to a configured source, defaulting
    /// to the first one.
    fn source_for(&self, source: Option<&str>) -> Result<&Source> {
        match source {
            Some(id) => self
                .registry
                .get(id)
                .ok_or_else(|| Error::NotFound(format!("source {id}"))),
            None => self
                .registry
                .sources()
                .next()
                .ok_or_else(|| Error::Config("no sources configured".to_string())),
        }
    }

    fn build_filter(source: Option<String>, folder: Option<String>, tags: Option<String>) -> SearchFilter {
        SearchFilter {
            source_id: source,
            folder,
            tags: tags
                .map(|t| {
                    t.split(',')
                        .map(str::trim)
                        .filter(|s| !s.is_empty())
                        .map(String::from)
                        .collect()
                })
                .unwrap_or_default(),
        }
    }

    // ------------------------------------------------------------------
    // Search and indexing
    // ------------------------------------------------------------------

    pub async fn semantic_search(&self, params: SearchParams) -> Result<Vec<SearchHit>> {
        info!(query = %params.query, n = params.n_results, "semantic_search");
        let filter = Self::build_filter(params.source, params.folder, params.tags);
        self.query
            .search(&params.query, params.n_results, &filter)
            .await
    }

    pub async fn reindex_vault(&self, params: ReindexParams) -> Result<IndexReport> {
        info!(force = params.force, "reindex_vault");
        Ok(self.indexer.index_all(params.force).await)
    }

    pub async fn index_note(&self, params: NotePathParams) -> Result<IndexNoteResult> {
        let source = self.source_for(params.source.as_deref())?;
        let (_, rel) = safe_join(source, &params.path)?;

        let outcome = self.indexer.index_single(&source.id, &rel).await?;
        Ok(IndexNoteResult {
            success: true,
            file_path: rel,
            chunks_indexed: outcome.chunks_indexed,
            skipped: outcome.skipped,
        })
    }

    pub async fn get_index_stats(&self) -> Result<IndexStatsResult> {
        let stats = self.repo.stats().await.map_err(Error::Store)?;
        Ok(IndexStatsResult {
            total_chunks: stats.total_chunks,
            total_files: stats.total_files,
            collection_name: stats.collection_name,
            persist_path: stats.persist_path,
            embedding_model: self.embedding_model.clone(),
            sources: self.registry.sources().map(|s| s.id.clone()).collect(),
        })
    }

    pub async fn get_vault_statistics(&self) -> Result<VaultStatistics> {
        self.analytics.vault_statistics().await
    }

    // ------------------------------------------------------------------
    // Link analytics
    // ------------------------------------------------------------------

    pub async fn suggest_links(
        &self,
        params: SuggestLinksParams,
    ) -> Result<Vec<semvault_core::LinkSuggestion>> {
        let source = self.source_for(params.source.as_deref())?;
        let (abs, rel) = safe_join(source, &params.path)?;

        let opts = SuggestOptions {
            n: params.n_suggestions,
            min_similarity: params.min_similarity,
            exclude_current: params.exclude_current,
            filter: Self::build_filter(None, params.folder, params.tags),
        };
        self.analytics
            .suggest_links(&source.id, &rel, &abs, &opts)
            .await
    }

    pub async fn get_orphaned_notes(&self) -> Result<Vec<OrphanNote>> {
        self.analytics.orphaned_notes().await
    }

    pub async fn get_most_linked_notes(&self, params: MostLinkedParams) -> Result<Vec<LinkCount>> {
        self.analytics.most_linked(params.n_results).await
    }

    pub async fn get_duplicate_content(
        &self,
        params: DuplicateParams,
    ) -> Result<Vec<DuplicatePair>> {
        self.analytics
            .duplicate_content(params.similarity_threshold)
            .await
    }

    // ------------------------------------------------------------------
    // Note file operations
    // ------------------------------------------------------------------

    pub async fn read_note(&self, params: NotePathParams) -> Result<ReadNoteResult> {
        let source = self.source_for(params.source.as_deref())?;
        let (abs, rel) = safe_join(source, &params.path)?;

        let metadata = tokio::fs::metadata(&abs)
            .await
            .map_err(|_| Error::NotFound(rel.clone()))?;
        if !metadata.is_file() {
            return Err(Error::InvalidPath(format!("not a file: {rel}")));
        }

        let content = tokio::fs::read_to_string(&abs).await?;
        let last_modified = metadata
            .modified()
            .ok()
            .map(|t| chrono::DateTime::<chrono::Utc>::from(t).to_rfc3339());

        Ok(ReadNoteResult {
            success: true,
            metadata: NoteMetadata {
                note_title: semvault_core::note_title(&rel),
                folder: semvault_core::folder_of(&rel),
                tags: extract_all_tags(&content),
                frontmatter_tags: extract_frontmatter_tags(&content),
                inline_tags: extract_inline_tags(&content),
                wikilinks: extract_wikilinks(&content),
                size_bytes: metadata.len(),
                last_modified,
            },
            file_path: rel,
            content,
        })
    }

    /// Write a note, then index it.
    pub async fn write_note(&self, params: WriteNoteParams) -> Result<WriteNoteResult> {
        let source = self.source_for(params.source.as_deref())?;
        let (abs, rel) = safe_join(source, &params.path)?;

        let existed = abs.exists();

        if let Some(parent) = abs.parent() {
            if params.create_dirs {
                tokio::fs::create_dir_all(parent).await?;
            } else if !parent.exists() {
                return Err(Error::InvalidPath(format!(
                    "parent directory does not exist: {rel}"
                )));
            }
        }

        tokio::fs::write(&abs, &params.content).await?;
        let outcome = self.indexer.index_single(&source.id, &rel).await?;

        info!(file = %rel, created = !existed, chunks = outcome.chunks_indexed, "wrote note");
        Ok(WriteNoteResult {
            success: true,
            file_path: rel,
            was_created: !existed,
            size_bytes: params.content.len() as u64,
            chunks_indexed: outcome.chunks_indexed,
        })
    }

    /// Append to an existing note, then reindex it.
    pub async fn append_to_note(&self, params: AppendNoteParams) -> Result<AppendNoteResult> {
        let source = self.source_for(params.source.as_deref())?;
        let (abs, rel) = safe_join(source, &params.path)?;

        if !abs.is_file() {
            return Err(Error::NotFound(format!(
                "{rel} (use write_note to create new notes)"
            )));
        }

        let existing = tokio::fs::read_to_string(&abs).await?;
        let updated = format!("{existing}\n{}", params.content);
        tokio::fs::write(&abs, &updated).await?;

        let outcome = self.indexer.index_single(&source.id, &rel).await?;
        Ok(AppendNoteResult {
            success: true,
            file_path: rel,
            size_bytes: updated.len() as u64,
            chunks_indexed: outcome.chunks_indexed,
        })
    }

    /// Remove a note from the repository, then from disk.
    pub async fn delete_note(&self, params: NotePathParams) -> Result<DeleteNoteResult> {
        let source = self.source_for(params.source.as_deref())?;
        let (abs, rel) = safe_join(source, &params.path)?;

        if !abs.is_file() {
            return Err(Error::NotFound(rel));
        }

        self.indexer.remove_file(&source.id, &rel).await?;
        tokio::fs::remove_file(&abs).await?;

        info!(file = %rel, "deleted note");
        Ok(DeleteNoteResult {
            success: true,
            file_path: rel,
            deleted: true,
        })
    }

    /// Find notes whose relative path matches a regex pattern.
    pub async fn search_notes(&self, params: SearchNotesParams) -> Result<Vec<String>> {
        let source = self.source_for(params.source.as_deref())?;

        let regex = RegexBuilder::new(&params.pattern)
            .case_insensitive(true)
            .build()
            .map_err(|e| Error::Other(format!("invalid pattern: {e}")))?;

        let prefix = match params.root_path.as_deref() {
            Some(root) => {
                let (_, rel) = safe_join(source, root)?;
                Some(rel)
            }
            None => None,
        };

        let mut matches = Vec::new();
        for (_, rel) in self.registry.discover(&source.id)? {
            if let Some(ref prefix) = prefix {
                if !rel.starts_with(prefix.as_str()) {
                    continue;
                }
            }
            if regex.is_match(&rel) {
                matches.push(rel);
                if matches.len() >= params.max_results {
                    break;
                }
            }
        }
        Ok(matches)
    }

    /// A directory tree of the source, depth-limited.
    pub async fn get_vault_structure(&self, params: StructureParams) -> Result<Value> {
        let source = self.source_for(params.source.as_deref())?;
        let start = match params.root_path.as_deref() {
            Some(root) => safe_join(source, root)?.0,
            None => source.root_path.clone(),
        };

        if !start.exists() {
            return Err(Error::NotFound(format!(
                "{}",
                params.root_path.unwrap_or_default()
            )));
        }

        Ok(json!({ "structure": build_tree(&start, 0, params.depth) }))
    }
}

/// Recursively list directories and markdown files, truncating with
/// `"..."` past the depth limit.
fn build_tree(path: &Path, current_depth: usize, max_depth: usize) -> Value {
    if current_depth > max_depth {
        return Value::String("...".to_string());
    }

    let mut tree = serde_json::Map::new();
    let Ok(entries) = std::fs::read_dir(path) else {
        return Value::String("permission_denied".to_string());
    };

    let mut items: Vec<_> = entries.flatten().collect();
    items.sort_by_key(|e| e.file_name());

    for item in items {
        let name = item.file_name().to_string_lossy().into_owned();
        if name.starts_with('.') {
            continue;
        }
        let item_path = item.path();
        if item_path.is_dir() {
            tree.insert(name, build_tree(&item_path, current_depth + 1, max_depth));
        } else if item_path.extension().is_some_and(|e| e == "md") {
            tree.insert(name, Value::String("file".to_string()));
        }
    }

    Value::Object(tree)
}

// ============================================================================
// Dispatch
// ============================================================================

impl Api {
    /// Dispatch a named operation with JSON parameters. Never fails:
    /// internal errors become `{success: false, error, detail}`.
    pub async fn dispatch(&self, operation: &str, params: Value) -> Value {
        let result = self.dispatch_inner(operation, params).await;
        match result {
            Ok(value) => value,
            Err(e) => json!({
                "success": false,
                "error": e.kind(),
                "detail": e.to_string(),
            }),
        }
    }

    async fn dispatch_inner(&self, operation: &str, params: Value) -> Result<Value> {
        fn parse<T: serde::de::DeserializeOwned>(params: Value) -> Result<T> {
            serde_json::from_value(params).map_err(Error::Serialization)
        }
        fn out<T: Serialize>(value: T) -> Result<Value> {
            serde_json::to_value(value).map_err(Error::Serialization)
        }

        match operation {
            "semantic_search" => out(self.semantic_search(parse(params)?).await?),
            "reindex_vault" => out(self.reindex_vault(parse(params)?).await?),
            "index_note" => out(self.index_note(parse(params)?).await?),
            "get_index_stats" => out(self.get_index_stats().await?),
            "get_vault_statistics" => out(self.get_vault_statistics().await?),
            "suggest_links" => out(self.suggest_links(parse(params)?).await?),
            "read_note" => out(self.read_note(parse(params)?).await?),
            "write_note" => out(self.write_note(parse(params)?).await?),
            "append_to_note" => out(self.append_to_note(parse(params)?).await?),
            "delete_note" => out(self.delete_note(parse(params)?).await?),
            "search_notes" => out(self.search_notes(parse(params)?).await?),
            "get_vault_structure" => out(self.get_vault_structure(parse(params)?).await?),
            "get_orphaned_notes" => out(self.get_orphaned_notes().await?),
            "get_most_linked_notes" => out(self.get_most_linked_notes(parse(params)?).await?),
            "get_duplicate_content" => out(self.get_duplicate_content(parse(params)?).await?),
            other => Err(Error::NotFound(format!("unknown operation: {other}"))),
        }
    }
}

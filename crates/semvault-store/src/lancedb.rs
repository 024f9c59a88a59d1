//! `LanceDB` implementation of the vector repository.
//!
//! One `note_chunks` table holds every chunk row; `chunk_id` is the
//! primary key. Tags and outbound links are stored as comma-delimited
//! strings wrapped in leading/trailing commas so that membership
//! filters can use exact `LIKE '%,tag,%'` containment.

use arrow_array::{
    Array, ArrayRef, FixedSizeListArray, Float32Array, RecordBatch, RecordBatchIterator,
    StringArray, UInt32Array,
};
use arrow_schema::{DataType, Field, Schema};
use async_trait::async_trait;
use futures::TryStreamExt;
use lancedb::query::{ExecutableQuery, QueryBase};
use lancedb::{Connection, Table, connect};
use semvault_core::{
    FileVector, MetadataRow, NoteChunk, RepoStats, ScoredChunk, SearchFilter, StoreError,
    VectorRepository,
};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info};

const CHUNKS_TABLE: &str = "note_chunks";

/// LanceDB-backed vector repository.
pub struct LanceStore {
    /// Path to the `LanceDB` database directory
    db_path: PathBuf,
    /// Embedding dimension
    embedding_dim: usize,
    /// Database connection (lazy initialized)
    connection: RwLock<Option<Connection>>,
    /// Chunks table handle
    table: RwLock<Option<Table>>,
}

impl LanceStore {
    #[must_use]
    pub fn new(db_path: PathBuf, embedding_dim: usize) -> Self {
        Self {
            db_path,
            embedding_dim,
            connection: RwLock::new(None),
            table: RwLock::new(None),
        }
    }

    pub fn db_path(&self) -> &Path {
        &self.db_path
    }

    pub fn embedding_dim(&self) -> usize {
        self.embedding_dim
    }

    async fn get_connection(&self) -> Result<Connection, StoreError> {
        {
            let conn = self.connection.read().await;
            if let Some(ref c) = *conn {
                return Ok(c.clone());
            }
        }

        let mut conn = self.connection.write().await;
        if conn.is_none() {
            let db_path_str = self.db_path.to_string_lossy().to_string();
            let new_conn = connect(&db_path_str)
                .execute()
                .await
                .map_err(|e| StoreError::Init(format!("failed to connect to LanceDB: {e}")))?;
            *conn = Some(new_conn);
        }
        Ok(conn.as_ref().unwrap().clone())
    }

    async fn get_table(&self) -> Result<Table, StoreError> {
        {
            let table = self.table.read().await;
            if let Some(ref t) = *table {
                return Ok(t.clone());
            }
        }

        let conn = self.get_connection().await?;
        let mut table_lock = self.table.write().await;

        if table_lock.is_none() {
            let t = conn
                .open_table(CHUNKS_TABLE)
                .execute()
                .await
                .map_err(|e| StoreError::Init(format!("failed to open chunks table: {e}")))?;
            *table_lock = Some(t);
        }

        Ok(table_lock.as_ref().unwrap().clone())
    }

    fn schema(&self) -> Schema {
        Schema::new(vec![
            Field::new("chunk_id", DataType::Utf8, false),
            Field::new("source_id", DataType::Utf8, false),
            Field::new("file_path", DataType::Utf8, false),
            Field::new("note_title", DataType::Utf8, false),
            Field::new("folder", DataType::Utf8, false),
            Field::new("chunk_index", DataType::UInt32, false),
            Field::new("header_context", DataType::Utf8, false),
            Field::new("content_hash", DataType::Utf8, false),
            Field::new("text", DataType::Utf8, false),
            Field::new("token_count", DataType::UInt32, false),
            Field::new("tags", DataType::Utf8, false),
            Field::new("outbound_links", DataType::Utf8, false),
            Field::new(
                "vector",
                DataType::FixedSizeList(
                    Arc::new(Field::new("item", DataType::Float32, true)),
                    self.embedding_dim as i32,
                ),
                false,
            ),
        ])
    }

    fn chunks_to_batch(&self, chunks: &[NoteChunk]) -> Result<RecordBatch, StoreError> {
        let chunk_ids: Vec<_> = chunks.iter().map(|c| c.id.clone()).collect();
        let source_ids: Vec<_> = chunks.iter().map(|c| c.source_id.clone()).collect();
        let file_paths: Vec<_> = chunks.iter().map(|c| c.file_path.clone()).collect();
        let note_titles: Vec<_> = chunks.iter().map(|c| c.note_title.clone()).collect();
        let folders: Vec<_> = chunks.iter().map(|c| c.folder.clone()).collect();
        let chunk_indices: Vec<_> = chunks.iter().map(|c| c.chunk_index).collect();
        let header_contexts: Vec<_> = chunks.iter().map(|c| c.header_context.clone()).collect();
        let content_hashes: Vec<_> = chunks.iter().map(|c| c.content_hash.clone()).collect();
        let texts: Vec<_> = chunks.iter().map(|c| c.text.clone()).collect();
        let token_counts: Vec<_> = chunks.iter().map(|c| c.token_count).collect();
        let tags: Vec<_> = chunks.iter().map(|c| join_delimited(&c.tags)).collect();
        let links: Vec<_> = chunks
            .iter()
            .map(|c| join_delimited(&c.outbound_links))
            .collect();

        let vectors: Vec<Option<&Vec<f32>>> = chunks.iter().map(|c| c.embedding.as_ref()).collect();
        let vector_array = build_vector_array(&vectors, self.embedding_dim)?;

        let schema = Arc::new(self.schema());
        let batch = RecordBatch::try_new(
            schema,
            vec![
                Arc::new(StringArray::from(chunk_ids)),
                Arc::new(StringArray::from(source_ids)),
                Arc::new(StringArray::from(file_paths)),
                Arc::new(StringArray::from(note_titles)),
                Arc::new(StringArray::from(folders)),
                Arc::new(UInt32Array::from(chunk_indices)),
                Arc::new(StringArray::from(header_contexts)),
                Arc::new(StringArray::from(content_hashes)),
                Arc::new(StringArray::from(texts)),
                Arc::new(UInt32Array::from(token_counts)),
                Arc::new(StringArray::from(tags)),
                Arc::new(StringArray::from(links)),
                vector_array,
            ],
        )
        .map_err(|e| StoreError::Insert(format!("failed to create RecordBatch: {e}")))?;

        Ok(batch)
    }

    fn path_predicate(source_id: &str, file_path: &str) -> String {
        format!(
            "source_id = '{}' AND file_path = '{}'",
            escape(source_id),
            escape(file_path)
        )
    }
}

#[async_trait]
impl VectorRepository for LanceStore {
    async fn init(&self) -> Result<(), StoreError> {
        info!("initializing LanceDB at {:?}", self.db_path);

        if let Some(parent) = self.db_path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| StoreError::Init(format!("failed to create db directory: {e}")))?;
        }

        let conn = self.get_connection().await?;

        let tables = conn
            .table_names()
            .execute()
            .await
            .map_err(|e| StoreError::Init(format!("failed to list tables: {e}")))?;

        if !tables.contains(&CHUNKS_TABLE.to_string()) {
            info!("creating {CHUNKS_TABLE} table");
            let schema = Arc::new(self.schema());
            conn.create_empty_table(CHUNKS_TABLE, schema)
                .execute()
                .await
                .map_err(|e| StoreError::Init(format!("failed to create chunks table: {e}")))?;
        }

        Ok(())
    }

    async fn upsert(&self, chunks: &[NoteChunk]) -> Result<(), StoreError> {
        if chunks.is_empty() {
            return Ok(());
        }

        debug!("upserting {} chunks", chunks.len());
        let table = self.get_table().await?;

        // Idempotent by primary key: replace any rows with these ids.
        let id_list = chunks
            .iter()
            .map(|c| format!("'{}'", escape(&c.id)))
            .collect::<Vec<_>>()
            .join(", ");
        table
            .delete(&format!("chunk_id IN ({id_list})"))
            .await
            .map_err(|e| StoreError::Delete(format!("failed to clear existing ids: {e}")))?;

        let batch = self.chunks_to_batch(chunks)?;
        let schema = batch.schema();
        let batches = RecordBatchIterator::new(vec![Ok(batch)], schema);

        table
            .add(Box::new(batches))
            .execute()
            .await
            .map_err(|e| StoreError::Insert(format!("failed to insert chunks: {e}")))?;

        Ok(())
    }

    async fn delete_by_path(&self, source_id: &str, file_path: &str) -> Result<u64, StoreError> {
        let table = self.get_table().await?;
        let predicate = Self::path_predicate(source_id, file_path);

        let count = table
            .count_rows(Some(predicate.clone()))
            .await
            .map_err(|e| StoreError::Query(format!("failed to count chunks: {e}")))?;

        if count > 0 {
            table
                .delete(&predicate)
                .await
                .map_err(|e| StoreError::Delete(format!("failed to delete chunks: {e}")))?;
        }

        debug!(source_id, file_path, deleted = count, "deleted chunks");
        Ok(count as u64)
    }

    async fn delete_by_ids(&self, ids: &[String]) -> Result<u64, StoreError> {
        if ids.is_empty() {
            return Ok(0);
        }

        let table = self.get_table().await?;
        let id_list = ids
            .iter()
            .map(|id| format!("'{}'", escape(id)))
            .collect::<Vec<_>>()
            .join(", ");
        let predicate = format!("chunk_id IN ({id_list})");

        let count = table
            .count_rows(Some(predicate.clone()))
            .await
            .map_err(|e| StoreError::Query(format!("failed to count chunks: {e}")))?;

        if count > 0 {
            table
                .delete(&predicate)
                .await
                .map_err(|e| StoreError::Delete(format!("failed to delete by id: {e}")))?;
        }

        Ok(count as u64)
    }

    async fn query(
        &self,
        vector: &[f32],
        k: usize,
        filter: &SearchFilter,
    ) -> Result<Vec<ScoredChunk>, StoreError> {
        let table = self.get_table().await?;

        let mut query = table
            .vector_search(vector.to_vec())
            .map_err(|e| StoreError::Query(format!("failed to create search query: {e}")))?
            .limit(k);

        if let Some(predicate) = build_filter_predicate(filter) {
            query = query.only_if(predicate);
        }

        let mut results = query
            .execute()
            .await
            .map_err(|e| StoreError::Query(format!("failed to execute search: {e}")))?;

        let mut scored = Vec::new();
        while let Some(batch) = results
            .try_next()
            .await
            .map_err(|e| StoreError::Query(format!("failed to fetch results: {e}")))?
        {
            let distances = batch
                .column_by_name("_distance")
                .and_then(|c| c.as_any().downcast_ref::<Float32Array>())
                .map(|a| a.values().to_vec());
            let chunks = batch_to_chunks(&batch)?;

            for (i, chunk) in chunks.into_iter().enumerate() {
                let distance = distances.as_ref().map_or(0.0, |d| d[i]);
                scored.push(ScoredChunk { chunk, distance });
            }
        }

        debug!(k, found = scored.len(), "vector query complete");
        Ok(scored)
    }

    async fn get_by_path(
        &self,
        source_id: &str,
        file_path: &str,
    ) -> Result<Vec<NoteChunk>, StoreError> {
        let table = self.get_table().await?;

        let mut results = table
            .query()
            .only_if(Self::path_predicate(source_id, file_path))
            .execute()
            .await
            .map_err(|e| StoreError::Query(format!("failed to query chunks: {e}")))?;

        let mut chunks = Vec::new();
        while let Some(batch) = results
            .try_next()
            .await
            .map_err(|e| StoreError::Query(format!("failed to fetch chunks: {e}")))?
        {
            chunks.extend(batch_to_chunks(&batch)?);
        }

        chunks.sort_by_key(|c| c.chunk_index);
        Ok(chunks)
    }

    async fn content_hash(
        &self,
        source_id: &str,
        file_path: &str,
    ) -> Result<Option<String>, StoreError> {
        let table = self.get_table().await?;

        let mut results = table
            .query()
            .only_if(Self::path_predicate(source_id, file_path))
            .limit(1)
            .execute()
            .await
            .map_err(|e| StoreError::Query(format!("failed to query hash: {e}")))?;

        if let Some(batch) = results
            .try_next()
            .await
            .map_err(|e| StoreError::Query(format!("failed to fetch hash: {e}")))?
        {
            let chunks = batch_to_chunks(&batch)?;
            return Ok(chunks.into_iter().next().map(|c| c.content_hash));
        }

        Ok(None)
    }

    async fn indexed_paths(&self) -> Result<Vec<(String, String)>, StoreError> {
        let rows = self.scan_metadata().await?;
        let unique: BTreeSet<(String, String)> = rows
            .into_iter()
            .map(|r| (r.source_id, r.file_path))
            .collect();
        Ok(unique.into_iter().collect())
    }

    async fn scan_metadata(&self) -> Result<Vec<MetadataRow>, StoreError> {
        let table = self.get_table().await?;

        let mut results = table
            .query()
            .only_if("chunk_id LIKE '%'")
            .execute()
            .await
            .map_err(|e| StoreError::Query(format!("failed to scan metadata: {e}")))?;

        let mut rows = Vec::new();
        while let Some(batch) = results
            .try_next()
            .await
            .map_err(|e| StoreError::Query(format!("failed to fetch metadata: {e}")))?
        {
            for chunk in batch_to_chunks(&batch)? {
                rows.push(MetadataRow {
                    source_id: chunk.source_id,
                    file_path: chunk.file_path,
                    note_title: chunk.note_title,
                    tags: chunk.tags,
                    outbound_links: chunk.outbound_links,
                });
            }
        }

        Ok(rows)
    }

    async fn scan_vectors(&self) -> Result<Vec<FileVector>, StoreError> {
        let table = self.get_table().await?;

        let mut results = table
            .query()
            .only_if("chunk_id LIKE '%'")
            .execute()
            .await
            .map_err(|e| StoreError::Query(format!("failed to scan vectors: {e}")))?;

        let mut vectors = Vec::new();
        while let Some(batch) = results
            .try_next()
            .await
            .map_err(|e| StoreError::Query(format!("failed to fetch vectors: {e}")))?
        {
            for chunk in batch_to_chunks(&batch)? {
                if let Some(vector) = chunk.embedding {
                    vectors.push(FileVector {
                        source_id: chunk.source_id,
                        file_path: chunk.file_path,
                        vector,
                    });
                }
            }
        }

        Ok(vectors)
    }

    async fn stats(&self) -> Result<RepoStats, StoreError> {
        let table = self.get_table().await?;

        let total_chunks = table
            .count_rows(None)
            .await
            .map_err(|e| StoreError::Query(format!("failed to count rows: {e}")))?
            as u64;

        let total_files = self.indexed_paths().await?.len() as u64;

        Ok(RepoStats {
            total_chunks,
            total_files,
            collection_name: CHUNKS_TABLE.to_string(),
            persist_path: Some(self.db_path.to_string_lossy().to_string()),
        })
    }
}

// ============================================================================
// Helper functions
// ============================================================================

fn escape(value: &str) -> String {
    value.replace('\'', "''")
}

/// `["a", "b"]` → `",a,b,"`; empty list → `""`. The wrapping commas
/// make `LIKE '%,tag,%'` an exact-membership test.
fn join_delimited(values: &[String]) -> String {
    if values.is_empty() {
        String::new()
    } else {
        format!(",{},", values.join(","))
    }
}

fn split_delimited(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}

fn build_filter_predicate(filter: &SearchFilter) -> Option<String> {
    let mut parts = Vec::new();

    if let Some(ref source_id) = filter.source_id {
        parts.push(format!("source_id = '{}'", escape(source_id)));
    }
    if let Some(ref folder) = filter.folder {
        parts.push(format!("folder = '{}'", escape(folder)));
    }
    for tag in &filter.tags {
        parts.push(format!("tags LIKE '%,{},%'", escape(tag)));
    }

    if parts.is_empty() {
        None
    } else {
        Some(parts.join(" AND "))
    }
}

fn build_vector_array(
    vectors: &[Option<&Vec<f32>>],
    dim: usize,
) -> Result<ArrayRef, StoreError> {
    use arrow_array::builder::{FixedSizeListBuilder, Float32Builder};

    let mut builder = FixedSizeListBuilder::new(Float32Builder::new(), dim as i32);

    for vector in vectors {
        match vector {
            Some(values) => {
                if values.len() != dim {
                    return Err(StoreError::Schema(format!(
                        "vector dimension {} does not match store dimension {dim}",
                        values.len()
                    )));
                }
                let values_builder = builder.values();
                for &v in values.iter() {
                    values_builder.append_value(v);
                }
                builder.append(true);
            }
            None => {
                let values_builder = builder.values();
                for _ in 0..dim {
                    values_builder.append_value(0.0);
                }
                builder.append(true);
            }
        }
    }

    Ok(Arc::new(builder.finish()))
}

fn batch_to_chunks(batch: &RecordBatch) -> Result<Vec<NoteChunk>, StoreError> {
    let string_col = |name: &str| {
        batch
            .column_by_name(name)
            .and_then(|c| c.as_any().downcast_ref::<StringArray>())
    };
    let u32_col = |name: &str| {
        batch
            .column_by_name(name)
            .and_then(|c| c.as_any().downcast_ref::<UInt32Array>())
    };

    let (
        Some(chunk_ids),
        Some(source_ids),
        Some(file_paths),
        Some(note_titles),
        Some(folders),
        Some(header_contexts),
        Some(content_hashes),
        Some(texts),
        Some(tags),
        Some(links),
        Some(chunk_indices),
        Some(token_counts),
    ) = (
        string_col("chunk_id"),
        string_col("source_id"),
        string_col("file_path"),
        string_col("note_title"),
        string_col("folder"),
        string_col("header_context"),
        string_col("content_hash"),
        string_col("text"),
        string_col("tags"),
        string_col("outbound_links"),
        u32_col("chunk_index"),
        u32_col("token_count"),
    )
    else {
        return Err(StoreError::Query(
            "missing required columns in chunks batch".to_string(),
        ));
    };

    let vectors = batch
        .column_by_name("vector")
        .and_then(|c| c.as_any().downcast_ref::<FixedSizeListArray>());

    let mut chunks = Vec::with_capacity(batch.num_rows());
    for i in 0..batch.num_rows() {
        let embedding = vectors.and_then(|arr| {
            if arr.is_null(i) {
                None
            } else {
                arr.value(i)
                    .as_any()
                    .downcast_ref::<Float32Array>()
                    .map(|a| a.values().to_vec())
            }
        });

        chunks.push(NoteChunk {
            id: chunk_ids.value(i).to_string(),
            source_id: source_ids.value(i).to_string(),
            file_path: file_paths.value(i).to_string(),
            note_title: note_titles.value(i).to_string(),
            folder: folders.value(i).to_string(),
            chunk_index: chunk_indices.value(i),
            header_context: header_contexts.value(i).to_string(),
            content_hash: content_hashes.value(i).to_string(),
            text: texts.value(i).to_string(),
            token_count: token_counts.value(i),
            tags: split_delimited(tags.value(i)),
            outbound_links: split_delimited(links.value(i)),
            embedding,
        });
    }

    Ok(chunks)
}

#[cfg(test)]
mod tests {
    use super::*;
    use semvault_core::chunk_id;
    use tempfile::tempdir;

    const TEST_DIM: usize = 8;

    fn test_chunk(source: &str, path: &str, index: u32, seed: f32) -> NoteChunk {
        NoteChunk {
            id: chunk_id(source, path, index),
            source_id: source.to_string(),
            file_path: path.to_string(),
            note_title: semvault_core::note_title(path),
            folder: semvault_core::folder_of(path),
            chunk_index: index,
            header_context: "# Test".to_string(),
            content_hash: "hash-1".to_string(),
            text: format!("chunk {index} of {path}"),
            token_count: 4,
            tags: vec!["work".to_string(), "notes".to_string()],
            outbound_links: vec!["Other Note".to_string()],
            embedding: Some((0..TEST_DIM).map(|i| (i as f32 * seed).sin()).collect()),
        }
    }

    #[test]
    fn test_join_split_delimited() {
        let values = vec!["a".to_string(), "b".to_string()];
        let joined = join_delimited(&values);
        assert_eq!(joined, ",a,b,");
        assert_eq!(split_delimited(&joined), values);
        assert_eq!(join_delimited(&[]), "");
        assert!(split_delimited("").is_empty());
    }

    #[test]
    fn test_filter_predicate() {
        assert!(build_filter_predicate(&SearchFilter::default()).is_none());

        let filter = SearchFilter {
            source_id: Some("vault".to_string()),
            folder: Some("1-projects".to_string()),
            tags: vec!["gold".to_string()],
        };
        let predicate = build_filter_predicate(&filter).unwrap();
        assert_eq!(
            predicate,
            "source_id = 'vault' AND folder = '1-projects' AND tags LIKE '%,gold,%'"
        );
    }

    #[test]
    fn test_predicate_escapes_quotes() {
        let predicate = LanceStore::path_predicate("vault", "it's a note.md");
        assert!(predicate.contains("it''s a note.md"));
    }

    #[tokio::test]
    async fn test_init_idempotent() {
        let temp = tempdir().unwrap();
        let store = LanceStore::new(temp.path().join("db.lance"), TEST_DIM);
        store.init().await.unwrap();
        store.init().await.unwrap();
    }

    #[tokio::test]
    async fn test_upsert_and_get_by_path() {
        let temp = tempdir().unwrap();
        let store = LanceStore::new(temp.path().join("db.lance"), TEST_DIM);
        store.init().await.unwrap();

        store
            .upsert(&[
                test_chunk("vault", "a.md", 0, 0.1),
                test_chunk("vault", "a.md", 1, 0.2),
            ])
            .await
            .unwrap();

        let chunks = store.get_by_path("vault", "a.md").await.unwrap();
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].chunk_index, 0);
        assert_eq!(chunks[0].tags, vec!["work", "notes"]);
        assert!(chunks[0].embedding.is_some());
    }

    #[tokio::test]
    async fn test_upsert_overwrites_by_id() {
        let temp = tempdir().unwrap();
        let store = LanceStore::new(temp.path().join("db.lance"), TEST_DIM);
        store.init().await.unwrap();

        store
            .upsert(&[test_chunk("vault", "a.md", 0, 0.1)])
            .await
            .unwrap();
        let mut updated = test_chunk("vault", "a.md", 0, 0.1);
        updated.text = "new text".to_string();
        store.upsert(&[updated]).await.unwrap();

        let chunks = store.get_by_path("vault", "a.md").await.unwrap();
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].text, "new text");
    }

    #[tokio::test]
    async fn test_delete_by_path_counts() {
        let temp = tempdir().unwrap();
        let store = LanceStore::new(temp.path().join("db.lance"), TEST_DIM);
        store.init().await.unwrap();

        store
            .upsert(&[
                test_chunk("vault", "a.md", 0, 0.1),
                test_chunk("vault", "a.md", 1, 0.2),
                test_chunk("vault", "b.md", 0, 0.3),
            ])
            .await
            .unwrap();

        assert_eq!(store.delete_by_path("vault", "a.md").await.unwrap(), 2);
        assert_eq!(store.delete_by_path("vault", "a.md").await.unwrap(), 0);

        let stats = store.stats().await.unwrap();
        assert_eq!(stats.total_chunks, 1);
        assert_eq!(stats.total_files, 1);
    }

    #[tokio::test]
    async fn test_query_with_filter() {
        let temp = tempdir().unwrap();
        let store = LanceStore::new(temp.path().join("db.lance"), TEST_DIM);
        store.init().await.unwrap();

        let mut personal = test_chunk("vault", "p.md", 0, 0.4);
        personal.tags = vec!["personal".to_string()];
        store
            .upsert(&[test_chunk("vault", "w.md", 0, 0.1), personal])
            .await
            .unwrap();

        let filter = SearchFilter {
            tags: vec!["work".to_string()],
            ..Default::default()
        };
        let query: Vec<f32> = (0..TEST_DIM).map(|i| (i as f32 * 0.1).sin()).collect();
        let results = store.query(&query, 10, &filter).await.unwrap();

        assert_eq!(results.len(), 1);
        assert_eq!(results[0].chunk.file_path, "w.md");
    }

    #[tokio::test]
    async fn test_content_hash_roundtrip() {
        let temp = tempdir().unwrap();
        let store = LanceStore::new(temp.path().join("db.lance"), TEST_DIM);
        store.init().await.unwrap();

        assert!(store.content_hash("vault", "a.md").await.unwrap().is_none());

        store
            .upsert(&[test_chunk("vault", "a.md", 0, 0.1)])
            .await
            .unwrap();
        assert_eq!(
            store.content_hash("vault", "a.md").await.unwrap().as_deref(),
            Some("hash-1")
        );
    }

    #[tokio::test]
    async fn test_scan_metadata() {
        let temp = tempdir().unwrap();
        let store = LanceStore::new(temp.path().join("db.lance"), TEST_DIM);
        store.init().await.unwrap();

        store
            .upsert(&[
                test_chunk("vault", "a.md", 0, 0.1),
                test_chunk("project", "b.md", 0, 0.2),
            ])
            .await
            .unwrap();

        let rows = store.scan_metadata().await.unwrap();
        assert_eq!(rows.len(), 2);
        assert!(rows.iter().any(|r| r.source_id == "project"));

        let paths = store.indexed_paths().await.unwrap();
        assert_eq!(paths.len(), 2);
    }
}

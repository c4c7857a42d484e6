//! LanceDB index of embedded recipe chunks.
//!
//! One table, `recipe_chunks`, stored under the configured directory. Each
//! row is a chunk of recipe text with its parent recipe id so that vector
//! hits can be fused with graph rows for the same recipe.

use std::collections::HashMap;
use std::sync::Arc;

use arrow_array::{
    Array, FixedSizeListArray, Float32Array, RecordBatch, RecordBatchIterator, StringArray,
    types::Float32Type,
};
use arrow_schema::{DataType, Field, Schema};
use async_trait::async_trait;
use futures::TryStreamExt;
use lancedb::query::{ExecutableQuery, QueryBase, Select};

use super::VectorIndex;
use crate::error::{RagError, ServiceError};
use crate::types::{ChunkMetadata, VectorHit};

const TABLE_NAME: &str = "recipe_chunks";
const SERVICE: &str = "vector";

/// A chunk of recipe text ready to be stored alongside its embedding.
#[derive(Debug, Clone, PartialEq)]
pub struct ChunkRecord {
    pub id: String,
    pub recipe_id: Option<String>,
    pub recipe_name: Option<String>,
    pub content: String,
    /// SHA-256 of `content`, used to skip unchanged chunks on re-index
    pub content_hash: String,
}

/// LanceDB-backed chunk index.
pub struct LanceIndex {
    db: lancedb::Connection,
    dims: usize,
}

impl LanceIndex {
    /// Open or create the index at the given path.
    pub async fn open(path: &str, dims: usize) -> Result<Self, RagError> {
        let db = lancedb::connect(path).execute().await?;
        let index = Self { db, dims };
        index.ensure_table().await?;
        Ok(index)
    }

    pub fn dimensions(&self) -> usize {
        self.dims
    }

    fn schema(&self) -> Arc<Schema> {
        Arc::new(Schema::new(vec![
            Field::new("id", DataType::Utf8, false),
            Field::new("recipe_id", DataType::Utf8, true),
            Field::new("recipe_name", DataType::Utf8, true),
            Field::new("content", DataType::Utf8, false),
            Field::new("content_hash", DataType::Utf8, false),
            Field::new(
                "vector",
                DataType::FixedSizeList(
                    Arc::new(Field::new("item", DataType::Float32, true)),
                    self.dims as i32,
                ),
                false,
            ),
        ]))
    }

    async fn ensure_table(&self) -> Result<(), RagError> {
        let tables = self.db.table_names().execute().await?;
        if !tables.iter().any(|t| t == TABLE_NAME) {
            let schema = self.schema();
            let empty_batch = RecordBatch::new_empty(schema.clone());
            let batches = RecordBatchIterator::new(vec![Ok(empty_batch)], schema);
            self.db.create_table(TABLE_NAME, batches).execute().await?;
        }
        Ok(())
    }

    /// Store chunks with pre-computed embeddings.
    pub async fn index_chunks(
        &self,
        chunks: &[ChunkRecord],
        embeddings: Vec<Vec<f32>>,
    ) -> Result<usize, RagError> {
        if chunks.is_empty() {
            return Ok(0);
        }
        if chunks.len() != embeddings.len() {
            return Err(RagError::Embedding(format!(
                "Mismatch: {} chunks but {} embeddings",
                chunks.len(),
                embeddings.len()
            )));
        }
        if let Some(bad) = embeddings.iter().find(|e| e.len() != self.dims) {
            return Err(RagError::Embedding(format!(
                "Expected {}-dimensional embeddings, got {}",
                self.dims,
                bad.len()
            )));
        }

        let schema = self.schema();
        let n = chunks.len();

        let ids = StringArray::from_iter_values(chunks.iter().map(|c| c.id.as_str()));
        let recipe_ids = StringArray::from(
            chunks
                .iter()
                .map(|c| c.recipe_id.as_deref())
                .collect::<Vec<_>>(),
        );
        let recipe_names = StringArray::from(
            chunks
                .iter()
                .map(|c| c.recipe_name.as_deref())
                .collect::<Vec<_>>(),
        );
        let contents = StringArray::from_iter_values(chunks.iter().map(|c| c.content.as_str()));
        let hashes =
            StringArray::from_iter_values(chunks.iter().map(|c| c.content_hash.as_str()));
        let vectors = FixedSizeListArray::from_iter_primitive::<Float32Type, _, _>(
            embeddings
                .into_iter()
                .map(|v| Some(v.into_iter().map(Some).collect::<Vec<_>>())),
            self.dims as i32,
        );

        let batch = RecordBatch::try_new(
            schema.clone(),
            vec![
                Arc::new(ids),
                Arc::new(recipe_ids),
                Arc::new(recipe_names),
                Arc::new(contents),
                Arc::new(hashes),
                Arc::new(vectors) as Arc<dyn Array>,
            ],
        )
        .map_err(|e| RagError::Store(format!("Failed to create record batch: {e}")))?;

        let table = self.db.open_table(TABLE_NAME).execute().await?;
        let batches = RecordBatchIterator::new(vec![Ok(batch)], schema);
        table.add(batches).execute().await?;

        log::debug!("Indexed {n} chunk(s) into {TABLE_NAME}");
        Ok(n)
    }

    /// Nearest chunks to `embedding`, closest first.
    pub async fn search_chunks(
        &self,
        embedding: &[f32],
        limit: usize,
    ) -> Result<Vec<VectorHit>, ServiceError> {
        let table = self
            .db
            .open_table(TABLE_NAME)
            .execute()
            .await
            .map_err(classify)?;
        let query = table.vector_search(embedding).map_err(classify)?.limit(limit);

        let batches: Vec<RecordBatch> = query
            .execute()
            .await
            .map_err(classify)?
            .try_collect()
            .await
            .map_err(|e| ServiceError::unavailable(SERVICE, format!("search failed: {e}")))?;

        let mut hits = Vec::new();
        for batch in &batches {
            let strings = |name: &str| {
                batch
                    .column_by_name(name)
                    .and_then(|c| c.as_any().downcast_ref::<StringArray>())
            };
            let (Some(ids), Some(recipe_ids), Some(recipe_names), Some(contents)) = (
                strings("id"),
                strings("recipe_id"),
                strings("recipe_name"),
                strings("content"),
            ) else {
                continue;
            };
            let distances = batch
                .column_by_name("_distance")
                .and_then(|c| c.as_any().downcast_ref::<Float32Array>());

            for i in 0..batch.num_rows() {
                let distance = distances.map(|d| d.value(i)).unwrap_or(0.0);
                hits.push(VectorHit {
                    id: ids.value(i).to_string(),
                    score: 1.0 / (1.0 + distance),
                    metadata: ChunkMetadata {
                        recipe_id: nullable(recipe_ids, i),
                        recipe_name: nullable(recipe_names, i),
                        content: contents.value(i).to_string(),
                    },
                });
            }
        }

        Ok(hits)
    }

    /// Content hash of every stored chunk, keyed by chunk id.
    pub async fn stored_hashes(&self) -> Result<HashMap<String, String>, RagError> {
        let table = self.db.open_table(TABLE_NAME).execute().await?;
        let batches: Vec<RecordBatch> = table
            .query()
            .select(Select::Columns(vec![
                "id".to_string(),
                "content_hash".to_string(),
            ]))
            .execute()
            .await?
            .try_collect()
            .await
            .map_err(|e| RagError::Store(format!("Failed to read chunk hashes: {e}")))?;

        let mut hashes = HashMap::new();
        for batch in &batches {
            let column = |name: &str| {
                batch
                    .column_by_name(name)
                    .and_then(|c| c.as_any().downcast_ref::<StringArray>())
            };
            if let (Some(ids), Some(values)) = (column("id"), column("content_hash")) {
                for i in 0..batch.num_rows() {
                    hashes.insert(ids.value(i).to_string(), values.value(i).to_string());
                }
            }
        }
        Ok(hashes)
    }

    /// Remove every chunk of one recipe (before re-indexing it).
    pub async fn delete_recipe(&self, recipe_id: &str) -> Result<(), RagError> {
        let table = self.db.open_table(TABLE_NAME).execute().await?;
        let escaped = recipe_id.replace('\'', "''");
        table.delete(&format!("recipe_id = '{escaped}'")).await?;
        Ok(())
    }

    /// Remove every chunk.
    pub async fn clear(&self) -> Result<(), RagError> {
        let table = self.db.open_table(TABLE_NAME).execute().await?;
        table.delete("true").await?;
        Ok(())
    }

    pub async fn count(&self) -> Result<usize, RagError> {
        let table = self.db.open_table(TABLE_NAME).execute().await?;
        Ok(table.count_rows(None).await?)
    }
}

/// A missing table, a schema mismatch or a malformed query fails the same way
/// on every attempt. Anything else may be passing I/O trouble.
fn classify(e: lancedb::Error) -> ServiceError {
    match e {
        lancedb::Error::TableNotFound { .. }
        | lancedb::Error::InvalidTableName { .. }
        | lancedb::Error::InvalidInput { .. }
        | lancedb::Error::Schema { .. } => ServiceError::rejected(SERVICE, e.to_string()),
        other => ServiceError::unavailable(SERVICE, other.to_string()),
    }
}

fn nullable(array: &StringArray, i: usize) -> Option<String> {
    (!array.is_null(i)).then(|| array.value(i).to_string())
}

#[async_trait]
impl VectorIndex for LanceIndex {
    async fn search(
        &self,
        embedding: &[f32],
        top_k: usize,
    ) -> Result<Vec<VectorHit>, ServiceError> {
        if embedding.len() != self.dims {
            return Err(ServiceError::rejected(
                SERVICE,
                format!(
                    "query embedding has {} dimensions, index expects {}",
                    embedding.len(),
                    self.dims
                ),
            ));
        }
        self.search_chunks(embedding, top_k).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunk(id: &str, recipe: Option<&str>, content: &str) -> ChunkRecord {
        ChunkRecord {
            id: id.to_string(),
            recipe_id: recipe.map(str::to_string),
            recipe_name: recipe.map(|r| format!("Recipe {r}")),
            content: content.to_string(),
            content_hash: format!("hash-{id}"),
        }
    }

    async fn open(dir: &tempfile::TempDir) -> LanceIndex {
        let path = dir.path().join("test.lance");
        LanceIndex::open(path.to_str().unwrap(), 4).await.unwrap()
    }

    #[tokio::test]
    async fn test_open_creates_table() {
        let dir = tempfile::tempdir().unwrap();
        let index = open(&dir).await;
        assert_eq!(index.count().await.unwrap(), 0);
        assert_eq!(index.dimensions(), 4);
    }

    #[tokio::test]
    async fn test_index_and_search() {
        let dir = tempfile::tempdir().unwrap();
        let index = open(&dir).await;

        let chunks = vec![
            chunk("c1", Some("r1"), "Kung pao chicken"),
            chunk("c2", None, "Notes on knife skills"),
        ];
        let embeddings = vec![vec![1.0, 0.0, 0.0, 0.0], vec![0.0, 1.0, 0.0, 0.0]];
        assert_eq!(index.index_chunks(&chunks, embeddings).await.unwrap(), 2);
        assert_eq!(index.count().await.unwrap(), 2);

        let hits = index.search(&[0.9, 0.1, 0.0, 0.0], 5).await.unwrap();
        assert_eq!(hits[0].id, "c1");
        assert_eq!(hits[0].metadata.recipe_id.as_deref(), Some("r1"));
        assert!(hits[0].score > hits[1].score);
        assert!(hits.iter().all(|h| h.score > 0.0 && h.score <= 1.0));

        let orphan = hits.iter().find(|h| h.id == "c2").unwrap();
        assert_eq!(orphan.metadata.recipe_id, None);
    }

    #[tokio::test]
    async fn test_mismatched_embeddings_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let index = open(&dir).await;
        let chunks = vec![chunk("c1", Some("r1"), "x")];

        let err = index.index_chunks(&chunks, vec![]).await.unwrap_err();
        assert!(matches!(err, RagError::Embedding(_)));

        let err = index
            .index_chunks(&chunks, vec![vec![1.0, 0.0]])
            .await
            .unwrap_err();
        assert!(err.to_string().contains("4-dimensional"));
    }

    #[tokio::test]
    async fn test_wrong_query_dimensions_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let index = open(&dir).await;
        let err = index.search(&[1.0, 0.0], 3).await.unwrap_err();
        assert!(!err.is_transient());
    }

    #[tokio::test]
    async fn test_missing_table_is_not_retried() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("empty.lance");
        let index = LanceIndex {
            db: lancedb::connect(path.to_str().unwrap()).execute().await.unwrap(),
            dims: 4,
        };

        let err = index.search(&[1.0, 0.0, 0.0, 0.0], 3).await.unwrap_err();
        assert!(matches!(err, ServiceError::Rejected { .. }));
        assert!(!err.is_transient());
    }

    #[tokio::test]
    async fn test_delete_recipe_and_clear() {
        let dir = tempfile::tempdir().unwrap();
        let index = open(&dir).await;
        let chunks = vec![
            chunk("c1", Some("r1"), "a"),
            chunk("c2", Some("r1"), "b"),
            chunk("c3", Some("r2"), "c"),
        ];
        let embeddings = vec![vec![1.0, 0.0, 0.0, 0.0]; 3];
        index.index_chunks(&chunks, embeddings).await.unwrap();

        let hashes = index.stored_hashes().await.unwrap();
        assert_eq!(hashes.len(), 3);
        assert_eq!(hashes.get("c3").map(String::as_str), Some("hash-c3"));

        index.delete_recipe("r1").await.unwrap();
        assert_eq!(index.count().await.unwrap(), 1);

        index.clear().await.unwrap();
        assert_eq!(index.count().await.unwrap(), 0);
    }
}

//! Knowledge base build: recipes from the graph store, embedded into the
//! vector index.

use std::sync::Arc;

use serde::Serialize;

use crate::embeddings::{EmbeddingProvider, build_recipe_content, compute_content_hash};
use crate::error::RagError;
use crate::store::{ChunkRecord, GraphPattern, GraphStore, LanceIndex};

/// Texts sent to the embedding service per request.
const DEFAULT_BATCH_SIZE: usize = 32;

/// Outcome of an indexing run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct IndexReport {
    /// Recipes read from the graph
    pub recipes: usize,
    /// Chunks embedded and written
    pub indexed: usize,
    /// Chunks skipped because their content hash was already stored
    pub unchanged: usize,
}

/// Embeds one chunk per recipe into a [`LanceIndex`].
pub struct RecipeIndexer {
    graph: Arc<dyn GraphStore>,
    embedder: Arc<dyn EmbeddingProvider>,
    index: Arc<LanceIndex>,
    batch_size: usize,
}

impl RecipeIndexer {
    pub fn new(
        graph: Arc<dyn GraphStore>,
        embedder: Arc<dyn EmbeddingProvider>,
        index: Arc<LanceIndex>,
    ) -> Self {
        Self {
            graph,
            embedder,
            index,
            batch_size: DEFAULT_BATCH_SIZE,
        }
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    /// Index every recipe (or the first `limit` by id). Recipes whose
    /// rendered content is unchanged since the last run are skipped.
    pub async fn build(&self, limit: Option<usize>) -> Result<IndexReport, RagError> {
        if self.embedder.dimensions() != self.index.dimensions() {
            return Err(RagError::Config(format!(
                "embedding model {} produces {}-dimensional vectors but the index expects {}",
                self.embedder.model_name(),
                self.embedder.dimensions(),
                self.index.dimensions()
            )));
        }

        let rows = self.graph.query(&GraphPattern::Catalog { limit }).await?;
        let stored = self.index.stored_hashes().await?;
        let mut report = IndexReport {
            recipes: rows.len(),
            ..Default::default()
        };

        let mut pending = Vec::new();
        for row in &rows {
            let content = build_recipe_content(row);
            let chunk = ChunkRecord {
                id: chunk_id(&row.recipe_id),
                recipe_id: Some(row.recipe_id.clone()),
                recipe_name: Some(row.name.clone()),
                content_hash: compute_content_hash(&content),
                content,
            };
            match stored.get(&chunk.id) {
                Some(hash) if *hash == chunk.content_hash => report.unchanged += 1,
                _ => pending.push(chunk),
            }
        }

        for batch in pending.chunks(self.batch_size) {
            let texts: Vec<String> = batch.iter().map(|c| c.content.clone()).collect();
            let embeddings = self
                .embedder
                .embed_batch(&texts)
                .await
                .map_err(|e| RagError::Embedding(e.to_string()))?;

            for chunk in batch.iter().filter(|c| stored.contains_key(&c.id)) {
                if let Some(recipe_id) = &chunk.recipe_id {
                    self.index.delete_recipe(recipe_id).await?;
                }
            }
            report.indexed += self.index.index_chunks(batch, embeddings).await?;
            log::debug!("Indexed {}/{} changed recipe(s)", report.indexed, pending.len());
        }

        log::info!(
            "Indexed {} recipe(s): {} embedded, {} unchanged",
            report.recipes,
            report.indexed,
            report.unchanged
        );
        Ok(report)
    }

    /// Drop every stored chunk, then index from scratch.
    pub async fn rebuild(&self, limit: Option<usize>) -> Result<IndexReport, RagError> {
        self.index.clear().await?;
        self.build(limit).await
    }
}

fn chunk_id(recipe_id: &str) -> String {
    format!("recipe-{recipe_id}")
}

use std::sync::Arc;

use crate::config::{RetryConfig, RouterConfig};
use crate::embeddings::EmbeddingProvider;
use crate::error::ServiceError;
use crate::store::VectorIndex;
use crate::types::{Document, SourceType, VectorHit};

use super::resilience::{ServiceGate, with_retry};

/// Embeds the query and searches the vector index.
pub struct VectorRetriever {
    embedder: Arc<dyn EmbeddingProvider>,
    index: Arc<dyn VectorIndex>,
    embedding_gate: ServiceGate,
    index_gate: ServiceGate,
    retry: RetryConfig,
}

impl VectorRetriever {
    pub fn new(
        embedder: Arc<dyn EmbeddingProvider>,
        index: Arc<dyn VectorIndex>,
        config: &RouterConfig,
    ) -> Self {
        Self {
            embedder,
            index,
            embedding_gate: ServiceGate::new("embedding", &config.embedding_pool),
            index_gate: ServiceGate::new("vector", &config.vector_pool),
            retry: config.retry.clone(),
        }
    }

    /// The `top_k` closest chunks, similarity as raw score.
    pub async fn retrieve(&self, query: &str, top_k: usize) -> Result<Vec<Document>, ServiceError> {
        if top_k == 0 {
            return Ok(Vec::new());
        }

        let embedding = with_retry(&self.retry, "query embedding", || {
            self.embedding_gate.call(self.embedder.embed(query))
        })
        .await?;

        let hits = with_retry(&self.retry, "vector search", || {
            self.index_gate.call(self.index.search(&embedding, top_k))
        })
        .await?;

        let mut documents: Vec<Document> = hits.into_iter().map(to_document).collect();
        documents.sort_by(|a, b| b.raw_score().total_cmp(&a.raw_score()));
        documents.truncate(top_k);

        log::debug!("Vector retrieval returned {} document(s)", documents.len());
        Ok(documents)
    }
}

/// Chunks are identified by their parent recipe when known, so they can merge
/// with graph rows for the same recipe during fusion.
fn to_document(hit: VectorHit) -> Document {
    let id = hit.metadata.recipe_id.clone().unwrap_or_else(|| hit.id.clone());
    Document::new(
        id,
        SourceType::Vector,
        hit.metadata.content,
        hit.metadata.recipe_name,
        hit.score,
    )
    .with_extra("chunk_id", hit.id)
}

#[cfg(test)]
pub(crate) mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;

    use super::*;
    use crate::types::ChunkMetadata;

    /// Embeds everything as a constant vector.
    pub(crate) struct FixedEmbedder {
        pub fail: Option<ServiceError>,
    }

    #[async_trait]
    impl EmbeddingProvider for FixedEmbedder {
        async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, ServiceError> {
            if let Some(e) = &self.fail {
                return Err(e.clone());
            }
            Ok(texts.iter().map(|_| vec![1.0, 0.0, 0.0, 0.0]).collect())
        }

        fn dimensions(&self) -> usize {
            4
        }

        fn model_name(&self) -> &str {
            "fixed"
        }
    }

    /// Returns canned hits and counts searches.
    pub(crate) struct CannedIndex {
        pub hits: Vec<VectorHit>,
        pub calls: AtomicUsize,
    }

    pub(crate) fn hit(id: &str, recipe: Option<&str>, score: f32) -> VectorHit {
        VectorHit {
            id: id.to_string(),
            score,
            metadata: ChunkMetadata {
                recipe_id: recipe.map(str::to_string),
                recipe_name: recipe.map(|r| format!("Recipe {r}")),
                content: format!("chunk {id}"),
            },
        }
    }

    #[async_trait]
    impl VectorIndex for CannedIndex {
        async fn search(
            &self,
            _embedding: &[f32],
            top_k: usize,
        ) -> Result<Vec<VectorHit>, ServiceError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.hits.iter().take(top_k).cloned().collect())
        }
    }

    fn retriever(fail: Option<ServiceError>, hits: Vec<VectorHit>) -> VectorRetriever {
        let mut config = RouterConfig::default();
        config.retry.base_delay_ms = 1;
        VectorRetriever::new(
            Arc::new(FixedEmbedder { fail }),
            Arc::new(CannedIndex {
                hits,
                calls: AtomicUsize::new(0),
            }),
            &config,
        )
    }

    #[tokio::test]
    async fn test_hits_become_vector_documents() {
        let vector = retriever(
            None,
            vec![hit("c2", Some("r2"), 0.4), hit("c1", Some("r1"), 0.9)],
        );
        let docs = vector.retrieve("spicy dinner", 5).await.unwrap();

        assert_eq!(docs.len(), 2);
        assert_eq!(docs[0].id, "r1");
        assert_eq!(docs[0].raw_score(), 0.9);
        assert_eq!(docs[0].metadata.extra.get("chunk_id").map(String::as_str), Some("c1"));
        assert!(docs.iter().all(|d| d.source_type == SourceType::Vector));
    }

    #[tokio::test]
    async fn test_orphan_chunk_keeps_chunk_id() {
        let vector = retriever(None, vec![hit("c7", None, 0.5)]);
        let docs = vector.retrieve("knife skills", 5).await.unwrap();
        assert_eq!(docs[0].id, "c7");
        assert_eq!(docs[0].metadata.recipe_name, None);
    }

    #[tokio::test]
    async fn test_top_k_bounds_result() {
        let hits = (0..10)
            .map(|i| hit(&format!("c{i}"), None, i as f32 / 10.0))
            .collect();
        let docs = retriever(None, hits).retrieve("q", 3).await.unwrap();
        assert_eq!(docs.len(), 3);
    }

    #[tokio::test]
    async fn test_embedding_failure_is_reported() {
        let vector = retriever(Some(ServiceError::rejected("embedding", "bad key")), vec![]);
        let err = vector.retrieve("q", 3).await.unwrap_err();
        assert!(matches!(err, ServiceError::Rejected { .. }));
        assert!(err.to_string().contains("embedding"));
    }
}

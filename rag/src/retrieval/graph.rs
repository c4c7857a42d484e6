use std::sync::Arc;

use crate::config::{RetryConfig, RouterConfig};
use crate::embeddings::build_recipe_content;
use crate::error::ServiceError;
use crate::routing::extract_keywords;
use crate::store::{GraphPattern, GraphStore};
use crate::types::{Document, QueryProfile, RecipeRow, SourceType};

use super::resilience::{ServiceGate, with_retry};

/// Score weights: traversal proximity, share of query terms matched, keyword overlap.
const PROXIMITY_WEIGHT: f32 = 0.5;
const COVERAGE_WEIGHT: f32 = 0.3;
const OVERLAP_WEIGHT: f32 = 0.2;

/// Rows requested per needed document, so ranking has room to reorder.
const OVERFETCH: usize = 2;

/// Retrieves recipe documents by traversing the graph store.
pub struct GraphRetriever {
    store: Arc<dyn GraphStore>,
    gate: ServiceGate,
    retry: RetryConfig,
}

impl GraphRetriever {
    pub fn new(store: Arc<dyn GraphStore>, config: &RouterConfig) -> Self {
        Self {
            store,
            gate: ServiceGate::new("graph", &config.graph_pool),
            retry: config.retry.clone(),
        }
    }

    /// Documents for the query, best first, at most `top_k`.
    ///
    /// Seeds from detected entities; falls back to keyword matching when
    /// there are none or the entity neighbourhood is empty.
    pub async fn retrieve(
        &self,
        profile: &QueryProfile,
        top_k: usize,
    ) -> Result<Vec<Document>, ServiceError> {
        if top_k == 0 {
            return Ok(Vec::new());
        }
        let keywords = extract_keywords(&profile.query);
        let limit = top_k.saturating_mul(OVERFETCH);

        let mut rows = Vec::new();
        let mut terms = 0;
        if !profile.entities.is_empty() {
            let pattern = GraphPattern::Neighborhood {
                entities: profile.entities.clone(),
                limit,
            };
            rows = self.run(&pattern).await?;
            terms = profile.entities.len();
        }
        if rows.is_empty() && !keywords.is_empty() {
            let pattern = GraphPattern::Keyword {
                keywords: keywords.clone(),
                limit,
            };
            rows = self.run(&pattern).await?;
            terms = keywords.len();
        }

        let mut documents: Vec<Document> = rows
            .into_iter()
            .map(|row| to_document(row, terms, &keywords))
            .collect();
        documents.sort_by(|a, b| {
            b.raw_score()
                .total_cmp(&a.raw_score())
                .then_with(|| a.id.cmp(&b.id))
        });
        documents.truncate(top_k);

        log::debug!("Graph retrieval returned {} document(s)", documents.len());
        Ok(documents)
    }

    async fn run(&self, pattern: &GraphPattern) -> Result<Vec<RecipeRow>, ServiceError> {
        with_retry(&self.retry, "graph query", || {
            self.gate.call(self.store.query(pattern))
        })
        .await
    }
}

/// Score a row and render it as a document.
fn to_document(row: RecipeRow, terms: usize, keywords: &[String]) -> Document {
    let content = build_recipe_content(&row);
    let score = score_row(&row, terms, keywords, &content);

    let mut doc = Document::new(
        row.recipe_id,
        SourceType::Graph,
        content,
        Some(row.name),
        score,
    )
    .with_extra("hops", row.hops.to_string());
    if let Some(category) = row.category {
        doc = doc.with_extra("category", category);
    }
    if let Some(difficulty) = row.difficulty {
        doc = doc.with_extra("difficulty", difficulty);
    }
    doc
}

fn score_row(row: &RecipeRow, terms: usize, keywords: &[String], content: &str) -> f32 {
    let proximity = 1.0 / (1.0 + row.hops as f32);
    let coverage = if terms == 0 {
        0.0
    } else {
        (row.matched.len() as f32 / terms as f32).min(1.0)
    };
    let overlap = if keywords.is_empty() {
        0.0
    } else {
        let lower = content.to_lowercase();
        let found = keywords.iter().filter(|k| lower.contains(k.as_str())).count();
        found as f32 / keywords.len() as f32
    };
    PROXIMITY_WEIGHT * proximity + COVERAGE_WEIGHT * coverage + OVERLAP_WEIGHT * overlap
}

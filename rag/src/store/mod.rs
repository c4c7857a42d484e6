//! Contracts for the external stores the router reads from.
//!
//! The router never talks to a database directly; it goes through
//! [`GraphStore`] and [`VectorIndex`]. Adapters:
//!
//! - [`MemoryGraph`] - in-process petgraph recipe graph
//! - [`Neo4jStore`] - Neo4j over its HTTP transactional endpoint
//! - [`LanceIndex`] - LanceDB table of embedded recipe chunks

mod lance;
pub(crate) mod memory;
mod neo4j;

pub use lance::{ChunkRecord, LanceIndex};
pub use memory::{MemoryGraph, RecipeSpec};
pub use neo4j::{Neo4jSettings, Neo4jStore};

use async_trait::async_trait;

use crate::error::ServiceError;
use crate::types::{RecipeRow, VectorHit};

/// A typed graph traversal request.
#[derive(Debug, Clone, PartialEq)]
pub enum GraphPattern {
    /// Recipes reachable from the named entities: the recipe itself (0 hops),
    /// or a recipe that requires the ingredient / belongs to the category
    /// (1 hop). Each row is expanded with its ingredients, steps and category.
    Neighborhood { entities: Vec<String>, limit: usize },
    /// Substring match of keywords against recipe, ingredient and category
    /// names, used when no entity was recognized.
    Keyword { keywords: Vec<String>, limit: usize },
    /// Every recipe, ordered by id.
    Catalog { limit: Option<usize> },
}

/// Property graph of recipes, ingredients, steps and categories.
#[async_trait]
pub trait GraphStore: Send + Sync {
    /// Run a traversal and return expanded recipe rows.
    async fn query(&self, pattern: &GraphPattern) -> Result<Vec<RecipeRow>, ServiceError>;

    /// Names of every recipe, ingredient and category, for the query analyzer lexicon.
    async fn entity_names(&self) -> Result<Vec<String>, ServiceError>;
}

/// Nearest-neighbour index over embedded chunks.
#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// Return up to `top_k` hits, closest first.
    async fn search(&self, embedding: &[f32], top_k: usize)
    -> Result<Vec<VectorHit>, ServiceError>;
}

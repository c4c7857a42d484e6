//! recipe-rag: adaptive retrieval for a recipe knowledge base
//!
//! Answers cooking questions by deciding, per query, how to gather evidence:
//! - Graph traversal over recipes, ingredients, steps and categories
//! - Similarity search over embedded recipe chunks
//! - Both at once, fused into one ranked evidence set
//!
//! The evidence then drives a streaming, cancellable answer from a language
//! model.
//!
//! # Example
//!
//! ```ignore
//! use recipe_rag::{RecipeRag, Services, RouterConfig};
//!
//! let mut rag = RecipeRag::new(RouterConfig::default(), services)?;
//! rag.refresh_lexicon().await?;
//! let routed = rag.route_query("What pairs well with chicken?", 5).await?;
//! let mut answer = rag.generate_answer_stream("What pairs well with chicken?", &routed.evidence);
//! ```

pub mod config;
pub mod embeddings;
pub mod error;
pub mod generation;
pub mod indexing;
pub mod query;
pub mod retrieval;
pub mod routing;
pub mod stats;
pub mod store;
pub mod types;

pub use config::{PoolConfig, RetryConfig, RouterConfig};
pub use error::{GenerationFault, RagError, RetrievalFault, ServiceError};
pub use generation::{AnswerEvent, AnswerStream, LlmClient, LlmConfig};
pub use indexing::{IndexReport, RecipeIndexer};
pub use query::{Answer, RecipeRag, RoutedQuery, Services};
pub use routing::{QueryAnalyzer, StrategySelector};
pub use types::{Document, QueryProfile, RouteDecision, RouteStatsSnapshot, Strategy};

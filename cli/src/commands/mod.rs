//! # CLI Command Implementations
//!
//! - [`ask`] - Route a question, show the evidence and stream an answer
//! - [`route`] - Show how a question would be routed, without any I/O
//! - [`index`] - Embed the recipe catalogue into the vector index
//! - [`config`] - Show and edit the configuration
//!
//! This module also wires the configured collaborators (graph store,
//! embedding model, vector index, LLM) into a [`RecipeRag`].

pub mod ask;
pub mod config;
pub mod index;
pub mod route;

use std::fs;
use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use recipe_rag::embeddings::EmbeddingProvider;
use recipe_rag::generation::{FragmentStream, GenerationService, Prompt};
use recipe_rag::store::{GraphStore, LanceIndex, MemoryGraph, Neo4jStore, RecipeSpec};
use recipe_rag::{LlmClient, RecipeRag, ServiceError, Services};

use crate::config::Config;

/// Stand-in generation service when no LLM is configured.
struct NoLlm;

#[async_trait]
impl GenerationService for NoLlm {
    async fn stream_generate(&self, _prompt: &Prompt) -> Result<FragmentStream, ServiceError> {
        Err(ServiceError::Config {
            service: "llm".to_string(),
            message: "no LLM configured; run `recipe-rag config llm <provider>`".to_string(),
        })
    }
}

/// The graph source: the offline catalogue when configured, Neo4j otherwise.
pub fn open_graph(config: &Config) -> Result<Arc<dyn GraphStore>> {
    match &config.catalog {
        Some(path) => {
            let contents = fs::read_to_string(path)
                .with_context(|| format!("Failed to read recipe catalogue: {}", path.display()))?;
            let specs: Vec<RecipeSpec> = serde_json::from_str(&contents)
                .with_context(|| format!("Failed to parse recipe catalogue: {}", path.display()))?;
            let graph = MemoryGraph::from_recipes(specs);
            log::debug!(
                "Loaded {} recipe(s) and {} ingredient(s) from {}",
                graph.recipe_count(),
                graph.ingredient_count(),
                path.display()
            );
            Ok(Arc::new(graph))
        }
        None => {
            let settings = config.neo4j();
            log::debug!("Using Neo4j at {}", settings.uri);
            let store = Neo4jStore::new(settings).context("Failed to create Neo4j client")?;
            Ok(Arc::new(store))
        }
    }
}

pub fn open_embedder(config: &Config) -> Result<Arc<dyn EmbeddingProvider>> {
    config
        .embedding
        .build()
        .context("Failed to create embedding provider")
}

pub async fn open_index(config: &Config, dims: usize) -> Result<Arc<LanceIndex>> {
    let index = LanceIndex::open(&config.lance.path, dims)
        .await
        .with_context(|| format!("Failed to open vector index at {}", config.lance.path))?;
    Ok(Arc::new(index))
}

/// Build the pipeline from configuration and load the entity lexicon.
pub async fn open_rag(config: &Config) -> Result<RecipeRag> {
    let graph = open_graph(config)?;
    let embedder = open_embedder(config)?;
    let index = open_index(config, embedder.dimensions()).await?;

    let llm: Arc<dyn GenerationService> = match config.llm.as_ref().filter(|l| l.is_ready()) {
        Some(llm_config) => {
            Arc::new(LlmClient::new(llm_config).context("Failed to create LLM client")?)
        }
        None => Arc::new(NoLlm),
    };

    let mut rag = RecipeRag::new(
        config.router.clone(),
        Services {
            graph,
            index,
            embedder,
            llm,
        },
    )?;

    match rag.refresh_lexicon().await {
        Ok(size) => log::debug!("Analyzer lexicon holds {size} name(s)"),
        Err(e) => log::warn!("Could not load entity names, using the built-in lexicon: {e}"),
    }
    Ok(rag)
}

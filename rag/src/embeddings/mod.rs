//! Embedding providers for generating vector representations of text.
//!
//! Supports OpenAI-compatible APIs and Ollama.

mod content;
mod provider;

pub use content::{build_recipe_content, compute_content_hash};
pub use provider::{
    EmbeddingBackend, EmbeddingProvider, EmbeddingSettings, OllamaProvider, OpenAiProvider,
};

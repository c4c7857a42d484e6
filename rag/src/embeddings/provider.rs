//! Embedding provider trait and implementations.
//!
//! Supports OpenAI and Ollama embedding APIs. Both accept a batch of inputs
//! in one request; they differ in route, auth and response shape.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::ServiceError;

const SERVICE: &str = "embedding";

/// Trait for embedding providers that convert text to vectors.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Generate an embedding for a single text.
    async fn embed(&self, text: &str) -> Result<Vec<f32>, ServiceError> {
        let results = self.embed_batch(&[text.to_string()]).await?;
        results.into_iter().next().ok_or_else(|| {
            ServiceError::parse(SERVICE, format!("empty response from {}", self.model_name()))
        })
    }

    /// Generate embeddings for a batch of texts.
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, ServiceError>;

    /// Return the dimensionality of embeddings produced.
    fn dimensions(&self) -> usize;

    /// Return the model name.
    fn model_name(&self) -> &str;
}

/// Which embedding backend to use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmbeddingBackend {
    OpenAi,
    Ollama,
}

/// Embedding provider configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmbeddingSettings {
    pub provider: EmbeddingBackend,
    pub model: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,
    /// Environment variable holding the API key (OpenAI only)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key_env: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dimensions: Option<usize>,
}

impl Default for EmbeddingSettings {
    fn default() -> Self {
        Self {
            provider: EmbeddingBackend::Ollama,
            model: "nomic-embed-text".to_string(),
            endpoint: None,
            api_key_env: None,
            dimensions: None,
        }
    }
}

impl EmbeddingSettings {
    /// Build the configured provider.
    pub fn build(&self) -> Result<Arc<dyn EmbeddingProvider>, ServiceError> {
        match self.provider {
            EmbeddingBackend::OpenAi => {
                let var = self.api_key_env.as_deref().unwrap_or("OPENAI_API_KEY");
                let api_key = std::env::var(var).map_err(|_| ServiceError::Config {
                    service: SERVICE.to_string(),
                    message: format!("environment variable {var} is not set"),
                })?;
                Ok(Arc::new(OpenAiProvider::new(
                    api_key,
                    self.model.clone(),
                    self.endpoint.clone(),
                    self.dimensions,
                )))
            }
            EmbeddingBackend::Ollama => Ok(Arc::new(OllamaProvider::new(
                self.model.clone(),
                self.endpoint.clone(),
                self.dimensions,
            ))),
        }
    }
}

#[derive(Debug, Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a [String],
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
}

#[derive(Debug, Deserialize)]
struct OllamaEmbeddingResponse {
    embeddings: Vec<Vec<f32>>,
}

/// POST a batch request and decode the JSON body, classifying failures.
async fn post_embeddings<T: for<'de> Deserialize<'de>>(
    request: reqwest::RequestBuilder,
) -> Result<T, ServiceError> {
    let response = request
        .send()
        .await
        .map_err(|e| ServiceError::from_http(SERVICE, e))?;

    if !response.status().is_success() {
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        return Err(ServiceError::from_status(SERVICE, status.as_u16(), body));
    }

    response
        .json()
        .await
        .map_err(|e| ServiceError::parse(SERVICE, e.to_string()))
}

fn check_count(expected: usize, got: usize) -> Result<(), ServiceError> {
    if expected != got {
        return Err(ServiceError::parse(
            SERVICE,
            format!("requested {expected} embeddings, received {got}"),
        ));
    }
    Ok(())
}

/// OpenAI embedding provider.
///
/// Works with OpenAI's API and any compatible endpoint.
pub struct OpenAiProvider {
    client: reqwest::Client,
    endpoint: String,
    api_key: String,
    model: String,
    dims: usize,
}

impl OpenAiProvider {
    /// Create a new OpenAI provider.
    ///
    /// `endpoint` defaults to `https://api.openai.com/v1` and `dims` to 1536
    /// (text-embedding-3-small).
    pub fn new(
        api_key: String,
        model: String,
        endpoint: Option<String>,
        dims: Option<usize>,
    ) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint: endpoint.unwrap_or_else(|| "https://api.openai.com/v1".to_string()),
            api_key,
            model,
            dims: dims.unwrap_or(1536),
        }
    }
}

#[async_trait]
impl EmbeddingProvider for OpenAiProvider {
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, ServiceError> {
        let url = format!("{}/embeddings", self.endpoint);
        let request = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&EmbeddingRequest {
                model: &self.model,
                input: texts,
            });

        let result: EmbeddingResponse = post_embeddings(request).await?;
        check_count(texts.len(), result.data.len())?;
        Ok(result.data.into_iter().map(|d| d.embedding).collect())
    }

    fn dimensions(&self) -> usize {
        self.dims
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

/// Ollama embedding provider.
pub struct OllamaProvider {
    client: reqwest::Client,
    endpoint: String,
    model: String,
    dims: usize,
}

impl OllamaProvider {
    /// Create a new Ollama provider.
    ///
    /// `endpoint` defaults to `http://localhost:11434` and `dims` to 768
    /// (nomic-embed-text).
    pub fn new(model: String, endpoint: Option<String>, dims: Option<usize>) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint: endpoint.unwrap_or_else(|| "http://localhost:11434".to_string()),
            model,
            dims: dims.unwrap_or(768),
        }
    }
}

#[async_trait]
impl EmbeddingProvider for OllamaProvider {
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, ServiceError> {
        let url = format!("{}/api/embed", self.endpoint);
        let request = self.client.post(&url).json(&EmbeddingRequest {
            model: &self.model,
            input: texts,
        });

        let result: OllamaEmbeddingResponse = post_embeddings(request).await?;
        check_count(texts.len(), result.embeddings.len())?;
        Ok(result.embeddings)
    }

    fn dimensions(&self) -> usize {
        self.dims
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_openai_provider_defaults() {
        let provider = OpenAiProvider::new(
            "test-key".to_string(),
            "text-embedding-3-small".to_string(),
            None,
            None,
        );
        assert_eq!(provider.dimensions(), 1536);
        assert_eq!(provider.model_name(), "text-embedding-3-small");
        assert_eq!(provider.endpoint, "https://api.openai.com/v1");
    }

    #[test]
    fn test_ollama_provider_custom_dims() {
        let provider = OllamaProvider::new(
            "mxbai-embed-large".to_string(),
            Some("http://gpu:11434".to_string()),
            Some(1024),
        );
        assert_eq!(provider.dimensions(), 1024);
        assert_eq!(provider.endpoint, "http://gpu:11434");
    }

    #[test]
    fn test_settings_parse_lowercase_backend() {
        let settings: EmbeddingSettings =
            serde_json::from_str(r#"{"provider": "openai", "model": "text-embedding-3-small"}"#)
                .unwrap();
        assert_eq!(settings.provider, EmbeddingBackend::OpenAi);
        assert!(settings.dimensions.is_none());
    }

    #[test]
    fn test_openai_without_key_is_config_error() {
        let settings = EmbeddingSettings {
            provider: EmbeddingBackend::OpenAi,
            model: "m".to_string(),
            api_key_env: Some("RECIPE_RAG_TEST_MISSING_KEY".to_string()),
            ..Default::default()
        };
        assert!(matches!(settings.build(), Err(ServiceError::Config { .. })));
    }

    #[test]
    fn test_default_settings_build_ollama() {
        let provider = EmbeddingSettings::default().build().unwrap();
        assert_eq!(provider.model_name(), "nomic-embed-text");
        assert_eq!(provider.dimensions(), 768);
    }

    #[test]
    fn test_count_mismatch_is_parse_error() {
        assert!(check_count(2, 2).is_ok());
        assert!(matches!(check_count(2, 1), Err(ServiceError::Parse { .. })));
    }
}

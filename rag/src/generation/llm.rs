//! Streaming client for chat-completion APIs.
//!
//! Supports OpenAI (and OpenAI-compatible `custom` endpoints), Anthropic and
//! Ollama. Responses are requested in streaming mode and turned into a
//! [`FragmentStream`]; dropping the stream drops the HTTP response and closes
//! the connection.

use std::collections::VecDeque;

use async_trait::async_trait;
use futures::stream::{self, BoxStream};
use futures::{Stream, StreamExt, TryStreamExt};
use serde::{Deserialize, Serialize};

use super::prompt::Prompt;
use super::{FragmentStream, GenerationService};
use crate::error::ServiceError;

const SERVICE: &str = "llm";
const MAX_TOKENS: u32 = 4096;

/// LLM provider configuration (bring your own model).
///
/// Supported providers: `openai`, `anthropic`, `ollama`, and `custom` for any
/// OpenAI-compatible endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LlmConfig {
    /// LLM provider (openai, anthropic, ollama, custom)
    pub provider: String,
    /// API endpoint URL
    pub endpoint: String,
    /// Model name (e.g., gpt-4o-mini, claude-3-5-haiku-latest)
    pub model: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    /// Environment variable name for API key (preferred over api_key)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key_env: Option<String>,
}

impl LlmConfig {
    pub fn openai(model: &str) -> Self {
        Self {
            provider: "openai".to_string(),
            endpoint: "https://api.openai.com/v1".to_string(),
            model: model.to_string(),
            api_key: None,
            api_key_env: Some("OPENAI_API_KEY".to_string()),
        }
    }

    pub fn anthropic(model: &str) -> Self {
        Self {
            provider: "anthropic".to_string(),
            endpoint: "https://api.anthropic.com/v1".to_string(),
            model: model.to_string(),
            api_key: None,
            api_key_env: Some("ANTHROPIC_API_KEY".to_string()),
        }
    }

    pub fn ollama(endpoint: &str, model: &str) -> Self {
        Self {
            provider: "ollama".to_string(),
            endpoint: endpoint.to_string(),
            model: model.to_string(),
            api_key: None,
            api_key_env: None,
        }
    }

    pub fn custom(endpoint: &str, model: &str) -> Self {
        Self {
            provider: "custom".to_string(),
            endpoint: endpoint.to_string(),
            model: model.to_string(),
            api_key: None,
            api_key_env: None,
        }
    }

    /// Get the API key from environment or config
    pub fn get_api_key(&self) -> Option<String> {
        if let Some(env_var) = &self.api_key_env {
            if let Ok(key) = std::env::var(env_var) {
                return Some(key);
            }
        }
        self.api_key.clone()
    }

    /// Ollama and self-hosted `custom` endpoints may run without a key.
    pub fn is_ready(&self) -> bool {
        matches!(self.provider.as_str(), "ollama" | "custom") || self.get_api_key().is_some()
    }

    /// Get a masked version of the API key for display
    pub fn masked_api_key(&self) -> Option<String> {
        self.get_api_key().map(|key| {
            if key.len() > 8 {
                format!("{}...{}", &key[..4], &key[key.len() - 4..])
            } else {
                "****".to_string()
            }
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Provider {
    OpenAi,
    Anthropic,
    Ollama,
}

impl Provider {
    fn parse(name: &str) -> Option<Self> {
        match name {
            "openai" | "custom" => Some(Provider::OpenAi),
            "anthropic" => Some(Provider::Anthropic),
            "ollama" => Some(Provider::Ollama),
            _ => None,
        }
    }
}

// =============================================================================
// Wire types
// =============================================================================

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct OpenAIRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_completion_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    stream: bool,
}

#[derive(Debug, Deserialize)]
struct OpenAIStreamResponse {
    #[serde(default)]
    choices: Vec<OpenAIStreamChoice>,
}

#[derive(Debug, Deserialize)]
struct OpenAIStreamChoice {
    delta: OpenAIStreamDelta,
}

#[derive(Debug, Deserialize)]
struct OpenAIStreamDelta {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Serialize)]
struct AnthropicRequest<'a> {
    model: &'a str,
    system: &'a str,
    messages: Vec<ChatMessage<'a>>,
    max_tokens: u32,
    stream: bool,
}

#[derive(Debug, Deserialize)]
struct AnthropicStreamEvent {
    #[serde(rename = "type")]
    event_type: String,
    #[serde(default)]
    delta: Option<AnthropicStreamDelta>,
    #[serde(default)]
    error: Option<ErrorDetail>,
}

#[derive(Debug, Deserialize)]
struct AnthropicStreamDelta {
    #[serde(default)]
    text: Option<String>,
}

#[derive(Debug, Serialize)]
struct OllamaRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    stream: bool,
}

#[derive(Debug, Deserialize)]
struct OllamaStreamLine {
    #[serde(default)]
    message: Option<OllamaMessage>,
    #[serde(default)]
    done: bool,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OllamaMessage {
    #[serde(default)]
    content: String,
}

#[derive(Debug, Deserialize)]
struct ErrorDetail {
    message: String,
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorDetail,
}

// =============================================================================
// LLM Client
// =============================================================================

/// Client for streaming chat completions.
pub struct LlmClient {
    client: reqwest::Client,
    provider: Provider,
    endpoint: String,
    model: String,
    api_key: Option<String>,
}

impl LlmClient {
    /// Create a client, failing early on an unknown provider or missing key.
    pub fn new(config: &LlmConfig) -> Result<Self, ServiceError> {
        let provider = Provider::parse(&config.provider).ok_or_else(|| ServiceError::Config {
            service: SERVICE.to_string(),
            message: format!("unsupported provider: {}", config.provider),
        })?;

        let api_key = config.get_api_key();
        if api_key.is_none() && provider != Provider::Ollama && config.provider != "custom" {
            let env_var = config
                .api_key_env
                .clone()
                .unwrap_or_else(|| "API_KEY".to_string());
            return Err(ServiceError::Config {
                service: SERVICE.to_string(),
                message: format!("API key not found. Set {env_var} environment variable"),
            });
        }

        Ok(Self {
            client: reqwest::Client::new(),
            provider,
            endpoint: config.endpoint.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            api_key,
        })
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// Newer OpenAI models take `max_completion_tokens`; reasoning models
    /// also reject `temperature`.
    fn token_params(&self) -> (Option<u32>, Option<u32>, Option<f32>) {
        let model = self.model.to_lowercase();
        let reasoning = model.starts_with("o1") || model.starts_with("o3") || model.contains("gpt-5");
        if reasoning {
            (None, Some(16_384), None)
        } else if model.contains("gpt-4o") {
            (None, Some(MAX_TOKENS), Some(0.3))
        } else {
            (Some(MAX_TOKENS), None, Some(0.3))
        }
    }

    fn request(&self, prompt: &Prompt) -> reqwest::RequestBuilder {
        match self.provider {
            Provider::OpenAi => {
                let (max_tokens, max_completion_tokens, temperature) = self.token_params();
                let body = OpenAIRequest {
                    model: &self.model,
                    messages: vec![
                        ChatMessage {
                            role: "system",
                            content: &prompt.system,
                        },
                        ChatMessage {
                            role: "user",
                            content: &prompt.user,
                        },
                    ],
                    max_tokens,
                    max_completion_tokens,
                    temperature,
                    stream: true,
                };
                let mut request = self
                    .client
                    .post(format!("{}/chat/completions", self.endpoint))
                    .json(&body);
                if let Some(key) = &self.api_key {
                    request = request.bearer_auth(key);
                }
                request
            }
            Provider::Anthropic => {
                let body = AnthropicRequest {
                    model: &self.model,
                    system: &prompt.system,
                    messages: vec![ChatMessage {
                        role: "user",
                        content: &prompt.user,
                    }],
                    max_tokens: MAX_TOKENS,
                    stream: true,
                };
                self.client
                    .post(format!("{}/messages", self.endpoint))
                    .header("x-api-key", self.api_key.as_deref().unwrap_or_default())
                    .header("anthropic-version", "2023-06-01")
                    .json(&body)
            }
            Provider::Ollama => {
                let body = OllamaRequest {
                    model: &self.model,
                    messages: vec![
                        ChatMessage {
                            role: "system",
                            content: &prompt.system,
                        },
                        ChatMessage {
                            role: "user",
                            content: &prompt.user,
                        },
                    ],
                    stream: true,
                };
                self.client
                    .post(format!("{}/api/chat", self.endpoint))
                    .json(&body)
            }
        }
    }
}

#[async_trait]
impl GenerationService for LlmClient {
    async fn stream_generate(&self, prompt: &Prompt) -> Result<FragmentStream, ServiceError> {
        log::debug!("Streaming completion from {} ({:?})", self.model, self.provider);

        let response = self
            .request(prompt)
            .send()
            .await
            .map_err(|e| ServiceError::from_http(SERVICE, e))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<ErrorEnvelope>(&text)
                .map(|e| e.error.message)
                .unwrap_or(text);
            return Err(ServiceError::from_status(SERVICE, status.as_u16(), message));
        }

        let bytes = response
            .bytes_stream()
            .map_err(|e| ServiceError::from_http(SERVICE, e));
        Ok(fragment_stream(bytes, self.provider))
    }
}

// =============================================================================
// Stream parsing
// =============================================================================

#[derive(Debug, PartialEq)]
enum LineEvent {
    Fragment(String),
    /// Text carried on the end-of-stream line itself
    LastFragment(String),
    Done,
    Failed(String),
    Skip,
}

/// Interpret one complete line of a streaming response.
///
/// OpenAI and Anthropic send server-sent events (`data: {...}`); Ollama sends
/// one JSON object per line.
fn parse_line(provider: Provider, line: &str) -> LineEvent {
    let line = line.trim();
    if line.is_empty() {
        return LineEvent::Skip;
    }

    match provider {
        Provider::OpenAi => {
            let Some(data) = line.strip_prefix("data:").map(str::trim) else {
                return LineEvent::Skip;
            };
            if data == "[DONE]" {
                return LineEvent::Done;
            }
            if let Ok(envelope) = serde_json::from_str::<ErrorEnvelope>(data) {
                return LineEvent::Failed(envelope.error.message);
            }
            match serde_json::from_str::<OpenAIStreamResponse>(data) {
                Ok(chunk) => chunk
                    .choices
                    .into_iter()
                    .next()
                    .and_then(|c| c.delta.content)
                    .filter(|c| !c.is_empty())
                    .map_or(LineEvent::Skip, LineEvent::Fragment),
                Err(_) => LineEvent::Skip,
            }
        }
        Provider::Anthropic => {
            let Some(data) = line.strip_prefix("data:").map(str::trim) else {
                return LineEvent::Skip;
            };
            let Ok(event) = serde_json::from_str::<AnthropicStreamEvent>(data) else {
                return LineEvent::Skip;
            };
            match event.event_type.as_str() {
                "content_block_delta" => event
                    .delta
                    .and_then(|d| d.text)
                    .filter(|t| !t.is_empty())
                    .map_or(LineEvent::Skip, LineEvent::Fragment),
                "message_stop" => LineEvent::Done,
                "error" => LineEvent::Failed(
                    event
                        .error
                        .map(|e| e.message)
                        .unwrap_or_else(|| "stream error".to_string()),
                ),
                _ => LineEvent::Skip,
            }
        }
        Provider::Ollama => {
            let Ok(chunk) = serde_json::from_str::<OllamaStreamLine>(line) else {
                return LineEvent::Skip;
            };
            if let Some(error) = chunk.error {
                return LineEvent::Failed(error);
            }
            let text = chunk.message.map(|m| m.content).filter(|c| !c.is_empty());
            match (text, chunk.done) {
                (Some(text), true) => LineEvent::LastFragment(text),
                (Some(text), false) => LineEvent::Fragment(text),
                (None, true) => LineEvent::Done,
                (None, false) => LineEvent::Skip,
            }
        }
    }
}

struct ParseState {
    bytes: BoxStream<'static, Result<Vec<u8>, ServiceError>>,
    buffer: Vec<u8>,
    pending: VecDeque<Result<String, ServiceError>>,
    provider: Provider,
    finished: bool,
}

impl ParseState {
    /// Parse every complete line in the buffer; with `flush`, also the unterminated tail.
    fn drain_lines(&mut self, flush: bool) {
        loop {
            let line = match self.buffer.iter().position(|&b| b == b'\n') {
                Some(pos) => self.buffer.drain(..=pos).collect::<Vec<u8>>(),
                None if flush && !self.buffer.is_empty() => std::mem::take(&mut self.buffer),
                None => return,
            };
            match parse_line(self.provider, &String::from_utf8_lossy(&line)) {
                LineEvent::Fragment(text) => self.pending.push_back(Ok(text)),
                LineEvent::LastFragment(text) => {
                    self.pending.push_back(Ok(text));
                    self.finished = true;
                    return;
                }
                LineEvent::Done => {
                    self.finished = true;
                    return;
                }
                LineEvent::Failed(message) => {
                    self.pending
                        .push_back(Err(ServiceError::unavailable(SERVICE, message)));
                    self.finished = true;
                    return;
                }
                LineEvent::Skip => {}
            }
        }
    }
}

/// Turn a raw byte stream into text fragments.
///
/// Lines may be split across chunks (and multi-byte characters across
/// chunk boundaries), so bytes are buffered until a newline arrives. A body
/// that ends before the provider's end-of-stream marker yields an error.
fn fragment_stream<S, B>(bytes: S, provider: Provider) -> FragmentStream
where
    S: Stream<Item = Result<B, ServiceError>> + Send + 'static,
    B: AsRef<[u8]>,
{
    let state = ParseState {
        bytes: bytes.map_ok(|b| b.as_ref().to_vec()).boxed(),
        buffer: Vec::new(),
        pending: VecDeque::new(),
        provider,
        finished: false,
    };

    stream::unfold(state, |mut state| async move {
        loop {
            if let Some(item) = state.pending.pop_front() {
                return Some((item, state));
            }
            if state.finished {
                return None;
            }
            match state.bytes.next().await {
                Some(Ok(chunk)) => {
                    state.buffer.extend_from_slice(&chunk);
                    state.drain_lines(false);
                }
                Some(Err(e)) => {
                    state.finished = true;
                    return Some((Err(e), state));
                }
                None => {
                    state.drain_lines(true);
                    if !state.finished {
                        log::warn!("LLM response closed before its end-of-stream marker");
                        state.pending.push_back(Err(ServiceError::unavailable(
                            SERVICE,
                            "stream ended before completion",
                        )));
                        state.finished = true;
                    }
                }
            }
        }
    })
    .boxed()
}

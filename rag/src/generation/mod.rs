//! Answer generation over fused evidence.
//!
//! [`AdaptiveGenerator`] renders a bounded prompt and returns an
//! [`AnswerStream`]: a lazy, finite sequence of [`AnswerEvent`]s that always
//! ends with exactly one `Done` or `Error` marker. Nothing is sent to the
//! language model until the stream is first polled, and dropping the stream
//! drops the in-flight service call with it.

mod llm;
mod prompt;

pub use llm::{LlmClient, LlmConfig};
pub use prompt::{Prompt, PromptBuilder};

use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use async_trait::async_trait;
use futures::stream::{self, BoxStream};
use futures::{Stream, StreamExt};
use serde::ser::{Serialize, SerializeMap, Serializer};
use tokio::sync::OwnedSemaphorePermit;
use tokio::time::Instant;

use crate::config::RouterConfig;
use crate::error::{GenerationFault, GenerationStage, ServiceError};
use crate::retrieval::ServiceGate;
use crate::types::Document;

/// Text fragments from a language-model service, in arrival order.
pub type FragmentStream = BoxStream<'static, Result<String, ServiceError>>;

/// A language-model service that streams its completion.
#[async_trait]
pub trait GenerationService: Send + Sync {
    /// Start generating. The returned stream must stop all service-side
    /// work when dropped.
    async fn stream_generate(&self, prompt: &Prompt) -> Result<FragmentStream, ServiceError>;
}

/// One item of an answer stream.
#[derive(Debug, Clone, PartialEq)]
pub enum AnswerEvent {
    /// Next piece of answer text
    Fragment(String),
    /// The answer finished normally
    Done,
    /// Generation failed; no more events follow
    Error(GenerationFault),
}

impl AnswerEvent {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, AnswerEvent::Fragment(_))
    }
}

/// Serialized as `{"type": "token" | "done" | "error", ...}` so a transport
/// layer can forward each event as-is.
impl Serialize for AnswerEvent {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            AnswerEvent::Fragment(text) => {
                let mut map = serializer.serialize_map(Some(2))?;
                map.serialize_entry("type", "token")?;
                map.serialize_entry("content", text)?;
                map.end()
            }
            AnswerEvent::Done => {
                let mut map = serializer.serialize_map(Some(1))?;
                map.serialize_entry("type", "done")?;
                map.end()
            }
            AnswerEvent::Error(fault) => {
                let mut map = serializer.serialize_map(Some(3))?;
                map.serialize_entry("type", "error")?;
                map.serialize_entry("message", &fault.to_string())?;
                map.serialize_entry("retryable", &fault.cause.is_transient())?;
                map.end()
            }
        }
    }
}

enum Phase {
    Pending {
        service: Arc<dyn GenerationService>,
        prompt: Prompt,
        gate: ServiceGate,
    },
    Streaming {
        fragments: FragmentStream,
        gate: ServiceGate,
        delivered: usize,
        _permit: OwnedSemaphorePermit,
    },
    Finished,
}

impl Phase {
    /// Advance by one event.
    async fn step(mut self) -> Option<(AnswerEvent, Phase)> {
        loop {
            match self {
                Phase::Pending {
                    service,
                    prompt,
                    gate,
                } => {
                    let fault = |cause| {
                        AnswerEvent::Error(GenerationFault {
                            stage: GenerationStage::BeforeStream,
                            cause,
                        })
                    };
                    let permit = match gate.acquire().await {
                        Ok(permit) => permit,
                        Err(e) => return Some((fault(e), Phase::Finished)),
                    };
                    let started = tokio::time::timeout(
                        gate.request_timeout(),
                        service.stream_generate(&prompt),
                    )
                    .await;
                    let fragments = match started {
                        Ok(Ok(fragments)) => fragments,
                        Ok(Err(e)) => return Some((fault(e), Phase::Finished)),
                        Err(_) => {
                            let e = ServiceError::timeout(gate.service(), "generation did not start");
                            return Some((fault(e), Phase::Finished));
                        }
                    };
                    self = Phase::Streaming {
                        fragments,
                        gate,
                        delivered: 0,
                        _permit: permit,
                    };
                }
                Phase::Streaming {
                    mut fragments,
                    gate,
                    delivered,
                    _permit,
                } => loop {
                    let stage = if delivered == 0 {
                        GenerationStage::BeforeStream
                    } else {
                        GenerationStage::MidStream {
                            fragments_delivered: delivered,
                        }
                    };
                    let next = tokio::time::timeout(gate.request_timeout(), fragments.next()).await;
                    let cause = match next {
                        Ok(Some(Ok(text))) if text.is_empty() => continue,
                        Ok(Some(Ok(text))) => {
                            return Some((
                                AnswerEvent::Fragment(text),
                                Phase::Streaming {
                                    fragments,
                                    gate,
                                    delivered: delivered + 1,
                                    _permit,
                                },
                            ));
                        }
                        Ok(None) => return Some((AnswerEvent::Done, Phase::Finished)),
                        Ok(Some(Err(e))) => e,
                        Err(_) => ServiceError::timeout(
                            gate.service(),
                            format!("no fragment within {}ms", gate.request_timeout().as_millis()),
                        ),
                    };
                    log::warn!("Answer generation failed {stage}: {cause}");
                    return Some((
                        AnswerEvent::Error(GenerationFault { stage, cause }),
                        Phase::Finished,
                    ));
                },
                Phase::Finished => return None,
            }
        }
    }
}

/// Lazy, finite, non-restartable sequence of answer events.
///
/// Ends with exactly one [`AnswerEvent::Done`] or [`AnswerEvent::Error`].
/// Dropping it cancels the underlying service call.
pub struct AnswerStream {
    inner: BoxStream<'static, AnswerEvent>,
}

impl AnswerStream {
    fn new(service: Arc<dyn GenerationService>, prompt: Prompt, gate: ServiceGate) -> Self {
        let phase = Phase::Pending {
            service,
            prompt,
            gate,
        };
        Self {
            inner: stream::unfold(phase, Phase::step).boxed(),
        }
    }

    /// Give up at `deadline`: the in-flight call is dropped and the stream
    /// ends with a timeout error marker.
    pub fn with_deadline(self, deadline: Instant) -> Self {
        let state = (self.inner, 0usize, false);
        let inner = stream::unfold(state, move |(mut inner, delivered, finished)| async move {
            if finished {
                return None;
            }
            match tokio::time::timeout_at(deadline, inner.next()).await {
                Ok(Some(event)) => {
                    let terminal = event.is_terminal();
                    let delivered = delivered + usize::from(!terminal);
                    Some((event, (inner, delivered, terminal)))
                }
                Ok(None) => None,
                Err(_) => {
                    let stage = if delivered == 0 {
                        GenerationStage::BeforeStream
                    } else {
                        GenerationStage::MidStream {
                            fragments_delivered: delivered,
                        }
                    };
                    let fault = GenerationFault {
                        stage,
                        cause: ServiceError::timeout("llm", "request deadline elapsed"),
                    };
                    // Dropping the inner stream here releases the service call
                    drop(inner);
                    Some((AnswerEvent::Error(fault), (stream::empty().boxed(), delivered, true)))
                }
            }
        });
        Self {
            inner: inner.boxed(),
        }
    }

    /// Drain the stream into the full answer text.
    pub async fn collect_text(mut self) -> Result<String, GenerationFault> {
        let mut text = String::new();
        while let Some(event) = self.next().await {
            match event {
                AnswerEvent::Fragment(fragment) => text.push_str(&fragment),
                AnswerEvent::Done => break,
                AnswerEvent::Error(fault) => return Err(fault),
            }
        }
        Ok(text)
    }
}

impl Stream for AnswerStream {
    type Item = AnswerEvent;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.inner.poll_next_unpin(cx)
    }
}

/// Builds prompts from evidence and drives the generation service.
pub struct AdaptiveGenerator {
    service: Arc<dyn GenerationService>,
    prompts: PromptBuilder,
    gate: ServiceGate,
}

impl AdaptiveGenerator {
    pub fn new(service: Arc<dyn GenerationService>, config: &RouterConfig) -> Self {
        Self {
            service,
            prompts: PromptBuilder::from_config(config),
            gate: ServiceGate::new("llm", &config.generation_pool),
        }
    }

    pub fn prompt(&self, query: &str, evidence: &[Document]) -> Prompt {
        self.prompts.build(query, evidence)
    }

    /// Stream an answer to `query` grounded in `evidence`.
    pub fn generate(&self, query: &str, evidence: &[Document]) -> AnswerStream {
        AnswerStream::new(
            Arc::clone(&self.service),
            self.prompt(query, evidence),
            self.gate.clone(),
        )
    }
}

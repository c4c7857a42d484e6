use std::fmt;

use thiserror::Error;

use crate::types::{SourceType, Strategy};

/// Errors returned by the external collaborators (graph store, vector index,
/// embedding and generation services).
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ServiceError {
    #[error("{service} timed out: {message}")]
    Timeout { service: String, message: String },

    #[error("{service} unavailable: {message}")]
    Unavailable { service: String, message: String },

    #[error("{service} pool saturated after waiting {waited_ms}ms")]
    PoolSaturated { service: String, waited_ms: u64 },

    #[error("{service} rejected the request: {message}")]
    Rejected { service: String, message: String },

    #[error("{service} returned an unreadable response: {message}")]
    Parse { service: String, message: String },

    #[error("{service} is misconfigured: {message}")]
    Config { service: String, message: String },
}

impl ServiceError {
    /// Whether retrying the same call may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            ServiceError::Timeout { .. }
                | ServiceError::Unavailable { .. }
                | ServiceError::PoolSaturated { .. }
        )
    }

    pub fn timeout(service: &str, message: impl Into<String>) -> Self {
        ServiceError::Timeout {
            service: service.to_string(),
            message: message.into(),
        }
    }

    pub fn unavailable(service: &str, message: impl Into<String>) -> Self {
        ServiceError::Unavailable {
            service: service.to_string(),
            message: message.into(),
        }
    }

    pub fn rejected(service: &str, message: impl Into<String>) -> Self {
        ServiceError::Rejected {
            service: service.to_string(),
            message: message.into(),
        }
    }

    pub fn parse(service: &str, message: impl Into<String>) -> Self {
        ServiceError::Parse {
            service: service.to_string(),
            message: message.into(),
        }
    }

    /// Classify a transport error from an HTTP-backed service.
    ///
    /// Timeouts, connection failures and 5xx responses are transient; any other
    /// status is treated as a rejection of the request itself.
    pub fn from_http(service: &str, err: reqwest::Error) -> Self {
        if err.is_timeout() {
            return Self::timeout(service, err.to_string());
        }
        if err.is_connect() || err.is_request() {
            return Self::unavailable(service, err.to_string());
        }
        if let Some(status) = err.status() {
            return Self::from_status(service, status.as_u16(), err.to_string());
        }
        if err.is_decode() || err.is_body() {
            return Self::parse(service, err.to_string());
        }
        Self::unavailable(service, err.to_string())
    }

    /// Classify a non-success HTTP status.
    pub fn from_status(service: &str, status: u16, body: impl Into<String>) -> Self {
        let message = format!("HTTP {status}: {}", body.into());
        match status {
            408 | 429 | 500..=599 => Self::unavailable(service, message),
            _ => Self::rejected(service, message),
        }
    }
}

/// One retrieval source that failed while serving a request.
#[derive(Debug, Clone, PartialEq)]
pub struct SourceFailure {
    pub source: SourceType,
    pub cause: ServiceError,
}

impl fmt::Display for SourceFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} source: {}", self.source, self.cause)
    }
}

/// Retrieval could not produce any evidence because every source it tried failed.
#[derive(Error, Debug, Clone, PartialEq)]
#[error("retrieval failed for {strategy} strategy ({})", format_failures(.failures))]
pub struct RetrievalFault {
    pub strategy: Strategy,
    pub failures: Vec<SourceFailure>,
}

fn format_failures(failures: &[SourceFailure]) -> String {
    failures
        .iter()
        .map(|f| f.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}

/// Where in the generation pipeline a failure happened.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GenerationStage {
    /// The service refused or failed before the first fragment arrived.
    BeforeStream,
    /// The stream broke after some fragments had been delivered.
    MidStream { fragments_delivered: usize },
}

impl fmt::Display for GenerationStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GenerationStage::BeforeStream => write!(f, "before streaming"),
            GenerationStage::MidStream {
                fragments_delivered,
            } => write!(f, "after {fragments_delivered} fragment(s)"),
        }
    }
}

/// The language-model service failed while producing an answer.
#[derive(Error, Debug, Clone, PartialEq)]
#[error("answer generation failed {stage}: {cause}")]
pub struct GenerationFault {
    pub stage: GenerationStage,
    pub cause: ServiceError,
}

/// Errors that can occur during routing, retrieval and generation.
#[derive(Error, Debug)]
pub enum RagError {
    #[error("Query analysis error: {0}")]
    Analysis(String),

    #[error(transparent)]
    Retrieval(#[from] RetrievalFault),

    #[error(transparent)]
    Generation(#[from] GenerationFault),

    #[error("Embedding provider error: {0}")]
    Embedding(String),

    #[error("Vector store error: {0}")]
    Store(String),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error(transparent)]
    Service(#[from] ServiceError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("LanceDB error: {0}")]
    LanceDb(String),

    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

impl From<lancedb::Error> for RagError {
    fn from(e: lancedb::Error) -> Self {
        RagError::LanceDb(e.to_string())
    }
}

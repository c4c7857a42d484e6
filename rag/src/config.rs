//! Router configuration.
//!
//! Every knob has a default so a partially specified config file still
//! deserializes into a usable [`RouterConfig`].

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::RagError;

/// Bounded access to one external service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolConfig {
    /// Maximum in-flight calls to the service
    pub max_concurrent: usize,
    /// How long a call may wait for a free slot before failing
    pub acquire_timeout_ms: u64,
    /// Upper bound on a single call (or on the first fragment of a stream)
    pub request_timeout_ms: u64,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_concurrent: 8,
            acquire_timeout_ms: 5_000,
            request_timeout_ms: 30_000,
        }
    }
}

impl PoolConfig {
    pub fn acquire_timeout(&self) -> Duration {
        Duration::from_millis(self.acquire_timeout_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

/// Retry policy for transient retrieval failures.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Retries after the first attempt
    pub max_retries: u32,
    /// Delay before the first retry; doubles on each further retry
    pub base_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 2,
            base_delay_ms: 100,
        }
    }
}

impl RetryConfig {
    /// Backoff before retry number `attempt` (1-based).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 2u64.saturating_pow(attempt.saturating_sub(1));
        Duration::from_millis(self.base_delay_ms.saturating_mul(factor))
    }
}

/// Configuration for query routing, fusion and prompt assembly.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RouterConfig {
    /// Complexity at or above which a query goes hybrid
    pub complexity_threshold: f32,
    /// Relationship intensity at or above which a query goes to the graph
    pub relationship_threshold: f32,
    /// Evidence set size when the caller does not specify one
    pub top_k: usize,
    /// Weight applied to normalized graph scores during fusion
    pub graph_weight: f32,
    /// Weight applied to normalized vector scores during fusion
    pub vector_weight: f32,
    /// Bonus added when both sources returned the same document
    pub agreement_bonus: f32,
    /// Character budget for the rendered evidence in a prompt
    pub max_context_chars: usize,
    /// Per-document content truncation inside the prompt
    pub max_doc_chars: usize,
    pub retry: RetryConfig,
    pub graph_pool: PoolConfig,
    pub vector_pool: PoolConfig,
    pub embedding_pool: PoolConfig,
    pub generation_pool: PoolConfig,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            complexity_threshold: 0.5,
            relationship_threshold: 0.5,
            top_k: 5,
            graph_weight: 1.0,
            vector_weight: 1.0,
            agreement_bonus: 0.1,
            max_context_chars: 6_000,
            max_doc_chars: 800,
            retry: RetryConfig::default(),
            graph_pool: PoolConfig::default(),
            vector_pool: PoolConfig::default(),
            embedding_pool: PoolConfig::default(),
            generation_pool: PoolConfig {
                max_concurrent: 4,
                acquire_timeout_ms: 5_000,
                request_timeout_ms: 60_000,
            },
        }
    }
}

impl RouterConfig {
    /// Check that thresholds, weights and pool sizes are usable.
    pub fn validate(&self) -> Result<(), RagError> {
        for (name, value) in [
            ("complexity_threshold", self.complexity_threshold),
            ("relationship_threshold", self.relationship_threshold),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(RagError::Config(format!(
                    "{name} must be within [0, 1], got {value}"
                )));
            }
        }

        for (name, value) in [
            ("graph_weight", self.graph_weight),
            ("vector_weight", self.vector_weight),
        ] {
            if !value.is_finite() || value < 0.0 {
                return Err(RagError::Config(format!(
                    "{name} must be a non-negative number, got {value}"
                )));
            }
        }

        // A document confirmed by both sources must outrank either alone
        if !self.agreement_bonus.is_finite() || self.agreement_bonus <= 0.0 {
            return Err(RagError::Config(format!(
                "agreement_bonus must be a positive number, got {}",
                self.agreement_bonus
            )));
        }

        if self.top_k == 0 {
            return Err(RagError::Config("top_k must be at least 1".to_string()));
        }

        for (name, pool) in [
            ("graph_pool", &self.graph_pool),
            ("vector_pool", &self.vector_pool),
            ("embedding_pool", &self.embedding_pool),
            ("generation_pool", &self.generation_pool),
        ] {
            if pool.max_concurrent == 0 {
                return Err(RagError::Config(format!(
                    "{name}.max_concurrent must be at least 1"
                )));
            }
        }

        Ok(())
    }
}

use std::collections::BTreeMap;
use std::fmt;
use std::time::SystemTime;

use serde::{Deserialize, Serialize};

/// Retrieval strategy chosen for a query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Strategy {
    /// Graph traversal only (relationship-heavy questions)
    Graph,
    /// Similarity search only (simple lookups)
    Vector,
    /// Both sources, fused
    Hybrid,
}

impl Strategy {
    pub const ALL: [Strategy; 3] = [Strategy::Graph, Strategy::Vector, Strategy::Hybrid];

    pub fn as_str(&self) -> &'static str {
        match self {
            Strategy::Graph => "graph",
            Strategy::Vector => "vector",
            Strategy::Hybrid => "hybrid",
        }
    }

    pub fn uses_graph(&self) -> bool {
        matches!(self, Strategy::Graph | Strategy::Hybrid)
    }

    pub fn uses_vector(&self) -> bool {
        matches!(self, Strategy::Vector | Strategy::Hybrid)
    }
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which retriever produced a document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceType {
    Graph,
    Vector,
}

impl fmt::Display for SourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceType::Graph => f.write_str("graph"),
            SourceType::Vector => f.write_str("vector"),
        }
    }
}

/// How a document ended up in the evidence set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SearchType {
    Graph,
    Vector,
    /// Returned by both retrievers and merged during fusion
    Hybrid,
}

impl From<SourceType> for SearchType {
    fn from(source: SourceType) -> Self {
        match source {
            SourceType::Graph => SearchType::Graph,
            SourceType::Vector => SearchType::Vector,
        }
    }
}

/// Structured profile of a user query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryProfile {
    /// Original query text
    pub query: String,
    /// 0..=1, higher means more multi-hop / analytical
    pub complexity: f32,
    /// 0..=1, higher means more cross-entity relationship language
    pub relationship_intensity: f32,
    /// Ingredient / recipe / category names found in the query, in order of appearance
    pub entities: Vec<String>,
    /// Human-readable trail of how the scores were derived
    pub reasoning: Vec<String>,
}

/// The recorded outcome of analyzing and routing one query.
#[derive(Debug, Clone, Serialize)]
pub struct RouteDecision {
    pub query: String,
    pub profile: QueryProfile,
    pub strategy: Strategy,
    pub rationale: String,
    #[serde(with = "epoch_millis")]
    pub timestamp: SystemTime,
}

impl RouteDecision {
    /// Multi-line explanation of the routing decision for display.
    pub fn explain(&self) -> String {
        let mut lines = vec![
            format!("Strategy: {}", self.strategy),
            format!(
                "Complexity: {:.2}  Relationship intensity: {:.2}",
                self.profile.complexity, self.profile.relationship_intensity
            ),
        ];
        if !self.profile.entities.is_empty() {
            lines.push(format!("Entities: {}", self.profile.entities.join(", ")));
        }
        lines.push(format!("Rationale: {}", self.rationale));
        for reason in &self.profile.reasoning {
            lines.push(format!("  - {reason}"));
        }
        lines.join("\n")
    }
}

/// Source-specific metadata attached to a retrieved document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recipe_name: Option<String>,
    /// Raw score from the graph retriever, if it returned this document
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub graph_score: Option<f32>,
    /// Raw score from the vector retriever, if it returned this document
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vector_score: Option<f32>,
    pub search_type: SearchType,
    /// Additional facts (category, difficulty, chunk id, ...)
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub extra: BTreeMap<String, String>,
}

impl DocumentMetadata {
    pub fn new(source: SourceType, recipe_name: Option<String>, raw_score: f32) -> Self {
        let (graph_score, vector_score) = match source {
            SourceType::Graph => (Some(raw_score), None),
            SourceType::Vector => (None, Some(raw_score)),
        };
        Self {
            recipe_name,
            graph_score,
            vector_score,
            search_type: source.into(),
            extra: BTreeMap::new(),
        }
    }
}

/// A scored unit of retrieved evidence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    /// Stable entity identifier (recipe id for graph rows, parent recipe or chunk id for vector hits)
    pub id: String,
    pub source_type: SourceType,
    pub content: String,
    pub metadata: DocumentMetadata,
    /// Set only by the fuser
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub final_score: Option<f32>,
}

impl Document {
    pub fn new(
        id: impl Into<String>,
        source_type: SourceType,
        content: impl Into<String>,
        recipe_name: Option<String>,
        raw_score: f32,
    ) -> Self {
        Self {
            id: id.into(),
            source_type,
            content: content.into(),
            metadata: DocumentMetadata::new(source_type, recipe_name, raw_score),
            final_score: None,
        }
    }

    /// The score assigned by the retriever that produced this document.
    pub fn raw_score(&self) -> f32 {
        match self.source_type {
            SourceType::Graph => self.metadata.graph_score,
            SourceType::Vector => self.metadata.vector_score,
        }
        .unwrap_or(0.0)
    }

    pub fn with_extra(mut self, key: &str, value: impl Into<String>) -> Self {
        self.metadata.extra.insert(key.to_string(), value.into());
        self
    }

    /// Compact reference suitable for showing which evidence backed an answer.
    pub fn summary(&self) -> EvidenceRef {
        EvidenceRef {
            id: self.id.clone(),
            name: self
                .metadata
                .recipe_name
                .clone()
                .unwrap_or_else(|| "Unknown".to_string()),
            score: self.final_score.unwrap_or(0.0),
            search_type: self.metadata.search_type,
        }
    }
}

/// Lightweight description of one piece of evidence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvidenceRef {
    pub id: String,
    pub name: String,
    pub score: f32,
    pub search_type: SearchType,
}

/// Point-in-time copy of the routing counters.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouteStatsSnapshot {
    pub total: u64,
    pub graph: u64,
    pub vector: u64,
    pub hybrid: u64,
}

impl RouteStatsSnapshot {
    pub fn count(&self, strategy: Strategy) -> u64 {
        match strategy {
            Strategy::Graph => self.graph,
            Strategy::Vector => self.vector,
            Strategy::Hybrid => self.hybrid,
        }
    }
}

/// A recipe row returned by a graph pattern query.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RecipeRow {
    pub recipe_id: String,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub difficulty: Option<String>,
    #[serde(default)]
    pub ingredients: Vec<String>,
    #[serde(default)]
    pub steps: Vec<String>,
    /// Query entities or keywords this row was reached from
    #[serde(default)]
    pub matched: Vec<String>,
    /// Shortest traversal distance from a matched node to the recipe (0 = the recipe itself)
    #[serde(default)]
    pub hops: u32,
}

/// Metadata stored alongside an embedded chunk.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChunkMetadata {
    /// Recipe the chunk was cut from, used as the fusion identity
    #[serde(default)]
    pub recipe_id: Option<String>,
    #[serde(default)]
    pub recipe_name: Option<String>,
    #[serde(default)]
    pub content: String,
}

/// A nearest-neighbour hit from the vector index.
#[derive(Debug, Clone, PartialEq)]
pub struct VectorHit {
    pub id: String,
    /// Similarity, higher is closer
    pub score: f32,
    pub metadata: ChunkMetadata,
}

mod epoch_millis {
    use std::time::{SystemTime, UNIX_EPOCH};

    use serde::Serializer;

    pub fn serialize<S: Serializer>(time: &SystemTime, serializer: S) -> Result<S::Ok, S::Error> {
        let millis = time
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0);
        serializer.serialize_u64(millis)
    }
}

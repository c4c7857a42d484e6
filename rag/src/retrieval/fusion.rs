use std::collections::HashMap;

use crate::config::RouterConfig;
use crate::types::{Document, SearchType};

/// Spread below which a source's scores are treated as all equal.
const FLAT_EPSILON: f32 = 1e-6;

/// Merges graph and vector documents into one ranked, de-duplicated list.
///
/// Each source is min-max normalized on its own before weighting, so the
/// two score scales never bias each other. A document returned by both
/// sources keeps the better weighted score plus a fixed agreement bonus.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ResultFuser {
    pub graph_weight: f32,
    pub vector_weight: f32,
    pub agreement_bonus: f32,
}

impl Default for ResultFuser {
    fn default() -> Self {
        Self::from_config(&RouterConfig::default())
    }
}

struct Candidate {
    doc: Document,
    /// Graph documents first, then vector-only documents, in input order
    ordinal: usize,
    score: f32,
}

impl ResultFuser {
    pub fn from_config(config: &RouterConfig) -> Self {
        Self {
            graph_weight: config.graph_weight,
            vector_weight: config.vector_weight,
            agreement_bonus: config.agreement_bonus,
        }
    }

    /// Fuse both sources and keep the best `top_k`.
    ///
    /// Two empty inputs give an empty result.
    pub fn fuse(
        &self,
        graph_docs: Vec<Document>,
        vector_docs: Vec<Document>,
        top_k: usize,
    ) -> Vec<Document> {
        let graph_docs = dedupe(graph_docs);
        let vector_docs = dedupe(vector_docs);
        let graph_norm = normalize(&graph_docs);
        let vector_norm = normalize(&vector_docs);

        let mut candidates: Vec<Candidate> = Vec::with_capacity(graph_docs.len() + vector_docs.len());
        let mut by_id: HashMap<String, usize> = HashMap::new();
        let graph_count = graph_docs.len();

        for (i, (doc, norm)) in graph_docs.into_iter().zip(graph_norm).enumerate() {
            by_id.insert(doc.id.clone(), candidates.len());
            candidates.push(Candidate {
                doc,
                ordinal: i,
                score: self.graph_weight * norm,
            });
        }

        for (j, (doc, norm)) in vector_docs.into_iter().zip(vector_norm).enumerate() {
            let weighted = self.vector_weight * norm;
            match by_id.get(&doc.id) {
                Some(&k) => {
                    let merged = &mut candidates[k];
                    merged.score = merged.score.max(weighted) + self.agreement_bonus;
                    merged.doc.metadata.vector_score = doc.metadata.vector_score;
                    merged.doc.metadata.search_type = SearchType::Hybrid;
                    if merged.doc.metadata.recipe_name.is_none() {
                        merged.doc.metadata.recipe_name = doc.metadata.recipe_name;
                    }
                    for (key, value) in doc.metadata.extra {
                        merged.doc.metadata.extra.entry(key).or_insert(value);
                    }
                }
                None => candidates.push(Candidate {
                    doc,
                    ordinal: graph_count + j,
                    score: weighted,
                }),
            }
        }

        candidates.sort_by(|a, b| {
            b.score
                .total_cmp(&a.score)
                .then(a.ordinal.cmp(&b.ordinal))
        });

        candidates
            .into_iter()
            .take(top_k)
            .map(|c| {
                let mut doc = c.doc;
                doc.final_score = Some(c.score);
                doc
            })
            .collect()
    }
}

/// Keep one document per id, at the position of its first occurrence, with
/// the highest raw score seen for that id.
fn dedupe(docs: Vec<Document>) -> Vec<Document> {
    let mut positions: HashMap<String, usize> = HashMap::new();
    let mut unique: Vec<Document> = Vec::with_capacity(docs.len());
    for doc in docs {
        match positions.get(&doc.id) {
            Some(&i) => {
                if doc.raw_score() > unique[i].raw_score() {
                    unique[i] = doc;
                }
            }
            None => {
                positions.insert(doc.id.clone(), unique.len());
                unique.push(doc);
            }
        }
    }
    unique
}

/// Min-max normalize raw scores to [0, 1]. A single document, or a source
/// whose scores are all equal, normalizes to 1.0.
fn normalize(docs: &[Document]) -> Vec<f32> {
    let scores: Vec<f32> = docs
        .iter()
        .map(|d| {
            let s = d.raw_score();
            if s.is_finite() { s } else { 0.0 }
        })
        .collect();

    let min = scores.iter().copied().fold(f32::INFINITY, f32::min);
    let max = scores.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    let spread = max - min;
    if scores.len() <= 1 || spread < FLAT_EPSILON {
        return vec![1.0; scores.len()];
    }
    scores.iter().map(|s| (s - min) / spread).collect()
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use proptest::prelude::*;

    use super::*;
    use crate::types::SourceType;

    fn graph(id: &str, score: f32) -> Document {
        Document::new(id, SourceType::Graph, format!("graph {id}"), Some(id.to_uppercase()), score)
    }

    fn vector(id: &str, score: f32) -> Document {
        Document::new(id, SourceType::Vector, format!("vector {id}"), None, score)
            .with_extra("chunk_id", format!("c-{id}"))
    }

    #[test]
    fn test_empty_inputs_give_empty_output() {
        assert!(ResultFuser::default().fuse(vec![], vec![], 5).is_empty());
    }

    #[test]
    fn test_single_document_normalizes_to_one() {
        let fused = ResultFuser::default().fuse(vec![graph("a", 0.2)], vec![], 5);
        assert_eq!(fused.len(), 1);
        assert_eq!(fused[0].final_score, Some(1.0));
    }

    #[test]
    fn test_scales_do_not_bias_merge() {
        // graph scores are tiny, vector scores large; each source's best
        // document should still score 1.0
        let fused = ResultFuser::default().fuse(
            vec![graph("g1", 0.02), graph("g2", 0.01)],
            vec![vector("v1", 90.0), vector("v2", 10.0)],
            4,
        );
        assert_eq!(fused[0].id, "g1");
        assert_eq!(fused[1].id, "v1");
        assert_eq!(fused[0].final_score, fused[1].final_score);
    }

    #[test]
    fn test_shared_document_merged_with_bonus() {
        let fused = ResultFuser::default().fuse(
            vec![graph("r1", 0.9), graph("r2", 0.1)],
            vec![vector("r1", 0.5), vector("r3", 0.8)],
            5,
        );

        let ids: Vec<&str> = fused.iter().map(|d| d.id.as_str()).collect();
        assert_eq!(ids, vec!["r1", "r3", "r2"]);

        let merged = &fused[0];
        assert_eq!(merged.metadata.search_type, SearchType::Hybrid);
        assert_eq!(merged.metadata.graph_score, Some(0.9));
        assert_eq!(merged.metadata.vector_score, Some(0.5));
        assert_eq!(merged.metadata.recipe_name.as_deref(), Some("R1"));
        assert_eq!(merged.metadata.extra.get("chunk_id").map(String::as_str), Some("c-r1"));
        assert!((merged.final_score.unwrap() - 1.1).abs() < 1e-6);
    }

    #[test]
    fn test_ties_prefer_graph_then_input_order() {
        let fused = ResultFuser::default().fuse(
            vec![graph("g1", 0.5)],
            vec![vector("v1", 0.3), vector("v2", 0.3)],
            3,
        );
        let ids: Vec<&str> = fused.iter().map(|d| d.id.as_str()).collect();
        assert_eq!(ids, vec!["g1", "v1", "v2"]);
    }

    #[test]
    fn test_duplicate_ids_within_source_keep_best() {
        let fused = ResultFuser::default().fuse(
            vec![],
            vec![vector("r1", 0.2), vector("r2", 0.5), vector("r1", 0.9)],
            5,
        );
        assert_eq!(fused.len(), 2);
        assert_eq!(fused[0].id, "r1");
        assert_eq!(fused[0].metadata.vector_score, Some(0.9));
    }

    #[test]
    fn test_weights_apply_per_source() {
        let fuser = ResultFuser {
            graph_weight: 0.5,
            vector_weight: 1.0,
            agreement_bonus: 0.1,
        };
        let fused = fuser.fuse(vec![graph("g", 1.0)], vec![vector("v", 1.0)], 2);
        assert_eq!(fused[0].id, "v");
        assert_eq!(fused[1].final_score, Some(0.5));
    }

    #[test]
    fn test_nan_scores_do_not_poison_ranking() {
        let fused = ResultFuser::default().fuse(
            vec![graph("a", f32::NAN), graph("b", 0.5)],
            vec![],
            2,
        );
        assert_eq!(fused[0].id, "b");
        assert!(fused.iter().all(|d| d.final_score.unwrap().is_finite()));
    }

    fn docs(source: SourceType) -> impl Strategy<Value = Vec<Document>> {
        prop::collection::vec((0u8..12, 0.0f32..10.0), 0..12).prop_map(move |items| {
            items
                .into_iter()
                .map(|(id, score)| Document::new(format!("r{id}"), source, "x", None, score))
                .collect()
        })
    }

    proptest! {
        #[test]
        fn prop_fuse_invariants(
            graph_docs in docs(SourceType::Graph),
            vector_docs in docs(SourceType::Vector),
            top_k in 0usize..10,
        ) {
            let fused = ResultFuser::default().fuse(graph_docs, vector_docs, top_k);

            prop_assert!(fused.len() <= top_k);
            for pair in fused.windows(2) {
                prop_assert!(pair[0].final_score >= pair[1].final_score);
            }
            let ids: HashSet<&str> = fused.iter().map(|d| d.id.as_str()).collect();
            prop_assert_eq!(ids.len(), fused.len());
        }

        #[test]
        fn prop_agreement_beats_single_source(score in 0.0f32..1.0) {
            let fuser = ResultFuser::default();
            let single = fuser.fuse(vec![graph("r", score)], vec![], 1);
            let both = fuser.fuse(vec![graph("r", score)], vec![vector("r", score)], 1);
            prop_assert!(both[0].final_score > single[0].final_score);
        }
    }
}

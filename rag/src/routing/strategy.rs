use std::time::SystemTime;

use crate::config::RouterConfig;
use crate::types::{QueryProfile, RouteDecision, Strategy};

/// Chooses a retrieval strategy from a query profile.
///
/// Relationship intensity is checked first: a query that is both relational
/// and complex goes to the graph. At the complexity boundary the tie goes to
/// the higher-recall hybrid strategy.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StrategySelector {
    pub complexity_threshold: f32,
    pub relationship_threshold: f32,
}

impl Default for StrategySelector {
    fn default() -> Self {
        Self::from_config(&RouterConfig::default())
    }
}

impl StrategySelector {
    pub fn new(complexity_threshold: f32, relationship_threshold: f32) -> Self {
        Self {
            complexity_threshold,
            relationship_threshold,
        }
    }

    pub fn from_config(config: &RouterConfig) -> Self {
        Self::new(config.complexity_threshold, config.relationship_threshold)
    }

    /// Pick a strategy and explain which signal crossed which threshold.
    pub fn select(&self, profile: &QueryProfile) -> (Strategy, String) {
        let complexity = profile.complexity;
        let relationship = profile.relationship_intensity;

        if relationship >= self.relationship_threshold {
            let mut rationale = format!(
                "relationship_intensity {relationship:.2} >= relationship threshold {:.2}: \
                 graph traversal",
                self.relationship_threshold
            );
            if complexity >= self.complexity_threshold {
                rationale.push_str(&format!(
                    " (complexity {complexity:.2} also >= {:.2}; relationship takes priority)",
                    self.complexity_threshold
                ));
            }
            return (Strategy::Graph, rationale);
        }

        if complexity >= self.complexity_threshold {
            return (
                Strategy::Hybrid,
                format!(
                    "complexity {complexity:.2} >= complexity threshold {:.2} \
                     (relationship_intensity {relationship:.2} < {:.2}): hybrid retrieval",
                    self.complexity_threshold, self.relationship_threshold
                ),
            );
        }

        (
            Strategy::Vector,
            format!(
                "complexity {complexity:.2} < {:.2} and relationship_intensity \
                 {relationship:.2} < {:.2}: vector similarity search",
                self.complexity_threshold, self.relationship_threshold
            ),
        )
    }

    /// Select a strategy and record the outcome as a [`RouteDecision`].
    pub fn decide(&self, profile: QueryProfile) -> RouteDecision {
        let (strategy, rationale) = self.select(&profile);
        RouteDecision {
            query: profile.query.clone(),
            profile,
            strategy,
            rationale,
            timestamp: SystemTime::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;
    use crate::routing::QueryAnalyzer;
    use crate::types::Strategy;

    fn profile(complexity: f32, relationship: f32) -> QueryProfile {
        QueryProfile {
            query: "q".to_string(),
            complexity,
            relationship_intensity: relationship,
            entities: vec![],
            reasoning: vec![],
        }
    }

    #[test]
    fn test_relationship_routes_to_graph() {
        let (strategy, rationale) = StrategySelector::default().select(&profile(0.1, 0.7));
        assert_eq!(strategy, Strategy::Graph);
        assert!(rationale.contains("relationship_intensity 0.70"));
        assert!(rationale.contains("relationship threshold 0.50"));
    }

    #[test]
    fn test_relationship_takes_priority_over_complexity() {
        let (strategy, rationale) = StrategySelector::default().select(&profile(0.9, 0.9));
        assert_eq!(strategy, Strategy::Graph);
        assert!(rationale.contains("relationship takes priority"));
    }

    #[test]
    fn test_complexity_routes_to_hybrid() {
        let (strategy, rationale) = StrategySelector::default().select(&profile(0.6, 0.1));
        assert_eq!(strategy, Strategy::Hybrid);
        assert!(rationale.contains("complexity threshold"));
    }

    #[test]
    fn test_boundary_ties_go_to_higher_recall() {
        let selector = StrategySelector::new(0.5, 0.5);
        assert_eq!(selector.select(&profile(0.5, 0.0)).0, Strategy::Hybrid);
        assert_eq!(selector.select(&profile(0.0, 0.5)).0, Strategy::Graph);
    }

    #[test]
    fn test_low_signals_route_to_vector() {
        let (strategy, rationale) = StrategySelector::default().select(&profile(0.2, 0.1));
        assert_eq!(strategy, Strategy::Vector);
        assert!(rationale.contains("vector similarity"));
    }

    #[test]
    fn test_decide_records_profile_and_rationale() {
        let decision = StrategySelector::default().decide(profile(0.6, 0.1));
        assert_eq!(decision.strategy, Strategy::Hybrid);
        assert_eq!(decision.query, "q");
        assert!(decision.explain().contains("Strategy: hybrid"));
    }

    #[test]
    fn test_scenario_relational_query() {
        let analyzer = QueryAnalyzer::default();
        let profile = analyzer.analyze("What pairs well with chicken?");
        assert_eq!(StrategySelector::default().select(&profile).0, Strategy::Graph);
    }

    #[test]
    fn test_scenario_simple_query() {
        let analyzer = QueryAnalyzer::default();
        let profile = analyzer.analyze("What is garlic?");
        assert_eq!(StrategySelector::default().select(&profile).0, Strategy::Vector);
    }

    #[test]
    fn test_scenario_complex_query() {
        let analyzer = QueryAnalyzer::default();
        let profile = analyzer.analyze("Compare the nutritional tradeoffs of three stir-fry methods");
        assert_eq!(StrategySelector::default().select(&profile).0, Strategy::Hybrid);
    }

    proptest! {
        #[test]
        fn prop_select_is_deterministic(
            complexity in 0.0f32..=1.0,
            relationship in 0.0f32..=1.0,
            ct in 0.0f32..=1.0,
            rt in 0.0f32..=1.0,
        ) {
            let selector = StrategySelector::new(ct, rt);
            let p = profile(complexity, relationship);
            prop_assert_eq!(selector.select(&p), selector.select(&p));
        }

        #[test]
        fn prop_select_follows_decision_table(
            complexity in 0.0f32..=1.0,
            relationship in 0.0f32..=1.0,
        ) {
            let selector = StrategySelector::default();
            let (strategy, _) = selector.select(&profile(complexity, relationship));
            let expected = if relationship >= 0.5 {
                Strategy::Graph
            } else if complexity >= 0.5 {
                Strategy::Hybrid
            } else {
                Strategy::Vector
            };
            prop_assert_eq!(strategy, expected);
        }
    }
}

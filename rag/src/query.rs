//! Request pipeline.
//!
//! [`RecipeRag`] is the application context built once at startup. Each
//! request borrows it: analyze, select a strategy, retrieve from one or both
//! sources, fuse, then optionally stream an answer. Only the route counters
//! are shared between requests.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;

use crate::config::RouterConfig;
use crate::embeddings::EmbeddingProvider;
use crate::error::{RagError, RetrievalFault, ServiceError, SourceFailure};
use crate::generation::{AdaptiveGenerator, AnswerStream, GenerationService};
use crate::retrieval::{GraphRetriever, ResultFuser, VectorRetriever};
use crate::routing::{QueryAnalyzer, StrategySelector};
use crate::stats::RouteStatistics;
use crate::store::{GraphStore, VectorIndex};
use crate::types::{Document, EvidenceRef, RouteDecision, RouteStatsSnapshot, SourceType, Strategy};

/// External collaborators the pipeline reads from.
pub struct Services {
    pub graph: Arc<dyn GraphStore>,
    pub index: Arc<dyn VectorIndex>,
    pub embedder: Arc<dyn EmbeddingProvider>,
    pub llm: Arc<dyn GenerationService>,
}

/// Evidence for a query together with how it was routed.
#[derive(Debug, Clone, Serialize)]
pub struct RoutedQuery {
    pub evidence: Vec<Document>,
    pub decision: RouteDecision,
}

/// A fully collected answer.
#[derive(Debug, Clone, Serialize)]
pub struct Answer {
    pub text: String,
    pub decision: RouteDecision,
    pub evidence: Vec<EvidenceRef>,
}

/// Adaptive retrieval and generation over the recipe knowledge base.
pub struct RecipeRag {
    config: RouterConfig,
    analyzer: QueryAnalyzer,
    selector: StrategySelector,
    graph_store: Arc<dyn GraphStore>,
    graph: GraphRetriever,
    vector: VectorRetriever,
    fuser: ResultFuser,
    generator: AdaptiveGenerator,
    stats: RouteStatistics,
}

impl RecipeRag {
    pub fn new(config: RouterConfig, services: Services) -> Result<Self, RagError> {
        config.validate()?;
        Ok(Self {
            analyzer: QueryAnalyzer::default(),
            selector: StrategySelector::from_config(&config),
            graph: GraphRetriever::new(Arc::clone(&services.graph), &config),
            vector: VectorRetriever::new(services.embedder, services.index, &config),
            fuser: ResultFuser::from_config(&config),
            generator: AdaptiveGenerator::new(services.llm, &config),
            graph_store: services.graph,
            stats: RouteStatistics::new(),
            config,
        })
    }

    pub fn config(&self) -> &RouterConfig {
        &self.config
    }

    /// Teach the analyzer every recipe, ingredient and category name in the
    /// graph. Returns the resulting lexicon size.
    pub async fn refresh_lexicon(&mut self) -> Result<usize, RagError> {
        let names = self.graph_store.entity_names().await?;
        log::debug!("Loaded {} entity name(s) from the graph", names.len());
        self.analyzer.extend_lexicon(names);
        Ok(self.analyzer.lexicon_size())
    }

    /// Analyze and route a query without touching any store.
    pub fn plan(&self, query: &str) -> RouteDecision {
        self.selector.decide(self.analyzer.analyze(query))
    }

    /// Route a query and return the fused evidence.
    ///
    /// A hybrid query survives one failed source; the rationale records it.
    /// Zero evidence is a successful, empty result.
    pub async fn route_query(&self, query: &str, top_k: usize) -> Result<RoutedQuery, RagError> {
        let decision = self.begin(query);
        self.retrieve(decision, top_k).await
    }

    /// [`route_query`](Self::route_query) bounded by `deadline`. When it
    /// elapses, in-flight retrieval is dropped and every source the strategy
    /// used is reported as timed out.
    pub async fn route_query_with_deadline(
        &self,
        query: &str,
        top_k: usize,
        deadline: Duration,
    ) -> Result<RoutedQuery, RagError> {
        let decision = self.begin(query);
        let strategy = decision.strategy;

        match tokio::time::timeout(deadline, self.retrieve(decision, top_k)).await {
            Ok(result) => result,
            Err(_) => {
                let message = format!("request deadline of {}ms elapsed", deadline.as_millis());
                let failures = sources(strategy)
                    .map(|source| SourceFailure {
                        source,
                        cause: ServiceError::timeout(service_name(source), message.clone()),
                    })
                    .collect();
                log::warn!("Retrieval for {strategy} strategy cut off: {message}");
                Err(RetrievalFault { strategy, failures }.into())
            }
        }
    }

    /// Stream an answer grounded in `evidence`.
    pub fn generate_answer_stream(&self, query: &str, evidence: &[Document]) -> AnswerStream {
        self.generator.generate(query, evidence)
    }

    /// Route, generate and collect the whole answer.
    pub async fn ask(&self, query: &str, top_k: usize) -> Result<Answer, RagError> {
        let routed = self.route_query(query, top_k).await?;
        let text = self
            .generate_answer_stream(query, &routed.evidence)
            .collect_text()
            .await?;

        Ok(Answer {
            text,
            evidence: routed.evidence.iter().map(Document::summary).collect(),
            decision: routed.decision,
        })
    }

    pub fn route_statistics(&self) -> RouteStatsSnapshot {
        self.stats.snapshot()
    }

    /// Analyze, select and count the decision before any retrieval starts,
    /// so failed requests still show up in the statistics.
    fn begin(&self, query: &str) -> RouteDecision {
        let decision = self.plan(query);
        self.stats.record(&decision);
        decision
    }

    async fn retrieve(
        &self,
        mut decision: RouteDecision,
        top_k: usize,
    ) -> Result<RoutedQuery, RagError> {
        let strategy = decision.strategy;
        let profile = &decision.profile;

        let graph = async {
            if strategy.uses_graph() {
                Some(self.graph.retrieve(profile, top_k).await)
            } else {
                None
            }
        };
        let vector = async {
            if strategy.uses_vector() {
                Some(self.vector.retrieve(&profile.query, top_k).await)
            } else {
                None
            }
        };
        let (graph, vector) = tokio::join!(graph, vector);

        let mut failures = Vec::new();
        let graph_docs = settle(SourceType::Graph, graph, &mut failures);
        let vector_docs = settle(SourceType::Vector, vector, &mut failures);

        if failures.len() == sources(strategy).count() {
            log::warn!("Every source failed for {strategy} strategy");
            return Err(RetrievalFault { strategy, failures }.into());
        }
        for failure in &failures {
            log::warn!("Continuing without {failure}");
            decision.rationale.push_str(&format!(
                "; partial failure, continuing without {failure}"
            ));
        }

        let evidence = self.fuser.fuse(graph_docs, vector_docs, top_k);
        log::info!(
            "Routed query via {} (complexity {:.2}, relationship {:.2}): {} document(s)",
            strategy,
            decision.profile.complexity,
            decision.profile.relationship_intensity,
            evidence.len()
        );

        Ok(RoutedQuery { evidence, decision })
    }
}

/// Unpack one source's outcome, moving a failure into `failures`.
fn settle(
    source: SourceType,
    outcome: Option<Result<Vec<Document>, ServiceError>>,
    failures: &mut Vec<SourceFailure>,
) -> Vec<Document> {
    match outcome {
        Some(Ok(docs)) => docs,
        Some(Err(cause)) => {
            failures.push(SourceFailure { source, cause });
            Vec::new()
        }
        None => Vec::new(),
    }
}

fn sources(strategy: Strategy) -> impl Iterator<Item = SourceType> {
    [
        strategy.uses_graph().then_some(SourceType::Graph),
        strategy.uses_vector().then_some(SourceType::Vector),
    ]
    .into_iter()
    .flatten()
}

fn service_name(source: SourceType) -> &'static str {
    match source {
        SourceType::Graph => "graph",
        SourceType::Vector => "vector",
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;

    use super::*;
    use crate::generation::tests::FakeLlm;
    use crate::retrieval::vector::tests::{CannedIndex, FixedEmbedder, hit};
    use crate::store::GraphPattern;
    use crate::store::memory::tests::sample_graph;
    use crate::types::{RecipeRow, SearchType, VectorHit};

    const RELATIONAL: &str = "What pairs well with chicken?";
    const SIMPLE: &str = "What is garlic?";
    const COMPLEX: &str = "Compare the nutritional tradeoffs of three stir-fry methods";

    /// Sample graph that counts queries, or hangs forever when `hang` is set.
    /// `delay` slows down the first query only.
    struct TestGraph {
        hang: bool,
        delay: Option<Duration>,
        calls: AtomicUsize,
    }

    impl TestGraph {
        fn working() -> Self {
            Self {
                hang: false,
                delay: None,
                calls: AtomicUsize::new(0),
            }
        }

        fn hanging() -> Self {
            Self {
                hang: true,
                ..Self::working()
            }
        }

        fn slow(delay: Duration) -> Self {
            Self {
                delay: Some(delay),
                ..Self::working()
            }
        }
    }

    /// Canned hits returned after a fixed delay.
    struct SlowIndex {
        delay: Duration,
        inner: CannedIndex,
    }

    #[async_trait]
    impl VectorIndex for SlowIndex {
        async fn search(
            &self,
            embedding: &[f32],
            top_k: usize,
        ) -> Result<Vec<VectorHit>, ServiceError> {
            tokio::time::sleep(self.delay).await;
            self.inner.search(embedding, top_k).await
        }
    }

    #[async_trait]
    impl GraphStore for TestGraph {
        async fn query(&self, pattern: &GraphPattern) -> Result<Vec<RecipeRow>, ServiceError> {
            let previous = self.calls.fetch_add(1, Ordering::SeqCst);
            if let (Some(delay), 0) = (self.delay, previous) {
                tokio::time::sleep(delay).await;
            }
            if self.hang {
                std::future::pending::<()>().await;
            }
            sample_graph().query(pattern).await
        }

        async fn entity_names(&self) -> Result<Vec<String>, ServiceError> {
            sample_graph().entity_names().await
        }
    }

    struct Harness {
        rag: RecipeRag,
        graph: Arc<TestGraph>,
        index: Arc<CannedIndex>,
        llm: Arc<FakeLlm>,
    }

    fn test_config() -> RouterConfig {
        let mut config = RouterConfig::default();
        config.retry.base_delay_ms = 1;
        config.graph_pool.request_timeout_ms = 20;
        config
    }

    fn harness_with(
        config: RouterConfig,
        graph: TestGraph,
        embed_fail: Option<ServiceError>,
        hits: Vec<VectorHit>,
        llm: FakeLlm,
    ) -> Harness {
        let graph = Arc::new(graph);
        let index = Arc::new(CannedIndex {
            hits,
            calls: AtomicUsize::new(0),
        });
        let llm = Arc::new(llm);
        let rag = RecipeRag::new(
            config,
            Services {
                graph: graph.clone(),
                index: index.clone(),
                embedder: Arc::new(FixedEmbedder { fail: embed_fail }),
                llm: llm.clone(),
            },
        )
        .unwrap();
        Harness {
            rag,
            graph,
            index,
            llm,
        }
    }

    fn harness(graph: TestGraph) -> Harness {
        harness_with(
            test_config(),
            graph,
            None,
            vec![hit("c1", Some("r1"), 0.9), hit("c9", Some("r9"), 0.5)],
            FakeLlm::new(&["Stir ", "fry."]),
        )
    }

    #[test]
    fn test_invalid_config_rejected() {
        let config = RouterConfig {
            top_k: 0,
            ..Default::default()
        };
        let result = RecipeRag::new(
            config,
            Services {
                graph: Arc::new(TestGraph::working()),
                index: Arc::new(CannedIndex {
                    hits: vec![],
                    calls: AtomicUsize::new(0),
                }),
                embedder: Arc::new(FixedEmbedder { fail: None }),
                llm: Arc::new(FakeLlm::new(&[])),
            },
        );
        assert!(matches!(result, Err(RagError::Config(_))));
    }

    #[tokio::test]
    async fn test_relational_query_uses_graph_only() {
        let h = harness(TestGraph::working());
        let routed = h.rag.route_query(RELATIONAL, 5).await.unwrap();

        assert_eq!(routed.decision.strategy, Strategy::Graph);
        assert!(h.graph.calls.load(Ordering::SeqCst) >= 1);
        assert_eq!(h.index.calls.load(Ordering::SeqCst), 0);

        let ids: Vec<&str> = routed.evidence.iter().map(|d| d.id.as_str()).collect();
        assert!(ids.contains(&"r1"));
        assert!(ids.contains(&"r2"));
        assert!(!ids.contains(&"r3"));
        assert!(routed.evidence.iter().all(|d| d.final_score.is_some()));
    }

    #[tokio::test]
    async fn test_simple_query_uses_vector_only() {
        let h = harness(TestGraph::working());
        let routed = h.rag.route_query(SIMPLE, 5).await.unwrap();

        assert_eq!(routed.decision.strategy, Strategy::Vector);
        assert_eq!(h.graph.calls.load(Ordering::SeqCst), 0);
        assert_eq!(h.index.calls.load(Ordering::SeqCst), 1);
        assert_eq!(routed.evidence[0].id, "r1");
        assert_eq!(routed.evidence[0].metadata.search_type, SearchType::Vector);
    }

    #[tokio::test]
    async fn test_complex_query_invokes_both_retrievers() {
        let h = harness(TestGraph::working());
        let routed = h.rag.route_query(COMPLEX, 5).await.unwrap();

        assert_eq!(routed.decision.strategy, Strategy::Hybrid);
        assert!(h.graph.calls.load(Ordering::SeqCst) >= 1);
        assert_eq!(h.index.calls.load(Ordering::SeqCst), 1);
        assert!(!routed.evidence.is_empty());
        assert!(!routed.decision.rationale.contains("partial failure"));
    }

    #[tokio::test]
    async fn test_hybrid_retrievers_run_concurrently() {
        let delay = Duration::from_millis(100);
        let mut config = test_config();
        config.graph_pool.request_timeout_ms = 5_000;
        let graph = Arc::new(TestGraph::slow(delay));
        let rag = RecipeRag::new(
            config,
            Services {
                graph: graph.clone(),
                index: Arc::new(SlowIndex {
                    delay,
                    inner: CannedIndex {
                        hits: vec![hit("c1", Some("r1"), 0.9)],
                        calls: AtomicUsize::new(0),
                    },
                }),
                embedder: Arc::new(FixedEmbedder { fail: None }),
                llm: Arc::new(FakeLlm::new(&[])),
            },
        )
        .unwrap();

        let started = std::time::Instant::now();
        let routed = rag.route_query(COMPLEX, 5).await.unwrap();
        let elapsed = started.elapsed();

        assert_eq!(routed.decision.strategy, Strategy::Hybrid);
        assert!(graph.calls.load(Ordering::SeqCst) >= 1);
        assert!(
            elapsed < Duration::from_millis(180),
            "hybrid retrieval took {elapsed:?}"
        );
    }

    #[tokio::test]
    async fn test_partial_hybrid_failure_keeps_vector_evidence() {
        let h = harness(TestGraph::hanging());
        let routed = h.rag.route_query(COMPLEX, 5).await.unwrap();

        assert_eq!(routed.decision.strategy, Strategy::Hybrid);
        let ids: Vec<&str> = routed.evidence.iter().map(|d| d.id.as_str()).collect();
        assert_eq!(ids, vec!["r1", "r9"]);
        assert!(routed.evidence.iter().all(|d| d.source_type == SourceType::Vector));
        assert!(routed.decision.rationale.contains("partial failure"));
        assert!(routed.decision.rationale.contains("graph source"));
        // first attempt plus two retries, each cut off by the request timeout
        assert_eq!(h.graph.calls.load(Ordering::SeqCst), 3);
        assert_eq!(h.rag.route_statistics().hybrid, 1);
    }

    #[tokio::test]
    async fn test_both_sources_failing_is_a_retrieval_fault() {
        let h = harness_with(
            test_config(),
            TestGraph::hanging(),
            Some(ServiceError::rejected("embedding", "model not found")),
            vec![],
            FakeLlm::new(&[]),
        );
        let err = h.rag.route_query(COMPLEX, 5).await.unwrap_err();

        let RagError::Retrieval(fault) = err else {
            panic!("expected a retrieval fault");
        };
        assert_eq!(fault.strategy, Strategy::Hybrid);
        let sources: Vec<SourceType> = fault.failures.iter().map(|f| f.source).collect();
        assert_eq!(sources, vec![SourceType::Graph, SourceType::Vector]);
        assert!(matches!(fault.failures[0].cause, ServiceError::Timeout { .. }));
        assert!(matches!(fault.failures[1].cause, ServiceError::Rejected { .. }));

        let stats = h.rag.route_statistics();
        assert_eq!(stats.total, 1);
        assert_eq!(stats.hybrid, 1);
    }

    #[tokio::test]
    async fn test_single_source_failure_is_a_retrieval_fault() {
        let h = harness(TestGraph::hanging());
        let err = h.rag.route_query(RELATIONAL, 5).await.unwrap_err();

        let RagError::Retrieval(fault) = err else {
            panic!("expected a retrieval fault");
        };
        assert_eq!(fault.strategy, Strategy::Graph);
        assert_eq!(fault.failures.len(), 1);
        assert_eq!(h.rag.route_statistics().graph, 1);
    }

    #[tokio::test]
    async fn test_deadline_cancels_retrieval() {
        let mut config = test_config();
        config.graph_pool.request_timeout_ms = 60_000;
        let h = harness_with(
            config,
            TestGraph::hanging(),
            None,
            vec![hit("c1", Some("r1"), 0.9)],
            FakeLlm::new(&[]),
        );

        let err = h
            .rag
            .route_query_with_deadline(COMPLEX, 5, Duration::from_millis(50))
            .await
            .unwrap_err();

        let RagError::Retrieval(fault) = err else {
            panic!("expected a retrieval fault");
        };
        assert_eq!(fault.failures.len(), 2);
        assert!(
            fault
                .failures
                .iter()
                .all(|f| matches!(f.cause, ServiceError::Timeout { .. }))
        );
        assert_eq!(h.graph.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_deadline_not_reached_returns_evidence() {
        let h = harness(TestGraph::working());
        let routed = h
            .rag
            .route_query_with_deadline(SIMPLE, 5, Duration::from_secs(5))
            .await
            .unwrap();
        assert_eq!(routed.evidence.len(), 2);
    }

    #[tokio::test]
    async fn test_no_evidence_is_not_an_error() {
        let h = harness_with(
            test_config(),
            TestGraph::working(),
            None,
            vec![],
            FakeLlm::new(&[]),
        );
        let routed = h.rag.route_query(SIMPLE, 5).await.unwrap();
        assert!(routed.evidence.is_empty());
    }

    #[tokio::test]
    async fn test_ask_collects_answer_with_evidence() {
        let h = harness(TestGraph::working());
        let answer = h.rag.ask(RELATIONAL, 3).await.unwrap();

        assert_eq!(answer.text, "Stir fry.");
        assert_eq!(answer.decision.strategy, Strategy::Graph);
        assert!(answer.evidence.iter().any(|e| e.name == "Kung Pao Chicken"));

        let prompts = h.llm.prompts.lock().unwrap();
        assert_eq!(prompts.len(), 1);
        assert!(prompts[0].user.contains("Kung Pao Chicken"));
    }

    #[tokio::test]
    async fn test_ask_surfaces_generation_fault() {
        let mut llm = FakeLlm::new(&[]);
        llm.refuse = Some(ServiceError::rejected("llm", "invalid api key"));
        let h = harness_with(
            test_config(),
            TestGraph::working(),
            None,
            vec![hit("c1", Some("r1"), 0.9)],
            llm,
        );

        let err = h.rag.ask(SIMPLE, 3).await.unwrap_err();
        assert!(matches!(err, RagError::Generation(_)));
    }

    #[tokio::test]
    async fn test_refresh_lexicon_recognizes_recipe_names() {
        let mut h = harness(TestGraph::working());
        assert_eq!(h.rag.plan("How do I cook mapo tofu?").profile.entities, vec!["tofu"]);

        let size = h.rag.refresh_lexicon().await.unwrap();
        assert!(size > 0);
        assert_eq!(
            h.rag.plan("How do I cook mapo tofu?").profile.entities,
            vec!["mapo tofu"]
        );
    }

    #[tokio::test]
    async fn test_plan_does_not_count() {
        let h = harness(TestGraph::working());
        let decision = h.rag.plan(RELATIONAL);
        assert_eq!(decision.strategy, Strategy::Graph);
        assert_eq!(h.rag.route_statistics().total, 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_requests_are_counted() {
        let h = harness(TestGraph::working());
        let rag = Arc::new(h.rag);
        let queries = [RELATIONAL, SIMPLE, COMPLEX];

        let handles: Vec<_> = (0..30)
            .map(|i| {
                let rag = Arc::clone(&rag);
                tokio::spawn(async move { rag.route_query(queries[i % 3], 3).await })
            })
            .collect();
        for handle in handles {
            assert!(handle.await.unwrap().is_ok());
        }

        let stats = rag.route_statistics();
        assert_eq!(stats.total, 30);
        assert_eq!(stats.graph, 10);
        assert_eq!(stats.vector, 10);
        assert_eq!(stats.hybrid, 10);
    }
}

//! Process-wide routing counters.

use std::sync::Mutex;

use crate::types::{RouteDecision, RouteStatsSnapshot, Strategy};

/// Counts routing decisions per strategy.
///
/// All counters live behind one lock so a snapshot never observes `total`
/// out of step with the per-strategy counts.
#[derive(Debug, Default)]
pub struct RouteStatistics {
    counts: Mutex<RouteStatsSnapshot>,
}

impl RouteStatistics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one completed routing decision.
    pub fn record(&self, decision: &RouteDecision) {
        self.record_strategy(decision.strategy);
    }

    pub(crate) fn record_strategy(&self, strategy: Strategy) {
        let mut counts = self.counts.lock().unwrap_or_else(|e| e.into_inner());
        counts.total += 1;
        match strategy {
            Strategy::Graph => counts.graph += 1,
            Strategy::Vector => counts.vector += 1,
            Strategy::Hybrid => counts.hybrid += 1,
        }
    }

    /// Consistent copy of the current counters.
    pub fn snapshot(&self) -> RouteStatsSnapshot {
        self.counts
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;

    #[test]
    fn test_starts_empty() {
        let stats = RouteStatistics::new();
        assert_eq!(stats.snapshot(), RouteStatsSnapshot::default());
    }

    #[test]
    fn test_record_increments_matching_counter() {
        let stats = RouteStatistics::new();
        stats.record_strategy(Strategy::Graph);
        stats.record_strategy(Strategy::Hybrid);
        stats.record_strategy(Strategy::Hybrid);

        let snap = stats.snapshot();
        assert_eq!(snap.total, 3);
        assert_eq!(snap.graph, 1);
        assert_eq!(snap.vector, 0);
        assert_eq!(snap.hybrid, 2);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_records_sum_to_total() {
        let stats = Arc::new(RouteStatistics::new());
        let n = 300;

        let handles: Vec<_> = (0..n)
            .map(|i| {
                let stats = Arc::clone(&stats);
                tokio::spawn(async move {
                    stats.record_strategy(Strategy::ALL[i % 3]);
                })
            })
            .collect();
        for handle in handles {
            handle.await.unwrap();
        }

        let snap = stats.snapshot();
        assert_eq!(snap.total, n as u64);
        assert_eq!(snap.graph + snap.vector + snap.hybrid, snap.total);
        assert_eq!(snap.count(Strategy::Graph), 100);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_snapshot_is_consistent_under_writes() {
        let stats = Arc::new(RouteStatistics::new());
        let writer = {
            let stats = Arc::clone(&stats);
            tokio::spawn(async move {
                for i in 0..2_000 {
                    stats.record_strategy(Strategy::ALL[i % 3]);
                }
            })
        };

        for _ in 0..200 {
            let snap = stats.snapshot();
            assert_eq!(snap.graph + snap.vector + snap.hybrid, snap.total);
            tokio::task::yield_now().await;
        }
        writer.await.unwrap();
    }
}

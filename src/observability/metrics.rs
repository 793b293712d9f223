//! Pipeline Metrics
//!
//! Track workflow outcomes, generation tiers and cache effectiveness.
//! Shared across invocations, so everything is lock-free.

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};

/// Pipeline metrics tracker
#[derive(Debug, Default)]
pub struct PipelineMetrics {
    workflows_started: AtomicU64,
    workflows_succeeded: AtomicU64,
    cache_lookups: DashMap<String, CacheCounts>,
    narration_reused: AtomicU64,
    total_duration_ms: AtomicU64,
    failures_by_stage: DashMap<String, u64>,
    generation_methods: DashMap<String, u64>,
}

/// Hit and miss counts for one named cache
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct CacheCounts {
    pub hits: u64,
    pub misses: u64,
}

/// Point-in-time copy of the counters
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct MetricsSnapshot {
    pub workflows_started: u64,
    pub workflows_succeeded: u64,
    pub workflows_failed: u64,
    pub cache_hits: u64,
    pub cache_misses: u64,
    /// Per cache, keyed by cache name (`schema`, `query_result`)
    pub caches: BTreeMap<String, CacheCounts>,
    pub narration_reused: u64,
    pub avg_duration_ms: f64,
    pub failures_by_stage: BTreeMap<String, u64>,
    pub generation_methods: BTreeMap<String, u64>,
}

impl PipelineMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_started(&self) {
        self.workflows_started.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_success(&self, duration_ms: u64) {
        self.workflows_succeeded.fetch_add(1, Ordering::Relaxed);
        self.total_duration_ms.fetch_add(duration_ms, Ordering::Relaxed);
    }

    pub fn record_failure(&self, stage: &str, duration_ms: u64) {
        *self.failures_by_stage.entry(stage.to_string()).or_insert(0) += 1;
        self.total_duration_ms.fetch_add(duration_ms, Ordering::Relaxed);
    }

    pub fn record_generation_method(&self, method: &str) {
        *self.generation_methods.entry(method.to_string()).or_insert(0) += 1;
    }

    pub fn record_cache(&self, cache: &str, hit: bool) {
        let mut counts = self.cache_lookups.entry(cache.to_string()).or_default();
        if hit {
            counts.hits += 1;
        } else {
            counts.misses += 1;
        }
    }

    pub fn record_narration_reuse(&self) {
        self.narration_reused.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        let failures_by_stage: BTreeMap<String, u64> = self
            .failures_by_stage
            .iter()
            .map(|entry| (entry.key().clone(), *entry.value()))
            .collect();
        let workflows_succeeded = self.workflows_succeeded.load(Ordering::Relaxed);
        let workflows_failed: u64 = failures_by_stage.values().sum();
        let finished = workflows_succeeded + workflows_failed;
        let avg_duration_ms = if finished == 0 {
            0.0
        } else {
            self.total_duration_ms.load(Ordering::Relaxed) as f64 / finished as f64
        };

        let caches: BTreeMap<String, CacheCounts> = self
            .cache_lookups
            .iter()
            .map(|entry| (entry.key().clone(), *entry.value()))
            .collect();

        MetricsSnapshot {
            workflows_started: self.workflows_started.load(Ordering::Relaxed),
            workflows_succeeded,
            workflows_failed,
            cache_hits: caches.values().map(|c| c.hits).sum(),
            cache_misses: caches.values().map(|c| c.misses).sum(),
            caches,
            narration_reused: self.narration_reused.load(Ordering::Relaxed),
            avg_duration_ms,
            failures_by_stage,
            generation_methods: self
                .generation_methods
                .iter()
                .map(|entry| (entry.key().clone(), *entry.value()))
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshot_counts() {
        let metrics = PipelineMetrics::new();
        metrics.record_started();
        metrics.record_started();
        metrics.record_success(30);
        metrics.record_failure("query_execution", 10);
        metrics.record_generation_method("heuristic");
        metrics.record_cache("schema", true);
        metrics.record_cache("query_result", false);

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.workflows_started, 2);
        assert_eq!(snapshot.workflows_failed, 1);
        assert_eq!(snapshot.failures_by_stage.get("query_execution"), Some(&1));
        assert_eq!(snapshot.generation_methods.get("heuristic"), Some(&1));
        assert_eq!(snapshot.cache_hits, 1);
        assert_eq!(snapshot.cache_misses, 1);
        assert_eq!(snapshot.caches["schema"], CacheCounts { hits: 1, misses: 0 });
        assert_eq!(snapshot.caches["query_result"], CacheCounts { hits: 0, misses: 1 });
        assert!((snapshot.avg_duration_ms - 20.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_empty_snapshot() {
        assert_eq!(PipelineMetrics::new().snapshot(), MetricsSnapshot::default());
    }
}

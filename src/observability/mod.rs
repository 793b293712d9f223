//! Observability Module - Pipeline counters

pub mod metrics;

pub use metrics::{CacheCounts, MetricsSnapshot, PipelineMetrics};

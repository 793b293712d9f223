//! Query Execution Adapter - Cache-aware front for the query executor
//!
//! Never fails: executor errors come back as an unsuccessful `QueryResult`
//! so the orchestrator can classify them.

use crate::cache::{query_fingerprint, PipelineCaches};
use crate::error::PipelineError;
use crate::execution::engine::{DataSource, ExecutionOptions, QueryExecutor};
use crate::execution::profile::QueryProfile;
use crate::execution::result::{DataShape, QueryResult, TransformationMetadata};
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

const OPERATION: &str = "query_execution";
pub const CACHE_ENGINE: &str = "cache";

pub struct QueryExecutionAdapter {
    executor: Arc<dyn QueryExecutor>,
    caches: Arc<PipelineCaches>,
    row_limit: Option<usize>,
    result_ttl: Option<Duration>,
}

impl QueryExecutionAdapter {
    pub fn new(executor: Arc<dyn QueryExecutor>, caches: Arc<PipelineCaches>) -> Self {
        Self {
            executor,
            caches,
            row_limit: None,
            result_ttl: None,
        }
    }

    pub fn with_row_limit(mut self, row_limit: Option<usize>) -> Self {
        self.row_limit = row_limit;
        self
    }

    /// Override the query-result cache's default TTL for results written here
    pub fn with_result_ttl(mut self, ttl: Duration) -> Self {
        self.result_ttl = Some(ttl);
        self
    }

    pub async fn execute(
        &self,
        sql: &str,
        data_source: &DataSource,
    ) -> (QueryResult, TransformationMetadata) {
        let started = Instant::now();
        let fingerprint = query_fingerprint(&data_source.id, sql);

        if let Some(mut cached) = self.caches.query_results.get(&fingerprint) {
            debug!("Query result cache hit for {}", data_source.id);
            let original_engine = std::mem::replace(&mut cached.engine, CACHE_ENGINE.to_string());
            cached.cached = true;
            let mut metadata =
                self.success_metadata(&cached, &fingerprint, data_source, elapsed_ms(started));
            metadata
                .metadata
                .insert("original_engine".to_string(), json!(original_engine));
            metadata.transformations_applied = vec!["cache_lookup".to_string()];
            return (cached, metadata);
        }

        let profile = QueryProfile::from_sql(sql);
        if !profile.is_read_only {
            warn!("Refusing to execute non read-only statement on {}", data_source.id);
            return self.failure(
                "permission denied: only read-only statements can be executed".to_string(),
                started,
            );
        }

        let options = ExecutionOptions {
            profile,
            row_limit: self.row_limit,
        };

        match self.executor.execute_query(sql, data_source, &options).await {
            Ok(response) => {
                let result = QueryResult::success(response.data, response.engine);
                let metadata =
                    self.success_metadata(&result, &fingerprint, data_source, elapsed_ms(started));
                info!(
                    "Query executed on {} via {}: {} rows in {}ms",
                    data_source.id, result.engine, result.row_count, metadata.execution_time_ms
                );

                match self.result_ttl {
                    Some(ttl) => self
                        .caches
                        .query_results
                        .set_with_ttl(fingerprint, result.clone(), ttl),
                    None => self.caches.query_results.set(fingerprint, result.clone()),
                }
                (result, metadata)
            }
            Err(PipelineError::Execution { message, .. }) => self.failure(message, started),
            Err(e) => self.failure(e.to_string(), started),
        }
    }

    fn failure(&self, message: String, started: Instant) -> (QueryResult, TransformationMetadata) {
        warn!("Query execution failed: {}", message);
        (
            QueryResult::error("none", message),
            TransformationMetadata::empty(OPERATION, "none", elapsed_ms(started)),
        )
    }

    fn success_metadata(
        &self,
        result: &QueryResult,
        fingerprint: &str,
        data_source: &DataSource,
        execution_time_ms: u64,
    ) -> TransformationMetadata {
        let mut metadata = HashMap::new();
        metadata.insert("fingerprint".to_string(), json!(fingerprint));
        metadata.insert("data_source_id".to_string(), json!(data_source.id));
        if let Some(limit) = self.row_limit {
            metadata.insert("row_limit".to_string(), json!(limit));
        }

        TransformationMetadata {
            operation: OPERATION.to_string(),
            input_shape: DataShape::default(),
            output_shape: result.shape(),
            execution_time_ms,
            engine_used: result.engine.clone(),
            rows_processed: result.row_count,
            columns_processed: result.columns.len(),
            transformations_applied: vec!["sql_execution".to_string()],
            metadata,
        }
    }
}

fn elapsed_ms(started: Instant) -> u64 {
    started.elapsed().as_millis() as u64
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Result;
    use crate::execution::engine::EngineResponse;
    use async_trait::async_trait;
    use serde_json::Value;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingExecutor {
        calls: AtomicUsize,
        outcome: std::result::Result<Value, String>,
    }

    #[async_trait]
    impl QueryExecutor for CountingExecutor {
        async fn execute_query(
            &self,
            _sql: &str,
            _data_source: &DataSource,
            _options: &ExecutionOptions,
        ) -> Result<EngineResponse> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match &self.outcome {
                Ok(rows) => Ok(EngineResponse {
                    data: rows
                        .as_array()
                        .unwrap()
                        .iter()
                        .map(|r| r.as_object().cloned().unwrap())
                        .collect(),
                    engine: "duckdb".to_string(),
                }),
                Err(message) => Err(PipelineError::execution(message.clone())),
            }
        }
    }

    fn adapter(outcome: std::result::Result<Value, String>) -> (QueryExecutionAdapter, Arc<CountingExecutor>) {
        let executor = Arc::new(CountingExecutor {
            calls: AtomicUsize::new(0),
            outcome,
        });
        let adapter = QueryExecutionAdapter::new(executor.clone(), Arc::new(PipelineCaches::default()));
        (adapter, executor)
    }

    #[tokio::test]
    async fn test_second_execution_hits_cache() {
        let (adapter, executor) = adapter(Ok(json!([{"status": "A", "amount": 10}])));
        let source = DataSource::new("sales");

        let (first, meta) = adapter.execute("SELECT status, amount FROM orders", &source).await;
        assert!(first.success);
        assert_eq!(meta.engine_used, "duckdb");
        assert_eq!(meta.rows_processed, 1);
        assert_eq!(meta.columns_processed, 2);

        let (second, meta) = adapter.execute("select status, amount  from orders", &source).await;
        assert!(second.cached);
        assert_eq!(meta.engine_used, "cache");
        assert_eq!(second.data, first.data);
        assert_eq!(executor.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_failure_is_returned_not_raised() {
        let (adapter, _) = adapter(Err("syntax error at or near \"FORM\"".to_string()));
        let (result, meta) = adapter.execute("SELECT * FORM orders", &DataSource::new("sales")).await;
        assert!(!result.success);
        assert_eq!(result.error.as_deref(), Some("syntax error at or near \"FORM\""));
        assert_eq!(meta.rows_processed, 0);
        assert_eq!(meta.output_shape, DataShape::default());
    }

    #[tokio::test]
    async fn test_write_statements_are_refused() {
        let (adapter, executor) = adapter(Ok(json!([])));
        let (result, _) = adapter.execute("DELETE FROM orders", &DataSource::new("sales")).await;
        assert!(!result.success);
        assert!(result.error.unwrap().contains("permission"));
        assert_eq!(executor.calls.load(Ordering::SeqCst), 0);
    }
}

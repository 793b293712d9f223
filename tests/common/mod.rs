//! Scripted collaborators for workflow tests

#![allow(dead_code)]

use async_trait::async_trait;
use insight_pipeline::cache::PipelineCaches;
use insight_pipeline::execution::Row;
use insight_pipeline::{
    AgentContext, CompletionPurpose, CompletionRequest, DataSource, EngineResponse,
    ExecutionOptions, LlmCompletion, PipelineConfig, PipelineError, QueryExecutor, Result,
    SchemaProvider, SqlGenerator, WorkflowOrchestrator,
};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

/// One mock standing in for every collaborator
pub struct Scripted {
    pub schema: Option<Value>,
    pub sql: Option<String>,
    pub rows: Vec<Row>,
    pub execution_error: Option<String>,
    pub responses: HashMap<CompletionPurpose, String>,
    completions: Mutex<Vec<CompletionPurpose>>,
    executions: AtomicUsize,
    schema_lookups: AtomicUsize,
}

impl Scripted {
    pub fn new() -> Self {
        Self {
            schema: Some(json!({"type": "postgresql", "tables": [{"name": "orders"}]})),
            sql: Some("SELECT status, amount FROM orders".to_string()),
            rows: Vec::new(),
            execution_error: None,
            responses: HashMap::new(),
            completions: Mutex::new(Vec::new()),
            executions: AtomicUsize::new(0),
            schema_lookups: AtomicUsize::new(0),
        }
    }

    pub fn rows(mut self, rows: Value) -> Self {
        self.rows = rows
            .as_array()
            .expect("rows array")
            .iter()
            .map(|r| r.as_object().cloned().expect("row object"))
            .collect();
        self
    }

    pub fn sql(mut self, sql: &str) -> Self {
        self.sql = Some(sql.to_string());
        self
    }

    pub fn no_schema(mut self) -> Self {
        self.schema = None;
        self
    }

    pub fn execution_error(mut self, message: &str) -> Self {
        self.execution_error = Some(message.to_string());
        self
    }

    pub fn respond(mut self, purpose: CompletionPurpose, text: &str) -> Self {
        self.responses.insert(purpose, text.to_string());
        self
    }

    pub fn completions(&self) -> Vec<CompletionPurpose> {
        self.completions.lock().unwrap().clone()
    }

    pub fn executions(&self) -> usize {
        self.executions.load(Ordering::SeqCst)
    }

    pub fn schema_lookups(&self) -> usize {
        self.schema_lookups.load(Ordering::SeqCst)
    }

    pub fn build(self) -> (Arc<Self>, WorkflowOrchestrator) {
        self.build_with(Arc::new(PipelineCaches::default()))
    }

    pub fn build_with(self, caches: Arc<PipelineCaches>) -> (Arc<Self>, WorkflowOrchestrator) {
        let mock = Arc::new(self);
        let orchestrator = WorkflowOrchestrator::new(
            mock.clone(),
            mock.clone(),
            mock.clone(),
            mock.clone(),
            caches,
            PipelineConfig::default(),
        );
        (mock, orchestrator)
    }
}

#[async_trait]
impl SchemaProvider for Scripted {
    async fn get_source_schema(&self, data_source_id: &str) -> Result<Value> {
        self.schema_lookups.fetch_add(1, Ordering::SeqCst);
        self.schema
            .clone()
            .ok_or_else(|| PipelineError::Schema(format!("{} is unreachable", data_source_id)))
    }
}

#[async_trait]
impl SqlGenerator for Scripted {
    async fn generate_sql(
        &self,
        _nl_query: &str,
        _data_source_id: &str,
        _context: &AgentContext,
        _schema: &Value,
    ) -> Result<String> {
        self.sql
            .clone()
            .ok_or_else(|| PipelineError::Llm("model unavailable".to_string()))
    }
}

#[async_trait]
impl QueryExecutor for Scripted {
    async fn execute_query(
        &self,
        _sql: &str,
        _data_source: &DataSource,
        _options: &ExecutionOptions,
    ) -> Result<EngineResponse> {
        self.executions.fetch_add(1, Ordering::SeqCst);
        match &self.execution_error {
            Some(message) => Err(PipelineError::execution(message.clone())),
            None => Ok(EngineResponse {
                data: self.rows.clone(),
                engine: "postgres".to_string(),
            }),
        }
    }
}

#[async_trait]
impl LlmCompletion for Scripted {
    async fn generate_completion(&self, request: CompletionRequest) -> Result<String> {
        self.completions.lock().unwrap().push(request.purpose);
        self.responses
            .get(&request.purpose)
            .cloned()
            .ok_or_else(|| PipelineError::Llm(format!("{} call failed", request.purpose)))
    }
}

pub fn status_rows() -> Value {
    json!([
        {"status": "A", "amount": 10},
        {"status": "B", "amount": 30}
    ])
}

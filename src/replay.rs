//! Replay Harness - Run the pipeline against recorded collaborator output
//!
//! A fixture captures what the schema provider, SQL generator, executor and
//! LLM returned for one question. `ReplayCollaborators` plays it back
//! through the regular collaborator traits, so a recorded session can be
//! re-run without any live backend.

use crate::cache::PipelineCaches;
use crate::collaborators::{AgentContext, SchemaProvider, SqlGenerator};
use crate::config::PipelineConfig;
use crate::error::{PipelineError, Result};
use crate::execution::{DataSource, EngineResponse, ExecutionOptions, QueryExecutor, Row};
use crate::llm::{CompletionPurpose, CompletionRequest, LlmCompletion};
use crate::pipeline::WorkflowOrchestrator;
use async_trait::async_trait;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::debug;

fn default_engine() -> String {
    "replay".to_string()
}

/// Recorded collaborator output for one question
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReplayFixture {
    /// Question the fixture was recorded for
    pub question: String,

    #[serde(default)]
    pub data_source_id: Option<String>,

    /// Schema returned by the provider. Null replays a provider failure.
    #[serde(default)]
    pub schema: Value,

    /// SQL returned by the generator. Empty replays a generation failure.
    pub sql: String,

    #[serde(default)]
    pub rows: Vec<Row>,

    /// When set, the executor fails with this message instead of returning rows
    #[serde(default)]
    pub execution_error: Option<String>,

    #[serde(default = "default_engine")]
    pub engine: String,

    /// Completion text per purpose. A missing purpose replays an LLM failure.
    #[serde(default)]
    pub llm_responses: HashMap<CompletionPurpose, String>,
}

impl ReplayFixture {
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }
}

/// Plays a fixture back through every collaborator trait
pub struct ReplayCollaborators {
    fixture: ReplayFixture,
    completions: DashMap<CompletionPurpose, usize>,
    executions: AtomicUsize,
}

impl ReplayCollaborators {
    pub fn new(fixture: ReplayFixture) -> Arc<Self> {
        Arc::new(Self {
            fixture,
            completions: DashMap::new(),
            executions: AtomicUsize::new(0),
        })
    }

    pub fn fixture(&self) -> &ReplayFixture {
        &self.fixture
    }

    /// Number of completions requested for `purpose`
    pub fn completion_count(&self, purpose: CompletionPurpose) -> usize {
        self.completions.get(&purpose).map(|count| *count).unwrap_or(0)
    }

    /// Number of queries that reached the executor
    pub fn execution_count(&self) -> usize {
        self.executions.load(Ordering::Relaxed)
    }

    /// Orchestrator wired to this fixture for every collaborator
    pub fn orchestrator(
        self: &Arc<Self>,
        caches: Arc<PipelineCaches>,
        config: PipelineConfig,
    ) -> WorkflowOrchestrator {
        WorkflowOrchestrator::new(
            self.clone(),
            self.clone(),
            self.clone(),
            self.clone(),
            caches,
            config,
        )
    }
}

#[async_trait]
impl SchemaProvider for ReplayCollaborators {
    async fn get_source_schema(&self, data_source_id: &str) -> Result<Value> {
        if self.fixture.schema.is_null() {
            return Err(PipelineError::Schema(format!(
                "no recorded schema for {}",
                data_source_id
            )));
        }
        Ok(self.fixture.schema.clone())
    }
}

#[async_trait]
impl SqlGenerator for ReplayCollaborators {
    async fn generate_sql(
        &self,
        _nl_query: &str,
        _data_source_id: &str,
        _context: &AgentContext,
        _schema: &Value,
    ) -> Result<String> {
        if self.fixture.sql.trim().is_empty() {
            return Err(PipelineError::SqlGeneration("no recorded SQL".to_string()));
        }
        Ok(self.fixture.sql.clone())
    }
}

#[async_trait]
impl QueryExecutor for ReplayCollaborators {
    async fn execute_query(
        &self,
        _sql: &str,
        data_source: &DataSource,
        options: &ExecutionOptions,
    ) -> Result<EngineResponse> {
        self.executions.fetch_add(1, Ordering::Relaxed);
        if let Some(message) = &self.fixture.execution_error {
            return Err(PipelineError::execution(message.clone()));
        }
        let limit = options.row_limit.unwrap_or(usize::MAX);
        debug!(
            "Replaying {} rows for {}",
            self.fixture.rows.len().min(limit),
            data_source.id
        );
        Ok(EngineResponse {
            data: self.fixture.rows.iter().take(limit).cloned().collect(),
            engine: self.fixture.engine.clone(),
        })
    }
}

#[async_trait]
impl LlmCompletion for ReplayCollaborators {
    async fn generate_completion(&self, request: CompletionRequest) -> Result<String> {
        *self.completions.entry(request.purpose).or_insert(0) += 1;
        self.fixture
            .llm_responses
            .get(&request.purpose)
            .cloned()
            .ok_or_else(|| {
                PipelineError::Llm(format!("no recorded {} completion", request.purpose))
            })
    }
}

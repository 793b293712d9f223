//! Workflow Orchestrator - Question in, chart and narrative out
//!
//! Drives one invocation through the ordered pipeline stages. Every stage
//! returns `Result<T>` and the orchestrator branches on the error's
//! `ErrorKind`. Validation, SQL generation, query execution and data
//! validation stop the workflow on a fatal error; schema retrieval and
//! narration degrade to defaults and record a warning.

use super::classifier::ErrorClassifier;
use super::progress::{PipelineProgress, PipelineStage};
use super::result::WorkflowResult;
use crate::cache::PipelineCaches;
use crate::collaborators::{AgentContext, SchemaProvider, SqlGenerator};
use crate::config::PipelineConfig;
use crate::error::{ErrorKind, PipelineError, Result};
use crate::execution::{DataSource, QueryExecutionAdapter, QueryExecutor, QueryResult, TransformationMetadata};
use crate::generation::prompts::{narration_prompt, NARRATION_SYSTEM_CONTEXT};
use crate::generation::{build_chart_data, GenerationMethod, GenerationRequest, GenerationStrategySelector};
use crate::intent::QueryIntent;
use crate::llm::{timed_completion, CompletionPurpose, CompletionRequest, LlmCallRecord, LlmCompletion};
use crate::observability::PipelineMetrics;
use lazy_static::lazy_static;
use regex::Regex;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

lazy_static! {
    static ref SQL_FENCE: Regex = Regex::new(r"(?is)```(?:sql)?\s*(.*?)```").expect("sql fence pattern");
}

const UNEXPECTED_FAILURE_MESSAGE: &str =
    "Something went wrong while analyzing your question. Please try again.";

/// Receives a snapshot on every stage transition
pub type ProgressCallback = Arc<dyn Fn(PipelineProgress) + Send + Sync>;

/// Where the final narration came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NarrationSource {
    ExecutiveSummary,
    Llm,
    Fallback,
}

impl NarrationSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            NarrationSource::ExecutiveSummary => "executive_summary",
            NarrationSource::Llm => "llm",
            NarrationSource::Fallback => "fallback",
        }
    }
}

/// Per-invocation bookkeeping. Never shared between invocations.
struct WorkflowRun {
    workflow_id: String,
    data_source_id: String,
    progress: PipelineProgress,
    callback: Option<ProgressCallback>,
    intent: Option<QueryIntent>,
    warnings: Vec<String>,
    transformations: Vec<TransformationMetadata>,
    llm_calls: Vec<LlmCallRecord>,
    started: Instant,
}

impl WorkflowRun {
    fn new(data_source_id: &str, callback: Option<ProgressCallback>) -> Self {
        Self {
            workflow_id: Uuid::new_v4().to_string(),
            data_source_id: data_source_id.to_string(),
            progress: PipelineProgress::new(),
            callback,
            intent: None,
            warnings: Vec::new(),
            transformations: Vec::new(),
            llm_calls: Vec::new(),
            started: Instant::now(),
        }
    }

    fn advance(&mut self, stage: PipelineStage, step: &str) -> Result<()> {
        self.advance_with(stage, step, None)
    }

    fn advance_with(
        &mut self,
        stage: PipelineStage,
        step: &str,
        metadata: Option<HashMap<String, Value>>,
    ) -> Result<()> {
        self.progress.advance(stage, step, metadata)?;
        info!(
            "[{}] {} ({}%): {}",
            self.workflow_id, stage, self.progress.progress_percent, step
        );
        if let Some(callback) = &self.callback {
            callback(self.progress.clone());
        }
        Ok(())
    }

    fn warn(&mut self, message: String) {
        warn!("[{}] {}", self.workflow_id, message);
        self.warnings.push(message);
    }

    /// Settle the result of a stage that can degrade. Recoverable errors
    /// become a warning, informational ones are only logged, and both
    /// continue with `fallback`. Fatal errors propagate.
    fn recover<T>(
        &mut self,
        context: &str,
        result: Result<T>,
        fallback: impl FnOnce() -> T,
    ) -> Result<T> {
        match result {
            Ok(value) => Ok(value),
            Err(e) => match e.kind() {
                ErrorKind::Fatal => Err(e),
                ErrorKind::Recoverable => {
                    self.warn(format!("{}: {}", context, e));
                    Ok(fallback())
                }
                ErrorKind::Informational => {
                    debug!("[{}] {}: {}", self.workflow_id, context, e);
                    Ok(fallback())
                }
            },
        }
    }

    fn elapsed_ms(&self) -> u64 {
        self.started.elapsed().as_millis() as u64
    }

    /// Metadata common to every outcome
    fn metadata(&self) -> HashMap<String, Value> {
        let mut metadata = HashMap::new();
        metadata.insert("workflow_id".to_string(), json!(self.workflow_id));
        metadata.insert("data_source_id".to_string(), json!(self.data_source_id));
        if let Some(intent) = &self.intent {
            metadata.insert(
                "intent".to_string(),
                serde_json::to_value(intent).unwrap_or_default(),
            );
        }
        metadata.insert(
            "transformations".to_string(),
            serde_json::to_value(&self.transformations).unwrap_or_default(),
        );
        metadata.insert(
            "llm_calls".to_string(),
            serde_json::to_value(&self.llm_calls).unwrap_or_default(),
        );
        metadata.insert("warnings".to_string(), json!(self.warnings));
        metadata.insert("total_duration_ms".to_string(), json!(self.elapsed_ms()));
        metadata
    }
}

/// Strip markdown fences, surrounding whitespace and trailing semicolons
pub fn clean_sql(raw: &str) -> String {
    let inner = SQL_FENCE
        .captures(raw)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str())
        .unwrap_or(raw);
    inner.trim().trim_end_matches(|c: char| c == ';' || c.is_whitespace()).to_string()
}

/// Rows must be present and carry at least one column
fn validate_result(query_result: &QueryResult) -> Result<()> {
    if query_result.data.is_empty() {
        return Err(PipelineError::NoRows);
    }
    if query_result.columns.is_empty() {
        return Err(PipelineError::DataValidation(
            "result rows have no columns".to_string(),
        ));
    }
    Ok(())
}

/// Narration assembled from the insights when no LLM narration is available
pub fn fallback_narration(
    query: &str,
    row_count: usize,
    insights: &[Value],
    recommendations: &[Value],
) -> String {
    let mut narration = format!("Analyzed {} rows to answer \"{}\".", row_count, query);
    if let Some(description) = insights
        .iter()
        .find_map(|i| i.get("description").and_then(Value::as_str))
    {
        narration.push(' ');
        narration.push_str(description);
    }
    if let Some(title) = recommendations
        .iter()
        .find_map(|r| r.get("title").and_then(Value::as_str))
    {
        narration.push_str(&format!(" Suggested next step: {}.", title));
    }
    narration
}

pub struct WorkflowOrchestrator {
    sql_generator: Arc<dyn SqlGenerator>,
    schema_provider: Arc<dyn SchemaProvider>,
    llm: Arc<dyn LlmCompletion>,
    adapter: QueryExecutionAdapter,
    selector: GenerationStrategySelector,
    caches: Arc<PipelineCaches>,
    config: PipelineConfig,
    metrics: Arc<PipelineMetrics>,
    classifier: ErrorClassifier,
}

impl WorkflowOrchestrator {
    pub fn new(
        sql_generator: Arc<dyn SqlGenerator>,
        executor: Arc<dyn QueryExecutor>,
        llm: Arc<dyn LlmCompletion>,
        schema_provider: Arc<dyn SchemaProvider>,
        caches: Arc<PipelineCaches>,
        config: PipelineConfig,
    ) -> Self {
        let adapter = QueryExecutionAdapter::new(executor, caches.clone())
            .with_row_limit(config.max_result_rows)
            .with_result_ttl(config.query_cache_ttl());
        let selector = GenerationStrategySelector::new(llm.clone(), config.clone());
        Self {
            sql_generator,
            schema_provider,
            llm,
            adapter,
            selector,
            caches,
            config,
            metrics: Arc::new(PipelineMetrics::new()),
            classifier: ErrorClassifier::new(),
        }
    }

    /// Share a metrics tracker across orchestrators
    pub fn with_metrics(mut self, metrics: Arc<PipelineMetrics>) -> Self {
        self.metrics = metrics;
        self
    }

    pub fn metrics(&self) -> &Arc<PipelineMetrics> {
        &self.metrics
    }

    pub fn caches(&self) -> &Arc<PipelineCaches> {
        &self.caches
    }

    /// Run one question end to end. Always returns a result; failures are
    /// reported in the payload.
    pub async fn execute_workflow(
        &self,
        query: &str,
        data_source_id: &str,
        agent_context: &AgentContext,
        progress_callback: Option<ProgressCallback>,
    ) -> WorkflowResult {
        self.metrics.record_started();
        let query = query.trim();
        let data_source_id = data_source_id.trim();

        // Input errors fail before any progress is recorded
        let input_error = if query.is_empty() {
            Some("query is required")
        } else if data_source_id.is_empty() {
            Some("data source id is required")
        } else {
            None
        };
        if let Some(reason) = input_error {
            let err = PipelineError::InvalidInput(reason.to_string());
            warn!("Rejected workflow request: {}", err);
            self.metrics
                .record_failure(PipelineStage::Validation.as_str(), 0);
            return WorkflowResult::failure(&err, PipelineProgress::new());
        }

        let mut run = WorkflowRun::new(data_source_id, progress_callback);
        match self.run(&mut run, query, agent_context).await {
            Ok(result) => result,
            Err(e) => self.unexpected(&run, e),
        }
    }

    async fn run(
        &self,
        run: &mut WorkflowRun,
        query: &str,
        context: &AgentContext,
    ) -> Result<WorkflowResult> {
        run.advance(PipelineStage::Validation, "Validating request")?;
        let intent = context
            .query_intent
            .clone()
            .unwrap_or_else(|| QueryIntent::infer(query));
        run.intent = Some(intent.clone());

        run.advance(PipelineStage::SchemaRetrieval, "Loading data source schema")?;
        let loaded = self.load_schema(&run.data_source_id).await;
        let schema = run.recover("schema retrieval failed", loaded, || json!({}))?;
        let data_source = DataSource::from_schema(&run.data_source_id, &schema);

        run.advance(PipelineStage::SqlGeneration, "Generating SQL")?;
        let sql = match self
            .generate_sql(query, &run.data_source_id, context, &schema)
            .await
        {
            Ok(sql) => sql,
            Err(e) => return self.halt(run, e, None, None),
        };

        run.advance(PipelineStage::QueryExecution, "Executing query")?;
        let query_result = match self.execute_query(run, &sql, &data_source).await {
            Ok(query_result) => query_result,
            Err(e) => return self.halt(run, e, Some(sql), None),
        };

        run.advance(PipelineStage::DataValidation, "Validating result")?;
        if let Err(e) = validate_result(&query_result) {
            return self.halt(run, e, Some(sql), Some(query_result));
        }

        run.advance(PipelineStage::ChartGeneration, "Generating chart and insights")?;
        let request = GenerationRequest {
            query,
            sql: &sql,
            rows: &query_result.data,
            columns: &query_result.columns,
            intent: &intent,
        };
        let outcome = self.selector.generate(&request).await;
        let generation = outcome.result;
        let trace = outcome.trace;
        run.llm_calls.extend(trace.llm_calls.iter().cloned());
        for attempt in trace.attempts.iter().filter(|a| !a.accepted) {
            run.warn(format!(
                "{} generation rejected: {}",
                attempt.tier.as_str(),
                attempt.reason
            ));
        }
        self.metrics
            .record_generation_method(generation.generation_method.as_str());

        let chart_data = match &generation.chart_config {
            Some(config) => {
                let (data, meta) = build_chart_data(config, &query_result.data);
                run.transformations.push(meta);
                Some(data)
            }
            None => {
                run.warn("no chart configuration was produced".to_string());
                None
            }
        };

        let mut insight_meta = HashMap::new();
        insight_meta.insert("insight_count".to_string(), json!(generation.insights.len()));
        insight_meta.insert(
            "recommendation_count".to_string(),
            json!(generation.recommendations.len()),
        );
        run.advance_with(
            PipelineStage::InsightsGeneration,
            "Collecting insights",
            Some(insight_meta),
        )?;
        if generation.generation_method == GenerationMethod::Failed {
            run.warn("insight generation produced nothing".to_string());
        }

        run.advance(PipelineStage::NarrationSynthesis, "Writing narration")?;
        let (narration, narration_source) = self
            .narrate(run, query, query_result.row_count, &generation.insights, &generation.recommendations, generation.executive_summary.as_deref())
            .await?;

        run.advance(PipelineStage::ResultCombination, "Combining results")?;
        let mut metadata = run.metadata();
        metadata.insert(
            "generation_method".to_string(),
            json!(generation.generation_method.as_str()),
        );
        metadata.insert(
            "generation_trace".to_string(),
            serde_json::to_value(&trace).unwrap_or_default(),
        );
        metadata.insert("narration_source".to_string(), json!(narration_source.as_str()));
        metadata.insert("row_count".to_string(), json!(query_result.row_count));
        if let Some(summary) = &generation.executive_summary {
            metadata.insert("executive_summary".to_string(), json!(summary));
        }

        run.advance(PipelineStage::Complete, "Analysis complete")?;
        let total_ms = run.elapsed_ms();
        metadata.insert("total_duration_ms".to_string(), json!(total_ms));
        self.metrics.record_success(total_ms);

        Ok(WorkflowResult {
            success: true,
            sql_query: Some(sql),
            query_result: Some(query_result),
            chart_config: generation.chart_config,
            chart_data,
            insights: generation.insights,
            recommendations: generation.recommendations,
            narration: Some(narration),
            metadata,
            progress: run.progress.clone(),
            error: None,
            user_message: None,
            critical_failure: None,
            partial_success: None,
        })
    }

    /// Schema from cache or provider. Provider errors surface as
    /// `PipelineError::Schema`.
    async fn load_schema(&self, data_source_id: &str) -> Result<Value> {
        let cache = &self.caches.schema;
        if let Some(schema) = cache.get(data_source_id) {
            self.metrics.record_cache(cache.name(), true);
            return Ok(schema);
        }
        self.metrics.record_cache(cache.name(), false);

        let schema = self
            .schema_provider
            .get_source_schema(data_source_id)
            .await
            .map_err(|e| match e {
                PipelineError::Schema(_) => e,
                other => PipelineError::Schema(other.to_string()),
            })?;
        cache.set_with_ttl(
            data_source_id.to_string(),
            schema.clone(),
            self.config.schema_cache_ttl(),
        );
        Ok(schema)
    }

    /// Cleaned SQL from the generator. Generator errors and empty SQL
    /// surface as `PipelineError::SqlGeneration`.
    async fn generate_sql(
        &self,
        query: &str,
        data_source_id: &str,
        context: &AgentContext,
        schema: &Value,
    ) -> Result<String> {
        let raw = self
            .sql_generator
            .generate_sql(query, data_source_id, context, schema)
            .await
            .map_err(|e| match e {
                PipelineError::SqlGeneration(_) => e,
                other => PipelineError::SqlGeneration(other.to_string()),
            })?;
        let sql = clean_sql(&raw);
        if sql.is_empty() {
            return Err(PipelineError::SqlGeneration(
                "generated SQL is empty".to_string(),
            ));
        }
        Ok(sql)
    }

    /// Run the query through the adapter. A failed execution is classified
    /// and returned as `PipelineError::Execution`.
    async fn execute_query(
        &self,
        run: &mut WorkflowRun,
        sql: &str,
        data_source: &DataSource,
    ) -> Result<QueryResult> {
        let (query_result, execution_meta) = self.adapter.execute(sql, data_source).await;
        run.transformations.push(execution_meta);
        self.metrics
            .record_cache(self.caches.query_results.name(), query_result.cached);
        if query_result.success {
            return Ok(query_result);
        }

        let message = query_result
            .error
            .unwrap_or_else(|| "query execution failed".to_string());
        let class = self.classifier.classify(&message);
        run.progress
            .metadata
            .insert("execution_error_class".to_string(), json!(class.to_string()));
        Err(self.classifier.to_error(&message))
    }

    /// Reuse a long enough executive summary, else ask the LLM, else build
    /// one from the insights
    async fn narrate(
        &self,
        run: &mut WorkflowRun,
        query: &str,
        row_count: usize,
        insights: &[Value],
        recommendations: &[Value],
        executive_summary: Option<&str>,
    ) -> Result<(String, NarrationSource)> {
        if let Some(summary) = executive_summary {
            if summary.chars().count() > self.config.narration_reuse_min_chars {
                self.metrics.record_narration_reuse();
                return Ok((summary.to_string(), NarrationSource::ExecutiveSummary));
            }
        }

        let outcome = self
            .request_narration(run, query, row_count, insights, recommendations)
            .await
            .map(|text| (text, NarrationSource::Llm));
        run.recover("narration failed", outcome, || {
            (
                fallback_narration(query, row_count, insights, recommendations),
                NarrationSource::Fallback,
            )
        })
    }

    /// One narration completion, trimmed
    async fn request_narration(
        &self,
        run: &mut WorkflowRun,
        query: &str,
        row_count: usize,
        insights: &[Value],
        recommendations: &[Value],
    ) -> Result<String> {
        let request = CompletionRequest {
            prompt: narration_prompt(query, row_count, insights, recommendations),
            system_context: NARRATION_SYSTEM_CONTEXT.to_string(),
            max_tokens: self.config.narration.max_tokens,
            temperature: self.config.narration.temperature,
            purpose: CompletionPurpose::Narration,
        };
        let (outcome, record) = timed_completion(self.llm.as_ref(), request).await;
        run.llm_calls.push(record);
        Ok(outcome?.trim().to_string())
    }

    /// End the run on a fatal error from a terminating stage. Any other
    /// kind has no fallback here and propagates as unexpected.
    fn halt(
        &self,
        run: &WorkflowRun,
        error: PipelineError,
        sql: Option<String>,
        query_result: Option<QueryResult>,
    ) -> Result<WorkflowResult> {
        match error.kind() {
            ErrorKind::Fatal => Ok(self.fail(run, error, sql, query_result)),
            ErrorKind::Recoverable | ErrorKind::Informational => Err(error),
        }
    }

    /// Generic failure for an error no stage handled
    fn unexpected(&self, run: &WorkflowRun, error: PipelineError) -> WorkflowResult {
        let stage = run.progress.stage;
        error!(
            "[{}] Workflow failed unexpectedly at {}: {}",
            run.workflow_id, stage, error
        );
        self.metrics.record_failure(stage.as_str(), run.elapsed_ms());
        let mut result = WorkflowResult::failure(&error, run.progress.clone())
            .with_metadata(run.metadata());
        result.user_message = Some(UNEXPECTED_FAILURE_MESSAGE.to_string());
        result
    }

    /// Structured failure for a fatal stage error
    fn fail(
        &self,
        run: &WorkflowRun,
        error: PipelineError,
        sql: Option<String>,
        query_result: Option<QueryResult>,
    ) -> WorkflowResult {
        let stage = run.progress.stage;
        warn!("[{}] Workflow stopped at {}: {}", run.workflow_id, stage, error);
        self.metrics.record_failure(stage.as_str(), run.elapsed_ms());

        let mut result = WorkflowResult::failure(&error, run.progress.clone())
            .with_metadata(run.metadata());
        if let PipelineError::Execution { critical, .. } = &error {
            if *critical {
                result.critical_failure = Some(true);
            } else {
                result.partial_success = Some(true);
            }
        }
        result.sql_query = sql;
        result.query_result = query_result;
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::replay::{ReplayCollaborators, ReplayFixture};

    fn orchestrator() -> WorkflowOrchestrator {
        let fixture: ReplayFixture = serde_json::from_value(json!({
            "question": "amount by status",
            "sql": "SELECT status, amount FROM orders"
        }))
        .unwrap();
        ReplayCollaborators::new(fixture)
            .orchestrator(Arc::new(PipelineCaches::default()), PipelineConfig::default())
    }

    #[test]
    fn test_recoverable_errors_degrade_with_warning() {
        let mut run = WorkflowRun::new("orders_db", None);
        let schema = run
            .recover("schema retrieval failed", Err(PipelineError::Schema("down".into())), || json!({}))
            .unwrap();
        assert_eq!(schema, json!({}));

        let narration: Result<String> = Err(PipelineError::Llm("timeout".into()));
        let narration = run
            .recover("narration failed", narration, || "fallback".to_string())
            .unwrap();
        assert_eq!(narration, "fallback");
        assert_eq!(
            run.warnings,
            vec!["schema retrieval failed: Schema retrieval error: down", "narration failed: LLM error: timeout"]
        );
    }

    #[test]
    fn test_informational_errors_leave_no_warning() {
        let mut run = WorkflowRun::new("orders_db", None);
        let json_err = serde_json::from_str::<Value>("{").unwrap_err();
        let value = run.recover("parse", Err(json_err.into()), || 7).unwrap();
        assert_eq!(value, 7);
        assert!(run.warnings.is_empty());
    }

    #[test]
    fn test_fatal_errors_are_not_recovered() {
        let mut run = WorkflowRun::new("orders_db", None);
        let result = run.recover("schema retrieval failed", Err(PipelineError::NoRows), || json!({}));
        assert!(matches!(result, Err(PipelineError::NoRows)));
        assert!(run.warnings.is_empty());
    }

    #[test]
    fn test_halt_routes_by_kind() {
        let orchestrator = orchestrator();
        let run = WorkflowRun::new("orders_db", None);

        let stopped = orchestrator
            .halt(&run, PipelineError::NoRows, Some("SELECT 1".to_string()), None)
            .unwrap();
        assert!(!stopped.success);
        assert_eq!(stopped.sql_query.as_deref(), Some("SELECT 1"));

        let escaped = orchestrator.halt(&run, PipelineError::Llm("timeout".into()), None, None);
        assert!(matches!(escaped, Err(PipelineError::Llm(_))));
    }

    #[test]
    fn test_unexpected_error_gets_generic_message() {
        let orchestrator = orchestrator();
        let mut run = WorkflowRun::new("orders_db", None);
        run.advance(PipelineStage::Validation, "Validating request").unwrap();
        let err = run
            .advance(PipelineStage::QueryExecution, "Executing query")
            .unwrap_err();

        let result = orchestrator.unexpected(&run, err);
        assert!(!result.success);
        assert_eq!(result.user_message.as_deref(), Some(UNEXPECTED_FAILURE_MESSAGE));
        assert!(result.error.unwrap().starts_with("Invalid stage transition"));
        assert_eq!(result.progress.stage, PipelineStage::Validation);
        assert_eq!(
            orchestrator.metrics().snapshot().failures_by_stage.get("validation"),
            Some(&1)
        );
    }

    #[test]
    fn test_clean_sql_strips_fences_and_semicolons() {
        assert_eq!(clean_sql("```sql\nSELECT 1;\n```"), "SELECT 1");
        assert_eq!(clean_sql("  SELECT a FROM t ;; "), "SELECT a FROM t");
        assert_eq!(clean_sql("```\n\n```"), "");
    }

    #[test]
    fn test_fallback_narration_uses_first_items() {
        let narration = fallback_narration(
            "sales by region",
            4,
            &[json!({"description": "US leads."}), json!({"description": "ignored"})],
            &[json!({"title": "Investigate EU"})],
        );
        assert_eq!(
            narration,
            "Analyzed 4 rows to answer \"sales by region\". US leads. Suggested next step: Investigate EU."
        );
    }

    #[test]
    fn test_narration_source_names() {
        assert_eq!(NarrationSource::ExecutiveSummary.as_str(), "executive_summary");
        assert_eq!(NarrationSource::Fallback.as_str(), "fallback");
    }
}

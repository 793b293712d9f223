//! Generation Strategy Selector - Unified, separate, then heuristic
//!
//! Each tier is gated on success and usefulness. The unified call must
//! produce a chart plus some narrative; the separate tier accepts either
//! half and fills the other from heuristics; heuristics always succeed on
//! non-empty rows.

use super::heuristics::{heuristic_chart, heuristic_insights};
use super::prompts::{self, SYSTEM_CONTEXT};
use super::{GenerationMethod, GenerationOutcome, GenerationResult, GenerationTrace};
use crate::config::{CompletionSettings, PipelineConfig};
use crate::error::Result;
use crate::execution::Row;
use crate::intent::QueryIntent;
use crate::json_repair::{self, Extraction, ExtractionConfidence};
use crate::llm::{timed_completion, CompletionPurpose, CompletionRequest, LlmCallRecord, LlmCompletion};
use crate::normalizer::{normalize_insights, normalize_recommendations};
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Everything the generation tiers see about one query result
#[derive(Debug, Clone, Copy)]
pub struct GenerationRequest<'a> {
    pub query: &'a str,
    pub sql: &'a str,
    pub rows: &'a [Row],
    pub columns: &'a [String],
    pub intent: &'a QueryIntent,
}

/// Narrative half of a generation payload, normalized
#[derive(Debug, Default)]
struct Narrative {
    insights: Vec<Value>,
    recommendations: Vec<Value>,
    executive_summary: Option<String>,
}

impl Narrative {
    fn from_payload(payload: &Value) -> Self {
        Self {
            insights: normalize_insights(payload.get("insights").unwrap_or(&Value::Null)),
            recommendations: normalize_recommendations(
                payload.get("recommendations").unwrap_or(&Value::Null),
            ),
            executive_summary: payload
                .get("executive_summary")
                .and_then(Value::as_str)
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string),
        }
    }

    fn is_empty(&self) -> bool {
        self.insights.is_empty() && self.recommendations.is_empty() && self.executive_summary.is_none()
    }
}

/// Chart config from a payload: `chart_config`, `chart`, or the payload
/// itself when it carries a chart type. Nulls and empty objects are
/// skipped so the next candidate still gets a chance.
fn chart_from_payload(payload: &Value) -> Option<Value> {
    let usable = |value: &&Value| matches!(value, Value::Object(obj) if !obj.is_empty());
    payload
        .get("chart_config")
        .filter(usable)
        .or_else(|| payload.get("chart").filter(usable))
        .or_else(|| {
            (payload.get("chart_type").is_some() || payload.get("type").is_some())
                .then_some(payload)
                .filter(usable)
        })
        .cloned()
}

pub struct GenerationStrategySelector {
    llm: Arc<dyn LlmCompletion>,
    config: PipelineConfig,
}

impl GenerationStrategySelector {
    pub fn new(llm: Arc<dyn LlmCompletion>, config: PipelineConfig) -> Self {
        Self { llm, config }
    }

    /// Run the tiers in order and return the first accepted result with
    /// the trace of every attempt
    pub async fn generate(&self, request: &GenerationRequest<'_>) -> GenerationOutcome {
        let mut trace = GenerationTrace::default();

        if request.rows.is_empty() {
            trace.attempt(GenerationMethod::Failed, false, "no rows to analyse", None);
            return GenerationOutcome {
                result: GenerationResult::failed(),
                trace,
            };
        }

        if let Some(result) = self.try_unified(request, &mut trace).await {
            return GenerationOutcome { result, trace };
        }
        if let Some(result) = self.try_separate(request, &mut trace).await {
            return GenerationOutcome { result, trace };
        }

        let result = self.heuristic(request);
        trace.attempt(GenerationMethod::Heuristic, true, "deterministic fallback", None);
        info!("Generation fell back to heuristics");
        GenerationOutcome { result, trace }
    }

    fn request(&self, purpose: CompletionPurpose, prompt: String, settings: CompletionSettings) -> CompletionRequest {
        CompletionRequest {
            prompt,
            system_context: SYSTEM_CONTEXT.to_string(),
            max_tokens: settings.max_tokens,
            temperature: settings.temperature,
            purpose,
        }
    }

    /// One completion parsed into a JSON object
    async fn complete_json(&self, request: CompletionRequest) -> (Result<Extraction>, LlmCallRecord) {
        let (outcome, record) = timed_completion(self.llm.as_ref(), request).await;
        let extraction = outcome.and_then(|text| json_repair::extract(&text).map_err(Into::into));
        (extraction, record)
    }

    async fn try_unified(
        &self,
        request: &GenerationRequest<'_>,
        trace: &mut GenerationTrace,
    ) -> Option<GenerationResult> {
        let prompt = prompts::unified_prompt(request, self.config.prompt_sample_rows);
        let completion = self.request(CompletionPurpose::Unified, prompt, self.config.unified);
        let (extraction, record) = self.complete_json(completion).await;
        trace.llm_calls.push(record);

        let extraction = match extraction {
            Ok(extraction) => extraction,
            Err(e) => {
                trace.attempt(GenerationMethod::Unified, false, e.to_string(), None);
                return None;
            }
        };

        let chart_config = chart_from_payload(&extraction.value);
        let narrative = Narrative::from_payload(&extraction.value);
        let result = GenerationResult {
            success: true,
            chart_config,
            insights: narrative.insights,
            recommendations: narrative.recommendations,
            executive_summary: narrative.executive_summary,
            generation_method: GenerationMethod::Unified,
        };

        if !result.is_complete() {
            let reason = if result.chart_config.is_none() {
                "payload has no chart config"
            } else {
                "payload has no insights, recommendations or summary"
            };
            debug!("Unified generation rejected: {}", reason);
            trace.attempt(GenerationMethod::Unified, false, reason, Some(extraction.confidence));
            return None;
        }

        if extraction.confidence.is_lower_confidence() {
            trace.needs_revalidation = true;
        }
        trace.attempt(GenerationMethod::Unified, true, "chart and narrative present", Some(extraction.confidence));
        Some(result)
    }

    async fn try_separate(
        &self,
        request: &GenerationRequest<'_>,
        trace: &mut GenerationTrace,
    ) -> Option<GenerationResult> {
        let sample = self.config.prompt_sample_rows;
        let chart_request = self.request(
            CompletionPurpose::Chart,
            prompts::chart_prompt(request, sample),
            self.config.chart,
        );
        let insights_request = self.request(
            CompletionPurpose::Insights,
            prompts::insights_prompt(request, sample),
            self.config.insights,
        );

        // Both calls run to completion; an error in one leaves the other intact
        let ((chart_outcome, chart_record), (insights_outcome, insights_record)) = tokio::join!(
            self.complete_json(chart_request),
            self.complete_json(insights_request)
        );
        trace.llm_calls.push(chart_record);
        trace.llm_calls.push(insights_record);

        let mut lower_confidence = false;
        let mut confidence: Option<ExtractionConfidence> = None;
        let mut note = |extraction: &Extraction| {
            lower_confidence |= extraction.confidence.is_lower_confidence();
            confidence = Some(match confidence {
                Some(c) if c.is_lower_confidence() => c,
                _ => extraction.confidence,
            });
        };

        let chart_config = match &chart_outcome {
            Ok(extraction) => {
                note(extraction);
                chart_from_payload(&extraction.value)
            }
            Err(e) => {
                warn!("Chart generation failed: {}", e);
                None
            }
        };
        let narrative = match &insights_outcome {
            Ok(extraction) => {
                note(extraction);
                Narrative::from_payload(&extraction.value)
            }
            Err(e) => {
                warn!("Insights generation failed: {}", e);
                Narrative::default()
            }
        };

        if chart_config.is_none() && narrative.is_empty() {
            trace.attempt(
                GenerationMethod::Separate,
                false,
                "neither chart nor insights call produced usable output",
                confidence,
            );
            return None;
        }

        let chart_config = match chart_config {
            Some(chart) => chart,
            None => {
                trace.filled_from_heuristic.push("chart".to_string());
                heuristic_chart(request.rows, request.columns, request.intent)
            }
        };
        let narrative = if narrative.is_empty() {
            trace.filled_from_heuristic.push("insights".to_string());
            let heuristic = heuristic_insights(request.rows, request.columns);
            Narrative {
                insights: normalize_insights(&Value::Array(heuristic.insights)),
                recommendations: normalize_recommendations(&Value::Array(heuristic.recommendations)),
                executive_summary: None,
            }
        } else {
            narrative
        };

        if lower_confidence {
            trace.needs_revalidation = true;
        }
        let reason = if trace.filled_from_heuristic.is_empty() {
            "chart and insights calls both usable".to_string()
        } else {
            format!("filled {} from heuristics", trace.filled_from_heuristic.join(" and "))
        };
        trace.attempt(GenerationMethod::Separate, true, reason, confidence);

        Some(GenerationResult {
            success: true,
            chart_config: Some(chart_config),
            insights: narrative.insights,
            recommendations: narrative.recommendations,
            executive_summary: narrative.executive_summary,
            generation_method: GenerationMethod::Separate,
        })
    }

    fn heuristic(&self, request: &GenerationRequest<'_>) -> GenerationResult {
        let chart = heuristic_chart(request.rows, request.columns, request.intent);
        let heuristic = heuristic_insights(request.rows, request.columns);
        GenerationResult {
            success: true,
            chart_config: Some(chart),
            insights: normalize_insights(&Value::Array(heuristic.insights)),
            recommendations: normalize_recommendations(&Value::Array(heuristic.recommendations)),
            executive_summary: None,
            generation_method: GenerationMethod::Heuristic,
        }
    }
}

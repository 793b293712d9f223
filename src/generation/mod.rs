//! Generation Module - Chart, insight and summary generation
//!
//! - GenerationStrategySelector for the unified / separate / heuristic tiers
//! - Prompt templates with the fixed response schema
//! - Deterministic heuristics for charts and insights
//! - Chart data preparation from result rows

pub mod chart;
pub mod heuristics;
pub mod prompts;
pub mod selector;

pub use chart::build_chart_data;
pub use heuristics::{classify_columns, heuristic_chart, heuristic_insights, ColumnInfo, ColumnKind};
pub use selector::{GenerationRequest, GenerationStrategySelector};

use crate::json_repair::ExtractionConfidence;
use crate::llm::LlmCallRecord;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Which tier produced the generation output
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GenerationMethod {
    Unified,
    Separate,
    Heuristic,
    Failed,
}

impl GenerationMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            GenerationMethod::Unified => "unified",
            GenerationMethod::Separate => "separate",
            GenerationMethod::Heuristic => "heuristic",
            GenerationMethod::Failed => "failed",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GenerationResult {
    pub success: bool,
    pub chart_config: Option<Value>,
    pub insights: Vec<Value>,
    pub recommendations: Vec<Value>,
    pub executive_summary: Option<String>,
    pub generation_method: GenerationMethod,
}

impl GenerationResult {
    pub fn failed() -> Self {
        Self {
            success: false,
            chart_config: None,
            insights: Vec::new(),
            recommendations: Vec::new(),
            executive_summary: None,
            generation_method: GenerationMethod::Failed,
        }
    }

    /// A chart plus at least one piece of narrative content
    pub fn is_complete(&self) -> bool {
        self.chart_config.is_some() && self.has_narrative()
    }

    pub fn has_narrative(&self) -> bool {
        !self.insights.is_empty() || !self.recommendations.is_empty() || self.executive_summary.is_some()
    }
}

/// One tier attempt and why it was accepted or rejected
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TierAttempt {
    pub tier: GenerationMethod,
    pub accepted: bool,
    pub reason: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extraction_confidence: Option<ExtractionConfidence>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct GenerationTrace {
    pub attempts: Vec<TierAttempt>,
    pub llm_calls: Vec<LlmCallRecord>,

    /// Halves of a separate-tier result that came from heuristics
    pub filled_from_heuristic: Vec<String>,

    /// Accepted output came from a low-confidence extraction and should be
    /// re-validated downstream
    pub needs_revalidation: bool,
}

impl GenerationTrace {
    fn attempt(
        &mut self,
        tier: GenerationMethod,
        accepted: bool,
        reason: impl Into<String>,
        extraction_confidence: Option<ExtractionConfidence>,
    ) {
        self.attempts.push(TierAttempt {
            tier,
            accepted,
            reason: reason.into(),
            extraction_confidence,
        });
    }
}

#[derive(Debug, Clone)]
pub struct GenerationOutcome {
    pub result: GenerationResult,
    pub trace: GenerationTrace,
}

//! Pipeline Progress - Ordered stage tracking with weighted completion

use crate::error::{PipelineError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::fmt;

/// Pipeline states, in the only order they may be entered
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineStage {
    Validation,
    SchemaRetrieval,
    SqlGeneration,
    QueryExecution,
    DataValidation,
    ChartGeneration,
    InsightsGeneration,
    NarrationSynthesis,
    ResultCombination,
    Complete,
}

impl PipelineStage {
    pub const ALL: [PipelineStage; 10] = [
        PipelineStage::Validation,
        PipelineStage::SchemaRetrieval,
        PipelineStage::SqlGeneration,
        PipelineStage::QueryExecution,
        PipelineStage::DataValidation,
        PipelineStage::ChartGeneration,
        PipelineStage::InsightsGeneration,
        PipelineStage::NarrationSynthesis,
        PipelineStage::ResultCombination,
        PipelineStage::Complete,
    ];

    /// Share of overall progress this stage accounts for (sums to 100)
    pub fn weight(&self) -> u8 {
        match self {
            PipelineStage::Validation => 5,
            PipelineStage::SchemaRetrieval => 10,
            PipelineStage::SqlGeneration => 15,
            PipelineStage::QueryExecution => 20,
            PipelineStage::DataValidation => 10,
            PipelineStage::ChartGeneration => 15,
            PipelineStage::InsightsGeneration => 15,
            PipelineStage::NarrationSynthesis => 5,
            PipelineStage::ResultCombination => 5,
            PipelineStage::Complete => 0,
        }
    }

    pub fn index(&self) -> usize {
        *self as usize
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PipelineStage::Validation => "validation",
            PipelineStage::SchemaRetrieval => "schema_retrieval",
            PipelineStage::SqlGeneration => "sql_generation",
            PipelineStage::QueryExecution => "query_execution",
            PipelineStage::DataValidation => "data_validation",
            PipelineStage::ChartGeneration => "chart_generation",
            PipelineStage::InsightsGeneration => "insights_generation",
            PipelineStage::NarrationSynthesis => "narration_synthesis",
            PipelineStage::ResultCombination => "result_combination",
            PipelineStage::Complete => "complete",
        }
    }

    /// Stages whose failure ends the pipeline
    pub fn is_critical(&self) -> bool {
        matches!(
            self,
            PipelineStage::Validation
                | PipelineStage::SqlGeneration
                | PipelineStage::QueryExecution
                | PipelineStage::DataValidation
        )
    }

    /// Cumulative percent once this stage has been entered
    fn cumulative_percent(&self) -> u8 {
        PipelineStage::ALL[..=self.index()]
            .iter()
            .map(PipelineStage::weight)
            .sum()
    }
}

impl fmt::Display for PipelineStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-invocation progress snapshot, handed to callbacks by value
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PipelineProgress {
    pub stage: PipelineStage,

    /// 0-100
    pub progress_percent: u8,

    pub current_step: String,

    /// Steps of the stages already left behind, oldest first
    pub completed_steps: Vec<String>,

    pub started_at: DateTime<Utc>,

    pub stage_started_at: Option<DateTime<Utc>>,

    pub metadata: HashMap<String, Value>,
}

impl PipelineProgress {
    /// Fresh progress at `validation`, 0% until the first advance
    pub fn new() -> Self {
        Self {
            stage: PipelineStage::Validation,
            progress_percent: 0,
            current_step: "Validating input".to_string(),
            completed_steps: Vec::new(),
            started_at: Utc::now(),
            stage_started_at: None,
            metadata: HashMap::new(),
        }
    }

    /// Move to `stage` (or stay on the current one) and record `step`
    ///
    /// Only the current stage or the one directly after it is accepted.
    pub fn advance(
        &mut self,
        stage: PipelineStage,
        step: impl Into<String>,
        metadata: Option<HashMap<String, Value>>,
    ) -> Result<()> {
        let current = self.stage.index();
        let next = stage.index();
        let entering_first = self.stage_started_at.is_none() && stage == self.stage;

        if next < current || next > current + 1 {
            return Err(PipelineError::InvalidTransition {
                from: self.stage.to_string(),
                to: stage.to_string(),
            });
        }

        let now = Utc::now();
        if next == current + 1 {
            if let Some(stage_started) = self.stage_started_at {
                let elapsed = (now - stage_started).num_milliseconds().max(0);
                self.metadata
                    .insert(format!("{}_duration", self.stage), json!(elapsed));
            }
            let finished_step = std::mem::take(&mut self.current_step);
            self.completed_steps.push(finished_step);
            self.stage = stage;
            self.stage_started_at = Some(now);
            self.progress_percent = stage.cumulative_percent();
        } else if entering_first {
            self.stage_started_at = Some(now);
            self.progress_percent = stage.cumulative_percent();
        }

        self.current_step = step.into();
        if let Some(extra) = metadata {
            self.metadata.extend(extra);
        }
        Ok(())
    }

    pub fn is_complete(&self) -> bool {
        self.stage == PipelineStage::Complete
    }
}

impl Default for PipelineProgress {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_weights_total_100() {
        let total: u32 = PipelineStage::ALL.iter().map(|s| s.weight() as u32).sum();
        assert_eq!(total, 100);
    }

    #[test]
    fn test_full_walk_is_monotonic() {
        let mut progress = PipelineProgress::new();
        let mut last = 0;
        for stage in PipelineStage::ALL {
            progress.advance(stage, format!("step {}", stage), None).unwrap();
            assert!(progress.progress_percent >= last);
            last = progress.progress_percent;
        }
        assert!(progress.is_complete());
        assert_eq!(progress.progress_percent, 100);
        assert_eq!(progress.completed_steps.len(), 9);
        assert!(progress.metadata.contains_key("validation_duration"));
        assert!(progress.metadata.contains_key("result_combination_duration"));
    }

    #[test]
    fn test_backward_and_skip_rejected() {
        let mut progress = PipelineProgress::new();
        progress.advance(PipelineStage::Validation, "v", None).unwrap();
        progress.advance(PipelineStage::SchemaRetrieval, "s", None).unwrap();

        let err = progress.advance(PipelineStage::Validation, "back", None).unwrap_err();
        assert!(matches!(err, PipelineError::InvalidTransition { .. }));
        assert!(progress.advance(PipelineStage::QueryExecution, "skip", None).is_err());
        assert_eq!(progress.stage, PipelineStage::SchemaRetrieval);
        assert_eq!(progress.current_step, "s");
    }

    #[test]
    fn test_same_stage_updates_step_and_metadata() {
        let mut progress = PipelineProgress::new();
        progress.advance(PipelineStage::Validation, "first", None).unwrap();
        let mut extra = HashMap::new();
        extra.insert("note".to_string(), json!("x"));
        progress.advance(PipelineStage::Validation, "second", Some(extra)).unwrap();
        assert_eq!(progress.current_step, "second");
        assert!(progress.completed_steps.is_empty());
        assert_eq!(progress.metadata["note"], json!("x"));
        assert_eq!(progress.progress_percent, 5);
    }

    #[test]
    fn test_stage_serializes_snake_case() {
        assert_eq!(
            serde_json::to_value(PipelineStage::InsightsGeneration).unwrap(),
            json!("insights_generation")
        );
    }
}

//! Workflow Result - The single payload returned by `execute_workflow`

use super::progress::PipelineProgress;
use crate::error::PipelineError;
use crate::execution::QueryResult;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WorkflowResult {
    pub success: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sql_query: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub query_result: Option<QueryResult>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chart_config: Option<Value>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chart_data: Option<Value>,

    #[serde(default)]
    pub insights: Vec<Value>,

    #[serde(default)]
    pub recommendations: Vec<Value>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub narration: Option<String>,

    #[serde(default)]
    pub metadata: HashMap<String, Value>,

    /// Progress at the moment the workflow ended
    pub progress: PipelineProgress,

    /// Internal error text, for logs and operators
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    /// End-user safe explanation of a failure
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_message: Option<String>,

    /// The data source itself is unusable
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub critical_failure: Option<bool>,

    /// The pipeline stopped early but the generated SQL is returned
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub partial_success: Option<bool>,
}

impl WorkflowResult {
    /// Failure payload carrying the progress reached so far
    pub fn failure(error: &PipelineError, progress: PipelineProgress) -> Self {
        Self {
            success: false,
            sql_query: None,
            query_result: None,
            chart_config: None,
            chart_data: None,
            insights: Vec::new(),
            recommendations: Vec::new(),
            narration: None,
            metadata: HashMap::new(),
            progress,
            error: Some(error.to_string()),
            user_message: Some(error.user_message().to_string()),
            critical_failure: None,
            partial_success: None,
        }
    }

    pub fn with_metadata(mut self, metadata: HashMap<String, Value>) -> Self {
        self.metadata.extend(metadata);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_failure_skips_empty_fields() {
        let result = WorkflowResult::failure(&PipelineError::NoRows, PipelineProgress::new());
        let value = serde_json::to_value(&result).unwrap();
        assert_eq!(value["success"], false);
        assert!(value.get("sql_query").is_none());
        assert!(value.get("critical_failure").is_none());
        assert!(value["user_message"].as_str().unwrap().contains("no rows"));
        assert_ne!(value["error"], value["user_message"]);
    }
}

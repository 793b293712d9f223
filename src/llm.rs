//! LLM completion contract
//!
//! The concrete client (provider SDK, HTTP, local model) lives outside this
//! crate and implements `LlmCompletion`.

use crate::error::{PipelineError, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Instant;
use tracing::warn;

/// Why a completion is requested. Lets clients route or log per purpose
/// and lets recorded fixtures answer the right call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompletionPurpose {
    /// Chart + insights + recommendations + summary in one call
    Unified,
    Chart,
    Insights,
    Narration,
}

impl CompletionPurpose {
    pub fn as_str(&self) -> &'static str {
        match self {
            CompletionPurpose::Unified => "unified",
            CompletionPurpose::Chart => "chart",
            CompletionPurpose::Insights => "insights",
            CompletionPurpose::Narration => "narration",
        }
    }
}

impl fmt::Display for CompletionPurpose {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletionRequest {
    pub prompt: String,
    pub system_context: String,
    pub max_tokens: u32,
    pub temperature: f32,
    pub purpose: CompletionPurpose,
}

/// LLM completion service
#[async_trait]
pub trait LlmCompletion: Send + Sync {
    /// One request/response round trip. Returns the raw completion text.
    async fn generate_completion(&self, request: CompletionRequest) -> Result<String>;
}

/// One completion round trip, as recorded in workflow metadata
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LlmCallRecord {
    pub purpose: CompletionPurpose,
    pub success: bool,
    pub duration_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Run one completion and time it. Blank completions count as failures.
pub async fn timed_completion(
    llm: &dyn LlmCompletion,
    request: CompletionRequest,
) -> (Result<String>, LlmCallRecord) {
    let purpose = request.purpose;
    let started = Instant::now();
    let outcome = match llm.generate_completion(request).await {
        Ok(content) if content.trim().is_empty() => {
            Err(PipelineError::Llm(format!("empty {} completion", purpose)))
        }
        other => other,
    };
    let record = LlmCallRecord {
        purpose,
        success: outcome.is_ok(),
        duration_ms: started.elapsed().as_millis() as u64,
        error: outcome.as_ref().err().map(|e| e.to_string()),
    };
    if let Err(e) = &outcome {
        warn!("{} completion failed: {}", purpose, e);
    }
    (outcome, record)
}

//! Pipeline Module - Staged workflow orchestration
//!
//! - WorkflowOrchestrator drives one question through every stage
//! - PipelineProgress tracks the ordered stages and their weights
//! - ErrorClassifier separates critical execution failures from SQL problems
//! - WorkflowResult is the payload handed back to callers

pub mod classifier;
pub mod orchestrator;
pub mod progress;
pub mod result;

pub use classifier::{ErrorClassifier, ExecutionErrorClass, CRITICAL_EXECUTION_KEYWORDS};
pub use orchestrator::{NarrationSource, ProgressCallback, WorkflowOrchestrator};
pub use progress::{PipelineProgress, PipelineStage};
pub use result::WorkflowResult;

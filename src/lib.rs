pub mod cache;
pub mod collaborators;
pub mod config;
pub mod error;
pub mod execution;
pub mod generation;
pub mod intent;
pub mod json_repair;
pub mod llm;
pub mod normalizer;
pub mod observability;
pub mod pipeline;
pub mod replay;

pub use cache::{PipelineCaches, TtlCache};
pub use collaborators::{AgentContext, SchemaProvider, SqlGenerator};
pub use config::PipelineConfig;
pub use error::{ErrorKind, PipelineError, Result};
pub use execution::{DataSource, EngineResponse, ExecutionOptions, QueryExecutor, QueryResult};
pub use generation::{GenerationMethod, GenerationResult};
pub use intent::QueryIntent;
pub use llm::{CompletionPurpose, CompletionRequest, LlmCompletion};
pub use pipeline::{PipelineProgress, PipelineStage, ProgressCallback, WorkflowOrchestrator, WorkflowResult};

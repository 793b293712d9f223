use crate::json_repair::ParseError;
use thiserror::Error;

/// How the orchestrator reacts to an error raised inside a stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Terminates the pipeline with a failure payload
    Fatal,
    /// Triggers the next fallback and is recorded as a warning
    Recoverable,
    /// Logged only
    Informational,
}

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Schema retrieval error: {0}")]
    Schema(String),

    #[error("SQL generation error: {0}")]
    SqlGeneration(String),

    #[error("Execution error: {message}")]
    Execution { message: String, critical: bool },

    #[error("Query returned no rows")]
    NoRows,

    #[error("Data validation error: {0}")]
    DataValidation(String),

    #[error("LLM error: {0}")]
    Llm(String),

    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error("Invalid stage transition from {from} to {to}")]
    InvalidTransition { from: String, to: String },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl PipelineError {
    /// Execution failure reported by a query collaborator. Criticality is
    /// decided later by the orchestrator's classifier.
    pub fn execution(message: impl Into<String>) -> Self {
        PipelineError::Execution {
            message: message.into(),
            critical: false,
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            PipelineError::InvalidInput(_)
            | PipelineError::SqlGeneration(_)
            | PipelineError::Execution { .. }
            | PipelineError::NoRows
            | PipelineError::DataValidation(_)
            | PipelineError::InvalidTransition { .. }
            | PipelineError::Config(_)
            | PipelineError::Io(_) => ErrorKind::Fatal,
            PipelineError::Schema(_) | PipelineError::Llm(_) | PipelineError::Parse(_) => {
                ErrorKind::Recoverable
            }
            PipelineError::Json(_) => ErrorKind::Informational,
        }
    }

    /// Message safe to show to an end user. Never carries internal detail.
    pub fn user_message(&self) -> &'static str {
        match self {
            PipelineError::InvalidInput(_) => {
                "Please provide a question and select a data source."
            }
            PipelineError::SqlGeneration(_) => {
                "I couldn't translate your question into a query. Try rephrasing it or naming the fields you're interested in."
            }
            PipelineError::Execution { critical: true, .. } => {
                "The data source could not be accessed. Check that it is connected and that you have permission to query it."
            }
            PipelineError::Execution { critical: false, .. } => {
                "The generated query could not be run. The SQL is included so you can review or adjust it."
            }
            PipelineError::NoRows => {
                "The query ran successfully but returned no rows. Try broadening your filters or time range."
            }
            PipelineError::DataValidation(_) => {
                "The query result was not in a format that can be analyzed."
            }
            _ => "Something went wrong while analyzing your question. Please try again.",
        }
    }
}

pub type Result<T> = std::result::Result<T, PipelineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_execution_errors_are_fatal() {
        let err = PipelineError::execution("syntax error at or near SELECT");
        assert_eq!(err.kind(), ErrorKind::Fatal);
        assert!(err.to_string().contains("syntax error"));
    }

    #[test]
    fn test_generation_errors_are_recoverable() {
        assert_eq!(PipelineError::Llm("timeout".into()).kind(), ErrorKind::Recoverable);
        assert_eq!(PipelineError::Schema("down".into()).kind(), ErrorKind::Recoverable);
    }

    #[test]
    fn test_user_message_hides_internal_detail() {
        let err = PipelineError::SqlGeneration("model returned: <internal trace>".into());
        assert!(!err.user_message().contains("internal trace"));
        assert_ne!(err.user_message(), err.to_string());
    }
}

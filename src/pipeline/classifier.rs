//! Execution Error Classifier
//!
//! Decides whether a query execution failure is critical (the data source
//! itself is unusable) or a problem with the generated SQL that still lets
//! the caller see a partial result.

use crate::error::PipelineError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Lowercased substrings that make an execution error critical
pub const CRITICAL_EXECUTION_KEYWORDS: &[&str] = &[
    "data source",
    "datasource",
    "schema",
    "table",
    "connection",
    "permission",
];

/// Coarse taxonomy for logging and metadata
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionErrorClass {
    Permission,
    Connection,
    MissingObject,
    Syntax,
    Timeout,
    Other,
}

impl fmt::Display for ExecutionErrorClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ExecutionErrorClass::Permission => "permission",
            ExecutionErrorClass::Connection => "connection",
            ExecutionErrorClass::MissingObject => "missing_object",
            ExecutionErrorClass::Syntax => "syntax",
            ExecutionErrorClass::Timeout => "timeout",
            ExecutionErrorClass::Other => "other",
        };
        f.write_str(name)
    }
}

/// Execution error classifier
#[derive(Debug, Default, Clone, Copy)]
pub struct ErrorClassifier;

impl ErrorClassifier {
    pub fn new() -> Self {
        Self
    }

    /// True when any critical keyword appears in the message
    pub fn is_critical(&self, message: &str) -> bool {
        let lowered = message.to_lowercase();
        CRITICAL_EXECUTION_KEYWORDS
            .iter()
            .any(|keyword| lowered.contains(keyword))
    }

    pub fn classify(&self, message: &str) -> ExecutionErrorClass {
        let msg = message.to_lowercase();

        if msg.contains("permission") || msg.contains("denied") || msg.contains("not authorized") {
            return ExecutionErrorClass::Permission;
        }

        if msg.contains("connection") || msg.contains("unreachable") || msg.contains("refused") {
            return ExecutionErrorClass::Connection;
        }

        if (msg.contains("table") || msg.contains("schema") || msg.contains("data source") || msg.contains("datasource"))
            && (msg.contains("not found") || msg.contains("does not exist") || msg.contains("unknown"))
        {
            return ExecutionErrorClass::MissingObject;
        }

        if msg.contains("syntax") || msg.contains("parse error") || msg.contains("unexpected token") {
            return ExecutionErrorClass::Syntax;
        }

        if msg.contains("timeout") || msg.contains("timed out") {
            return ExecutionErrorClass::Timeout;
        }

        ExecutionErrorClass::Other
    }

    /// Execution error carrying the critical flag
    pub fn to_error(&self, message: &str) -> PipelineError {
        PipelineError::Execution {
            message: message.to_string(),
            critical: self.is_critical(message),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_permission_is_critical() {
        let classifier = ErrorClassifier::new();
        assert!(classifier.is_critical("ERROR: Permission denied for relation orders"));
        assert_eq!(
            classifier.classify("ERROR: Permission denied for relation orders"),
            ExecutionErrorClass::Permission
        );
    }

    #[test]
    fn test_syntax_error_is_not_critical() {
        let classifier = ErrorClassifier::new();
        let err = classifier.to_error("syntax error at or near \"FORM\"");
        assert!(matches!(err, PipelineError::Execution { critical: false, .. }));
        assert_eq!(
            classifier.classify("syntax error at or near \"FORM\""),
            ExecutionErrorClass::Syntax
        );
    }

    #[test]
    fn test_missing_table_is_critical() {
        let classifier = ErrorClassifier::new();
        assert!(classifier.is_critical("Table 'sales' does not exist"));
        assert_eq!(
            classifier.classify("Table 'sales' does not exist"),
            ExecutionErrorClass::MissingObject
        );
    }

    #[test]
    fn test_connection_keywords() {
        let classifier = ErrorClassifier::new();
        assert!(classifier.is_critical("DataSource unavailable"));
        assert!(classifier.is_critical("connection reset by peer"));
        assert!(!classifier.is_critical("division by zero"));
    }
}

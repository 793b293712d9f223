//! Query Executor Trait - Contract for the external multi-engine executor
//!
//! The concrete engines (warehouse drivers, embedded engines, federated
//! engines) live outside this crate. The pipeline only sees this trait.

use crate::error::Result;
use crate::execution::profile::QueryProfile;
use crate::execution::result::Row;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

/// Descriptor of the data source a query runs against
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DataSource {
    pub id: String,

    /// Backend type (e.g., "postgresql", "duckdb", "csv"), if known
    #[serde(default)]
    pub source_type: Option<String>,

    /// Additional backend-specific properties
    #[serde(default)]
    pub properties: HashMap<String, Value>,
}

impl DataSource {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            source_type: None,
            properties: HashMap::new(),
        }
    }

    /// Build a descriptor from the source schema, which may carry the backend
    /// type under `source_type` or `type`.
    pub fn from_schema(id: &str, schema: &Value) -> Self {
        let source_type = schema
            .get("source_type")
            .or_else(|| schema.get("type"))
            .and_then(Value::as_str)
            .map(str::to_string);
        Self {
            id: id.to_string(),
            source_type,
            properties: HashMap::new(),
        }
    }
}

/// Optimization hints handed to the executor
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ExecutionOptions {
    /// Characteristics of the SQL, for engine selection
    pub profile: QueryProfile,

    /// Row limit (None = engine default)
    pub row_limit: Option<usize>,
}

/// Rows produced by an engine
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EngineResponse {
    pub data: Vec<Row>,

    /// Engine that executed the query
    pub engine: String,
}

/// Query executor trait - implemented by the surrounding system
#[async_trait]
pub trait QueryExecutor: Send + Sync {
    /// Execute SQL against a data source. Failures should be reported as
    /// `PipelineError::Execution` carrying the engine's message.
    async fn execute_query(
        &self,
        sql: &str,
        data_source: &DataSource,
        options: &ExecutionOptions,
    ) -> Result<EngineResponse>;
}

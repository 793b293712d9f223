//! Query Result - Standardized result and transformation metadata

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashMap;

/// One result row; key order is the column order reported by the engine
pub type Row = Map<String, Value>;

/// Standardized query result from the execution adapter
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct QueryResult {
    /// Success status
    pub success: bool,

    /// Result rows
    pub data: Vec<Row>,

    /// Column names, taken from the first row
    pub columns: Vec<String>,

    /// Number of rows returned
    pub row_count: usize,

    /// Engine that produced the rows ("cache" on a cache hit)
    pub engine: String,

    /// Error reported by the executor, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    /// Whether the rows came from the query-result cache
    #[serde(default)]
    pub cached: bool,
}

impl QueryResult {
    /// Create a successful result. Columns always come from the first row's
    /// keys, so an empty result has no columns.
    pub fn success(data: Vec<Row>, engine: impl Into<String>) -> Self {
        let columns = data
            .first()
            .map(|row| row.keys().cloned().collect())
            .unwrap_or_default();
        Self {
            success: true,
            row_count: data.len(),
            data,
            columns,
            engine: engine.into(),
            error: None,
            cached: false,
        }
    }

    /// Create an error result
    pub fn error(engine: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            success: false,
            data: Vec::new(),
            columns: Vec::new(),
            row_count: 0,
            engine: engine.into(),
            error: Some(error.into()),
            cached: false,
        }
    }

    pub fn shape(&self) -> DataShape {
        DataShape {
            rows: self.row_count,
            columns: self.columns.len(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct DataShape {
    pub rows: usize,
    pub columns: usize,
}

/// Record of one data-transforming stage. Built once, never mutated.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TransformationMetadata {
    pub operation: String,
    pub input_shape: DataShape,
    pub output_shape: DataShape,
    pub execution_time_ms: u64,
    pub engine_used: String,
    pub rows_processed: usize,
    pub columns_processed: usize,
    pub transformations_applied: Vec<String>,
    pub metadata: HashMap<String, Value>,
}

impl TransformationMetadata {
    /// Metadata for a stage that produced nothing (failed execution)
    pub fn empty(operation: &str, engine_used: &str, execution_time_ms: u64) -> Self {
        Self {
            operation: operation.to_string(),
            input_shape: DataShape::default(),
            output_shape: DataShape::default(),
            execution_time_ms,
            engine_used: engine_used.to_string(),
            rows_processed: 0,
            columns_processed: 0,
            transformations_applied: Vec::new(),
            metadata: HashMap::new(),
        }
    }
}

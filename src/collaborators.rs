//! Collaborator contracts for SQL generation and schema lookup

use crate::error::Result;
use crate::intent::QueryIntent;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

/// Caller-supplied context for one workflow invocation
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AgentContext {
    #[serde(default)]
    pub user_id: Option<String>,

    #[serde(default)]
    pub conversation_id: Option<String>,

    /// Intent inferred upstream; inferred locally when absent
    #[serde(default)]
    pub query_intent: Option<QueryIntent>,

    /// Anything else the SQL generator may use (prior turns, preferences)
    #[serde(default)]
    pub extra: HashMap<String, Value>,
}

/// Natural language to SQL
#[async_trait]
pub trait SqlGenerator: Send + Sync {
    async fn generate_sql(
        &self,
        nl_query: &str,
        data_source_id: &str,
        context: &AgentContext,
        schema: &Value,
    ) -> Result<String>;
}

/// Source schema lookup (tables, columns, types)
#[async_trait]
pub trait SchemaProvider: Send + Sync {
    async fn get_source_schema(&self, data_source_id: &str) -> Result<Value>;
}

//! Execution Module - Query execution behind a cache-aware adapter
//!
//! - QueryExecutor trait for the external multi-engine executor
//! - QueryProfile for query characterization
//! - QueryExecutionAdapter for caching and metadata

pub mod adapter;
pub mod engine;
pub mod profile;
pub mod result;

pub use adapter::QueryExecutionAdapter;
pub use engine::{DataSource, EngineResponse, ExecutionOptions, QueryExecutor};
pub use profile::QueryProfile;
pub use result::{DataShape, QueryResult, Row, TransformationMetadata};

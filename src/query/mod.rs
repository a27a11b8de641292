//! Query execution for pgmatrix.
//!
//! Validates query text, runs it inside a nested scope and hands the raw
//! result to the materializer.

pub mod executor;
mod request;

pub use executor::{ScopeGuard, ScopedQueryExecutor};
pub use request::{verify_query_text, QueryRequest};

use crate::config::ExecutionConfig;

/// The calling procedure's settings that apply to every query it runs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcedureContext {
    /// Name used in logs.
    pub name: String,
    /// Refuse statements that modify data or schema.
    pub read_only: bool,
}

impl From<&ExecutionConfig> for ProcedureContext {
    fn from(config: &ExecutionConfig) -> Self {
        Self {
            name: config.procedure.clone(),
            read_only: config.read_only,
        }
    }
}

//! Query engine abstraction layer for pgmatrix.
//!
//! Provides a trait-based interface over the host database, allowing the
//! PostgreSQL engine and the in-memory engine to be used interchangeably by
//! the scoped executor.

mod mock;
mod numeric;
mod postgres;
pub mod status;
mod types;

pub use mock::{MockEngine, ScopeEvent};
pub use postgres::PostgresEngine;
pub use types::{ColumnMeta, RawResultSet, Row, TupleDescriptor, TupleTable, Value};

use crate::config::ConnectionConfig;
use crate::error::{MatrixError, Result};
use crate::safety::StatementType;
use async_trait::async_trait;
use std::sync::Arc;

/// Lock held by a scope from begin until commit, abort or drop.
pub type ScopeGate = Arc<tokio::sync::Mutex<()>>;

/// Supported database backends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DatabaseBackend {
    #[default]
    Postgres,
}

impl DatabaseBackend {
    /// Returns the backend as a string.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Postgres => "postgres",
        }
    }

    /// Parses a backend from a string.
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "postgres" | "postgresql" => Some(Self::Postgres),
            _ => None,
        }
    }

    /// Returns the default port for this backend.
    pub fn default_port(&self) -> u16 {
        match self {
            Self::Postgres => 5432,
        }
    }
}

/// Creates a query engine for the given backend and configuration.
pub async fn connect(config: &ConnectionConfig) -> Result<Box<dyn QueryEngine>> {
    match config.backend {
        DatabaseBackend::Postgres => {
            let engine = PostgresEngine::connect(config).await?;
            Ok(Box::new(engine))
        }
    }
}

/// Interface to the host query engine.
///
/// Nested scopes nest: every `begin_nested_scope` must be matched by exactly
/// one of `commit_nested_scope`, `abort_nested_scope` or
/// `abandon_nested_scope`, innermost first. Concurrent callers take the
/// engine's [`ScopeGate`] for the whole life of a scope, so their scopes never
/// interleave on the shared stack.
#[async_trait]
pub trait QueryEngine: Send + Sync {
    /// Gate serializing whole scopes across callers sharing this engine.
    fn scope_gate(&self) -> &ScopeGate;

    /// Opens a nested transactional scope inside the current transaction.
    async fn begin_nested_scope(&self) -> Result<()>;

    /// Runs one query inside the innermost open scope.
    ///
    /// Errors raised by the engine while running the statement come back as
    /// `Err`. Statements the engine refuses without running them come back as
    /// `Ok` with a negative status.
    async fn submit(&self, sql: &str, read_only: bool, row_limit: u64) -> Result<RawResultSet>;

    /// Closes the innermost scope, keeping its effects.
    async fn commit_nested_scope(&self) -> Result<()>;

    /// Closes the innermost scope, reverting its effects.
    async fn abort_nested_scope(&self) -> Result<()>;

    /// Reverts the innermost scope from a context that cannot await
    /// (destructors). Engines that need I/O may defer the rollback until their
    /// next call, but must perform it before running anything else.
    fn abandon_nested_scope(&self);

    /// Returns the symbolic name of a status code.
    fn result_code_to_string(&self, status: i32) -> String {
        status::result_code_to_string(status)
    }

    /// Finishes the host transaction and releases the connection.
    async fn close(&self) -> Result<()>;
}

/// Error raised by an engine for a statement a read-only execution may not run.
pub(crate) fn read_only_violation(statement: &StatementType) -> MatrixError {
    MatrixError::query(format!(
        "{} is not allowed in a read-only execution",
        statement.last()
    ))
}

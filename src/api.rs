//! Caller-facing entry points.
//!
//! A [`MatrixSession`] pairs a query engine with the procedure context that
//! queries run under. Both entry points verify their input before the engine
//! is touched.

use std::sync::Arc;

use crate::config::ExecutionConfig;
use crate::db::{QueryEngine, Value};
use crate::error::{MatrixError, Result};
use crate::matrix::MatrixResult;
use crate::query::{ProcedureContext, QueryRequest, ScopedQueryExecutor};

const BAD_ARGUMENTS: &str = "execute expected a query or a plan";

/// An engine plus the procedure context queries run under.
pub struct MatrixSession {
    engine: Arc<dyn QueryEngine>,
    procedure: ProcedureContext,
}

impl MatrixSession {
    pub fn new(engine: Arc<dyn QueryEngine>, procedure: ProcedureContext) -> Self {
        Self { engine, procedure }
    }

    /// Creates a session using the `[execution]` settings.
    pub fn with_config(engine: Arc<dyn QueryEngine>, config: &ExecutionConfig) -> Self {
        Self::new(engine, ProcedureContext::from(config))
    }

    pub fn engine(&self) -> &dyn QueryEngine {
        self.engine.as_ref()
    }

    pub fn procedure(&self) -> &ProcedureContext {
        &self.procedure
    }

    /// Finishes the host transaction.
    pub async fn close(&self) -> Result<()> {
        self.engine.close().await
    }
}

/// Runs `query` and returns its result as a matrix.
///
/// `row_limit == 0` fetches every row. Query bytes must be valid UTF-8 with no
/// NUL byte; otherwise no scope is opened.
pub async fn execute_as_matrix(
    session: &MatrixSession,
    query: impl AsRef<[u8]>,
    row_limit: u64,
) -> Result<MatrixResult> {
    let request = QueryRequest::from_bytes(query, row_limit)?;
    ScopedQueryExecutor::new(session.engine(), session.procedure())
        .execute(&request)
        .await
}

/// Dynamic form of [`execute_as_matrix`] taking `(text)` or `(text, limit)`.
pub async fn execute_toarray(session: &MatrixSession, args: &[Value]) -> Result<MatrixResult> {
    let (query, row_limit) = parse_call_args(args)?;
    execute_as_matrix(session, query, row_limit).await
}

fn parse_call_args(args: &[Value]) -> Result<(&str, u64)> {
    let (query, limit) = match args {
        [Value::String(query)] => (query, 0),
        [Value::String(query), Value::Int(limit)] => (query, *limit),
        _ => return Err(MatrixError::arguments(BAD_ARGUMENTS)),
    };
    let limit = u64::try_from(limit).map_err(|_| MatrixError::arguments(BAD_ARGUMENTS))?;
    Ok((query.as_str(), limit))
}

//! Scoped query execution.
//!
//! Every query runs inside its own nested scope. The scope is committed when
//! the statement and its materialization succeed and rolled back on every
//! other path, including dropped futures and panics.

use std::time::Instant;
use tokio::sync::OwnedMutexGuard;
use tracing::{debug, info, warn};

use super::{ProcedureContext, QueryRequest};
use crate::db::QueryEngine;
use crate::error::{MatrixError, Result};
use crate::matrix::{materialize, MatrixResult};

/// An open nested scope. Rolls back on drop unless committed or aborted.
///
/// The guard holds the engine's scope gate until it is consumed or dropped,
/// so another caller on the same engine waits rather than opening a scope
/// on top of this one.
pub struct ScopeGuard<'a> {
    engine: &'a dyn QueryEngine,
    armed: bool,
    // Released after `Drop::drop` has abandoned the scope.
    _gate: OwnedMutexGuard<()>,
}

impl<'a> ScopeGuard<'a> {
    /// Opens a nested scope on `engine`, waiting for any scope another
    /// caller holds on it.
    pub async fn begin(engine: &'a dyn QueryEngine) -> Result<Self> {
        let gate = engine.scope_gate().clone().lock_owned().await;
        engine.begin_nested_scope().await?;
        debug!("Nested scope opened");
        Ok(Self {
            engine,
            armed: true,
            _gate: gate,
        })
    }

    /// Releases the scope, keeping its effects. On failure the guard stays
    /// armed and the scope is rolled back when it drops.
    pub async fn commit(mut self) -> Result<()> {
        self.engine.commit_nested_scope().await?;
        self.armed = false;
        debug!("Nested scope committed");
        Ok(())
    }

    /// Rolls the scope back. A failed rollback is logged and left to `Drop`.
    pub async fn abort(mut self) {
        match self.engine.abort_nested_scope().await {
            Ok(()) => {
                self.armed = false;
                debug!("Nested scope rolled back");
            }
            Err(e) => warn!("Rolling back nested scope failed: {}", e),
        }
    }
}

impl Drop for ScopeGuard<'_> {
    fn drop(&mut self) {
        if self.armed {
            warn!("Nested scope left open, abandoning it");
            self.engine.abandon_nested_scope();
        }
    }
}

/// Runs queries for one procedure context.
pub struct ScopedQueryExecutor<'a> {
    engine: &'a dyn QueryEngine,
    procedure: &'a ProcedureContext,
}

impl<'a> ScopedQueryExecutor<'a> {
    /// Creates a new executor.
    pub fn new(engine: &'a dyn QueryEngine, procedure: &'a ProcedureContext) -> Self {
        Self { engine, procedure }
    }

    /// Runs `request` in a nested scope and returns its matrix result.
    ///
    /// The scope commits only if the statement succeeded and every row
    /// converted. Errors are returned after the scope has been rolled back.
    pub async fn execute(&self, request: &QueryRequest) -> Result<MatrixResult> {
        let start = Instant::now();
        let scope = ScopeGuard::begin(self.engine).await?;

        match self.run_in_scope(request).await {
            Ok(result) => {
                scope.commit().await?;
                info!(
                    procedure = %self.procedure.name,
                    status = result.status(),
                    rows = ?result.nrows(),
                    shape = ?result.shape(),
                    elapsed_ms = start.elapsed().as_millis() as u64,
                    "Query completed"
                );
                Ok(result)
            }
            Err(e) => {
                scope.abort().await;
                warn!(procedure = %self.procedure.name, "Query failed: {}", e);
                Err(e)
            }
        }
    }

    async fn run_in_scope(&self, request: &QueryRequest) -> Result<MatrixResult> {
        let raw = self
            .engine
            .submit(
                request.text(),
                self.procedure.read_only,
                request.row_limit(),
            )
            .await?;

        if raw.is_failure() {
            let name = self.engine.result_code_to_string(raw.status);
            return Err(MatrixError::spi(raw.status, &name));
        }

        debug!(
            "Engine returned status {} after {:?}",
            raw.status, raw.execution_time
        );
        materialize(raw)
    }
}

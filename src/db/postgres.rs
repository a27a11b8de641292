//! PostgreSQL query engine implementation.
//!
//! Provides the `PostgresEngine` struct that implements the `QueryEngine`
//! trait using sqlx. All statements run inside one host transaction held for
//! the life of the engine; nested scopes are savepoints inside it.

use crate::config::ConnectionConfig;
use crate::db::numeric::NumericF64;
use crate::db::{
    read_only_violation, ColumnMeta, QueryEngine, RawResultSet, Row, ScopeGate, TupleDescriptor,
    Value,
};
use crate::error::{MatrixError, Result};
use crate::safety::{classify_sql, ClassificationResult, StatementType};
use async_trait::async_trait;
use futures::future::BoxFuture;
use futures::TryStreamExt;
use sqlx::postgres::{PgConnection, PgPool, PgPoolOptions, PgRow};
use sqlx::{Column as SqlxColumn, Executor, Postgres, Row as SqlxRow, Transaction, TypeInfo};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{Mutex, MutexGuard};
use tracing::{debug, warn};

/// Maximum number of connection retry attempts.
const MAX_RETRY_ATTEMPTS: u32 = 3;

/// Base delay between retry attempts (doubles each retry).
const RETRY_BASE_DELAY_MS: u64 = 500;

/// Prefix of the savepoints backing nested scopes.
const SAVEPOINT_PREFIX: &str = "pgmatrix_scope";

/// Host transaction plus the savepoint stack inside it.
#[derive(Default)]
struct Session {
    tx: Option<Transaction<'static, Postgres>>,
    depth: usize,
}

impl Session {
    fn connection(&mut self) -> Result<&mut PgConnection> {
        match self.tx.as_mut() {
            Some(tx) if self.depth > 0 => Ok(&mut **tx),
            _ => Err(MatrixError::internal("no nested scope is open")),
        }
    }
}

/// PostgreSQL query engine.
pub struct PostgresEngine {
    pool: PgPool,
    session: Mutex<Session>,
    /// Scopes abandoned from a destructor, rolled back on the next call.
    pending_abandon: AtomicUsize,
    gate: ScopeGate,
}

impl std::fmt::Debug for PostgresEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PostgresEngine")
            .field("pool", &self.pool)
            .field(
                "pending_abandon",
                &self.pending_abandon.load(Ordering::SeqCst),
            )
            .finish()
    }
}

impl PostgresEngine {
    /// Creates an engine from an existing connection pool.
    pub fn from_pool(pool: PgPool) -> Self {
        Self {
            pool,
            session: Mutex::new(Session::default()),
            pending_abandon: AtomicUsize::new(0),
            gate: Arc::new(Mutex::new(())),
        }
    }

    /// Connects to the database, retrying transient failures with backoff.
    pub async fn connect(config: &ConnectionConfig) -> Result<Self> {
        let conn_str = config.to_connection_string()?;

        let mut last_error = None;
        let mut delay = Duration::from_millis(RETRY_BASE_DELAY_MS);

        for attempt in 1..=MAX_RETRY_ATTEMPTS {
            debug!("Connection attempt {} of {}", attempt, MAX_RETRY_ATTEMPTS);

            let result = PgPoolOptions::new()
                .max_connections(1)
                .acquire_timeout(Duration::from_secs(10))
                .connect(&conn_str)
                .await;

            match result {
                Ok(pool) => {
                    debug!("Successfully connected to database");
                    return Ok(Self::from_pool(pool));
                }
                Err(e) => {
                    let is_transient = is_transient_error(&e);
                    last_error = Some(e);

                    if attempt < MAX_RETRY_ATTEMPTS && is_transient {
                        warn!(
                            "Connection attempt {} failed (transient error), retrying in {:?}",
                            attempt, delay
                        );
                        tokio::time::sleep(delay).await;
                        delay *= 2;
                    } else {
                        break;
                    }
                }
            }
        }

        Err(match last_error {
            Some(e) => map_connection_error(e, config),
            None => MatrixError::connection("no connection attempt was made"),
        })
    }

    /// Locks the session and rolls back any scopes abandoned since the last call.
    fn session(&self) -> BoxFuture<'_, Result<MutexGuard<'_, Session>>> {
        Box::pin(async move {
            let mut session = self.session.lock().await;

            // One at a time, so a failed rollback leaves the rest pending and
            // `depth` in step with the server.
            while self.pending_abandon.load(Ordering::SeqCst) > 0 {
                let depth = session.depth;
                if depth == 0 {
                    warn!("Abandoned scope with no open savepoint");
                    self.pending_abandon.store(0, Ordering::SeqCst);
                    break;
                }
                let conn = session.connection()?;
                rollback_savepoint(conn, depth).await?;
                session.depth -= 1;
                self.pending_abandon.fetch_sub(1, Ordering::SeqCst);
                debug!("Rolled back abandoned scope at depth {}", depth);
            }

            Ok(session)
        })
    }

    async fn fetch_rows(
        conn: &mut PgConnection,
        sql: &str,
        status: i32,
        row_limit: u64,
    ) -> Result<RawResultSet> {
        let mut descriptor = None;
        let mut rows: Vec<Row> = Vec::new();

        {
            let mut stream = sqlx::query(sql).fetch(&mut *conn);
            while let Some(row) = stream
                .try_next()
                .await
                .map_err(|e| MatrixError::query(format_query_error(e)))?
            {
                if descriptor.is_none() {
                    descriptor = Some(describe_row(&row));
                }
                rows.push(convert_row(&row));
                if row_limit > 0 && rows.len() as u64 >= row_limit {
                    break;
                }
            }
        }

        let descriptor = match descriptor {
            Some(d) => d,
            // No rows: the descriptor still defines the matrix width.
            None => describe_statement(conn, sql).await?,
        };

        Ok(RawResultSet::with_rows(status, descriptor, rows))
    }

    async fn run_command(conn: &mut PgConnection, sql: &str, status: i32) -> Result<RawResultSet> {
        let done = (&mut *conn)
            .execute(sqlx::raw_sql(sql))
            .await
            .map_err(|e| MatrixError::query(format_query_error(e)))?;
        Ok(RawResultSet::command(status, done.rows_affected()))
    }

    fn run<'a>(
        conn: &'a mut PgConnection,
        sql: &'a str,
        classification: &'a ClassificationResult,
        row_limit: u64,
    ) -> BoxFuture<'a, Result<RawResultSet>> {
        Box::pin(async move {
            let status = classification.status_code();

            if classification.returns_rows {
                return Self::fetch_rows(conn, sql, status, row_limit).await;
            }

            if *classification.statement_type.last() == StatementType::Unknown {
                // The server may accept syntax the classifier does not know.
                let descriptor = describe_statement(conn, sql).await?;
                if descriptor.natts() > 0 {
                    return Self::fetch_rows(conn, sql, status, row_limit).await;
                }
            }

            Self::run_command(conn, sql, status).await
        })
    }
}

#[async_trait]
impl QueryEngine for PostgresEngine {
    fn scope_gate(&self) -> &ScopeGate {
        &self.gate
    }

    async fn begin_nested_scope(&self) -> Result<()> {
        let mut session = self.session().await?;

        if session.tx.is_none() {
            let tx = self
                .pool
                .begin()
                .await
                .map_err(|e| MatrixError::connection(e.to_string()))?;
            session.tx = Some(tx);
        }

        let depth = session.depth + 1;
        if let Some(tx) = session.tx.as_mut() {
            (&mut **tx)
                .execute(sqlx::raw_sql(&format!(
                    "SAVEPOINT {SAVEPOINT_PREFIX}_{depth}"
                )))
                .await
                .map_err(|e| MatrixError::query(format_query_error(e)))?;
        }
        session.depth = depth;
        debug!("Opened savepoint at depth {}", depth);
        Ok(())
    }

    async fn submit(&self, sql: &str, read_only: bool, row_limit: u64) -> Result<RawResultSet> {
        let classification = classify_sql(sql);

        let refused = classification.status_code();
        if refused < 0 {
            debug!(
                "Refusing {} statement with status {}",
                classification.statement_type, refused
            );
            return Ok(RawResultSet::failure(refused));
        }

        if read_only && !classification.allowed_in_read_only() {
            return Err(read_only_violation(&classification.statement_type));
        }

        let mut session = self.session().await?;
        let conn = session.connection()?;

        let start = Instant::now();
        let raw = Self::run(conn, sql, &classification, row_limit).await?;
        Ok(raw.with_execution_time(start.elapsed()))
    }

    async fn commit_nested_scope(&self) -> Result<()> {
        let mut session = self.session().await?;
        let depth = session.depth;
        let conn = session.connection()?;
        (&mut *conn)
            .execute(sqlx::raw_sql(&format!(
                "RELEASE SAVEPOINT {SAVEPOINT_PREFIX}_{depth}"
            )))
            .await
            .map_err(|e| MatrixError::query(format_query_error(e)))?;
        session.depth -= 1;
        debug!("Released savepoint at depth {}", depth);
        Ok(())
    }

    async fn abort_nested_scope(&self) -> Result<()> {
        let mut session = self.session().await?;
        let depth = session.depth;
        let conn = session.connection()?;
        rollback_savepoint(conn, depth).await?;
        session.depth -= 1;
        debug!("Rolled back savepoint at depth {}", depth);
        Ok(())
    }

    fn abandon_nested_scope(&self) {
        self.pending_abandon.fetch_add(1, Ordering::SeqCst);
        debug!("Scope abandoned, rollback deferred to next engine call");
    }

    async fn close(&self) -> Result<()> {
        {
            let mut session = self.session().await?;
            if session.depth > 0 {
                warn!("Closing engine with {} open nested scopes", session.depth);
            }
            if let Some(tx) = session.tx.take() {
                tx.commit()
                    .await
                    .map_err(|e| MatrixError::query(format_query_error(e)))?;
            }
            session.depth = 0;
        }
        self.pool.close().await;
        Ok(())
    }
}

fn rollback_savepoint(conn: &mut PgConnection, depth: usize) -> BoxFuture<'_, Result<()>> {
    Box::pin(async move {
        let name = format!("{SAVEPOINT_PREFIX}_{depth}");
        (&mut *conn)
            .execute(sqlx::raw_sql(&format!(
                "ROLLBACK TO SAVEPOINT {name}; RELEASE SAVEPOINT {name}"
            )))
            .await
            .map_err(|e| MatrixError::query(format_query_error(e)))?;
        Ok(())
    })
}

/// Fetches column metadata for a statement without running it.
async fn describe_statement(conn: &mut PgConnection, sql: &str) -> Result<TupleDescriptor> {
    let described = (&mut *conn)
        .describe(sql)
        .await
        .map_err(|e| MatrixError::query(format_query_error(e)))?;

    Ok(described
        .columns()
        .iter()
        .map(|col| ColumnMeta::new(col.name(), col.type_info().name()))
        .collect())
}

fn describe_row(row: &PgRow) -> TupleDescriptor {
    row.columns()
        .iter()
        .map(|col| ColumnMeta::new(col.name(), col.type_info().name()))
        .collect()
}

/// Converts a sqlx PgRow to our Row type.
fn convert_row(row: &PgRow) -> Row {
    row.columns()
        .iter()
        .enumerate()
        .map(|(i, col)| convert_value(row, i, col.type_info().name()))
        .collect()
}

/// Converts a single column value from a PgRow to our Value type.
///
/// Values that fail to decode become NULL, which the matrix renders as NaN.
fn convert_value(row: &PgRow, index: usize, type_name: &str) -> Value {
    match type_name.to_uppercase().as_str() {
        "BOOL" | "BOOLEAN" => row
            .try_get::<Option<bool>, _>(index)
            .ok()
            .flatten()
            .map(Value::Bool)
            .unwrap_or(Value::Null),

        "INT2" | "SMALLINT" => row
            .try_get::<Option<i16>, _>(index)
            .ok()
            .flatten()
            .map(|v| Value::Int(v as i64))
            .unwrap_or(Value::Null),

        "INT4" | "INT" | "INTEGER" => row
            .try_get::<Option<i32>, _>(index)
            .ok()
            .flatten()
            .map(|v| Value::Int(v as i64))
            .unwrap_or(Value::Null),

        "INT8" | "BIGINT" => row
            .try_get::<Option<i64>, _>(index)
            .ok()
            .flatten()
            .map(Value::Int)
            .unwrap_or(Value::Null),

        "OID" => row
            .try_get::<Option<sqlx::postgres::types::Oid>, _>(index)
            .ok()
            .flatten()
            .map(|v| Value::Int(v.0 as i64))
            .unwrap_or(Value::Null),

        "FLOAT4" | "REAL" => row
            .try_get::<Option<f32>, _>(index)
            .ok()
            .flatten()
            .map(|v| Value::Float(v as f64))
            .unwrap_or(Value::Null),

        "FLOAT8" | "DOUBLE PRECISION" => row
            .try_get::<Option<f64>, _>(index)
            .ok()
            .flatten()
            .map(Value::Float)
            .unwrap_or(Value::Null),

        "NUMERIC" => row
            .try_get::<Option<NumericF64>, _>(index)
            .ok()
            .flatten()
            .map(|v| Value::Float(v.0))
            .unwrap_or(Value::Null),

        "BYTEA" => row
            .try_get::<Option<Vec<u8>>, _>(index)
            .ok()
            .flatten()
            .map(Value::Bytes)
            .unwrap_or(Value::Null),

        // For all other types, try to get as string
        _ => row
            .try_get::<Option<String>, _>(index)
            .ok()
            .flatten()
            .map(Value::String)
            .unwrap_or(Value::Null),
    }
}

/// Determines if an error is transient and worth retrying.
fn is_transient_error(error: &sqlx::Error) -> bool {
    let error_str = error.to_string().to_lowercase();

    if error_str.contains("password authentication failed")
        || error_str.contains("authentication failed")
        || error_str.contains("does not exist")
        || error_str.contains("ssl")
        || error_str.contains("tls")
    {
        return false;
    }

    error_str.contains("connection refused")
        || error_str.contains("timed out")
        || error_str.contains("timeout")
        || error_str.contains("temporarily unavailable")
        || error_str.contains("connection reset")
        || error_str.contains("broken pipe")
}

/// Maps sqlx connection errors to user-facing messages.
fn map_connection_error(error: sqlx::Error, config: &ConnectionConfig) -> MatrixError {
    let host = config.host.as_deref().unwrap_or("localhost");
    let port = config.port;
    let user = config.user.as_deref().unwrap_or("unknown");
    let database = config.database.as_deref().unwrap_or("unknown");

    let error_str = error.to_string().to_lowercase();

    if error_str.contains("connection refused") || error_str.contains("could not connect") {
        MatrixError::connection(format!(
            "Cannot connect to {host}:{port}. Check that the server is running."
        ))
    } else if error_str.contains("password authentication failed")
        || error_str.contains("authentication failed")
    {
        MatrixError::connection(format!(
            "Authentication failed for user '{user}'. Check your credentials."
        ))
    } else if error_str.contains("does not exist") && error_str.contains("database") {
        MatrixError::connection(format!("Database '{database}' does not exist."))
    } else if error_str.contains("timed out") || error_str.contains("timeout") {
        MatrixError::connection(format!("Connection to {host}:{port} timed out."))
    } else {
        MatrixError::connection(error.to_string())
    }
}

/// Formats a server error with its detail and hint, when present.
fn format_query_error(error: sqlx::Error) -> String {
    let Some(db_error) = error.as_database_error() else {
        return error.to_string();
    };

    let mut result = String::from("ERROR: ");
    result.push_str(db_error.message());

    if let Some(pg_error) = db_error.try_downcast_ref::<sqlx::postgres::PgDatabaseError>() {
        if let Some(detail) = pg_error.detail() {
            result.push_str("\n  DETAIL: ");
            result.push_str(detail);
        }
        if let Some(hint) = pg_error.hint() {
            result.push_str("\n  HINT: ");
            result.push_str(hint);
        }
    }

    result
}

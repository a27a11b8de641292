//! Matrix execution against a live PostgreSQL database.
//!
//! These tests require a running PostgreSQL database.
//! Set DATABASE_URL environment variable to run them.

use std::sync::Arc;

use pgmatrix::api::{execute_as_matrix, execute_toarray, MatrixSession};
use pgmatrix::config::ConnectionConfig;
use pgmatrix::db::{status, PostgresEngine, Value};
use pgmatrix::error::MatrixError;
use pgmatrix::query::ProcedureContext;

/// Helper to get test database URL from environment.
fn get_test_database_url() -> Option<String> {
    std::env::var("DATABASE_URL").ok()
}

/// Helper to create a session over a fresh connection.
async fn get_test_session(read_only: bool) -> Option<MatrixSession> {
    let url = get_test_database_url()?;
    let config = ConnectionConfig::from_connection_string(&url).ok()?;
    let engine = PostgresEngine::connect(&config).await.ok()?;
    Some(MatrixSession::new(
        Arc::new(engine),
        ProcedureContext {
            name: "postgres_test".to_string(),
            read_only,
        },
    ))
}

#[tokio::test]
async fn test_numeric_select() {
    let Some(session) = get_test_session(false).await else {
        eprintln!("Skipping test: DATABASE_URL not set");
        return;
    };

    let result = execute_as_matrix(
        &session,
        "SELECT g::float8 AS x, (g * 10)::int4 AS n, g::numeric / 4 AS q, 'row' AS label \
         FROM generate_series(1, 3) g ORDER BY g",
        0,
    )
    .await
    .unwrap();

    assert_eq!(result.status(), status::SPI_OK_SELECT);
    assert_eq!(result.shape(), Some((3, 4)));
    let m = result.matrix().unwrap();
    assert_eq!(m.row(0).to_vec()[..3].to_vec(), vec![1.0, 10.0, 0.25]);
    assert_eq!(m.row(2).to_vec()[..3].to_vec(), vec![3.0, 30.0, 0.75]);
    assert!(m.column(3).iter().all(|v| v.is_nan()));
    assert_eq!(result.colnames().unwrap(), vec!["x", "n", "q", "label"]);
    assert_eq!(result.coltypes().unwrap(), vec!["float8", "int4", "numeric", "text"]);

    session.close().await.unwrap();
}

#[tokio::test]
async fn test_nulls_and_limit() {
    let Some(session) = get_test_session(true).await else {
        eprintln!("Skipping test: DATABASE_URL not set");
        return;
    };

    let result = execute_toarray(
        &session,
        &[
            Value::from("SELECT NULL::float8 AS a, g::int8 AS b FROM generate_series(1, 5) g"),
            Value::Int(2),
        ],
    )
    .await
    .unwrap();

    assert_eq!(result.nrows(), Some(2));
    assert_eq!(result.shape(), Some((2, 2)));
    assert!(result.matrix().unwrap().column(0).iter().all(|v| v.is_nan()));

    session.close().await.unwrap();
}

#[tokio::test]
async fn test_zero_rows_keep_columns() {
    let Some(session) = get_test_session(true).await else {
        eprintln!("Skipping test: DATABASE_URL not set");
        return;
    };

    let result = execute_as_matrix(&session, "SELECT 1::float8 AS a, 2::int4 AS b WHERE false", 0)
        .await
        .unwrap();

    assert_eq!(result.nrows(), Some(0));
    assert_eq!(result.shape(), Some((0, 2)));
    assert_eq!(result.colnames().unwrap(), vec!["a", "b"]);

    session.close().await.unwrap();
}

#[tokio::test]
async fn test_failed_write_is_rolled_back() {
    let Some(session) = get_test_session(false).await else {
        eprintln!("Skipping test: DATABASE_URL not set");
        return;
    };

    execute_as_matrix(&session, "CREATE TEMP TABLE pgmatrix_obs (v float8 PRIMARY KEY)", 0)
        .await
        .unwrap();
    let inserted = execute_as_matrix(&session, "INSERT INTO pgmatrix_obs VALUES (1), (2)", 0)
        .await
        .unwrap();
    assert_eq!(inserted.status(), status::SPI_OK_INSERT);
    assert_eq!(inserted.nrows(), Some(2));

    let err = execute_as_matrix(&session, "INSERT INTO pgmatrix_obs VALUES (3), (1)", 0)
        .await
        .unwrap_err();
    assert!(matches!(err, MatrixError::Query(_)));

    // The failed scope is gone and the host transaction is still usable.
    let result = execute_as_matrix(&session, "SELECT v FROM pgmatrix_obs ORDER BY v", 0)
        .await
        .unwrap();
    assert_eq!(result.matrix().unwrap().column(0).to_vec(), vec![1.0, 2.0]);

    session.close().await.unwrap();
}

#[tokio::test]
async fn test_dropped_column_is_not_returned() {
    let Some(session) = get_test_session(false).await else {
        eprintln!("Skipping test: DATABASE_URL not set");
        return;
    };

    for sql in [
        "CREATE TEMP TABLE pgmatrix_altered (a float8, b float8, c float8)",
        "INSERT INTO pgmatrix_altered VALUES (1, 2, 3)",
        "ALTER TABLE pgmatrix_altered DROP COLUMN b",
    ] {
        execute_as_matrix(&session, sql, 0).await.unwrap();
    }

    let result = execute_as_matrix(&session, "SELECT * FROM pgmatrix_altered", 0)
        .await
        .unwrap();
    assert_eq!(result.shape(), Some((1, 2)));
    assert_eq!(result.matrix().unwrap().row(0).to_vec(), vec![1.0, 3.0]);

    session.close().await.unwrap();
}

#[tokio::test]
async fn test_transaction_control_is_refused() {
    let Some(session) = get_test_session(false).await else {
        eprintln!("Skipping test: DATABASE_URL not set");
        return;
    };

    let err = execute_as_matrix(&session, "COMMIT", 0).await.unwrap_err();
    assert_eq!(err.to_string(), "SPI_execute failed: SPI_ERROR_TRANSACTION");

    let err = execute_as_matrix(&session, "   ", 0).await.unwrap_err();
    assert_eq!(err.to_string(), "SPI_execute failed: SPI_ERROR_ARGUMENT");

    session.close().await.unwrap();
}

#[tokio::test]
async fn test_read_only_refuses_ddl() {
    let Some(session) = get_test_session(true).await else {
        eprintln!("Skipping test: DATABASE_URL not set");
        return;
    };

    let err = execute_as_matrix(&session, "CREATE TEMP TABLE pgmatrix_ro (a int)", 0)
        .await
        .unwrap_err();
    assert_eq!(
        err.to_string(),
        "Query error: CREATE is not allowed in a read-only execution"
    );

    session.close().await.unwrap();
}

//! End-to-end matrix execution against the in-memory engine.

use std::sync::Arc;
use std::time::Duration;

use pgmatrix::api::{execute_as_matrix, execute_toarray, MatrixSession};
use pgmatrix::db::{status, ColumnMeta, MockEngine, ScopeEvent, Value};
use pgmatrix::error::MatrixError;
use pgmatrix::query::ProcedureContext;
use pretty_assertions::assert_eq;
use tokio_test::{assert_err, assert_ok};

fn session(engine: &Arc<MockEngine>, read_only: bool) -> MatrixSession {
    MatrixSession::new(
        engine.clone(),
        ProcedureContext {
            name: "matrix_test".to_string(),
            read_only,
        },
    )
}

fn measurements() -> MockEngine {
    MockEngine::new()
        .with_table(
            "measurements",
            vec![ColumnMeta::new("x", "float8"), ColumnMeta::new("n", "int4")],
            vec![
                vec![Value::Float(1.5), Value::Int(10)],
                vec![Value::Float(2.5), Value::Int(20)],
                vec![Value::Float(-3.0), Value::Int(30)],
            ],
        )
        .with_table(
            "sparse",
            vec![ColumnMeta::new("a", "float8"), ColumnMeta::new("b", "float8")],
            vec![
                vec![Value::Float(1.0), Value::Null],
                vec![Value::Float(2.0), Value::Null],
            ],
        )
        .with_table(
            "series",
            vec![ColumnMeta::new("g", "int8")],
            (1..=5).map(|i| vec![Value::Int(i)]).collect(),
        )
        .with_table(
            "altered",
            vec![
                ColumnMeta::new("a", "float8"),
                ColumnMeta::dropped("b", "float8"),
                ColumnMeta::new("c", "float8"),
            ],
            vec![vec![Value::Float(1.0), Value::Null, Value::Float(3.0)]],
        )
        .with_table(
            "empty",
            vec![ColumnMeta::new("a", "float8"), ColumnMeta::new("b", "text")],
            vec![],
        )
}

#[tokio::test]
async fn test_numeric_columns_become_matrix() {
    let engine = Arc::new(measurements());
    let session = session(&engine, false);

    let result = assert_ok!(execute_as_matrix(&session, "SELECT * FROM measurements", 0).await);

    assert_eq!(result.status(), status::SPI_OK_SELECT);
    assert_eq!(result.nrows(), Some(3));
    assert_eq!(result.shape(), Some((3, 2)));
    let m = result.matrix().unwrap();
    assert_eq!(m.row(0).to_vec(), vec![1.5, 10.0]);
    assert_eq!(m.row(1).to_vec(), vec![2.5, 20.0]);
    assert_eq!(m.row(2).to_vec(), vec![-3.0, 30.0]);
    assert_eq!(result.colnames().unwrap(), vec!["x", "n"]);
    assert_eq!(result.coltypes().unwrap(), vec!["float8", "int4"]);
}

#[tokio::test]
async fn test_null_column_is_nan() {
    let engine = Arc::new(measurements());
    let session = session(&engine, false);

    let result = assert_ok!(execute_as_matrix(&session, "SELECT * FROM sparse", 0).await);
    let m = result.matrix().unwrap();

    assert_eq!(m.column(0).to_vec(), vec![1.0, 2.0]);
    assert!(m.column(1).iter().all(|v| v.is_nan()));
}

#[tokio::test]
async fn test_row_limit_truncates() {
    let engine = Arc::new(measurements());
    let session = session(&engine, false);

    let result = assert_ok!(execute_as_matrix(&session, "SELECT * FROM series", 1).await);

    assert_eq!(result.nrows(), Some(1));
    assert_eq!(result.shape(), Some((1, 1)));
    assert_eq!(result.matrix().unwrap()[[0, 0]], 1.0);
}

#[tokio::test]
async fn test_dropped_column_is_skipped() {
    let engine = Arc::new(measurements());
    let session = session(&engine, false);

    let result = assert_ok!(execute_as_matrix(&session, "SELECT * FROM altered", 0).await);

    assert_eq!(result.shape(), Some((1, 2)));
    assert_eq!(result.matrix().unwrap().row(0).to_vec(), vec![1.0, 3.0]);
    assert_eq!(result.colnames().unwrap(), vec!["a", "c"]);
    assert_eq!(result.descriptor().unwrap().natts(), 3);
}

#[tokio::test]
async fn test_negative_status_returns_no_result() {
    let engine = Arc::new(measurements().with_status("SELECT broken()", status::SPI_ERROR_OPUNKNOWN));
    let session = session(&engine, false);

    let err = assert_err!(execute_as_matrix(&session, "SELECT broken()", 0).await);

    assert_eq!(
        err,
        MatrixError::Spi {
            status: status::SPI_ERROR_OPUNKNOWN,
            message: "SPI_execute failed: SPI_ERROR_OPUNKNOWN".to_string(),
        }
    );
    assert_eq!(
        engine.events(),
        vec![
            ScopeEvent::Begin,
            ScopeEvent::Submit("SELECT broken()".to_string()),
            ScopeEvent::Abort,
        ]
    );
}

#[tokio::test]
async fn test_copy_is_refused_with_status() {
    let engine = Arc::new(measurements());
    let session = session(&engine, false);

    let err = assert_err!(execute_as_matrix(&session, "COPY measurements TO STDOUT", 0).await);

    assert_eq!(err.to_string(), "SPI_execute failed: SPI_ERROR_COPY");
    assert_eq!(engine.open_scopes(), 0);
}

#[tokio::test]
async fn test_zero_rows_give_empty_matrix() {
    let engine = Arc::new(measurements());
    let session = session(&engine, false);

    let result = assert_ok!(execute_as_matrix(&session, "SELECT * FROM empty", 0).await);

    assert_eq!(result.nrows(), Some(0));
    assert_eq!(result.shape(), Some((0, 2)));
    assert_eq!(result.colnames().unwrap(), vec!["a", "b"]);
}

#[tokio::test]
async fn test_command_result_has_count_only() {
    let engine = Arc::new(measurements().with_insert(
        "INSERT INTO measurements VALUES (4.5, 40)",
        "measurements",
        vec![vec![Value::Float(4.5), Value::Int(40)]],
    ));
    let session = session(&engine, false);

    let result = assert_ok!(
        execute_as_matrix(&session, "INSERT INTO measurements VALUES (4.5, 40)", 0).await
    );

    assert_eq!(result.status(), status::SPI_OK_INSERT);
    assert_eq!(result.nrows(), Some(1));
    assert!(result.matrix().is_none());
    assert!(result.colnames().is_err());
    assert_eq!(engine.table_rows("measurements").unwrap().len(), 4);
}

#[tokio::test]
async fn test_failing_write_is_rolled_back() {
    let sql = "INSERT INTO measurements SELECT * FROM staging";
    let engine = Arc::new(measurements().with_failing_insert(
        sql,
        "measurements",
        vec![vec![Value::Float(9.0), Value::Int(90)]],
        "duplicate key value violates unique constraint \"measurements_pkey\"",
    ));
    let session = session(&engine, false);

    let err = assert_err!(execute_as_matrix(&session, sql, 0).await);

    assert!(matches!(err, MatrixError::Query(_)));
    assert_eq!(engine.table_rows("measurements").unwrap().len(), 3);
    assert_eq!(engine.events().last(), Some(&ScopeEvent::Abort));
}

#[tokio::test]
async fn test_read_only_refuses_writes() {
    let engine = Arc::new(measurements());
    let session = session(&engine, true);

    let err = assert_err!(execute_as_matrix(&session, "DELETE FROM measurements", 0).await);

    assert_eq!(
        err.to_string(),
        "Query error: DELETE is not allowed in a read-only execution"
    );
    assert_eq!(engine.table_rows("measurements").unwrap().len(), 3);
    assert_eq!(engine.open_scopes(), 0);
}

#[tokio::test]
async fn test_read_only_queries_are_repeatable() {
    let engine = Arc::new(measurements());
    let session = session(&engine, true);

    let first = assert_ok!(execute_as_matrix(&session, "SELECT * FROM measurements", 0).await);
    let second = assert_ok!(execute_as_matrix(&session, "SELECT * FROM measurements", 0).await);

    assert_eq!(first.matrix(), second.matrix());
    assert_eq!(first.colnames().unwrap(), second.colnames().unwrap());
}

#[tokio::test]
async fn test_invalid_encoding_never_opens_scope() {
    let engine = Arc::new(measurements());
    let session = session(&engine, false);

    let err = assert_err!(execute_as_matrix(&session, b"SELECT '\xfe'".as_slice(), 0).await);
    assert!(matches!(err, MatrixError::Encoding(_)));

    let err = assert_err!(execute_as_matrix(&session, "SELECT 1\0", 0).await);
    assert!(matches!(err, MatrixError::Encoding(_)));

    assert!(engine.events().is_empty());
}

#[tokio::test]
async fn test_cancelled_call_rolls_back() {
    let sql = "INSERT INTO measurements VALUES (7, 70)";
    let engine = Arc::new(
        measurements()
            .with_insert(sql, "measurements", vec![vec![Value::Float(7.0), Value::Int(70)]])
            .with_delay(sql, Duration::from_secs(5)),
    );
    let session = session(&engine, false);

    let outcome = tokio::time::timeout(
        Duration::from_millis(20),
        execute_as_matrix(&session, sql, 0),
    )
    .await;

    assert!(outcome.is_err());
    assert_eq!(
        engine.events(),
        vec![
            ScopeEvent::Begin,
            ScopeEvent::Submit(sql.to_string()),
            ScopeEvent::Abandon,
        ]
    );
    assert_eq!(engine.open_scopes(), 0);
    assert_eq!(engine.table_rows("measurements").unwrap().len(), 3);
}

#[tokio::test]
async fn test_toarray_accepts_query_and_limit() {
    let engine = Arc::new(measurements());
    let session = session(&engine, false);

    let result = assert_ok!(
        execute_toarray(&session, &[Value::from("SELECT * FROM series"), Value::Int(2)]).await
    );
    assert_eq!(result.shape(), Some((2, 1)));

    let result = assert_ok!(execute_toarray(&session, &[Value::from("SELECT * FROM series")]).await);
    assert_eq!(result.shape(), Some((5, 1)));
}

#[tokio::test]
async fn test_toarray_bad_arguments_never_touch_engine() {
    let engine = Arc::new(measurements());
    let session = session(&engine, false);

    for args in [
        vec![],
        vec![Value::Int(42)],
        vec![Value::from("SELECT * FROM series"), Value::Int(-1)],
        vec![Value::from("SELECT * FROM series"), Value::from("ten")],
    ] {
        let err = assert_err!(execute_toarray(&session, &args).await);
        assert_eq!(
            err,
            MatrixError::arguments("execute expected a query or a plan")
        );
    }

    assert!(engine.events().is_empty());
}

#[tokio::test]
async fn test_seeded_engine() {
    let seed = r#"{ "tables": [ { "name": "points",
        "columns": [ { "name": "x", "type_name": "float8" },
                     { "name": "label", "type_name": "text" } ],
        "rows": [ [1, "a"], [2.5, null] ] } ] }"#;
    let engine = Arc::new(MockEngine::new().with_seed(seed).unwrap());
    let session = session(&engine, true);

    let result = assert_ok!(execute_as_matrix(&session, "select * from points;", 0).await);
    let m = result.matrix().unwrap();

    assert_eq!(m.column(0).to_vec(), vec![1.0, 2.5]);
    assert!(m.column(1).iter().all(|v| v.is_nan()));
}

#[tokio::test]
async fn test_seeded_type_spellings_coerce_integers() {
    let seed = r#"{ "tables": [ { "name": "spellings",
        "columns": [ { "name": "a", "type_name": "FLOAT8" },
                     { "name": "b", "type_name": "double precision" },
                     { "name": "c", "type_name": "real" },
                     { "name": "d", "type_name": "DECIMAL" } ],
        "rows": [ [1, 2, 3, 4] ] } ] }"#;
    let engine = Arc::new(MockEngine::new().with_seed(seed).unwrap());
    let session = session(&engine, true);

    let result = assert_ok!(execute_as_matrix(&session, "SELECT * FROM spellings", 0).await);

    assert_eq!(result.matrix().unwrap().row(0).to_vec(), vec![1.0, 2.0, 3.0, 4.0]);
    assert_eq!(
        result.coltypes().unwrap(),
        vec!["float8", "double precision", "real", "decimal"]
    );
}

#[tokio::test]
async fn test_transaction_control_before_write_is_refused() {
    let sql = "COMMIT; INSERT INTO measurements VALUES (4.5, 40)";
    let engine = Arc::new(measurements().with_insert(
        sql,
        "measurements",
        vec![vec![Value::Float(4.5), Value::Int(40)]],
    ));
    let session = session(&engine, false);

    let err = assert_err!(execute_as_matrix(&session, sql, 0).await);

    assert_eq!(err.to_string(), "SPI_execute failed: SPI_ERROR_TRANSACTION");
    assert_eq!(engine.table_rows("measurements").unwrap().len(), 3);
    assert_eq!(engine.open_scopes(), 0);
}

#[tokio::test]
async fn test_interleaved_calls_keep_committed_write() {
    let ok_sql = "INSERT INTO measurements VALUES (4.5, 40)";
    let bad_sql = "INSERT INTO measurements SELECT * FROM staging";
    let engine = Arc::new(
        measurements()
            .with_insert(ok_sql, "measurements", vec![vec![Value::Float(4.5), Value::Int(40)]])
            .with_failing_insert(
                bad_sql,
                "measurements",
                vec![vec![Value::Float(9.0), Value::Int(90)]],
                "duplicate key value violates unique constraint \"measurements_pkey\"",
            )
            .with_delay(ok_sql, Duration::from_millis(30))
            .with_delay(bad_sql, Duration::from_millis(10)),
    );
    let session = session(&engine, false);

    let (ok, bad) = tokio::join!(
        execute_as_matrix(&session, ok_sql, 0),
        execute_as_matrix(&session, bad_sql, 0)
    );

    assert_ok!(ok);
    assert_err!(bad);
    let rows = engine.table_rows("measurements").unwrap();
    assert_eq!(rows.len(), 4);
    assert_eq!(rows[3], vec![Value::Float(4.5), Value::Int(40)]);
    assert_eq!(engine.open_scopes(), 0);
}

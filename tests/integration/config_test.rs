//! Configuration loading feeding a session.

use std::io::Write;
use std::sync::Arc;

use pgmatrix::api::{execute_as_matrix, MatrixSession};
use pgmatrix::config::Config;
use pgmatrix::db::{ColumnMeta, MockEngine, Value};
use pgmatrix::error::MatrixError;

#[tokio::test]
async fn test_read_only_config_applies_to_session() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(
        file,
        r#"
[execution]
procedure = "nightly_fit"
read_only = true
default_row_limit = 2
"#
    )
    .unwrap();
    let config = Config::load_from_file(file.path()).unwrap();

    let engine = Arc::new(MockEngine::new().with_table(
        "obs",
        vec![ColumnMeta::new("v", "float4")],
        (0..4).map(|i| vec![Value::Float(i as f64)]).collect(),
    ));
    let session = MatrixSession::with_config(engine.clone(), &config.execution);
    assert_eq!(session.procedure().name, "nightly_fit");

    let result = execute_as_matrix(&session, "SELECT * FROM obs", config.execution.default_row_limit)
        .await
        .unwrap();
    assert_eq!(result.shape(), Some((2, 1)));

    let err = execute_as_matrix(&session, "DROP TABLE obs", 0)
        .await
        .unwrap_err();
    assert!(matches!(err, MatrixError::Query(_)));
    assert!(engine.table_rows("obs").is_some());
}

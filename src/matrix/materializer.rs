//! Turns a raw result set into a [`MatrixResult`].

use ndarray::Array2;
use std::sync::Arc;
use tracing::debug;

use super::builder::build;
use super::coercion::ColumnPlan;
use super::result::MatrixResult;
use crate::db::{status, RawResultSet};
use crate::error::{MatrixError, Result};

/// Builds the caller-facing result for a successful statement.
///
/// Statements without a tuple table yield a count-only result. Statements
/// with one yield a matrix and an owned copy of the descriptor, which is
/// attached only after every row converted. The row buffer is consumed.
pub fn materialize(raw: RawResultSet) -> Result<MatrixResult> {
    let RawResultSet {
        status,
        row_count,
        tuple_table,
        ..
    } = raw;

    if status < 0 {
        return Err(MatrixError::spi(
            status,
            &status::result_code_to_string(status),
        ));
    }

    let mut result = MatrixResult::new(status);
    if status == 0 {
        return Ok(result);
    }
    result.row_count = Some(row_count);

    let Some(table) = tuple_table else {
        debug!("Statement returned no tuples ({} rows processed)", row_count);
        return Ok(result);
    };

    if table.rows.len() as u64 != row_count {
        return Err(MatrixError::materialize(format!(
            "row count {} does not match {} buffered rows",
            row_count,
            table.rows.len()
        )));
    }

    let plan = ColumnPlan::resolve(&table.descriptor);
    let matrix = if row_count > 0 {
        build(&plan, &table.rows)?
    } else {
        Array2::from_elem((0, plan.width()), f64::NAN)
    };
    debug!("Materialized {:?} matrix", matrix.dim());

    result.matrix = Some(matrix);
    result.descriptor = Some(Arc::new(table.descriptor));
    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{ColumnMeta, TupleDescriptor, Value};
    use pretty_assertions::assert_eq;

    fn descriptor() -> TupleDescriptor {
        TupleDescriptor::new(vec![
            ColumnMeta::new("x", "float8"),
            ColumnMeta::dropped("old", "float8"),
            ColumnMeta::new("label", "text"),
        ])
    }

    #[test]
    fn test_command_without_tuples() {
        let result = materialize(RawResultSet::command(status::SPI_OK_INSERT, 3)).unwrap();

        assert_eq!(result.status(), status::SPI_OK_INSERT);
        assert_eq!(result.nrows(), Some(3));
        assert!(result.matrix().is_none());
        assert!(result.descriptor().is_none());
    }

    #[test]
    fn test_status_zero_has_no_count() {
        let result = materialize(RawResultSet::command(0, 0)).unwrap();
        assert_eq!(result.status(), 0);
        assert_eq!(result.nrows(), None);
    }

    #[test]
    fn test_tuples_become_matrix() {
        let rows = vec![
            vec![Value::Float(1.0), Value::Float(9.0), Value::String("a".into())],
            vec![Value::Null, Value::Float(9.0), Value::String("b".into())],
        ];
        let raw = RawResultSet::with_rows(status::SPI_OK_SELECT, descriptor(), rows);
        let result = materialize(raw).unwrap();

        assert_eq!(result.nrows(), Some(2));
        assert_eq!(result.shape(), Some((2, 2)));
        let m = result.matrix().unwrap();
        assert_eq!(m[[0, 0]], 1.0);
        assert!(m[[0, 1]].is_nan());
        assert!(m[[1, 0]].is_nan());
        assert_eq!(result.colnames().unwrap(), vec!["x", "label"]);
        assert_eq!(result.descriptor().unwrap().natts(), 3);
    }

    #[test]
    fn test_zero_rows_keep_width() {
        let raw = RawResultSet::with_rows(status::SPI_OK_SELECT, descriptor(), vec![]);
        let result = materialize(raw).unwrap();

        assert_eq!(result.nrows(), Some(0));
        assert_eq!(result.shape(), Some((0, 2)));
        assert!(result.descriptor().is_some());
    }

    #[test]
    fn test_short_row_fails_without_partial_result() {
        let rows = vec![vec![Value::Float(1.0)]];
        let raw = RawResultSet::with_rows(status::SPI_OK_SELECT, descriptor(), rows);

        let err = materialize(raw).unwrap_err();
        assert_eq!(err, MatrixError::materialize("row 0 has 1 values, expected 3"));
    }

    #[test]
    fn test_negative_status_is_error() {
        let err = materialize(RawResultSet::failure(status::SPI_ERROR_COPY)).unwrap_err();
        assert_eq!(err.to_string(), "SPI_execute failed: SPI_ERROR_COPY");
    }
}

//! Row buffer to matrix conversion.

use ndarray::Array2;

use super::coercion::{ColumnPlan, Slot};
use crate::db::Row;
use crate::error::{MatrixError, Result};

/// Builds a `rows.len() × plan.width()` matrix from a row buffer.
///
/// Rows and non-dropped columns keep their order. NULL cells and cells of
/// columns without a coercion become NaN. A row whose length differs from the
/// descriptor is an error; the partially filled matrix is dropped.
pub fn build(plan: &ColumnPlan, rows: &[Row]) -> Result<Array2<f64>> {
    let mut matrix = Array2::from_elem((rows.len(), plan.width()), f64::NAN);

    for (i, row) in rows.iter().enumerate() {
        if row.len() != plan.natts() {
            return Err(MatrixError::materialize(format!(
                "row {} has {} values, expected {}",
                i,
                row.len(),
                plan.natts()
            )));
        }

        for (slot, value) in plan.slots().iter().zip(row) {
            let Slot::Active { output, coerce } = slot else {
                continue;
            };
            matrix[[i, *output]] = match coerce {
                Some(coerce) if !value.is_null() => coerce(value),
                _ => f64::NAN,
            };
        }
    }

    Ok(matrix)
}

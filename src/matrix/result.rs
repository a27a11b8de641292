//! The object handed back to callers.

use ndarray::Array2;
use serde::Serialize;
use std::sync::Arc;

use crate::db::TupleDescriptor;
use crate::error::{MatrixError, Result};

/// Outcome of one matrix execution.
///
/// `descriptor` is owned by the result, so column metadata stays readable
/// after the nested scope that produced it has closed.
#[derive(Debug, Clone, Serialize)]
pub struct MatrixResult {
    pub(crate) status: i32,
    pub(crate) row_count: Option<u64>,
    pub(crate) matrix: Option<Array2<f64>>,
    pub(crate) descriptor: Option<Arc<TupleDescriptor>>,
}

impl MatrixResult {
    pub(crate) fn new(status: i32) -> Self {
        Self {
            status,
            row_count: None,
            matrix: None,
            descriptor: None,
        }
    }

    /// Engine status code of the statement.
    pub fn status(&self) -> i32 {
        self.status
    }

    /// Rows processed, set for every successful statement.
    pub fn nrows(&self) -> Option<u64> {
        self.row_count
    }

    /// The matrix, present when the statement returned a tuple table.
    pub fn matrix(&self) -> Option<&Array2<f64>> {
        self.matrix.as_ref()
    }

    /// Takes the matrix out of the result.
    pub fn into_matrix(self) -> Option<Array2<f64>> {
        self.matrix
    }

    /// `(rows, columns)` of the matrix.
    pub fn shape(&self) -> Option<(usize, usize)> {
        self.matrix.as_ref().map(|m| m.dim())
    }

    /// Copy of the descriptor taken when the result was materialized.
    pub fn descriptor(&self) -> Option<&Arc<TupleDescriptor>> {
        self.descriptor.as_ref()
    }

    /// Names of the matrix columns, in order.
    pub fn colnames(&self) -> Result<Vec<String>> {
        Ok(self
            .result_descriptor()?
            .active_columns()
            .map(|c| c.name.clone())
            .collect())
    }

    /// Declared type names of the matrix columns, in order.
    pub fn coltypes(&self) -> Result<Vec<String>> {
        Ok(self
            .result_descriptor()?
            .active_columns()
            .map(|c| c.type_name.clone())
            .collect())
    }

    fn result_descriptor(&self) -> Result<&TupleDescriptor> {
        self.descriptor
            .as_deref()
            .ok_or_else(|| MatrixError::query("command did not produce a result set"))
    }
}

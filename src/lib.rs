//! pgmatrix - Run PostgreSQL queries and read the results as float matrices.
//!
//! Each query runs in its own nested transaction scope, which is committed
//! on success and rolled back on every other path. Row-returning statements
//! come back as an `ndarray::Array2<f64>` with one column per non-dropped
//! result column; NULLs and non-numeric cells are NaN.

pub mod api;
pub mod cli;
pub mod config;
pub mod db;
pub mod error;
pub mod logging;
pub mod matrix;
pub mod output;
pub mod query;
pub mod safety;

pub use api::{execute_as_matrix, execute_toarray, MatrixSession};
pub use error::{MatrixError, Result};
pub use matrix::MatrixResult;

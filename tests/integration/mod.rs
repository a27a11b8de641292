//! Integration tests for pgmatrix.

pub mod config_test;
pub mod matrix_test;
pub mod postgres_test;

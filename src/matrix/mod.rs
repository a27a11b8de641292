//! Conversion of query results into dense `f64` matrices.
//!
//! Every non-dropped column becomes one matrix column. Cells that are NULL,
//! or whose column type has no numeric reading, become NaN.

pub mod builder;
pub mod coercion;
pub mod materializer;
mod result;

pub use builder::build;
pub use coercion::{CoerceFn, ColumnPlan};
pub use materializer::materialize;
pub use result::MatrixResult;

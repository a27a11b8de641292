//! Raw result types produced by query engines.
//!
//! A [`RawResultSet`] is what the engine hands back from `submit`: the status
//! code, the processed row count and, for row-returning statements, a
//! [`TupleTable`] holding the descriptor and row buffer.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Result of submitting one statement to a query engine.
#[derive(Debug, Clone, Default)]
pub struct RawResultSet {
    /// Engine status code. Negative values are failures, see [`super::status`].
    pub status: i32,

    /// Number of rows processed (fetched, inserted, updated, ...).
    pub row_count: u64,

    /// Descriptor and row buffer, present only for row-returning statements.
    pub tuple_table: Option<TupleTable>,

    /// Time taken by the engine to run the statement.
    pub execution_time: Duration,
}

impl RawResultSet {
    /// Creates a result for a statement that returned no tuple table.
    pub fn command(status: i32, row_count: u64) -> Self {
        Self {
            status,
            row_count,
            tuple_table: None,
            execution_time: Duration::ZERO,
        }
    }

    /// Creates a result carrying rows. `row_count` is taken from the buffer.
    pub fn with_rows(status: i32, descriptor: TupleDescriptor, rows: Vec<Row>) -> Self {
        let row_count = rows.len() as u64;
        Self {
            status,
            row_count,
            tuple_table: Some(TupleTable { descriptor, rows }),
            execution_time: Duration::ZERO,
        }
    }

    /// Creates a result for a failed statement.
    pub fn failure(status: i32) -> Self {
        Self::command(status, 0)
    }

    /// Sets the execution time.
    pub fn with_execution_time(mut self, duration: Duration) -> Self {
        self.execution_time = duration;
        self
    }

    /// Returns true if the engine reported a failure code.
    pub fn is_failure(&self) -> bool {
        self.status < 0
    }
}

/// Row buffer plus the descriptor that describes it.
#[derive(Debug, Clone, Default)]
pub struct TupleTable {
    pub descriptor: TupleDescriptor,
    pub rows: Vec<Row>,
}

/// Metadata about a column in a result set.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnMeta {
    /// Column name.
    pub name: String,

    /// Declared type name, lower case (`float8`, `int4`, `text`, ...).
    #[serde(deserialize_with = "lowercase_type_name")]
    pub type_name: String,

    /// Logically deleted column. Still present in the descriptor and in each
    /// row, but never part of the output.
    #[serde(default)]
    pub dropped: bool,
}

fn lowercase_type_name<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: serde::Deserializer<'de>,
{
    String::deserialize(deserializer).map(|s| s.trim().to_lowercase())
}

impl ColumnMeta {
    /// Creates a new column with the given name and type.
    pub fn new(name: impl Into<String>, type_name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            type_name: type_name.into().to_lowercase(),
            dropped: false,
        }
    }

    /// Creates a dropped column placeholder.
    pub fn dropped(name: impl Into<String>, type_name: impl Into<String>) -> Self {
        Self {
            dropped: true,
            ..Self::new(name, type_name)
        }
    }
}

/// Ordered column metadata for a tuple table.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TupleDescriptor {
    columns: Vec<ColumnMeta>,
}

impl TupleDescriptor {
    pub fn new(columns: Vec<ColumnMeta>) -> Self {
        Self { columns }
    }

    /// Number of declared attributes, dropped ones included.
    pub fn natts(&self) -> usize {
        self.columns.len()
    }

    /// Number of attributes that take a position in the output.
    pub fn active_count(&self) -> usize {
        self.columns.iter().filter(|c| !c.dropped).count()
    }

    /// All declared attributes in order.
    pub fn columns(&self) -> &[ColumnMeta] {
        &self.columns
    }

    /// Non-dropped attributes in declaration order.
    pub fn active_columns(&self) -> impl Iterator<Item = &ColumnMeta> {
        self.columns.iter().filter(|c| !c.dropped)
    }
}

impl FromIterator<ColumnMeta> for TupleDescriptor {
    fn from_iter<I: IntoIterator<Item = ColumnMeta>>(iter: I) -> Self {
        Self::new(iter.into_iter().collect())
    }
}

/// A row of data from a query result, one value per declared attribute.
pub type Row = Vec<Value>;

/// Represents a single value from a database query.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub enum Value {
    /// NULL value.
    #[default]
    Null,

    /// Boolean value.
    Bool(bool),

    /// Signed integer (up to i64).
    Int(i64),

    /// Floating point number.
    Float(f64),

    /// Text/string value.
    String(String),

    /// Binary data.
    Bytes(Vec<u8>),
}

impl Value {
    /// Returns true if this value is NULL.
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Attempts to convert the value to a string representation.
    pub fn to_display_string(&self) -> String {
        match self {
            Value::Null => "NULL".to_string(),
            Value::Bool(b) => b.to_string(),
            Value::Int(i) => i.to_string(),
            Value::Float(f) => f.to_string(),
            Value::String(s) => s.clone(),
            Value::Bytes(b) => format!("<{} bytes>", b.len()),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_display_string())
    }
}

// Conversion implementations for common types
impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Int(v as i64)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::String(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::String(v.to_string())
    }
}

impl<T> From<Option<T>> for Value
where
    T: Into<Value>,
{
    fn from(v: Option<T>) -> Self {
        match v {
            Some(val) => val.into(),
            None => Value::Null,
        }
    }
}

impl From<Vec<u8>> for Value {
    fn from(v: Vec<u8>) -> Self {
        Value::Bytes(v)
    }
}

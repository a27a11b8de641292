//! Error types for pgmatrix.
//!
//! Defines the main error enum used throughout the crate.

use thiserror::Error;

/// Main error type for pgmatrix operations.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum MatrixError {
    /// Query text is not valid encoded text (invalid UTF-8, embedded NUL).
    #[error("Encoding error: {0}")]
    Encoding(String),

    /// The engine returned a negative status code.
    #[error("{message}")]
    Spi {
        /// Raw engine status code (always negative).
        status: i32,
        /// Diagnostic built from the engine's result code string.
        message: String,
    },

    /// Query execution errors (syntax errors, constraint violations,
    /// read-only violations, etc.)
    #[error("Query error: {0}")]
    Query(String),

    /// Failure while converting rows into the matrix.
    #[error("Materialization error: {0}")]
    Materialize(String),

    /// The caller passed arguments of the wrong shape.
    #[error("Argument error: {0}")]
    Arguments(String),

    /// Database connection errors (host unreachable, auth failed, etc.)
    #[error("Connection error: {0}")]
    Connection(String),

    /// Configuration errors (invalid config file, missing required fields, etc.)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Internal errors (unexpected states, bugs, etc.)
    #[error("Internal error: {0}")]
    Internal(String),
}

impl MatrixError {
    /// Creates an encoding error with the given message.
    pub fn encoding(msg: impl Into<String>) -> Self {
        Self::Encoding(msg.into())
    }

    /// Creates the error reported for a negative engine status.
    pub fn spi(status: i32, code_name: &str) -> Self {
        Self::Spi {
            status,
            message: format!("SPI_execute failed: {code_name}"),
        }
    }

    /// Creates a query error with the given message.
    pub fn query(msg: impl Into<String>) -> Self {
        Self::Query(msg.into())
    }

    /// Creates a materialization error with the given message.
    pub fn materialize(msg: impl Into<String>) -> Self {
        Self::Materialize(msg.into())
    }

    /// Creates an argument error with the given message.
    pub fn arguments(msg: impl Into<String>) -> Self {
        Self::Arguments(msg.into())
    }

    /// Creates a connection error with the given message.
    pub fn connection(msg: impl Into<String>) -> Self {
        Self::Connection(msg.into())
    }

    /// Creates a configuration error with the given message.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Creates an internal error with the given message.
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Returns the error category as a string for display purposes.
    pub fn category(&self) -> &'static str {
        match self {
            Self::Encoding(_) => "Encoding Error",
            Self::Spi { .. } => "SPI Error",
            Self::Query(_) => "Query Error",
            Self::Materialize(_) => "Materialization Error",
            Self::Arguments(_) => "Argument Error",
            Self::Connection(_) => "Connection Error",
            Self::Config(_) => "Configuration Error",
            Self::Internal(_) => "Internal Error",
        }
    }
}

/// Result type alias using MatrixError.
pub type Result<T> = std::result::Result<T, MatrixError>;

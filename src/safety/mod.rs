//! Statement classification.
//!
//! Parses SQL and classifies each statement as read-only, mutating or
//! destructive. Engines use the classification to honor the read-only flag of
//! the calling procedure, to pick the status code reported for a statement,
//! and to decide whether a statement produces a tuple table.

mod parser;

pub use parser::{classify_sql, SqlClassifier};

use crate::db::status;
use std::fmt;

/// Safety level classification for SQL statements.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SafetyLevel {
    /// Read-only statements (SELECT, EXPLAIN, SHOW).
    Safe,
    /// Data modification (INSERT, UPDATE, MERGE).
    Mutating,
    /// Data loss or schema changes (DELETE, DROP, TRUNCATE, ALTER, CREATE).
    Destructive,
}

impl SafetyLevel {
    /// Returns true if a read-only execution may run a statement of this level.
    pub fn allowed_in_read_only(&self) -> bool {
        matches!(self, Self::Safe)
    }

    /// Returns a priority value (higher = more dangerous).
    pub(crate) fn priority(&self) -> u8 {
        match self {
            Self::Safe => 0,
            Self::Mutating => 1,
            Self::Destructive => 2,
        }
    }
}

impl fmt::Display for SafetyLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Safe => write!(f, "Safe"),
            Self::Mutating => write!(f, "Mutating"),
            Self::Destructive => write!(f, "Destructive"),
        }
    }
}

/// The type of SQL statement detected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StatementType {
    Select,
    SelectInto,
    Insert,
    Update,
    Delete,
    Drop,
    Truncate,
    Alter,
    Create,
    Grant,
    Revoke,
    Explain,
    Show,
    Merge,
    Copy,
    /// BEGIN, COMMIT, ROLLBACK, SAVEPOINT and friends.
    Transaction,
    /// Multiple statements detected; contains the last statement's type.
    Multiple(Box<StatementType>),
    /// Empty input.
    Empty,
    /// Statement type could not be determined.
    Unknown,
}

impl StatementType {
    /// Innermost type for `Multiple`, the type itself otherwise.
    pub fn last(&self) -> &StatementType {
        match self {
            Self::Multiple(inner) => inner.last(),
            other => other,
        }
    }
}

impl fmt::Display for StatementType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Select => write!(f, "SELECT"),
            Self::SelectInto => write!(f, "SELECT INTO"),
            Self::Insert => write!(f, "INSERT"),
            Self::Update => write!(f, "UPDATE"),
            Self::Delete => write!(f, "DELETE"),
            Self::Drop => write!(f, "DROP"),
            Self::Truncate => write!(f, "TRUNCATE"),
            Self::Alter => write!(f, "ALTER"),
            Self::Create => write!(f, "CREATE"),
            Self::Grant => write!(f, "GRANT"),
            Self::Revoke => write!(f, "REVOKE"),
            Self::Explain => write!(f, "EXPLAIN"),
            Self::Show => write!(f, "SHOW"),
            Self::Merge => write!(f, "MERGE"),
            Self::Copy => write!(f, "COPY"),
            Self::Transaction => write!(f, "Transaction control"),
            Self::Multiple(inner) => write!(f, "Multiple ({})", inner),
            Self::Empty => write!(f, "Empty"),
            Self::Unknown => write!(f, "Unknown"),
        }
    }
}

/// Result of classifying a SQL string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassificationResult {
    /// The most dangerous level found across all statements.
    pub level: SafetyLevel,
    /// The type of statement(s) detected.
    pub statement_type: StatementType,
    /// Whether the last statement produces a tuple table (queries, EXPLAIN,
    /// SHOW, DML with RETURNING).
    pub returns_rows: bool,
    /// First COPY or transaction control statement anywhere in the text.
    pub refused: Option<StatementType>,
}

impl ClassificationResult {
    /// Creates a new classification result.
    pub fn new(level: SafetyLevel, statement_type: StatementType, returns_rows: bool) -> Self {
        let refused = match statement_type.last() {
            t @ (StatementType::Copy | StatementType::Transaction) => Some(t.clone()),
            _ => None,
        };
        Self {
            level,
            statement_type,
            returns_rows,
            refused,
        }
    }

    /// Marks the text as holding a statement no engine may run, even when
    /// it is not the last one.
    pub fn with_refused(mut self, refused: Option<StatementType>) -> Self {
        if self.refused.is_none() {
            self.refused = refused;
        }
        self
    }

    /// Returns true if a read-only execution may run this SQL.
    pub fn allowed_in_read_only(&self) -> bool {
        self.level.allowed_in_read_only()
    }

    /// Status code an engine reports after running the statement successfully,
    /// or the failure code for statements an engine refuses to run.
    pub fn status_code(&self) -> i32 {
        match self.refused {
            Some(StatementType::Copy) => return status::SPI_ERROR_COPY,
            Some(_) => return status::SPI_ERROR_TRANSACTION,
            None => {}
        }

        let returning = self.returns_rows;
        match self.statement_type.last() {
            StatementType::Select => status::SPI_OK_SELECT,
            StatementType::SelectInto => status::SPI_OK_SELINTO,
            StatementType::Insert if returning => status::SPI_OK_INSERT_RETURNING,
            StatementType::Insert => status::SPI_OK_INSERT,
            StatementType::Update if returning => status::SPI_OK_UPDATE_RETURNING,
            StatementType::Update => status::SPI_OK_UPDATE,
            StatementType::Delete if returning => status::SPI_OK_DELETE_RETURNING,
            StatementType::Delete => status::SPI_OK_DELETE,
            StatementType::Merge => status::SPI_OK_MERGE,
            StatementType::Copy => status::SPI_ERROR_COPY,
            StatementType::Transaction => status::SPI_ERROR_TRANSACTION,
            StatementType::Empty => status::SPI_ERROR_ARGUMENT,
            _ => status::SPI_OK_UTILITY,
        }
    }
}

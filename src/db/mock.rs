//! In-memory query engine for testing.
//!
//! Holds tables and scripted statements in memory, implements nested scopes
//! as snapshots of the table set, and records every scope transition so tests
//! can check that each scope is closed exactly once.

use super::{
    read_only_violation, status, ColumnMeta, QueryEngine, RawResultSet, Row, ScopeGate,
    TupleDescriptor, Value,
};
use crate::error::{MatrixError, Result};
use crate::safety::classify_sql;
use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;
use tracing::debug;

/// Scope transitions and submissions observed by a [`MockEngine`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScopeEvent {
    Begin,
    Submit(String),
    Commit,
    Abort,
    Abandon,
}

#[derive(Debug, Clone, Default)]
struct MockTable {
    descriptor: TupleDescriptor,
    rows: Vec<Row>,
}

type Tables = BTreeMap<String, MockTable>;

#[derive(Debug, Clone)]
enum Outcome {
    Rows(TupleDescriptor, Vec<Row>),
    Command(i32, u64),
    Status(i32),
    Error(String),
}

#[derive(Debug, Clone)]
struct Script {
    /// Rows appended to a table before the outcome is produced.
    effect: Option<(String, Vec<Row>)>,
    outcome: Outcome,
    delay: Option<Duration>,
}

impl Script {
    fn new(outcome: Outcome) -> Self {
        Self {
            effect: None,
            outcome,
            delay: None,
        }
    }
}

#[derive(Debug, Default)]
struct MockState {
    tables: Tables,
    scripts: HashMap<String, Script>,
    savepoints: Vec<Tables>,
    events: Vec<ScopeEvent>,
}

/// A mock query engine backed by in-memory tables.
#[derive(Debug, Default)]
pub struct MockEngine {
    state: Mutex<MockState>,
    gate: ScopeGate,
}

impl MockEngine {
    /// Creates an engine with no tables and no scripts.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a table readable with `SELECT * FROM <name>`.
    pub fn with_table(self, name: &str, columns: Vec<ColumnMeta>, rows: Vec<Row>) -> Self {
        self.lock().tables.insert(
            name.to_lowercase(),
            MockTable {
                descriptor: TupleDescriptor::new(columns),
                rows,
            },
        );
        self
    }

    /// Scripts a row-returning query.
    pub fn with_query(self, sql: &str, columns: Vec<ColumnMeta>, rows: Vec<Row>) -> Self {
        self.script(
            sql,
            Script::new(Outcome::Rows(TupleDescriptor::new(columns), rows)),
        )
    }

    /// Scripts a statement that completes with `status` and no tuple table.
    pub fn with_command(self, sql: &str, status: i32, row_count: u64) -> Self {
        self.script(sql, Script::new(Outcome::Command(status, row_count)))
    }

    /// Scripts a statement the engine refuses with a (negative) status code.
    pub fn with_status(self, sql: &str, status: i32) -> Self {
        self.script(sql, Script::new(Outcome::Status(status)))
    }

    /// Scripts a statement that raises an engine error.
    pub fn with_error(self, sql: &str, message: &str) -> Self {
        self.script(sql, Script::new(Outcome::Error(message.to_string())))
    }

    /// Scripts an insert that appends `rows` to `table`.
    pub fn with_insert(self, sql: &str, table: &str, rows: Vec<Row>) -> Self {
        let count = rows.len() as u64;
        self.script(
            sql,
            Script {
                effect: Some((table.to_lowercase(), rows)),
                outcome: Outcome::Command(status::SPI_OK_INSERT, count),
                delay: None,
            },
        )
    }

    /// Scripts an insert that appends `rows` to `table` and then fails.
    pub fn with_failing_insert(self, sql: &str, table: &str, rows: Vec<Row>, message: &str) -> Self {
        self.script(
            sql,
            Script {
                effect: Some((table.to_lowercase(), rows)),
                outcome: Outcome::Error(message.to_string()),
                delay: None,
            },
        )
    }

    /// Makes an already scripted statement sleep before completing.
    pub fn with_delay(self, sql: &str, delay: Duration) -> Self {
        if let Some(script) = self.lock().scripts.get_mut(&normalize(sql)) {
            script.delay = Some(delay);
        }
        self
    }

    /// Scope transitions and submissions seen so far.
    pub fn events(&self) -> Vec<ScopeEvent> {
        self.lock().events.clone()
    }

    /// Number of statements submitted so far.
    pub fn submitted(&self) -> usize {
        self.lock()
            .events
            .iter()
            .filter(|e| matches!(e, ScopeEvent::Submit(_)))
            .count()
    }

    /// Number of nested scopes currently open.
    pub fn open_scopes(&self) -> usize {
        self.lock().savepoints.len()
    }

    /// Current contents of a table, if it exists.
    pub fn table_rows(&self, name: &str) -> Option<Vec<Row>> {
        self.lock()
            .tables
            .get(&name.to_lowercase())
            .map(|t| t.rows.clone())
    }

    /// Loads tables from a JSON seed document.
    ///
    /// ```json
    /// { "tables": [ { "name": "points",
    ///                 "columns": [ { "name": "x", "type_name": "float8" } ],
    ///                 "rows": [ [1.5], [null] ] } ] }
    /// ```
    pub fn with_seed(mut self, json: &str) -> Result<Self> {
        let seed: Seed = serde_json::from_str(json)
            .map_err(|e| MatrixError::config(format!("Invalid mock seed: {e}")))?;

        for table in seed.tables {
            let rows: Vec<Row> = table
                .rows
                .into_iter()
                .map(|row| {
                    row.into_iter()
                        .enumerate()
                        .map(|(i, v)| seed_value(v, table.columns.get(i)))
                        .collect()
                })
                .collect();
            self = self.with_table(&table.name, table.columns, rows);
        }
        Ok(self)
    }

    fn script(self, sql: &str, script: Script) -> Self {
        self.lock().scripts.insert(normalize(sql), script);
        self
    }

    fn lock(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn rollback_innermost(&self, event: ScopeEvent) -> Result<()> {
        let mut state = self.lock();
        let snapshot = state
            .savepoints
            .pop()
            .ok_or_else(|| MatrixError::internal("no nested scope is open"))?;
        state.tables = snapshot;
        state.events.push(event);
        Ok(())
    }
}

#[async_trait]
impl QueryEngine for MockEngine {
    fn scope_gate(&self) -> &ScopeGate {
        &self.gate
    }

    async fn begin_nested_scope(&self) -> Result<()> {
        let mut state = self.lock();
        let snapshot = state.tables.clone();
        state.savepoints.push(snapshot);
        state.events.push(ScopeEvent::Begin);
        Ok(())
    }

    async fn submit(&self, sql: &str, read_only: bool, row_limit: u64) -> Result<RawResultSet> {
        let key = normalize(sql);
        let script = {
            let mut state = self.lock();
            if state.savepoints.is_empty() {
                return Err(MatrixError::internal("submit called outside a nested scope"));
            }
            state.events.push(ScopeEvent::Submit(sql.to_string()));
            state.scripts.get(&key).cloned()
        };

        let classification = classify_sql(sql);
        let refused = classification.status_code();
        if refused < 0 {
            return Ok(RawResultSet::failure(refused));
        }

        let Some(script) = script else {
            if read_only && !classification.allowed_in_read_only() {
                return Err(read_only_violation(&classification.statement_type));
            }
            return self.scan_table(&key, row_limit);
        };

        // Scripted statements carry their own effects, so the classifier
        // only gets a say when it can parse them.
        if read_only && (script.effect.is_some() || !classification.allowed_in_read_only()) {
            return Err(read_only_violation(&classification.statement_type));
        }

        if let Some(delay) = script.delay {
            debug!("Mock engine sleeping {:?} before completing", delay);
            tokio::time::sleep(delay).await;
        }

        if let Some((table, rows)) = &script.effect {
            let mut state = self.lock();
            let target = state.tables.entry(table.clone()).or_default();
            target.rows.extend(rows.iter().cloned());
        }

        match script.outcome {
            Outcome::Rows(descriptor, mut rows) => {
                truncate_to_limit(&mut rows, row_limit);
                Ok(RawResultSet::with_rows(status::SPI_OK_SELECT, descriptor, rows))
            }
            Outcome::Command(status, count) => Ok(RawResultSet::command(status, count)),
            Outcome::Status(status) => Ok(RawResultSet::failure(status)),
            Outcome::Error(message) => Err(MatrixError::query(message)),
        }
    }

    async fn commit_nested_scope(&self) -> Result<()> {
        let mut state = self.lock();
        state
            .savepoints
            .pop()
            .ok_or_else(|| MatrixError::internal("no nested scope is open"))?;
        state.events.push(ScopeEvent::Commit);
        Ok(())
    }

    async fn abort_nested_scope(&self) -> Result<()> {
        self.rollback_innermost(ScopeEvent::Abort)
    }

    fn abandon_nested_scope(&self) {
        if let Err(e) = self.rollback_innermost(ScopeEvent::Abandon) {
            debug!("Mock engine abandon ignored: {}", e);
        }
    }

    async fn close(&self) -> Result<()> {
        Ok(())
    }
}

impl MockEngine {
    fn scan_table(&self, key: &str, row_limit: u64) -> Result<RawResultSet> {
        let words: Vec<&str> = key.split_whitespace().collect();
        let name = match words.as_slice() {
            ["select", "*", "from", name] => *name,
            _ => return Err(MatrixError::query(format!("syntax error in mock statement: {key}"))),
        };

        let state = self.lock();
        let table = state
            .tables
            .get(name)
            .ok_or_else(|| MatrixError::query(format!("relation \"{name}\" does not exist")))?;

        let mut rows = table.rows.clone();
        truncate_to_limit(&mut rows, row_limit);
        Ok(RawResultSet::with_rows(
            status::SPI_OK_SELECT,
            table.descriptor.clone(),
            rows,
        ))
    }
}

#[derive(Debug, serde::Deserialize)]
struct Seed {
    #[serde(default)]
    tables: Vec<SeedTable>,
}

#[derive(Debug, serde::Deserialize)]
struct SeedTable {
    name: String,
    columns: Vec<ColumnMeta>,
    #[serde(default)]
    rows: Vec<Vec<serde_json::Value>>,
}

/// Converts a JSON cell, reading numbers as floats for floating point columns.
fn seed_value(value: serde_json::Value, column: Option<&ColumnMeta>) -> Value {
    let float_column = column.is_some_and(|c| {
        matches!(
            c.type_name.as_str(),
            "float4" | "float8" | "real" | "double precision" | "numeric" | "decimal"
        )
    });
    match value {
        serde_json::Value::Null => Value::Null,
        serde_json::Value::Bool(b) => Value::Bool(b),
        serde_json::Value::Number(n) => match n.as_i64() {
            Some(i) if !float_column => Value::Int(i),
            _ => Value::Float(n.as_f64().unwrap_or(f64::NAN)),
        },
        serde_json::Value::String(s) => Value::String(s),
        other => Value::String(other.to_string()),
    }
}

fn truncate_to_limit(rows: &mut Vec<Row>, row_limit: u64) {
    if row_limit > 0 {
        rows.truncate(usize::try_from(row_limit).unwrap_or(usize::MAX));
    }
}

/// Lower-cases, collapses whitespace and strips a trailing semicolon.
fn normalize(sql: &str) -> String {
    sql.trim()
        .trim_end_matches(';')
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

//! SQL parsing and classification logic.
//!
//! Uses sqlparser-rs with PostgreSQL dialect to parse SQL and classify
//! statements by their safety level.

use sqlparser::ast::{Query, Select, Set, SetExpr, Statement, TableFactor, TableWithJoins};
use sqlparser::dialect::PostgreSqlDialect;
use sqlparser::parser::Parser;
use sqlparser::tokenizer::{Token, Tokenizer};

use crate::error::{MatrixError, Result};

use super::{ClassificationResult, SafetyLevel, StatementType};

/// Level and type found for one statement or sub-expression.
type Found = (SafetyLevel, StatementType);

/// Leading words of transaction control statements, including the forms
/// sqlparser does not parse (ABORT, END, COMMIT PREPARED, ROLLBACK PREPARED).
const TRANSACTION_KEYWORDS: &[&str] = &[
    "ABORT",
    "BEGIN",
    "COMMIT",
    "END",
    "RELEASE",
    "ROLLBACK",
    "SAVEPOINT",
    "START",
];

/// SQL classifier that parses and classifies SQL queries.
#[derive(Debug)]
pub struct SqlClassifier {
    dialect: PostgreSqlDialect,
}

impl Default for SqlClassifier {
    fn default() -> Self {
        Self::new()
    }
}

impl SqlClassifier {
    /// Creates a new SQL classifier.
    pub fn new() -> Self {
        Self {
            dialect: PostgreSqlDialect {},
        }
    }

    /// Classifies a SQL string.
    ///
    /// SQL that cannot be parsed is reported as `Unknown` and `Destructive`,
    /// so a read-only execution refuses it.
    pub fn classify(&self, sql: &str) -> ClassificationResult {
        if sql.trim().is_empty() {
            return ClassificationResult::new(SafetyLevel::Safe, StatementType::Empty, false);
        }

        let result = match self.parse_and_classify(sql) {
            Ok(result) => result,
            Err(_) => {
                ClassificationResult::new(SafetyLevel::Destructive, StatementType::Unknown, false)
            }
        };

        if result.refused.is_some() {
            return result;
        }
        let refused = self.leading_refusal(sql);
        result.with_refused(refused)
    }

    /// Scans the leading words of every statement in the text for COPY and
    /// transaction control, without needing the statements to parse.
    fn leading_refusal(&self, sql: &str) -> Option<StatementType> {
        let mut tokens = Tokenizer::new(&self.dialect, sql).tokenize().ok()?;
        tokens.push(Token::SemiColon);

        let mut lead: Vec<String> = Vec::with_capacity(2);
        for token in &tokens {
            match token {
                Token::Whitespace(_) => {}
                Token::SemiColon => {
                    if let Some(found) = refused_lead(&lead) {
                        return Some(found);
                    }
                    lead.clear();
                }
                other if lead.len() < 2 => lead.push(match other {
                    Token::Word(word) => word.value.to_ascii_uppercase(),
                    _ => String::new(),
                }),
                _ => {}
            }
        }
        None
    }

    fn parse_and_classify(&self, sql: &str) -> Result<ClassificationResult> {
        let statements = Parser::parse_sql(&self.dialect, sql)
            .map_err(|e| MatrixError::query(format!("SQL parse error: {}", e)))?;

        let Some(last) = statements.last() else {
            return Ok(ClassificationResult::new(
                SafetyLevel::Safe,
                StatementType::Empty,
                false,
            ));
        };

        let returns_rows = statement_returns_rows(last);

        if statements.len() == 1 {
            let (level, stmt_type) = classify_statement(last);
            return Ok(ClassificationResult::new(level, stmt_type, returns_rows));
        }

        // Multiple statements: the most dangerous level decides read-only
        // admission, the last statement decides the reported result.
        let max_level = statements
            .iter()
            .map(|stmt| classify_statement(stmt).0)
            .max_by_key(SafetyLevel::priority)
            .unwrap_or(SafetyLevel::Safe);
        let (_, last_type) = classify_statement(last);
        let refused = statements
            .iter()
            .map(|stmt| classify_statement(stmt).1)
            .find(|t| matches!(t, StatementType::Copy | StatementType::Transaction));

        Ok(ClassificationResult::new(
            max_level,
            StatementType::Multiple(Box::new(last_type)),
            returns_rows,
        )
        .with_refused(refused))
    }
}

fn refused_lead(lead: &[String]) -> Option<StatementType> {
    match lead {
        [first, ..] if first == "COPY" => Some(StatementType::Copy),
        [first, second] if first == "PREPARE" && second == "TRANSACTION" => {
            Some(StatementType::Transaction)
        }
        [first, ..] if TRANSACTION_KEYWORDS.contains(&first.as_str()) => {
            Some(StatementType::Transaction)
        }
        _ => None,
    }
}

/// Convenience function to classify SQL without creating a classifier instance.
pub fn classify_sql(sql: &str) -> ClassificationResult {
    SqlClassifier::new().classify(sql)
}

fn more_dangerous(current: Found, candidate: Found) -> Found {
    if candidate.0.priority() > current.0.priority() {
        candidate
    } else {
        current
    }
}

/// Returns true if the statement hands back a tuple table.
fn statement_returns_rows(statement: &Statement) -> bool {
    match statement {
        Statement::Query(query) => !query_selects_into(query),
        Statement::Explain { .. } => true,
        Statement::ShowVariable { .. }
        | Statement::ShowTables { .. }
        | Statement::ShowColumns { .. }
        | Statement::ShowCreate { .. }
        | Statement::ShowFunctions { .. }
        | Statement::ShowStatus { .. }
        | Statement::ShowCollation { .. } => true,
        Statement::Insert(insert) => insert.returning.is_some(),
        Statement::Update { returning, .. } => returning.is_some(),
        Statement::Delete(delete) => delete.returning.is_some(),
        _ => false,
    }
}

fn query_selects_into(query: &Query) -> bool {
    matches!(query.body.as_ref(), SetExpr::Select(select) if select.into.is_some())
}

/// Classifies a single parsed statement.
fn classify_statement(statement: &Statement) -> Found {
    match statement {
        // Query: may contain data-modifying CTEs, so recurse
        Statement::Query(query) => classify_query(query),
        Statement::Explain {
            analyze, statement, ..
        } => {
            if *analyze {
                // EXPLAIN ANALYZE executes the statement
                let (inner_level, _) = classify_statement(statement);
                (inner_level, StatementType::Explain)
            } else {
                (SafetyLevel::Safe, StatementType::Explain)
            }
        }
        Statement::ShowVariable { .. }
        | Statement::ShowTables { .. }
        | Statement::ShowColumns { .. }
        | Statement::ShowCreate { .. }
        | Statement::ShowFunctions { .. }
        | Statement::ShowStatus { .. }
        | Statement::ShowCollation { .. } => (SafetyLevel::Safe, StatementType::Show),

        // Mutating: data modification
        Statement::Insert(_) => (SafetyLevel::Mutating, StatementType::Insert),
        Statement::Update { .. } => (SafetyLevel::Mutating, StatementType::Update),
        Statement::Merge { .. } => (SafetyLevel::Mutating, StatementType::Merge),

        // Refused by engines regardless of mode
        Statement::Copy { .. } => (SafetyLevel::Destructive, StatementType::Copy),
        Statement::StartTransaction { .. }
        | Statement::Set(Set::SetTransaction { .. })
        | Statement::Commit { .. }
        | Statement::Rollback { .. }
        | Statement::Savepoint { .. }
        | Statement::ReleaseSavepoint { .. } => {
            (SafetyLevel::Destructive, StatementType::Transaction)
        }

        // Destructive: data loss or schema changes
        Statement::Delete(_) => (SafetyLevel::Destructive, StatementType::Delete),
        Statement::Drop { .. } => (SafetyLevel::Destructive, StatementType::Drop),
        Statement::Truncate { .. } => (SafetyLevel::Destructive, StatementType::Truncate),
        Statement::AlterTable { .. }
        | Statement::AlterIndex { .. }
        | Statement::AlterView { .. }
        | Statement::AlterRole { .. } => (SafetyLevel::Destructive, StatementType::Alter),
        Statement::CreateTable { .. }
        | Statement::CreateIndex { .. }
        | Statement::CreateView { .. }
        | Statement::CreateSchema { .. }
        | Statement::CreateDatabase { .. }
        | Statement::CreateFunction { .. }
        | Statement::CreateProcedure { .. }
        | Statement::CreateRole { .. }
        | Statement::CreateSequence { .. }
        | Statement::CreateType { .. } => (SafetyLevel::Destructive, StatementType::Create),
        Statement::Grant { .. } => (SafetyLevel::Destructive, StatementType::Grant),
        Statement::Revoke { .. } => (SafetyLevel::Destructive, StatementType::Revoke),

        // Conservative default: treat unknown statements as destructive
        _ => (SafetyLevel::Destructive, StatementType::Unknown),
    }
}

/// Classifies a Query by recursively inspecting for data-modifying operations.
fn classify_query(query: &Query) -> Found {
    let mut found = (SafetyLevel::Safe, StatementType::Select);

    if let Some(with) = &query.with {
        for cte in &with.cte_tables {
            found = more_dangerous(found, classify_query(&cte.query));
        }
    }

    more_dangerous(found, classify_set_expr(&query.body))
}

/// Classifies a SetExpr, detecting mutations and recursing into nested queries.
fn classify_set_expr(set_expr: &SetExpr) -> Found {
    match set_expr {
        // Direct mutations in CTE bodies (wrapped as Statement)
        SetExpr::Delete(stmt) => classify_statement(stmt),
        SetExpr::Update(stmt) => classify_statement(stmt),
        SetExpr::Insert(stmt) => classify_statement(stmt),
        SetExpr::Merge(stmt) => classify_statement(stmt),

        SetExpr::Query(query) => classify_query(query),
        SetExpr::Select(select) => classify_select(select),

        // UNION, INTERSECT, EXCEPT
        SetExpr::SetOperation { left, right, .. } => {
            more_dangerous(classify_set_expr(left), classify_set_expr(right))
        }

        SetExpr::Values(_) | SetExpr::Table(_) => (SafetyLevel::Safe, StatementType::Select),
    }
}

/// Classifies a Select: SELECT INTO creates a table, and the FROM clause may
/// hold data-modifying subqueries.
fn classify_select(select: &Select) -> Found {
    let mut found = if select.into.is_some() {
        (SafetyLevel::Destructive, StatementType::SelectInto)
    } else {
        (SafetyLevel::Safe, StatementType::Select)
    };

    for table_with_joins in &select.from {
        found = more_dangerous(found, classify_table_with_joins(table_with_joins));
    }

    found
}

fn classify_table_with_joins(twj: &TableWithJoins) -> Found {
    let mut found = classify_table_factor(&twj.relation);
    for join in &twj.joins {
        found = more_dangerous(found, classify_table_factor(&join.relation));
    }
    found
}

fn classify_table_factor(factor: &TableFactor) -> Found {
    match factor {
        TableFactor::Derived { subquery, .. } => classify_query(subquery),
        TableFactor::NestedJoin {
            table_with_joins, ..
        } => classify_table_with_joins(table_with_joins),
        _ => (SafetyLevel::Safe, StatementType::Select),
    }
}

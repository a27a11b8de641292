//! Rendering of matrix results for the command line.
//!
//! Provides three formats: an aligned text table, CSV and JSON.

use serde::Serialize;

use crate::db::status::result_code_to_string;
use crate::matrix::MatrixResult;

/// Output format for rendered results.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputFormat {
    /// Aligned table followed by a status line.
    #[default]
    Text,
    /// Header line plus one line per row.
    Csv,
    /// Status, column metadata and matrix rows.
    Json,
}

impl std::str::FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "text" => Ok(Self::Text),
            "csv" => Ok(Self::Csv),
            "json" => Ok(Self::Json),
            _ => Err(format!(
                "Invalid output format: {s}. Expected: text, csv, or json"
            )),
        }
    }
}

#[derive(Debug, Serialize)]
struct JsonOutput {
    status: i32,
    status_name: String,
    nrows: Option<u64>,
    shape: Option<(usize, usize)>,
    columns: Vec<JsonColumn>,
    /// NaN cells serialize as `null`.
    matrix: Option<Vec<Vec<f64>>>,
}

#[derive(Debug, Serialize)]
struct JsonColumn {
    name: String,
    type_name: String,
}

/// Formats matrix results.
pub struct ResultOutput {
    format: OutputFormat,
}

impl ResultOutput {
    /// Creates a new output formatter.
    pub fn new(format: OutputFormat) -> Self {
        Self { format }
    }

    /// Formats the result according to the configured format.
    pub fn format(&self, result: &MatrixResult) -> String {
        match self.format {
            OutputFormat::Text => format_text(result),
            OutputFormat::Csv => format_csv(result),
            OutputFormat::Json => format_json(result),
        }
    }
}

fn format_text(result: &MatrixResult) -> String {
    let summary = format!(
        "{} ({} rows)",
        result_code_to_string(result.status()),
        result.nrows().unwrap_or(0)
    );

    let Some(matrix) = result.matrix() else {
        return format!("{summary}\n");
    };

    let headers = result.colnames().unwrap_or_default();
    let rows: Vec<Vec<String>> = matrix
        .rows()
        .into_iter()
        .map(|row| row.iter().map(|v| format_cell(*v)).collect())
        .collect();

    let table = format_table(&headers, &rows);
    if table.is_empty() {
        format!("{summary}\n")
    } else {
        format!("{table}\n{summary}\n")
    }
}

fn format_csv(result: &MatrixResult) -> String {
    let Some(matrix) = result.matrix() else {
        return String::new();
    };

    let mut output = result
        .colnames()
        .unwrap_or_default()
        .iter()
        .map(|name| csv_field(name))
        .collect::<Vec<_>>()
        .join(",");
    output.push('\n');

    for row in matrix.rows() {
        let line = row
            .iter()
            .map(|v| if v.is_nan() { String::new() } else { v.to_string() })
            .collect::<Vec<_>>()
            .join(",");
        output.push_str(&line);
        output.push('\n');
    }
    output
}

fn format_json(result: &MatrixResult) -> String {
    let columns = match (result.colnames(), result.coltypes()) {
        (Ok(names), Ok(types)) => names
            .into_iter()
            .zip(types)
            .map(|(name, type_name)| JsonColumn { name, type_name })
            .collect(),
        _ => Vec::new(),
    };

    let json_output = JsonOutput {
        status: result.status(),
        status_name: result_code_to_string(result.status()),
        nrows: result.nrows(),
        shape: result.shape(),
        columns,
        matrix: result
            .matrix()
            .map(|m| m.rows().into_iter().map(|row| row.to_vec()).collect()),
    };

    serde_json::to_string_pretty(&json_output)
        .unwrap_or_else(|e| format!("{{\"error\": \"Failed to serialize: {}\"}}", e))
}

fn format_cell(value: f64) -> String {
    if value.is_nan() {
        "NaN".to_string()
    } else {
        value.to_string()
    }
}

fn csv_field(field: &str) -> String {
    if field.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}

/// Formats an aligned table with right-aligned numeric cells.
fn format_table(headers: &[String], rows: &[Vec<String>]) -> String {
    if headers.is_empty() {
        return String::new();
    }

    let mut widths: Vec<usize> = headers.iter().map(|h| h.len()).collect();
    for row in rows {
        for (i, cell) in row.iter().enumerate() {
            if i < widths.len() {
                widths[i] = widths[i].max(cell.len());
            }
        }
    }

    let mut output = String::new();

    let header_line: Vec<String> = headers
        .iter()
        .enumerate()
        .map(|(i, h)| format!("{:>width$}", h, width = widths[i]))
        .collect();
    output.push_str(&header_line.join(" │ "));
    output.push('\n');

    let separator: Vec<String> = widths.iter().map(|w| "─".repeat(*w)).collect();
    output.push_str(&separator.join("─┼─"));
    output.push('\n');

    for row in rows {
        let row_line: Vec<String> = row
            .iter()
            .enumerate()
            .map(|(i, cell)| {
                let width = widths.get(i).copied().unwrap_or(cell.len());
                format!("{:>width$}", cell, width = width)
            })
            .collect();
        output.push_str(&row_line.join(" │ "));
        output.push('\n');
    }

    output.trim_end().to_string()
}

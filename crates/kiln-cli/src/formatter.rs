//! Output formatting for query results.
//!
//! Supports table, JSON and CSV output formats.

use comfy_table::{Cell, ContentArrangement, Table};

use kiln_engine::QueryResult;

/// Output format options.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    /// Formatted table output.
    Table,
    /// JSON output.
    Json,
    /// CSV output.
    Csv,
}

/// Formats a query result according to the specified format.
pub fn format_result(result: &QueryResult, format: OutputFormat) -> String {
    if !result.success {
        return format!(
            "ERROR: {}\n",
            result.error_message.as_deref().unwrap_or("unknown error")
        );
    }
    match format {
        OutputFormat::Table => format_table(result),
        OutputFormat::Json => format_json(result),
        OutputFormat::Csv => format_csv(result),
    }
}

/// Footer line for table output: row count and elapsed time.
pub fn format_footer(result: &QueryResult) -> String {
    let elapsed = result.execution_time.as_secs_f64() * 1000.0;
    match result.rows_affected() {
        Some(n) => format!("{} row(s) affected ({:.2}ms)", n, elapsed),
        None => format!("({} rows, {:.2}ms)", result.row_count, elapsed),
    }
}

fn format_table(result: &QueryResult) -> String {
    let mut table = Table::new();

    table
        .set_content_arrangement(ContentArrangement::Dynamic)
        .load_preset(comfy_table::presets::UTF8_FULL)
        .apply_modifier(comfy_table::modifiers::UTF8_ROUND_CORNERS);

    if !result.result_schema.is_empty() {
        table.set_header(result.result_schema.names().into_iter().map(Cell::new));
    }

    for row in &result.rows {
        table.add_row(row.iter().map(|v| Cell::new(v.to_string())));
    }

    format!("{}\n{}\n", table, format_footer(result))
}

fn format_json(result: &QueryResult) -> String {
    let mut output =
        serde_json::to_string_pretty(&result.to_json()).unwrap_or_else(|_| "[]".to_string());
    output.push('\n');
    output
}

fn format_csv(result: &QueryResult) -> String {
    let mut output = String::new();

    if !result.result_schema.is_empty() {
        let header: Vec<String> = result
            .result_schema
            .names()
            .into_iter()
            .map(escape_csv)
            .collect();
        output.push_str(&header.join(","));
        output.push('\n');
    }

    for row in &result.rows {
        let values: Vec<String> = row.iter().map(|v| escape_csv(&v.to_string())).collect();
        output.push_str(&values.join(","));
        output.push('\n');
    }

    output
}

/// Escapes a value for CSV output.
fn escape_csv(value: &str) -> String {
    if value.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kiln_engine::{ResultSchema, RowFormat};
    use kiln_sql::{DataType, Row, Value};

    fn make_test_result() -> QueryResult {
        QueryResult::ok(
            ResultSchema::from_columns([
                ("id", DataType::Int),
                ("name", DataType::Varchar(16)),
                ("active", DataType::Boolean),
            ]),
            vec![
                Row::new(vec![
                    Value::Int(1),
                    Value::String("Alice".to_string()),
                    Value::Boolean(true),
                ]),
                Row::new(vec![
                    Value::Int(2),
                    Value::String("Bob, Jr.".to_string()),
                    Value::Boolean(false),
                ]),
            ],
            RowFormat::PointerArrayOfFields,
        )
    }

    #[test]
    fn test_format_table() {
        let output = format_table(&make_test_result());
        assert!(output.contains("id"));
        assert!(output.contains("name"));
        assert!(output.contains("Alice"));
        assert!(output.contains("(2 rows"));
    }

    #[test]
    fn test_format_json() {
        let output = format_json(&make_test_result());
        let parsed: Vec<serde_json::Value> = serde_json::from_str(&output).unwrap();
        assert_eq!(parsed.len(), 2);
        assert_eq!(parsed[0]["name"], "Alice");
        assert_eq!(parsed[1]["id"], 2);
        assert_eq!(parsed[1]["active"], false);
    }

    #[test]
    fn test_format_csv() {
        let output = format_csv(&make_test_result());
        let lines: Vec<&str> = output.lines().collect();
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0], "id,name,active");
        assert_eq!(lines[2], "2,\"Bob, Jr.\",false");
    }

    #[test]
    fn test_escape_csv() {
        assert_eq!(escape_csv("hello"), "hello");
        assert_eq!(escape_csv("hello,world"), "\"hello,world\"");
        assert_eq!(escape_csv("hello\"world"), "\"hello\"\"world\"");
    }

    #[test]
    fn test_affected_footer() {
        let result = QueryResult::affected(3);
        assert!(format_footer(&result).starts_with("3 row(s) affected"));
        assert_eq!(format_csv(&result), "rows_affected\n3\n");
    }

    #[test]
    fn test_error_result() {
        let result = QueryResult::error("table not found: t");
        assert_eq!(
            format_result(&result, OutputFormat::Json),
            "ERROR: table not found: t\n"
        );
    }
}

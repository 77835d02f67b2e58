//! Statement results.

use std::time::Duration;

use kiln_common::ROWS_AFFECTED_COLUMN;
use kiln_sql::{DataType, Row, Value};

/// One column of a result.
#[derive(Debug, Clone, PartialEq)]
pub struct ResultColumn {
    /// Column name.
    pub name: String,
    /// Column type.
    pub data_type: DataType,
}

/// Names and types of result columns.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResultSchema {
    /// Columns in output order.
    pub columns: Vec<ResultColumn>,
}

impl ResultSchema {
    /// Builds a schema from `(name, type)` pairs.
    pub fn from_columns<I, S>(columns: I) -> Self
    where
        I: IntoIterator<Item = (S, DataType)>,
        S: Into<String>,
    {
        Self {
            columns: columns
                .into_iter()
                .map(|(name, data_type)| ResultColumn {
                    name: name.into(),
                    data_type,
                })
                .collect(),
        }
    }

    /// Number of columns.
    pub fn len(&self) -> usize {
        self.columns.len()
    }

    /// Returns true if there are no columns.
    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    /// Column names.
    pub fn names(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.name.as_str()).collect()
    }
}

/// How the kernel delivered the result rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RowFormat {
    /// Whole records copied out of the page.
    DirectRecordPointer,
    /// A generated struct holding the projected fields.
    PointerArrayOfFields,
}

/// Result of one statement.
#[derive(Debug, Clone)]
pub struct QueryResult {
    /// Result rows, owned.
    pub rows: Vec<Row>,
    /// Number of rows.
    pub row_count: usize,
    /// Result columns.
    pub result_schema: ResultSchema,
    /// How rows were produced.
    pub row_format: RowFormat,
    /// False if the statement failed.
    pub success: bool,
    /// Failure description when `success` is false.
    pub error_message: Option<String>,
    /// Wall time spent on the statement.
    pub execution_time: Duration,
}

impl QueryResult {
    /// A successful result.
    pub fn ok(result_schema: ResultSchema, rows: Vec<Row>, row_format: RowFormat) -> Self {
        Self {
            row_count: rows.len(),
            rows,
            result_schema,
            row_format,
            success: true,
            error_message: None,
            execution_time: Duration::ZERO,
        }
    }

    /// A failed result.
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            rows: Vec::new(),
            row_count: 0,
            result_schema: ResultSchema::default(),
            row_format: RowFormat::PointerArrayOfFields,
            success: false,
            error_message: Some(message.into()),
            execution_time: Duration::ZERO,
        }
    }

    /// A single-row `rows_affected` result.
    pub fn affected(count: usize) -> Self {
        let value = i32::try_from(count).unwrap_or(i32::MAX);
        Self::ok(
            ResultSchema::from_columns([(ROWS_AFFECTED_COLUMN, DataType::Int)]),
            vec![Row::new(vec![Value::Int(value)])],
            RowFormat::PointerArrayOfFields,
        )
    }

    /// Sets the execution time.
    pub fn with_elapsed(mut self, elapsed: Duration) -> Self {
        self.execution_time = elapsed;
        self
    }

    /// Affected row count for write statements.
    pub fn rows_affected(&self) -> Option<usize> {
        match self.result_schema.names().as_slice() {
            [name] if *name == ROWS_AFFECTED_COLUMN => self
                .scalar()
                .and_then(|v| v.as_i64())
                .and_then(|n| usize::try_from(n).ok()),
            _ => None,
        }
    }

    /// First value of the first row.
    pub fn scalar(&self) -> Option<&Value> {
        self.rows.first().and_then(|r| r.get(0))
    }

    /// Returns true if there are no rows.
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Rows as JSON objects keyed by column name.
    pub fn to_json(&self) -> serde_json::Value {
        let rows = self
            .rows
            .iter()
            .map(|row| {
                let object = self
                    .result_schema
                    .columns
                    .iter()
                    .zip(row.iter())
                    .map(|(col, value)| (col.name.clone(), value.to_json()))
                    .collect::<serde_json::Map<_, _>>();
                serde_json::Value::Object(object)
            })
            .collect();
        serde_json::Value::Array(rows)
    }

    /// Pretty prints the result.
    pub fn display(&self) -> String {
        if !self.success {
            return format!(
                "ERROR: {}\n",
                self.error_message.as_deref().unwrap_or("unknown error")
            );
        }

        let mut output = String::new();
        let names = self.result_schema.names();
        let mut col_widths: Vec<usize> = names.iter().map(|n| n.len()).collect();

        for row in &self.rows {
            for (i, val) in row.iter().enumerate() {
                if let Some(width) = col_widths.get_mut(i) {
                    *width = (*width).max(val.to_string().len());
                }
            }
        }

        for (i, name) in names.iter().enumerate() {
            if i > 0 {
                output.push_str(" | ");
            }
            output.push_str(&format!("{:width$}", name, width = col_widths[i]));
        }
        output.push('\n');

        for (i, width) in col_widths.iter().enumerate() {
            if i > 0 {
                output.push_str("-+-");
            }
            output.push_str(&"-".repeat(*width));
        }
        output.push('\n');

        for row in &self.rows {
            for (i, val) in row.iter().enumerate() {
                if i > 0 {
                    output.push_str(" | ");
                }
                let width = col_widths.get(i).copied().unwrap_or(0);
                output.push_str(&format!("{:width$}", val.to_string(), width = width));
            }
            output.push('\n');
        }

        output.push_str(&format!(
            "({} rows, {:.2}ms)\n",
            self.row_count,
            self.execution_time.as_secs_f64() * 1000.0
        ));
        output
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn people() -> QueryResult {
        QueryResult::ok(
            ResultSchema::from_columns([("id", DataType::Int), ("name", DataType::Text)]),
            vec![Row::new(vec![Value::Int(1), Value::String("Alice".into())])],
            RowFormat::DirectRecordPointer,
        )
    }

    #[test]
    fn test_display() {
        let display = people().display();
        assert!(display.contains("id"));
        assert!(display.contains("name"));
        assert!(display.contains("Alice"));
        assert!(display.contains("(1 rows"));
    }

    #[test]
    fn test_affected() {
        let result = QueryResult::affected(3);
        assert!(result.success);
        assert_eq!(result.rows_affected(), Some(3));
        assert_eq!(result.result_schema.names(), vec![ROWS_AFFECTED_COLUMN]);
        assert_eq!(people().rows_affected(), None);
    }

    #[test]
    fn test_error() {
        let result = QueryResult::error("table 'x' does not exist");
        assert!(!result.success);
        assert_eq!(result.row_count, 0);
        assert!(result.display().starts_with("ERROR: table 'x'"));
    }

    #[test]
    fn test_json() {
        let json = people().to_json();
        assert_eq!(json[0]["id"], serde_json::json!(1));
        assert_eq!(json[0]["name"], serde_json::json!("Alice"));
    }
}

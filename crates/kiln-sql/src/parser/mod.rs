//! SQL parser for Kiln.
//!
//! This module parses SQL with the `sqlparser` crate and converts the result
//! into Kiln's statement model, the input of validation and code generation.
//!
//! # Supported SQL
//!
//! - `SELECT *`, `SELECT COUNT(*)`, `SELECT col [AS alias], ...` over a
//!   single table with an optional WHERE and LIMIT
//! - `INSERT ... VALUES`, `UPDATE ... SET ... [WHERE]`, `DELETE ... [WHERE]`
//! - `CREATE TABLE`, `DROP TABLE`, `CREATE INDEX`
//!
//! # Usage
//!
//! ```
//! use kiln_sql::parser::{Parser, Statement};
//!
//! let sql = "SELECT id, name FROM users WHERE age > 18";
//! let statements = Parser::parse(sql).unwrap();
//! assert!(matches!(statements[0], Statement::Select(_)));
//! ```

use std::fmt;

use serde::{Deserialize, Serialize};
use sqlparser::dialect::PostgreSqlDialect;
use sqlparser::parser::Parser as SqlParser;
use thiserror::Error;

mod expr;
mod statement;
mod types;

pub use expr::*;
pub use statement::*;
pub use types::*;

/// Errors that can occur during SQL parsing.
#[derive(Debug, Error)]
pub enum ParseError {
    /// Error from the underlying sqlparser crate.
    #[error("SQL syntax error: {0}")]
    Syntax(String),

    /// Unsupported SQL feature.
    #[error("Unsupported SQL feature: {0}")]
    Unsupported(String),

    /// Invalid identifier.
    #[error("Invalid identifier: {0}")]
    InvalidIdentifier(String),

    /// Invalid literal value.
    #[error("Invalid literal: {0}")]
    InvalidLiteral(String),

    /// Empty query.
    #[error("Empty query")]
    EmptyQuery,
}

impl From<sqlparser::parser::ParserError> for ParseError {
    fn from(err: sqlparser::parser::ParserError) -> Self {
        ParseError::Syntax(err.to_string())
    }
}

/// Result type for parsing operations.
pub type ParseResult<T> = Result<T, ParseError>;

/// SQL parser for Kiln.
///
/// Uses the PostgreSQL dialect.
pub struct Parser;

impl Parser {
    /// Parses a SQL string into a list of statements.
    pub fn parse(sql: &str) -> ParseResult<Vec<Statement>> {
        if sql.trim().is_empty() {
            return Err(ParseError::EmptyQuery);
        }

        let dialect = PostgreSqlDialect {};
        let ast = SqlParser::parse_sql(&dialect, sql)?;

        if ast.is_empty() {
            return Err(ParseError::EmptyQuery);
        }

        ast.into_iter().map(Statement::from_sql_ast).collect()
    }

    /// Parses a single SQL statement.
    pub fn parse_one(sql: &str) -> ParseResult<Statement> {
        let mut statements = Self::parse(sql)?;
        if statements.len() != 1 {
            return Err(ParseError::Syntax(format!(
                "Expected 1 statement, got {}",
                statements.len()
            )));
        }
        Ok(statements.remove(0))
    }

    /// Parses a SQL expression.
    pub fn parse_expr(sql: &str) -> ParseResult<Expr> {
        let dialect = PostgreSqlDialect {};
        let mut parser = SqlParser::new(&dialect).try_with_sql(sql)?;
        let expr = parser.parse_expr()?;
        Expr::from_sql_ast(expr)
    }
}

/// A column reference (`table.column` or just `column`), optionally aliased
/// when it appears in a projection.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ColumnRef {
    /// Optional table or alias name.
    pub table: Option<String>,
    /// Column name.
    pub column: String,
    /// Output name in a projection.
    pub alias: Option<String>,
}

impl ColumnRef {
    /// Creates a new column reference.
    pub fn new(column: impl Into<String>) -> Self {
        Self {
            table: None,
            column: column.into(),
            alias: None,
        }
    }

    /// Creates a column reference with a table qualifier.
    pub fn qualified(table: impl Into<String>, column: impl Into<String>) -> Self {
        Self {
            table: Some(table.into()),
            column: column.into(),
            alias: None,
        }
    }

    /// Sets the output alias.
    #[must_use]
    pub fn with_alias(mut self, alias: impl Into<String>) -> Self {
        self.alias = Some(alias.into());
        self
    }

    /// Returns true if this column has a table qualifier.
    pub fn is_qualified(&self) -> bool {
        self.table.is_some()
    }

    /// Returns the name this column has in a result set.
    pub fn output_name(&self) -> &str {
        self.alias.as_deref().unwrap_or(&self.column)
    }
}

impl fmt::Display for ColumnRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(ref table) = self.table {
            write!(f, "{}.{}", table, self.column)
        } else {
            write!(f, "{}", self.column)
        }
    }
}

/// A table reference.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableRef {
    /// Optional schema name.
    pub schema: Option<String>,
    /// Table name.
    pub table: String,
    /// Optional alias.
    pub alias: Option<String>,
}

impl TableRef {
    /// Creates a new table reference.
    pub fn new(table: impl Into<String>) -> Self {
        Self {
            schema: None,
            table: table.into(),
            alias: None,
        }
    }

    /// Creates a table reference with a schema.
    pub fn with_schema(schema: impl Into<String>, table: impl Into<String>) -> Self {
        Self {
            schema: Some(schema.into()),
            table: table.into(),
            alias: None,
        }
    }

    /// Adds an alias to the table reference.
    #[must_use]
    pub fn with_alias(mut self, alias: impl Into<String>) -> Self {
        self.alias = Some(alias.into());
        self
    }

    /// Returns the effective name (alias or table name).
    pub fn effective_name(&self) -> &str {
        self.alias.as_deref().unwrap_or(&self.table)
    }

    /// Returns true if `qualifier` names this table (by name or alias).
    pub fn matches_qualifier(&self, qualifier: &str) -> bool {
        qualifier == self.table || self.alias.as_deref() == Some(qualifier)
    }
}

impl fmt::Display for TableRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(ref schema) = self.schema {
            write!(f, "{}.{}", schema, self.table)?;
        } else {
            write!(f, "{}", self.table)?;
        }
        if let Some(ref alias) = self.alias {
            write!(f, " AS {}", alias)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_simple_select() {
        let statements = Parser::parse("SELECT id, name FROM users").unwrap();
        assert_eq!(statements.len(), 1);

        match &statements[0] {
            Statement::Select(select) => {
                assert_eq!(select.columns.len(), 2);
                assert_eq!(select.from.table, "users");
            }
            _ => panic!("Expected SELECT statement"),
        }
    }

    #[test]
    fn test_parse_multiple_statements() {
        let statements =
            Parser::parse("INSERT INTO t VALUES (1); SELECT * FROM t; DELETE FROM t").unwrap();
        assert_eq!(statements.len(), 3);
        assert!(Parser::parse_one("SELECT 1 FROM t; SELECT 2 FROM t").is_err());
    }

    #[test]
    fn test_parse_empty_query() {
        assert!(matches!(Parser::parse(""), Err(ParseError::EmptyQuery)));
        assert!(matches!(Parser::parse("   \n"), Err(ParseError::EmptyQuery)));
    }

    #[test]
    fn test_parse_syntax_error() {
        assert!(matches!(
            Parser::parse("SELEC * FROM t"),
            Err(ParseError::Syntax(_))
        ));
    }

    #[test]
    fn test_column_ref() {
        let col = ColumnRef::new("id");
        assert_eq!(col.to_string(), "id");
        assert!(!col.is_qualified());

        let col = ColumnRef::qualified("users", "id").with_alias("user_id");
        assert_eq!(col.to_string(), "users.id");
        assert!(col.is_qualified());
        assert_eq!(col.output_name(), "user_id");
    }

    #[test]
    fn test_table_ref() {
        let table = TableRef::new("users");
        assert_eq!(table.to_string(), "users");

        let table = TableRef::with_schema("public", "users");
        assert_eq!(table.to_string(), "public.users");

        let table = TableRef::new("users").with_alias("u");
        assert_eq!(table.to_string(), "users AS u");
        assert_eq!(table.effective_name(), "u");
        assert!(table.matches_qualifier("u"));
        assert!(table.matches_qualifier("users"));
        assert!(!table.matches_qualifier("orders"));
    }
}

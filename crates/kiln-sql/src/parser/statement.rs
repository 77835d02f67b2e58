//! SQL statement representation.
//!
//! Each statement owns its expression trees. Only single-table statements
//! exist here; anything that needs a planner (joins, grouping, ordering,
//! sub-queries) is rejected at conversion time.

use serde::{Deserialize, Serialize};
use sqlparser::ast as sql_ast;

use super::{ColumnRef, DataType, Expr, Literal, ParseError, ParseResult, TableRef};
use crate::schema::ColumnDefinition;

/// A parsed SQL statement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Statement {
    /// SELECT query.
    Select(SelectStatement),
    /// INSERT statement.
    Insert(InsertStatement),
    /// UPDATE statement.
    Update(UpdateStatement),
    /// DELETE statement.
    Delete(DeleteStatement),
    /// CREATE TABLE statement.
    CreateTable(CreateTableStatement),
    /// DROP TABLE statement.
    DropTable(DropTableStatement),
    /// CREATE INDEX statement.
    CreateIndex(CreateIndexStatement),
}

impl Statement {
    /// Converts from sqlparser's Statement.
    pub fn from_sql_ast(stmt: sql_ast::Statement) -> ParseResult<Self> {
        match stmt {
            sql_ast::Statement::Query(query) => {
                Ok(Statement::Select(SelectStatement::from_sql_ast(*query)?))
            }
            sql_ast::Statement::Insert {
                table_name,
                columns,
                source,
                ..
            } => Ok(Statement::Insert(InsertStatement::from_parts(
                table_name, columns, source,
            )?)),
            sql_ast::Statement::Update {
                table,
                assignments,
                from,
                selection,
                ..
            } => {
                if from.is_some() {
                    return Err(ParseError::Unsupported("UPDATE ... FROM".to_string()));
                }
                Ok(Statement::Update(UpdateStatement::from_parts(
                    table,
                    assignments,
                    selection,
                )?))
            }
            sql_ast::Statement::Delete {
                from, selection, ..
            } => Ok(Statement::Delete(DeleteStatement::from_parts(
                from, selection,
            )?)),
            sql_ast::Statement::CreateTable {
                name,
                columns,
                constraints,
                if_not_exists,
                ..
            } => Ok(Statement::CreateTable(CreateTableStatement::from_parts(
                name,
                columns,
                constraints,
                if_not_exists,
            )?)),
            sql_ast::Statement::Drop {
                object_type: sql_ast::ObjectType::Table,
                if_exists,
                names,
                ..
            } => Ok(Statement::DropTable(DropTableStatement {
                names: names
                    .iter()
                    .map(table_ref_from_object_name)
                    .collect(),
                if_exists,
            })),
            sql_ast::Statement::CreateIndex {
                name,
                table_name,
                using,
                columns,
                unique,
                if_not_exists,
                ..
            } => Ok(Statement::CreateIndex(CreateIndexStatement::from_parts(
                name,
                table_name,
                using,
                columns,
                unique,
                if_not_exists,
            )?)),
            other => Err(ParseError::Unsupported(format!("Statement: {}", other))),
        }
    }

    /// Returns the name of the table this statement targets.
    pub fn table_name(&self) -> Option<&str> {
        match self {
            Statement::Select(s) => Some(&s.from.table),
            Statement::Insert(s) => Some(&s.table.table),
            Statement::Update(s) => Some(&s.table.table),
            Statement::Delete(s) => Some(&s.table.table),
            Statement::CreateTable(s) => Some(&s.name.table),
            Statement::CreateIndex(s) => Some(&s.table.table),
            Statement::DropTable(_) => None,
        }
    }
}

/// SELECT statement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SelectStatement {
    /// Projection: `*`, `COUNT(*)`, or column references.
    pub columns: Vec<Expr>,
    /// The single source table.
    pub from: TableRef,
    /// WHERE clause.
    pub where_clause: Option<Expr>,
    /// LIMIT clause.
    pub limit: Option<u64>,
}

impl SelectStatement {
    /// Creates a `SELECT * FROM table`.
    pub fn star(table: impl Into<String>) -> Self {
        Self {
            columns: vec![Expr::Star],
            from: TableRef::new(table),
            where_clause: None,
            limit: None,
        }
    }

    /// Converts from sqlparser's Query.
    pub fn from_sql_ast(query: sql_ast::Query) -> ParseResult<Self> {
        if query.with.is_some() {
            return Err(ParseError::Unsupported("WITH clause".to_string()));
        }
        if !query.order_by.is_empty() {
            return Err(ParseError::Unsupported("ORDER BY".to_string()));
        }
        if query.offset.is_some() || query.fetch.is_some() {
            return Err(ParseError::Unsupported("OFFSET / FETCH".to_string()));
        }

        let limit = query
            .limit
            .as_ref()
            .map(|expr| {
                extract_limit(expr)
                    .ok_or_else(|| ParseError::InvalidLiteral(format!("LIMIT {}", expr)))
            })
            .transpose()?;

        let select = match *query.body {
            sql_ast::SetExpr::Select(select) => *select,
            other => {
                return Err(ParseError::Unsupported(format!("Query body: {}", other)));
            }
        };

        if select.distinct.is_some() {
            return Err(ParseError::Unsupported("DISTINCT".to_string()));
        }
        if let sql_ast::GroupByExpr::Expressions(ref exprs) = select.group_by {
            if !exprs.is_empty() {
                return Err(ParseError::Unsupported("GROUP BY".to_string()));
            }
        } else {
            return Err(ParseError::Unsupported("GROUP BY ALL".to_string()));
        }
        if select.having.is_some() {
            return Err(ParseError::Unsupported("HAVING".to_string()));
        }

        let mut from = select.from;
        if from.len() != 1 {
            return Err(ParseError::Unsupported(
                "SELECT must read from exactly one table".to_string(),
            ));
        }
        let from = from_table_with_joins(from.remove(0))?;

        let columns: ParseResult<Vec<_>> = select
            .projection
            .into_iter()
            .map(projection_from_sql_ast)
            .collect();

        let where_clause = select.selection.map(Expr::from_sql_ast).transpose()?;

        Ok(Self {
            columns: columns?,
            from,
            where_clause,
            limit,
        })
    }
}

fn projection_from_sql_ast(item: sql_ast::SelectItem) -> ParseResult<Expr> {
    match item {
        sql_ast::SelectItem::UnnamedExpr(expr) => Expr::from_sql_ast(expr),
        sql_ast::SelectItem::ExprWithAlias { expr, alias } => {
            match Expr::from_sql_ast(expr)? {
                Expr::Column(col) => Ok(Expr::Column(col.with_alias(alias.value))),
                Expr::Function(mut func) => {
                    func.alias = Some(alias.value);
                    Ok(Expr::Function(func))
                }
                other => Err(ParseError::Unsupported(format!(
                    "Alias on expression: {}",
                    other
                ))),
            }
        }
        sql_ast::SelectItem::Wildcard(_) | sql_ast::SelectItem::QualifiedWildcard(_, _) => {
            Ok(Expr::Star)
        }
    }
}

fn from_table_with_joins(table: sql_ast::TableWithJoins) -> ParseResult<TableRef> {
    if !table.joins.is_empty() {
        return Err(ParseError::Unsupported("JOIN".to_string()));
    }
    match table.relation {
        sql_ast::TableFactor::Table { name, alias, .. } => {
            let mut table_ref = table_ref_from_object_name(&name);
            if let Some(alias) = alias {
                table_ref = table_ref.with_alias(alias.name.value);
            }
            Ok(table_ref)
        }
        other => Err(ParseError::Unsupported(format!("Table factor: {}", other))),
    }
}

/// Converts an ObjectName to TableRef.
fn table_ref_from_object_name(name: &sql_ast::ObjectName) -> TableRef {
    let parts: Vec<_> = name.0.iter().map(|i| i.value.clone()).collect();
    match parts.len() {
        1 => TableRef::new(&parts[0]),
        2 => TableRef::with_schema(&parts[0], &parts[1]),
        _ => TableRef::new(name.to_string()),
    }
}

/// INSERT statement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InsertStatement {
    /// Target table.
    pub table: TableRef,
    /// Column names (empty means positional).
    pub columns: Vec<String>,
    /// Rows of value expressions.
    pub rows: Vec<Vec<Expr>>,
}

impl InsertStatement {
    /// Converts from sqlparser's Insert parts.
    pub fn from_parts(
        table_name: sql_ast::ObjectName,
        columns: Vec<sql_ast::Ident>,
        source: Option<Box<sql_ast::Query>>,
    ) -> ParseResult<Self> {
        let table = table_ref_from_object_name(&table_name);
        let columns: Vec<_> = columns.into_iter().map(|c| c.value).collect();

        let source = source.ok_or_else(|| ParseError::Syntax("INSERT without values".to_string()))?;
        let rows = match *source.body {
            sql_ast::SetExpr::Values(values) => {
                let rows: ParseResult<Vec<Vec<Expr>>> = values
                    .rows
                    .into_iter()
                    .map(|row| row.into_iter().map(Expr::from_sql_ast).collect())
                    .collect();
                rows?
            }
            _ => {
                return Err(ParseError::Unsupported(
                    "INSERT source other than VALUES".to_string(),
                ))
            }
        };

        Ok(Self {
            table,
            columns,
            rows,
        })
    }
}

/// UPDATE statement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UpdateStatement {
    /// Target table.
    pub table: TableRef,
    /// Assignments.
    pub assignments: Vec<Assignment>,
    /// WHERE clause.
    pub where_clause: Option<Expr>,
}

impl UpdateStatement {
    fn from_parts(
        table: sql_ast::TableWithJoins,
        assignments: Vec<sql_ast::Assignment>,
        selection: Option<sql_ast::Expr>,
    ) -> ParseResult<Self> {
        let table = from_table_with_joins(table)?;

        let assignments: ParseResult<Vec<_>> = assignments
            .into_iter()
            .map(Assignment::from_sql_ast)
            .collect();

        let where_clause = selection.map(Expr::from_sql_ast).transpose()?;

        Ok(Self {
            table,
            assignments: assignments?,
            where_clause,
        })
    }
}

/// An assignment (column = value).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Assignment {
    /// Column being assigned.
    pub column: ColumnRef,
    /// Value being assigned.
    pub value: Expr,
}

impl Assignment {
    /// Converts from sqlparser's Assignment.
    pub fn from_sql_ast(assign: sql_ast::Assignment) -> ParseResult<Self> {
        let column = match assign.id.len() {
            0 => return Err(ParseError::Syntax("Empty assignment target".to_string())),
            1 => ColumnRef::new(&assign.id[0].value),
            n => ColumnRef::qualified(&assign.id[0].value, &assign.id[n - 1].value),
        };

        Ok(Self {
            column,
            value: Expr::from_sql_ast(assign.value)?,
        })
    }
}

/// DELETE statement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeleteStatement {
    /// Target table.
    pub table: TableRef,
    /// WHERE clause.
    pub where_clause: Option<Expr>,
}

impl DeleteStatement {
    /// Converts from sqlparser's Delete parts.
    pub fn from_parts(
        mut from: Vec<sql_ast::TableWithJoins>,
        selection: Option<sql_ast::Expr>,
    ) -> ParseResult<Self> {
        if from.len() != 1 {
            return Err(ParseError::Syntax(
                "DELETE requires exactly one table".to_string(),
            ));
        }
        let table = from_table_with_joins(from.remove(0))?;
        let where_clause = selection.map(Expr::from_sql_ast).transpose()?;

        Ok(Self {
            table,
            where_clause,
        })
    }
}

/// CREATE TABLE statement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreateTableStatement {
    /// Table name.
    pub name: TableRef,
    /// Column definitions.
    pub columns: Vec<ColumnDefinition>,
    /// IF NOT EXISTS.
    pub if_not_exists: bool,
}

impl CreateTableStatement {
    /// Converts from sqlparser's CreateTable parts.
    pub fn from_parts(
        name: sql_ast::ObjectName,
        columns: Vec<sql_ast::ColumnDef>,
        constraints: Vec<sql_ast::TableConstraint>,
        if_not_exists: bool,
    ) -> ParseResult<Self> {
        let columns: ParseResult<Vec<_>> =
            columns.into_iter().map(column_from_sql_ast).collect();
        let mut columns = columns?;

        for constraint in constraints {
            match constraint {
                sql_ast::TableConstraint::Unique {
                    columns: keys,
                    is_primary: true,
                    ..
                } => {
                    for key in keys {
                        let column = columns
                            .iter_mut()
                            .find(|c| c.name == key.value)
                            .ok_or_else(|| ParseError::InvalidIdentifier(key.value.clone()))?;
                        column.is_primary_key = true;
                        column.nullable = false;
                    }
                }
                other => {
                    return Err(ParseError::Unsupported(format!(
                        "Table constraint: {}",
                        other
                    )))
                }
            }
        }

        Ok(Self {
            name: table_ref_from_object_name(&name),
            columns,
            if_not_exists,
        })
    }
}

fn column_from_sql_ast(col: sql_ast::ColumnDef) -> ParseResult<ColumnDefinition> {
    let data_type = DataType::from_sql_ast(&col.data_type)?;
    let mut column = ColumnDefinition::new(col.name.value, data_type);

    for opt in col.options {
        match opt.option {
            sql_ast::ColumnOption::Null => column.nullable = true,
            sql_ast::ColumnOption::NotNull => column.nullable = false,
            sql_ast::ColumnOption::Default(expr) => match Expr::from_sql_ast(expr)? {
                Expr::Literal(Literal::Null) => column.default = None,
                Expr::Literal(lit) => column.default = Some(lit),
                other => {
                    return Err(ParseError::Unsupported(format!(
                        "Non-literal DEFAULT: {}",
                        other
                    )))
                }
            },
            sql_ast::ColumnOption::Unique {
                is_primary: true, ..
            } => {
                column.is_primary_key = true;
                column.nullable = false;
            }
            other => {
                return Err(ParseError::Unsupported(format!(
                    "Column option: {}",
                    other
                )))
            }
        }
    }

    Ok(column)
}

/// DROP TABLE statement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DropTableStatement {
    /// Tables to drop.
    pub names: Vec<TableRef>,
    /// IF EXISTS.
    pub if_exists: bool,
}

/// Physical organisation of a column index module.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum IndexKind {
    /// Sorted keys with binary search; exact and range lookups.
    Ordered,
    /// Bucketed hash table; exact lookups only.
    Hash,
}

impl IndexKind {
    /// Returns the lower-case name used in `USING` clauses.
    pub fn as_str(&self) -> &'static str {
        match self {
            IndexKind::Ordered => "btree",
            IndexKind::Hash => "hash",
        }
    }
}

/// CREATE INDEX statement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreateIndexStatement {
    /// Index name.
    pub name: String,
    /// Indexed table.
    pub table: TableRef,
    /// Indexed column.
    pub column: String,
    /// Ordered or hash.
    pub kind: IndexKind,
    /// IF NOT EXISTS.
    pub if_not_exists: bool,
}

impl CreateIndexStatement {
    /// Converts from sqlparser's CreateIndex parts.
    pub fn from_parts(
        name: Option<sql_ast::ObjectName>,
        table_name: sql_ast::ObjectName,
        using: Option<sql_ast::Ident>,
        mut columns: Vec<sql_ast::OrderByExpr>,
        unique: bool,
        if_not_exists: bool,
    ) -> ParseResult<Self> {
        if unique {
            return Err(ParseError::Unsupported("UNIQUE index".to_string()));
        }
        if columns.len() != 1 {
            return Err(ParseError::Unsupported(
                "Index over more than one column".to_string(),
            ));
        }

        let column = match Expr::from_sql_ast(columns.remove(0).expr)? {
            Expr::Column(col) => col.column,
            other => {
                return Err(ParseError::Unsupported(format!(
                    "Index expression: {}",
                    other
                )))
            }
        };

        let kind = match using.map(|u| u.value.to_lowercase()).as_deref() {
            None | Some("btree") => IndexKind::Ordered,
            Some("hash") => IndexKind::Hash,
            Some(other) => {
                return Err(ParseError::Unsupported(format!("Index method: {}", other)))
            }
        };

        let table = table_ref_from_object_name(&table_name);
        let name = name
            .map(|n| n.to_string())
            .unwrap_or_else(|| format!("{}_{}_idx", table.table, column));

        Ok(Self {
            name,
            table,
            column,
            kind,
            if_not_exists,
        })
    }
}

/// Extracts a numeric limit from an expression.
fn extract_limit(expr: &sql_ast::Expr) -> Option<u64> {
    match expr {
        sql_ast::Expr::Value(sql_ast::Value::Number(n, _)) => n.parse().ok(),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::Parser;

    #[test]
    fn test_select_statement() {
        let sql = "SELECT id, name AS customer FROM Customers WHERE active = true LIMIT 10";
        let stmt = Parser::parse_one(sql).unwrap();

        match stmt {
            Statement::Select(select) => {
                assert_eq!(select.columns.len(), 2);
                assert_eq!(select.from.table, "Customers");
                assert!(select.where_clause.is_some());
                assert_eq!(select.limit, Some(10));
                match &select.columns[1] {
                    Expr::Column(col) => {
                        assert_eq!(col.column, "name");
                        assert_eq!(col.alias.as_deref(), Some("customer"));
                    }
                    _ => panic!("Expected column projection"),
                }
            }
            _ => panic!("Expected SELECT statement"),
        }
    }

    #[test]
    fn test_select_star_and_count() {
        match Parser::parse_one("SELECT * FROM t").unwrap() {
            Statement::Select(select) => assert_eq!(select.columns, vec![Expr::Star]),
            _ => panic!("Expected SELECT statement"),
        }

        match Parser::parse_one("SELECT COUNT(*) AS n FROM t WHERE id = 3").unwrap() {
            Statement::Select(select) => {
                assert!(select.columns[0].is_count_star());
                match &select.columns[0] {
                    Expr::Function(func) => assert_eq!(func.alias.as_deref(), Some("n")),
                    _ => panic!("Expected function"),
                }
            }
            _ => panic!("Expected SELECT statement"),
        }
    }

    #[test]
    fn test_select_rejects_planner_features() {
        for sql in [
            "SELECT a FROM t ORDER BY a",
            "SELECT a FROM t GROUP BY a",
            "SELECT a FROM t JOIN u ON t.a = u.a",
            "SELECT DISTINCT a FROM t",
            "SELECT a FROM t, u",
        ] {
            assert!(
                matches!(Parser::parse_one(sql), Err(ParseError::Unsupported(_))),
                "{} should be unsupported",
                sql
            );
        }
    }

    #[test]
    fn test_insert_statement() {
        let sql = "INSERT INTO users (id, name) VALUES (1, 'Alice'), (2, 'Bob')";
        let stmt = Parser::parse_one(sql).unwrap();

        match stmt {
            Statement::Insert(insert) => {
                assert_eq!(insert.table.table, "users");
                assert_eq!(insert.columns, vec!["id", "name"]);
                assert_eq!(insert.rows.len(), 2);
                assert_eq!(insert.rows[1][1], Expr::string("Bob"));
            }
            _ => panic!("Expected INSERT statement"),
        }
    }

    #[test]
    fn test_update_statement() {
        let sql = "UPDATE users SET name = 'Bob', age = 31 WHERE id = 1";
        let stmt = Parser::parse_one(sql).unwrap();

        match stmt {
            Statement::Update(update) => {
                assert_eq!(update.table.table, "users");
                assert_eq!(update.assignments.len(), 2);
                assert_eq!(update.assignments[1].column.column, "age");
                assert!(update.where_clause.is_some());
            }
            _ => panic!("Expected UPDATE statement"),
        }
    }

    #[test]
    fn test_delete_statement() {
        let stmt = Parser::parse_one("DELETE FROM users WHERE id = 1").unwrap();

        match stmt {
            Statement::Delete(delete) => {
                assert_eq!(delete.table.table, "users");
                assert!(delete.where_clause.is_some());
            }
            _ => panic!("Expected DELETE statement"),
        }
    }

    #[test]
    fn test_create_table_statement() {
        let sql = "CREATE TABLE IF NOT EXISTS Customers (
            id INT PRIMARY KEY,
            name VARCHAR(100) NOT NULL,
            email VARCHAR(100) DEFAULT 'none',
            age INT,
            active BOOLEAN,
            joined DATE
        )";
        let stmt = Parser::parse_one(sql).unwrap();

        match stmt {
            Statement::CreateTable(ct) => {
                assert!(ct.if_not_exists);
                assert_eq!(ct.name.table, "Customers");
                assert_eq!(ct.columns.len(), 6);
                assert!(ct.columns[0].is_primary_key);
                assert!(!ct.columns[0].nullable);
                assert_eq!(ct.columns[1].data_type, DataType::Varchar(100));
                assert!(!ct.columns[1].nullable);
                assert_eq!(ct.columns[2].default, Some(Literal::String("none".into())));
                assert_eq!(ct.columns[5].data_type, DataType::Date);
            }
            _ => panic!("Expected CREATE TABLE statement"),
        }
    }

    #[test]
    fn test_table_level_primary_key() {
        let sql = "CREATE TABLE t (code TEXT, n INT, PRIMARY KEY (code))";
        match Parser::parse_one(sql).unwrap() {
            Statement::CreateTable(ct) => {
                assert!(ct.columns[0].is_primary_key);
                assert!(!ct.columns[1].is_primary_key);
            }
            _ => panic!("Expected CREATE TABLE statement"),
        }
    }

    #[test]
    fn test_drop_table_statement() {
        match Parser::parse_one("DROP TABLE IF EXISTS a, b").unwrap() {
            Statement::DropTable(drop) => {
                assert!(drop.if_exists);
                assert_eq!(drop.names.len(), 2);
            }
            _ => panic!("Expected DROP TABLE statement"),
        }
    }

    #[test]
    fn test_create_index_statement() {
        match Parser::parse_one("CREATE INDEX idx_age ON Customers (age)").unwrap() {
            Statement::CreateIndex(ci) => {
                assert_eq!(ci.name, "idx_age");
                assert_eq!(ci.table.table, "Customers");
                assert_eq!(ci.column, "age");
                assert_eq!(ci.kind, IndexKind::Ordered);
            }
            _ => panic!("Expected CREATE INDEX statement"),
        }

        match Parser::parse_one("CREATE INDEX ON Customers USING hash (email)").unwrap() {
            Statement::CreateIndex(ci) => {
                assert_eq!(ci.name, "Customers_email_idx");
                assert_eq!(ci.kind, IndexKind::Hash);
            }
            _ => panic!("Expected CREATE INDEX statement"),
        }
    }
}

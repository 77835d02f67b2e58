//! Statement validation.
//!
//! Validation runs before any code is generated or any compiler is started:
//! a statement that reaches codegen only references existing columns, only
//! uses expression shapes the C lowering understands, and only compares
//! operands of compatible types.
//!
//! The output of validating a query (or the WHERE clause of an UPDATE or
//! DELETE) is a [`KernelSpec`], the complete input of kernel generation.

use thiserror::Error;

use kiln_common::COUNT_COLUMN;

use crate::layout::RecordLayout;
use crate::parser::{
    Assignment, ColumnRef, DataType, Expr, InsertStatement, Literal,
    SelectStatement, TableRef, UnaryOperator,
};
use crate::schema::{ColumnDefinition, TableSchema};
use crate::value::{parse_date, Value, ValueError};

/// Errors detected before code generation.
#[derive(Debug, Error)]
pub enum ValidationError {
    /// Table does not exist.
    #[error("table '{0}' does not exist")]
    UnknownTable(String),

    /// Column does not exist in the table.
    #[error("column '{column}' does not exist in table '{table}'")]
    UnknownColumn {
        /// Table name.
        table: String,
        /// Column name.
        column: String,
    },

    /// Expression shape not supported by kernel generation.
    #[error("unsupported expression: {0}")]
    UnsupportedExpression(String),

    /// Operands of incompatible types.
    #[error("type mismatch: {0}")]
    TypeMismatch(String),

    /// Number of values differs from number of target columns.
    #[error("expected {expected} values, got {found}")]
    ValueCountMismatch {
        /// Number of target columns.
        expected: usize,
        /// Number of values supplied.
        found: usize,
    },

    /// Literal cannot be stored in the column.
    #[error("invalid value for column '{column}': {source}")]
    InvalidValue {
        /// Column name.
        column: String,
        /// Underlying conversion error.
        #[source]
        source: ValueError,
    },

    /// Column named twice.
    #[error("column '{0}' specified more than once")]
    DuplicateColumn(String),

    /// NULL written to a NOT NULL column.
    #[error("column '{0}' does not accept NULL")]
    NotNullViolation(String),

    /// Schema definition problem.
    #[error("invalid schema: {0}")]
    InvalidSchema(String),
}

/// Result type for validation.
pub type ValidationResult<T> = Result<T, ValidationError>;

/// One column of an explicit projection.
#[derive(Debug, Clone, PartialEq)]
pub struct ProjectedColumn {
    /// Index of the source column in the table schema.
    pub index: usize,
    /// Name of the column in the result.
    pub output_name: String,
    /// Column type.
    pub data_type: DataType,
}

/// What a kernel writes into its output buffer.
#[derive(Debug, Clone, PartialEq)]
pub enum Projection {
    /// Whole records (`SELECT *`).
    All,
    /// A single match count (`SELECT COUNT(*)`).
    Count {
        /// Result column name.
        output_name: String,
    },
    /// A subset of columns.
    Columns(Vec<ProjectedColumn>),
    /// Positions of matching records inside the page (UPDATE, DELETE).
    Positions,
}

impl Projection {
    /// Canonical text used for kernel naming.
    pub fn canonical(&self) -> String {
        match self {
            Projection::All => "*".to_string(),
            Projection::Count { .. } => "COUNT(*)".to_string(),
            Projection::Columns(cols) => cols
                .iter()
                .map(|c| c.index.to_string())
                .collect::<Vec<_>>()
                .join(","),
            Projection::Positions => "#positions".to_string(),
        }
    }

    /// Returns true if the kernel counts instead of copying.
    pub fn is_count(&self) -> bool {
        matches!(self, Projection::Count { .. })
    }
}

/// A validated, bound query: the complete input of kernel generation.
#[derive(Debug, Clone, PartialEq)]
pub struct KernelSpec {
    /// Table name as recorded in the schema.
    pub table: String,
    /// Output shape.
    pub projection: Projection,
    /// Filter with every column reference reduced to its schema name.
    pub predicate: Option<Expr>,
    /// LIMIT, if any.
    pub limit: Option<u64>,
}

impl KernelSpec {
    /// Name and type of each result column.
    pub fn result_columns(&self, schema: &TableSchema) -> Vec<(String, DataType)> {
        match &self.projection {
            Projection::All => schema
                .columns
                .iter()
                .map(|c| (c.name.clone(), c.data_type))
                .collect(),
            Projection::Count { output_name } => vec![(output_name.clone(), DataType::Int)],
            Projection::Columns(cols) => cols
                .iter()
                .map(|c| (c.output_name.clone(), c.data_type))
                .collect(),
            Projection::Positions => vec![("position".to_string(), DataType::Int)],
        }
    }

    /// Layout of one element of the kernel's output buffer.
    pub fn result_layout(&self, schema: &TableSchema) -> RecordLayout {
        match &self.projection {
            Projection::All => schema.layout(),
            _ => RecordLayout::from_fields(self.result_columns(schema)),
        }
    }
}

/// Coarse type classes used to check comparisons.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TypeClass {
    Numeric,
    Text,
    Boolean,
}

/// A literal value in an INSERT that may still need a default or key.
pub type PartialRow = Vec<Option<Value>>;

/// Validates statements against one table schema.
pub struct Validator<'a> {
    schema: &'a TableSchema,
}

impl<'a> Validator<'a> {
    /// Creates a validator for `schema`.
    pub fn new(schema: &'a TableSchema) -> Self {
        Self { schema }
    }

    // =========================================================================
    // Queries
    // =========================================================================

    /// Validates a SELECT and binds it into a kernel spec.
    pub fn validate_select(&self, select: &SelectStatement) -> ValidationResult<KernelSpec> {
        self.check_table(&select.from)?;
        let projection = self.bind_projection(&select.columns, &select.from)?;
        let predicate = select
            .where_clause
            .as_ref()
            .map(|expr| self.bind_predicate(expr, &select.from))
            .transpose()?;

        Ok(KernelSpec {
            table: self.schema.name.clone(),
            projection,
            predicate,
            limit: select.limit,
        })
    }

    /// Validates the WHERE clause of an UPDATE or DELETE and binds it into a
    /// kernel spec producing match positions.
    pub fn validate_filter(
        &self,
        table: &TableRef,
        where_clause: Option<&Expr>,
    ) -> ValidationResult<KernelSpec> {
        self.check_table(table)?;
        let predicate = where_clause
            .map(|expr| self.bind_predicate(expr, table))
            .transpose()?;

        Ok(KernelSpec {
            table: self.schema.name.clone(),
            projection: Projection::Positions,
            predicate,
            limit: None,
        })
    }

    fn check_table(&self, table: &TableRef) -> ValidationResult<()> {
        if table.table.eq_ignore_ascii_case(&self.schema.name) {
            Ok(())
        } else {
            Err(ValidationError::UnknownTable(table.table.clone()))
        }
    }

    fn bind_projection(&self, columns: &[Expr], from: &TableRef) -> ValidationResult<Projection> {
        match columns {
            [] => Err(ValidationError::UnsupportedExpression(
                "empty projection".to_string(),
            )),
            [Expr::Star] => Ok(Projection::All),
            [expr @ Expr::Function(func)] if expr.is_count_star() => Ok(Projection::Count {
                output_name: func
                    .alias
                    .clone()
                    .unwrap_or_else(|| COUNT_COLUMN.to_string()),
            }),
            _ => {
                let mut out = Vec::with_capacity(columns.len());
                for expr in columns {
                    match expr {
                        Expr::Column(col) => {
                            let index = self.resolve_column(col, from)?;
                            out.push(ProjectedColumn {
                                index,
                                output_name: col
                                    .alias
                                    .clone()
                                    .unwrap_or_else(|| self.schema.columns[index].name.clone()),
                                data_type: self.schema.columns[index].data_type,
                            });
                        }
                        other => {
                            return Err(ValidationError::UnsupportedExpression(format!(
                                "projection item {}",
                                other
                            )))
                        }
                    }
                }
                Ok(Projection::Columns(out))
            }
        }
    }

    fn resolve_column(&self, col: &ColumnRef, from: &TableRef) -> ValidationResult<usize> {
        if let Some(ref qualifier) = col.table {
            if !from.matches_qualifier(qualifier) {
                return Err(ValidationError::UnknownColumn {
                    table: qualifier.clone(),
                    column: col.column.clone(),
                });
            }
        }
        self.schema
            .column_index(&col.column)
            .ok_or_else(|| ValidationError::UnknownColumn {
                table: self.schema.name.clone(),
                column: col.column.clone(),
            })
    }

    // =========================================================================
    // Predicates
    // =========================================================================

    /// Binds column references to schema names and checks the predicate is
    /// a boolean expression the kernel generator can lower.
    pub fn bind_predicate(&self, expr: &Expr, from: &TableRef) -> ValidationResult<Expr> {
        let bound = self.bind_expr(expr, from)?;
        self.check_boolean(&bound)?;
        Ok(bound)
    }

    fn bind_expr(&self, expr: &Expr, from: &TableRef) -> ValidationResult<Expr> {
        match expr {
            Expr::Column(col) => {
                let index = self.resolve_column(col, from)?;
                Ok(Expr::Column(ColumnRef::new(
                    self.schema.columns[index].name.clone(),
                )))
            }
            Expr::Literal(lit) => Ok(Expr::Literal(lit.clone())),
            Expr::BinaryOp { left, op, right } => Ok(Expr::BinaryOp {
                left: Box::new(self.bind_expr(left, from)?),
                op: *op,
                right: Box::new(self.bind_expr(right, from)?),
            }),
            Expr::UnaryOp { op, expr } => Ok(Expr::UnaryOp {
                op: *op,
                expr: Box::new(self.bind_expr(expr, from)?),
            }),
            other => Err(ValidationError::UnsupportedExpression(format!(
                "{} in WHERE clause",
                other
            ))),
        }
    }

    fn check_boolean(&self, expr: &Expr) -> ValidationResult<()> {
        match expr {
            Expr::BinaryOp { left, op, right } if op.is_logical() => {
                self.check_boolean(left)?;
                self.check_boolean(right)
            }
            Expr::BinaryOp { left, op, right } if op.is_comparison() => {
                self.check_comparison(left, right)
            }
            Expr::UnaryOp {
                op: UnaryOperator::Not,
                expr,
            } => self.check_boolean(expr),
            Expr::Literal(Literal::Boolean(_)) => Ok(()),
            Expr::Column(_) => match self.operand_class(expr)? {
                TypeClass::Boolean => Ok(()),
                _ => Err(ValidationError::TypeMismatch(format!(
                    "column {} used as a condition is not BOOLEAN",
                    expr
                ))),
            },
            other => Err(ValidationError::UnsupportedExpression(format!(
                "{} is not a supported condition",
                other
            ))),
        }
    }

    fn check_comparison(&self, left: &Expr, right: &Expr) -> ValidationResult<()> {
        let lc = self.operand_class(left)?;
        let rc = self.operand_class(right)?;
        if lc != rc {
            return Err(ValidationError::TypeMismatch(format!(
                "cannot compare {} with {}",
                left, right
            )));
        }

        // Date columns are stored as ISO text; a literal they are compared
        // with must be a well-formed date for the ordering to hold.
        for (column, literal) in [(left, right), (right, left)] {
            if let (Expr::Column(col), Expr::Literal(Literal::String(s))) = (column, literal) {
                if self.column_type(col)? == DataType::Date {
                    parse_date(s).map_err(|source| ValidationError::InvalidValue {
                        column: col.column.clone(),
                        source,
                    })?;
                }
            }
        }

        Ok(())
    }

    fn column_type(&self, col: &ColumnRef) -> ValidationResult<DataType> {
        self.schema
            .column(&col.column)
            .map(|c| c.data_type)
            .ok_or_else(|| ValidationError::UnknownColumn {
                table: self.schema.name.clone(),
                column: col.column.clone(),
            })
    }

    fn operand_class(&self, expr: &Expr) -> ValidationResult<TypeClass> {
        match expr {
            Expr::Column(col) => {
                let data_type = self.column_type(col)?;
                Ok(match data_type {
                    DataType::Int | DataType::Float => TypeClass::Numeric,
                    DataType::Boolean => TypeClass::Boolean,
                    DataType::Varchar(_) | DataType::Text | DataType::Date => TypeClass::Text,
                })
            }
            Expr::Literal(lit) => match lit {
                Literal::Integer(_) => Ok(TypeClass::Numeric),
                Literal::Float(v) if v.is_finite() => Ok(TypeClass::Numeric),
                Literal::Float(v) => Err(ValidationError::UnsupportedExpression(format!(
                    "non-finite literal {}",
                    v
                ))),
                Literal::String(s) if s.as_bytes().contains(&0) => {
                    Err(ValidationError::UnsupportedExpression(
                        "string literal containing NUL".to_string(),
                    ))
                }
                Literal::String(_) => Ok(TypeClass::Text),
                Literal::Boolean(_) => Ok(TypeClass::Boolean),
                Literal::Null => Err(ValidationError::UnsupportedExpression(
                    "comparison with NULL".to_string(),
                )),
            },
            other => Err(ValidationError::UnsupportedExpression(format!(
                "operand {}",
                other
            ))),
        }
    }

    // =========================================================================
    // Writes
    // =========================================================================

    /// Validates an INSERT and converts its literal rows.
    ///
    /// Each returned row has one slot per schema column; `None` marks a
    /// column the statement did not mention, to be completed with
    /// [`Validator::complete_row`].
    pub fn validate_insert(&self, insert: &InsertStatement) -> ValidationResult<Vec<PartialRow>> {
        self.check_table(&insert.table)?;

        let targets: Vec<usize> = if insert.columns.is_empty() {
            (0..self.schema.len()).collect()
        } else {
            let mut targets = Vec::with_capacity(insert.columns.len());
            for name in &insert.columns {
                let index = self.schema.column_index(name).ok_or_else(|| {
                    ValidationError::UnknownColumn {
                        table: self.schema.name.clone(),
                        column: name.clone(),
                    }
                })?;
                if targets.contains(&index) {
                    return Err(ValidationError::DuplicateColumn(name.clone()));
                }
                targets.push(index);
            }
            targets
        };

        let mut rows = Vec::with_capacity(insert.rows.len());
        for values in &insert.rows {
            if values.len() != targets.len() {
                return Err(ValidationError::ValueCountMismatch {
                    expected: targets.len(),
                    found: values.len(),
                });
            }

            let mut row: PartialRow = vec![None; self.schema.len()];
            for (&index, expr) in targets.iter().zip(values) {
                let column = &self.schema.columns[index];
                row[index] = Some(self.literal_value(column, expr)?);
            }
            rows.push(row);
        }

        Ok(rows)
    }

    /// Fills the unmentioned columns of a row: declared default first, then
    /// whatever `synthesize` produces (primary keys), then the zero value.
    pub fn complete_row<F>(&self, row: PartialRow, mut synthesize: F) -> ValidationResult<Vec<Value>>
    where
        F: FnMut(usize, &ColumnDefinition) -> Option<Value>,
    {
        row.into_iter()
            .zip(&self.schema.columns)
            .enumerate()
            .map(|(index, (slot, column))| match slot {
                Some(value) => Ok(value),
                None => {
                    if let Some(ref default) = column.default {
                        return Value::coerce(default, &column.data_type).map_err(|source| {
                            ValidationError::InvalidValue {
                                column: column.name.clone(),
                                source,
                            }
                        });
                    }
                    Ok(synthesize(index, column).unwrap_or_else(|| Value::zero(&column.data_type)))
                }
            })
            .collect()
    }

    /// Validates UPDATE assignments, returning `(column index, new value)`.
    pub fn validate_assignments(
        &self,
        assignments: &[Assignment],
        table: &TableRef,
    ) -> ValidationResult<Vec<(usize, Value)>> {
        if assignments.is_empty() {
            return Err(ValidationError::UnsupportedExpression(
                "UPDATE without assignments".to_string(),
            ));
        }

        let mut out: Vec<(usize, Value)> = Vec::with_capacity(assignments.len());
        for assignment in assignments {
            let index = self.resolve_column(&assignment.column, table)?;
            if out.iter().any(|(i, _)| *i == index) {
                return Err(ValidationError::DuplicateColumn(
                    assignment.column.column.clone(),
                ));
            }
            let column = &self.schema.columns[index];
            out.push((index, self.literal_value(column, &assignment.value)?));
        }
        Ok(out)
    }

    fn literal_value(&self, column: &ColumnDefinition, expr: &Expr) -> ValidationResult<Value> {
        let literal = match expr {
            Expr::Literal(lit) => lit,
            other => {
                return Err(ValidationError::UnsupportedExpression(format!(
                    "value {} for column '{}' is not a literal",
                    other, column.name
                )))
            }
        };

        if literal.is_null() && !column.nullable {
            return Err(ValidationError::NotNullViolation(column.name.clone()));
        }

        Value::coerce(literal, &column.data_type).map_err(|source| ValidationError::InvalidValue {
            column: column.name.clone(),
            source,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::{Parser, Statement};

    fn customers() -> TableSchema {
        TableSchema::new(
            "Customers",
            vec![
                ColumnDefinition::new("id", DataType::Int).primary_key(),
                ColumnDefinition::new("name", DataType::Varchar(100)).not_null(),
                ColumnDefinition::new("email", DataType::Varchar(100))
                    .with_default(Literal::String("unknown".into())),
                ColumnDefinition::new("age", DataType::Int),
                ColumnDefinition::new("active", DataType::Boolean),
                ColumnDefinition::new("joined", DataType::Date),
            ],
        )
    }

    fn select(sql: &str) -> SelectStatement {
        match Parser::parse_one(sql).unwrap() {
            Statement::Select(s) => s,
            _ => panic!("Expected SELECT statement"),
        }
    }

    fn insert(sql: &str) -> InsertStatement {
        match Parser::parse_one(sql).unwrap() {
            Statement::Insert(s) => s,
            _ => panic!("Expected INSERT statement"),
        }
    }

    #[test]
    fn test_select_projection_shapes() {
        let schema = customers();
        let v = Validator::new(&schema);

        let spec = v.validate_select(&select("SELECT * FROM Customers")).unwrap();
        assert_eq!(spec.projection, Projection::All);

        let spec = v
            .validate_select(&select("SELECT COUNT(*) FROM Customers WHERE age > 30"))
            .unwrap();
        assert!(spec.projection.is_count());
        assert_eq!(
            spec.result_columns(&schema),
            vec![("count".to_string(), DataType::Int)]
        );

        let spec = v
            .validate_select(&select("SELECT name AS n, c.age FROM Customers c"))
            .unwrap();
        match spec.projection {
            Projection::Columns(ref cols) => {
                assert_eq!(cols[0].index, 1);
                assert_eq!(cols[0].output_name, "n");
                assert_eq!(cols[1].index, 3);
                assert_eq!(cols[1].output_name, "age");
            }
            _ => panic!("Expected column projection"),
        }
    }

    #[test]
    fn test_predicate_is_bound_to_schema_names() {
        let schema = customers();
        let v = Validator::new(&schema);

        let spec = v
            .validate_select(&select("SELECT * FROM Customers WHERE Customers.AGE > 30"))
            .unwrap();
        assert_eq!(spec.predicate, Some(Expr::column("age").gt(Expr::int(30))));
    }

    #[test]
    fn test_unknown_column_and_table() {
        let schema = customers();
        let v = Validator::new(&schema);

        assert!(matches!(
            v.validate_select(&select("SELECT salary FROM Customers")),
            Err(ValidationError::UnknownColumn { .. })
        ));
        assert!(matches!(
            v.validate_select(&select("SELECT * FROM Customers WHERE x.age = 1")),
            Err(ValidationError::UnknownColumn { .. })
        ));
        assert!(matches!(
            v.validate_select(&select("SELECT * FROM Orders")),
            Err(ValidationError::UnknownTable(_))
        ));
    }

    #[test]
    fn test_unsupported_predicates() {
        let schema = customers();
        let v = Validator::new(&schema);

        for sql in [
            "SELECT * FROM Customers WHERE age + 1 > 30",
            "SELECT * FROM Customers WHERE age",
            "SELECT * FROM Customers WHERE name = NULL",
            "SELECT * FROM Customers WHERE COUNT(*) > 1",
            "SELECT age, COUNT(*) FROM Customers",
        ] {
            assert!(v.validate_select(&select(sql)).is_err(), "{} should fail", sql);
        }
    }

    #[test]
    fn test_type_checks() {
        let schema = customers();
        let v = Validator::new(&schema);

        assert!(matches!(
            v.validate_select(&select("SELECT * FROM Customers WHERE name = 3")),
            Err(ValidationError::TypeMismatch(_))
        ));
        assert!(matches!(
            v.validate_select(&select("SELECT * FROM Customers WHERE joined < 'soon'")),
            Err(ValidationError::InvalidValue { .. })
        ));
        assert!(v
            .validate_select(&select(
                "SELECT * FROM Customers WHERE joined >= '2020-01-01' AND NOT active OR age < 2.5"
            ))
            .is_ok());
    }

    #[test]
    fn test_filter_spec() {
        let schema = customers();
        let v = Validator::new(&schema);
        let spec = v
            .validate_filter(&TableRef::new("Customers"), None)
            .unwrap();
        assert_eq!(spec.projection, Projection::Positions);
        assert!(spec.predicate.is_none());
        assert_eq!(spec.result_layout(&schema).size(), 4);
    }

    #[test]
    fn test_insert_named_and_positional() {
        let schema = customers();
        let v = Validator::new(&schema);

        let rows = v
            .validate_insert(&insert(
                "INSERT INTO Customers (name, age) VALUES ('Alice', 30)",
            ))
            .unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0][1], Some(Value::String("Alice".into())));
        assert_eq!(rows[0][0], None);

        let full = v
            .complete_row(rows[0].clone(), |_, column| {
                column.is_primary_key.then_some(Value::Int(99))
            })
            .unwrap();
        assert_eq!(full[0], Value::Int(99));
        assert_eq!(full[2], Value::String("unknown".into()));
        assert_eq!(full[4], Value::Boolean(false));
        assert_eq!(full[5].to_string(), "1970-01-01");

        let rows = v
            .validate_insert(&insert(
                "INSERT INTO Customers VALUES (1, 'Bob', 'b@x', 41, true, '2020-05-01')",
            ))
            .unwrap();
        assert!(rows[0].iter().all(Option::is_some));
    }

    #[test]
    fn test_insert_errors() {
        let schema = customers();
        let v = Validator::new(&schema);

        assert!(matches!(
            v.validate_insert(&insert("INSERT INTO Customers (id, name) VALUES (1)")),
            Err(ValidationError::ValueCountMismatch {
                expected: 2,
                found: 1
            })
        ));
        assert!(matches!(
            v.validate_insert(&insert("INSERT INTO Customers (name) VALUES (NULL)")),
            Err(ValidationError::NotNullViolation(_))
        ));
        assert!(matches!(
            v.validate_insert(&insert("INSERT INTO Customers (name, name) VALUES ('a', 'b')")),
            Err(ValidationError::DuplicateColumn(_))
        ));
        assert!(matches!(
            v.validate_insert(&insert("INSERT INTO Customers (nope) VALUES (1)")),
            Err(ValidationError::UnknownColumn { .. })
        ));
        assert!(matches!(
            v.validate_insert(&insert("INSERT INTO Customers (age) VALUES ('old')")),
            Err(ValidationError::InvalidValue { .. })
        ));
    }

    #[test]
    fn test_nullable_null_becomes_zero() {
        let schema = customers();
        let v = Validator::new(&schema);
        let rows = v
            .validate_insert(&insert("INSERT INTO Customers (name, age) VALUES ('a', NULL)"))
            .unwrap();
        assert_eq!(rows[0][3], Some(Value::Int(0)));
    }

    #[test]
    fn test_assignments() {
        let schema = customers();
        let v = Validator::new(&schema);
        let table = TableRef::new("Customers");

        let stmt = match Parser::parse_one("UPDATE Customers SET age = 40, active = true").unwrap() {
            Statement::Update(u) => u,
            _ => panic!("Expected UPDATE statement"),
        };
        let values = v.validate_assignments(&stmt.assignments, &table).unwrap();
        assert_eq!(values, vec![(3, Value::Int(40)), (4, Value::Boolean(true))]);

        let stmt = match Parser::parse_one("UPDATE Customers SET age = age + 1").unwrap() {
            Statement::Update(u) => u,
            _ => panic!("Expected UPDATE statement"),
        };
        assert!(matches!(
            v.validate_assignments(&stmt.assignments, &table),
            Err(ValidationError::UnsupportedExpression(_))
        ));
    }
}

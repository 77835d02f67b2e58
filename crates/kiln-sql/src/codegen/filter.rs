//! WHERE clause lowering.
//!
//! Turns a bound predicate into a C boolean expression over a record
//! pointer. String-typed operands are compared by content with `strcmp`.

use crate::layout::FieldLayout;
use crate::parser::{BinaryOperator, DataType, Expr, Literal, UnaryOperator};
use crate::schema::TableSchema;

use super::c::{c_float_literal, c_int_literal, c_string_literal};
use super::{CodegenError, CodegenResult};

/// Lowers predicates for one table.
pub struct FilterLowering<'a> {
    schema: &'a TableSchema,
    record: &'a str,
}

impl<'a> FilterLowering<'a> {
    /// `record` is the name of the `const kiln_record *` in scope.
    pub fn new(schema: &'a TableSchema, record: &'a str) -> Self {
        Self { schema, record }
    }

    /// Lowers a boolean expression.
    pub fn lower(&self, expr: &Expr) -> CodegenResult<String> {
        match expr {
            Expr::BinaryOp { left, op, right } if op.is_logical() => Ok(format!(
                "({} {} {})",
                self.lower(left)?,
                op.c_operator(),
                self.lower(right)?
            )),
            Expr::BinaryOp { left, op, right } if op.is_comparison() => {
                self.lower_comparison(left, *op, right)
            }
            Expr::UnaryOp {
                op: UnaryOperator::Not,
                expr,
            } => Ok(format!("(!{})", self.lower(expr)?)),
            Expr::Literal(Literal::Boolean(b)) => Ok(if *b { "1" } else { "0" }.to_string()),
            Expr::Column(_) => match self.operand_type(expr)? {
                Some(DataType::Boolean) => Ok(format!("({} != 0)", self.lower_operand(expr)?)),
                _ => Err(CodegenError::UnsupportedExpression(format!(
                    "non-boolean column {} used as condition",
                    expr
                ))),
            },
            other => Err(CodegenError::UnsupportedExpression(other.to_string())),
        }
    }

    fn lower_comparison(
        &self,
        left: &Expr,
        op: BinaryOperator,
        right: &Expr,
    ) -> CodegenResult<String> {
        let l = self.lower_operand(left)?;
        let r = self.lower_operand(right)?;

        let is_string = |e: &Expr| -> CodegenResult<bool> {
            Ok(match self.operand_type(e)? {
                Some(dt) => dt.is_string(),
                None => matches!(e, Expr::Literal(Literal::String(_))),
            })
        };

        if is_string(left)? || is_string(right)? {
            Ok(format!("(strcmp({}, {}) {} 0)", l, r, op.c_operator()))
        } else {
            Ok(format!("({} {} {})", l, op.c_operator(), r))
        }
    }

    /// Column type of an operand, `None` for literals.
    fn operand_type(&self, expr: &Expr) -> CodegenResult<Option<DataType>> {
        match expr {
            Expr::Column(col) => {
                let index = self.column_index(&col.column)?;
                Ok(Some(self.schema.columns[index].data_type))
            }
            _ => Ok(None),
        }
    }

    fn column_index(&self, name: &str) -> CodegenResult<usize> {
        self.schema
            .column_index(name)
            .ok_or_else(|| CodegenError::UnknownColumn(name.to_string()))
    }

    fn lower_operand(&self, expr: &Expr) -> CodegenResult<String> {
        match expr {
            Expr::Column(col) => {
                let index = self.column_index(&col.column)?;
                Ok(format!("{}->{}", self.record, FieldLayout::c_name(index)))
            }
            Expr::Literal(lit) => match lit {
                Literal::Integer(i) => Ok(c_int_literal(*i)),
                Literal::Float(v) => c_float_literal(*v),
                Literal::String(s) => Ok(c_string_literal(s)),
                Literal::Boolean(b) => Ok(if *b { "1" } else { "0" }.to_string()),
                Literal::Null => Err(CodegenError::UnsupportedExpression(
                    "NULL operand".to_string(),
                )),
            },
            other => Err(CodegenError::UnsupportedExpression(other.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::Parser;
    use crate::schema::ColumnDefinition;

    fn schema() -> TableSchema {
        TableSchema::new(
            "Customers",
            vec![
                ColumnDefinition::new("id", DataType::Int),
                ColumnDefinition::new("name", DataType::Varchar(100)),
                ColumnDefinition::new("age", DataType::Int),
                ColumnDefinition::new("active", DataType::Boolean),
                ColumnDefinition::new("joined", DataType::Date),
            ],
        )
    }

    fn lower(sql: &str) -> CodegenResult<String> {
        let schema = schema();
        let expr = Parser::parse_expr(sql).unwrap();
        FilterLowering::new(&schema, "r").lower(&expr)
    }

    #[test]
    fn test_numeric_comparison() {
        assert_eq!(lower("age > 30").unwrap(), "(r->c2 > 30)");
        assert_eq!(lower("id <> -1").unwrap(), "(r->c0 != -1)");
    }

    #[test]
    fn test_string_comparison_uses_strcmp() {
        assert_eq!(
            lower("name = 'Alice'").unwrap(),
            "(strcmp(r->c1, \"Alice\") == 0)"
        );
        assert_eq!(
            lower("'2020-01-01' <= joined").unwrap(),
            "(strcmp(\"2020-01-01\", r->c4) <= 0)"
        );
    }

    #[test]
    fn test_logical_and_not() {
        assert_eq!(
            lower("age >= 18 AND NOT active OR id = 1").unwrap(),
            "(((r->c2 >= 18) && (!(r->c3 != 0))) || (r->c0 == 1))"
        );
    }

    #[test]
    fn test_boolean_column_and_literal() {
        assert_eq!(lower("active").unwrap(), "(r->c3 != 0)");
        assert_eq!(lower("active = TRUE").unwrap(), "(r->c3 == 1)");
    }

    #[test]
    fn test_errors() {
        assert!(matches!(
            lower("salary > 1"),
            Err(CodegenError::UnknownColumn(_))
        ));
        assert!(matches!(
            lower("age + 1 > 2"),
            Err(CodegenError::UnsupportedExpression(_))
        ));
        assert!(matches!(
            lower("age"),
            Err(CodegenError::UnsupportedExpression(_))
        ));
    }
}

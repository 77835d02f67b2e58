//! SQL expression representation.
//!
//! Expressions are the input of kernel code generation, so the tree is
//! deliberately small: column references, literals, unary and binary
//! operators, function calls and `*`. Parenthesized sub-expressions are
//! unwrapped during conversion and unary minus on a numeric literal is
//! folded into the literal.

use std::fmt;

use serde::{Deserialize, Serialize};
use sqlparser::ast as sql_ast;

use super::{ColumnRef, Literal, ParseError, ParseResult};

/// A SQL expression.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Expr {
    /// A column reference.
    Column(ColumnRef),
    /// A literal value.
    Literal(Literal),
    /// A binary operation (e.g., `a = b`, `x AND y`).
    BinaryOp {
        /// Left operand.
        left: Box<Expr>,
        /// Operator.
        op: BinaryOperator,
        /// Right operand.
        right: Box<Expr>,
    },
    /// A unary operation (e.g., `NOT x`).
    UnaryOp {
        /// Operator.
        op: UnaryOperator,
        /// Operand.
        expr: Box<Expr>,
    },
    /// A function call.
    Function(FunctionCall),
    /// Wildcard (`*`), either as a projection or as `COUNT(*)`'s argument.
    Star,
}

impl Expr {
    /// Creates a column expression.
    pub fn column(name: impl Into<String>) -> Self {
        Expr::Column(ColumnRef::new(name))
    }

    /// Creates an integer literal expression.
    pub fn int(value: i64) -> Self {
        Expr::Literal(Literal::Integer(value))
    }

    /// Creates a float literal expression.
    pub fn float(value: f64) -> Self {
        Expr::Literal(Literal::Float(value))
    }

    /// Creates a string literal expression.
    pub fn string(value: impl Into<String>) -> Self {
        Expr::Literal(Literal::String(value.into()))
    }

    /// Creates a boolean literal expression.
    pub fn bool(value: bool) -> Self {
        Expr::Literal(Literal::Boolean(value))
    }

    /// Creates a binary expression.
    pub fn binary(self, op: BinaryOperator, other: Expr) -> Self {
        Expr::BinaryOp {
            left: Box::new(self),
            op,
            right: Box::new(other),
        }
    }

    /// Creates an equality expression.
    pub fn eq(self, other: Expr) -> Self {
        self.binary(BinaryOperator::Eq, other)
    }

    /// Creates a greater-than expression.
    pub fn gt(self, other: Expr) -> Self {
        self.binary(BinaryOperator::Gt, other)
    }

    /// Creates an AND expression.
    pub fn and(self, other: Expr) -> Self {
        self.binary(BinaryOperator::And, other)
    }

    /// Creates an OR expression.
    pub fn or(self, other: Expr) -> Self {
        self.binary(BinaryOperator::Or, other)
    }

    /// Creates a NOT expression.
    pub fn not(self) -> Self {
        Expr::UnaryOp {
            op: UnaryOperator::Not,
            expr: Box::new(self),
        }
    }

    /// Creates a `COUNT(*)` call.
    pub fn count_star() -> Self {
        Expr::Function(FunctionCall::new("COUNT", vec![Expr::Star]))
    }

    /// Returns true if this is `COUNT(*)`.
    pub fn is_count_star(&self) -> bool {
        match self {
            Expr::Function(func) => {
                func.name.eq_ignore_ascii_case("COUNT") && func.args == [Expr::Star]
            }
            _ => false,
        }
    }

    /// Collects every column referenced by this expression, in visit order.
    pub fn referenced_columns(&self) -> Vec<&ColumnRef> {
        let mut out = Vec::new();
        self.collect_columns(&mut out);
        out
    }

    fn collect_columns<'a>(&'a self, out: &mut Vec<&'a ColumnRef>) {
        match self {
            Expr::Column(col) => out.push(col),
            Expr::BinaryOp { left, right, .. } => {
                left.collect_columns(out);
                right.collect_columns(out);
            }
            Expr::UnaryOp { expr, .. } => expr.collect_columns(out),
            Expr::Function(func) => {
                for arg in &func.args {
                    arg.collect_columns(out);
                }
            }
            Expr::Literal(_) | Expr::Star => {}
        }
    }

    /// Converts from sqlparser's Expr.
    pub fn from_sql_ast(expr: sql_ast::Expr) -> ParseResult<Self> {
        match expr {
            sql_ast::Expr::Identifier(ident) => Ok(Expr::Column(ColumnRef::new(ident.value))),
            sql_ast::Expr::CompoundIdentifier(idents) => match idents.len() {
                1 => Ok(Expr::Column(ColumnRef::new(&idents[0].value))),
                2 => Ok(Expr::Column(ColumnRef::qualified(
                    &idents[0].value,
                    &idents[1].value,
                ))),
                _ => Err(ParseError::Unsupported(
                    "Compound identifier with more than 2 parts".to_string(),
                )),
            },
            sql_ast::Expr::Value(value) => Ok(Expr::Literal(Literal::from_sql_ast(&value)?)),
            sql_ast::Expr::BinaryOp { left, op, right } => Ok(Expr::BinaryOp {
                left: Box::new(Expr::from_sql_ast(*left)?),
                op: BinaryOperator::from_sql_ast(&op)?,
                right: Box::new(Expr::from_sql_ast(*right)?),
            }),
            sql_ast::Expr::UnaryOp { op, expr } => {
                let op = UnaryOperator::from_sql_ast(&op)?;
                let expr = Expr::from_sql_ast(*expr)?;
                match (op, expr) {
                    (UnaryOperator::Minus, Expr::Literal(lit)) if lit.is_numeric() => {
                        let folded = lit.negate().ok_or_else(|| {
                            ParseError::InvalidLiteral(format!("cannot negate {}", lit))
                        })?;
                        Ok(Expr::Literal(folded))
                    }
                    (UnaryOperator::Plus, Expr::Literal(lit)) if lit.is_numeric() => {
                        Ok(Expr::Literal(lit))
                    }
                    (op, expr) => Ok(Expr::UnaryOp {
                        op,
                        expr: Box::new(expr),
                    }),
                }
            }
            sql_ast::Expr::Function(func) => Ok(Expr::Function(FunctionCall::from_sql_ast(func)?)),
            sql_ast::Expr::Nested(expr) => Expr::from_sql_ast(*expr),
            sql_ast::Expr::Wildcard => Ok(Expr::Star),
            _ => Err(ParseError::Unsupported(format!("Expression: {}", expr))),
        }
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::Column(col) => write!(f, "{}", col),
            Expr::Literal(lit) => write!(f, "{}", lit),
            Expr::BinaryOp { left, op, right } => write!(f, "({} {} {})", left, op, right),
            Expr::UnaryOp { op, expr } => write!(f, "({} {})", op, expr),
            Expr::Function(func) => write!(f, "{}", func),
            Expr::Star => write!(f, "*"),
        }
    }
}

/// Binary operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BinaryOperator {
    // Comparison
    /// Equal.
    Eq,
    /// Not equal.
    NotEq,
    /// Less than.
    Lt,
    /// Less than or equal.
    LtEq,
    /// Greater than.
    Gt,
    /// Greater than or equal.
    GtEq,

    // Arithmetic
    /// Addition.
    Plus,
    /// Subtraction.
    Minus,
    /// Multiplication.
    Multiply,
    /// Division.
    Divide,
    /// Modulo.
    Modulo,

    // Logical
    /// Logical AND.
    And,
    /// Logical OR.
    Or,
}

impl BinaryOperator {
    /// Returns true if this is a comparison operator.
    pub fn is_comparison(&self) -> bool {
        matches!(
            self,
            BinaryOperator::Eq
                | BinaryOperator::NotEq
                | BinaryOperator::Lt
                | BinaryOperator::LtEq
                | BinaryOperator::Gt
                | BinaryOperator::GtEq
        )
    }

    /// Returns true if this is an arithmetic operator.
    pub fn is_arithmetic(&self) -> bool {
        matches!(
            self,
            BinaryOperator::Plus
                | BinaryOperator::Minus
                | BinaryOperator::Multiply
                | BinaryOperator::Divide
                | BinaryOperator::Modulo
        )
    }

    /// Returns true if this is a logical operator.
    pub fn is_logical(&self) -> bool {
        matches!(self, BinaryOperator::And | BinaryOperator::Or)
    }

    /// Returns the C spelling of this operator.
    pub fn c_operator(&self) -> &'static str {
        match self {
            BinaryOperator::Eq => "==",
            BinaryOperator::NotEq => "!=",
            BinaryOperator::Lt => "<",
            BinaryOperator::LtEq => "<=",
            BinaryOperator::Gt => ">",
            BinaryOperator::GtEq => ">=",
            BinaryOperator::Plus => "+",
            BinaryOperator::Minus => "-",
            BinaryOperator::Multiply => "*",
            BinaryOperator::Divide => "/",
            BinaryOperator::Modulo => "%",
            BinaryOperator::And => "&&",
            BinaryOperator::Or => "||",
        }
    }

    /// Converts from sqlparser's BinaryOperator.
    pub fn from_sql_ast(op: &sql_ast::BinaryOperator) -> ParseResult<Self> {
        match op {
            sql_ast::BinaryOperator::Eq => Ok(BinaryOperator::Eq),
            sql_ast::BinaryOperator::NotEq => Ok(BinaryOperator::NotEq),
            sql_ast::BinaryOperator::Lt => Ok(BinaryOperator::Lt),
            sql_ast::BinaryOperator::LtEq => Ok(BinaryOperator::LtEq),
            sql_ast::BinaryOperator::Gt => Ok(BinaryOperator::Gt),
            sql_ast::BinaryOperator::GtEq => Ok(BinaryOperator::GtEq),
            sql_ast::BinaryOperator::Plus => Ok(BinaryOperator::Plus),
            sql_ast::BinaryOperator::Minus => Ok(BinaryOperator::Minus),
            sql_ast::BinaryOperator::Multiply => Ok(BinaryOperator::Multiply),
            sql_ast::BinaryOperator::Divide => Ok(BinaryOperator::Divide),
            sql_ast::BinaryOperator::Modulo => Ok(BinaryOperator::Modulo),
            sql_ast::BinaryOperator::And => Ok(BinaryOperator::And),
            sql_ast::BinaryOperator::Or => Ok(BinaryOperator::Or),
            _ => Err(ParseError::Unsupported(format!("Binary operator: {}", op))),
        }
    }
}

impl fmt::Display for BinaryOperator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            BinaryOperator::Eq => "=",
            BinaryOperator::NotEq => "<>",
            BinaryOperator::Lt => "<",
            BinaryOperator::LtEq => "<=",
            BinaryOperator::Gt => ">",
            BinaryOperator::GtEq => ">=",
            BinaryOperator::Plus => "+",
            BinaryOperator::Minus => "-",
            BinaryOperator::Multiply => "*",
            BinaryOperator::Divide => "/",
            BinaryOperator::Modulo => "%",
            BinaryOperator::And => "AND",
            BinaryOperator::Or => "OR",
        };
        write!(f, "{}", s)
    }
}

/// Unary operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum UnaryOperator {
    /// Logical NOT.
    Not,
    /// Negation.
    Minus,
    /// Unary plus.
    Plus,
}

impl UnaryOperator {
    /// Converts from sqlparser's UnaryOperator.
    pub fn from_sql_ast(op: &sql_ast::UnaryOperator) -> ParseResult<Self> {
        match op {
            sql_ast::UnaryOperator::Not => Ok(UnaryOperator::Not),
            sql_ast::UnaryOperator::Minus => Ok(UnaryOperator::Minus),
            sql_ast::UnaryOperator::Plus => Ok(UnaryOperator::Plus),
            _ => Err(ParseError::Unsupported(format!("Unary operator: {}", op))),
        }
    }
}

impl fmt::Display for UnaryOperator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UnaryOperator::Not => write!(f, "NOT"),
            UnaryOperator::Minus => write!(f, "-"),
            UnaryOperator::Plus => write!(f, "+"),
        }
    }
}

/// A function call such as `COUNT(*)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionCall {
    /// Function name, upper-cased.
    pub name: String,
    /// Arguments.
    pub args: Vec<Expr>,
    /// Output alias when used as a projection.
    pub alias: Option<String>,
}

impl FunctionCall {
    /// Creates a new function call.
    pub fn new(name: impl Into<String>, args: Vec<Expr>) -> Self {
        Self {
            name: name.into().to_uppercase(),
            args,
            alias: None,
        }
    }

    /// Converts from sqlparser's Function.
    pub fn from_sql_ast(func: sql_ast::Function) -> ParseResult<Self> {
        if func.distinct || func.over.is_some() || func.filter.is_some() {
            return Err(ParseError::Unsupported(format!("Function call: {}", func)));
        }

        let name = func.name.to_string();
        let args: ParseResult<Vec<_>> = func
            .args
            .into_iter()
            .map(|arg| match arg {
                sql_ast::FunctionArg::Unnamed(sql_ast::FunctionArgExpr::Expr(e)) => {
                    Expr::from_sql_ast(e)
                }
                sql_ast::FunctionArg::Unnamed(sql_ast::FunctionArgExpr::Wildcard) => {
                    Ok(Expr::Star)
                }
                other => Err(ParseError::Unsupported(format!(
                    "Function argument: {}",
                    other
                ))),
            })
            .collect();

        Ok(Self::new(name, args?))
    }
}

impl fmt::Display for FunctionCall {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let args: Vec<_> = self.args.iter().map(|a| a.to_string()).collect();
        write!(f, "{}({})", self.name, args.join(", "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::Parser;

    #[test]
    fn test_expr_builders() {
        let expr = Expr::column("age").gt(Expr::int(30));
        assert_eq!(expr.to_string(), "(age > 30)");

        let expr = Expr::column("a").eq(Expr::int(1)).and(Expr::column("b").not());
        assert_eq!(expr.to_string(), "((a = 1) AND (NOT b))");
    }

    #[test]
    fn test_nested_is_unwrapped() {
        let expr = Parser::parse_expr("((age > 30))").unwrap();
        assert_eq!(expr, Expr::column("age").gt(Expr::int(30)));
    }

    #[test]
    fn test_negative_literal_folded() {
        let expr = Parser::parse_expr("age > -5").unwrap();
        assert_eq!(expr, Expr::column("age").gt(Expr::int(-5)));

        let expr = Parser::parse_expr("-2.5").unwrap();
        assert_eq!(expr, Expr::float(-2.5));
    }

    #[test]
    fn test_count_star() {
        let expr = Parser::parse_expr("COUNT(*)").unwrap();
        assert!(expr.is_count_star());
        assert_eq!(expr.to_string(), "COUNT(*)");

        let expr = Parser::parse_expr("count(age)").unwrap();
        assert!(!expr.is_count_star());
    }

    #[test]
    fn test_referenced_columns() {
        let expr = Parser::parse_expr("a = 1 OR (b < 2 AND NOT c)").unwrap();
        let cols: Vec<_> = expr
            .referenced_columns()
            .into_iter()
            .map(|c| c.column.clone())
            .collect();
        assert_eq!(cols, vec!["a", "b", "c"]);
    }

    #[test]
    fn test_unsupported_expression() {
        let result = Parser::parse_expr("a IS NULL");
        assert!(matches!(result, Err(ParseError::Unsupported(_))));

        let result = Parser::parse_expr("name LIKE 'a%'");
        assert!(matches!(result, Err(ParseError::Unsupported(_))));
    }

    #[test]
    fn test_operator_classes() {
        assert!(BinaryOperator::LtEq.is_comparison());
        assert!(BinaryOperator::Modulo.is_arithmetic());
        assert!(BinaryOperator::Or.is_logical());
        assert_eq!(BinaryOperator::NotEq.c_operator(), "!=");
    }
}

//! SQL data types and literals.
//!
//! Only the column types that have a fixed native representation are
//! accepted: every record is a C struct, so each type must map onto a
//! fixed-size field.

use std::fmt;

use kiln_common::{DEFAULT_VARCHAR_LENGTH, MAX_VARCHAR_LENGTH};
use serde::{Deserialize, Serialize};
use sqlparser::ast as sql_ast;

use super::{ParseError, ParseResult};

/// Column types supported by Kiln.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DataType {
    /// 32-bit signed integer (`int32_t`).
    Int,
    /// Bounded string of at most `n` bytes (`char[n + 1]`).
    Varchar(u32),
    /// Bounded string of at most 255 bytes (`char[256]`).
    Text,
    /// 64-bit floating point (`double`).
    Float,
    /// Calendar date stored as ISO `YYYY-MM-DD` text (`char[11]`).
    Date,
    /// Boolean (`bool`).
    Boolean,
}

impl DataType {
    /// Returns true if this type is numeric.
    pub fn is_numeric(&self) -> bool {
        matches!(self, DataType::Int | DataType::Float)
    }

    /// Returns true if values of this type are stored as NUL-terminated
    /// character arrays (and compared with `strcmp`).
    pub fn is_string(&self) -> bool {
        matches!(self, DataType::Varchar(_) | DataType::Text | DataType::Date)
    }

    /// Converts from sqlparser's DataType.
    pub fn from_sql_ast(dt: &sql_ast::DataType) -> ParseResult<Self> {
        match dt {
            sql_ast::DataType::Boolean | sql_ast::DataType::Bool => Ok(DataType::Boolean),
            sql_ast::DataType::Int(_)
            | sql_ast::DataType::Integer(_)
            | sql_ast::DataType::Int4(_)
            | sql_ast::DataType::SmallInt(_) => Ok(DataType::Int),
            sql_ast::DataType::Float(_)
            | sql_ast::DataType::Real
            | sql_ast::DataType::Double
            | sql_ast::DataType::DoublePrecision
            | sql_ast::DataType::Float8
            | sql_ast::DataType::Float64 => Ok(DataType::Float),
            sql_ast::DataType::Varchar(len)
            | sql_ast::DataType::CharacterVarying(len)
            | sql_ast::DataType::Char(len)
            | sql_ast::DataType::Character(len) => {
                let len = match len {
                    Some(l) => extract_char_length(l)?,
                    None => DEFAULT_VARCHAR_LENGTH,
                };
                Ok(DataType::Varchar(len))
            }
            sql_ast::DataType::Text | sql_ast::DataType::String(_) => Ok(DataType::Text),
            sql_ast::DataType::Date => Ok(DataType::Date),
            _ => Err(ParseError::Unsupported(format!("Data type: {}", dt))),
        }
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DataType::Int => write!(f, "INT"),
            DataType::Varchar(n) => write!(f, "VARCHAR({})", n),
            DataType::Text => write!(f, "TEXT"),
            DataType::Float => write!(f, "FLOAT"),
            DataType::Date => write!(f, "DATE"),
            DataType::Boolean => write!(f, "BOOLEAN"),
        }
    }
}

fn extract_char_length(cl: &sql_ast::CharacterLength) -> ParseResult<u32> {
    match cl {
        sql_ast::CharacterLength::IntegerLength { length, .. } => {
            let length = u32::try_from(*length)
                .ok()
                .filter(|l| *l > 0 && *l <= MAX_VARCHAR_LENGTH)
                .ok_or_else(|| {
                    ParseError::InvalidLiteral(format!(
                        "VARCHAR length {} outside 1..={}",
                        length, MAX_VARCHAR_LENGTH
                    ))
                })?;
            Ok(length)
        }
        sql_ast::CharacterLength::Max => Ok(MAX_VARCHAR_LENGTH),
    }
}

/// A literal value in SQL.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Literal {
    /// NULL value.
    Null,
    /// Boolean value.
    Boolean(bool),
    /// Integer value.
    Integer(i64),
    /// Floating point value.
    Float(f64),
    /// String value (also used for dates).
    String(String),
}

impl Literal {
    /// Returns true if this is a NULL value.
    pub fn is_null(&self) -> bool {
        matches!(self, Literal::Null)
    }

    /// Returns true if this is a numeric literal.
    pub fn is_numeric(&self) -> bool {
        matches!(self, Literal::Integer(_) | Literal::Float(_))
    }

    /// Returns the negated literal, or `None` for non-numeric values.
    pub fn negate(&self) -> Option<Literal> {
        match self {
            Literal::Integer(i) => i.checked_neg().map(Literal::Integer),
            Literal::Float(v) => Some(Literal::Float(-v)),
            _ => None,
        }
    }

    /// Converts from sqlparser's Value.
    pub fn from_sql_ast(value: &sql_ast::Value) -> ParseResult<Self> {
        match value {
            sql_ast::Value::Null => Ok(Literal::Null),
            sql_ast::Value::Boolean(b) => Ok(Literal::Boolean(*b)),
            sql_ast::Value::Number(n, _) => {
                if let Ok(i) = n.parse::<i64>() {
                    Ok(Literal::Integer(i))
                } else if let Ok(f) = n.parse::<f64>() {
                    Ok(Literal::Float(f))
                } else {
                    Err(ParseError::InvalidLiteral(format!("Invalid number: {}", n)))
                }
            }
            sql_ast::Value::SingleQuotedString(s) | sql_ast::Value::DoubleQuotedString(s) => {
                Ok(Literal::String(s.clone()))
            }
            _ => Err(ParseError::Unsupported(format!(
                "Literal value: {:?}",
                value
            ))),
        }
    }
}

impl fmt::Display for Literal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Literal::Null => write!(f, "NULL"),
            Literal::Boolean(b) => write!(f, "{}", if *b { "TRUE" } else { "FALSE" }),
            Literal::Integer(i) => write!(f, "{}", i),
            Literal::Float(v) => write!(f, "{:?}", v),
            Literal::String(s) => write!(f, "'{}'", s.replace('\'', "''")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_data_type_properties() {
        assert!(DataType::Int.is_numeric());
        assert!(DataType::Float.is_numeric());
        assert!(DataType::Varchar(10).is_string());
        assert!(DataType::Date.is_string());
        assert!(!DataType::Boolean.is_string());
    }

    #[test]
    fn test_data_type_display() {
        assert_eq!(DataType::Varchar(100).to_string(), "VARCHAR(100)");
        assert_eq!(DataType::Int.to_string(), "INT");
    }

    #[test]
    fn test_literal_display() {
        assert_eq!(Literal::String("it's".into()).to_string(), "'it''s'");
        assert_eq!(Literal::Float(1.0).to_string(), "1.0");
        assert_eq!(Literal::Boolean(false).to_string(), "FALSE");
    }

    #[test]
    fn test_literal_negate() {
        assert_eq!(Literal::Integer(5).negate(), Some(Literal::Integer(-5)));
        assert_eq!(Literal::Integer(i64::MIN).negate(), None);
        assert_eq!(Literal::String("x".into()).negate(), None);
    }
}

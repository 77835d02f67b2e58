//! Runtime values.
//!
//! [`Value`] is what the engine hands back to callers after decoding native
//! records, and what INSERT and UPDATE produce from literals before a record
//! is rendered into page source.

use std::fmt;

use chrono::NaiveDate;
use kiln_common::TEXT_CAPACITY;
use thiserror::Error;

use crate::parser::{DataType, Literal};

/// Date format used for storage and literals.
pub const DATE_FORMAT: &str = "%Y-%m-%d";

/// Why a literal cannot be stored in a column of some type.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValueError {
    /// Literal kind does not fit the column type.
    #[error("expected {expected}, found {found}")]
    TypeMismatch {
        /// Column type.
        expected: DataType,
        /// Offending literal.
        found: String,
    },

    /// Integer outside the 32-bit range.
    #[error("integer {0} out of range for INT")]
    OutOfRange(i64),

    /// String longer than the column capacity.
    #[error("string of {length} bytes exceeds capacity of {capacity}")]
    TooLong {
        /// Maximum length in bytes.
        capacity: usize,
        /// Actual length in bytes.
        length: usize,
    },

    /// String contains a NUL byte.
    #[error("string contains a NUL byte")]
    NulByte,

    /// Not an ISO `YYYY-MM-DD` date.
    #[error("invalid date '{0}', expected YYYY-MM-DD")]
    InvalidDate(String),

    /// NaN or infinite float.
    #[error("non-finite float {0}")]
    NonFinite(f64),
}

/// A runtime value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// NULL value (only appears before storage, records have no NULLs).
    Null,
    /// Boolean value.
    Boolean(bool),
    /// 32-bit signed integer.
    Int(i32),
    /// 64-bit floating point.
    Float(f64),
    /// String value.
    String(String),
    /// Calendar date.
    Date(NaiveDate),
}

impl Value {
    /// Returns the zero value for a type; used for omitted columns and for
    /// NULL written to nullable columns.
    pub fn zero(data_type: &DataType) -> Self {
        match data_type {
            DataType::Int => Value::Int(0),
            DataType::Float => Value::Float(0.0),
            DataType::Boolean => Value::Boolean(false),
            DataType::Varchar(_) | DataType::Text => Value::String(String::new()),
            DataType::Date => Value::Date(NaiveDate::default()),
        }
    }

    /// Returns true if this is NULL.
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Returns the value as an i64 if it is an integer.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(i64::from(*i)),
            _ => None,
        }
    }

    /// Returns the value as a string slice if it is a string.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    /// Converts a literal into a value of `data_type`.
    ///
    /// `NULL` maps to the zero value; callers enforce NOT NULL beforehand.
    pub fn coerce(literal: &Literal, data_type: &DataType) -> Result<Self, ValueError> {
        let mismatch = || ValueError::TypeMismatch {
            expected: *data_type,
            found: literal.to_string(),
        };

        match (data_type, literal) {
            (_, Literal::Null) => Ok(Value::zero(data_type)),
            (DataType::Int, Literal::Integer(i)) => i32::try_from(*i)
                .map(Value::Int)
                .map_err(|_| ValueError::OutOfRange(*i)),
            (DataType::Float, Literal::Integer(i)) => Ok(Value::Float(*i as f64)),
            (DataType::Float, Literal::Float(v)) => {
                if v.is_finite() {
                    Ok(Value::Float(*v))
                } else {
                    Err(ValueError::NonFinite(*v))
                }
            }
            (DataType::Boolean, Literal::Boolean(b)) => Ok(Value::Boolean(*b)),
            (DataType::Varchar(_) | DataType::Text, Literal::String(s)) => {
                check_string(s, string_capacity(data_type))?;
                Ok(Value::String(s.clone()))
            }
            (DataType::Date, Literal::String(s)) => parse_date(s).map(Value::Date),
            _ => Err(mismatch()),
        }
    }

    /// Renders the value as JSON.
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Value::Null => serde_json::Value::Null,
            Value::Boolean(b) => serde_json::Value::Bool(*b),
            Value::Int(i) => serde_json::Value::from(*i),
            Value::Float(v) => serde_json::Number::from_f64(*v)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
            Value::String(s) => serde_json::Value::String(s.clone()),
            Value::Date(d) => serde_json::Value::String(d.format(DATE_FORMAT).to_string()),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "NULL"),
            Value::Boolean(b) => write!(f, "{}", if *b { "true" } else { "false" }),
            Value::Int(i) => write!(f, "{}", i),
            Value::Float(v) => write!(f, "{}", v),
            Value::String(s) => write!(f, "{}", s),
            Value::Date(d) => write!(f, "{}", d.format(DATE_FORMAT)),
        }
    }
}

/// Maximum string length in bytes (excluding the NUL) for a string type.
pub fn string_capacity(data_type: &DataType) -> usize {
    match data_type {
        DataType::Varchar(n) => *n as usize,
        DataType::Text => TEXT_CAPACITY - 1,
        DataType::Date => 10,
        _ => 0,
    }
}

fn check_string(s: &str, capacity: usize) -> Result<(), ValueError> {
    if s.as_bytes().contains(&0) {
        return Err(ValueError::NulByte);
    }
    if s.len() > capacity {
        return Err(ValueError::TooLong {
            capacity,
            length: s.len(),
        });
    }
    Ok(())
}

/// Parses a strict ISO `YYYY-MM-DD` date.
pub fn parse_date(s: &str) -> Result<NaiveDate, ValueError> {
    NaiveDate::parse_from_str(s, DATE_FORMAT)
        .ok()
        .filter(|d| d.format(DATE_FORMAT).to_string() == s)
        .ok_or_else(|| ValueError::InvalidDate(s.to_string()))
}

/// A single row of values.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Row {
    values: Vec<Value>,
}

impl Row {
    /// Creates a new row with the given values.
    pub fn new(values: Vec<Value>) -> Self {
        Self { values }
    }

    /// Returns the number of columns in this row.
    pub fn num_columns(&self) -> usize {
        self.values.len()
    }

    /// Returns true if this row is empty.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Returns the value at the given index.
    pub fn get(&self, index: usize) -> Option<&Value> {
        self.values.get(index)
    }

    /// Sets the value at the given index.
    pub fn set(&mut self, index: usize, value: Value) {
        if index < self.values.len() {
            self.values[index] = value;
        }
    }

    /// Returns the values as a slice.
    pub fn values(&self) -> &[Value] {
        &self.values
    }

    /// Consumes the row and returns its values.
    pub fn into_values(self) -> Vec<Value> {
        self.values
    }

    /// Returns an iterator over the values.
    pub fn iter(&self) -> impl Iterator<Item = &Value> {
        self.values.iter()
    }
}

impl From<Vec<Value>> for Row {
    fn from(values: Vec<Value>) -> Self {
        Self::new(values)
    }
}

impl fmt::Display for Row {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "(")?;
        for (i, value) in self.values.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}", value)?;
        }
        write!(f, ")")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_coerce_int() {
        assert_eq!(
            Value::coerce(&Literal::Integer(42), &DataType::Int),
            Ok(Value::Int(42))
        );
        assert_eq!(
            Value::coerce(&Literal::Integer(1 << 40), &DataType::Int),
            Err(ValueError::OutOfRange(1 << 40))
        );
        assert!(matches!(
            Value::coerce(&Literal::String("1".into()), &DataType::Int),
            Err(ValueError::TypeMismatch { .. })
        ));
    }

    #[test]
    fn test_coerce_float() {
        assert_eq!(
            Value::coerce(&Literal::Integer(2), &DataType::Float),
            Ok(Value::Float(2.0))
        );
        assert_eq!(
            Value::coerce(&Literal::Float(f64::INFINITY), &DataType::Float),
            Err(ValueError::NonFinite(f64::INFINITY))
        );
    }

    #[test]
    fn test_coerce_strings() {
        assert_eq!(
            Value::coerce(&Literal::String("abc".into()), &DataType::Varchar(3)),
            Ok(Value::String("abc".into()))
        );
        assert_eq!(
            Value::coerce(&Literal::String("abcd".into()), &DataType::Varchar(3)),
            Err(ValueError::TooLong {
                capacity: 3,
                length: 4
            })
        );
        assert_eq!(
            Value::coerce(&Literal::String("a\0b".into()), &DataType::Text),
            Err(ValueError::NulByte)
        );
    }

    #[test]
    fn test_coerce_date() {
        let date = Value::coerce(&Literal::String("2024-02-29".into()), &DataType::Date).unwrap();
        assert_eq!(date.to_string(), "2024-02-29");

        for bad in ["2023-02-29", "2024-2-1", "24-01-01", "today"] {
            assert!(
                matches!(
                    Value::coerce(&Literal::String(bad.into()), &DataType::Date),
                    Err(ValueError::InvalidDate(_))
                ),
                "{} should be rejected",
                bad
            );
        }
    }

    #[test]
    fn test_null_coerces_to_zero() {
        assert_eq!(
            Value::coerce(&Literal::Null, &DataType::Date).unwrap().to_string(),
            "1970-01-01"
        );
        assert_eq!(
            Value::coerce(&Literal::Null, &DataType::Int),
            Ok(Value::Int(0))
        );
    }

    #[test]
    fn test_to_json() {
        assert_eq!(Value::Int(3).to_json(), serde_json::json!(3));
        assert_eq!(Value::String("x".into()).to_json(), serde_json::json!("x"));
        assert_eq!(Value::Boolean(true).to_json(), serde_json::json!(true));
    }

    #[test]
    fn test_row_display() {
        let row = Row::new(vec![Value::Int(1), Value::String("Alice".into())]);
        assert_eq!(row.to_string(), "(1, Alice)");
        assert_eq!(row.num_columns(), 2);
    }
}

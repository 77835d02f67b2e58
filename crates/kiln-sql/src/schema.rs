//! Table schemas.
//!
//! A [`TableSchema`] is an ordered list of typed columns. It never stores
//! byte offsets: the physical layout is derived once by
//! [`RecordLayout::for_schema`](crate::layout::RecordLayout::for_schema).

use serde::{Deserialize, Serialize};

use kiln_common::MAX_VARCHAR_LENGTH;

use crate::layout::RecordLayout;
use crate::parser::{DataType, Literal};
use crate::validate::ValidationError;
use crate::value::Value;

/// Definition of a single column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnDefinition {
    /// Column name.
    pub name: String,
    /// Column type.
    pub data_type: DataType,
    /// Whether NULL may be written (stored as the type's zero value).
    pub nullable: bool,
    /// Value used when an INSERT omits this column.
    pub default: Option<Literal>,
    /// Whether this column is (part of) the primary key.
    pub is_primary_key: bool,
}

impl ColumnDefinition {
    /// Creates a nullable column without default.
    pub fn new(name: impl Into<String>, data_type: DataType) -> Self {
        Self {
            name: name.into(),
            data_type,
            nullable: true,
            default: None,
            is_primary_key: false,
        }
    }

    /// Marks the column NOT NULL.
    #[must_use]
    pub fn not_null(mut self) -> Self {
        self.nullable = false;
        self
    }

    /// Marks the column as primary key (implies NOT NULL).
    #[must_use]
    pub fn primary_key(mut self) -> Self {
        self.is_primary_key = true;
        self.nullable = false;
        self
    }

    /// Sets the default value.
    #[must_use]
    pub fn with_default(mut self, default: Literal) -> Self {
        self.default = Some(default);
        self
    }
}

/// Schema of one table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableSchema {
    /// Table name.
    pub name: String,
    /// Columns in declaration (and storage) order.
    pub columns: Vec<ColumnDefinition>,
}

impl TableSchema {
    /// Creates a new schema.
    pub fn new(name: impl Into<String>, columns: Vec<ColumnDefinition>) -> Self {
        Self {
            name: name.into(),
            columns,
        }
    }

    /// Returns the number of columns.
    pub fn len(&self) -> usize {
        self.columns.len()
    }

    /// Returns true if the schema has no columns.
    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    /// Finds a column index by name (ASCII case-insensitive).
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns
            .iter()
            .position(|c| c.name.eq_ignore_ascii_case(name))
    }

    /// Finds a column by name.
    pub fn column(&self, name: &str) -> Option<&ColumnDefinition> {
        self.column_index(name).map(|i| &self.columns[i])
    }

    /// Returns the first primary key column.
    pub fn primary_key(&self) -> Option<(usize, &ColumnDefinition)> {
        self.columns
            .iter()
            .enumerate()
            .find(|(_, c)| c.is_primary_key)
    }

    /// Returns the column names.
    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.name.as_str()).collect()
    }

    /// Computes the physical record layout.
    pub fn layout(&self) -> RecordLayout {
        RecordLayout::for_schema(self)
    }

    /// Describes the physical type sequence, e.g. `i32,c101,b`.
    pub fn layout_signature(&self) -> String {
        self.layout().signature()
    }

    /// Returns the zero-valued row for this schema.
    pub fn zero_row(&self) -> Vec<Value> {
        self.columns
            .iter()
            .map(|c| Value::zero(&c.data_type))
            .collect()
    }

    /// Checks names, types and defaults.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if !is_valid_identifier(&self.name) {
            return Err(ValidationError::InvalidSchema(format!(
                "table name '{}' must match [A-Za-z_][A-Za-z0-9_]*",
                self.name
            )));
        }
        if self.columns.is_empty() {
            return Err(ValidationError::InvalidSchema(format!(
                "table '{}' has no columns",
                self.name
            )));
        }

        for (i, column) in self.columns.iter().enumerate() {
            if !is_valid_identifier(&column.name) {
                return Err(ValidationError::InvalidSchema(format!(
                    "column name '{}' must match [A-Za-z_][A-Za-z0-9_]*",
                    column.name
                )));
            }
            if self.columns[..i]
                .iter()
                .any(|c| c.name.eq_ignore_ascii_case(&column.name))
            {
                return Err(ValidationError::DuplicateColumn(column.name.clone()));
            }
            if let DataType::Varchar(n) = column.data_type {
                if n == 0 || n > MAX_VARCHAR_LENGTH {
                    return Err(ValidationError::InvalidSchema(format!(
                        "column '{}': VARCHAR length must be in 1..={}",
                        column.name, MAX_VARCHAR_LENGTH
                    )));
                }
            }
            if let Some(ref default) = column.default {
                Value::coerce(default, &column.data_type).map_err(|source| {
                    ValidationError::InvalidValue {
                        column: column.name.clone(),
                        source,
                    }
                })?;
            }
        }

        Ok(())
    }
}

/// Returns true if `name` is usable as a table, column or index name.
///
/// Names end up in file names and generated symbols, so they are restricted
/// to C identifier characters.
pub fn is_valid_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

#[cfg(test)]
mod tests {
    use super::*;

    fn customers() -> TableSchema {
        TableSchema::new(
            "Customers",
            vec![
                ColumnDefinition::new("id", DataType::Int).primary_key(),
                ColumnDefinition::new("name", DataType::Varchar(100)),
                ColumnDefinition::new("email", DataType::Varchar(100)),
                ColumnDefinition::new("age", DataType::Int),
                ColumnDefinition::new("active", DataType::Boolean),
            ],
        )
    }

    #[test]
    fn test_column_lookup() {
        let schema = customers();
        assert_eq!(schema.column_index("age"), Some(3));
        assert_eq!(schema.column_index("AGE"), Some(3));
        assert_eq!(schema.column_index("missing"), None);
        assert_eq!(schema.primary_key().map(|(i, _)| i), Some(0));
        assert_eq!(schema.len(), 5);
    }

    #[test]
    fn test_validate_ok() {
        assert!(customers().validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_bad_names() {
        let schema = TableSchema::new("bad-name", vec![ColumnDefinition::new("a", DataType::Int)]);
        assert!(matches!(
            schema.validate(),
            Err(ValidationError::InvalidSchema(_))
        ));

        let schema = TableSchema::new(
            "t",
            vec![
                ColumnDefinition::new("a", DataType::Int),
                ColumnDefinition::new("A", DataType::Int),
            ],
        );
        assert!(matches!(
            schema.validate(),
            Err(ValidationError::DuplicateColumn(_))
        ));

        let schema = TableSchema::new("t", vec![]);
        assert!(schema.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_bad_default() {
        let schema = TableSchema::new(
            "t",
            vec![ColumnDefinition::new("d", DataType::Date)
                .with_default(Literal::String("yesterday".into()))],
        );
        assert!(matches!(
            schema.validate(),
            Err(ValidationError::InvalidValue { .. })
        ));
    }

    #[test]
    fn test_zero_row() {
        let row = customers().zero_row();
        assert_eq!(row[0], Value::Int(0));
        assert_eq!(row[1], Value::String(String::new()));
        assert_eq!(row[4], Value::Boolean(false));
    }

    #[test]
    fn test_identifier_rules() {
        assert!(is_valid_identifier("Customers"));
        assert!(is_valid_identifier("_t1"));
        assert!(!is_valid_identifier("1t"));
        assert!(!is_valid_identifier(""));
        assert!(!is_valid_identifier("a b"));
    }
}

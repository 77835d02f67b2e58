//! INSERT.

use tracing::info;
use uuid::Uuid;

use kiln_sql::parser::InsertStatement;
use kiln_sql::validate::PartialRow;
use kiln_sql::value::string_capacity;
use kiln_sql::{ColumnDefinition, DataType, TableSchema, Validator, Value};

use super::Executor;
use crate::error::EngineResult;
use crate::result::QueryResult;

impl Executor<'_> {
    pub(super) fn insert(&mut self, insert: &InsertStatement) -> EngineResult<QueryResult> {
        let schema = self.schema(&insert.table.table)?;
        let validator = Validator::new(&schema);
        let partial = validator.validate_insert(insert)?;
        let sequence = self.catalog.table(&schema.name)?.sequence;
        let (rows, sequence) = complete_rows(&schema, &validator, partial, sequence)?;

        let store = self.page_store(&schema);
        let touched = store.insert_rows(&rows)?;

        self.catalog.observe_key(&schema.name, sequence)?;
        self.catalog.mark_indexes_stale(&schema.name)?;
        self.catalog.save()?;

        info!(table = %schema.name, rows = rows.len(), pages = ?touched, "Inserted rows");
        Ok(QueryResult::affected(rows.len()))
    }
}

/// Fills omitted columns: declared default, then a synthesized primary
/// key, then the zero value. Keys are drawn from a copy of the table's
/// sequence; returns the rows and the advanced sequence.
fn complete_rows(
    schema: &TableSchema,
    validator: &Validator<'_>,
    partial: Vec<PartialRow>,
    mut sequence: i64,
) -> EngineResult<(Vec<Vec<Value>>, i64)> {
    let key_index = schema.primary_key().map(|(index, _)| index);

    // Explicit integer keys first, so synthesized keys land above them.
    if let Some(index) = key_index {
        for row in &partial {
            if let Some(Some(Value::Int(key))) = row.get(index) {
                sequence = sequence.max(i64::from(*key));
            }
        }
    }

    let mut rows = Vec::with_capacity(partial.len());
    for row in partial {
        let completed = validator.complete_row(row, |index, column| {
            if Some(index) != key_index {
                return None;
            }
            synthesize_key(column, || {
                sequence += 1;
                Some(sequence)
            })
        })?;
        rows.push(completed);
    }
    Ok((rows, sequence))
}

/// A fresh key for `column`: the next sequence value for integer keys, a
/// UUID v4 cut to the column capacity for string keys.
fn synthesize_key<F>(column: &ColumnDefinition, next_int: F) -> Option<Value>
where
    F: FnOnce() -> Option<i64>,
{
    match column.data_type {
        DataType::Int => next_int()
            .and_then(|key| i32::try_from(key).ok())
            .map(Value::Int),
        DataType::Varchar(_) | DataType::Text => {
            let mut key = Uuid::new_v4().to_string();
            key.truncate(string_capacity(&column.data_type));
            Some(Value::String(key))
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_synthesize_int_key() {
        let column = ColumnDefinition::new("id", DataType::Int).primary_key();
        assert_eq!(synthesize_key(&column, || Some(7)), Some(Value::Int(7)));
        assert_eq!(synthesize_key(&column, || Some(i64::MAX)), None);
    }

    #[test]
    fn test_synthesize_string_key() {
        let column = ColumnDefinition::new("code", DataType::Varchar(8)).primary_key();
        match synthesize_key(&column, || None) {
            Some(Value::String(key)) => assert_eq!(key.len(), 8),
            other => panic!("unexpected key {:?}", other),
        }

        let column = ColumnDefinition::new("code", DataType::Text).primary_key();
        match synthesize_key(&column, || None) {
            Some(Value::String(key)) => assert_eq!(key.len(), 36),
            other => panic!("unexpected key {:?}", other),
        }
    }

    #[test]
    fn test_no_key_for_other_types() {
        let column = ColumnDefinition::new("at", DataType::Date).primary_key();
        assert_eq!(synthesize_key(&column, || Some(1)), None);
    }
}

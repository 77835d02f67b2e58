//! CREATE TABLE, DROP TABLE, CREATE INDEX and index lookups.

use std::path::PathBuf;

use tracing::{debug, info};

use kiln_sql::parser::{CreateIndexStatement, CreateTableStatement, DropTableStatement, IndexKind};
use kiln_sql::{Row, TableSchema, ValidationError, Value};
use kiln_storage::{ArtifactId, IndexBuilder, IndexKey, IndexModule, StorageError};

use super::Executor;
use crate::catalog::{CatalogError, IndexInfo};
use crate::error::EngineResult;
use crate::result::{QueryResult, ResultSchema, RowFormat};

/// Key or key range to look up through an index.
#[derive(Debug, Clone, PartialEq)]
pub enum IndexProbe {
    /// Records whose key equals the value.
    Exact(Value),
    /// Records with `low <= key <= high`; `None` is unbounded. Ordered
    /// indexes only.
    Range {
        /// Inclusive lower bound.
        low: Option<Value>,
        /// Inclusive upper bound.
        high: Option<Value>,
    },
}

impl Executor<'_> {
    pub(super) fn create_table(&mut self, create: &CreateTableStatement) -> EngineResult<QueryResult> {
        let name = &create.name.table;
        if create.if_not_exists && self.catalog.contains(name) {
            debug!(table = %name, "Table exists, skipping");
            return Ok(QueryResult::affected(0));
        }
        self.create_schema(TableSchema::new(name.clone(), create.columns.clone()))?;
        Ok(QueryResult::affected(0))
    }

    /// Registers `schema` and writes its record header.
    pub(crate) fn create_schema(&mut self, schema: TableSchema) -> EngineResult<()> {
        self.catalog.create_table(schema.clone())?;
        self.page_store(&schema).ensure_header()?;
        info!(table = %schema.name, columns = schema.len(), "Created table");
        Ok(())
    }

    pub(super) fn drop_tables(&mut self, drop: &DropTableStatement) -> EngineResult<QueryResult> {
        for name in &drop.names {
            if !self.catalog.contains(&name.table) {
                if drop.if_exists {
                    continue;
                }
                return Err(CatalogError::TableNotFound(name.table.clone()).into());
            }

            let schema = self.schema(&name.table)?;
            self.page_store(&schema).drop_all()?;
            self.catalog.drop_table(&schema.name)?;
            info!(table = %schema.name, "Dropped table");
        }
        Ok(QueryResult::affected(0))
    }

    pub(super) fn create_index(&mut self, create: &CreateIndexStatement) -> EngineResult<QueryResult> {
        let schema = self.schema(&create.table.table)?;
        let column = schema
            .column(&create.column)
            .ok_or_else(|| ValidationError::UnknownColumn {
                table: schema.name.clone(),
                column: create.column.clone(),
            })?
            .name
            .clone();

        if create.if_not_exists {
            let info = self.catalog.table(&schema.name)?;
            if info.index_on(&column).is_some() {
                return Ok(QueryResult::affected(0));
            }
        }

        // Rejects unsupported key types before anything is recorded.
        IndexBuilder::new(&schema, &column, create.kind)?;

        self.catalog.add_index(
            &schema.name,
            IndexInfo {
                name: create.name.clone(),
                column: column.clone(),
                kind: create.kind,
                stale: true,
            },
        )?;
        self.build_index(&schema, &column, create.kind)?;
        self.catalog.mark_index_fresh(&schema.name, &column)?;
        self.catalog.save()?;

        info!(table = %schema.name, column = %column, kind = create.kind.as_str(), "Created index");
        Ok(QueryResult::affected(0))
    }

    /// Compiles the index over `column` from the current table contents.
    fn build_index(&self, schema: &TableSchema, column: &str, kind: IndexKind) -> EngineResult<PathBuf> {
        let builder = IndexBuilder::new(schema, column, kind)?;
        let index = schema.column_index(column).ok_or_else(|| ValidationError::UnknownColumn {
            table: schema.name.clone(),
            column: column.to_string(),
        })?;

        let store = self.page_store(schema);
        let mut entries = Vec::new();
        store.ensure_compiled()?;
        let mut cursor = store.cursor()?;
        while let Some(record) = cursor.current() {
            let key = record.value(index).as_ref().and_then(IndexKey::from_value);
            if let (Some(key), Ok(position)) = (key, i32::try_from(cursor.ordinal())) {
                entries.push((key, position));
            }
            cursor.advance()?;
        }
        drop(cursor);

        let entry_count = entries.len();
        let source = builder.render(entries)?;
        store.ensure_header()?;
        let path = self
            .pipeline
            .rebuild(&ArtifactId::index(&schema.name, column), &source)?;
        debug!(table = %schema.name, column, entries = entry_count, "Built index");
        Ok(path)
    }

    /// Rows whose `column` matches `probe`, in table order. A stale or
    /// missing index is rebuilt first.
    pub(crate) fn index_lookup(
        &mut self,
        table: &str,
        column: &str,
        probe: &IndexProbe,
    ) -> EngineResult<QueryResult> {
        let schema = self.schema(table)?;
        let info = self.catalog.index(table, column)?.clone();
        let id = ArtifactId::index(&schema.name, &info.column);

        if info.stale || !self.pipeline.is_built(&id) {
            self.build_index(&schema, &info.column, info.kind)?;
            self.catalog.mark_index_fresh(&schema.name, &info.column)?;
            self.catalog.save()?;
        }

        let data_type = schema
            .column(&info.column)
            .map(|c| c.data_type)
            .ok_or_else(|| ValidationError::UnknownColumn {
                table: schema.name.clone(),
                column: info.column.clone(),
            })?;
        let path = self.pipeline.paths().artifact_path(&id);
        let module = IndexModule::open(&path, &info.column, &data_type, info.kind)?;
        let found = probe_index(&module, probe);
        module.unload()?;
        let mut positions = found?;
        positions.sort_unstable();
        positions.dedup();

        let rows = self.rows_at(&schema, &positions)?;
        Ok(QueryResult::ok(
            ResultSchema::from_columns(schema.columns.iter().map(|c| (c.name.clone(), c.data_type))),
            rows,
            RowFormat::DirectRecordPointer,
        ))
    }

    /// Every row of `table`, read through the page cursor.
    pub(crate) fn scan_table(&self, table: &str) -> EngineResult<Vec<Row>> {
        let schema = self.schema(table)?;
        let store = self.page_store(&schema);
        let mut rows = Vec::new();
        store.ensure_compiled()?;
        let mut cursor = store.cursor()?;
        while let Some(record) = cursor.current() {
            rows.push(record.to_row());
            cursor.advance()?;
        }
        Ok(rows)
    }

    /// Rows at sorted global `positions`.
    fn rows_at(&self, schema: &TableSchema, positions: &[usize]) -> EngineResult<Vec<Row>> {
        let store = self.page_store(schema);
        let mut rows = Vec::with_capacity(positions.len());
        let mut wanted = positions.iter().peekable();
        store.ensure_compiled()?;
        let mut cursor = store.cursor()?;

        while let Some(&&next) = wanted.peek() {
            let Some(record) = cursor.current() else {
                break;
            };
            if cursor.ordinal() == next {
                rows.push(record.to_row());
                wanted.next();
            }
            cursor.advance()?;
        }
        Ok(rows)
    }
}

fn probe_index(module: &IndexModule, probe: &IndexProbe) -> EngineResult<Vec<usize>> {
    let key = |value: &Value| {
        IndexKey::from_value(value)
            .ok_or_else(|| StorageError::InvalidKey(format!("{} cannot be an index key", value)))
    };

    let positions = match probe {
        IndexProbe::Exact(value) => module.find_exact(&key(value)?)?,
        IndexProbe::Range { low, high } => {
            let low = low.as_ref().map(key).transpose()?;
            let high = high.as_ref().map(key).transpose()?;
            module.find_range(low.as_ref(), high.as_ref())?
        }
    };
    Ok(positions)
}

//! Statement execution.
//!
//! Every statement runs to completion on the calling thread:
//!
//! ```text
//! resolve schema -> validate -> generate -> build (cached) -> load
//!     -> for each page: load page, invoke kernel, unload page
//!     -> decode -> unload kernel
//! ```
//!
//! Writes edit page sources and recompile only the pages they touch.

mod ddl;
mod insert;
mod mutate;
mod scan;

use kiln_common::EngineConfig;
use kiln_sql::{Statement, TableSchema};
use kiln_storage::{BuildPipeline, PageStore};

use crate::catalog::Catalog;
use crate::error::EngineResult;
use crate::result::QueryResult;

pub use ddl::IndexProbe;

/// Executes statements against one catalog and build pipeline.
pub(crate) struct Executor<'a> {
    catalog: &'a mut Catalog,
    pipeline: &'a BuildPipeline,
    config: &'a EngineConfig,
}

impl<'a> Executor<'a> {
    pub(crate) fn new(
        catalog: &'a mut Catalog,
        pipeline: &'a BuildPipeline,
        config: &'a EngineConfig,
    ) -> Self {
        Self {
            catalog,
            pipeline,
            config,
        }
    }

    /// Executes one statement.
    pub(crate) fn execute(&mut self, statement: &Statement) -> EngineResult<QueryResult> {
        match statement {
            Statement::Select(select) => self.select(select),
            Statement::Insert(insert) => self.insert(insert),
            Statement::Update(update) => self.update(update),
            Statement::Delete(delete) => self.delete(delete),
            Statement::CreateTable(create) => self.create_table(create),
            Statement::DropTable(drop) => self.drop_tables(drop),
            Statement::CreateIndex(create) => self.create_index(create),
        }
    }

    /// Schema of `table`, cloned out of the catalog.
    fn schema(&self, table: &str) -> EngineResult<TableSchema> {
        Ok(self.catalog.schema(table)?.clone())
    }

    /// Page store for `schema`. Borrows the pipeline, not the executor.
    fn page_store<'s>(&self, schema: &'s TableSchema) -> PageStore<'s>
    where
        'a: 's,
    {
        PageStore::new(schema, self.pipeline, self.config.page_capacity)
    }
}

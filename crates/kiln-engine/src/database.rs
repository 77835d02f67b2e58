//! The database facade.
//!
//! `Database` owns the catalog, the build pipeline and the configuration,
//! and runs one statement at a time behind a mutex.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tracing::{debug, info, warn};

use kiln_common::EngineConfig;
use kiln_sql::{Parser, Row, Statement, TableSchema};
use kiln_storage::{BuildPipeline, BuildStats, StorageError, StoragePaths};

use crate::catalog::Catalog;
use crate::error::EngineResult;
use crate::exec::{Executor, IndexProbe};
use crate::result::QueryResult;

/// Database statistics.
#[derive(Debug, Clone, Default)]
pub struct DatabaseStats {
    /// Number of tables.
    pub tables: usize,
    /// Statements executed since open.
    pub statements: u64,
    /// Build counters.
    pub builds: BuildStats,
    /// Time since open.
    pub uptime: Duration,
}

struct DatabaseState {
    catalog: Catalog,
    pipeline: BuildPipeline,
}

/// The main database engine.
pub struct Database {
    config: EngineConfig,
    state: Mutex<DatabaseState>,
    statements: AtomicU64,
    started_at: Instant,
}

impl Database {
    /// Opens the database in `config.data_dir`, creating it if needed.
    pub fn open(config: EngineConfig) -> EngineResult<Self> {
        config.validate()?;

        let paths = StoragePaths::new(&config.data_dir);
        paths.ensure_layout().map_err(|source| StorageError::Io {
            path: paths.root().to_path_buf(),
            source,
        })?;

        let catalog = Catalog::open(paths.catalog_path())?;
        let pipeline = BuildPipeline::new(paths, config.build.clone());
        if !pipeline.compiler_available() {
            warn!(compiler = %config.build.compiler, "C compiler not found; queries will fail to build");
        }

        info!(
            data_dir = %config.data_dir.display(),
            tables = catalog.list_tables().len(),
            "Opened database"
        );
        Ok(Self {
            config,
            state: Mutex::new(DatabaseState { catalog, pipeline }),
            statements: AtomicU64::new(0),
            started_at: Instant::now(),
        })
    }

    /// Configuration the database was opened with.
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Executes every statement in `sql`, stopping at the first failure.
    pub fn execute(&self, sql: &str) -> EngineResult<Vec<QueryResult>> {
        let statements = Parser::parse(sql)?;
        statements
            .iter()
            .map(|statement| self.execute_statement(statement))
            .collect()
    }

    /// Executes exactly one statement.
    pub fn execute_one(&self, sql: &str) -> EngineResult<QueryResult> {
        let statement = Parser::parse_one(sql)?;
        self.execute_statement(&statement)
    }

    /// Executes `sql` and reports failure in the result instead of an
    /// error. With several statements, the last result is returned.
    pub fn run(&self, sql: &str) -> QueryResult {
        match self.execute(sql) {
            Ok(mut results) => results.pop().unwrap_or_else(|| QueryResult::affected(0)),
            Err(e) => {
                debug!(error = %e, code = %e.code(), "Statement failed");
                QueryResult::error(e.to_string())
            }
        }
    }

    /// Executes a parsed statement.
    pub fn execute_statement(&self, statement: &Statement) -> EngineResult<QueryResult> {
        let start = Instant::now();
        let result = self.with_executor(|exec| exec.execute(statement))?;
        self.statements.fetch_add(1, Ordering::Relaxed);
        Ok(result.with_elapsed(start.elapsed()))
    }

    /// Creates a table from a schema.
    pub fn create_table(&self, schema: TableSchema) -> EngineResult<()> {
        self.with_executor(|exec| exec.create_schema(schema))
    }

    /// Schema of `table`.
    pub fn table_schema(&self, table: &str) -> EngineResult<TableSchema> {
        let state = self.state.lock();
        Ok(state.catalog.schema(table)?.clone())
    }

    /// Table names, sorted.
    pub fn list_tables(&self) -> Vec<String> {
        self.state.lock().catalog.list_tables()
    }

    /// Every row of `table` in page order, read through the page cursor.
    pub fn scan_table(&self, table: &str) -> EngineResult<Vec<Row>> {
        self.with_executor(|exec| exec.scan_table(table))
    }

    /// Rows of `table` whose indexed `column` matches `probe`.
    pub fn index_lookup(
        &self,
        table: &str,
        column: &str,
        probe: &IndexProbe,
    ) -> EngineResult<QueryResult> {
        self.with_executor(|exec| exec.index_lookup(table, column, probe))
    }

    /// Build counters.
    pub fn build_stats(&self) -> BuildStats {
        self.state.lock().pipeline.stats()
    }

    /// Returns true if the configured C compiler can be started.
    pub fn compiler_available(&self) -> bool {
        self.state.lock().pipeline.compiler_available()
    }

    /// Database statistics.
    pub fn stats(&self) -> DatabaseStats {
        let state = self.state.lock();
        DatabaseStats {
            tables: state.catalog.list_tables().len(),
            statements: self.statements.load(Ordering::Relaxed),
            builds: state.pipeline.stats(),
            uptime: self.started_at.elapsed(),
        }
    }

    fn with_executor<T, F>(&self, f: F) -> EngineResult<T>
    where
        F: FnOnce(&mut Executor<'_>) -> EngineResult<T>,
    {
        let mut guard = self.state.lock();
        let state = &mut *guard;
        let mut executor = Executor::new(&mut state.catalog, &state.pipeline, &self.config);
        f(&mut executor)
    }
}

impl std::fmt::Debug for Database {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Database")
            .field("data_dir", &self.config.data_dir)
            .field("statements", &self.statements.load(Ordering::Relaxed))
            .finish()
    }
}


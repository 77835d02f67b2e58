//! Table catalog.
//!
//! The catalog stores the schema of every table, the state of its primary
//! key sequence and its indexes. It is persisted as `catalog.json` in the
//! data directory and rewritten after every change.

use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use kiln_sql::parser::IndexKind;
use kiln_sql::{TableSchema, ValidationError};

const CATALOG_VERSION: u32 = 1;

/// Errors raised by catalog operations.
#[derive(Debug, Error)]
#[allow(missing_docs)]
pub enum CatalogError {
    /// Catalog file could not be read or written.
    #[error("catalog I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Catalog file is not valid JSON.
    #[error("catalog {path} is corrupted: {source}")]
    Corrupted {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    /// Catalog file has an unknown version.
    #[error("catalog version {found} is not supported (expected {expected})")]
    UnsupportedVersion { found: u32, expected: u32 },

    /// Table already exists.
    #[error("table '{0}' already exists")]
    TableExists(String),

    /// Table does not exist.
    #[error("table '{0}' does not exist")]
    TableNotFound(String),

    /// An index already covers the column, or the name is taken.
    #[error("index '{0}' already exists")]
    IndexExists(String),

    /// No index on the column.
    #[error("no index on {table}.{column}")]
    IndexNotFound { table: String, column: String },

    /// Schema definition is invalid.
    #[error(transparent)]
    InvalidSchema(#[from] ValidationError),
}

/// Result type for catalog operations.
pub type CatalogResult<T> = Result<T, CatalogError>;

/// Index metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexInfo {
    /// Index name.
    pub name: String,
    /// Indexed column (schema spelling).
    pub column: String,
    /// Ordered or hash.
    pub kind: IndexKind,
    /// True when the table changed after the index was last built.
    pub stale: bool,
}

/// Table metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableInfo {
    /// Table schema.
    pub schema: TableSchema,
    /// Largest integer primary key seen or assigned.
    pub sequence: i64,
    /// Indexes on the table.
    pub indexes: Vec<IndexInfo>,
}

impl TableInfo {
    fn new(schema: TableSchema) -> Self {
        Self {
            schema,
            sequence: 0,
            indexes: Vec::new(),
        }
    }

    /// Index on `column`, if any.
    pub fn index_on(&self, column: &str) -> Option<&IndexInfo> {
        self.indexes
            .iter()
            .find(|i| i.column.eq_ignore_ascii_case(column))
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct CatalogFile {
    version: u32,
    tables: BTreeMap<String, TableInfo>,
}

/// The table catalog.
#[derive(Debug)]
pub struct Catalog {
    path: PathBuf,
    /// Tables keyed by lower-case name.
    tables: BTreeMap<String, TableInfo>,
}

impl Catalog {
    /// Opens the catalog at `path`, starting empty if the file is missing.
    pub fn open(path: impl Into<PathBuf>) -> CatalogResult<Self> {
        let path = path.into();
        let tables = match fs::read(&path) {
            Ok(bytes) => {
                let file: CatalogFile =
                    serde_json::from_slice(&bytes).map_err(|source| CatalogError::Corrupted {
                        path: path.clone(),
                        source,
                    })?;
                if file.version != CATALOG_VERSION {
                    return Err(CatalogError::UnsupportedVersion {
                        found: file.version,
                        expected: CATALOG_VERSION,
                    });
                }
                file.tables
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => BTreeMap::new(),
            Err(source) => return Err(CatalogError::Io { path, source }),
        };

        debug!(path = %path.display(), tables = tables.len(), "Opened catalog");
        Ok(Self { path, tables })
    }

    /// Path of the catalog file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Writes the catalog to disk.
    pub fn save(&self) -> CatalogResult<()> {
        let file = CatalogFile {
            version: CATALOG_VERSION,
            tables: self.tables.clone(),
        };
        let json = serde_json::to_vec_pretty(&file).map_err(|source| CatalogError::Corrupted {
            path: self.path.clone(),
            source,
        })?;

        let io_err = |source| CatalogError::Io {
            path: self.path.clone(),
            source,
        };
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(io_err)?;
        }
        let temp = self.path.with_extension("json.tmp");
        fs::write(&temp, json).map_err(io_err)?;
        fs::rename(&temp, &self.path).map_err(io_err)?;
        Ok(())
    }

    fn key(name: &str) -> String {
        name.to_ascii_lowercase()
    }

    /// Adds a table.
    pub fn create_table(&mut self, schema: TableSchema) -> CatalogResult<()> {
        schema.validate()?;
        let key = Self::key(&schema.name);
        if self.tables.contains_key(&key) {
            return Err(CatalogError::TableExists(schema.name));
        }
        self.tables.insert(key, TableInfo::new(schema));
        self.save()
    }

    /// Removes a table.
    pub fn drop_table(&mut self, name: &str) -> CatalogResult<TableInfo> {
        let info = self
            .tables
            .remove(&Self::key(name))
            .ok_or_else(|| CatalogError::TableNotFound(name.to_string()))?;
        self.save()?;
        Ok(info)
    }

    /// Table metadata.
    pub fn table(&self, name: &str) -> CatalogResult<&TableInfo> {
        self.tables
            .get(&Self::key(name))
            .ok_or_else(|| CatalogError::TableNotFound(name.to_string()))
    }

    fn table_mut(&mut self, name: &str) -> CatalogResult<&mut TableInfo> {
        self.tables
            .get_mut(&Self::key(name))
            .ok_or_else(|| CatalogError::TableNotFound(name.to_string()))
    }

    /// Table schema.
    pub fn schema(&self, name: &str) -> CatalogResult<&TableSchema> {
        self.table(name).map(|t| &t.schema)
    }

    /// Returns true if the table exists.
    pub fn contains(&self, name: &str) -> bool {
        self.tables.contains_key(&Self::key(name))
    }

    /// Table names, sorted.
    pub fn list_tables(&self) -> Vec<String> {
        self.tables.values().map(|t| t.schema.name.clone()).collect()
    }

    /// Raises the table's integer key sequence to at least `key`. Later
    /// synthesized keys start above it. Does not persist.
    pub fn observe_key(&mut self, table: &str, key: i64) -> CatalogResult<()> {
        let info = self.table_mut(table)?;
        info.sequence = info.sequence.max(key);
        Ok(())
    }

    /// Adds an index.
    pub fn add_index(&mut self, table: &str, index: IndexInfo) -> CatalogResult<()> {
        let name_taken = self
            .tables
            .values()
            .flat_map(|t| &t.indexes)
            .any(|i| i.name.eq_ignore_ascii_case(&index.name));
        let info = self.table_mut(table)?;
        if name_taken || info.index_on(&index.column).is_some() {
            return Err(CatalogError::IndexExists(index.name));
        }
        info.indexes.push(index);
        self.save()
    }

    /// Index on `table.column`.
    pub fn index(&self, table: &str, column: &str) -> CatalogResult<&IndexInfo> {
        self.table(table)?
            .index_on(column)
            .ok_or_else(|| CatalogError::IndexNotFound {
                table: table.to_string(),
                column: column.to_string(),
            })
    }

    /// Marks every index of a table stale. Does not persist.
    pub fn mark_indexes_stale(&mut self, table: &str) -> CatalogResult<()> {
        for index in &mut self.table_mut(table)?.indexes {
            index.stale = true;
        }
        Ok(())
    }

    /// Marks the index on `table.column` as built. Does not persist.
    pub fn mark_index_fresh(&mut self, table: &str, column: &str) -> CatalogResult<()> {
        let info = self.table_mut(table)?;
        if let Some(index) = info
            .indexes
            .iter_mut()
            .find(|i| i.column.eq_ignore_ascii_case(column))
        {
            index.stale = false;
        }
        Ok(())
    }
}

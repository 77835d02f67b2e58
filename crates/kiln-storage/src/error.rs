//! Storage error types.
//!
//! One enum per stage: building artifacts, loading them, and maintaining
//! page sources.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

use kiln_sql::CodegenError;

/// Result type for build operations.
pub type BuildResult<T> = Result<T, BuildError>;

/// Result type for load operations.
pub type LoadResult<T> = Result<T, LoadError>;

/// Result type for page store operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Errors raised while compiling generated source.
#[derive(Debug, Error)]
#[allow(missing_docs)] // Fields are documented by variant docs
pub enum BuildError {
    /// I/O error writing source, script or artifact.
    #[error("build I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// The compiler exited with a non-zero status.
    #[error("compiling {artifact} failed ({status}): {stderr}")]
    CompilerFailed {
        artifact: String,
        status: String,
        stderr: String,
    },

    /// The shell or compiler could not be started.
    #[error("compiler '{compiler}' is not available: {source}")]
    CompilerUnavailable {
        compiler: String,
        #[source]
        source: io::Error,
    },
}

impl BuildError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

/// Errors raised while loading compiled modules.
#[derive(Debug, Error)]
#[allow(missing_docs)]
pub enum LoadError {
    /// The dynamic library could not be opened.
    #[error("failed to load module {path}: {source}")]
    Library {
        path: PathBuf,
        #[source]
        source: libloading::Error,
    },

    /// A required symbol is missing from the module.
    #[error("module {path} has no symbol '{symbol}'")]
    MissingSymbol { path: PathBuf, symbol: String },

    /// The module's record size disagrees with the table layout.
    #[error("module {path} reports record size {actual}, layout expects {expected}")]
    LayoutMismatch {
        path: PathBuf,
        expected: usize,
        actual: usize,
    },

    /// An operation needed a loaded module.
    #[error("no module loaded")]
    NotLoaded,
}

/// Errors raised by the page store and index maintenance.
#[derive(Debug, Error)]
#[allow(missing_docs)]
pub enum StorageError {
    /// I/O error on a page source or directory.
    #[error("storage I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Page source is missing its record markers or is otherwise malformed.
    #[error("page source {path} is corrupted: {reason}")]
    PageCorrupted { path: PathBuf, reason: String },

    /// Page index has no source.
    #[error("page {page} of table '{table}' does not exist")]
    PageNotFound { table: String, page: usize },

    /// Record position outside a page.
    #[error("position {position} out of range for page with {count} records")]
    PositionOutOfRange { position: usize, count: usize },

    /// Index probe key does not fit the index.
    #[error("invalid index key: {0}")]
    InvalidKey(String),

    /// Rendering a record or index failed.
    #[error(transparent)]
    Codegen(#[from] CodegenError),

    /// Building a page or index failed.
    #[error(transparent)]
    Build(#[from] BuildError),

    /// Loading a page or index failed.
    #[error(transparent)]
    Load(#[from] LoadError),
}

impl StorageError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn corrupted(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self::PageCorrupted {
            path: path.into(),
            reason: reason.into(),
        }
    }
}

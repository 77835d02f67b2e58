//! # kiln-storage
//!
//! Native artifact storage for Kiln.
//!
//! Pages, query kernels and indices are all C sources compiled into
//! shared libraries. This crate provides:
//! - The data directory layout and artifact naming
//! - The build pipeline (generate, compile once, cache)
//! - Dynamic module loading
//! - Page modules, page sources and the page cursor
//! - Kernel and index modules

#![warn(missing_docs)]
#![warn(clippy::all)]

/// Build pipeline
pub mod build;

/// Cursor over table pages
pub mod cursor;

/// Error types
pub mod error;

/// Column index modules
pub mod index;

/// Kernel modules
pub mod kernel;

/// Dynamic module loader
pub mod loader;

/// Page modules and page sources
pub mod page;

/// Data directory layout
pub mod paths;

pub use build::{BuildPipeline, BuildStats, StagedBuild};
pub use cursor::PageCursor;
pub use error::{BuildError, LoadError, StorageError};
pub use index::{IndexBuilder, IndexKey, IndexModule};
pub use kernel::{KernelModule, OutputBuffer};
pub use loader::ModuleHandle;
pub use page::{PageEdit, PageModule, PageSource, PageStore};
pub use paths::{ArtifactId, ArtifactKind, StoragePaths};

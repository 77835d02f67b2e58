//! System-wide constants for Kiln.
//!
//! Directory layout names, type capacities and default limits.

// =============================================================================
// Data Directory Layout
// =============================================================================

/// Directory (under the data root) holding compiled native modules.
pub const COMPILED_DIR: &str = "compiled";

/// Directory (under the data root) holding generated build scripts.
pub const SCRIPTS_DIR: &str = "scripts";

/// Directory (under the data root) holding per-table sources and headers.
pub const TABLES_DIR: &str = "tables";

/// Per-table subdirectory for generated C sources.
pub const SOURCE_SUBDIR: &str = "src";

/// Per-table subdirectory for generated headers.
pub const INCLUDE_SUBDIR: &str = "include";

/// File name of the persisted catalog.
pub const CATALOG_FILE: &str = "catalog.json";

// =============================================================================
// Type Capacities
// =============================================================================

/// Byte capacity of a `TEXT` field, including the terminating NUL.
pub const TEXT_CAPACITY: usize = 256;

/// Byte capacity of a `DATE` field: `YYYY-MM-DD` plus NUL.
pub const DATE_CAPACITY: usize = 11;

/// Length used for `VARCHAR` declared without an explicit length.
pub const DEFAULT_VARCHAR_LENGTH: u32 = 255;

/// Largest accepted `VARCHAR(n)` length.
pub const MAX_VARCHAR_LENGTH: u32 = 65_535;

// =============================================================================
// Engine Limits
// =============================================================================

/// Default number of records per page before a new page is started.
pub const DEFAULT_PAGE_CAPACITY: usize = 65_535;

/// Default cap on rows materialized for a single query.
pub const DEFAULT_MAX_RESULT_ROWS: usize = 10_000;

/// Largest accepted page capacity (positions are `int` in the page ABI).
pub const MAX_PAGE_CAPACITY: usize = i32::MAX as usize;

/// Name of the synthetic column produced by `COUNT(*)`.
pub const COUNT_COLUMN: &str = "count";

/// Name of the synthetic column produced by INSERT, UPDATE and DELETE.
pub const ROWS_AFFECTED_COLUMN: &str = "rows_affected";

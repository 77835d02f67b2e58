//! # kiln-engine
//!
//! The Kiln query engine.
//!
//! SQL statements are not interpreted. Each query is turned into a C
//! kernel specialised for its table layout, filter and projection, compiled
//! into a shared library, loaded and run over every compiled page of the
//! table. Table data itself lives in compiled page modules whose C source
//! is the durable copy of the rows.
//!
//! ## Example
//!
//! ```rust,no_run
//! use kiln_common::EngineConfig;
//! use kiln_engine::Database;
//!
//! let db = Database::open(EngineConfig::with_data_dir("./kiln-data")).unwrap();
//! db.execute("CREATE TABLE users (id INT PRIMARY KEY, name VARCHAR(50))").unwrap();
//! db.execute("INSERT INTO users (name) VALUES ('Alice'), ('Bob')").unwrap();
//!
//! let result = db.execute_one("SELECT name FROM users WHERE id = 2").unwrap();
//! println!("{}", result.display());
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

/// Table catalog
pub mod catalog;

/// Database facade
pub mod database;

/// Error types
pub mod error;

/// Statement results
pub mod result;

mod exec;

pub use catalog::{Catalog, CatalogError, IndexInfo, TableInfo};
pub use database::{Database, DatabaseStats};
pub use error::{EngineError, EngineResult};
pub use exec::IndexProbe;
pub use result::{QueryResult, ResultColumn, ResultSchema, RowFormat};

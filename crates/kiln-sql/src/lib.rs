//! # kiln-sql
//!
//! SQL front end for Kiln.
//!
//! This crate implements:
//! - SQL parsing (PostgreSQL dialect) into a small AST
//! - Table schemas and native record layouts
//! - Statement validation and binding
//! - C kernel generation for filters and projections

#![warn(missing_docs)]
#![warn(clippy::all)]

/// SQL tokenizer and parser
pub mod parser;

/// Table schemas
pub mod schema;

/// Runtime values and rows
pub mod value;

/// Native record layouts
pub mod layout;

/// Statement validation
pub mod validate;

/// C code generation
pub mod codegen;

pub use codegen::{CodegenError, GeneratedKernel, KernelGenerator};
pub use layout::{FieldLayout, RecordLayout, RecordView};
pub use parser::{DataType, Expr, Literal, ParseError, Parser, Statement};
pub use schema::{ColumnDefinition, TableSchema};
pub use validate::{KernelSpec, Projection, ValidationError, Validator};
pub use value::{Row, Value, ValueError};

//! Engine error types.

use thiserror::Error;

use kiln_common::{ConfigError, ErrorCode};
use kiln_sql::{CodegenError, ParseError, ValidationError};
use kiln_storage::{BuildError, LoadError, StorageError};

use crate::catalog::CatalogError;

/// Errors surfaced by the engine.
#[derive(Debug, Error)]
pub enum EngineError {
    /// SQL text could not be parsed.
    #[error("parse error: {0}")]
    Parse(#[from] ParseError),

    /// Statement does not fit the schema.
    #[error("validation error: {0}")]
    Validation(#[from] ValidationError),

    /// Kernel or index source generation failed.
    #[error("codegen error: {0}")]
    Codegen(#[from] CodegenError),

    /// Compiling generated source failed.
    #[error("build error: {0}")]
    Build(#[from] BuildError),

    /// Loading a compiled module failed.
    #[error("load error: {0}")]
    Load(#[from] LoadError),

    /// Page storage failed.
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    /// Catalog lookup or update failed.
    #[error("catalog error: {0}")]
    Catalog(#[from] CatalogError),

    /// Configuration is invalid.
    #[error("config error: {0}")]
    Config(#[from] ConfigError),

    /// Statement kind the engine does not execute.
    #[error("not supported: {0}")]
    Unsupported(String),
}

impl EngineError {
    /// Stable error code for this error.
    pub fn code(&self) -> ErrorCode {
        match self {
            EngineError::Parse(e) => match e {
                ParseError::Unsupported(_) => ErrorCode::NotSupported,
                _ => ErrorCode::SyntaxError,
            },
            EngineError::Validation(e) => validation_code(e),
            EngineError::Codegen(e) => codegen_code(e),
            EngineError::Build(e) => build_code(e),
            EngineError::Load(e) => load_code(e),
            EngineError::Storage(e) => storage_code(e),
            EngineError::Catalog(e) => match e {
                CatalogError::Io { .. } | CatalogError::Corrupted { .. } => ErrorCode::Io,
                CatalogError::UnsupportedVersion { .. } => ErrorCode::InvalidConfig,
                CatalogError::TableExists(_) => ErrorCode::TableExists,
                CatalogError::TableNotFound(_) => ErrorCode::TableNotFound,
                CatalogError::IndexExists(_) => ErrorCode::IndexExists,
                CatalogError::IndexNotFound { .. } => ErrorCode::IndexNotFound,
                CatalogError::InvalidSchema(e) => validation_code(e),
            },
            EngineError::Config(_) => ErrorCode::InvalidConfig,
            EngineError::Unsupported(_) => ErrorCode::NotSupported,
        }
    }
}

fn validation_code(e: &ValidationError) -> ErrorCode {
    match e {
        ValidationError::UnknownTable(_) => ErrorCode::TableNotFound,
        ValidationError::UnknownColumn { .. } => ErrorCode::ColumnNotFound,
        ValidationError::UnsupportedExpression(_) => ErrorCode::UnsupportedExpression,
        ValidationError::TypeMismatch(_) => ErrorCode::TypeMismatch,
        ValidationError::NotNullViolation(_) => ErrorCode::NotNullViolation,
        ValidationError::ValueCountMismatch { .. }
        | ValidationError::InvalidValue { .. }
        | ValidationError::DuplicateColumn(_)
        | ValidationError::InvalidSchema(_) => ErrorCode::InvalidValue,
    }
}

fn codegen_code(e: &CodegenError) -> ErrorCode {
    match e {
        CodegenError::UnknownColumn(_) => ErrorCode::ColumnNotFound,
        CodegenError::UnsupportedExpression(_) => ErrorCode::UnsupportedExpression,
        CodegenError::InvalidLiteral(_) => ErrorCode::CodegenFailed,
    }
}

fn build_code(e: &BuildError) -> ErrorCode {
    match e {
        BuildError::Io { .. } => ErrorCode::Io,
        BuildError::CompilerFailed { .. } => ErrorCode::CompilerFailed,
        BuildError::CompilerUnavailable { .. } => ErrorCode::CompilerUnavailable,
    }
}

fn load_code(e: &LoadError) -> ErrorCode {
    match e {
        LoadError::Library { .. } | LoadError::NotLoaded => ErrorCode::ModuleLoadFailed,
        LoadError::MissingSymbol { .. } => ErrorCode::SymbolNotFound,
        LoadError::LayoutMismatch { .. } => ErrorCode::LayoutMismatch,
    }
}

fn storage_code(e: &StorageError) -> ErrorCode {
    match e {
        StorageError::Io { .. } => ErrorCode::Io,
        StorageError::PageCorrupted { .. } | StorageError::PageNotFound { .. } => {
            ErrorCode::PageCorrupted
        }
        StorageError::PositionOutOfRange { .. } => ErrorCode::Internal,
        StorageError::InvalidKey(_) => ErrorCode::InvalidValue,
        StorageError::Codegen(e) => codegen_code(e),
        StorageError::Build(e) => build_code(e),
        StorageError::Load(e) => load_code(e),
    }
}

/// Result type for engine operations.
pub type EngineResult<T> = Result<T, EngineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codes() {
        let err = EngineError::from(ValidationError::UnknownTable("t".into()));
        assert_eq!(err.code(), ErrorCode::TableNotFound);

        let err = EngineError::from(CatalogError::TableExists("t".into()));
        assert_eq!(err.code(), ErrorCode::TableExists);

        let err = EngineError::from(ParseError::Syntax("oops".into()));
        assert_eq!(err.code(), ErrorCode::SyntaxError);

        let err = EngineError::Unsupported("ALTER".into());
        assert_eq!(err.code(), ErrorCode::NotSupported);
    }

    #[test]
    fn test_nested_storage_codes() {
        let err = EngineError::from(StorageError::from(BuildError::CompilerFailed {
            artifact: "t_page_0".into(),
            status: "exit status: 1".into(),
            stderr: String::new(),
        }));
        assert_eq!(err.code(), ErrorCode::CompilerFailed);

        let err = EngineError::from(StorageError::from(LoadError::NotLoaded));
        assert_eq!(err.code(), ErrorCode::ModuleLoadFailed);
        assert!(err.to_string().starts_with("storage error"));
    }
}

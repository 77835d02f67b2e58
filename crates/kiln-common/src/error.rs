//! Error codes for Kiln.
//!
//! Every layer has its own `thiserror` error type; each of them maps onto a
//! stable [`ErrorCode`] so callers (and the CLI) can branch on a number
//! without matching on concrete enums.

use std::fmt;

/// Error codes for categorizing errors.
///
/// These codes are stable across versions. The high byte is the category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum ErrorCode {
    // General errors (0x0000 - 0x00FF)
    /// Unknown or unspecified error.
    Unknown = 0x0000,
    /// Internal error (bug).
    Internal = 0x0001,
    /// Operation not supported.
    NotSupported = 0x0002,
    /// Invalid configuration.
    InvalidConfig = 0x0003,

    // I/O errors (0x0100 - 0x01FF)
    /// General I/O error.
    Io = 0x0100,

    // Validation errors (0x0200 - 0x02FF)
    /// SQL syntax error.
    SyntaxError = 0x0200,
    /// Table not found.
    TableNotFound = 0x0201,
    /// Column not found.
    ColumnNotFound = 0x0202,
    /// Type mismatch.
    TypeMismatch = 0x0203,
    /// Expression shape the compiler does not lower.
    UnsupportedExpression = 0x0204,
    /// Literal cannot be stored in the target column.
    InvalidValue = 0x0205,
    /// NULL written to a NOT NULL column.
    NotNullViolation = 0x0206,

    // Codegen errors (0x0300 - 0x03FF)
    /// Kernel source generation failed.
    CodegenFailed = 0x0300,

    // Build errors (0x0400 - 0x04FF)
    /// External compiler exited with failure.
    CompilerFailed = 0x0400,
    /// External compiler could not be started.
    CompilerUnavailable = 0x0401,

    // Load errors (0x0500 - 0x05FF)
    /// Native module could not be opened.
    ModuleLoadFailed = 0x0500,
    /// Required symbol missing from a module.
    SymbolNotFound = 0x0501,
    /// Module record size differs from the schema layout.
    LayoutMismatch = 0x0502,

    // Storage errors (0x0600 - 0x06FF)
    /// Page source is malformed.
    PageCorrupted = 0x0600,

    // Catalog errors (0x0700 - 0x07FF)
    /// Table already exists.
    TableExists = 0x0700,
    /// Index already exists.
    IndexExists = 0x0701,
    /// Index not found.
    IndexNotFound = 0x0702,
}

impl ErrorCode {
    /// Returns the numeric code.
    #[inline]
    #[must_use]
    pub const fn as_u16(self) -> u16 {
        self as u16
    }

    /// Returns the error category name.
    #[must_use]
    pub const fn category(&self) -> &'static str {
        match (*self as u16) >> 8 {
            0x00 => "General",
            0x01 => "I/O",
            0x02 => "Validation",
            0x03 => "Codegen",
            0x04 => "Build",
            0x05 => "Load",
            0x06 => "Storage",
            0x07 => "Catalog",
            _ => "Unknown",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_code_categories() {
        assert_eq!(ErrorCode::Io.category(), "I/O");
        assert_eq!(ErrorCode::ColumnNotFound.category(), "Validation");
        assert_eq!(ErrorCode::CodegenFailed.category(), "Codegen");
        assert_eq!(ErrorCode::CompilerFailed.category(), "Build");
        assert_eq!(ErrorCode::SymbolNotFound.category(), "Load");
        assert_eq!(ErrorCode::PageCorrupted.category(), "Storage");
        assert_eq!(ErrorCode::TableExists.category(), "Catalog");
    }

    #[test]
    fn test_error_code_values() {
        assert_eq!(ErrorCode::Unknown.as_u16(), 0);
        assert_eq!(ErrorCode::CompilerFailed.as_u16(), 0x0400);
        assert_eq!(ErrorCode::TypeMismatch.to_string(), "TypeMismatch");
    }
}

//! Parse errors for the textual forms of the shared enums.

use thiserror::Error;

/// Errors raised when parsing configuration or API input into core types.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    /// Severity name not recognised.
    #[error("unknown severity: {0}")]
    UnknownSeverity(String),

    /// Comparison name not recognised.
    #[error("unknown comparison: {0}")]
    UnknownComparison(String),

    /// Identifier was empty.
    #[error("identifier must not be empty")]
    EmptyIdentifier,
}

/// Result type for parsing operations.
pub type ParseResult<T> = Result<T, ParseError>;

//! Query Error Types
//!
//! One error enum spanning the whole query pipeline, from parsing
//! through plan teardown. Validation-class errors are raised before
//! execution begins; runtime-class errors abort the running plan.

use thiserror::Error;

/// Errors surfaced by the query pipeline
#[derive(Error, Debug, Clone, PartialEq)]
pub enum QueryError {
    /// Lexer / parser failure, with a byte offset into the query text
    #[error("Parse error at offset {position}: {message}")]
    Parse { message: String, position: usize },

    /// Semantic error caught before planning (unknown function,
    /// undefined alias, aggregate misuse, malformed range, ...)
    #[error("Validation error: {0}")]
    Validation(String),

    /// Runtime type mismatch with no applicable coercion
    #[error("Type error: {0}")]
    Type(String),

    /// Schema constraint violation (index exists / missing, ...)
    #[error("Constraint error: {0}")]
    Constraint(String),

    /// Allocation or matrix resize failure
    #[error("Resource error: {0}")]
    Resource(String),

    /// Query was cancelled or exceeded its timeout
    #[error("Query cancelled after {elapsed_ms}ms")]
    Cancelled { elapsed_ms: u64 },

    /// Invariant violation; never user-caused
    #[error("Internal error: {0}")]
    Internal(String),
}

impl QueryError {
    /// Shorthand for parse errors
    pub fn parse(message: impl Into<String>, position: usize) -> Self {
        QueryError::Parse {
            message: message.into(),
            position,
        }
    }

    /// Shorthand for validation errors
    pub fn validation(message: impl Into<String>) -> Self {
        QueryError::Validation(message.into())
    }

    /// Shorthand for runtime type errors
    pub fn type_error(message: impl Into<String>) -> Self {
        QueryError::Type(message.into())
    }

    /// True for errors raised before any operator ran
    pub fn is_compile_time(&self) -> bool {
        matches!(self, QueryError::Parse { .. } | QueryError::Validation(_))
    }
}

/// Result type for query pipeline operations
pub type QueryResult<T> = Result<T, QueryError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_error_display() {
        let err = QueryError::parse("unexpected token ')'", 17);
        assert_eq!(err.to_string(), "Parse error at offset 17: unexpected token ')'");
    }

    #[test]
    fn test_compile_time_classification() {
        assert!(QueryError::parse("x", 0).is_compile_time());
        assert!(QueryError::validation("unknown function foo").is_compile_time());
        assert!(!QueryError::type_error("cannot add STRING to INT").is_compile_time());
        assert!(!QueryError::Cancelled { elapsed_ms: 10 }.is_compile_time());
    }
}

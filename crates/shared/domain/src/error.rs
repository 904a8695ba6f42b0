//! Domain-level errors.
//!
//! These errors represent business rule violations and malformed identifiers.
//! They are independent of infrastructure concerns (database, cache).

use thiserror::Error;

/// Domain-specific errors for business rule violations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// Validation failed for a field or input
    #[error("Validation error: {0}")]
    Validation(String),

    /// A document identifier did not parse
    #[error("Invalid identifier: {0}")]
    InvalidIdentifier(String),

    /// Entity not found
    #[error("Not found: {0}")]
    NotFound(String),
}

impl DomainError {
    /// Create a validation error
    pub fn validation(msg: impl Into<String>) -> Self {
        DomainError::Validation(msg.into())
    }

    /// Create an invalid identifier error
    pub fn invalid_identifier(raw: impl Into<String>) -> Self {
        DomainError::InvalidIdentifier(raw.into())
    }

    /// Create a not found error
    pub fn not_found(entity: impl Into<String>) -> Self {
        DomainError::NotFound(entity.into())
    }
}

/// Result type alias for domain operations
pub type DomainResult<T> = Result<T, DomainError>;

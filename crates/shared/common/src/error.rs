//! Unified error handling for the persistence layer.
//!
//! Every repository call resolves to one [`AppError`] variant. Cache faults
//! exist in the taxonomy so adapters can report them, but the repository logs
//! and swallows them instead of returning them.

use domain::DomainError;
use thiserror::Error;

/// Application error types.
#[derive(Error, Debug)]
pub enum AppError {
    // Lookup
    #[error("Resource not found")]
    NotFound,

    #[error("Invalid identifier: {0}")]
    BadIdentifier(String),

    // Pagination and input
    #[error("Invalid cursor: {0}")]
    InvalidCursor(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("{0}")]
    Validation(String),

    // Document store
    #[error("Store read failed: {0}")]
    StoreReadFailed(String),

    #[error("Store write failed: {0}")]
    StoreWriteFailed(String),

    // Cache (never surfaced by the repository)
    #[error("Cache error: {0}")]
    Cache(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    // Deadlines
    #[error("Operation timed out: {0}")]
    Timeout(&'static str),

    #[error("Operation cancelled")]
    Cancelled,

    // Internal
    #[error("Internal error")]
    Internal(String),
}

impl AppError {
    /// Stable machine-readable error code
    pub fn code(&self) -> &'static str {
        match self {
            AppError::NotFound => "NOT_FOUND",
            AppError::BadIdentifier(_) => "BAD_IDENTIFIER",
            AppError::InvalidCursor(_) => "INVALID_CURSOR",
            AppError::InvalidArgument(_) => "INVALID_ARGUMENT",
            AppError::Validation(_) => "VALIDATION_ERROR",
            AppError::StoreReadFailed(_) => "STORE_READ_FAILED",
            AppError::StoreWriteFailed(_) => "STORE_WRITE_FAILED",
            AppError::Cache(_) => "CACHE_ERROR",
            AppError::Serialization(_) => "SERIALIZATION_ERROR",
            AppError::Timeout(_) => "TIMEOUT",
            AppError::Cancelled => "CANCELLED",
            AppError::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// Whether the caller supplied bad input (as opposed to an infrastructure fault)
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            AppError::NotFound
                | AppError::BadIdentifier(_)
                | AppError::InvalidCursor(_)
                | AppError::InvalidArgument(_)
                | AppError::Validation(_)
        )
    }

    /// Get user-facing message (hides internal details)
    pub fn user_message(&self) -> String {
        match self {
            // Show full message for client errors
            AppError::Validation(msg) => msg.clone(),
            AppError::BadIdentifier(_)
            | AppError::InvalidCursor(_)
            | AppError::InvalidArgument(_) => self.to_string(),

            // Hide details for infrastructure errors
            AppError::StoreReadFailed(e) | AppError::StoreWriteFailed(e) => {
                tracing::error!("Store error: {}", e);
                "A database error occurred".to_string()
            }
            AppError::Cache(e) => {
                tracing::error!("Cache error: {}", e);
                "A cache error occurred".to_string()
            }
            AppError::Serialization(e) | AppError::Internal(e) => {
                tracing::error!("Internal error: {}", e);
                "An internal error occurred".to_string()
            }

            // Use default message for others
            _ => self.to_string(),
        }
    }
}

// =============================================================================
// Conversions
// =============================================================================

impl From<DomainError> for AppError {
    fn from(err: DomainError) -> Self {
        match err {
            DomainError::Validation(msg) => AppError::Validation(msg),
            DomainError::InvalidIdentifier(raw) => AppError::BadIdentifier(raw),
            DomainError::NotFound(_) => AppError::NotFound,
        }
    }
}

impl From<validator::ValidationErrors> for AppError {
    fn from(errors: validator::ValidationErrors) -> Self {
        let mut fields: Vec<String> = errors
            .field_errors()
            .into_iter()
            .map(|(field, errs)| {
                let reason = errs
                    .first()
                    .and_then(|e| e.message.as_ref())
                    .map(|m| m.to_string())
                    .unwrap_or_else(|| "is invalid".to_string());
                format!("{} {}", field, reason)
            })
            .collect();
        fields.sort();
        AppError::Validation(fields.join(", "))
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::Serialization(err.to_string())
    }
}

/// Result type alias
pub type AppResult<T> = Result<T, AppError>;

/// Extension trait for Option -> AppError conversion
pub trait OptionExt<T> {
    fn ok_or_not_found(self) -> AppResult<T>;
}

impl<T> OptionExt<T> for Option<T> {
    fn ok_or_not_found(self) -> AppResult<T> {
        self.ok_or(AppError::NotFound)
    }
}

/// Extension trait turning a `NotFound` error back into `Ok(None)`.
pub trait NotFoundExt<T> {
    fn optional(self) -> AppResult<Option<T>>;
}

impl<T> NotFoundExt<T> for AppResult<T> {
    fn optional(self) -> AppResult<Option<T>> {
        match self {
            Ok(value) => Ok(Some(value)),
            Err(AppError::NotFound) => Ok(None),
            Err(e) => Err(e),
        }
    }
}

/// Convenience constructors
impl AppError {
    pub fn validation(msg: impl Into<String>) -> Self {
        AppError::Validation(msg.into())
    }

    pub fn invalid_argument(msg: impl Into<String>) -> Self {
        AppError::InvalidArgument(msg.into())
    }

    pub fn invalid_cursor(msg: impl Into<String>) -> Self {
        AppError::InvalidCursor(msg.into())
    }

    pub fn store_read(msg: impl ToString) -> Self {
        AppError::StoreReadFailed(msg.to_string())
    }

    pub fn store_write(msg: impl ToString) -> Self {
        AppError::StoreWriteFailed(msg.to_string())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        AppError::Internal(msg.into())
    }
}

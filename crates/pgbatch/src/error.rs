//! Error types for pgbatch
//!
//! ## Error classification
//!
//! `BatchError` covers the runtime failures of a batch:
//!
//! **Recoverable** — the caller should match on these and handle them:
//! [`NotFound`](BatchError::NotFound) (delivered through a query's error
//! slot, never as the batch result).
//!
//! **Driver / decode errors** — typically propagated with `?`:
//! [`Driver`](BatchError::Driver), [`Decode`](BatchError::Decode),
//! [`Multi`](BatchError::Multi).
//!
//! Misuse of the API — mixing reads and writes in one batch, leaving a
//! query builder uncommitted, updating a record without primary keys,
//! mismatched `?` placeholders — is a programming error and panics instead
//! of returning a variant.

use thiserror::Error;

/// Result type alias for pgbatch operations
pub type BatchResult<T> = Result<T, BatchError>;

/// Error types for batch execution.
#[derive(Debug, Error)]
pub enum BatchError {
    /// A single-record read matched no rows.
    ///
    /// Set into the query's error slot (see `QueryBuilder::with_err`); the
    /// batch itself still succeeds.
    #[error("not found")]
    NotFound,

    /// Error from the underlying driver, propagated unchanged.
    #[error("driver error: {0}")]
    Driver(#[from] tokio_postgres::Error),

    /// Row decode error while scanning a column into a record field.
    #[error("decode error on column '{column}': {message}")]
    Decode { column: String, message: String },

    /// Aggregate of the errors from a parallel read batch.
    #[error(transparent)]
    Multi(#[from] MultiError),
}

impl BatchError {
    /// Create a decode error for a specific column
    pub fn decode(column: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Decode {
            column: column.into(),
            message: message.into(),
        }
    }

    /// Check if this is a not found error
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound)
    }
}

/// The non-empty set of errors produced by the parallel branches of a read
/// batch, in branch order.
#[derive(Debug)]
pub struct MultiError {
    pub errors: Vec<BatchError>,
}

impl std::fmt::Display for MultiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for (i, e) in self.errors.iter().enumerate() {
            if i != 0 {
                f.write_str("\n")?;
            }
            write!(f, "{e}")?;
        }
        Ok(())
    }
}

impl std::error::Error for MultiError {}

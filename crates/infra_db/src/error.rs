//! Database error types

use core_kernel::PortError;
use thiserror::Error;

/// Errors raised by the database layer
#[derive(Debug, Error)]
pub enum DatabaseError {
    /// Could not establish a connection pool
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// Migrations could not be applied
    #[error("Migration failed: {0}")]
    MigrationFailed(String),

    /// A query failed
    #[error("Query failed: {0}")]
    Query(#[from] sqlx::Error),

    /// A stored row could not be mapped back into a domain value
    #[error("Corrupted row: {0}")]
    CorruptedRow(String),
}

impl From<DatabaseError> for PortError {
    fn from(err: DatabaseError) -> Self {
        PortError::internal_with_source("database failure", err)
    }
}

/// Maps a query error to the port taxonomy without leaking SQL detail
pub(crate) fn query_error(err: sqlx::Error) -> PortError {
    PortError::internal_with_source("database query failed", err)
}

/// Maps a row-decoding problem to the port taxonomy
pub(crate) fn corrupted(message: impl Into<String>) -> PortError {
    PortError::internal(format!("corrupted row: {}", message.into()))
}

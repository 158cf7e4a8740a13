//! Database Error Types
//!
//! This module defines error types for storage operations, providing
//! clear error handling for connection, initialization, query and
//! transaction failures.

use std::path::PathBuf;
use thiserror::Error;

/// Storage operation errors
///
/// Covers every failure a storage adapter can report. The service layer wraps
/// these into `TreeError::StorageFailure`.
#[derive(Error, Debug)]
pub enum DatabaseError {
    /// Failed to establish database connection
    #[cfg(feature = "libsql")]
    #[error("Failed to connect to database at {path}: {source}")]
    ConnectionFailed {
        path: PathBuf,
        source: libsql::Error,
    },

    /// Failed to initialize database schema
    #[error("Failed to initialize database schema: {0}")]
    InitializationFailed(String),

    /// Permission denied when accessing database
    #[error("Permission denied for database path: {path}")]
    PermissionDenied { path: PathBuf },

    /// Failed to create parent directory
    #[error("Failed to create parent directory for database: {0}")]
    DirectoryCreationFailed(#[from] std::io::Error),

    /// libsql operation error
    #[cfg(feature = "libsql")]
    #[error("Database operation failed: {0}")]
    LibsqlError(#[from] libsql::Error),

    /// SQL execution error with context
    #[error("SQL execution failed: {context}")]
    SqlExecutionError { context: String },

    /// Transaction could not be started, committed or rolled back
    #[error("Transaction failed: {context}")]
    TransactionFailed { context: String },

    /// Row targeted by an update does not exist
    #[error("Row not found: {id}")]
    RowNotFound { id: String },

    /// Row with the same id already exists
    #[error("Duplicate row: {id}")]
    DuplicateRow { id: String },

    /// Stored row could not be decoded into a node
    #[error("Corrupt row '{id}': {reason}")]
    CorruptRow { id: String, reason: String },
}

impl DatabaseError {
    /// Create a connection failed error
    #[cfg(feature = "libsql")]
    pub fn connection_failed(path: PathBuf, source: libsql::Error) -> Self {
        Self::ConnectionFailed { path, source }
    }

    /// Create an initialization failed error
    pub fn initialization_failed(msg: impl Into<String>) -> Self {
        Self::InitializationFailed(msg.into())
    }

    /// Create a permission denied error
    pub fn permission_denied(path: PathBuf) -> Self {
        Self::PermissionDenied { path }
    }

    /// Create a SQL execution error with context
    pub fn sql_execution(context: impl Into<String>) -> Self {
        Self::SqlExecutionError {
            context: context.into(),
        }
    }

    /// Create a transaction failed error
    pub fn transaction_failed(context: impl Into<String>) -> Self {
        Self::TransactionFailed {
            context: context.into(),
        }
    }

    pub fn row_not_found(id: impl Into<String>) -> Self {
        Self::RowNotFound { id: id.into() }
    }

    pub fn duplicate_row(id: impl Into<String>) -> Self {
        Self::DuplicateRow { id: id.into() }
    }

    pub fn corrupt_row(id: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::CorruptRow {
            id: id.into(),
            reason: reason.into(),
        }
    }
}

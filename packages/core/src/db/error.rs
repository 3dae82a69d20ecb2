//! Database Error Types
//!
//! This module defines error types for database operations, providing
//! clear error handling for connection, initialization, and query failures.

use std::path::PathBuf;
use thiserror::Error;

/// Database operation errors
///
/// Covers connection, schema initialization and chapter persistence
/// failures, including the optimistic revision check on batches.
#[derive(Error, Debug)]
pub enum DatabaseError {
    /// Failed to establish database connection
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
    #[error("Database operation failed: {0}")]
    LibsqlError(#[from] libsql::Error),

    /// SQL execution error with context
    #[error("SQL execution failed: {context}")]
    SqlExecutionError { context: String },

    /// Stored row could not be decoded
    #[error("Invalid stored data: {0}")]
    InvalidData(String),

    /// Book does not exist
    #[error("Book not found: {id}")]
    BookNotFound { id: String },

    /// Chapter does not exist
    #[error("Chapter not found: {id}")]
    ChapterNotFound { id: String },

    /// Batch was computed against an outdated hierarchy
    #[error("Revision conflict for book {book_id}: expected revision {expected}, found {actual}")]
    RevisionConflict {
        book_id: String,
        expected: i64,
        actual: i64,
    },
}

impl DatabaseError {
    /// Create a connection failed error
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

    pub fn invalid_data(msg: impl Into<String>) -> Self {
        Self::InvalidData(msg.into())
    }

    pub fn book_not_found(id: impl Into<String>) -> Self {
        Self::BookNotFound { id: id.into() }
    }

    pub fn chapter_not_found(id: impl Into<String>) -> Self {
        Self::ChapterNotFound { id: id.into() }
    }

    pub fn revision_conflict(book_id: impl Into<String>, expected: i64, actual: i64) -> Self {
        Self::RevisionConflict {
            book_id: book_id.into(),
            expected,
            actual,
        }
    }

    /// True for the optimistic-concurrency failure, which a caller may
    /// resolve by reloading and recomputing
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::RevisionConflict { .. })
    }
}

//! Service Layer Error Types
//!
//! The UI reacts differently to each family of failure:
//!
//! - `Rejected` - the engine refused the edit; show the message and revert
//! - `CommitFailed` / `RevisionConflict` - persistence failed; retry
//! - everything else - bad request or missing data

use crate::db::DatabaseError;
use crate::export::ExportError;
use crate::hierarchy::HierarchyError;
use thiserror::Error;

/// Service operation errors
#[derive(Error, Debug)]
pub enum ChapterServiceError {
    /// The candidate hierarchy failed validation; nothing was committed
    #[error("Edit rejected: {0}")]
    Rejected(#[from] HierarchyError),

    /// The store refused or aborted the write; previous state is intact
    #[error("Commit failed while {context}: {source}")]
    CommitFailed {
        context: String,
        #[source]
        source: DatabaseError,
    },

    /// Another edit committed between load and commit
    #[error("Revision conflict for book {book_id}: expected revision {expected}, found {actual}")]
    RevisionConflict {
        book_id: String,
        expected: i64,
        actual: i64,
    },

    /// Book not found by ID
    #[error("Book not found: {id}")]
    BookNotFound { id: String },

    /// Chapter not found by ID
    #[error("Chapter not found: {id}")]
    ChapterNotFound { id: String },

    /// The current user does not own the book
    #[error("User {user_id} may not access book {book_id}")]
    AccessDenied { user_id: String, book_id: String },

    /// Malformed request
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Read-side database failure
    #[error("Database operation failed: {0}")]
    DatabaseError(DatabaseError),

    /// Export or conversion failed
    #[error("Export failed: {0}")]
    Export(#[from] ExportError),
}

impl ChapterServiceError {
    pub fn book_not_found(id: impl Into<String>) -> Self {
        Self::BookNotFound { id: id.into() }
    }

    pub fn chapter_not_found(id: impl Into<String>) -> Self {
        Self::ChapterNotFound { id: id.into() }
    }

    pub fn access_denied(user_id: impl Into<String>, book_id: impl Into<String>) -> Self {
        Self::AccessDenied {
            user_id: user_id.into(),
            book_id: book_id.into(),
        }
    }

    pub fn invalid_input(msg: impl Into<String>) -> Self {
        Self::InvalidInput(msg.into())
    }

    /// Classify a failed write. Conflicts and missing rows keep their own
    /// variants; anything else becomes `CommitFailed`.
    pub fn commit_failed(context: impl Into<String>, source: DatabaseError) -> Self {
        match source {
            DatabaseError::RevisionConflict {
                book_id,
                expected,
                actual,
            } => Self::RevisionConflict {
                book_id,
                expected,
                actual,
            },
            DatabaseError::BookNotFound { id } => Self::BookNotFound { id },
            DatabaseError::ChapterNotFound { id } => Self::ChapterNotFound { id },
            source => Self::CommitFailed {
                context: context.into(),
                source,
            },
        }
    }

    /// True when the engine refused the edit; the UI should revert
    pub fn is_rejection(&self) -> bool {
        matches!(self, Self::Rejected(_))
    }

    /// True when repeating the operation may succeed
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::CommitFailed { .. } | Self::RevisionConflict { .. }
        )
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::RevisionConflict { .. })
    }
}

impl From<DatabaseError> for ChapterServiceError {
    fn from(err: DatabaseError) -> Self {
        match err {
            DatabaseError::BookNotFound { id } => Self::BookNotFound { id },
            DatabaseError::ChapterNotFound { id } => Self::ChapterNotFound { id },
            other => Self::DatabaseError(other),
        }
    }
}

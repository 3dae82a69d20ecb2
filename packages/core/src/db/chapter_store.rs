//! ChapterStore Trait - Persistence Abstraction
//!
//! The hierarchy engine never touches storage. `ChapterService` loads a
//! book's complete chapter collection through this trait, computes and
//! validates a candidate in memory, then hands the resulting position
//! changes back as one atomic [`ChapterBatch`].
//!
//! # Concurrency
//!
//! Each book carries a `revision`. A batch names the revision it was
//! computed against; the store refuses it with
//! [`DatabaseError::RevisionConflict`] if another batch committed in
//! between, so two racing reorders can never interleave into a
//! non-contiguous sibling group.
//!
//! # Implementations
//!
//! - [`LibsqlChapterStore`](super::LibsqlChapterStore) - libsql/SQLite file database
//! - [`MemoryChapterStore`](super::MemoryChapterStore) - in-process, for tests and tooling

use crate::db::DatabaseError;
use crate::models::{Book, Chapter, ChapterContentUpdate, ChapterPosition};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Atomic unit of structural change for one book
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChapterBatch {
    pub book_id: String,
    /// Revision the batch was computed against
    pub expected_revision: i64,
    /// New positions; chapters not listed keep theirs
    #[serde(default)]
    pub updates: Vec<ChapterPosition>,
    /// Chapters to delete
    #[serde(default)]
    pub deletes: Vec<String>,
}

impl ChapterBatch {
    pub fn new(book_id: impl Into<String>, expected_revision: i64) -> Self {
        Self {
            book_id: book_id.into(),
            expected_revision,
            updates: Vec::new(),
            deletes: Vec::new(),
        }
    }

    pub fn with_updates(mut self, updates: Vec<ChapterPosition>) -> Self {
        self.updates = updates;
        self
    }

    pub fn with_deletes(mut self, deletes: Vec<String>) -> Self {
        self.deletes = deletes;
        self
    }

    pub fn is_empty(&self) -> bool {
        self.updates.is_empty() && self.deletes.is_empty()
    }
}

/// Chapters of one book plus the revision they were read at
#[derive(Debug, Clone)]
pub struct BookSnapshot {
    pub book: Book,
    pub chapters: Vec<Chapter>,
}

impl BookSnapshot {
    pub fn revision(&self) -> i64 {
        self.book.revision
    }
}

/// Persistence operations required by the chapter hierarchy
///
/// Implementations must be `Send + Sync`; all methods are async so that
/// embedded and networked backends share one interface.
#[async_trait]
pub trait ChapterStore: Send + Sync {
    //
    // BOOKS
    //

    /// Insert a new book
    async fn create_book(&self, book: Book) -> Result<Book, DatabaseError>;

    /// Get a book by id (`Ok(None)` if absent)
    async fn get_book(&self, id: &str) -> Result<Option<Book>, DatabaseError>;

    /// All books owned by `owner_id`, oldest first
    async fn list_books(&self, owner_id: &str) -> Result<Vec<Book>, DatabaseError>;

    //
    // CHAPTERS
    //

    /// The book and its complete, unfiltered chapter collection, read
    /// consistently
    async fn load_all(&self, book_id: &str) -> Result<BookSnapshot, DatabaseError>;

    /// Get a single chapter by id
    async fn get_chapter(&self, id: &str) -> Result<Option<Chapter>, DatabaseError>;

    /// Insert a chapter whose position was computed against
    /// `expected_revision`; bumps the book revision.
    async fn insert_chapter(
        &self,
        chapter: Chapter,
        expected_revision: i64,
    ) -> Result<Chapter, DatabaseError>;

    /// Update title/content; positions are untouched and the revision is
    /// not bumped.
    async fn update_chapter_content(
        &self,
        id: &str,
        update: ChapterContentUpdate,
    ) -> Result<Chapter, DatabaseError>;

    /// Apply a batch atomically: either every update and delete lands and
    /// the revision increments, or nothing changes. Returns the new
    /// revision.
    async fn commit_batch(&self, batch: ChapterBatch) -> Result<i64, DatabaseError>;
}

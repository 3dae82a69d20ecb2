//! In-process [`ChapterStore`]
//!
//! Same revision and atomicity rules as the libsql store; a batch is fully
//! checked before any chapter is touched. Used by tests and dry-run tooling.

use crate::db::{BookSnapshot, ChapterBatch, ChapterStore, DatabaseError};
use crate::models::{Book, Chapter, ChapterContentUpdate};
use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use tokio::sync::RwLock;

#[derive(Debug, Default)]
struct MemoryState {
    books: HashMap<String, Book>,
    chapters: HashMap<String, Chapter>,
}

/// ChapterStore held entirely in memory
#[derive(Debug, Default)]
pub struct MemoryChapterStore {
    state: RwLock<MemoryState>,
}

impl MemoryChapterStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Total number of chapters across all books
    pub async fn chapter_count(&self) -> usize {
        self.state.read().await.chapters.len()
    }
}

impl MemoryState {
    fn check_revision(&self, book_id: &str, expected: i64) -> Result<(), DatabaseError> {
        let book = self
            .books
            .get(book_id)
            .ok_or_else(|| DatabaseError::book_not_found(book_id))?;
        if book.revision != expected {
            return Err(DatabaseError::revision_conflict(
                book_id,
                expected,
                book.revision,
            ));
        }
        Ok(())
    }

    fn owns_chapter(&self, book_id: &str, id: &str) -> bool {
        self.chapters
            .get(id)
            .map(|c| c.book_id == book_id)
            .unwrap_or(false)
    }

    fn bump(&mut self, book_id: &str) -> i64 {
        match self.books.get_mut(book_id) {
            Some(book) => {
                book.revision += 1;
                book.modified_at = Utc::now();
                book.revision
            }
            None => 0,
        }
    }
}

#[async_trait]
impl ChapterStore for MemoryChapterStore {
    async fn create_book(&self, book: Book) -> Result<Book, DatabaseError> {
        let mut state = self.state.write().await;
        if state.books.contains_key(&book.id) {
            return Err(DatabaseError::sql_execution(format!(
                "Book '{}' already exists",
                book.id
            )));
        }
        state.books.insert(book.id.clone(), book.clone());
        Ok(book)
    }

    async fn get_book(&self, id: &str) -> Result<Option<Book>, DatabaseError> {
        Ok(self.state.read().await.books.get(id).cloned())
    }

    async fn list_books(&self, owner_id: &str) -> Result<Vec<Book>, DatabaseError> {
        let state = self.state.read().await;
        let mut books: Vec<Book> = state
            .books
            .values()
            .filter(|b| b.owner_id == owner_id)
            .cloned()
            .collect();
        books.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        Ok(books)
    }

    async fn load_all(&self, book_id: &str) -> Result<BookSnapshot, DatabaseError> {
        let state = self.state.read().await;
        let book = state
            .books
            .get(book_id)
            .cloned()
            .ok_or_else(|| DatabaseError::book_not_found(book_id))?;

        let mut chapters: Vec<Chapter> = state
            .chapters
            .values()
            .filter(|c| c.book_id == book_id)
            .cloned()
            .collect();
        chapters.sort_by(|a, b| {
            a.parent_id
                .cmp(&b.parent_id)
                .then(a.order.cmp(&b.order))
                .then(a.id.cmp(&b.id))
        });

        Ok(BookSnapshot { book, chapters })
    }

    async fn get_chapter(&self, id: &str) -> Result<Option<Chapter>, DatabaseError> {
        Ok(self.state.read().await.chapters.get(id).cloned())
    }

    async fn insert_chapter(
        &self,
        chapter: Chapter,
        expected_revision: i64,
    ) -> Result<Chapter, DatabaseError> {
        let mut state = self.state.write().await;
        state.check_revision(&chapter.book_id, expected_revision)?;
        if state.chapters.contains_key(&chapter.id) {
            return Err(DatabaseError::sql_execution(format!(
                "Chapter '{}' already exists",
                chapter.id
            )));
        }

        state.chapters.insert(chapter.id.clone(), chapter.clone());
        state.bump(&chapter.book_id);
        Ok(chapter)
    }

    async fn update_chapter_content(
        &self,
        id: &str,
        update: ChapterContentUpdate,
    ) -> Result<Chapter, DatabaseError> {
        let mut state = self.state.write().await;
        let chapter = state
            .chapters
            .get_mut(id)
            .ok_or_else(|| DatabaseError::chapter_not_found(id))?;

        if let Some(title) = update.title {
            chapter.title = title;
        }
        if let Some(content) = update.content {
            chapter.content = content;
        }
        chapter.modified_at = Utc::now();
        Ok(chapter.clone())
    }

    async fn commit_batch(&self, batch: ChapterBatch) -> Result<i64, DatabaseError> {
        let mut state = self.state.write().await;
        state.check_revision(&batch.book_id, batch.expected_revision)?;

        // Validate everything first so a bad id leaves the book untouched
        if let Some(missing) = batch
            .deletes
            .iter()
            .chain(batch.updates.iter().map(|p| &p.id))
            .find(|id| !state.owns_chapter(&batch.book_id, id))
        {
            return Err(DatabaseError::chapter_not_found(missing.clone()));
        }
        if let Some(position) = batch.updates.iter().find(|p| batch.deletes.contains(&p.id)) {
            return Err(DatabaseError::chapter_not_found(position.id.clone()));
        }

        let now = Utc::now();
        for id in &batch.deletes {
            state.chapters.remove(id);
        }
        for position in &batch.updates {
            if let Some(chapter) = state.chapters.get_mut(&position.id) {
                chapter.parent_id = position.parent_id.clone();
                chapter.order = position.order;
                chapter.level = position.level;
                chapter.modified_at = now;
            }
        }

        let revision = state.bump(&batch.book_id);
        tracing::debug!(
            "Committed in-memory batch for book '{}' at revision {}",
            batch.book_id,
            revision
        );
        Ok(revision)
    }
}

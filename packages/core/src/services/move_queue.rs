//! Move queue with retry logic for optimistic concurrency control
//!
//! Two clients reordering the same book race on the book revision: one
//! batch commits, the other is refused with a revision conflict. This
//! queue retries the loser with exponential backoff. Every attempt goes
//! back through [`ChapterService`], which reloads the collection and
//! recomputes the move against fresh state.
//!
//! # Example
//!
//! ```rust,no_run
//! use folio_core::db::MemoryChapterStore;
//! use folio_core::models::CurrentUser;
//! use folio_core::services::{ChapterService, MoveQueue, MoveRequest};
//! use std::sync::Arc;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let service = Arc::new(ChapterService::new(Arc::new(MemoryChapterStore::new())));
//! let queue = MoveQueue::new(service);
//! let user = CurrentUser::new("alice");
//!
//! // Up to 3 retries (10ms, 20ms, 40ms)
//! queue
//!     .move_with_retry(&user, "book-1", &MoveRequest::new("ch-2", None, 0))
//!     .await?;
//! # Ok(())
//! # }
//! ```

use crate::models::{Chapter, ChapterPosition, CurrentUser};
use crate::services::{ChapterService, ChapterServiceError, MoveRequest};
use std::future::Future;
use std::sync::Arc;
use tokio::time::Duration;

pub const DEFAULT_MAX_RETRIES: usize = 3;

/// Retries structural edits that lost a revision race
pub struct MoveQueue {
    service: Arc<ChapterService>,
    max_retries: usize,
}

impl MoveQueue {
    pub fn new(service: Arc<ChapterService>) -> Self {
        Self {
            service,
            max_retries: DEFAULT_MAX_RETRIES,
        }
    }

    /// Maximum number of retries after the first attempt (0 = no retries)
    pub fn with_max_retries(mut self, max_retries: usize) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn service(&self) -> &Arc<ChapterService> {
        &self.service
    }

    /// [`ChapterService::move_chapter`] with retry on revision conflict
    ///
    /// - **Retry on**: `ChapterServiceError::RevisionConflict` only
    /// - **Backoff**: 10ms, 20ms, 40ms, 80ms, ...
    /// - **Other errors**: returned immediately; a rejected move is never
    ///   retried
    pub async fn move_with_retry(
        &self,
        user: &CurrentUser,
        book_id: &str,
        request: &MoveRequest,
    ) -> Result<Vec<Chapter>, ChapterServiceError> {
        self.run(&request.moved_id, move || {
            self.service.move_chapter(user, book_id, request)
        })
        .await
    }

    /// [`ChapterService::apply_order_updates`] with retry on revision conflict
    pub async fn apply_with_retry(
        &self,
        user: &CurrentUser,
        book_id: &str,
        positions: &[ChapterPosition],
    ) -> Result<Vec<Chapter>, ChapterServiceError> {
        self.run(book_id, move || {
            self.service.apply_order_updates(user, book_id, positions)
        })
        .await
    }

    async fn run<F, Fut, T>(&self, label: &str, mut attempt_fn: F) -> Result<T, ChapterServiceError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, ChapterServiceError>>,
    {
        let mut attempt = 0;

        loop {
            match attempt_fn().await {
                Ok(value) => {
                    if attempt > 0 {
                        tracing::debug!(
                            "Edit of '{}' succeeded after {} retry(ies)",
                            label,
                            attempt
                        );
                    }
                    return Ok(value);
                }

                Err(ChapterServiceError::RevisionConflict {
                    ref book_id,
                    expected,
                    actual,
                }) if attempt < self.max_retries => {
                    tracing::debug!(
                        "Revision conflict on attempt {}/{} for book '{}': expected r{}, got r{}. Retrying...",
                        attempt + 1,
                        self.max_retries + 1,
                        book_id,
                        expected,
                        actual
                    );

                    let backoff_ms = 10u64 * (1 << attempt);
                    tokio::time::sleep(Duration::from_millis(backoff_ms)).await;

                    attempt += 1;
                }

                Err(e) => {
                    if e.is_conflict() {
                        tracing::warn!(
                            "Max retries ({}) exceeded for edit of '{}'",
                            self.max_retries,
                            label
                        );
                    }
                    return Err(e);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{BookSnapshot, ChapterBatch, ChapterStore, DatabaseError, MemoryChapterStore};
    use crate::models::{Book, ChapterContentUpdate, CreateChapterParams};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Store that refuses the first `conflicts` batches, as if another
    /// client had committed just before each of them
    struct RacingStore {
        inner: MemoryChapterStore,
        conflicts: AtomicUsize,
        commits_attempted: AtomicUsize,
    }

    impl RacingStore {
        fn new(conflicts: usize) -> Self {
            Self {
                inner: MemoryChapterStore::new(),
                conflicts: AtomicUsize::new(conflicts),
                commits_attempted: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl ChapterStore for RacingStore {
        async fn create_book(&self, book: Book) -> Result<Book, DatabaseError> {
            self.inner.create_book(book).await
        }

        async fn get_book(&self, id: &str) -> Result<Option<Book>, DatabaseError> {
            self.inner.get_book(id).await
        }

        async fn list_books(&self, owner_id: &str) -> Result<Vec<Book>, DatabaseError> {
            self.inner.list_books(owner_id).await
        }

        async fn load_all(&self, book_id: &str) -> Result<BookSnapshot, DatabaseError> {
            self.inner.load_all(book_id).await
        }

        async fn get_chapter(&self, id: &str) -> Result<Option<Chapter>, DatabaseError> {
            self.inner.get_chapter(id).await
        }

        async fn insert_chapter(
            &self,
            chapter: Chapter,
            expected_revision: i64,
        ) -> Result<Chapter, DatabaseError> {
            self.inner.insert_chapter(chapter, expected_revision).await
        }

        async fn update_chapter_content(
            &self,
            id: &str,
            update: ChapterContentUpdate,
        ) -> Result<Chapter, DatabaseError> {
            self.inner.update_chapter_content(id, update).await
        }

        async fn commit_batch(&self, batch: ChapterBatch) -> Result<i64, DatabaseError> {
            self.commits_attempted.fetch_add(1, Ordering::SeqCst);
            let remaining = self.conflicts.load(Ordering::SeqCst);
            if remaining > 0 {
                self.conflicts.store(remaining - 1, Ordering::SeqCst);
                return Err(DatabaseError::revision_conflict(
                    batch.book_id,
                    batch.expected_revision,
                    batch.expected_revision + 1,
                ));
            }
            self.inner.commit_batch(batch).await
        }
    }

    async fn setup(conflicts: usize) -> (MoveQueue, Arc<RacingStore>, CurrentUser, String) {
        let store = Arc::new(RacingStore::new(conflicts));
        let service = Arc::new(ChapterService::new(store.clone()));
        let user = CurrentUser::new("alice");
        let book = service.create_book(&user, "Race", None).await.unwrap();
        for id in ["a", "b", "c"] {
            service
                .create_chapter(
                    &user,
                    &book.id,
                    CreateChapterParams {
                        id: Some(id.to_string()),
                        title: id.to_string(),
                        ..Default::default()
                    },
                )
                .await
                .unwrap();
        }
        (MoveQueue::new(service), store, user, book.id)
    }

    #[tokio::test]
    async fn test_move_succeeds_after_conflicts() {
        let (queue, store, user, book_id) = setup(2).await;

        let chapters = queue
            .move_with_retry(&user, &book_id, &MoveRequest::new("c", None, 0))
            .await
            .unwrap();

        let ids: Vec<_> = chapters.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(ids, vec!["c", "a", "b"]);
        assert_eq!(store.commits_attempted.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_gives_up_after_max_retries() {
        let (queue, store, user, book_id) = setup(10).await;
        let queue = queue.with_max_retries(1);

        let err = queue
            .move_with_retry(&user, &book_id, &MoveRequest::new("c", None, 0))
            .await
            .unwrap_err();

        assert!(err.is_conflict());
        assert_eq!(store.commits_attempted.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_rejection_is_not_retried() {
        let (queue, store, user, book_id) = setup(0).await;

        let err = queue
            .move_with_retry(&user, &book_id, &MoveRequest::new("missing", None, 0))
            .await
            .unwrap_err();

        assert!(err.is_rejection());
        assert_eq!(store.commits_attempted.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_bulk_apply_retries() {
        let (queue, _store, user, book_id) = setup(1).await;

        let chapters = queue
            .apply_with_retry(
                &user,
                &book_id,
                &[ChapterPosition {
                    id: "c".to_string(),
                    order: 0,
                    level: 0,
                    parent_id: Some("a".to_string()),
                }],
            )
            .await
            .unwrap();

        let c = chapters.iter().find(|c| c.id == "c").unwrap();
        assert_eq!(c.parent_id.as_deref(), Some("a"));
        assert_eq!(c.level, 1);
    }
}

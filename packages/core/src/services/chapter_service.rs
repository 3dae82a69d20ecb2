//! Chapter Service - Hierarchy Orchestration
//!
//! Every structural edit follows the same path:
//!
//! 1. load the book's complete chapter collection (with its revision)
//! 2. compute a candidate with the hierarchy engine
//! 3. validate the candidate; a failure is returned as
//!    [`ChapterServiceError::Rejected`] and nothing is written
//! 4. commit only the changed positions as one [`ChapterBatch`] against
//!    the loaded revision
//! 5. emit a [`DomainEvent`] and return the reloaded canonical list
//!
//! Ownership is checked against the explicit [`CurrentUser`] before any
//! read or write. The engine itself never sees the user.

use crate::config::FolioConfig;
use crate::db::{BookSnapshot, ChapterBatch, ChapterStore, DomainEvent};
use crate::export::{
    slugify, write_chapter_files, ConversionBackend, ConversionRequest, ExportFormat,
};
use crate::hierarchy::{
    apply_positions, build_tree, diff_positions, flatten_tree, move_node, next_position,
    remove_node, validate_hierarchy, HierarchyConfig, HierarchyError, OrphanPolicy,
    ValidationReport,
};
use crate::models::{
    Book, Chapter, ChapterContentUpdate, ChapterPosition, ChapterTreeNode, CreateChapterParams,
    CurrentUser,
};
use crate::services::error::ChapterServiceError;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::broadcast;
use uuid::Uuid;

/// Broadcast channel capacity for domain events.
///
/// Subscribers that lag further than this miss events and should reload.
const DOMAIN_EVENT_CHANNEL_CAPACITY: usize = 128;

/// A drag-and-drop style move: put `moved_id` under `new_parent_id`
/// (`None` = root) at sibling position `new_index`.
///
/// Out-of-range indexes are clamped: negative to 0, too large to the end.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MoveRequest {
    pub moved_id: String,
    #[serde(default)]
    pub new_parent_id: Option<String>,
    #[serde(default)]
    pub new_index: i64,
}

impl MoveRequest {
    pub fn new(moved_id: impl Into<String>, new_parent_id: Option<String>, new_index: i64) -> Self {
        Self {
            moved_id: moved_id.into(),
            new_parent_id,
            new_index,
        }
    }
}

/// Business logic for books and their chapter hierarchies
#[derive(Clone)]
pub struct ChapterService {
    store: Arc<dyn ChapterStore>,
    hierarchy: HierarchyConfig,
    orphan_policy: OrphanPolicy,
    event_tx: broadcast::Sender<DomainEvent>,
}

impl ChapterService {
    /// Create a service with the default depth limit and orphan policy
    pub fn new(store: Arc<dyn ChapterStore>) -> Self {
        let (event_tx, _) = broadcast::channel(DOMAIN_EVENT_CHANNEL_CAPACITY);
        Self {
            store,
            hierarchy: HierarchyConfig::default(),
            orphan_policy: OrphanPolicy::default(),
            event_tx,
        }
    }

    /// Create a service using the limits and policy from `config`
    pub fn from_config(store: Arc<dyn ChapterStore>, config: &FolioConfig) -> Self {
        Self::new(store)
            .with_hierarchy(config.hierarchy())
            .with_orphan_policy(config.orphan_policy)
    }

    pub fn with_hierarchy(mut self, hierarchy: HierarchyConfig) -> Self {
        self.hierarchy = hierarchy;
        self
    }

    pub fn with_orphan_policy(mut self, policy: OrphanPolicy) -> Self {
        self.orphan_policy = policy;
        self
    }

    pub fn hierarchy(&self) -> &HierarchyConfig {
        &self.hierarchy
    }

    pub fn orphan_policy(&self) -> OrphanPolicy {
        self.orphan_policy
    }

    /// Subscribe to events emitted after successful commits
    pub fn subscribe(&self) -> broadcast::Receiver<DomainEvent> {
        self.event_tx.subscribe()
    }

    fn emit_event(&self, event: DomainEvent) {
        // No subscribers is fine
        let _ = self.event_tx.send(event);
    }

    //
    // BOOKS
    //

    pub async fn create_book(
        &self,
        user: &CurrentUser,
        title: &str,
        author: Option<String>,
    ) -> Result<Book, ChapterServiceError> {
        let title = title.trim();
        if title.is_empty() {
            return Err(ChapterServiceError::invalid_input("book title must not be empty"));
        }

        let mut book = Book::new(user.id.clone(), title);
        book.author = author;

        let book = self
            .store
            .create_book(book)
            .await
            .map_err(|e| ChapterServiceError::commit_failed("creating book", e))?;

        tracing::info!("Created book '{}' for user '{}'", book.id, user.id);
        self.emit_event(DomainEvent::BookCreated(book.clone()));
        Ok(book)
    }

    pub async fn get_book(
        &self,
        user: &CurrentUser,
        book_id: &str,
    ) -> Result<Book, ChapterServiceError> {
        let book = self
            .store
            .get_book(book_id)
            .await?
            .ok_or_else(|| ChapterServiceError::book_not_found(book_id))?;
        Self::authorize(user, &book)?;
        Ok(book)
    }

    pub async fn list_books(&self, user: &CurrentUser) -> Result<Vec<Book>, ChapterServiceError> {
        Ok(self.store.list_books(&user.id).await?)
    }

    fn authorize(user: &CurrentUser, book: &Book) -> Result<(), ChapterServiceError> {
        if book.is_owned_by(user) {
            Ok(())
        } else {
            tracing::warn!("User '{}' denied access to book '{}'", user.id, book.id);
            Err(ChapterServiceError::access_denied(
                user.id.clone(),
                book.id.clone(),
            ))
        }
    }

    async fn load(
        &self,
        user: &CurrentUser,
        book_id: &str,
    ) -> Result<BookSnapshot, ChapterServiceError> {
        let snapshot = self.store.load_all(book_id).await?;
        Self::authorize(user, &snapshot.book)?;
        Ok(snapshot)
    }

    //
    // READS
    //

    /// The book's chapters in display order (pre-order)
    pub async fn list_chapters(
        &self,
        user: &CurrentUser,
        book_id: &str,
    ) -> Result<Vec<Chapter>, ChapterServiceError> {
        let snapshot = self.load(user, book_id).await?;
        Ok(flatten_tree(&build_tree(&snapshot.chapters)))
    }

    /// The book's chapters as a nested tree
    pub async fn get_tree(
        &self,
        user: &CurrentUser,
        book_id: &str,
    ) -> Result<Vec<ChapterTreeNode>, ChapterServiceError> {
        let snapshot = self.load(user, book_id).await?;
        Ok(build_tree(&snapshot.chapters))
    }

    pub async fn get_chapter(
        &self,
        user: &CurrentUser,
        chapter_id: &str,
    ) -> Result<Chapter, ChapterServiceError> {
        let chapter = self
            .store
            .get_chapter(chapter_id)
            .await?
            .ok_or_else(|| ChapterServiceError::chapter_not_found(chapter_id))?;
        self.get_book(user, &chapter.book_id).await?;
        Ok(chapter)
    }

    //
    // WRITES
    //

    /// Append a new chapter to the end of `params.parent_id`'s children
    /// (or the root group).
    pub async fn create_chapter(
        &self,
        user: &CurrentUser,
        book_id: &str,
        params: CreateChapterParams,
    ) -> Result<Chapter, ChapterServiceError> {
        let title = params.title.trim();
        if title.is_empty() {
            return Err(ChapterServiceError::invalid_input("chapter title must not be empty"));
        }

        let snapshot = self.load(user, book_id).await?;
        let (order, level) = next_position(&snapshot.chapters, params.parent_id.as_deref())?;

        let id = params.id.unwrap_or_else(|| Uuid::new_v4().to_string());
        let chapter = Chapter::new_with_id(id, book_id, title, params.parent_id)
            .with_content(params.content)
            .at(order, level);

        let mut candidate = snapshot.chapters.clone();
        candidate.push(chapter.clone());
        validate_hierarchy(&candidate, &self.hierarchy)?;

        let chapter = self
            .store
            .insert_chapter(chapter, snapshot.revision())
            .await
            .map_err(|e| ChapterServiceError::commit_failed("creating chapter", e))?;

        tracing::info!(
            "Created chapter '{}' in book '{}' at order {}, level {}",
            chapter.id,
            book_id,
            chapter.order,
            chapter.level
        );
        self.emit_event(DomainEvent::ChapterCreated(chapter.clone()));
        Ok(chapter)
    }

    /// Change title and/or content. Positions are untouched.
    pub async fn update_chapter_content(
        &self,
        user: &CurrentUser,
        chapter_id: &str,
        update: ChapterContentUpdate,
    ) -> Result<Chapter, ChapterServiceError> {
        if update.is_empty() {
            return Err(ChapterServiceError::invalid_input("update has no fields"));
        }
        if matches!(update.title.as_deref(), Some(t) if t.trim().is_empty()) {
            return Err(ChapterServiceError::invalid_input("chapter title must not be empty"));
        }

        self.get_chapter(user, chapter_id).await?;

        let chapter = self
            .store
            .update_chapter_content(chapter_id, update)
            .await
            .map_err(|e| ChapterServiceError::commit_failed("updating chapter", e))?;

        self.emit_event(DomainEvent::ChapterUpdated(chapter.clone()));
        Ok(chapter)
    }

    fn plan_move(
        &self,
        chapters: &[Chapter],
        request: &MoveRequest,
    ) -> Result<Vec<Chapter>, HierarchyError> {
        let candidate = move_node(
            chapters,
            &request.moved_id,
            request.new_parent_id.as_deref(),
            request.new_index,
        )?;
        validate_hierarchy(&candidate, &self.hierarchy)?;
        Ok(candidate)
    }

    /// Validate a move without committing it
    pub async fn preview_move(
        &self,
        user: &CurrentUser,
        book_id: &str,
        request: &MoveRequest,
    ) -> Result<ValidationReport, ChapterServiceError> {
        let snapshot = self.load(user, book_id).await?;
        Ok(match self.plan_move(&snapshot.chapters, request) {
            Ok(_) => ValidationReport::valid(),
            Err(e) => ValidationReport::invalid(&e),
        })
    }

    /// Move or reparent a chapter. Returns the committed chapters in
    /// display order.
    ///
    /// A rejected move leaves the stored hierarchy exactly as it was.
    pub async fn move_chapter(
        &self,
        user: &CurrentUser,
        book_id: &str,
        request: &MoveRequest,
    ) -> Result<Vec<Chapter>, ChapterServiceError> {
        let snapshot = self.load(user, book_id).await?;

        let candidate = self.plan_move(&snapshot.chapters, request).map_err(|e| {
            tracing::debug!("Rejected move of '{}': {}", request.moved_id, e);
            e
        })?;

        self.commit_positions(user, &snapshot, &candidate, "moving chapter")
            .await
    }

    /// Bulk position update (the order-update endpoint). Levels are
    /// recomputed and sibling orders renumbered before validation.
    pub async fn apply_order_updates(
        &self,
        user: &CurrentUser,
        book_id: &str,
        positions: &[ChapterPosition],
    ) -> Result<Vec<Chapter>, ChapterServiceError> {
        if positions.is_empty() {
            return Err(ChapterServiceError::invalid_input("no positions given"));
        }

        let snapshot = self.load(user, book_id).await?;
        let candidate = apply_positions(&snapshot.chapters, positions)?;
        validate_hierarchy(&candidate, &self.hierarchy)?;

        self.commit_positions(user, &snapshot, &candidate, "applying order updates")
            .await
    }

    async fn commit_positions(
        &self,
        user: &CurrentUser,
        snapshot: &BookSnapshot,
        candidate: &[Chapter],
        context: &str,
    ) -> Result<Vec<Chapter>, ChapterServiceError> {
        let book_id = snapshot.book.id.as_str();
        let batch = ChapterBatch::new(book_id, snapshot.revision())
            .with_updates(diff_positions(&snapshot.chapters, candidate));
        if batch.is_empty() {
            tracing::debug!("No position changes for book '{}'", book_id);
            return Ok(flatten_tree(&build_tree(&snapshot.chapters)));
        }

        let updates = batch.updates.clone();
        let revision = self
            .store
            .commit_batch(batch)
            .await
            .map_err(|e| ChapterServiceError::commit_failed(context, e))?;

        tracing::info!(
            "Repositioned {} chapter(s) in book '{}' (revision {})",
            updates.len(),
            book_id,
            revision
        );
        self.emit_event(DomainEvent::ChaptersRepositioned {
            book_id: book_id.to_string(),
            revision,
            positions: updates,
        });

        self.list_chapters(user, book_id).await
    }

    /// Delete a chapter, handling its children with the configured
    /// [`OrphanPolicy`]. Returns the ids of every deleted chapter.
    pub async fn delete_chapter(
        &self,
        user: &CurrentUser,
        book_id: &str,
        chapter_id: &str,
    ) -> Result<Vec<String>, ChapterServiceError> {
        let snapshot = self.load(user, book_id).await?;
        if !snapshot.chapters.iter().any(|c| c.id == chapter_id) {
            return Err(ChapterServiceError::chapter_not_found(chapter_id));
        }

        let removal = remove_node(&snapshot.chapters, chapter_id, self.orphan_policy)?;
        validate_hierarchy(&removal.chapters, &self.hierarchy)?;

        let updates = diff_positions(&snapshot.chapters, &removal.chapters);
        let batch = ChapterBatch::new(book_id, snapshot.revision())
            .with_deletes(removal.removed.clone())
            .with_updates(updates.clone());
        let revision = self
            .store
            .commit_batch(batch)
            .await
            .map_err(|e| ChapterServiceError::commit_failed("deleting chapter", e))?;

        tracing::info!(
            "Deleted {} chapter(s) from book '{}' ({:?}, revision {})",
            removal.removed.len(),
            book_id,
            self.orphan_policy,
            revision
        );
        self.emit_event(DomainEvent::ChaptersDeleted {
            book_id: book_id.to_string(),
            revision,
            ids: removal.removed.clone(),
        });
        if !updates.is_empty() {
            self.emit_event(DomainEvent::ChaptersRepositioned {
                book_id: book_id.to_string(),
                revision,
                positions: updates,
            });
        }

        Ok(removal.removed)
    }

    //
    // EXPORT
    //

    /// Render the book to per-chapter HTML under `out_dir/chapters` and
    /// convert it to `format` with `backend`. Returns the output file.
    pub async fn export_book(
        &self,
        user: &CurrentUser,
        book_id: &str,
        format: ExportFormat,
        out_dir: &Path,
        backend: &dyn ConversionBackend,
    ) -> Result<PathBuf, ChapterServiceError> {
        let snapshot = self.load(user, book_id).await?;
        let tree = build_tree(&snapshot.chapters);
        let book = snapshot.book;

        let files = write_chapter_files(&out_dir.join("chapters"), &book, &tree).await?;
        let request = ConversionRequest {
            files,
            format,
            output: out_dir.join(format!("{}.{}", slugify(&book.title), format.extension())),
            title: book.title.clone(),
            author: book.author.clone(),
            toc: true,
        };

        let output = backend.convert(&request).await?;
        tracing::info!(
            "Exported book '{}' as {} to {}",
            book.id,
            format,
            output.display()
        );
        Ok(output)
    }
}

//! Domain Events
//!
//! Emitted by `ChapterService` after a change has been committed, so
//! subscribers (live outline views, export caches) can react without
//! coupling to the persistence layer.
//!
//! # Architecture
//!
//! Events are emitted using tokio's broadcast channel, allowing multiple
//! subscribers to receive notifications asynchronously. Nothing is emitted
//! for rejected or failed operations.

use crate::models::{Book, Chapter, ChapterPosition};
use serde::{Deserialize, Serialize};

/// Domain events emitted after successful commits
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum DomainEvent {
    /// A new book was created
    #[serde(rename = "book:created")]
    BookCreated(Book),

    /// A new chapter was inserted
    #[serde(rename = "chapter:created")]
    ChapterCreated(Chapter),

    /// A chapter's title or content changed
    #[serde(rename = "chapter:updated")]
    ChapterUpdated(Chapter),

    /// Chapters changed order, parent or level
    #[serde(rename = "chapters:repositioned", rename_all = "camelCase")]
    ChaptersRepositioned {
        book_id: String,
        revision: i64,
        positions: Vec<ChapterPosition>,
    },

    /// Chapters were deleted
    #[serde(rename = "chapters:deleted", rename_all = "camelCase")]
    ChaptersDeleted {
        book_id: String,
        revision: i64,
        ids: Vec<String>,
    },
}

impl DomainEvent {
    /// String form of the event type, matching the serialized tag
    pub fn event_type(&self) -> &str {
        match self {
            DomainEvent::BookCreated(_) => "book:created",
            DomainEvent::ChapterCreated(_) => "chapter:created",
            DomainEvent::ChapterUpdated(_) => "chapter:updated",
            DomainEvent::ChaptersRepositioned { .. } => "chapters:repositioned",
            DomainEvent::ChaptersDeleted { .. } => "chapters:deleted",
        }
    }
}

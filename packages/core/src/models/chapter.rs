//! Chapter Data Structures
//!
//! A book's chapters are stored as a flat, parent-pointer list. The nested
//! form (`ChapterTreeNode`) is rebuilt on demand for display and export and
//! is never persisted.
//!
//! # Examples
//!
//! ```rust
//! use folio_core::models::Chapter;
//!
//! let intro = Chapter::new("book-1", "Introduction", None);
//! let section = Chapter::new("book-1", "Background", Some(intro.id.clone()));
//!
//! assert!(intro.is_root());
//! assert_eq!(section.parent_id.as_deref(), Some(intro.id.as_str()));
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::hash::{Hash, Hasher};
use uuid::Uuid;

/// One chapter (or section) within a book's hierarchy.
///
/// `order` and `level` are positional data owned by the hierarchy engine:
/// `order` is the zero-based index within the sibling group sharing
/// `parent_id`, `level` is the number of ancestors. Both are recomputed on
/// every structural change and should never be trusted from clients.
///
/// Equality and hashing use `id` only.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Chapter {
    /// Stable unique identifier
    pub id: String,

    /// Owning book
    pub book_id: String,

    /// Display title
    pub title: String,

    /// Markdown body
    #[serde(default)]
    pub content: String,

    /// Parent chapter, `None` for root-level chapters
    pub parent_id: Option<String>,

    /// Position within the sibling group
    #[serde(default)]
    pub order: u32,

    /// Cached depth (root = 0)
    #[serde(default)]
    pub level: u32,

    pub created_at: DateTime<Utc>,

    pub modified_at: DateTime<Utc>,
}

impl Chapter {
    /// Create a chapter with a generated UUID. Position fields start at zero
    /// and are assigned by the hierarchy engine on insertion.
    pub fn new(book_id: impl Into<String>, title: impl Into<String>, parent_id: Option<String>) -> Self {
        Self::new_with_id(Uuid::new_v4().to_string(), book_id, title, parent_id)
    }

    /// Create a chapter with a caller-chosen id
    pub fn new_with_id(
        id: impl Into<String>,
        book_id: impl Into<String>,
        title: impl Into<String>,
        parent_id: Option<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            book_id: book_id.into(),
            title: title.into(),
            content: String::new(),
            parent_id,
            order: 0,
            level: 0,
            created_at: now,
            modified_at: now,
        }
    }

    /// Builder-style setter for the markdown body
    pub fn with_content(mut self, content: impl Into<String>) -> Self {
        self.content = content.into();
        self
    }

    /// Builder-style setter for position fields
    pub fn at(mut self, order: u32, level: u32) -> Self {
        self.order = order;
        self.level = level;
        self
    }

    pub fn is_root(&self) -> bool {
        self.parent_id.is_none()
    }

    /// Snapshot of the positional fields
    pub fn position(&self) -> ChapterPosition {
        ChapterPosition {
            id: self.id.clone(),
            order: self.order,
            level: self.level,
            parent_id: self.parent_id.clone(),
        }
    }

    /// True if order, level or parent differ from `other`
    pub fn position_differs(&self, other: &Chapter) -> bool {
        self.order != other.order || self.level != other.level || self.parent_id != other.parent_id
    }
}

impl PartialEq for Chapter {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Chapter {}

impl Hash for Chapter {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

/// Nested representation of a chapter and its ordered children.
///
/// Serializes as the chapter's own fields plus a `children` array.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChapterTreeNode {
    #[serde(flatten)]
    pub chapter: Chapter,

    #[serde(default)]
    pub children: Vec<ChapterTreeNode>,
}

impl ChapterTreeNode {
    pub fn leaf(chapter: Chapter) -> Self {
        Self {
            chapter,
            children: Vec::new(),
        }
    }

    /// Number of chapters in this subtree, including this one
    pub fn subtree_len(&self) -> usize {
        1 + self.children.iter().map(|c| c.subtree_len()).sum::<usize>()
    }
}

/// Positional record committed by the persistence layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChapterPosition {
    pub id: String,
    pub order: u32,
    pub level: u32,
    pub parent_id: Option<String>,
}

/// Parameters for creating a chapter
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateChapterParams {
    /// Optional client-provided id (UUID generated when `None`)
    #[serde(default)]
    pub id: Option<String>,
    pub title: String,
    #[serde(default)]
    pub content: String,
    /// Parent chapter; the new chapter is appended to the end of its children
    #[serde(default)]
    pub parent_id: Option<String>,
}

/// Sparse update of a chapter's payload. Position fields are changed
/// through moves only.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChapterContentUpdate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
}

impl ChapterContentUpdate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn with_content(mut self, content: impl Into<String>) -> Self {
        self.content = Some(content.into());
        self
    }

    pub fn is_empty(&self) -> bool {
        self.title.is_none() && self.content.is_none()
    }
}

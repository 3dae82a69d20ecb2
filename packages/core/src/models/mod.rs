//! Data Models
//!
//! This module contains the core data structures used throughout Folio:
//!
//! - `Chapter` - a node in a book's chapter hierarchy (flat, parent-pointer form)
//! - `ChapterTreeNode` - the nested form rebuilt for display and export
//! - `ChapterPosition` - the positional tuple committed by the persistence layer
//! - `Book` / `CurrentUser` - ownership and the acting user

mod book;
mod chapter;

pub use book::{Book, CurrentUser};
pub use chapter::{
    Chapter, ChapterContentUpdate, ChapterPosition, ChapterTreeNode, CreateChapterParams,
};

//! Folio Core Business Logic Layer
//!
//! This crate provides the chapter hierarchy engine, persistence and export
//! for the Folio book-authoring system.
//!
//! # Architecture
//!
//! - **Flat storage, nested views**: chapters are stored as parent-pointer
//!   rows; trees are rebuilt on demand for display and export
//! - **Pure engine**: every structural edit is computed and validated in
//!   memory over the book's full collection before anything is written
//! - **Atomic batches**: changed positions are committed in one
//!   transaction, guarded by a per-book revision
//! - **libsql**: embedded SQLite-compatible database
//!
//! # Modules
//!
//! - [`models`] - Data structures (Book, Chapter, ChapterTreeNode, ...)
//! - [`hierarchy`] - Tree building, validation and reorder engine
//! - [`db`] - ChapterStore trait with libsql and in-memory implementations
//! - [`services`] - ChapterService orchestration and MoveQueue retries
//! - [`export`] - HTML rendering and external document conversion
//! - [`config`] - Runtime configuration

pub mod config;
pub mod db;
pub mod export;
pub mod hierarchy;
pub mod models;
pub mod services;

// Re-export commonly used types
pub use config::FolioConfig;
pub use models::*;
pub use services::*;

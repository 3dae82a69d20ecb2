//! Database Layer
//!
//! Persistence for books and their chapter collections:
//!
//! - [`DatabaseService`]: libsql connection management and schema
//! - [`ChapterStore`]: the storage abstraction the service layer talks to
//! - [`LibsqlChapterStore`] / [`MemoryChapterStore`]: its implementations
//! - [`DomainEvent`]: notifications emitted after successful commits
//!
//! Every structural change is committed as one [`ChapterBatch`] guarded by
//! the book's revision.

mod chapter_store;
mod database;
mod error;
pub mod events;
mod libsql_store;
mod memory_store;

pub use chapter_store::{BookSnapshot, ChapterBatch, ChapterStore};
pub use database::DatabaseService;
pub use error::DatabaseError;
pub use events::DomainEvent;
pub use libsql_store::LibsqlChapterStore;
pub use memory_store::MemoryChapterStore;

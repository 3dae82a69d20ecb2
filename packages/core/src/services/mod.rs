//! Business Services
//!
//! - `ChapterService` - ownership checks, load/validate/commit orchestration
//!   and domain events for books and chapters
//! - `MoveQueue` - retries moves and bulk reorders that lost a revision race
//!
//! Services sit between the pure hierarchy engine and the `ChapterStore`.

pub mod chapter_service;
pub mod error;
pub mod move_queue;

pub use chapter_service::{ChapterService, MoveRequest};
pub use error::ChapterServiceError;
pub use move_queue::{MoveQueue, DEFAULT_MAX_RETRIES};

//! Chapter Hierarchy Engine
//!
//! Pure, synchronous functions over a book's complete chapter collection:
//!
//! - [`tree`] - flat list ⇄ nested tree (`build_tree`, `flatten_tree`)
//! - [`validator`] - cycle, missing-parent and depth checks on a candidate list
//! - [`reorder`] - move/reparent, bulk position updates, deletion, normalization
//!
//! Every operation takes the full collection and returns a new candidate
//! list; inputs are never mutated. Callers validate the candidate and then
//! either commit it or simply drop it, which is the whole rollback story.
//!
//! ```rust
//! use folio_core::hierarchy::{move_node, validate_hierarchy, HierarchyConfig};
//! use folio_core::models::Chapter;
//!
//! let chapters = vec![
//!     Chapter::new_with_id("a", "book", "A", None).at(0, 0),
//!     Chapter::new_with_id("b", "book", "B", None).at(1, 0),
//! ];
//!
//! let candidate = move_node(&chapters, "b", Some("a"), 0).unwrap();
//! assert!(validate_hierarchy(&candidate, &HierarchyConfig::default()).is_ok());
//! ```

mod error;
pub mod reorder;
pub mod tree;
pub mod validator;

pub use error::{HierarchyError, ValidationReport};
pub use reorder::{
    apply_positions, descendant_ids, diff_positions, move_node, next_position, normalize,
    remove_node, OrphanPolicy, Removal,
};
pub use tree::{build_tree, flatten_tree};
pub use validator::{check_invariants, validate_hierarchy};

use serde::{Deserialize, Serialize};

/// Default number of allowed levels (chapter, section, subsection, sub-subsection)
pub const DEFAULT_MAX_DEPTH: usize = 4;

/// Structural limits applied by the validator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HierarchyConfig {
    /// Number of levels allowed; levels `0..max_depth` are valid
    pub max_depth: usize,
}

impl HierarchyConfig {
    pub fn with_max_depth(max_depth: usize) -> Self {
        Self { max_depth }
    }

    /// True if a chapter at `level` is allowed
    pub fn allows_level(&self, level: usize) -> bool {
        level < self.max_depth
    }
}

impl Default for HierarchyConfig {
    fn default() -> Self {
        Self {
            max_depth: DEFAULT_MAX_DEPTH,
        }
    }
}

//! Hierarchy Error Types
//!
//! Validation failures are ordinary values: callers receive them through
//! `Result` and surface the message to the user instead of failing the
//! request.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors produced by the hierarchy engine and validator
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum HierarchyError {
    /// Referenced chapter is absent from the collection
    #[error("Chapter not found: {id}")]
    NotFound { id: String },

    /// A chapter's parent_id points outside the collection
    #[error("Parent '{parent_id}' of chapter '{chapter_id}' not found")]
    ParentNotFound {
        chapter_id: String,
        parent_id: String,
    },

    /// A chapter is reachable from itself through parent links
    #[error("Cycle detected: {}", format_chain(.chain))]
    CycleDetected { chain: Vec<String> },

    /// A chapter sits deeper than the configured maximum
    #[error("Chapter '{chapter_id}' would be at level {level}, but at most {max_depth} levels are allowed")]
    DepthExceeded {
        chapter_id: String,
        level: usize,
        max_depth: usize,
    },

    /// The same id appears twice in one collection
    #[error("Duplicate chapter id: {id}")]
    DuplicateId { id: String },

    /// Cached level disagrees with the parent chain
    #[error("Chapter '{chapter_id}' has level {actual}, expected {expected}")]
    LevelMismatch {
        chapter_id: String,
        expected: u32,
        actual: u32,
    },

    /// A sibling group's orders are not exactly 0..n-1
    #[error("Sibling orders under {} are not contiguous: {orders:?}", .parent_id.as_deref().unwrap_or("<root>"))]
    NonContiguousOrder {
        parent_id: Option<String>,
        orders: Vec<u32>,
    },
}

fn format_chain(chain: &[String]) -> String {
    let mut rendered = chain.join(" -> ");
    if let Some(first) = chain.first() {
        rendered.push_str(" -> ");
        rendered.push_str(first);
    }
    rendered
}

impl HierarchyError {
    pub fn not_found(id: impl Into<String>) -> Self {
        Self::NotFound { id: id.into() }
    }

    pub fn parent_not_found(chapter_id: impl Into<String>, parent_id: impl Into<String>) -> Self {
        Self::ParentNotFound {
            chapter_id: chapter_id.into(),
            parent_id: parent_id.into(),
        }
    }

    pub fn cycle(chain: Vec<String>) -> Self {
        Self::CycleDetected { chain }
    }

    pub fn depth_exceeded(chapter_id: impl Into<String>, level: usize, max_depth: usize) -> Self {
        Self::DepthExceeded {
            chapter_id: chapter_id.into(),
            level,
            max_depth,
        }
    }

    /// Short machine-readable kind, used in reports and logs
    pub fn kind(&self) -> &'static str {
        match self {
            HierarchyError::NotFound { .. } => "not_found",
            HierarchyError::ParentNotFound { .. } => "parent_not_found",
            HierarchyError::CycleDetected { .. } => "cycle_detected",
            HierarchyError::DepthExceeded { .. } => "depth_exceeded",
            HierarchyError::DuplicateId { .. } => "duplicate_id",
            HierarchyError::LevelMismatch { .. } => "level_mismatch",
            HierarchyError::NonContiguousOrder { .. } => "non_contiguous_order",
        }
    }
}

/// Serializable `{valid, error?}` view of a validation result
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationReport {
    pub valid: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
}

impl ValidationReport {
    pub fn valid() -> Self {
        Self {
            valid: true,
            error: None,
            kind: None,
        }
    }

    pub fn invalid(error: &HierarchyError) -> Self {
        Self {
            valid: false,
            error: Some(error.to_string()),
            kind: Some(error.kind().to_string()),
        }
    }
}

impl From<&Result<(), HierarchyError>> for ValidationReport {
    fn from(result: &Result<(), HierarchyError>) -> Self {
        match result {
            Ok(()) => Self::valid(),
            Err(e) => Self::invalid(e),
        }
    }
}

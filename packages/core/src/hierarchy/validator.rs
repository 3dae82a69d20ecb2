//! Hierarchy Validator
//!
//! Runs over a complete candidate collection, never a delta: a reparent
//! that looks fine locally can still close a loop several hops up.

use super::{HierarchyConfig, HierarchyError};
use crate::models::Chapter;
use std::collections::{HashMap, HashSet};

/// Structural validation of a candidate collection.
///
/// For every chapter the parent chain is walked with a visited set seeded
/// with the chapter's own id. Fails on:
///
/// - a duplicated id
/// - a `parent_id` that is not in the collection (`ParentNotFound`)
/// - a parent chain that revisits a chapter (`CycleDetected`, carrying the loop)
/// - a chain with more ancestors than `max_depth` allows (`DepthExceeded`)
///
/// Cycle and missing-parent errors win over depth errors on the same chain.
pub fn validate_hierarchy(
    chapters: &[Chapter],
    config: &HierarchyConfig,
) -> Result<(), HierarchyError> {
    let by_id = index_by_id(chapters)?;

    for chapter in chapters {
        let depth = ancestor_count(chapter, &by_id)?;
        if !config.allows_level(depth) {
            return Err(HierarchyError::depth_exceeded(
                chapter.id.clone(),
                depth,
                config.max_depth,
            ));
        }
    }

    Ok(())
}

/// Strict check of every hierarchy invariant.
///
/// Everything [`validate_hierarchy`] checks, plus: each cached `level`
/// equals the ancestor count, and each sibling group's orders are exactly
/// `0..n-1`.
pub fn check_invariants(
    chapters: &[Chapter],
    config: &HierarchyConfig,
) -> Result<(), HierarchyError> {
    validate_hierarchy(chapters, config)?;
    let by_id = index_by_id(chapters)?;

    for chapter in chapters {
        let expected = ancestor_count(chapter, &by_id)? as u32;
        if chapter.level != expected {
            return Err(HierarchyError::LevelMismatch {
                chapter_id: chapter.id.clone(),
                expected,
                actual: chapter.level,
            });
        }
    }

    let mut groups: HashMap<Option<&str>, Vec<u32>> = HashMap::new();
    for chapter in chapters {
        groups
            .entry(chapter.parent_id.as_deref())
            .or_default()
            .push(chapter.order);
    }

    for (parent, mut orders) in groups {
        orders.sort_unstable();
        let contiguous = orders.iter().enumerate().all(|(i, &o)| o == i as u32);
        if !contiguous {
            return Err(HierarchyError::NonContiguousOrder {
                parent_id: parent.map(str::to_string),
                orders,
            });
        }
    }

    Ok(())
}

fn index_by_id(chapters: &[Chapter]) -> Result<HashMap<&str, &Chapter>, HierarchyError> {
    let mut by_id = HashMap::with_capacity(chapters.len());
    for chapter in chapters {
        if by_id.insert(chapter.id.as_str(), chapter).is_some() {
            return Err(HierarchyError::DuplicateId {
                id: chapter.id.clone(),
            });
        }
    }
    Ok(by_id)
}

/// Walk the parent chain of `chapter`, returning the number of ancestors.
fn ancestor_count<'a>(
    chapter: &'a Chapter,
    by_id: &HashMap<&str, &'a Chapter>,
) -> Result<usize, HierarchyError> {
    let mut visited: HashSet<&str> = HashSet::new();
    visited.insert(chapter.id.as_str());
    let mut chain: Vec<&str> = vec![chapter.id.as_str()];

    let mut current = chapter;
    while let Some(parent_id) = current.parent_id.as_deref() {
        if visited.contains(parent_id) {
            let start = chain.iter().position(|id| *id == parent_id).unwrap_or(0);
            return Err(HierarchyError::cycle(
                chain[start..].iter().map(|id| id.to_string()).collect(),
            ));
        }

        let parent = by_id
            .get(parent_id)
            .copied()
            .ok_or_else(|| HierarchyError::parent_not_found(current.id.clone(), parent_id))?;

        visited.insert(parent_id);
        chain.push(parent_id);
        current = parent;
    }

    Ok(chain.len() - 1)
}

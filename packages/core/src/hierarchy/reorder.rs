//! Reorder / Reparent Engine
//!
//! Computes candidate collections for structural edits. Nothing here
//! validates the result; callers run the candidate through
//! [`validate_hierarchy`](super::validate_hierarchy) before committing.

use super::HierarchyError;
use crate::models::{Chapter, ChapterPosition};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet, VecDeque};
use std::str::FromStr;

/// What happens to the children of a deleted chapter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrphanPolicy {
    /// Children take the deleted chapter's place in its parent's sibling group
    #[default]
    PromoteToParent,
    /// The whole subtree is deleted
    CascadeDelete,
}

impl FromStr for OrphanPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "promote" | "promote_to_parent" => Ok(Self::PromoteToParent),
            "cascade" | "cascade_delete" => Ok(Self::CascadeDelete),
            other => Err(format!("unknown orphan policy: {}", other)),
        }
    }
}

/// Result of [`remove_node`]
#[derive(Debug, Clone)]
pub struct Removal {
    /// Remaining chapters with updated positions
    pub chapters: Vec<Chapter>,
    /// Ids of every deleted chapter
    pub removed: Vec<String>,
}

/// Move a chapter under `new_parent_id` at sibling position `new_index`.
///
/// 1. The moved chapter takes the new parent.
/// 2. The new sibling group (excluding the moved chapter) is sorted by
///    current order and the moved chapter spliced in at `new_index`,
///    clamped to `[0, sibling_count]`.
/// 3. Both the new and the old sibling group are renumbered `0..n-1`.
/// 4. The moved chapter's level becomes the parent's derived level + 1
///    (0 at root) and is cascaded through its descendants using a
///    parent→children index built over the updated list. Stored levels are
///    not trusted: every reachable level is recomputed from the parent
///    chain, so drift elsewhere in the book is corrected in the candidate.
///
/// Only `NotFound` is returned; a move under one's own descendant yields a
/// cyclic candidate for the validator to reject.
pub fn move_node(
    chapters: &[Chapter],
    moved_id: &str,
    new_parent_id: Option<&str>,
    new_index: i64,
) -> Result<Vec<Chapter>, HierarchyError> {
    let moved_idx = chapters
        .iter()
        .position(|c| c.id == moved_id)
        .ok_or_else(|| HierarchyError::not_found(moved_id))?;

    let mut out = chapters.to_vec();
    let old_parent = out[moved_idx].parent_id.clone();
    out[moved_idx].parent_id = new_parent_id.map(str::to_string);

    let mut group: Vec<usize> = sibling_indices(&out, new_parent_id)
        .into_iter()
        .filter(|&idx| idx != moved_idx)
        .collect();
    let index = new_index.clamp(0, group.len() as i64) as usize;
    if index as i64 != new_index {
        tracing::debug!(
            "Clamped index {} to {} for chapter '{}' ({} siblings)",
            new_index,
            index,
            moved_id,
            group.len()
        );
    }
    group.insert(index, moved_idx);
    renumber(&mut out, &group);

    if old_parent.as_deref() != new_parent_id {
        let old_group = sibling_indices(&out, old_parent.as_deref());
        renumber(&mut out, &old_group);
    }

    let level = new_parent_id
        .and_then(|pid| derived_level(&out, pid))
        .map_or(0, |l| l + 1);
    cascade_levels(&mut out, moved_idx, level);
    recompute_levels(&mut out);

    tracing::debug!(
        "Moved chapter '{}' under {:?} at index {} (level {})",
        moved_id,
        new_parent_id,
        index,
        level
    );

    Ok(out)
}

/// Apply client-supplied positions (the bulk order-update path).
///
/// `parent_id` and `order` are taken from each position; `level` is
/// ignored and recomputed. The result is normalized, so clients may send
/// sparse or gapped orders or only part of a sibling group. On an order
/// tie a listed chapter goes ahead of an untouched sibling.
pub fn apply_positions(
    chapters: &[Chapter],
    positions: &[ChapterPosition],
) -> Result<Vec<Chapter>, HierarchyError> {
    let mut out = chapters.to_vec();
    let by_id: HashMap<String, usize> = out
        .iter()
        .enumerate()
        .map(|(idx, c)| (c.id.clone(), idx))
        .collect();

    let mut listed = vec![false; out.len()];
    for position in positions {
        let idx = *by_id
            .get(&position.id)
            .ok_or_else(|| HierarchyError::not_found(position.id.clone()))?;
        out[idx].parent_id = position.parent_id.clone();
        out[idx].order = position.order;
        listed[idx] = true;
    }

    regroup(&mut out, |idx| !listed[idx]);
    Ok(out)
}

/// Recompute every level from the parent chain and renumber every sibling
/// group to `0..n-1`, keeping relative sequence (ties by input order).
///
/// Chapters with a missing parent are treated as level 0. Chapters inside
/// a parent cycle keep their cached level.
pub fn normalize(chapters: &[Chapter]) -> Vec<Chapter> {
    let mut out = chapters.to_vec();
    regroup(&mut out, |_| false);
    out
}

/// Renumber every sibling group by `(order, tie)` and recompute levels
fn regroup<F>(chapters: &mut [Chapter], tie: F)
where
    F: Fn(usize) -> bool,
{
    let mut groups: HashMap<Option<String>, Vec<usize>> = HashMap::new();
    for (idx, chapter) in chapters.iter().enumerate() {
        groups.entry(chapter.parent_id.clone()).or_default().push(idx);
    }
    for group in groups.values_mut() {
        group.sort_by_key(|&idx| (chapters[idx].order, tie(idx)));
    }
    for group in groups.values() {
        renumber(chapters, group);
    }

    recompute_levels(chapters);
}

/// Delete a chapter according to `policy`.
///
/// With [`OrphanPolicy::PromoteToParent`] the deleted chapter's children
/// are spliced into its slot in the parent's sibling group, in their
/// existing order, and their subtrees move up one level. With
/// [`OrphanPolicy::CascadeDelete`] the whole subtree is removed. Either way
/// the affected sibling group is renumbered.
pub fn remove_node(
    chapters: &[Chapter],
    id: &str,
    policy: OrphanPolicy,
) -> Result<Removal, HierarchyError> {
    let target = chapters
        .iter()
        .find(|c| c.id == id)
        .ok_or_else(|| HierarchyError::not_found(id))?;
    let parent = target.parent_id.clone();

    let removed: Vec<String> = match policy {
        OrphanPolicy::CascadeDelete => {
            let mut ids = vec![id.to_string()];
            ids.extend(descendant_ids(chapters, id));
            ids
        }
        OrphanPolicy::PromoteToParent => vec![id.to_string()],
    };

    let mut out = chapters.to_vec();

    // Sibling group of the deleted chapter, with its slot replaced by its
    // children when promoting
    let mut slot_group: Vec<usize> = Vec::new();
    for idx in sibling_indices(&out, parent.as_deref()) {
        if out[idx].id != id {
            slot_group.push(idx);
        } else if policy == OrphanPolicy::PromoteToParent {
            slot_group.extend(sibling_indices(&out, Some(id)));
        }
    }
    for &idx in &slot_group {
        out[idx].parent_id = parent.clone();
    }
    renumber(&mut out, &slot_group);

    let removed_set: HashSet<&str> = removed.iter().map(String::as_str).collect();
    out.retain(|c| !removed_set.contains(c.id.as_str()));
    recompute_levels(&mut out);

    tracing::debug!(
        "Removed {} chapter(s) starting at '{}' with policy {:?}",
        removed.len(),
        id,
        policy
    );

    Ok(Removal {
        chapters: out,
        removed,
    })
}

/// Position for a new chapter appended under `parent_id`:
/// `(order, level)` = (current sibling count, parent's derived level + 1).
pub fn next_position(
    chapters: &[Chapter],
    parent_id: Option<&str>,
) -> Result<(u32, u32), HierarchyError> {
    let level = match parent_id {
        Some(pid) => derived_level(chapters, pid).ok_or_else(|| HierarchyError::not_found(pid))? + 1,
        None => 0,
    };
    let order = chapters
        .iter()
        .filter(|c| c.parent_id.as_deref() == parent_id)
        .count() as u32;
    Ok((order, level))
}

/// Positions in `after` whose order, level or parent differ from `before`
/// (including chapters absent from `before`).
pub fn diff_positions(before: &[Chapter], after: &[Chapter]) -> Vec<ChapterPosition> {
    let previous: HashMap<&str, &Chapter> = before.iter().map(|c| (c.id.as_str(), c)).collect();
    after
        .iter()
        .filter(|c| {
            previous
                .get(c.id.as_str())
                .map_or(true, |old| old.position_differs(c))
        })
        .map(Chapter::position)
        .collect()
}

/// Ids of every descendant of `id`, breadth-first
pub fn descendant_ids(chapters: &[Chapter], id: &str) -> Vec<String> {
    let index = children_index(chapters);
    let mut seen: HashSet<&str> = HashSet::from([id]);
    let mut queue: VecDeque<&str> = VecDeque::from([id]);
    let mut out = Vec::new();

    while let Some(current) = queue.pop_front() {
        if let Some(children) = index.get(current) {
            for &child in children {
                let child_id = chapters[child].id.as_str();
                if seen.insert(child_id) {
                    out.push(child_id.to_string());
                    queue.push_back(child_id);
                }
            }
        }
    }
    out
}

/// Indices of the chapters under `parent`, stably sorted by order
fn sibling_indices(chapters: &[Chapter], parent: Option<&str>) -> Vec<usize> {
    let mut group: Vec<usize> = chapters
        .iter()
        .enumerate()
        .filter(|(_, c)| c.parent_id.as_deref() == parent)
        .map(|(idx, _)| idx)
        .collect();
    group.sort_by_key(|&idx| chapters[idx].order);
    group
}

fn renumber(chapters: &mut [Chapter], group: &[usize]) {
    for (order, &idx) in group.iter().enumerate() {
        chapters[idx].order = order as u32;
    }
}

/// Number of ancestors of `id` reachable through the collection; `None`
/// when `id` is absent. Stops at a missing parent or on revisiting a
/// chapter, so a cyclic chain terminates.
fn derived_level(chapters: &[Chapter], id: &str) -> Option<u32> {
    let by_id: HashMap<&str, &Chapter> = chapters.iter().map(|c| (c.id.as_str(), c)).collect();
    let mut current = *by_id.get(id)?;
    let mut seen: HashSet<&str> = HashSet::from([id]);
    let mut level = 0;

    while let Some(parent) = current.parent_id.as_deref().and_then(|p| by_id.get(p).copied()) {
        if !seen.insert(parent.id.as_str()) {
            break;
        }
        level += 1;
        current = parent;
    }
    Some(level)
}

/// parent id -> child indices
fn children_index(chapters: &[Chapter]) -> HashMap<&str, Vec<usize>> {
    let mut index: HashMap<&str, Vec<usize>> = HashMap::new();
    for (idx, chapter) in chapters.iter().enumerate() {
        if let Some(parent) = chapter.parent_id.as_deref() {
            index.entry(parent).or_default().push(idx);
        }
    }
    index
}

/// Set `start`'s level and push `level + depth` down its subtree.
///
/// Follows children arrays only, with a visited set, so a cyclic candidate
/// terminates.
fn cascade_levels(chapters: &mut [Chapter], start: usize, level: u32) {
    let updates: Vec<(usize, u32)> = {
        let index = children_index(chapters);
        let mut visited = vec![false; chapters.len()];
        let mut queue = VecDeque::from([(start, level)]);
        let mut updates = Vec::new();
        visited[start] = true;

        while let Some((idx, lvl)) = queue.pop_front() {
            updates.push((idx, lvl));
            if let Some(children) = index.get(chapters[idx].id.as_str()) {
                for &child in children {
                    if !visited[child] {
                        visited[child] = true;
                        queue.push_back((child, lvl + 1));
                    }
                }
            }
        }
        updates
    };

    for (idx, lvl) in updates {
        chapters[idx].level = lvl;
    }
}

/// Recompute levels breadth-first from every root (no parent, or a parent
/// outside the collection).
fn recompute_levels(chapters: &mut [Chapter]) {
    let ids: HashSet<String> = chapters.iter().map(|c| c.id.clone()).collect();
    let roots: Vec<usize> = chapters
        .iter()
        .enumerate()
        .filter(|(_, c)| c.parent_id.as_ref().map_or(true, |p| !ids.contains(p)))
        .map(|(idx, _)| idx)
        .collect();

    for root in roots {
        cascade_levels(chapters, root, 0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hierarchy::test_support::{ch, find};
    use crate::hierarchy::{check_invariants, validate_hierarchy, HierarchyConfig};

    fn orders_of(chapters: &[Chapter], ids: &[&str]) -> Vec<u32> {
        ids.iter().map(|id| find(chapters, id).order).collect()
    }

    #[test]
    fn test_move_last_root_to_front() {
        let chapters = vec![ch("a", None, 0, 0), ch("b", None, 1, 0), ch("c", None, 2, 0)];

        let out = move_node(&chapters, "c", None, 0).unwrap();
        assert_eq!(orders_of(&out, &["c", "a", "b"]), vec![0, 1, 2]);
        assert!(check_invariants(&out, &HierarchyConfig::default()).is_ok());
    }

    #[test]
    fn test_move_within_group_forward() {
        let chapters = vec![ch("a", None, 0, 0), ch("b", None, 1, 0), ch("c", None, 2, 0)];

        let out = move_node(&chapters, "a", None, 2).unwrap();
        assert_eq!(orders_of(&out, &["b", "c", "a"]), vec![0, 1, 2]);
    }

    #[test]
    fn test_reparent_to_root_cascades_levels() {
        let chapters = vec![
            ch("top", None, 0, 0),
            ch("mid", Some("top"), 0, 1),
            ch("kid", Some("mid"), 0, 2),
            ch("grandkid", Some("kid"), 0, 3),
        ];

        let out = move_node(&chapters, "mid", None, 99).unwrap();
        assert_eq!(find(&out, "mid").level, 0);
        assert_eq!(find(&out, "kid").level, 1);
        assert_eq!(find(&out, "grandkid").level, 2);
        assert_eq!(find(&out, "mid").order, 1);
        // Descendant grouping untouched
        assert_eq!(find(&out, "kid").parent_id.as_deref(), Some("mid"));
        assert!(check_invariants(&out, &HierarchyConfig::default()).is_ok());
    }

    #[test]
    fn test_reparent_compacts_old_group() {
        let chapters = vec![
            ch("p", None, 0, 0),
            ch("x", Some("p"), 0, 1),
            ch("y", Some("p"), 1, 1),
            ch("z", Some("p"), 2, 1),
            ch("q", None, 1, 0),
        ];

        let out = move_node(&chapters, "x", Some("q"), 0).unwrap();
        assert_eq!(orders_of(&out, &["y", "z"]), vec![0, 1]);
        assert_eq!(find(&out, "x").order, 0);
        assert_eq!(find(&out, "x").level, 1);
        assert!(check_invariants(&out, &HierarchyConfig::default()).is_ok());
    }

    #[test]
    fn test_move_under_parent_with_stale_level() {
        // "p" is a root stored with a drifted level
        let chapters = vec![
            ch("p", None, 0, 2),
            ch("x", None, 1, 0),
            ch("x1", Some("x"), 0, 1),
        ];

        let out = move_node(&chapters, "x", Some("p"), 0).unwrap();
        assert_eq!(find(&out, "x").level, 1);
        assert_eq!(find(&out, "x1").level, 2);
        assert_eq!(find(&out, "p").level, 0);
        assert!(check_invariants(&out, &HierarchyConfig::default()).is_ok());
    }

    #[test]
    fn test_index_is_clamped() {
        let chapters = vec![ch("a", None, 0, 0), ch("b", None, 1, 0), ch("c", None, 2, 0)];

        let out = move_node(&chapters, "b", None, -5).unwrap();
        assert_eq!(orders_of(&out, &["b", "a", "c"]), vec![0, 1, 2]);

        let out = move_node(&chapters, "a", None, 42).unwrap();
        assert_eq!(orders_of(&out, &["b", "c", "a"]), vec![0, 1, 2]);
    }

    #[test]
    fn test_move_unknown_chapter() {
        let chapters = vec![ch("a", None, 0, 0)];
        assert_eq!(
            move_node(&chapters, "nope", None, 0),
            Err(HierarchyError::not_found("nope"))
        );
    }

    #[test]
    fn test_move_under_own_descendant_terminates_and_fails_validation() {
        let chapters = vec![
            ch("a", None, 0, 0),
            ch("b", Some("a"), 0, 1),
            ch("c", Some("b"), 0, 2),
        ];

        let out = move_node(&chapters, "a", Some("c"), 0).unwrap();
        let err = validate_hierarchy(&out, &HierarchyConfig::with_max_depth(10)).unwrap_err();
        assert_eq!(err.kind(), "cycle_detected");
    }

    #[test]
    fn test_move_beyond_depth_fails_and_input_is_untouched() {
        let chapters = vec![
            ch("l0", None, 0, 0),
            ch("l1", Some("l0"), 0, 1),
            ch("l2", Some("l1"), 0, 2),
            ch("loose", None, 1, 0),
        ];
        let snapshot: Vec<_> = chapters.iter().map(|c| (c.position(), c.title.clone())).collect();

        let out = move_node(&chapters, "loose", Some("l2"), 0).unwrap();
        assert_eq!(find(&out, "loose").level, 3);
        assert_eq!(
            validate_hierarchy(&out, &HierarchyConfig::with_max_depth(3)),
            Err(HierarchyError::depth_exceeded("loose", 3, 3))
        );

        let after: Vec<_> = chapters.iter().map(|c| (c.position(), c.title.clone())).collect();
        assert_eq!(snapshot, after);
    }

    #[test]
    fn test_apply_positions_normalizes() {
        let chapters = vec![
            ch("a", None, 0, 0),
            ch("b", None, 1, 0),
            ch("c", None, 2, 0),
        ];
        let positions = vec![
            ChapterPosition {
                id: "c".into(),
                order: 10,
                level: 7,
                parent_id: Some("a".into()),
            },
            ChapterPosition {
                id: "b".into(),
                order: 5,
                level: 0,
                parent_id: Some("a".into()),
            },
        ];

        let out = apply_positions(&chapters, &positions).unwrap();
        assert_eq!(orders_of(&out, &["b", "c"]), vec![0, 1]);
        assert_eq!(find(&out, "c").level, 1);
        assert!(check_invariants(&out, &HierarchyConfig::default()).is_ok());
    }

    #[test]
    fn test_apply_positions_partial_group_listed_chapter_wins_tie() {
        let chapters = vec![ch("a", None, 0, 0), ch("b", None, 1, 0), ch("c", None, 2, 0)];
        let positions = vec![ChapterPosition {
            id: "c".into(),
            order: 0,
            level: 0,
            parent_id: None,
        }];

        let out = apply_positions(&chapters, &positions).unwrap();
        assert_eq!(orders_of(&out, &["c", "a", "b"]), vec![0, 1, 2]);
        assert!(check_invariants(&out, &HierarchyConfig::default()).is_ok());
    }

    #[test]
    fn test_apply_positions_unknown_id() {
        let chapters = vec![ch("a", None, 0, 0)];
        let positions = vec![ChapterPosition {
            id: "zzz".into(),
            order: 0,
            level: 0,
            parent_id: None,
        }];
        assert_eq!(
            apply_positions(&chapters, &positions).unwrap_err(),
            HierarchyError::not_found("zzz")
        );
    }

    #[test]
    fn test_delete_promotes_children_into_slot() {
        let chapters = vec![
            ch("a", None, 0, 0),
            ch("b", None, 1, 0),
            ch("b1", Some("b"), 0, 1),
            ch("b2", Some("b"), 1, 1),
            ch("b2x", Some("b2"), 0, 2),
            ch("c", None, 2, 0),
        ];

        let removal = remove_node(&chapters, "b", OrphanPolicy::PromoteToParent).unwrap();
        assert_eq!(removal.removed, vec!["b"]);

        let out = &removal.chapters;
        assert_eq!(orders_of(out, &["a", "b1", "b2", "c"]), vec![0, 1, 2, 3]);
        assert_eq!(find(out, "b1").parent_id, None);
        assert_eq!(find(out, "b1").level, 0);
        assert_eq!(find(out, "b2x").level, 1);
        assert!(check_invariants(out, &HierarchyConfig::default()).is_ok());
    }

    #[test]
    fn test_delete_cascade_removes_subtree() {
        let chapters = vec![
            ch("a", None, 0, 0),
            ch("b", None, 1, 0),
            ch("b1", Some("b"), 0, 1),
            ch("b1x", Some("b1"), 0, 2),
            ch("c", None, 2, 0),
        ];

        let removal = remove_node(&chapters, "b", OrphanPolicy::CascadeDelete).unwrap();
        let mut removed = removal.removed.clone();
        removed.sort();
        assert_eq!(removed, vec!["b", "b1", "b1x"]);
        assert_eq!(orders_of(&removal.chapters, &["a", "c"]), vec![0, 1]);
        assert!(check_invariants(&removal.chapters, &HierarchyConfig::default()).is_ok());
    }

    #[test]
    fn test_next_position() {
        let chapters = vec![
            ch("a", None, 0, 0),
            ch("a1", Some("a"), 0, 1),
            ch("b", None, 1, 0),
        ];
        assert_eq!(next_position(&chapters, None).unwrap(), (2, 0));
        assert_eq!(next_position(&chapters, Some("a")).unwrap(), (1, 1));
        assert_eq!(next_position(&chapters, Some("a1")).unwrap(), (0, 2));
        assert!(next_position(&chapters, Some("ghost")).is_err());
    }

    #[test]
    fn test_next_position_ignores_stale_parent_level() {
        let chapters = vec![ch("a", None, 0, 0), ch("a1", Some("a"), 0, 3)];
        assert_eq!(next_position(&chapters, Some("a1")).unwrap(), (0, 2));
    }

    #[test]
    fn test_diff_positions_only_reports_changes() {
        let before = vec![ch("a", None, 0, 0), ch("b", None, 1, 0), ch("c", None, 2, 0)];
        let after = move_node(&before, "b", None, 1).unwrap();
        assert!(diff_positions(&before, &after).is_empty());

        let after = move_node(&before, "c", None, 1).unwrap();
        let changed: Vec<_> = diff_positions(&before, &after).into_iter().map(|p| p.id).collect();
        assert_eq!(changed, vec!["b", "c"]);
    }

    #[test]
    fn test_orphan_policy_parsing() {
        assert_eq!("promote".parse::<OrphanPolicy>().unwrap(), OrphanPolicy::PromoteToParent);
        assert_eq!("cascade-delete".parse::<OrphanPolicy>().unwrap(), OrphanPolicy::CascadeDelete);
        assert!("drop".parse::<OrphanPolicy>().is_err());
    }
}

//! Flat list ⇄ nested tree
//!
//! Every call site that needs a nested view (outline display, export, the
//! drag-and-drop editor) goes through [`build_tree`]; every call site that
//! turns an edited tree back into rows goes through [`flatten_tree`].

use crate::models::{Chapter, ChapterTreeNode};
use std::collections::{HashMap, HashSet};

/// Build a nested forest from a flat parent-pointer list.
///
/// - Children are sorted by `order`; ties keep their input sequence.
/// - A chapter whose parent is not in the list becomes a root.
/// - Chapters caught in a parent cycle are unreachable from any root; the
///   first of them (in input order) is emitted as a root so every input
///   chapter appears exactly once.
pub fn build_tree(chapters: &[Chapter]) -> Vec<ChapterTreeNode> {
    let ids: HashSet<&str> = chapters.iter().map(|c| c.id.as_str()).collect();

    // parent id -> child indices, in input order
    let mut children: HashMap<&str, Vec<usize>> = HashMap::new();
    let mut roots: Vec<usize> = Vec::new();

    for (idx, chapter) in chapters.iter().enumerate() {
        match chapter.parent_id.as_deref() {
            Some(parent) if ids.contains(parent) => {
                children.entry(parent).or_default().push(idx);
            }
            Some(parent) => {
                tracing::debug!(
                    "Chapter '{}' references missing parent '{}', placing at root",
                    chapter.id,
                    parent
                );
                roots.push(idx);
            }
            None => roots.push(idx),
        }
    }

    // sort_by_key is stable, so duplicate orders fall back to input sequence
    roots.sort_by_key(|&idx| chapters[idx].order);
    for group in children.values_mut() {
        group.sort_by_key(|&idx| chapters[idx].order);
    }

    let mut visited = vec![false; chapters.len()];
    let mut forest: Vec<ChapterTreeNode> = roots
        .iter()
        .map(|&idx| build_subtree(idx, chapters, &children, &mut visited))
        .collect();

    for idx in 0..chapters.len() {
        if !visited[idx] {
            tracing::warn!(
                "Chapter '{}' is part of a parent cycle, placing at root",
                chapters[idx].id
            );
            forest.push(build_subtree(idx, chapters, &children, &mut visited));
        }
    }

    forest
}

fn build_subtree(
    idx: usize,
    chapters: &[Chapter],
    children: &HashMap<&str, Vec<usize>>,
    visited: &mut [bool],
) -> ChapterTreeNode {
    visited[idx] = true;
    let chapter = &chapters[idx];

    let mut node = ChapterTreeNode::leaf(chapter.clone());
    if let Some(group) = children.get(chapter.id.as_str()) {
        for &child in group {
            if !visited[child] {
                node.children
                    .push(build_subtree(child, chapters, children, visited));
            }
        }
    }
    node
}

/// Flatten a nested forest into rows, depth-first pre-order.
///
/// Positional fields are rewritten from the traversal: `order` is the index
/// within the enclosing `children` array, `parent_id` the enclosing node's
/// id (`None` at the top), `level` the recursion depth. Payload fields pass
/// through unchanged.
pub fn flatten_tree(roots: &[ChapterTreeNode]) -> Vec<Chapter> {
    let mut out = Vec::with_capacity(roots.iter().map(|r| r.subtree_len()).sum());
    flatten_into(roots, None, 0, &mut out);
    out
}

fn flatten_into(nodes: &[ChapterTreeNode], parent: Option<&str>, level: u32, out: &mut Vec<Chapter>) {
    for (order, node) in nodes.iter().enumerate() {
        let mut chapter = node.chapter.clone();
        chapter.order = order as u32;
        chapter.level = level;
        chapter.parent_id = parent.map(str::to_string);
        out.push(chapter);
        flatten_into(&node.children, Some(node.chapter.id.as_str()), level + 1, out);
    }
}

//! Category forest construction.
//!
//! Categories are stored flat, each row carrying an optional parent
//! reference. [`build_tree`] turns that list into a nested forest and is the
//! only tree builder in the workspace.
//!
//! Parent assignments that would form a cycle are rejected on write with
//! [`would_create_cycle`]. The builder still has to cope with rows written
//! before that check existed: nodes that can't be reached from a root are
//! promoted to roots and reported in [`CategoryTree::detached`], so no row is
//! ever dropped or emitted twice.

use std::collections::{HashMap, HashSet};

use serde::Serialize;

use crate::CategoryId;

/// A flat record that can be placed in the category forest.
pub trait TreeItem {
    /// The record's own id.
    fn id(&self) -> CategoryId;

    /// The parent reference, `None` for top-level records.
    fn parent_id(&self) -> Option<CategoryId>;

    /// Manual ordering among siblings (lower first).
    fn sort_order(&self) -> i32 {
        0
    }

    /// Display name, used to break `sort_order` ties.
    fn name(&self) -> &str {
        ""
    }
}

/// A record with its nested children.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CategoryNode<T> {
    #[serde(flatten)]
    pub category: T,
    pub children: Vec<CategoryNode<T>>,
}

impl<T> CategoryNode<T> {
    /// Number of nodes in this subtree, including `self`.
    #[must_use]
    pub fn len(&self) -> usize {
        1 + self.children.iter().map(Self::len).sum::<usize>()
    }

    /// A node always contains at least itself.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        false
    }

    /// Depth-first, pre-order references to every record in the subtree.
    pub fn flatten(&self) -> Vec<&T> {
        let mut out = Vec::with_capacity(self.len());
        self.collect_into(&mut out);
        out
    }

    fn collect_into<'a>(&'a self, out: &mut Vec<&'a T>) {
        out.push(&self.category);
        for child in &self.children {
            child.collect_into(out);
        }
    }
}

/// Result of [`build_tree`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CategoryTree<T> {
    /// Top-level nodes, ordered by `(sort_order, name, id)`.
    pub roots: Vec<CategoryNode<T>>,
    /// Ids that sat on or below a parent cycle and were promoted to roots.
    #[serde(skip)]
    pub detached: Vec<CategoryId>,
}

impl<T> CategoryTree<T> {
    /// Total number of nodes in the forest.
    #[must_use]
    pub fn node_count(&self) -> usize {
        self.roots.iter().map(CategoryNode::len).sum()
    }

    /// Every record in the forest, depth-first.
    pub fn flatten(&self) -> Vec<&T> {
        self.roots.iter().flat_map(CategoryNode::flatten).collect()
    }
}

/// Build a nested forest from a flat list.
///
/// A record whose parent is missing from `items` becomes a root. For any
/// acyclic input the forest contains exactly `items.len()` nodes.
pub fn build_tree<T: TreeItem>(items: Vec<T>) -> CategoryTree<T> {
    let index: HashMap<CategoryId, usize> = items
        .iter()
        .enumerate()
        .map(|(i, item)| (item.id(), i))
        .collect();

    let mut roots = Vec::new();
    let mut children: Vec<Vec<usize>> = vec![Vec::new(); items.len()];

    for (i, item) in items.iter().enumerate() {
        match item.parent_id().and_then(|p| index.get(&p)) {
            Some(&parent) if parent != i => {
                if let Some(siblings) = children.get_mut(parent) {
                    siblings.push(i);
                }
            }
            _ => roots.push(i),
        }
    }

    let by_position = |a: &usize, b: &usize| {
        let (Some(x), Some(y)) = (items.get(*a), items.get(*b)) else {
            return std::cmp::Ordering::Equal;
        };
        (x.sort_order(), x.name(), x.id()).cmp(&(y.sort_order(), y.name(), y.id()))
    };
    roots.sort_by(by_position);
    for siblings in &mut children {
        siblings.sort_by(by_position);
    }

    let mut slots: Vec<Option<T>> = items.into_iter().map(Some).collect();
    let mut visited = vec![false; slots.len()];

    let mut tree = CategoryTree {
        roots: Vec::with_capacity(roots.len()),
        detached: Vec::new(),
    };

    for root in roots {
        if let Some(node) = assemble(root, &mut slots, &children, &mut visited) {
            tree.roots.push(node);
        }
    }

    // Anything left over is part of (or hangs below) a parent cycle.
    for i in 0..slots.len() {
        if visited.get(i).copied().unwrap_or(true) {
            continue;
        }
        if let Some(node) = assemble(i, &mut slots, &children, &mut visited) {
            tree.detached.push(node.category.id());
            tree.roots.push(node);
        }
    }

    tree
}

fn assemble<T>(
    i: usize,
    slots: &mut [Option<T>],
    children: &[Vec<usize>],
    visited: &mut [bool],
) -> Option<CategoryNode<T>> {
    match visited.get_mut(i) {
        Some(seen) if !*seen => *seen = true,
        _ => return None,
    }

    let category = slots.get_mut(i)?.take()?;
    let mut node = CategoryNode {
        category,
        children: Vec::new(),
    };

    for &child in children.get(i).map_or(&[][..], Vec::as_slice) {
        if let Some(child_node) = assemble(child, slots, children, visited) {
            node.children.push(child_node);
        }
    }

    Some(node)
}

/// Whether making `new_parent` the parent of `id` would close a cycle.
///
/// Walks the ancestor chain of `new_parent` using the current parent
/// references in `items`. Self-parenting counts as a cycle.
pub fn would_create_cycle<T: TreeItem>(
    items: &[T],
    id: CategoryId,
    new_parent: Option<CategoryId>,
) -> bool {
    let Some(mut current) = new_parent else {
        return false;
    };

    let parents: HashMap<CategoryId, Option<CategoryId>> = items
        .iter()
        .map(|item| (item.id(), item.parent_id()))
        .collect();

    let mut seen = HashSet::new();
    loop {
        if current == id {
            return true;
        }
        if !seen.insert(current) {
            // Pre-existing loop that does not involve `id`.
            return false;
        }
        match parents.get(&current).copied().flatten() {
            Some(next) => current = next,
            None => return false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, PartialEq, Eq)]
    struct Row {
        id: i32,
        parent: Option<i32>,
        sort: i32,
        name: &'static str,
    }

    impl TreeItem for Row {
        fn id(&self) -> CategoryId {
            CategoryId::new(self.id)
        }
        fn parent_id(&self) -> Option<CategoryId> {
            self.parent.map(CategoryId::new)
        }
        fn sort_order(&self) -> i32 {
            self.sort
        }
        fn name(&self) -> &str {
            self.name
        }
    }

    fn row(id: i32, parent: Option<i32>) -> Row {
        Row {
            id,
            parent,
            sort: 0,
            name: "",
        }
    }

    fn ids<T: TreeItem>(nodes: &[CategoryNode<T>]) -> Vec<i32> {
        nodes.iter().map(|n| n.category.id().as_i32()).collect()
    }

    #[test]
    fn test_single_parent_child() {
        let tree = build_tree(vec![row(1, None), row(2, Some(1))]);

        assert_eq!(ids(&tree.roots), vec![1]);
        let root = tree.roots.first().map(|n| ids(&n.children));
        assert_eq!(root, Some(vec![2]));
        assert!(tree.detached.is_empty());
    }

    #[test]
    fn test_child_listed_before_parent() {
        let tree = build_tree(vec![row(3, Some(2)), row(2, Some(1)), row(1, None)]);

        assert_eq!(ids(&tree.roots), vec![1]);
        assert_eq!(tree.node_count(), 3);
    }

    #[test]
    fn test_missing_parent_becomes_root() {
        let tree = build_tree(vec![row(5, Some(99)), row(6, None)]);

        assert_eq!(ids(&tree.roots), vec![5, 6]);
        assert!(tree.detached.is_empty());
    }

    #[test]
    fn test_acyclic_forest_preserves_node_count() {
        let rows: Vec<Row> = (1..=40)
            .map(|id| row(id, if id <= 4 { None } else { Some(id / 4) }))
            .collect();
        let expected = rows.len();

        let tree = build_tree(rows);

        assert_eq!(tree.node_count(), expected);
        let mut seen: Vec<i32> = tree.flatten().iter().map(|r| r.id).collect();
        seen.sort_unstable();
        assert_eq!(seen, (1..=40).collect::<Vec<_>>());
    }

    #[test]
    fn test_siblings_ordered_by_sort_then_name() {
        let rows = vec![
            Row {
                id: 1,
                parent: None,
                sort: 2,
                name: "a",
            },
            Row {
                id: 2,
                parent: None,
                sort: 1,
                name: "z",
            },
            Row {
                id: 3,
                parent: None,
                sort: 1,
                name: "b",
            },
        ];

        let tree = build_tree(rows);

        assert_eq!(ids(&tree.roots), vec![3, 2, 1]);
    }

    #[test]
    fn test_cycle_members_are_kept_once() {
        // 1 <-> 2 loop, 3 hangs below 2, 4 is a normal root.
        let tree = build_tree(vec![
            row(1, Some(2)),
            row(2, Some(1)),
            row(3, Some(2)),
            row(4, None),
        ]);

        assert_eq!(tree.node_count(), 4);
        assert_eq!(tree.detached, vec![CategoryId::new(1)]);
        let mut seen: Vec<i32> = tree.flatten().iter().map(|r| r.id).collect();
        seen.sort_unstable();
        assert_eq!(seen, vec![1, 2, 3, 4]);
    }

    #[test]
    fn test_self_parent_is_root() {
        let tree = build_tree(vec![row(1, Some(1))]);
        assert_eq!(ids(&tree.roots), vec![1]);
    }

    #[test]
    fn test_would_create_cycle_self() {
        let rows = vec![row(1, None)];
        assert!(would_create_cycle(
            &rows,
            CategoryId::new(1),
            Some(CategoryId::new(1))
        ));
    }

    #[test]
    fn test_would_create_cycle_descendant() {
        let rows = vec![row(1, None), row(2, Some(1)), row(3, Some(2))];

        assert!(would_create_cycle(
            &rows,
            CategoryId::new(1),
            Some(CategoryId::new(3))
        ));
        assert!(!would_create_cycle(
            &rows,
            CategoryId::new(3),
            Some(CategoryId::new(1))
        ));
        assert!(!would_create_cycle(&rows, CategoryId::new(2), None));
    }

    #[test]
    fn test_would_create_cycle_tolerates_existing_loop() {
        let rows = vec![row(1, Some(2)), row(2, Some(1)), row(3, None)];
        assert!(!would_create_cycle(
            &rows,
            CategoryId::new(3),
            Some(CategoryId::new(1))
        ));
    }
}

//! Nested-Set Arithmetic
//!
//! Pure functions over [`TreeNode`] rows: interval queries, the depth delta
//! rule used by moves, and a validator for the structural invariants of a
//! forest. Nothing here performs I/O.

use crate::models::{NodeInterval, TreeNode};
use std::collections::{BTreeMap, HashSet};
use thiserror::Error;

/// Structural invariant violations found in a forest
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Node '{id}' has an invalid interval [{lft}, {rgt}]")]
    InvalidInterval { id: String, lft: i64, rgt: i64 },

    #[error("Boundary value {value} is used more than once in tree '{tree_id}'")]
    DuplicateBoundary { tree_id: String, value: i64 },

    #[error("Intervals of '{first}' and '{second}' partially overlap")]
    OverlappingIntervals { first: String, second: String },

    #[error("Node '{id}' spans {actual} slots but its subtree needs {expected}")]
    WidthMismatch { id: String, expected: i64, actual: i64 },

    #[error("Node '{id}' has depth {actual}, expected {expected}")]
    DepthMismatch { id: String, expected: i64, actual: i64 },

    #[error("Tree '{tree_id}' has {count} roots, expected exactly one")]
    RootCount { tree_id: String, count: usize },
}

/// The `[lft, rgt]` interval of a node
pub fn interval_of(node: &TreeNode) -> NodeInterval {
    node.interval()
}

/// True iff `a` lies strictly inside `b` within the same tree
pub fn is_descendant(a: &TreeNode, b: &TreeNode) -> bool {
    a.lft > b.lft && a.rgt < b.rgt && a.tree_id == b.tree_id
}

/// True iff no other node of the same tree strictly contains `node`
pub fn is_root(node: &TreeNode, tree: &[TreeNode]) -> bool {
    !tree
        .iter()
        .any(|other| other.id != node.id && is_descendant(node, other))
}

/// `rgt - lft + 1`, twice the size of the subtree rooted at `node`
pub fn width_of(node: &TreeNode) -> i64 {
    node.width()
}

/// Signed depth change applied to a moved node and all of its descendants
///
/// - `new_parent == None`: the node becomes a root, delta is `-node.depth`
/// - same parent as before: delta is `0`, even for a sibling reorder
/// - otherwise: `new_parent.depth - node.depth + 1`
pub fn compute_depth_delta(
    node: &TreeNode,
    current_parent: Option<&TreeNode>,
    new_parent: Option<&TreeNode>,
) -> i64 {
    match new_parent {
        None => -node.depth,
        Some(parent) if current_parent.is_some_and(|current| current.id == parent.id) => 0,
        Some(parent) => parent.depth - node.depth + 1,
    }
}

/// Nearest ancestor of `node` among `candidates`
pub fn direct_parent<'a>(node: &TreeNode, candidates: &'a [TreeNode]) -> Option<&'a TreeNode> {
    candidates
        .iter()
        .filter(|candidate| is_descendant(node, candidate))
        .max_by_key(|candidate| candidate.lft)
}

/// Check invariants 1–4 for every tree present in `nodes`
///
/// Trees are validated independently; the first violation found is returned.
pub fn validate_forest(nodes: &[TreeNode]) -> Result<(), ValidationError> {
    let mut trees: BTreeMap<&str, Vec<&TreeNode>> = BTreeMap::new();
    for node in nodes {
        trees.entry(node.tree_id.as_str()).or_default().push(node);
    }

    for (tree_id, mut rows) in trees {
        rows.sort_by_key(|node| node.lft);
        validate_tree(tree_id, &rows)?;
    }
    Ok(())
}

fn validate_tree(tree_id: &str, rows: &[&TreeNode]) -> Result<(), ValidationError> {
    let mut seen = HashSet::new();
    for node in rows {
        if node.lft >= node.rgt || (node.rgt - node.lft) % 2 == 0 {
            return Err(ValidationError::InvalidInterval {
                id: node.id.clone(),
                lft: node.lft,
                rgt: node.rgt,
            });
        }
        for value in [node.lft, node.rgt] {
            if !seen.insert(value) {
                return Err(ValidationError::DuplicateBoundary {
                    tree_id: tree_id.to_string(),
                    value,
                });
            }
        }
    }

    // every pair of intervals must nest or be disjoint
    let mut open: Vec<(&TreeNode, NodeInterval)> = Vec::new();
    for node in rows {
        let interval = interval_of(node);
        while open
            .last()
            .is_some_and(|(_, top)| top.is_disjoint(&interval))
        {
            open.pop();
        }
        if let Some((top, enclosing)) = open.last() {
            if !enclosing.strictly_contains(&interval) {
                return Err(ValidationError::OverlappingIntervals {
                    first: top.id.clone(),
                    second: node.id.clone(),
                });
            }
        }
        open.push((node, interval));
    }

    let mut roots = 0;
    let mut open: Vec<&TreeNode> = Vec::new();
    for (index, node) in rows.iter().enumerate() {
        while open.last().is_some_and(|top| top.rgt < node.lft) {
            open.pop();
        }

        match open.last() {
            Some(parent) => {
                if node.depth != parent.depth + 1 {
                    return Err(ValidationError::DepthMismatch {
                        id: node.id.clone(),
                        expected: parent.depth + 1,
                        actual: node.depth,
                    });
                }
            }
            None => {
                roots += 1;
                if node.depth != 0 {
                    return Err(ValidationError::DepthMismatch {
                        id: node.id.clone(),
                        expected: 0,
                        actual: node.depth,
                    });
                }
            }
        }

        // descendants are contiguous in lft order
        let descendants = rows[index + 1..]
            .iter()
            .take_while(|other| other.lft < node.rgt)
            .count() as i64;
        let expected = 2 * descendants + 1;
        if node.rgt - node.lft != expected {
            return Err(ValidationError::WidthMismatch {
                id: node.id.clone(),
                expected: expected + 1,
                actual: node.width(),
            });
        }

        open.push(node);
    }

    if roots != 1 {
        return Err(ValidationError::RootCount {
            tree_id: tree_id.to_string(),
            count: roots,
        });
    }
    Ok(())
}

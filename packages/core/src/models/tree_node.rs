//! Tree Node Data Structures
//!
//! This module defines the `TreeNode` row stored in the nested-set table and the
//! small value types that travel between the move engine and the storage port.
//!
//! # Nested-set encoding
//!
//! Every node carries a `[lft, rgt]` interval taken from a preorder walk of its
//! tree. A node's descendants are exactly the nodes of the same tree whose
//! interval lies strictly inside its own, so structural questions become
//! integer comparisons:
//!
//! ```text
//!  Root(1,10)
//!  ├── A(2,3)
//!  ├── B(4,7)
//!  │   └── C(5,6)
//!  └── D(8,9)
//! ```
//!
//! # Examples
//!
//! ```rust
//! use nestable_core::models::TreeNode;
//!
//! let root = TreeNode::new_root("root", "tree-1", "Root");
//! assert_eq!((root.lft, root.rgt, root.depth), (1, 2, 0));
//! assert!(root.is_leaf());
//! ```

use serde::{Deserialize, Serialize};

/// Closed preorder interval of a node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NodeInterval {
    pub lft: i64,
    pub rgt: i64,
}

impl NodeInterval {
    /// Number of boundary slots covered, `rgt - lft + 1`
    pub fn width(&self) -> i64 {
        self.rgt - self.lft + 1
    }

    /// True when `other` lies strictly inside this interval
    pub fn strictly_contains(&self, other: &NodeInterval) -> bool {
        other.lft > self.lft && other.rgt < self.rgt
    }

    /// True when the two intervals share no boundary slot
    pub fn is_disjoint(&self, other: &NodeInterval) -> bool {
        self.rgt < other.lft || other.rgt < self.lft
    }
}

/// One row of the nested-set table
///
/// All nodes sharing a `tree_id` form one independent tree occupying its own
/// interval range; several trees may live in the same table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TreeNode {
    /// Unique identifier, stable across moves
    pub id: String,

    /// Identifier of the independent tree this node belongs to
    pub tree_id: String,

    /// Left boundary (preorder entry)
    pub lft: i64,

    /// Right boundary (preorder exit)
    pub rgt: i64,

    /// Distance from the tree root (root = 0)
    pub depth: i64,

    /// Default display label
    #[serde(default)]
    pub name: String,

    /// Free-form attributes, readable by label extractors
    #[serde(default = "empty_properties")]
    pub properties: serde_json::Value,
}

fn empty_properties() -> serde_json::Value {
    serde_json::Value::Object(Default::default())
}

impl TreeNode {
    /// Create a single-node tree: `lft = 1`, `rgt = 2`, `depth = 0`
    pub fn new_root(
        id: impl Into<String>,
        tree_id: impl Into<String>,
        name: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            tree_id: tree_id.into(),
            lft: 1,
            rgt: 2,
            depth: 0,
            name: name.into(),
            properties: empty_properties(),
        }
    }

    /// Create a row with explicit coordinates
    ///
    /// Mostly useful for seeding stores and for tests; the caller is
    /// responsible for the resulting forest being consistent.
    pub fn with_bounds(
        id: impl Into<String>,
        tree_id: impl Into<String>,
        lft: i64,
        rgt: i64,
        depth: i64,
    ) -> Self {
        let id = id.into();
        Self {
            name: id.clone(),
            id,
            tree_id: tree_id.into(),
            lft,
            rgt,
            depth,
            properties: empty_properties(),
        }
    }

    /// Replace the display label
    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Replace the free-form properties
    pub fn with_properties(mut self, properties: serde_json::Value) -> Self {
        self.properties = properties;
        self
    }

    pub fn interval(&self) -> NodeInterval {
        NodeInterval {
            lft: self.lft,
            rgt: self.rgt,
        }
    }

    pub fn width(&self) -> i64 {
        self.rgt - self.lft + 1
    }

    /// Number of descendants encoded by the interval
    pub fn descendant_count(&self) -> i64 {
        (self.rgt - self.lft - 1) / 2
    }

    /// A leaf spans exactly two consecutive boundary values
    pub fn is_leaf(&self) -> bool {
        self.rgt - self.lft == 1
    }

    /// True when `other` is a descendant of this node
    pub fn contains(&self, other: &TreeNode) -> bool {
        self.tree_id == other.tree_id && self.interval().strictly_contains(&other.interval())
    }

    /// True when this node is a direct child of `parent`
    pub fn is_child_of(&self, parent: &TreeNode) -> bool {
        parent.contains(self) && self.depth == parent.depth + 1
    }

    /// Snapshot of the coordinates reported after a move
    pub fn moved_state(&self) -> MovedNodeState {
        MovedNodeState {
            id: self.id.clone(),
            depth: self.depth,
            lft: self.lft,
            rgt: self.rgt,
        }
    }
}

/// A node waiting to be placed into a tree
///
/// Coordinates and tree id are assigned by the engine at insertion time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewTreeNode {
    /// Identifier for the node; generated (UUID v4) when absent
    #[serde(default)]
    pub id: Option<String>,

    #[serde(default)]
    pub name: String,

    #[serde(default = "empty_properties")]
    pub properties: serde_json::Value,
}

impl NewTreeNode {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: None,
            name: name.into(),
            properties: empty_properties(),
        }
    }

    pub fn with_id(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: Some(id.into()),
            name: name.into(),
            properties: empty_properties(),
        }
    }
}

/// Sparse update of a single row (only provided fields change)
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NodeFieldsUpdate {
    pub tree_id: Option<String>,
    pub lft: Option<i64>,
    pub rgt: Option<i64>,
    pub depth: Option<i64>,
    pub name: Option<String>,
    pub properties: Option<serde_json::Value>,
}

impl NodeFieldsUpdate {
    pub fn is_empty(&self) -> bool {
        self.tree_id.is_none()
            && self.lft.is_none()
            && self.rgt.is_none()
            && self.depth.is_none()
            && self.name.is_none()
            && self.properties.is_none()
    }

    /// Apply the update to an in-memory row
    pub fn apply_to(&self, node: &mut TreeNode) {
        if let Some(tree_id) = &self.tree_id {
            node.tree_id = tree_id.clone();
        }
        if let Some(lft) = self.lft {
            node.lft = lft;
        }
        if let Some(rgt) = self.rgt {
            node.rgt = rgt;
        }
        if let Some(depth) = self.depth {
            node.depth = depth;
        }
        if let Some(name) = &self.name {
            node.name = name.clone();
        }
        if let Some(properties) = &self.properties {
            node.properties = properties.clone();
        }
    }
}

/// Bulk update applied to every row whose `lft` falls in a range
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RangeUpdate {
    /// Added to `depth`
    pub depth_delta: i64,

    /// New tree id, when the rows change tree
    pub tree_id: Option<String>,
}

impl RangeUpdate {
    pub fn is_noop(&self) -> bool {
        self.depth_delta == 0 && self.tree_id.is_none()
    }
}

/// Post-move coordinates of the moved node
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MovedNodeState {
    pub id: String,
    pub depth: i64,
    pub lft: i64,
    pub rgt: i64,
}

/// Outbound result of one move, encoded by the caller
///
/// Serializes as `{"updated": {"id": .., "depth": .., "lft": .., "rgt": ..}}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MoveResponse {
    pub updated: MovedNodeState,
}

impl From<MovedNodeState> for MoveResponse {
    fn from(updated: MovedNodeState) -> Self {
        Self { updated }
    }
}

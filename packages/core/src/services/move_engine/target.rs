//! Move target resolution
//!
//! Turns the optional references of a move request into exactly one move
//! mode. Resolution is pure: the engine looks the references up first and
//! hands over whatever resolved.

use crate::models::TreeNode;

/// References of a move request that resolved to existing nodes
#[derive(Debug, Clone, Default)]
pub struct MoveReferences {
    pub right: Option<TreeNode>,
    pub left: Option<TreeNode>,
    pub parent: Option<TreeNode>,
}

/// The single mode a move request resolves to
#[derive(Debug, Clone, PartialEq)]
pub enum MoveTarget {
    /// Place the node immediately before this sibling
    RightNeighbor(TreeNode),
    /// Place the node immediately after this sibling
    LeftNeighbor(TreeNode),
    /// Place the node as the first child of this parent
    Parent(TreeNode),
    /// Detach the node into a new tree of its own
    PromoteToRoot,
    /// Leave the node where it is
    NoOp,
}

impl MoveTarget {
    /// Pick the mode in priority order: right neighbor, left neighbor,
    /// parent, root promotion (non-roots only, when `rootable`), no-op
    pub fn resolve(references: MoveReferences, node_is_root: bool, rootable: bool) -> Self {
        if let Some(right) = references.right {
            return MoveTarget::RightNeighbor(right);
        }
        if let Some(left) = references.left {
            return MoveTarget::LeftNeighbor(left);
        }
        if let Some(parent) = references.parent {
            return MoveTarget::Parent(parent);
        }
        if !node_is_root && rootable {
            return MoveTarget::PromoteToRoot;
        }
        MoveTarget::NoOp
    }

    /// Node the destination is expressed relative to
    pub fn reference(&self) -> Option<&TreeNode> {
        match self {
            MoveTarget::RightNeighbor(node)
            | MoveTarget::LeftNeighbor(node)
            | MoveTarget::Parent(node) => Some(node),
            MoveTarget::PromoteToRoot | MoveTarget::NoOp => None,
        }
    }

    pub fn mode(&self) -> &'static str {
        match self {
            MoveTarget::RightNeighbor(_) => "right-neighbor",
            MoveTarget::LeftNeighbor(_) => "left-neighbor",
            MoveTarget::Parent(_) => "parent",
            MoveTarget::PromoteToRoot => "promote-to-root",
            MoveTarget::NoOp => "no-op",
        }
    }
}

/// Where a moved or inserted node lands
#[derive(Debug, Clone, PartialEq)]
pub struct Destination {
    /// Tree receiving the node
    pub tree_id: String,

    /// Boundary value the node's `lft` takes, before the source gap closes
    pub insertion_point: i64,

    /// Direct parent after the operation (`None` = the node becomes a root)
    pub parent: Option<TreeNode>,

    /// True when `tree_id` names a tree that does not exist yet
    pub new_tree: bool,
}

impl Destination {
    /// Immediately before `right`, which has `parent` as its direct parent
    pub fn before(right: &TreeNode, parent: TreeNode) -> Self {
        Self {
            tree_id: right.tree_id.clone(),
            insertion_point: right.lft,
            parent: Some(parent),
            new_tree: false,
        }
    }

    /// Immediately after `left`, which has `parent` as its direct parent
    pub fn after(left: &TreeNode, parent: TreeNode) -> Self {
        Self {
            tree_id: left.tree_id.clone(),
            insertion_point: left.rgt + 1,
            parent: Some(parent),
            new_tree: false,
        }
    }

    /// First child of `parent`
    pub fn first_child_of(parent: TreeNode) -> Self {
        Self {
            tree_id: parent.tree_id.clone(),
            insertion_point: parent.lft + 1,
            parent: Some(parent),
            new_tree: false,
        }
    }

    /// Root of a brand new tree
    pub fn new_root(tree_id: impl Into<String>) -> Self {
        Self {
            tree_id: tree_id.into(),
            insertion_point: 1,
            parent: None,
            new_tree: true,
        }
    }

    /// Depth a node takes when it lands here
    pub fn depth(&self) -> i64 {
        self.parent.as_ref().map_or(0, |parent| parent.depth + 1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node(id: &str, lft: i64, rgt: i64, depth: i64) -> TreeNode {
        TreeNode::with_bounds(id, "t", lft, rgt, depth)
    }

    #[test]
    fn test_right_neighbor_wins() {
        let refs = MoveReferences {
            right: Some(node("d", 8, 9, 1)),
            left: Some(node("a", 2, 3, 1)),
            parent: Some(node("root", 1, 10, 0)),
        };
        let target = MoveTarget::resolve(refs, false, true);
        assert_eq!(target.mode(), "right-neighbor");
        assert_eq!(target.reference().unwrap().id, "d");
    }

    #[test]
    fn test_falls_through_to_parent() {
        let refs = MoveReferences {
            parent: Some(node("root", 1, 10, 0)),
            ..Default::default()
        };
        assert!(matches!(
            MoveTarget::resolve(refs, false, true),
            MoveTarget::Parent(_)
        ));
    }

    #[test]
    fn test_promote_requires_rootable_non_root() {
        assert_eq!(
            MoveTarget::resolve(MoveReferences::default(), false, true),
            MoveTarget::PromoteToRoot
        );
        assert_eq!(
            MoveTarget::resolve(MoveReferences::default(), false, false),
            MoveTarget::NoOp
        );
        assert_eq!(
            MoveTarget::resolve(MoveReferences::default(), true, true),
            MoveTarget::NoOp
        );
    }

    #[test]
    fn test_destination_points() {
        let root = node("root", 1, 10, 0);
        let d = node("d", 8, 9, 1);
        let a = node("a", 2, 3, 1);

        assert_eq!(Destination::before(&d, root.clone()).insertion_point, 8);
        assert_eq!(Destination::after(&a, root.clone()).insertion_point, 4);

        let under = Destination::first_child_of(root);
        assert_eq!(under.insertion_point, 2);
        assert_eq!(under.depth(), 1);

        let fresh = Destination::new_root("fresh");
        assert_eq!((fresh.insertion_point, fresh.depth()), (1, 0));
        assert!(fresh.new_tree);
    }
}

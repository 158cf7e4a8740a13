//! Data Models
//!
//! This module contains the core data structures of the nested-set tree:
//!
//! - `TreeNode` - one row of the nested-set table (interval, depth, tree id)
//! - `nested_set` - pure interval arithmetic and forest validation
//! - `PresentationRecord` - display-ready nested view produced by the serializer
//!
//! Nothing in this module performs I/O.

pub mod nested_set;
mod presentation;
mod tree_node;

pub use nested_set::{
    compute_depth_delta, direct_parent, interval_of, is_descendant, is_root, validate_forest,
    width_of, ValidationError,
};
pub use presentation::PresentationRecord;
pub use tree_node::{
    MoveResponse, MovedNodeState, NewTreeNode, NodeFieldsUpdate, NodeInterval, RangeUpdate,
    TreeNode,
};

//! Boundary shift planning
//!
//! A move is planned as a short list of range updates that the engine replays
//! inside one transaction:
//!
//! ```text
//!  1. park the subtree at [-w, -1]            shift [l, r+1) by -(r+1)
//!  2. close the gap it left                   shift [r+1, ..) by -w
//!  3. open a gap at the insertion point       shift [p', ..) by +w   (existing trees only)
//!  4. retag depth / tree id of parked rows    update lft in [-w, 0)  (when anything changes)
//!  5. drop the subtree into the gap           shift [-w, 0) by p' + w
//! ```
//!
//! `p'` is the insertion point after step 2: it moves left by `w` when it lay
//! to the right of the subtree in the same tree. Parking at negative values
//! keeps the subtree out of the way of steps 2 and 3 without a second table.

use super::target::Destination;
use crate::models::{RangeUpdate, TreeNode};
use crate::services::TreeError;

/// One range update of a plan
#[derive(Debug, Clone, PartialEq)]
pub enum ShiftStep {
    /// Add `delta` to every `lft` and every `rgt` in `[lower, upper)`
    Shift {
        tree_id: String,
        lower: i64,
        upper: Option<i64>,
        delta: i64,
    },
    /// Apply `update` to every row whose `lft` is in `[lower, upper)`
    Retag {
        tree_id: String,
        lower: i64,
        upper: Option<i64>,
        update: RangeUpdate,
    },
}

/// Steps of one move and the coordinates they produce
#[derive(Debug, Clone, PartialEq)]
pub struct MovePlan {
    pub steps: Vec<ShiftStep>,
    /// The moved node as it will be stored
    pub moved: TreeNode,
}

/// Plan moving the subtree rooted at `node` to `destination`
///
/// Returns `Ok(None)` when the destination is the node's current position.
pub fn plan_move(
    node: &TreeNode,
    destination: &Destination,
    depth_delta: i64,
) -> Result<Option<MovePlan>, TreeError> {
    let (l, r) = (node.lft, node.rgt);
    let w = node.width();
    let p = destination.insertion_point;
    let source_tree = node.tree_id.as_str();
    let same_tree = !destination.new_tree && destination.tree_id == node.tree_id;

    if same_tree {
        if p > l && p <= r {
            return Err(TreeError::circular_reference(format!(
                "node {} cannot be moved to position {} inside its own subtree [{}, {}]",
                node.id, p, l, r
            )));
        }
        if p == l || p == r + 1 {
            return Ok(None);
        }
    }

    let landing = if same_tree && p > r { p - w } else { p };

    let mut steps = vec![
        ShiftStep::Shift {
            tree_id: source_tree.to_string(),
            lower: l,
            upper: Some(r + 1),
            delta: -(r + 1),
        },
        ShiftStep::Shift {
            tree_id: source_tree.to_string(),
            lower: r + 1,
            upper: None,
            delta: -w,
        },
    ];

    if !destination.new_tree {
        steps.push(ShiftStep::Shift {
            tree_id: destination.tree_id.clone(),
            lower: landing,
            upper: None,
            delta: w,
        });
    }

    let update = RangeUpdate {
        depth_delta,
        tree_id: (!same_tree).then(|| destination.tree_id.clone()),
    };
    if !update.is_noop() {
        steps.push(ShiftStep::Retag {
            tree_id: source_tree.to_string(),
            lower: -w,
            upper: Some(0),
            update,
        });
    }

    steps.push(ShiftStep::Shift {
        tree_id: destination.tree_id.clone(),
        lower: -w,
        upper: Some(0),
        delta: landing + w,
    });

    let mut moved = node.clone();
    moved.tree_id = destination.tree_id.clone();
    moved.lft = landing;
    moved.rgt = landing + w - 1;
    moved.depth += depth_delta;

    Ok(Some(MovePlan { steps, moved }))
}

/// Plan opening a two-slot gap for a new leaf at `destination`
///
/// Returns the steps and the leaf row to insert once they ran.
pub fn plan_insert(
    id: String,
    name: String,
    properties: serde_json::Value,
    destination: &Destination,
) -> (Vec<ShiftStep>, TreeNode) {
    let p = destination.insertion_point;
    let steps = if destination.new_tree {
        Vec::new()
    } else {
        vec![ShiftStep::Shift {
            tree_id: destination.tree_id.clone(),
            lower: p,
            upper: None,
            delta: 2,
        }]
    };

    let leaf = TreeNode {
        id,
        tree_id: destination.tree_id.clone(),
        lft: p,
        rgt: p + 1,
        depth: destination.depth(),
        name,
        properties,
    };
    (steps, leaf)
}

//! Domain Events for tree mutations
//!
//! The move engine emits these after a transaction commits, so subscribers
//! only ever observe state that is durable in the store.
//!
//! # Architecture
//!
//! Events are delivered through a tokio broadcast channel; every subscriber
//! receives every event. Nothing is emitted for no-op moves or for operations
//! that were rolled back.

use crate::models::{MovedNodeState, TreeNode};
use serde::Serialize;

/// Domain events emitted by the move engine
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum TreeEvent {
    /// A new leaf or root was inserted
    #[serde(rename = "node:created")]
    NodeCreated { node: TreeNode },

    /// A subtree was relocated; `from_tree` and `to_tree` differ when it
    /// changed trees (root promotion or a cross-tree move)
    #[serde(rename = "node:moved", rename_all = "camelCase")]
    NodeMoved {
        state: MovedNodeState,
        from_tree: String,
        to_tree: String,
    },
}

impl TreeEvent {
    pub fn event_type(&self) -> &str {
        match self {
            TreeEvent::NodeCreated { .. } => "node:created",
            TreeEvent::NodeMoved { .. } => "node:moved",
        }
    }

    /// Id of the node the event is about
    pub fn node_id(&self) -> &str {
        match self {
            TreeEvent::NodeCreated { node } => &node.id,
            TreeEvent::NodeMoved { state, .. } => &state.id,
        }
    }

    /// True when the event moved a subtree into a different tree
    pub fn changed_tree(&self) -> bool {
        match self {
            TreeEvent::NodeCreated { .. } => false,
            TreeEvent::NodeMoved {
                from_tree, to_tree, ..
            } => from_tree != to_tree,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Subscribers outside the crate rely on this JSON shape
    #[test]
    fn test_moved_event_serialization_contract() {
        let event = TreeEvent::NodeMoved {
            state: MovedNodeState {
                id: "b".to_string(),
                depth: 0,
                lft: 1,
                rgt: 4,
            },
            from_tree: "t".to_string(),
            to_tree: "fresh".to_string(),
        };

        let parsed = serde_json::to_value(&event).unwrap();
        assert_eq!(parsed["type"], "node:moved");
        assert_eq!(parsed["fromTree"], "t");
        assert_eq!(parsed["toTree"], "fresh");
        assert_eq!(parsed["state"]["lft"], 1);
        assert!(event.changed_tree());
        assert_eq!(event.node_id(), "b");
    }

    #[test]
    fn test_created_event_type() {
        let event = TreeEvent::NodeCreated {
            node: TreeNode::new_root("r", "t", "Root"),
        };
        assert_eq!(event.event_type(), "node:created");
        assert!(!event.changed_tree());

        let parsed = serde_json::to_value(&event).unwrap();
        assert_eq!(parsed["type"], "node:created");
        assert_eq!(parsed["node"]["treeId"], "t");
    }
}

//! Move Engine
//!
//! Relocates a node (and its whole subtree) inside the nested-set table, and
//! places new leaves into it.
//!
//! # Resolution
//!
//! A request names up to three references. They are looked up and the first
//! one that exists decides the mode:
//!
//! 1. `right_id`: insert immediately before that node
//! 2. `left_id`: insert immediately after that node
//! 3. `parent_id`: insert as the first child of that node
//! 4. nothing resolved: promote the node to the root of a new tree, when it is
//!    not a root already and the `rootable` policy allows it
//! 5. otherwise leave the node where it is
//!
//! For the neighbor modes the new parent is the neighbor's own parent; a
//! `parent_id` sent along with a neighbor is only a hint and loses when it
//! disagrees with the neighbor's position.
//!
//! # Concurrency
//!
//! Every move locks the trees it touches (see [`TreeLockRegistry`]) and then
//! applies all boundary shifts in one storage transaction. A failure at any
//! step rolls the whole move back.
//!
//! # Examples
//!
//! ```rust,no_run
//! use nestable_core::db::InMemoryTreeStore;
//! use nestable_core::models::TreeNode;
//! use nestable_core::services::{MoveEngine, MovePositioning};
//!
//! # async fn example() -> Result<(), nestable_core::services::TreeError> {
//! let store = InMemoryTreeStore::with_nodes(vec![
//!     TreeNode::with_bounds("root", "t", 1, 6, 0),
//!     TreeNode::with_bounds("a", "t", 2, 3, 1),
//!     TreeNode::with_bounds("b", "t", 4, 5, 1),
//! ]);
//! let engine = MoveEngine::builder().with_store(store).build()?;
//!
//! let moved = engine.move_node("b", MovePositioning::before("a")).await?;
//! assert_eq!((moved.lft, moved.rgt), (2, 3));
//! # Ok(())
//! # }
//! ```

mod plan;
mod target;

pub use plan::{plan_insert, plan_move, MovePlan, ShiftStep};
pub use target::{Destination, MoveReferences, MoveTarget};

use crate::config::TreeConfig;
use crate::db::{TreeEvent, TreeReader, TreeStore, TreeTransaction};
use crate::models::{compute_depth_delta, MovedNodeState, NewTreeNode, TreeNode};
use crate::services::tree_locks::{TreeLockGuard, TreeLockRegistry};
use crate::services::TreeError;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::broadcast;

/// Broadcast channel capacity for tree events
const TREE_EVENT_CHANNEL_CAPACITY: usize = 128;

/// Optional references locating the destination of a move
///
/// Empty strings count as absent, matching what form posts send for unset
/// fields.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MovePositioning {
    #[serde(default)]
    pub left_id: Option<String>,
    #[serde(default)]
    pub right_id: Option<String>,
    #[serde(default)]
    pub parent_id: Option<String>,
}

impl MovePositioning {
    /// Immediately before `right_id`
    pub fn before(right_id: impl Into<String>) -> Self {
        Self {
            right_id: Some(right_id.into()),
            ..Default::default()
        }
    }

    /// Immediately after `left_id`
    pub fn after(left_id: impl Into<String>) -> Self {
        Self {
            left_id: Some(left_id.into()),
            ..Default::default()
        }
    }

    /// First child of `parent_id`
    pub fn under(parent_id: impl Into<String>) -> Self {
        Self {
            parent_id: Some(parent_id.into()),
            ..Default::default()
        }
    }

    /// No references: promote to root (or create a root when inserting)
    pub fn root() -> Self {
        Self::default()
    }

    /// Attach a parent hint to a neighbor positioning
    pub fn with_parent(mut self, parent_id: impl Into<String>) -> Self {
        self.parent_id = Some(parent_id.into());
        self
    }

    fn normalized(self) -> Self {
        let clean = |id: Option<String>| id.filter(|id| !id.trim().is_empty());
        Self {
            left_id: clean(self.left_id),
            right_id: clean(self.right_id),
            parent_id: clean(self.parent_id),
        }
    }

    fn reference_ids(&self) -> impl Iterator<Item = &str> {
        [&self.right_id, &self.left_id, &self.parent_id]
            .into_iter()
            .filter_map(|id| id.as_deref())
    }
}

/// Result of one locked attempt
enum Attempt<T> {
    /// Writes were made; commit them
    Applied(T),
    /// Nothing to write; report the current state
    Unchanged(T),
    /// A tree changed between the unlocked lookup and locking; start over
    Stale,
}

/// Nested-set move engine
///
/// Holds the storage port, the configuration and the per-tree locks. Share it
/// behind an `Arc` to run moves concurrently.
pub struct MoveEngine {
    store: Arc<dyn TreeStore>,
    config: TreeConfig,
    locks: TreeLockRegistry,
    event_tx: broadcast::Sender<TreeEvent>,
}

/// Builder for [`MoveEngine`]
#[derive(Default)]
pub struct MoveEngineBuilder {
    store: Option<Arc<dyn TreeStore>>,
    config: Option<TreeConfig>,
}

impl MoveEngineBuilder {
    /// Storage adapter the engine reads and writes through
    pub fn with_store<S: TreeStore + 'static>(mut self, store: S) -> Self {
        self.store = Some(Arc::new(store));
        self
    }

    /// Storage adapter already shared with other components
    pub fn with_shared_store(mut self, store: Arc<dyn TreeStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Engine configuration (defaults to `TreeConfig::default()`)
    pub fn with_config(mut self, config: TreeConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Build the engine
    ///
    /// # Errors
    ///
    /// Returns `TreeError::InvalidConfiguration` when no store was given or
    /// the configuration does not validate.
    pub fn build(self) -> Result<MoveEngine, TreeError> {
        let store = self
            .store
            .ok_or_else(|| TreeError::invalid_configuration("a tree store is required"))?;
        let config = self.config.unwrap_or_default();
        config.validate().map_err(TreeError::invalid_configuration)?;

        let (event_tx, _) = broadcast::channel(TREE_EVENT_CHANNEL_CAPACITY);

        Ok(MoveEngine {
            store,
            config,
            locks: TreeLockRegistry::new(),
            event_tx,
        })
    }
}

impl MoveEngine {
    pub fn builder() -> MoveEngineBuilder {
        MoveEngineBuilder::default()
    }

    pub fn store(&self) -> &Arc<dyn TreeStore> {
        &self.store
    }

    pub fn config(&self) -> &TreeConfig {
        &self.config
    }

    /// Subscribe to events of committed inserts and moves
    pub fn subscribe(&self) -> broadcast::Receiver<TreeEvent> {
        self.event_tx.subscribe()
    }

    fn emit_event(&self, event: TreeEvent) {
        let _ = self.event_tx.send(event);
    }

    /// Move `node_id` (with its subtree) to the position named by `positioning`
    ///
    /// Returns the node's coordinates after the move. When the request
    /// resolves to the node's current position nothing is written and the
    /// current coordinates are returned.
    ///
    /// # Errors
    ///
    /// - `NodeNotFound` if `node_id` does not exist (nothing is written)
    /// - `CircularReference` if the destination lies inside the moved subtree
    /// - `StorageFailure` if the store fails; the move is rolled back
    pub async fn move_node(
        &self,
        node_id: &str,
        positioning: MovePositioning,
    ) -> Result<MovedNodeState, TreeError> {
        let positioning = positioning.normalized();

        for attempt in 1..=self.config.max_lock_attempts {
            let node = self
                .store
                .find_node(node_id)
                .await?
                .ok_or_else(|| TreeError::node_not_found(node_id))?;

            let mut trees = vec![node.tree_id];
            trees.extend(self.reference_trees(&positioning).await?);
            let guard = self.locks.lock(trees).await;

            let mut tx = self.store.begin().await?;
            let outcome = self
                .apply_move(tx.as_mut(), &guard, node_id, &positioning)
                .await;

            match outcome {
                Ok(Attempt::Applied((state, from_tree, to_tree))) => {
                    tx.commit().await?;
                    drop(guard);

                    tracing::info!(
                        "Moved node {} to [{}, {}] depth {} in tree {}",
                        state.id,
                        state.lft,
                        state.rgt,
                        state.depth,
                        to_tree
                    );
                    self.emit_event(TreeEvent::NodeMoved {
                        state: state.clone(),
                        from_tree,
                        to_tree,
                    });
                    return Ok(state);
                }
                Ok(Attempt::Unchanged((state, _, _))) => {
                    rollback_quietly(tx.as_mut()).await;
                    tracing::debug!("Move of node {} is a no-op", node_id);
                    return Ok(state);
                }
                Ok(Attempt::Stale) => {
                    rollback_quietly(tx.as_mut()).await;
                    tracing::debug!(
                        "Trees involved in moving {} changed while locking (attempt {}/{})",
                        node_id,
                        attempt,
                        self.config.max_lock_attempts
                    );
                }
                Err(e) => {
                    rollback_quietly(tx.as_mut()).await;
                    tracing::warn!("Move of node {} rolled back: {}", node_id, e);
                    return Err(e);
                }
            }
        }

        Err(TreeError::transaction_failed(format!(
            "could not lock the trees of node {} after {} attempts",
            node_id, self.config.max_lock_attempts
        )))
    }

    /// Place a new leaf at the position named by `positioning`
    ///
    /// With no resolvable reference the node becomes the root of a new tree
    /// (the `rootable` policy only restricts moves).
    pub async fn insert_node(
        &self,
        new_node: NewTreeNode,
        positioning: MovePositioning,
    ) -> Result<TreeNode, TreeError> {
        let positioning = positioning.normalized();
        let id = new_node
            .id
            .clone()
            .filter(|id| !id.trim().is_empty())
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

        for attempt in 1..=self.config.max_lock_attempts {
            let trees = self.reference_trees(&positioning).await?;
            let guard = self.locks.lock(trees).await;

            let mut tx = self.store.begin().await?;
            let outcome = self
                .apply_insert(tx.as_mut(), &guard, &id, &new_node, &positioning)
                .await;

            match outcome {
                Ok(Attempt::Applied(node)) | Ok(Attempt::Unchanged(node)) => {
                    tx.commit().await?;
                    drop(guard);

                    tracing::info!(
                        "Inserted node {} at [{}, {}] depth {} in tree {}",
                        node.id,
                        node.lft,
                        node.rgt,
                        node.depth,
                        node.tree_id
                    );
                    self.emit_event(TreeEvent::NodeCreated { node: node.clone() });
                    return Ok(node);
                }
                Ok(Attempt::Stale) => {
                    rollback_quietly(tx.as_mut()).await;
                    tracing::debug!(
                        "Trees involved in inserting {} changed while locking (attempt {}/{})",
                        id,
                        attempt,
                        self.config.max_lock_attempts
                    );
                }
                Err(e) => {
                    rollback_quietly(tx.as_mut()).await;
                    tracing::warn!("Insert of node {} rolled back: {}", id, e);
                    return Err(e);
                }
            }
        }

        Err(TreeError::transaction_failed(format!(
            "could not lock the destination tree of node {} after {} attempts",
            id, self.config.max_lock_attempts
        )))
    }

    /// Tree ids of the references that currently resolve
    async fn reference_trees(&self, positioning: &MovePositioning) -> Result<Vec<String>, TreeError> {
        let mut trees = Vec::new();
        for id in positioning.reference_ids() {
            if let Some(node) = self.store.find_node(id).await? {
                trees.push(node.tree_id);
            }
        }
        Ok(trees)
    }

    /// Look up the references inside the transaction
    ///
    /// Returns `None` when one of them lives in a tree the guard does not cover.
    async fn load_references(
        tx: &dyn TreeTransaction,
        guard: &TreeLockGuard,
        positioning: &MovePositioning,
    ) -> Result<Option<MoveReferences>, TreeError> {
        async fn lookup(
            tx: &dyn TreeTransaction,
            id: &Option<String>,
        ) -> Result<Option<TreeNode>, TreeError> {
            match id {
                Some(id) => Ok(tx.find_node(id).await?),
                None => Ok(None),
            }
        }

        let references = MoveReferences {
            right: lookup(tx, &positioning.right_id).await?,
            left: lookup(tx, &positioning.left_id).await?,
            parent: lookup(tx, &positioning.parent_id).await?,
        };

        let covered = [&references.right, &references.left, &references.parent]
            .into_iter()
            .flatten()
            .all(|node| guard.covers(&node.tree_id));
        Ok(covered.then_some(references))
    }

    /// Destination of a resolved target, or `None` when it turns into a no-op
    async fn destination_for(
        &self,
        tx: &dyn TreeTransaction,
        target: &MoveTarget,
        parent_hint: Option<&str>,
        node_is_root: bool,
    ) -> Result<Option<Destination>, TreeError> {
        let destination = match target {
            MoveTarget::RightNeighbor(neighbor) | MoveTarget::LeftNeighbor(neighbor) => {
                match tx.find_ancestors(&neighbor.id, Some(1)).await?.pop() {
                    Some(parent) => {
                        if let Some(hint) = parent_hint {
                            if hint != parent.id {
                                tracing::warn!(
                                    "Parent hint {} disagrees with neighbor {} (parent {}); using the neighbor",
                                    hint,
                                    neighbor.id,
                                    parent.id
                                );
                            }
                        }
                        if matches!(target, MoveTarget::RightNeighbor(_)) {
                            Destination::before(neighbor, parent)
                        } else {
                            Destination::after(neighbor, parent)
                        }
                    }
                    None if self.config.rootable && !node_is_root => {
                        tracing::debug!(
                            "Neighbor {} is a tree root; promoting to a new tree",
                            neighbor.id
                        );
                        Destination::new_root(uuid::Uuid::new_v4().to_string())
                    }
                    None => {
                        tracing::warn!(
                            "Neighbor {} is a tree root and the node cannot become one; ignoring move",
                            neighbor.id
                        );
                        return Ok(None);
                    }
                }
            }
            MoveTarget::Parent(parent) => Destination::first_child_of(parent.clone()),
            MoveTarget::PromoteToRoot => Destination::new_root(uuid::Uuid::new_v4().to_string()),
            MoveTarget::NoOp => return Ok(None),
        };
        Ok(Some(destination))
    }

    async fn apply_move(
        &self,
        tx: &mut dyn TreeTransaction,
        guard: &TreeLockGuard,
        node_id: &str,
        positioning: &MovePositioning,
    ) -> Result<Attempt<(MovedNodeState, String, String)>, TreeError> {
        let node = tx
            .find_node(node_id)
            .await?
            .ok_or_else(|| TreeError::node_not_found(node_id))?;
        if !guard.covers(&node.tree_id) {
            return Ok(Attempt::Stale);
        }
        let Some(references) = Self::load_references(&*tx, guard, positioning).await? else {
            return Ok(Attempt::Stale);
        };

        let current_parent = tx.find_ancestors(node_id, Some(1)).await?.pop();
        let node_is_root = current_parent.is_none();
        let target = MoveTarget::resolve(references, node_is_root, self.config.rootable);
        tracing::debug!("Move of node {} resolved to {}", node_id, target.mode());

        if let Some(reference) = target.reference() {
            if reference.id == node.id || node.contains(reference) {
                return Err(TreeError::circular_reference(format!(
                    "node {} cannot be positioned relative to {} inside its own subtree",
                    node.id, reference.id
                )));
            }
        }

        let unchanged = |node: &TreeNode| {
            Attempt::Unchanged((node.moved_state(), node.tree_id.clone(), node.tree_id.clone()))
        };

        let Some(destination) = self
            .destination_for(&*tx, &target, positioning.parent_id.as_deref(), node_is_root)
            .await?
        else {
            return Ok(unchanged(&node));
        };

        let depth_delta =
            compute_depth_delta(&node, current_parent.as_ref(), destination.parent.as_ref());
        let Some(plan) = plan_move(&node, &destination, depth_delta)? else {
            return Ok(unchanged(&node));
        };

        apply_steps(tx, &plan.steps).await?;

        let stored = tx
            .find_node(node_id)
            .await?
            .ok_or_else(|| TreeError::node_not_found(node_id))?;
        if stored.interval() != plan.moved.interval() || stored.depth != plan.moved.depth {
            tracing::warn!(
                "Node {} stored at [{}, {}] but planned at [{}, {}]",
                node_id,
                stored.lft,
                stored.rgt,
                plan.moved.lft,
                plan.moved.rgt
            );
        }

        Ok(Attempt::Applied((
            stored.moved_state(),
            node.tree_id,
            stored.tree_id,
        )))
    }

    async fn apply_insert(
        &self,
        tx: &mut dyn TreeTransaction,
        guard: &TreeLockGuard,
        id: &str,
        new_node: &NewTreeNode,
        positioning: &MovePositioning,
    ) -> Result<Attempt<TreeNode>, TreeError> {
        let Some(references) = Self::load_references(&*tx, guard, positioning).await? else {
            return Ok(Attempt::Stale);
        };

        // a brand new node is never a root yet, so an empty request creates a tree
        let target = MoveTarget::resolve(references, false, true);
        let destination = match &target {
            MoveTarget::RightNeighbor(neighbor) | MoveTarget::LeftNeighbor(neighbor) => {
                match tx.find_ancestors(&neighbor.id, Some(1)).await?.pop() {
                    Some(parent) if matches!(target, MoveTarget::RightNeighbor(_)) => {
                        Destination::before(neighbor, parent)
                    }
                    Some(parent) => Destination::after(neighbor, parent),
                    None => Destination::new_root(uuid::Uuid::new_v4().to_string()),
                }
            }
            MoveTarget::Parent(parent) => Destination::first_child_of(parent.clone()),
            MoveTarget::PromoteToRoot | MoveTarget::NoOp => {
                Destination::new_root(uuid::Uuid::new_v4().to_string())
            }
        };

        let (steps, leaf) = plan_insert(
            id.to_string(),
            new_node.name.clone(),
            new_node.properties.clone(),
            &destination,
        );
        apply_steps(tx, &steps).await?;
        tx.insert_node(&leaf).await?;

        Ok(Attempt::Applied(leaf))
    }
}

/// Replay a plan against the transaction
async fn apply_steps(tx: &mut dyn TreeTransaction, steps: &[ShiftStep]) -> Result<(), TreeError> {
    for step in steps {
        let touched = match step {
            ShiftStep::Shift {
                tree_id,
                lower,
                upper,
                delta,
            } => tx.shift_range(tree_id, *lower, *upper, *delta).await?,
            ShiftStep::Retag {
                tree_id,
                lower,
                upper,
                update,
            } => tx.update_range(tree_id, *lower, *upper, update).await?,
        };
        tracing::debug!("{:?} touched {} rows", step, touched);
    }
    Ok(())
}

async fn rollback_quietly(tx: &mut dyn TreeTransaction) {
    if let Err(e) = tx.rollback().await {
        tracing::warn!("Rollback failed: {}", e);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::InMemoryTreeStore;
    use crate::models::validate_forest;

    fn sample_store() -> InMemoryTreeStore {
        InMemoryTreeStore::with_nodes(vec![
            TreeNode::with_bounds("root", "t", 1, 10, 0),
            TreeNode::with_bounds("a", "t", 2, 3, 1),
            TreeNode::with_bounds("b", "t", 4, 7, 1),
            TreeNode::with_bounds("c", "t", 5, 6, 2),
            TreeNode::with_bounds("d", "t", 8, 9, 1),
        ])
    }

    fn engine(store: &InMemoryTreeStore) -> MoveEngine {
        MoveEngine::builder()
            .with_store(store.clone())
            .build()
            .unwrap()
    }

    #[test]
    fn test_builder_requires_store() {
        let result = MoveEngine::builder().build();
        assert!(matches!(result, Err(TreeError::InvalidConfiguration(_))));
    }

    #[test]
    fn test_builder_rejects_invalid_config() {
        let config = TreeConfig {
            max_lock_attempts: 0,
            ..Default::default()
        };
        let result = MoveEngine::builder()
            .with_store(InMemoryTreeStore::new())
            .with_config(config)
            .build();
        assert!(matches!(result, Err(TreeError::InvalidConfiguration(_))));
    }

    #[test]
    fn test_blank_ids_are_absent() {
        let positioning = MovePositioning {
            left_id: Some(String::new()),
            right_id: Some("  ".to_string()),
            parent_id: Some("p".to_string()),
        }
        .normalized();
        assert_eq!(positioning, MovePositioning::under("p"));
    }

    #[tokio::test]
    async fn test_move_after_sibling() {
        let store = sample_store();
        let engine = engine(&store);

        let moved = engine.move_node("a", MovePositioning::after("d")).await.unwrap();
        assert_eq!((moved.lft, moved.rgt, moved.depth), (8, 9, 1));
        validate_forest(&store.all_nodes().await).unwrap();
    }

    #[tokio::test]
    async fn test_parent_hint_loses_to_neighbor() {
        let store = sample_store();
        let engine = engine(&store);

        // b is a's neighbor under root; the hint "c" is ignored
        let moved = engine
            .move_node("a", MovePositioning::after("b").with_parent("c"))
            .await
            .unwrap();
        assert_eq!(moved.depth, 1);

        let ancestors = store.find_ancestors("a", Some(1)).await.unwrap();
        assert_eq!(ancestors[0].id, "root");
    }

    #[tokio::test]
    async fn test_neighbor_that_is_root_promotes() {
        let store = sample_store();
        let engine = engine(&store);

        let moved = engine.move_node("a", MovePositioning::before("root")).await.unwrap();
        assert_eq!((moved.lft, moved.rgt, moved.depth), (1, 2, 0));
        let a = store.find_node("a").await.unwrap().unwrap();
        assert_ne!(a.tree_id, "t");
    }

    #[tokio::test]
    async fn test_relative_to_self_is_circular() {
        let store = sample_store();
        let engine = engine(&store);

        let err = engine.move_node("b", MovePositioning::under("b")).await.unwrap_err();
        assert!(matches!(err, TreeError::CircularReference { .. }));

        let err = engine.move_node("b", MovePositioning::after("c")).await.unwrap_err();
        assert!(matches!(err, TreeError::CircularReference { .. }));
        assert_eq!(store.rows_touched(), 0);
    }

    #[tokio::test]
    async fn test_root_without_references_is_noop() {
        let store = sample_store();
        let engine = engine(&store);

        let state = engine.move_node("root", MovePositioning::root()).await.unwrap();
        assert_eq!((state.lft, state.rgt, state.depth), (1, 10, 0));
        assert_eq!(store.rows_touched(), 0);
    }

    #[tokio::test]
    async fn test_events_for_committed_moves_only() {
        let store = sample_store();
        let engine = engine(&store);
        let mut rx = engine.subscribe();

        engine.move_node("b", MovePositioning::before("d")).await.unwrap();
        engine.move_node("a", MovePositioning::after("d")).await.unwrap();

        let event = rx.try_recv().unwrap();
        assert_eq!(event.event_type(), "node:moved");
        assert_eq!(event.node_id(), "a");
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_insert_new_root_and_after_neighbor() {
        let store = sample_store();
        let engine = engine(&store);

        let root = engine
            .insert_node(NewTreeNode::with_id("solo", "Solo"), MovePositioning::root())
            .await
            .unwrap();
        assert_eq!((root.lft, root.rgt, root.depth), (1, 2, 0));
        assert_ne!(root.tree_id, "t");

        let leaf = engine
            .insert_node(NewTreeNode::new("After A"), MovePositioning::after("a"))
            .await
            .unwrap();
        assert_eq!((leaf.lft, leaf.rgt, leaf.depth), (4, 5, 1));
        assert!(!leaf.id.is_empty());
        validate_forest(&store.all_nodes().await).unwrap();
    }

    #[tokio::test]
    async fn test_insert_duplicate_id_rolls_back() {
        let store = sample_store();
        let engine = engine(&store);

        let err = engine
            .insert_node(NewTreeNode::with_id("a", "Again"), MovePositioning::under("root"))
            .await
            .unwrap_err();
        assert!(matches!(err, TreeError::StorageFailure(_)));

        let root = store.find_node("root").await.unwrap().unwrap();
        assert_eq!(root.rgt, 10);
    }
}

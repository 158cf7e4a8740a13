//! TreeStore Trait - Storage Port
//!
//! This module defines the port through which the move engine and the tree
//! serializer reach persisted nested-set rows. Adapters implement it for a
//! concrete backend (in-memory map, libsql/SQLite).
//!
//! # Architecture
//!
//! - **Reads** (`TreeReader`): available on the store and inside transactions
//! - **Writes** (`TreeTransaction`): only inside a transaction, so a boundary
//!   shift is applied completely or not at all
//! - **Transaction boundary**: `TreeStore::begin` opens a transaction that must
//!   be finished with `commit` or `rollback`; adapters roll back a transaction
//!   dropped without either
//!
//! # Examples
//!
//! ```rust,no_run
//! use nestable_core::db::{InMemoryTreeStore, TreeStore, TreeTransaction};
//!
//! # async fn example() -> Result<(), nestable_core::db::DatabaseError> {
//! let store = InMemoryTreeStore::new();
//! let mut tx = store.begin().await?;
//! tx.shift_range("tree-1", 5, None, 2).await?;
//! tx.commit().await?;
//! # Ok(())
//! # }
//! ```

use crate::db::DatabaseError;
use crate::models::{NodeFieldsUpdate, RangeUpdate, TreeNode};
use async_trait::async_trait;

/// Read access to nested-set rows
///
/// `find_children` and `find_ancestors` have default implementations built on
/// `find_node` and `find_tree`; SQL adapters override them with direct queries.
#[async_trait]
pub trait TreeReader: Send + Sync {
    /// Get a node by id (`Ok(None)` when absent)
    async fn find_node(&self, id: &str) -> Result<Option<TreeNode>, DatabaseError>;

    /// All nodes of one tree ordered by `lft`
    async fn find_tree(&self, tree_id: &str) -> Result<Vec<TreeNode>, DatabaseError>;

    /// Root node of every tree, ordered by tree id
    async fn find_roots(&self) -> Result<Vec<TreeNode>, DatabaseError>;

    /// Descendants of `parent_id` at most `depth_limit` levels below it
    /// (`None` = all levels), ordered by `lft`
    async fn find_children(
        &self,
        parent_id: &str,
        depth_limit: Option<i64>,
    ) -> Result<Vec<TreeNode>, DatabaseError> {
        let Some(parent) = self.find_node(parent_id).await? else {
            return Ok(Vec::new());
        };
        let max_depth = depth_limit.map(|limit| parent.depth + limit);
        Ok(self
            .find_tree(&parent.tree_id)
            .await?
            .into_iter()
            .filter(|node| parent.contains(node))
            .filter(|node| max_depth.map_or(true, |max| node.depth <= max))
            .collect())
    }

    /// Ancestors of `id` at most `depth_limit` levels above it
    /// (`None` = up to the root), ordered by `lft` so the nearest comes last
    async fn find_ancestors(
        &self,
        id: &str,
        depth_limit: Option<i64>,
    ) -> Result<Vec<TreeNode>, DatabaseError> {
        let Some(node) = self.find_node(id).await? else {
            return Ok(Vec::new());
        };
        let min_depth = depth_limit.map(|limit| node.depth - limit);
        Ok(self
            .find_tree(&node.tree_id)
            .await?
            .into_iter()
            .filter(|candidate| candidate.contains(&node))
            .filter(|candidate| min_depth.map_or(true, |min| candidate.depth >= min))
            .collect())
    }
}

/// Write access inside one atomic unit
#[async_trait]
pub trait TreeTransaction: TreeReader {
    /// Add `delta` to every `lft` and, independently, every `rgt` of `tree_id`
    /// that falls in `[lower, upper)` (`upper = None` is unbounded)
    ///
    /// Returns the number of rows touched.
    async fn shift_range(
        &mut self,
        tree_id: &str,
        lower: i64,
        upper: Option<i64>,
        delta: i64,
    ) -> Result<u64, DatabaseError>;

    /// Apply `update` to every row of `tree_id` whose `lft` is in `[lower, upper)`
    async fn update_range(
        &mut self,
        tree_id: &str,
        lower: i64,
        upper: Option<i64>,
        update: &RangeUpdate,
    ) -> Result<u64, DatabaseError>;

    /// Sparse update of one row; fails with `RowNotFound` when absent
    async fn update_node(&mut self, id: &str, update: &NodeFieldsUpdate)
        -> Result<(), DatabaseError>;

    /// Insert a new row; fails with `DuplicateRow` when the id is taken
    async fn insert_node(&mut self, node: &TreeNode) -> Result<(), DatabaseError>;

    /// Make every write of this transaction visible
    async fn commit(&mut self) -> Result<(), DatabaseError>;

    /// Discard every write of this transaction
    async fn rollback(&mut self) -> Result<(), DatabaseError>;
}

/// A persisted nested-set table
#[async_trait]
pub trait TreeStore: TreeReader {
    /// Open a transaction holding the adapter's write lock
    async fn begin(&self) -> Result<Box<dyn TreeTransaction>, DatabaseError>;
}

/// True when `value` lies in `[lower, upper)`
pub(crate) fn in_range(value: i64, lower: i64, upper: Option<i64>) -> bool {
    value >= lower && upper.map_or(true, |upper| value < upper)
}

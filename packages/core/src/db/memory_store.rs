//! In-memory TreeStore implementation
//!
//! Committed rows live in a `HashMap` behind a tokio mutex that is only held
//! for the duration of a single read or a commit. A transaction takes a write
//! lock per tree the first time it writes to that tree and works on a private
//! copy of it; commit swaps the copies in under one short table lock, and a
//! rollback (explicit or on drop) simply discards them. Readers outside a
//! transaction therefore only observe committed state, and transactions on
//! different trees never wait on each other.
//!
//! A transaction claims tree write locks in the order it first writes to the
//! trees. Callers that write several trees in one transaction must agree on an
//! order; `MoveEngine` does so by holding its sorted per-tree locks first.
//!
//! Used by tests and by callers that keep the forest in process.

use crate::db::tree_store::in_range;
use crate::db::{DatabaseError, TreeReader, TreeStore, TreeTransaction};
use crate::models::{NodeFieldsUpdate, RangeUpdate, TreeNode};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use tokio::sync::{Mutex, OwnedMutexGuard};

type NodeTable = HashMap<String, TreeNode>;
type WriterLocks = Arc<StdMutex<HashMap<String, Arc<Mutex<()>>>>>;

/// Sentinel for "no injected failure"
const NO_FAILURE: usize = usize::MAX;

/// Mock-friendly in-memory nested-set table
#[derive(Clone)]
pub struct InMemoryTreeStore {
    nodes: Arc<Mutex<NodeTable>>,
    /// One write lock per tree id with an open writer
    writers: WriterLocks,
    /// Writes allowed before every further write fails (`NO_FAILURE` = never)
    writes_before_failure: Arc<AtomicUsize>,
    /// Rows touched by committed transactions
    rows_touched: Arc<AtomicU64>,
}

impl InMemoryTreeStore {
    pub fn new() -> Self {
        Self::with_nodes(Vec::new())
    }

    pub fn with_nodes(nodes: Vec<TreeNode>) -> Self {
        let table = nodes
            .into_iter()
            .map(|node| (node.id.clone(), node))
            .collect();

        Self {
            nodes: Arc::new(Mutex::new(table)),
            writers: Arc::new(StdMutex::new(HashMap::new())),
            writes_before_failure: Arc::new(AtomicUsize::new(NO_FAILURE)),
            rows_touched: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Make every write after the next `writes` ones fail with `TransactionFailed`
    ///
    /// Lets tests abort a boundary shift halfway through.
    pub fn fail_writes_after(&self, writes: usize) {
        self.writes_before_failure.store(writes, Ordering::SeqCst);
    }

    pub fn clear_failure(&self) {
        self.writes_before_failure.store(NO_FAILURE, Ordering::SeqCst);
    }

    /// Total rows touched by committed transactions since creation
    pub fn rows_touched(&self) -> u64 {
        self.rows_touched.load(Ordering::SeqCst)
    }

    /// Every committed row, ordered by tree id then `lft`
    pub async fn all_nodes(&self) -> Vec<TreeNode> {
        let nodes = self.nodes.lock().await;
        sorted(nodes.values().cloned().collect())
    }
}

impl Default for InMemoryTreeStore {
    fn default() -> Self {
        Self::new()
    }
}

fn sorted(mut nodes: Vec<TreeNode>) -> Vec<TreeNode> {
    nodes.sort_by(|a, b| a.tree_id.cmp(&b.tree_id).then(a.lft.cmp(&b.lft)));
    nodes
}

fn tree_of(table: &NodeTable, tree_id: &str) -> Vec<TreeNode> {
    sorted(
        table
            .values()
            .filter(|node| node.tree_id == tree_id)
            .cloned()
            .collect(),
    )
}

/// Node with the smallest `lft` of every tree
fn roots_of<'a>(nodes: impl Iterator<Item = &'a TreeNode>) -> Vec<TreeNode> {
    let mut roots: HashMap<&str, &TreeNode> = HashMap::new();
    for node in nodes {
        let entry = roots.entry(node.tree_id.as_str()).or_insert(node);
        if node.lft < entry.lft {
            *entry = node;
        }
    }
    sorted(roots.into_values().cloned().collect())
}

#[async_trait]
impl TreeReader for InMemoryTreeStore {
    async fn find_node(&self, id: &str) -> Result<Option<TreeNode>, DatabaseError> {
        let nodes = self.nodes.lock().await;
        Ok(nodes.get(id).cloned())
    }

    async fn find_tree(&self, tree_id: &str) -> Result<Vec<TreeNode>, DatabaseError> {
        let nodes = self.nodes.lock().await;
        Ok(tree_of(&nodes, tree_id))
    }

    async fn find_roots(&self) -> Result<Vec<TreeNode>, DatabaseError> {
        let nodes = self.nodes.lock().await;
        Ok(roots_of(nodes.values()))
    }
}

#[async_trait]
impl TreeStore for InMemoryTreeStore {
    async fn begin(&self) -> Result<Box<dyn TreeTransaction>, DatabaseError> {
        Ok(Box::new(InMemoryTransaction {
            nodes: self.nodes.clone(),
            writers: self.writers.clone(),
            claims: HashMap::new(),
            workspace: HashMap::new(),
            open: true,
            writes_before_failure: self.writes_before_failure.clone(),
            store_rows_touched: self.rows_touched.clone(),
            rows_touched: 0,
        }))
    }
}

/// Transaction over the in-memory table
///
/// Trees are claimed on first write: the transaction takes that tree's write
/// lock and copies its committed rows into `workspace`. Reads see the
/// workspace for claimed trees and committed rows for every other tree.
pub struct InMemoryTransaction {
    nodes: Arc<Mutex<NodeTable>>,
    writers: WriterLocks,
    /// Write locks held on claimed trees
    claims: HashMap<String, OwnedMutexGuard<()>>,
    /// Private copies of the claimed trees, keyed by tree id
    workspace: HashMap<String, NodeTable>,
    open: bool,
    writes_before_failure: Arc<AtomicUsize>,
    store_rows_touched: Arc<AtomicU64>,
    rows_touched: u64,
}

impl InMemoryTransaction {
    fn ensure_open(&self) -> Result<(), DatabaseError> {
        if !self.open {
            return Err(DatabaseError::transaction_failed(
                "transaction already finished",
            ));
        }
        Ok(())
    }

    /// Consume one unit of the injected write budget
    fn check_write(&self) -> Result<(), DatabaseError> {
        self.ensure_open()?;
        let outcome = self.writes_before_failure.fetch_update(
            Ordering::SeqCst,
            Ordering::SeqCst,
            |remaining| match remaining {
                NO_FAILURE => Some(NO_FAILURE),
                0 => None,
                n => Some(n - 1),
            },
        );

        match outcome {
            Ok(_) => Ok(()),
            Err(_) => Err(DatabaseError::transaction_failed(
                "injected write failure",
            )),
        }
    }

    fn writer_lock(&self, tree_id: &str) -> Arc<Mutex<()>> {
        let mut writers = self.writers.lock().unwrap_or_else(|e| e.into_inner());
        writers.retain(|_, lock| Arc::strong_count(lock) > 1);
        writers
            .entry(tree_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Private copy of `tree_id`, claiming the tree on first use
    async fn claim(&mut self, tree_id: &str) -> &mut NodeTable {
        if !self.claims.contains_key(tree_id) {
            let lock = self.writer_lock(tree_id);
            let guard = lock.lock_owned().await;
            let rows: NodeTable = {
                let nodes = self.nodes.lock().await;
                nodes
                    .values()
                    .filter(|node| node.tree_id == tree_id)
                    .map(|node| (node.id.clone(), node.clone()))
                    .collect()
            };
            self.claims.insert(tree_id.to_string(), guard);
            self.workspace.insert(tree_id.to_string(), rows);
        }
        self.workspace.entry(tree_id.to_string()).or_default()
    }

    fn workspace_node(&self, id: &str) -> Option<&TreeNode> {
        self.workspace.values().find_map(|rows| rows.get(id))
    }

    /// Close the transaction and release every claimed tree
    fn finish(&mut self) {
        self.open = false;
        self.workspace.clear();
        self.claims.clear();
    }
}

#[async_trait]
impl TreeReader for InMemoryTransaction {
    async fn find_node(&self, id: &str) -> Result<Option<TreeNode>, DatabaseError> {
        if let Some(node) = self.workspace_node(id) {
            return Ok(Some(node.clone()));
        }
        let nodes = self.nodes.lock().await;
        Ok(nodes
            .get(id)
            .filter(|node| !self.claims.contains_key(&node.tree_id))
            .cloned())
    }

    async fn find_tree(&self, tree_id: &str) -> Result<Vec<TreeNode>, DatabaseError> {
        if let Some(rows) = self.workspace.get(tree_id) {
            return Ok(sorted(rows.values().cloned().collect()));
        }
        let nodes = self.nodes.lock().await;
        Ok(tree_of(&nodes, tree_id))
    }

    async fn find_roots(&self) -> Result<Vec<TreeNode>, DatabaseError> {
        let nodes = self.nodes.lock().await;
        let committed = nodes
            .values()
            .filter(|node| !self.claims.contains_key(&node.tree_id));
        let claimed = self.workspace.values().flat_map(|rows| rows.values());
        Ok(roots_of(committed.chain(claimed)))
    }
}

#[async_trait]
impl TreeTransaction for InMemoryTransaction {
    async fn shift_range(
        &mut self,
        tree_id: &str,
        lower: i64,
        upper: Option<i64>,
        delta: i64,
    ) -> Result<u64, DatabaseError> {
        self.check_write()?;

        let mut touched = 0;
        for node in self.claim(tree_id).await.values_mut() {
            let mut changed = false;
            if in_range(node.lft, lower, upper) {
                node.lft += delta;
                changed = true;
            }
            if in_range(node.rgt, lower, upper) {
                node.rgt += delta;
                changed = true;
            }
            if changed {
                touched += 1;
            }
        }

        self.rows_touched += touched;
        Ok(touched)
    }

    async fn update_range(
        &mut self,
        tree_id: &str,
        lower: i64,
        upper: Option<i64>,
        update: &RangeUpdate,
    ) -> Result<u64, DatabaseError> {
        self.check_write()?;

        let source = self.claim(tree_id).await;
        let mut selected = Vec::new();
        for node in source.values_mut() {
            if in_range(node.lft, lower, upper) {
                node.depth += update.depth_delta;
                selected.push(node.id.clone());
            }
        }
        let touched = selected.len() as u64;

        if let Some(new_tree) = update.tree_id.as_deref().filter(|t| *t != tree_id) {
            let moved: Vec<TreeNode> = selected.iter().filter_map(|id| source.remove(id)).collect();
            let target = self.claim(new_tree).await;
            for mut node in moved {
                node.tree_id = new_tree.to_string();
                target.insert(node.id.clone(), node);
            }
        }

        self.rows_touched += touched;
        Ok(touched)
    }

    async fn update_node(
        &mut self,
        id: &str,
        update: &NodeFieldsUpdate,
    ) -> Result<(), DatabaseError> {
        self.check_write()?;

        let mut node = self
            .find_node(id)
            .await?
            .ok_or_else(|| DatabaseError::row_not_found(id))?;
        let source = node.tree_id.clone();
        update.apply_to(&mut node);

        if node.tree_id != source {
            self.claim(&source).await.remove(id);
        }
        let target = node.tree_id.clone();
        self.claim(&target).await.insert(id.to_string(), node);
        self.rows_touched += 1;
        Ok(())
    }

    async fn insert_node(&mut self, node: &TreeNode) -> Result<(), DatabaseError> {
        self.check_write()?;

        if self.find_node(&node.id).await?.is_some() {
            return Err(DatabaseError::duplicate_row(&node.id));
        }
        self.claim(&node.tree_id)
            .await
            .insert(node.id.clone(), node.clone());
        self.rows_touched += 1;
        Ok(())
    }

    async fn commit(&mut self) -> Result<(), DatabaseError> {
        self.ensure_open()?;
        {
            let mut nodes = self.nodes.lock().await;
            nodes.retain(|_, node| !self.claims.contains_key(&node.tree_id));
            for (_, rows) in self.workspace.drain() {
                nodes.extend(rows);
            }
        }
        self.finish();
        self.store_rows_touched
            .fetch_add(self.rows_touched, Ordering::SeqCst);
        Ok(())
    }

    async fn rollback(&mut self) -> Result<(), DatabaseError> {
        self.ensure_open()?;
        self.finish();
        Ok(())
    }
}

impl Drop for InMemoryTransaction {
    fn drop(&mut self) {
        if self.open && !self.claims.is_empty() {
            tracing::warn!("In-memory transaction dropped without commit; rolling back");
        }
    }
}

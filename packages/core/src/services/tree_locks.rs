//! Per-tree locks
//!
//! Moves touching the same tree id are serialized; moves on unrelated trees
//! proceed in parallel. A move that spans two trees (root promotion, cross-tree
//! move) holds both locks, always acquired in sorted tree-id order so two such
//! moves can never deadlock.

use std::collections::HashMap;
use std::sync::{Arc, Mutex as StdMutex};
use tokio::sync::{Mutex, OwnedMutexGuard};

/// Registry of one async mutex per tree id
///
/// Entries are created on demand and pruned once nobody holds or waits on them.
#[derive(Debug, Default)]
pub struct TreeLockRegistry {
    locks: StdMutex<HashMap<String, Arc<Mutex<()>>>>,
}

/// Locks held for the duration of one move
#[derive(Debug)]
pub struct TreeLockGuard {
    tree_ids: Vec<String>,
    _guards: Vec<OwnedMutexGuard<()>>,
}

impl TreeLockGuard {
    /// Sorted, deduplicated tree ids covered by this guard
    pub fn tree_ids(&self) -> &[String] {
        &self.tree_ids
    }

    pub fn covers(&self, tree_id: &str) -> bool {
        self.tree_ids.iter().any(|held| held == tree_id)
    }
}

impl TreeLockRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Lock every tree in `tree_ids` (duplicates are ignored)
    pub async fn lock<I, S>(&self, tree_ids: I) -> TreeLockGuard
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut tree_ids: Vec<String> = tree_ids.into_iter().map(Into::into).collect();
        tree_ids.sort();
        tree_ids.dedup();

        let mutexes: Vec<Arc<Mutex<()>>> = {
            let mut locks = self.locks.lock().unwrap_or_else(|e| e.into_inner());
            locks.retain(|_, mutex| Arc::strong_count(mutex) > 1);
            tree_ids
                .iter()
                .map(|tree_id| locks.entry(tree_id.clone()).or_default().clone())
                .collect()
        };

        let mut guards = Vec::with_capacity(mutexes.len());
        for mutex in mutexes {
            guards.push(mutex.lock_owned().await);
        }

        tracing::debug!("Locked trees {:?}", tree_ids);

        TreeLockGuard {
            tree_ids,
            _guards: guards,
        }
    }

    /// Number of tree ids currently tracked
    pub fn tracked(&self) -> usize {
        self.locks.lock().unwrap_or_else(|e| e.into_inner()).len()
    }
}

//! Concurrent Move Tests
//!
//! Many moves issued at once against one engine must serialize per tree and
//! leave every tree valid; moves on unrelated trees must all land.

#[cfg(test)]
mod concurrent_move_tests {
    use anyhow::Result;
    use futures::future::join_all;
    use nestable_core::db::{InMemoryTreeStore, LibsqlTreeStore, TreeReader, TreeStore};
    use nestable_core::models::{validate_forest, TreeNode};
    use nestable_core::services::{MoveEngine, MovePositioning, TreeError};
    use nestable_core::NestedSetColumns;
    use std::sync::Arc;
    use tempfile::TempDir;
    use tokio::time::{timeout, Duration};

    /// A root with `leaves` direct children
    fn flat_tree(tree_id: &str, leaves: i64) -> Vec<TreeNode> {
        let mut nodes = vec![TreeNode::with_bounds(
            format!("{}-root", tree_id),
            tree_id,
            1,
            2 * leaves + 2,
            0,
        )];
        for i in 0..leaves {
            nodes.push(TreeNode::with_bounds(
                format!("{}-{}", tree_id, i),
                tree_id,
                2 + 2 * i,
                3 + 2 * i,
                1,
            ));
        }
        nodes
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_moves_in_one_tree() -> Result<()> {
        let store = InMemoryTreeStore::with_nodes(flat_tree("t", 10));
        let engine = Arc::new(MoveEngine::builder().with_store(store.clone()).build()?);

        let tasks = (0..10).map(|i| {
            let engine = engine.clone();
            tokio::spawn(async move {
                let node = format!("t-{}", i);
                let positioning = if i % 2 == 0 {
                    MovePositioning::under(format!("t-{}", (i + 1) % 10))
                } else {
                    MovePositioning::before(format!("t-{}", (i + 3) % 10))
                };
                engine.move_node(&node, positioning).await
            })
        });

        for outcome in join_all(tasks).await {
            match outcome? {
                Ok(_) | Err(TreeError::CircularReference { .. }) => {}
                Err(e) => return Err(e.into()),
            }
        }

        let nodes = store.all_nodes().await;
        assert_eq!(nodes.len(), 11);
        validate_forest(&nodes)?;
        Ok(())
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_moves_on_different_trees_all_land() -> Result<()> {
        let mut nodes = Vec::new();
        for tree in 0..4 {
            nodes.extend(flat_tree(&format!("tree{}", tree), 3));
        }
        let store = InMemoryTreeStore::with_nodes(nodes);
        let engine = Arc::new(MoveEngine::builder().with_store(store.clone()).build()?);

        let tasks = (0..4).map(|tree| {
            let engine = engine.clone();
            tokio::spawn(async move {
                engine
                    .move_node(
                        &format!("tree{}-0", tree),
                        MovePositioning::after(format!("tree{}-2", tree)),
                    )
                    .await
            })
        });

        for outcome in join_all(tasks).await {
            let state = outcome??;
            assert_eq!((state.lft, state.rgt, state.depth), (6, 7, 1));
        }
        validate_forest(&store.all_nodes().await)?;
        Ok(())
    }

    #[tokio::test]
    async fn test_move_completes_while_other_tree_transaction_is_open() -> Result<()> {
        let mut nodes = flat_tree("t1", 2);
        nodes.extend(flat_tree("t2", 2));
        let store = InMemoryTreeStore::with_nodes(nodes);
        let engine = MoveEngine::builder().with_store(store.clone()).build()?;

        let mut open_tx = store.begin().await?;
        open_tx.shift_range("t1", 1, None, 100).await?;

        let state = timeout(
            Duration::from_millis(500),
            engine.move_node("t2-1", MovePositioning::before("t2-0")),
        )
        .await??;
        assert_eq!((state.lft, state.rgt), (2, 3));

        // the open transaction's writes stay invisible until it finishes
        assert_eq!(store.find_node("t1-root").await?.map(|n| n.lft), Some(1));
        open_tx.rollback().await?;
        drop(open_tx);

        validate_forest(&store.all_nodes().await)?;
        Ok(())
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_promotions_and_returns() -> Result<()> {
        let temp_dir = TempDir::new()?;
        let store =
            LibsqlTreeStore::new(temp_dir.path().join("tree.db"), NestedSetColumns::default())
                .await?;
        store.seed(&flat_tree("t", 6)).await?;
        let engine = Arc::new(MoveEngine::builder().with_store(store.clone()).build()?);

        let promotions = (0..6).map(|i| {
            let engine = engine.clone();
            tokio::spawn(async move {
                engine
                    .move_node(&format!("t-{}", i), MovePositioning::root())
                    .await
            })
        });
        for outcome in join_all(promotions).await {
            let state = outcome??;
            assert_eq!((state.lft, state.rgt, state.depth), (1, 2, 0));
        }
        assert_eq!(store.find_roots().await?.len(), 7);

        let returns = (0..6).map(|i| {
            let engine = engine.clone();
            tokio::spawn(async move {
                engine
                    .move_node(&format!("t-{}", i), MovePositioning::under("t-root"))
                    .await
            })
        });
        for outcome in join_all(returns).await {
            outcome??;
        }

        let tree = store.find_tree("t").await?;
        assert_eq!(tree.len(), 7);
        assert_eq!(tree[0].rgt, 14);
        validate_forest(&tree)?;
        Ok(())
    }
}

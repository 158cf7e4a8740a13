//! Tree Presentation Tests
//!
//! Builds trees through the engine, renders them through the service and
//! checks that flattening the records gives back the stored structure.

#[cfg(test)]
mod tree_presentation_tests {
    use anyhow::Result;
    use nestable_core::db::{InMemoryTreeStore, LibsqlTreeStore, TreeEvent, TreeReader};
    use nestable_core::models::{NewTreeNode, PresentationRecord, TreeNode};
    use nestable_core::services::{
        MoveEngine, MovePositioning, RootFilter, TreeSerializer, TreeService,
    };
    use nestable_core::{NestedSetColumns, TreeConfig};
    use serde_json::json;
    use std::sync::Arc;
    use tokio::time::{timeout, Duration};

    async fn outline(service: &TreeService) -> Result<()> {
        let chapter = service
            .insert_node(NewTreeNode::with_id("book", "Book"), MovePositioning::root())
            .await?;
        for (id, name) in [("ch1", "Chapter 1"), ("ch2", "Chapter 2")] {
            service
                .insert_node(
                    NewTreeNode::with_id(id, name),
                    MovePositioning::under(chapter.id.clone()),
                )
                .await?;
        }
        service
            .insert_node(NewTreeNode::with_id("s1", "Section 1"), MovePositioning::under("ch1"))
            .await?;
        service
            .insert_node(NewTreeNode::with_id("s2", "Section 2"), MovePositioning::after("s1"))
            .await?;
        Ok(())
    }

    /// Preorder `(id, parent)` pairs read straight from the store
    async fn stored_pairs(service: &TreeService, tree_id: &str) -> Result<Vec<(String, Option<String>)>> {
        let store = service.engine().store();
        let mut pairs = Vec::new();
        for node in store.find_tree(tree_id).await? {
            let parent = store.find_ancestors(&node.id, Some(1)).await?.pop();
            pairs.push((node.id, parent.map(|p| p.id)));
        }
        Ok(pairs)
    }

    #[tokio::test]
    async fn test_round_trip_after_inserts_and_moves() -> Result<()> {
        let engine = MoveEngine::builder()
            .with_store(InMemoryTreeStore::new())
            .build()?;
        let service = TreeService::new(engine);
        outline(&service).await?;

        // Chapter 2 first, then Section 2 moved into it
        service.move_node("ch2", MovePositioning::before("ch1")).await?;
        service.move_node("s2", MovePositioning::under("ch2")).await?;

        let book = service.get_node("book").await?;
        let records = service.present(&RootFilter::Tree(book.tree_id.clone())).await?;
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].subtree_size(), 5);

        let contents: Vec<&str> = records[0].children.iter().map(|r| r.content.as_str()).collect();
        assert_eq!(contents, vec!["Chapter 2", "Chapter 1"]);

        let flat = PresentationRecord::flatten(&records);
        assert_eq!(flat, stored_pairs(&service, &book.tree_id).await?);
        Ok(())
    }

    #[tokio::test]
    async fn test_label_attribute_from_config() -> Result<()> {
        let store = LibsqlTreeStore::new_in_memory(NestedSetColumns::default()).await?;
        store
            .seed(&[
                TreeNode::with_bounds("root", "t", 1, 4, 0)
                    .with_properties(json!({"title": "Index"})),
                TreeNode::with_bounds("leaf", "t", 2, 3, 1).with_properties(json!({"title": 42})),
            ])
            .await?;

        let engine = MoveEngine::builder()
            .with_store(store)
            .with_config(TreeConfig {
                label_attribute: "title".to_string(),
                ..Default::default()
            })
            .build()?;
        let service = TreeService::new(engine);

        let records = service.present(&RootFilter::TopLevel).await?;
        assert_eq!(records[0].content, "Index");
        assert_eq!(records[0].children[0].content, "42");
        Ok(())
    }

    #[tokio::test]
    async fn test_custom_label_closure() -> Result<()> {
        let engine = Arc::new(
            MoveEngine::builder()
                .with_store(InMemoryTreeStore::new())
                .build()?,
        );
        let serializer =
            TreeSerializer::new(|node: &TreeNode| format!("{} (depth {})", node.name, node.depth));
        let service = TreeService::with_serializer(engine, serializer);
        outline(&service).await?;

        let records = service.present(&RootFilter::ChildrenOf("ch1".into())).await?;
        let contents: Vec<&str> = records.iter().map(|r| r.content.as_str()).collect();
        assert_eq!(contents, vec!["Section 1 (depth 2)", "Section 2 (depth 2)"]);
        Ok(())
    }

    #[tokio::test]
    async fn test_events_follow_committed_operations() -> Result<()> {
        let engine = MoveEngine::builder()
            .with_store(InMemoryTreeStore::new())
            .build()?;
        let service = TreeService::new(engine);
        let mut rx = service.subscribe();

        outline(&service).await?;
        for _ in 0..5 {
            let event = timeout(Duration::from_secs(1), rx.recv()).await??;
            assert_eq!(event.event_type(), "node:created");
        }

        service.move_node("s1", MovePositioning::root()).await?;
        let event = timeout(Duration::from_secs(1), rx.recv()).await??;
        match event {
            TreeEvent::NodeMoved {
                state, from_tree, to_tree,
            } => {
                assert_eq!(state.id, "s1");
                assert_eq!(state.depth, 0);
                assert_ne!(from_tree, to_tree);
            }
            other => panic!("Expected NodeMoved event, got {:?}", other),
        }
        Ok(())
    }
}

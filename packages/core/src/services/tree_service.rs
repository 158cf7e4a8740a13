//! Tree Service
//!
//! Facade over the move engine and the tree serializer for callers that want
//! one entry point: move and insert, read neighbors of a node, render a tree
//! and check a stored tree against the nested-set invariants.

use crate::db::{TreeEvent, TreeReader, TreeStore};
use crate::models::{validate_forest, MoveResponse, NewTreeNode, PresentationRecord, TreeNode};
use crate::services::{MoveEngine, MovePositioning, RootFilter, TreeError, TreeSerializer};
use std::sync::Arc;
use tokio::sync::broadcast;

/// Tree operations over one store
///
/// # Examples
///
/// ```rust,no_run
/// use nestable_core::db::InMemoryTreeStore;
/// use nestable_core::services::{MoveEngine, MovePositioning, RootFilter, TreeService};
///
/// # async fn example() -> Result<(), nestable_core::services::TreeError> {
/// let engine = MoveEngine::builder()
///     .with_store(InMemoryTreeStore::new())
///     .build()?;
/// let service = TreeService::new(engine);
///
/// let response = service.move_node("b", MovePositioning::under("a")).await?;
/// println!("{}", serde_json::to_string(&response).unwrap_or_default());
///
/// let records = service.present(&RootFilter::TopLevel).await?;
/// # Ok(())
/// # }
/// ```
pub struct TreeService {
    engine: Arc<MoveEngine>,
    serializer: TreeSerializer,
}

impl TreeService {
    /// Service labelling nodes by the configured `label_attribute`
    pub fn new(engine: MoveEngine) -> Self {
        let serializer = TreeSerializer::by_attribute(engine.config().label_attribute.clone());
        Self::with_serializer(Arc::new(engine), serializer)
    }

    pub fn with_serializer(engine: Arc<MoveEngine>, serializer: TreeSerializer) -> Self {
        Self { engine, serializer }
    }

    pub fn engine(&self) -> &Arc<MoveEngine> {
        &self.engine
    }

    fn store(&self) -> &Arc<dyn TreeStore> {
        self.engine.store()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<TreeEvent> {
        self.engine.subscribe()
    }

    /// Move a node and wrap the result for the caller to encode
    pub async fn move_node(
        &self,
        node_id: &str,
        positioning: MovePositioning,
    ) -> Result<MoveResponse, TreeError> {
        let state = self.engine.move_node(node_id, positioning).await?;
        Ok(MoveResponse::from(state))
    }

    pub async fn insert_node(
        &self,
        node: NewTreeNode,
        positioning: MovePositioning,
    ) -> Result<TreeNode, TreeError> {
        self.engine.insert_node(node, positioning).await
    }

    /// Get a node by id, failing with `NodeNotFound` when absent
    pub async fn get_node(&self, id: &str) -> Result<TreeNode, TreeError> {
        self.store()
            .find_node(id)
            .await?
            .ok_or_else(|| TreeError::node_not_found(id))
    }

    /// Descendants of `parent_id` up to `depth_limit` levels down
    pub async fn children(
        &self,
        parent_id: &str,
        depth_limit: Option<i64>,
    ) -> Result<Vec<TreeNode>, TreeError> {
        self.get_node(parent_id).await?;
        Ok(self.store().find_children(parent_id, depth_limit).await?)
    }

    /// Ancestors of `id` up to `depth_limit` levels up, nearest last
    pub async fn ancestors(
        &self,
        id: &str,
        depth_limit: Option<i64>,
    ) -> Result<Vec<TreeNode>, TreeError> {
        self.get_node(id).await?;
        Ok(self.store().find_ancestors(id, depth_limit).await?)
    }

    /// Load the nodes `filter` needs and render them as nested records
    pub async fn present(&self, filter: &RootFilter) -> Result<Vec<PresentationRecord>, TreeError> {
        let nodes = match filter {
            RootFilter::Tree(tree_id) => self.store().find_tree(tree_id).await?,
            RootFilter::ChildrenOf(id) => {
                let parent = self.get_node(id).await?;
                let mut nodes = vec![parent];
                nodes.extend(self.store().find_children(id, None).await?);
                nodes
            }
            RootFilter::TopLevel => {
                let mut nodes = Vec::new();
                for root in self.store().find_roots().await? {
                    nodes.extend(self.store().find_tree(&root.tree_id).await?);
                }
                nodes
            }
        };

        Ok(self.serializer.serialize(&nodes, filter))
    }

    /// Check one stored tree against the nested-set invariants
    pub async fn verify_tree(&self, tree_id: &str) -> Result<(), TreeError> {
        let nodes = self.store().find_tree(tree_id).await?;
        validate_forest(&nodes)?;
        Ok(())
    }

    /// Node removal is not provided; this never touches storage
    pub async fn delete_node(&self, id: &str) -> Result<(), TreeError> {
        tracing::warn!("Rejected delete of node {}", id);
        Err(TreeError::unsupported(format!(
            "deleting nodes is not supported (node {})",
            id
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::InMemoryTreeStore;

    fn service(store: &InMemoryTreeStore) -> TreeService {
        let engine = MoveEngine::builder()
            .with_store(store.clone())
            .build()
            .unwrap();
        TreeService::new(engine)
    }

    fn sample_store() -> InMemoryTreeStore {
        InMemoryTreeStore::with_nodes(vec![
            TreeNode::with_bounds("root", "t", 1, 10, 0).named("Root"),
            TreeNode::with_bounds("a", "t", 2, 3, 1).named("A"),
            TreeNode::with_bounds("b", "t", 4, 7, 1).named("B"),
            TreeNode::with_bounds("c", "t", 5, 6, 2).named("C"),
            TreeNode::with_bounds("d", "t", 8, 9, 1).named("D"),
        ])
    }

    #[tokio::test]
    async fn test_move_response_shape() {
        let store = sample_store();
        let service = service(&store);

        let response = service
            .move_node("c", MovePositioning::under("a"))
            .await
            .unwrap();
        let json = serde_json::to_value(&response).unwrap();
        assert_eq!(json["updated"]["id"], "c");
        assert_eq!(json["updated"]["depth"], 2);
        assert_eq!(json["updated"]["lft"], 3);
        assert_eq!(json["updated"]["rgt"], 4);
        service.verify_tree("t").await.unwrap();
    }

    #[tokio::test]
    async fn test_present_children_of() {
        let store = sample_store();
        let service = service(&store);

        let records = service
            .present(&RootFilter::ChildrenOf("b".into()))
            .await
            .unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].content, "C");

        let all = service.present(&RootFilter::TopLevel).await.unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].subtree_size(), 5);
    }

    #[tokio::test]
    async fn test_reads_report_missing_nodes() {
        let service = service(&sample_store());
        assert!(matches!(
            service.get_node("missing").await,
            Err(TreeError::NodeNotFound { .. })
        ));
        assert!(matches!(
            service.children("missing", None).await,
            Err(TreeError::NodeNotFound { .. })
        ));

        let ancestors = service.ancestors("c", None).await.unwrap();
        let ids: Vec<&str> = ancestors.iter().map(|n| n.id.as_str()).collect();
        assert_eq!(ids, vec!["root", "b"]);
    }

    #[tokio::test]
    async fn test_delete_is_unsupported() {
        let store = sample_store();
        let service = service(&store);

        let err = service.delete_node("a").await.unwrap_err();
        assert!(matches!(err, TreeError::Unsupported(_)));
        assert!(store.find_node("a").await.unwrap().is_some());
        assert_eq!(store.rows_touched(), 0);
    }

    #[tokio::test]
    async fn test_verify_tree_reports_corruption() {
        let store = InMemoryTreeStore::with_nodes(vec![
            TreeNode::with_bounds("root", "t", 1, 6, 0),
            TreeNode::with_bounds("x", "t", 2, 4, 1),
        ]);
        let service = service(&store);
        assert!(matches!(
            service.verify_tree("t").await,
            Err(TreeError::ValidationFailed(_))
        ));
    }
}

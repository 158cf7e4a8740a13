//! Tree Serializer
//!
//! Turns a flat collection of nested-set rows into nested presentation
//! records. Parent/child links are recovered from the intervals alone: a
//! node's parent is the nearest node of the same tree in the collection whose
//! interval contains it. Siblings keep the order they had in the input.

use crate::models::{PresentationRecord, TreeNode};
use std::collections::HashMap;

/// Presentation port: computes the display label of a node
pub trait LabelExtractor: Send + Sync {
    fn label(&self, node: &TreeNode) -> String;
}

impl<F> LabelExtractor for F
where
    F: Fn(&TreeNode) -> String + Send + Sync,
{
    fn label(&self, node: &TreeNode) -> String {
        self(node)
    }
}

/// Label read from a node attribute
///
/// `"name"` and `"id"` read the row fields; any other name reads a key of
/// `properties`. Strings are used as-is, other scalars are rendered as JSON,
/// and a missing or null value gives an empty label.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttributeLabel(pub String);

impl LabelExtractor for AttributeLabel {
    fn label(&self, node: &TreeNode) -> String {
        match self.0.as_str() {
            "name" => node.name.clone(),
            "id" => node.id.clone(),
            key => match node.properties.get(key) {
                None | Some(serde_json::Value::Null) => String::new(),
                Some(serde_json::Value::String(value)) => value.clone(),
                Some(other) => other.to_string(),
            },
        }
    }
}

/// Which nodes become the top-level records
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RootFilter {
    /// Every node without a parent in the collection
    TopLevel,
    /// The direct children of this node
    ChildrenOf(String),
    /// The top-level nodes of one tree
    Tree(String),
}

pub struct TreeSerializer {
    label: Box<dyn LabelExtractor>,
}

impl Default for TreeSerializer {
    fn default() -> Self {
        Self::by_attribute("name")
    }
}

impl TreeSerializer {
    pub fn new(label: impl LabelExtractor + 'static) -> Self {
        Self {
            label: Box::new(label),
        }
    }

    pub fn by_attribute(attribute: impl Into<String>) -> Self {
        Self::new(AttributeLabel(attribute.into()))
    }

    /// Build nested records for the nodes selected by `filter`
    pub fn serialize(&self, nodes: &[TreeNode], filter: &RootFilter) -> Vec<PresentationRecord> {
        let parents = parent_index(nodes);

        let mut children: HashMap<usize, Vec<usize>> = HashMap::new();
        let mut top_level = Vec::new();
        for (index, parent) in parents.iter().enumerate() {
            match parent {
                Some(parent) => children.entry(*parent).or_default().push(index),
                None => top_level.push(index),
            }
        }

        let selected: Vec<usize> = match filter {
            RootFilter::TopLevel => top_level,
            RootFilter::Tree(tree_id) => top_level
                .into_iter()
                .filter(|index| &nodes[*index].tree_id == tree_id)
                .collect(),
            RootFilter::ChildrenOf(id) => nodes
                .iter()
                .position(|node| &node.id == id)
                .and_then(|parent| children.get(&parent).cloned())
                .unwrap_or_default(),
        };

        selected
            .into_iter()
            .map(|index| self.record(index, nodes, &children))
            .collect()
    }

    fn record(
        &self,
        index: usize,
        nodes: &[TreeNode],
        children: &HashMap<usize, Vec<usize>>,
    ) -> PresentationRecord {
        let node = &nodes[index];
        PresentationRecord {
            id: node.id.clone(),
            content: self.label.label(node),
            children: children
                .get(&index)
                .map(|kids| {
                    kids.iter()
                        .map(|child| self.record(*child, nodes, children))
                        .collect()
                })
                .unwrap_or_default(),
        }
    }
}

/// For every node, the index of its nearest container in `nodes`
fn parent_index(nodes: &[TreeNode]) -> Vec<Option<usize>> {
    let mut by_tree: HashMap<&str, Vec<usize>> = HashMap::new();
    for (index, node) in nodes.iter().enumerate() {
        by_tree.entry(node.tree_id.as_str()).or_default().push(index);
    }

    let mut parents = vec![None; nodes.len()];
    for (_, mut indices) in by_tree {
        indices.sort_by_key(|index| nodes[*index].lft);

        let mut open: Vec<usize> = Vec::new();
        for index in indices {
            let node = &nodes[index];
            while open
                .last()
                .is_some_and(|top| !nodes[*top].contains(node))
            {
                open.pop();
            }
            parents[index] = open.last().copied();
            open.push(index);
        }
    }
    parents
}

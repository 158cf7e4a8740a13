//! Presentation records produced by the tree serializer

use serde::{Deserialize, Serialize};

/// Display-ready view of one node and its ordered children
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PresentationRecord {
    pub id: String,
    pub content: String,
    pub children: Vec<PresentationRecord>,
}

impl PresentationRecord {
    /// Total number of records in this subtree, including itself
    pub fn subtree_size(&self) -> usize {
        1 + self.children.iter().map(PresentationRecord::subtree_size).sum::<usize>()
    }

    pub fn is_leaf(&self) -> bool {
        self.children.is_empty()
    }

    /// Preorder `(id, parent_id)` pairs for a sequence of top-level records
    pub fn flatten(records: &[PresentationRecord]) -> Vec<(String, Option<String>)> {
        let mut out = Vec::new();
        for record in records {
            record.flatten_into(None, &mut out);
        }
        out
    }

    fn flatten_into(&self, parent: Option<&str>, out: &mut Vec<(String, Option<String>)>) {
        out.push((self.id.clone(), parent.map(str::to_string)));
        for child in &self.children {
            child.flatten_into(Some(&self.id), out);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn leaf(id: &str) -> PresentationRecord {
        PresentationRecord {
            id: id.to_string(),
            content: id.to_uppercase(),
            children: Vec::new(),
        }
    }

    #[test]
    fn test_flatten_is_preorder_with_parents() {
        let records = vec![
            PresentationRecord {
                id: "root".to_string(),
                content: "Root".to_string(),
                children: vec![
                    leaf("a"),
                    PresentationRecord {
                        children: vec![leaf("c")],
                        ..leaf("b")
                    },
                ],
            },
            leaf("solo"),
        ];

        let flat = PresentationRecord::flatten(&records);
        let ids: Vec<&str> = flat.iter().map(|(id, _)| id.as_str()).collect();
        assert_eq!(ids, vec!["root", "a", "b", "c", "solo"]);
        assert_eq!(flat[3].1.as_deref(), Some("b"));
        assert_eq!(flat[4].1, None);
        assert_eq!(records[0].subtree_size(), 4);
    }
}

use std::collections::{HashMap, HashSet};

use crate::models::{NodeId, SyncError};

/// Parent links of every node of one learning path.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct NodeTree {
    parents: HashMap<NodeId, Option<NodeId>>,
}

impl NodeTree {
    pub fn from_links<I>(links: I) -> Self
    where
        I: IntoIterator<Item = (NodeId, Option<NodeId>)>,
    {
        Self {
            parents: links.into_iter().collect(),
        }
    }

    pub fn contains(&self, node_id: &str) -> bool {
        self.parents.contains_key(node_id)
    }

    pub fn parent_of(&self, node_id: &str) -> Option<&NodeId> {
        self.parents.get(node_id).and_then(|p| p.as_ref())
    }

    /// Check that `node_id` may hang below `new_parent` without leaving the
    /// path or closing a cycle.
    pub fn validate_reparent(&self, node_id: &str, new_parent: Option<&str>) -> Result<(), SyncError> {
        if !self.contains(node_id) {
            return Err(SyncError::Validation(format!(
                "Node '{}' not found in this learning path",
                node_id
            )));
        }
        let Some(parent_id) = new_parent else {
            return Ok(());
        };
        if parent_id == node_id {
            return Err(SyncError::Validation("A node cannot be its own parent".to_string()));
        }
        if !self.contains(parent_id) {
            return Err(SyncError::Validation(
                "Parent node not found in the same learning path".to_string(),
            ));
        }

        // Walk up from the new parent; meeting the node means it is a descendant.
        let mut seen: HashSet<&str> = HashSet::new();
        let mut cursor = Some(parent_id);
        while let Some(current) = cursor {
            if current == node_id {
                return Err(SyncError::Validation(format!(
                    "Moving node '{}' under '{}' would create a cycle",
                    node_id, parent_id
                )));
            }
            if !seen.insert(current) {
                return Err(SyncError::Validation(
                    "Learning path tree already contains a cycle".to_string(),
                ));
            }
            cursor = self.parent_of(current).map(|p| p.as_str());
        }
        Ok(())
    }

    /// The node and everything below it, parents before children.
    pub fn subtree(&self, node_id: &str) -> Vec<NodeId> {
        if !self.contains(node_id) {
            return Vec::new();
        }
        let mut children: HashMap<&str, Vec<&str>> = HashMap::new();
        for (child, parent) in &self.parents {
            if let Some(parent) = parent {
                children.entry(parent.as_str()).or_default().push(child.as_str());
            }
        }

        let mut out = vec![node_id.to_string()];
        let mut seen: HashSet<&str> = HashSet::from([node_id]);
        let mut i = 0;
        while i < out.len() {
            let current = out[i].clone();
            if let Some(kids) = children.get(current.as_str()) {
                let mut kids = kids.clone();
                kids.sort_unstable();
                for kid in kids {
                    if seen.insert(kid) {
                        out.push(kid.to_string());
                    }
                }
            }
            i += 1;
        }
        out
    }
}

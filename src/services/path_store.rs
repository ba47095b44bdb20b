use std::collections::HashMap;

use futures_util::future::BoxFuture;
use futures_util::FutureExt;
use tokio::sync::RwLock;
use tracing::info;
use uuid::Uuid;

use crate::models::{AccessFacts, Collaborator, Node, NodeDraft, NodeId, NodePatch, Role, SyncError};
use crate::ws::tree::NodeTree;

/// Storage of learning paths, owned by the persistence layer.
pub trait PathStore: Send + Sync {
    /// Owner, visibility and collaborators of a path; `None` if it does not exist.
    fn get_access_facts<'a>(&'a self, path_id: &'a str) -> BoxFuture<'a, Result<Option<AccessFacts>, SyncError>>;

    /// Parent links of every node of the path.
    fn get_node_tree<'a>(&'a self, path_id: &'a str) -> BoxFuture<'a, Result<NodeTree, SyncError>>;

    /// Apply a validated patch; `None` if the node is not part of the path.
    fn apply_node_patch<'a>(
        &'a self,
        path_id: &'a str,
        node_id: &'a str,
        patch: &'a NodePatch,
    ) -> BoxFuture<'a, Result<Option<Node>, SyncError>>;

    fn create_node<'a>(
        &'a self,
        path_id: &'a str,
        parent_id: Option<&'a str>,
        draft: &'a NodeDraft,
    ) -> BoxFuture<'a, Result<Node, SyncError>>;

    /// Delete a node and its subtree; returns how many nodes were removed.
    fn delete_node<'a>(&'a self, path_id: &'a str, node_id: &'a str) -> BoxFuture<'a, Result<u64, SyncError>>;
}

#[derive(Clone, Debug)]
struct PathRecord {
    facts: AccessFacts,
    nodes: HashMap<NodeId, Node>,
}

/// Process-local store used by tests and by development setups without a database.
#[derive(Default)]
pub struct InMemoryPathStore {
    paths: RwLock<HashMap<String, PathRecord>>,
}

impl InMemoryPathStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert_path(&self, path_id: &str, owner_id: &str, is_public: bool) {
        let record = PathRecord {
            facts: AccessFacts {
                owner_id: owner_id.to_string(),
                is_public,
                collaborators: Vec::new(),
            },
            nodes: HashMap::new(),
        };
        self.paths.write().await.insert(path_id.to_string(), record);
    }

    /// Add, change or (with `None`) remove a collaborator.
    pub async fn set_collaborator(&self, path_id: &str, user_id: &str, role: Option<Role>) {
        let mut paths = self.paths.write().await;
        if let Some(record) = paths.get_mut(path_id) {
            record.facts.collaborators.retain(|c| c.user_id != user_id);
            if let Some(role) = role {
                record.facts.collaborators.push(Collaborator {
                    user_id: user_id.to_string(),
                    role,
                });
            }
        }
    }

    pub async fn set_public(&self, path_id: &str, is_public: bool) {
        if let Some(record) = self.paths.write().await.get_mut(path_id) {
            record.facts.is_public = is_public;
        }
    }

    pub async fn insert_node(&self, path_id: &str, node_id: &str, parent_id: Option<&str>) {
        let mut paths = self.paths.write().await;
        if let Some(record) = paths.get_mut(path_id) {
            let order = record.nodes.len() as i32;
            record.nodes.insert(
                node_id.to_string(),
                Node {
                    id: node_id.to_string(),
                    path_id: path_id.to_string(),
                    parent_id: parent_id.map(|p| p.to_string()),
                    title: format!("Node {}", node_id),
                    description: None,
                    status: Default::default(),
                    color: None,
                    order,
                    position_x: None,
                    position_y: None,
                    estimated_time: None,
                    notification_date: None,
                },
            );
        }
    }

    pub async fn node(&self, path_id: &str, node_id: &str) -> Option<Node> {
        self.paths
            .read()
            .await
            .get(path_id)
            .and_then(|record| record.nodes.get(node_id).cloned())
    }
}

impl PathStore for InMemoryPathStore {
    fn get_access_facts<'a>(&'a self, path_id: &'a str) -> BoxFuture<'a, Result<Option<AccessFacts>, SyncError>> {
        async move { Ok(self.paths.read().await.get(path_id).map(|r| r.facts.clone())) }.boxed()
    }

    fn get_node_tree<'a>(&'a self, path_id: &'a str) -> BoxFuture<'a, Result<NodeTree, SyncError>> {
        async move {
            let paths = self.paths.read().await;
            let tree = paths
                .get(path_id)
                .map(|record| {
                    NodeTree::from_links(record.nodes.values().map(|n| (n.id.clone(), n.parent_id.clone())))
                })
                .unwrap_or_default();
            Ok(tree)
        }
        .boxed()
    }

    fn apply_node_patch<'a>(
        &'a self,
        path_id: &'a str,
        node_id: &'a str,
        patch: &'a NodePatch,
    ) -> BoxFuture<'a, Result<Option<Node>, SyncError>> {
        async move {
            let mut paths = self.paths.write().await;
            let Some(node) = paths.get_mut(path_id).and_then(|r| r.nodes.get_mut(node_id)) else {
                return Ok(None);
            };
            node.apply(patch);
            Ok(Some(node.clone()))
        }
        .boxed()
    }

    fn create_node<'a>(
        &'a self,
        path_id: &'a str,
        parent_id: Option<&'a str>,
        draft: &'a NodeDraft,
    ) -> BoxFuture<'a, Result<Node, SyncError>> {
        async move {
            let mut paths = self.paths.write().await;
            let record = paths
                .get_mut(path_id)
                .ok_or_else(|| SyncError::Storage(format!("Learning path '{}' not found", path_id)))?;
            let node = Node {
                id: Uuid::new_v4().to_string(),
                path_id: path_id.to_string(),
                parent_id: parent_id.map(|p| p.to_string()),
                title: draft.title.clone(),
                description: draft.description.clone(),
                status: draft.status,
                color: draft.color.clone(),
                order: draft.order.unwrap_or(record.nodes.len() as i32),
                position_x: draft.position_x,
                position_y: draft.position_y,
                estimated_time: draft.estimated_time,
                notification_date: None,
            };
            record.nodes.insert(node.id.clone(), node.clone());
            info!("Node {} created in path {}", node.id, path_id);
            Ok(node)
        }
        .boxed()
    }

    fn delete_node<'a>(&'a self, path_id: &'a str, node_id: &'a str) -> BoxFuture<'a, Result<u64, SyncError>> {
        async move {
            let mut paths = self.paths.write().await;
            let Some(record) = paths.get_mut(path_id) else {
                return Ok(0);
            };
            let tree = NodeTree::from_links(record.nodes.values().map(|n| (n.id.clone(), n.parent_id.clone())));
            let doomed = tree.subtree(node_id);
            for id in &doomed {
                record.nodes.remove(id);
            }
            Ok(doomed.len() as u64)
        }
        .boxed()
    }
}

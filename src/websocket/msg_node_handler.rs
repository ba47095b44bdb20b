use tracing::{debug, info};

use crate::models::{
    NodeCreateMessage, NodeCreatedMessage, NodeDeleteMessage, NodeDeletedMessage, NodeUpdateMessage,
    NodeUpdatedMessage, OutboundEvent, SyncError,
};
use crate::ws::connection::Connection;
use crate::ws::sequencer::EditTicket;
use super::router::{EventRouter, Outcome};

fn node_not_found(node_id: &str) -> SyncError {
    SyncError::Validation(format!("Node '{}' not found in this learning path", node_id))
}

/// Handle node-update.
///
/// Each field of the patch is a last-writer-wins register ordered by server
/// receipt. Fields already overwritten by a later receipt are dropped; a patch
/// left empty is accepted silently. Reparenting is checked against the current
/// tree before anything is stored.
pub async fn handle_node_update(
    router: &EventRouter,
    conn: &Connection,
    msg: NodeUpdateMessage,
    ticket: &EditTicket<'_>,
) -> Result<Outcome, SyncError> {
    let receipt = ticket.receipt();
    let mut patch = msg.updates.normalize()?;

    let mut versions = ticket.lock().await;
    let stale = versions.discard_stale(&msg.node_id, &mut patch, receipt.seq);
    if !stale.is_empty() {
        debug!(node_id = %msg.node_id, seq = receipt.seq, fields = ?stale, "Dropped superseded fields");
    }
    if patch.is_empty() {
        return Ok(Outcome::none());
    }

    if let Some(parent_id) = &patch.parent_id {
        let tree = router.store.get_node_tree(&msg.path_id).await?;
        tree.validate_reparent(&msg.node_id, parent_id.as_deref())?;
    }

    router
        .store
        .apply_node_patch(&msg.path_id, &msg.node_id, &patch)
        .await?
        .ok_or_else(|| node_not_found(&msg.node_id))?;
    versions.commit(&msg.node_id, &patch, receipt.seq);
    info!(
        user_id = %conn.user().id,
        path_id = %msg.path_id,
        node_id = %msg.node_id,
        fields = ?patch.fields(),
        "Node updated"
    );

    let event = OutboundEvent::NodeUpdated(NodeUpdatedMessage {
        node_id: msg.node_id,
        updates: patch,
        updated_by: conn.user().user_ref(),
        timestamp: receipt.at,
    });
    Ok(Outcome::to_room(event).ordered(versions))
}

/// Handle node-create. The parent must belong to the same path.
pub async fn handle_node_create(
    router: &EventRouter,
    conn: &Connection,
    msg: NodeCreateMessage,
    ticket: &EditTicket<'_>,
) -> Result<Outcome, SyncError> {
    let receipt = ticket.receipt();
    let draft = msg.node.normalize()?;
    let parent_id = msg.parent_id.as_deref().map(str::trim).filter(|p| !p.is_empty());

    let versions = ticket.lock().await;
    if let Some(parent_id) = parent_id {
        let tree = router.store.get_node_tree(&msg.path_id).await?;
        if !tree.contains(parent_id) {
            return Err(SyncError::Validation(
                "Parent node not found in the same learning path".to_string(),
            ));
        }
    }

    let node = router.store.create_node(&msg.path_id, parent_id, &draft).await?;
    info!(user_id = %conn.user().id, path_id = %msg.path_id, node_id = %node.id, "Node created");

    let event = OutboundEvent::NodeCreated(NodeCreatedMessage {
        path_id: msg.path_id,
        node,
        created_by: conn.user().user_ref(),
        timestamp: receipt.at,
    });
    Ok(Outcome::to_room(event).ordered(versions))
}

/// Handle node-delete. The node goes with its whole subtree.
pub async fn handle_node_delete(
    router: &EventRouter,
    conn: &Connection,
    msg: NodeDeleteMessage,
    ticket: &EditTicket<'_>,
) -> Result<Outcome, SyncError> {
    let receipt = ticket.receipt();
    let mut versions = ticket.lock().await;
    let tree = router.store.get_node_tree(&msg.path_id).await?;
    if !tree.contains(&msg.node_id) {
        return Err(node_not_found(&msg.node_id));
    }
    let deleted_ids = tree.subtree(&msg.node_id);

    let removed = router.store.delete_node(&msg.path_id, &msg.node_id).await?;
    versions.forget_nodes(&deleted_ids);
    info!(
        user_id = %conn.user().id,
        path_id = %msg.path_id,
        node_id = %msg.node_id,
        removed = removed,
        "Node deleted"
    );

    let event = OutboundEvent::NodeDeleted(NodeDeletedMessage {
        path_id: msg.path_id,
        node_id: msg.node_id,
        deleted_ids,
        deleted_by: conn.user().user_ref(),
        timestamp: receipt.at,
    });
    Ok(Outcome::to_room(event).ordered(versions))
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::config::Config;
    use crate::models::{NodePatch, UserIdentity};
    use crate::services::auth_service::JwtVerifier;
    use crate::services::path_store::InMemoryPathStore;
    use crate::services::translate_service::UnconfiguredProvider;
    use crate::state::AppState;
    use tokio::sync::mpsc;

    fn retitle(title: &str) -> NodeUpdateMessage {
        NodeUpdateMessage {
            path_id: "P1".to_string(),
            node_id: "N1".to_string(),
            updates: NodePatch {
                title: Some(title.to_string()),
                ..Default::default()
            },
        }
    }

    #[tokio::test]
    async fn test_earlier_receipt_loses_to_applied_later_one() {
        let store = Arc::new(InMemoryPathStore::new());
        store.insert_path("P1", "alice", false).await;
        store.insert_node("P1", "N1", None).await;
        let state = AppState::new(
            Config::default(),
            store.clone(),
            Arc::new(JwtVerifier::new(None)),
            Arc::new(UnconfiguredProvider),
        );
        let (tx, _rx) = mpsc::unbounded_channel();
        let conn = Connection::new(UserIdentity::new("alice", "Alice"), tx);
        let router = &state.router;

        let first = router.sequencer.admit(Some("P1"));
        let second = router.sequencer.admit(Some("P1"));

        handle_node_update(router, &conn, retitle("Second title"), &second).await.unwrap();
        drop(second);
        // The superseded patch is dropped without an error
        handle_node_update(router, &conn, retitle("First title"), &first).await.unwrap();
        assert_eq!(store.node("P1", "N1").await.unwrap().title, "Second title");
        drop(first);
        assert_eq!(router.sequencer.tracked_paths(), 0);

        let third = router.sequencer.admit(Some("P1"));
        handle_node_update(router, &conn, retitle("Third title"), &third).await.unwrap();
        assert_eq!(store.node("P1", "N1").await.unwrap().title, "Third title");
    }
}

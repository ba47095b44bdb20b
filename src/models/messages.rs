use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::identity::{NodeId, PathId, UserRef};
use super::node::{Node, NodeDraft, NodePatch};

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
pub struct Position {
    pub x: f64,
    pub y: f64,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct NodeUpdateMessage {
    pub path_id: PathId,
    pub node_id: NodeId,
    pub updates: NodePatch,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct NodeCreateMessage {
    pub path_id: PathId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<NodeId>,
    pub node: NodeDraft,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct NodeDeleteMessage {
    pub path_id: PathId,
    pub node_id: NodeId,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct CursorUpdateMessage {
    pub path_id: PathId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub node_id: Option<NodeId>,
    pub position: Position,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct TranslateContentMessage {
    pub path_id: PathId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub node_id: Option<NodeId>,
    pub text: String,
    pub target_lang: String,
    #[serde(default)]
    pub context: String,
}

/// Events a client sends, framed as `{"event": ..., "data": ...}`.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(tag = "event", content = "data", rename_all = "kebab-case")]
pub enum InboundEvent {
    JoinPath(PathId),
    LeavePath(PathId),
    NodeUpdate(NodeUpdateMessage),
    NodeCreate(NodeCreateMessage),
    NodeDelete(NodeDeleteMessage),
    CursorUpdate(CursorUpdateMessage),
    TranslateContent(TranslateContentMessage),
    Ping,
}

impl InboundEvent {
    pub fn name(&self) -> &'static str {
        match self {
            InboundEvent::JoinPath(_) => "join-path",
            InboundEvent::LeavePath(_) => "leave-path",
            InboundEvent::NodeUpdate(_) => "node-update",
            InboundEvent::NodeCreate(_) => "node-create",
            InboundEvent::NodeDelete(_) => "node-delete",
            InboundEvent::CursorUpdate(_) => "cursor-update",
            InboundEvent::TranslateContent(_) => "translate-content",
            InboundEvent::Ping => "ping",
        }
    }

    /// The learning path this event targets, if any.
    pub fn path_id(&self) -> Option<&str> {
        match self {
            InboundEvent::JoinPath(path_id) | InboundEvent::LeavePath(path_id) => Some(path_id),
            InboundEvent::NodeUpdate(m) => Some(&m.path_id),
            InboundEvent::NodeCreate(m) => Some(&m.path_id),
            InboundEvent::NodeDelete(m) => Some(&m.path_id),
            InboundEvent::CursorUpdate(m) => Some(&m.path_id),
            InboundEvent::TranslateContent(m) => Some(&m.path_id),
            InboundEvent::Ping => None,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PathJoinedMessage {
    pub path_id: PathId,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct UserPathMessage {
    pub user: UserRef,
    pub path_id: PathId,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct UserDisconnectedMessage {
    pub user: UserRef,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct NodeUpdatedMessage {
    pub node_id: NodeId,
    pub updates: NodePatch,
    pub updated_by: UserRef,
    pub timestamp: DateTime<Utc>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct NodeCreatedMessage {
    pub path_id: PathId,
    pub node: Node,
    pub created_by: UserRef,
    pub timestamp: DateTime<Utc>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct NodeDeletedMessage {
    pub path_id: PathId,
    pub node_id: NodeId,
    pub deleted_ids: Vec<NodeId>,
    pub deleted_by: UserRef,
    pub timestamp: DateTime<Utc>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CursorMovedMessage {
    pub user_id: String,
    pub user_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub node_id: Option<NodeId>,
    pub position: Position,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TranslationResultMessage {
    pub original_text: String,
    pub translated_text: String,
    pub source_lang: String,
    pub target_lang: String,
    pub context: String,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct ErrorMessage {
    pub message: String,
    pub code: String,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct PongMessage {
    pub date: String,
}

/// Events the server emits, framed like [`InboundEvent`].
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(tag = "event", content = "data", rename_all = "kebab-case")]
pub enum OutboundEvent {
    PathJoined(PathJoinedMessage),
    UserJoinedPath(UserPathMessage),
    UserLeftPath(UserPathMessage),
    UserDisconnected(UserDisconnectedMessage),
    NodeUpdated(NodeUpdatedMessage),
    NodeCreated(NodeCreatedMessage),
    NodeDeleted(NodeDeletedMessage),
    CursorMoved(CursorMovedMessage),
    TranslationResult(TranslationResultMessage),
    Error(ErrorMessage),
    Pong(PongMessage),
}

impl OutboundEvent {
    pub fn error(message: impl Into<String>, code: &str) -> Self {
        OutboundEvent::Error(ErrorMessage {
            message: message.into(),
            code: code.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::NodeStatus;
    use serde_json::json;

    #[test]
    fn test_join_path_takes_a_bare_string() {
        let event: InboundEvent =
            serde_json::from_value(json!({ "event": "join-path", "data": "P1" })).unwrap();
        assert_eq!(event, InboundEvent::JoinPath("P1".to_string()));
        assert_eq!(event.path_id(), Some("P1"));
    }

    #[test]
    fn test_node_update_payload_shape() {
        let event: InboundEvent = serde_json::from_value(json!({
            "event": "node-update",
            "data": { "pathId": "P1", "nodeId": "N1", "updates": { "status": "COMPLETED" } }
        }))
        .unwrap();
        match event {
            InboundEvent::NodeUpdate(m) => {
                assert_eq!(m.node_id, "N1");
                assert_eq!(m.updates.status, Some(NodeStatus::Completed));
            }
            other => panic!("unexpected event {:?}", other),
        }
    }

    #[test]
    fn test_ping_needs_no_data() {
        let event: InboundEvent = serde_json::from_value(json!({ "event": "ping" })).unwrap();
        assert_eq!(event, InboundEvent::Ping);
    }

    #[test]
    fn test_unknown_event_is_rejected() {
        let result: Result<InboundEvent, _> =
            serde_json::from_value(json!({ "event": "drop-table", "data": {} }));
        assert!(result.is_err());
    }

    #[test]
    fn test_node_updated_wire_format() {
        let timestamp = DateTime::parse_from_rfc3339("2026-01-02T03:04:05Z")
            .unwrap()
            .with_timezone(&Utc);
        let event = OutboundEvent::NodeUpdated(NodeUpdatedMessage {
            node_id: "N1".to_string(),
            updates: NodePatch {
                status: Some(NodeStatus::Completed),
                ..Default::default()
            },
            updated_by: UserRef {
                id: "bob".to_string(),
                name: "Bob".to_string(),
            },
            timestamp,
        });
        assert_eq!(
            serde_json::to_value(&event).unwrap(),
            json!({
                "event": "node-updated",
                "data": {
                    "nodeId": "N1",
                    "updates": { "status": "COMPLETED" },
                    "updatedBy": { "id": "bob", "name": "Bob" },
                    "timestamp": "2026-01-02T03:04:05Z"
                }
            })
        );
    }

    #[test]
    fn test_cursor_moved_omits_missing_node() {
        let event = OutboundEvent::CursorMoved(CursorMovedMessage {
            user_id: "alice".to_string(),
            user_name: "Alice".to_string(),
            node_id: None,
            position: Position { x: 1.5, y: 2.0 },
        });
        assert_eq!(
            serde_json::to_value(&event).unwrap(),
            json!({
                "event": "cursor-moved",
                "data": { "userId": "alice", "userName": "Alice", "position": { "x": 1.5, "y": 2.0 } }
            })
        );
    }
}

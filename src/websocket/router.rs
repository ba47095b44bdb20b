use std::sync::Arc;

use tokio::sync::OwnedMutexGuard;
use tracing::{debug, info, warn};

use crate::models::{AccessDecision, Capability, InboundEvent, OutboundEvent, Role, SyncError};
use crate::services::path_store::PathStore;
use crate::services::translate_service::TextProvider;
use crate::ws::access::AccessResolver;
use crate::ws::connection::Connection;
use crate::ws::room::{LeaveOutcome, RoomManager};
use crate::ws::sequencer::{EditSequencer, FieldVersions};
use crate::ws::session::SessionStore;

use super::msg_cursor_handler::handle_cursor_update;
use super::msg_node_handler::{handle_node_create, handle_node_delete, handle_node_update};
use super::msg_ping_handler::handle_ping;
use super::msg_room_handler::{handle_join_path, handle_leave_path};
use super::msg_translate_handler::handle_translate_content;

/// Who receives the room event an inbound event produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FanOut {
    Originator,
    /// Every member except the originator.
    Peers,
    /// Every member, the originator included even when not joined.
    Room,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EventPolicy {
    /// Required on the event's path before any handler runs.
    pub capability: Option<Capability>,
    pub fan_out: FanOut,
}

/// Authorization and fan-out of each inbound event.
///
/// Join and leave presence (`user-joined-path`, `user-left-path`) is emitted
/// by the room manager under its lock.
pub fn policy(event: &InboundEvent) -> EventPolicy {
    let (capability, fan_out) = match event {
        InboundEvent::JoinPath(_) => (Some(Capability::View), FanOut::Originator),
        InboundEvent::LeavePath(_) => (None, FanOut::Peers),
        InboundEvent::NodeUpdate(_) => (Some(Capability::Edit), FanOut::Peers),
        InboundEvent::NodeCreate(_) => (Some(Capability::Edit), FanOut::Room),
        InboundEvent::NodeDelete(_) => (Some(Capability::Edit), FanOut::Peers),
        InboundEvent::CursorUpdate(_) => (Some(Capability::View), FanOut::Peers),
        InboundEvent::TranslateContent(_) => (Some(Capability::View), FanOut::Originator),
        InboundEvent::Ping => (None, FanOut::Originator),
    };
    EventPolicy { capability, fan_out }
}

/// Message sent instead of the details of a storage or provider failure.
fn failure_message(event: &InboundEvent) -> &'static str {
    match event {
        InboundEvent::JoinPath(_) => "Failed to join path",
        InboundEvent::LeavePath(_) => "Failed to leave path",
        InboundEvent::NodeUpdate(_) => "Failed to update node",
        InboundEvent::NodeCreate(_) => "Failed to create node",
        InboundEvent::NodeDelete(_) => "Failed to delete node",
        InboundEvent::CursorUpdate(_) => "Failed to update cursor",
        InboundEvent::TranslateContent(_) => "Translation failed",
        InboundEvent::Ping => "Ping failed",
    }
}

fn denial_message(capability: Capability) -> &'static str {
    match capability {
        Capability::View => "Access denied to this learning path",
        Capability::Edit => "You do not have edit access to this learning path",
        Capability::ManageCollaborators => "You do not have permission to manage collaborators",
    }
}

/// What a handler produced: replies for the originator, at most one room
/// event, and optionally the path's write guard.
#[derive(Default)]
pub struct Outcome {
    replies: Vec<OutboundEvent>,
    room_event: Option<OutboundEvent>,
    // Released only after fan-out, so members see writes in receipt order
    order: Option<OwnedMutexGuard<FieldVersions>>,
}

impl Outcome {
    pub fn none() -> Self {
        Self::default()
    }

    pub fn reply(event: OutboundEvent) -> Self {
        Self {
            replies: vec![event],
            ..Self::default()
        }
    }

    pub fn to_room(event: OutboundEvent) -> Self {
        Self {
            room_event: Some(event),
            ..Self::default()
        }
    }

    pub fn and_reply(mut self, event: OutboundEvent) -> Self {
        self.replies.push(event);
        self
    }

    pub fn ordered(mut self, guard: OwnedMutexGuard<FieldVersions>) -> Self {
        self.order = Some(guard);
        self
    }
}

/// Dispatches inbound events: authorize, handle, fan out.
pub struct EventRouter {
    pub(crate) sessions: Arc<SessionStore>,
    pub(crate) rooms: Arc<RoomManager>,
    pub(crate) access: Arc<AccessResolver>,
    pub(crate) store: Arc<dyn PathStore>,
    pub(crate) provider: Arc<dyn TextProvider>,
    pub(crate) sequencer: Arc<EditSequencer>,
}

impl EventRouter {
    pub fn new(
        sessions: Arc<SessionStore>,
        rooms: Arc<RoomManager>,
        access: Arc<AccessResolver>,
        store: Arc<dyn PathStore>,
        provider: Arc<dyn TextProvider>,
        sequencer: Arc<EditSequencer>,
    ) -> Self {
        Self {
            sessions,
            rooms,
            access,
            store,
            provider,
            sequencer,
        }
    }

    /// Handle one inbound event of `conn`. Failures reach the originator only.
    pub async fn dispatch(&self, conn: &Connection, event: InboundEvent) {
        let ticket = self.sequencer.admit(event.path_id());
        self.sessions.touch(&conn.id()).await;

        let name = event.name();
        let failure = failure_message(&event);
        let policy = policy(&event);
        let path_id = event.path_id().map(str::to_string);
        debug!(connection_id = %conn.id(), event = name, seq = ticket.receipt().seq, "Event received");

        if let (Some(capability), Some(path_id)) = (policy.capability, path_id.as_deref()) {
            if let Err(e) = self.require(conn, path_id, capability).await {
                self.reject(conn, name, failure, e);
                return;
            }
        }

        let result = match event {
            InboundEvent::JoinPath(path_id) => handle_join_path(self, conn, path_id).await,
            InboundEvent::LeavePath(path_id) => handle_leave_path(self, conn, path_id).await,
            InboundEvent::NodeUpdate(msg) => handle_node_update(self, conn, msg, &ticket).await,
            InboundEvent::NodeCreate(msg) => handle_node_create(self, conn, msg, &ticket).await,
            InboundEvent::NodeDelete(msg) => handle_node_delete(self, conn, msg, &ticket).await,
            InboundEvent::CursorUpdate(msg) => handle_cursor_update(self, conn, msg).await,
            InboundEvent::TranslateContent(msg) => handle_translate_content(self, conn, msg).await,
            InboundEvent::Ping => handle_ping(conn).await,
        };

        match result {
            Ok(outcome) => self.deliver(conn, path_id.as_deref(), policy.fan_out, outcome).await,
            Err(e) => self.reject(conn, name, failure, e),
        }
    }

    /// Report an unparseable frame to its sender.
    pub fn reject_malformed(&self, conn: &Connection, detail: &str) {
        warn!(connection_id = %conn.id(), "Malformed message: {}", detail);
        conn.send(OutboundEvent::error("Invalid message format", "validation_failed"));
    }

    async fn require(&self, conn: &Connection, path_id: &str, capability: Capability) -> Result<Role, SyncError> {
        match self.access.authorize(&conn.user().id, path_id, capability).await? {
            AccessDecision::Granted(role) => Ok(role),
            AccessDecision::Denied => {
                warn!(user_id = %conn.user().id, path_id = %path_id, capability = %capability, "Access denied");
                Err(SyncError::Authorization(denial_message(capability).to_string()))
            }
        }
    }

    fn reject(&self, conn: &Connection, event: &str, failure: &str, error: SyncError) {
        let message = if error.is_downstream() {
            warn!(connection_id = %conn.id(), event = event, "Event failed: {}", error);
            failure.to_string()
        } else {
            info!(connection_id = %conn.id(), event = event, code = error.code(), "Event rejected: {}", error.message());
            error.message().to_string()
        };
        conn.send(OutboundEvent::error(message, error.code()));
    }

    async fn deliver(&self, conn: &Connection, path_id: Option<&str>, fan_out: FanOut, outcome: Outcome) {
        let Outcome {
            replies,
            room_event,
            order,
        } = outcome;

        for reply in replies {
            conn.send(reply);
        }
        if let Some(event) = room_event {
            match (fan_out, path_id) {
                (FanOut::Peers, Some(path_id)) => {
                    self.rooms.broadcast(path_id, &event, Some(conn.id())).await;
                }
                (FanOut::Room, Some(path_id)) => {
                    self.rooms.broadcast(path_id, &event, Some(conn.id())).await;
                    conn.send(event);
                }
                _ => {
                    conn.send(event);
                }
            }
        }
        drop(order);
    }

    /// Re-check every member of a path after its access facts changed.
    /// Members without VIEW are removed; they get an `error` and the rest
    /// of the room `user-left-path`. A member whose access cannot be
    /// resolved stays joined and is counted as unchecked.
    pub async fn revalidate_path(&self, path_id: &str) -> Revalidation {
        self.access.invalidate(path_id).await;

        let mut report = Revalidation::default();
        for (connection_id, user) in self.rooms.members(path_id).await {
            let decision = match self.access.authorize(&user.id, path_id, Capability::View).await {
                Ok(decision) => decision,
                Err(e) => {
                    warn!(connection_id = %connection_id, user_id = %user.id, path_id = %path_id, "Could not recheck member: {}", e);
                    report.unchecked += 1;
                    continue;
                }
            };
            if decision.is_granted() {
                continue;
            }
            let LeaveOutcome::Left { .. } = self.rooms.leave(&connection_id, path_id).await else {
                continue;
            };
            if let Some(conn) = self.sessions.connection(&connection_id).await {
                conn.left_room(path_id).await;
                conn.send(OutboundEvent::error("Access to this learning path was revoked", "access_denied"));
            }
            info!(connection_id = %connection_id, user_id = %user.id, path_id = %path_id, "Room membership revoked");
            report.revoked += 1;
        }
        report
    }
}

/// Result of rechecking the members of one path.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Revalidation {
    pub revoked: usize,
    pub unchecked: usize,
}

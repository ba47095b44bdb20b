use std::collections::HashMap;

use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::models::{
    ConnectionId, CursorMovedMessage, OutboundEvent, PathId, UserDisconnectedMessage, UserIdentity,
    UserPathMessage,
};
use super::connection::{Connection, EventSender};

/// A connection subscribed to a room.
#[derive(Clone, Debug)]
pub struct RoomMember {
    pub user: UserIdentity,
    pub joined_at: DateTime<Utc>,
    tx: EventSender,
}

impl PartialEq for RoomMember {
    fn eq(&self, other: &Self) -> bool {
        self.user == other.user && self.joined_at == other.joined_at
    }
}

/// The set of connections subscribed to one learning path, plus the last
/// known cursor of each user in it.
#[derive(Debug, Default)]
struct Room {
    members: HashMap<ConnectionId, RoomMember>,
    cursors: HashMap<String, CursorMovedMessage>,
}

impl Room {
    /// Send to every member except `exclude`. Returns the number of queues reached.
    fn fan_out(&self, path_id: &str, event: &OutboundEvent, exclude: Option<ConnectionId>) -> usize {
        let mut delivered = 0;
        for (connection_id, member) in &self.members {
            if Some(*connection_id) == exclude {
                continue;
            }
            if member.tx.send(event.clone()).is_err() {
                debug!(connection_id = %connection_id, path_id = %path_id, "Member queue closed; skipping");
                continue;
            }
            delivered += 1;
        }
        delivered
    }

    fn has_user(&self, user_id: &str) -> bool {
        self.members.values().any(|m| m.user.id == user_id)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinOutcome {
    Joined,
    AlreadyMember,
    /// The connection started disconnecting; it was not added.
    Closing,
}

#[derive(Debug, Clone, PartialEq)]
pub enum LeaveOutcome {
    NotMember,
    Left { member: RoomMember, room_discarded: bool },
}

/// Path id -> room. Rooms are created on first join and discarded when the
/// last member leaves.
#[derive(Default)]
pub struct RoomManager {
    rooms: RwLock<HashMap<PathId, Room>>,
}

impl RoomManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribe a connection. Existing members are told with `user-joined-path`.
    pub async fn join(&self, conn: &Connection, path_id: &str) -> JoinOutcome {
        let mut rooms = self.rooms.write().await;
        // Checked under the lock so a concurrent disconnect cannot miss this room.
        if conn.is_closing() {
            return JoinOutcome::Closing;
        }

        let room = rooms.entry(path_id.to_string()).or_insert_with(|| {
            info!("Room created for path {}", path_id);
            Room::default()
        });
        if room.members.contains_key(&conn.id()) {
            return JoinOutcome::AlreadyMember;
        }

        let event = OutboundEvent::UserJoinedPath(UserPathMessage {
            user: conn.user().user_ref(),
            path_id: path_id.to_string(),
        });
        room.fan_out(path_id, &event, None);
        room.members.insert(
            conn.id(),
            RoomMember {
                user: conn.user().clone(),
                joined_at: Utc::now(),
                tx: conn.sender(),
            },
        );
        info!(connection_id = %conn.id(), user_id = %conn.user().id, path_id = %path_id, members = room.members.len(), "Joined room");
        JoinOutcome::Joined
    }

    /// Unsubscribe a connection. Remaining members get `user-left-path`.
    pub async fn leave(&self, connection_id: &ConnectionId, path_id: &str) -> LeaveOutcome {
        let mut rooms = self.rooms.write().await;
        let Some(room) = rooms.get_mut(path_id) else {
            return LeaveOutcome::NotMember;
        };
        let Some(member) = room.members.remove(connection_id) else {
            return LeaveOutcome::NotMember;
        };

        if !room.has_user(&member.user.id) {
            room.cursors.remove(&member.user.id);
        }
        let event = OutboundEvent::UserLeftPath(UserPathMessage {
            user: member.user.user_ref(),
            path_id: path_id.to_string(),
        });
        room.fan_out(path_id, &event, None);
        info!(connection_id = %connection_id, user_id = %member.user.id, path_id = %path_id, "Left room");

        let room_discarded = room.members.is_empty();
        if room_discarded {
            rooms.remove(path_id);
            info!("Room discarded for path {}", path_id);
        }
        LeaveOutcome::Left { member, room_discarded }
    }

    /// Drop a connection from every room it belongs to. Each room's remaining
    /// members get `user-disconnected`. Returns the affected paths and whether
    /// each room was discarded.
    pub async fn remove_connection(&self, connection_id: &ConnectionId) -> Vec<(PathId, bool)> {
        let mut rooms = self.rooms.write().await;
        let mut affected = Vec::new();

        for (path_id, room) in rooms.iter_mut() {
            let Some(member) = room.members.remove(connection_id) else {
                continue;
            };
            if !room.has_user(&member.user.id) {
                room.cursors.remove(&member.user.id);
            }
            let event = OutboundEvent::UserDisconnected(UserDisconnectedMessage {
                user: member.user.user_ref(),
            });
            room.fan_out(path_id, &event, None);
            affected.push((path_id.clone(), room.members.is_empty()));
        }

        for (path_id, discarded) in &affected {
            if *discarded {
                rooms.remove(path_id);
                info!("Room discarded for path {}", path_id);
            }
        }
        affected
    }

    /// Best-effort fan-out to the members of a room. A missing room reaches nobody.
    pub async fn broadcast(&self, path_id: &str, event: &OutboundEvent, exclude: Option<ConnectionId>) -> usize {
        let rooms = self.rooms.read().await;
        match rooms.get(path_id) {
            Some(room) => room.fan_out(path_id, event, exclude),
            None => 0,
        }
    }

    /// Remember the latest cursor of a user so late joiners can be shown it.
    pub async fn record_cursor(&self, path_id: &str, cursor: CursorMovedMessage) {
        if let Some(room) = self.rooms.write().await.get_mut(path_id) {
            if room.has_user(&cursor.user_id) {
                room.cursors.insert(cursor.user_id.clone(), cursor);
            }
        }
    }

    pub async fn cursors_except(&self, path_id: &str, user_id: &str) -> Vec<CursorMovedMessage> {
        let rooms = self.rooms.read().await;
        let Some(room) = rooms.get(path_id) else {
            return Vec::new();
        };
        let mut cursors: Vec<CursorMovedMessage> = room
            .cursors
            .values()
            .filter(|c| c.user_id != user_id)
            .cloned()
            .collect();
        cursors.sort_by(|a, b| a.user_id.cmp(&b.user_id));
        cursors
    }

    pub async fn members(&self, path_id: &str) -> Vec<(ConnectionId, UserIdentity)> {
        self.rooms
            .read()
            .await
            .get(path_id)
            .map(|room| {
                room.members
                    .iter()
                    .map(|(id, member)| (*id, member.user.clone()))
                    .collect()
            })
            .unwrap_or_default()
    }

    pub async fn room_count(&self) -> usize {
        self.rooms.read().await.len()
    }

    /// Subscriptions across all rooms.
    pub async fn member_count(&self) -> usize {
        self.rooms.read().await.values().map(|r| r.members.len()).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Position;
    use std::collections::HashSet;
    use std::sync::Arc;
    use tokio::sync::mpsc::{self, UnboundedReceiver};

    fn connect(user: &str) -> (Connection, UnboundedReceiver<OutboundEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Connection::new(UserIdentity::new(user, user.to_uppercase()), tx), rx)
    }

    fn drain(rx: &mut UnboundedReceiver<OutboundEvent>) -> Vec<OutboundEvent> {
        let mut out = Vec::new();
        while let Ok(event) = rx.try_recv() {
            out.push(event);
        }
        out
    }

    fn cursor(user: &str) -> CursorMovedMessage {
        CursorMovedMessage {
            user_id: user.to_string(),
            user_name: user.to_uppercase(),
            node_id: None,
            position: Position { x: 1.0, y: 2.0 },
        }
    }

    #[tokio::test]
    async fn test_join_notifies_existing_members_only() {
        let rooms = RoomManager::new();
        let (alice, mut alice_rx) = connect("alice");
        let (bob, mut bob_rx) = connect("bob");

        assert_eq!(rooms.join(&alice, "P1").await, JoinOutcome::Joined);
        assert!(drain(&mut alice_rx).is_empty());

        assert_eq!(rooms.join(&bob, "P1").await, JoinOutcome::Joined);
        let events = drain(&mut alice_rx);
        assert!(matches!(&events[..], [OutboundEvent::UserJoinedPath(m)] if m.user.id == "bob"));
        assert!(drain(&mut bob_rx).is_empty());
        assert_eq!(rooms.member_count().await, 2);
    }

    #[tokio::test]
    async fn test_join_twice_keeps_one_membership() {
        let rooms = RoomManager::new();
        let (alice, _rx) = connect("alice");
        rooms.join(&alice, "P1").await;
        assert_eq!(rooms.join(&alice, "P1").await, JoinOutcome::AlreadyMember);
        assert_eq!(rooms.member_count().await, 1);
    }

    #[tokio::test]
    async fn test_closing_connection_cannot_join() {
        let rooms = RoomManager::new();
        let (alice, _rx) = connect("alice");
        alice.begin_disconnect();
        assert_eq!(rooms.join(&alice, "P1").await, JoinOutcome::Closing);
        assert_eq!(rooms.room_count().await, 0);
    }

    #[tokio::test]
    async fn test_leave_discards_empty_room() {
        let rooms = RoomManager::new();
        let (alice, mut alice_rx) = connect("alice");
        let (bob, _bob_rx) = connect("bob");
        rooms.join(&alice, "P1").await;
        rooms.join(&bob, "P1").await;
        drain(&mut alice_rx);

        match rooms.leave(&bob.id(), "P1").await {
            LeaveOutcome::Left { room_discarded, .. } => assert!(!room_discarded),
            other => panic!("unexpected {:?}", other),
        }
        let events = drain(&mut alice_rx);
        assert!(matches!(&events[..], [OutboundEvent::UserLeftPath(m)] if m.user.id == "bob"));

        match rooms.leave(&alice.id(), "P1").await {
            LeaveOutcome::Left { room_discarded, .. } => assert!(room_discarded),
            other => panic!("unexpected {:?}", other),
        }
        assert_eq!(rooms.room_count().await, 0);
        assert_eq!(rooms.leave(&alice.id(), "P1").await, LeaveOutcome::NotMember);
    }

    #[tokio::test]
    async fn test_remove_connection_leaves_every_room() {
        let rooms = RoomManager::new();
        let (alice, mut alice_rx) = connect("alice");
        let (bob, _bob_rx) = connect("bob");
        rooms.join(&alice, "P1").await;
        rooms.join(&bob, "P1").await;
        rooms.join(&bob, "P2").await;
        drain(&mut alice_rx);

        let mut affected = rooms.remove_connection(&bob.id()).await;
        affected.sort();
        assert_eq!(affected, vec![("P1".to_string(), false), ("P2".to_string(), true)]);

        let events = drain(&mut alice_rx);
        assert!(matches!(&events[..], [OutboundEvent::UserDisconnected(m)] if m.user.id == "bob"));
        assert_eq!(rooms.room_count().await, 1);
        assert!(rooms.remove_connection(&bob.id()).await.is_empty());
    }

    #[tokio::test]
    async fn test_broadcast_excludes_originator() {
        let rooms = RoomManager::new();
        let (alice, mut alice_rx) = connect("alice");
        let (bob, mut bob_rx) = connect("bob");
        rooms.join(&alice, "P1").await;
        rooms.join(&bob, "P1").await;
        drain(&mut alice_rx);

        let event = OutboundEvent::CursorMoved(cursor("alice"));
        assert_eq!(rooms.broadcast("P1", &event, Some(alice.id())).await, 1);
        assert!(drain(&mut alice_rx).is_empty());
        assert_eq!(drain(&mut bob_rx), vec![event.clone()]);
        assert_eq!(rooms.broadcast("missing", &event, None).await, 0);
    }

    #[tokio::test]
    async fn test_broadcast_skips_closed_queues() {
        let rooms = RoomManager::new();
        let (alice, alice_rx) = connect("alice");
        let (bob, mut bob_rx) = connect("bob");
        rooms.join(&alice, "P1").await;
        rooms.join(&bob, "P1").await;
        drop(alice_rx);

        let event = OutboundEvent::error("x", "validation_failed");
        assert_eq!(rooms.broadcast("P1", &event, None).await, 1);
        assert_eq!(drain(&mut bob_rx), vec![event]);
    }

    #[tokio::test]
    async fn test_cursor_snapshot_forgets_departed_users() {
        let rooms = RoomManager::new();
        let (alice, _a) = connect("alice");
        let (bob, _b) = connect("bob");
        rooms.join(&alice, "P1").await;
        rooms.join(&bob, "P1").await;
        rooms.record_cursor("P1", cursor("alice")).await;
        rooms.record_cursor("P1", cursor("bob")).await;

        assert_eq!(rooms.cursors_except("P1", "bob").await, vec![cursor("alice")]);
        rooms.leave(&alice.id(), "P1").await;
        assert!(rooms.cursors_except("P1", "bob").await.is_empty());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_membership_changes_keep_the_room_consistent() {
        let rooms = Arc::new(RoomManager::new());
        let mut receivers = Vec::new();
        let mut conns = Vec::new();
        for i in 0..16 {
            // Two connections per user
            let (conn, rx) = connect(&format!("user{}", i / 2));
            conns.push(Arc::new(conn));
            receivers.push(rx);
        }

        let mut handles = Vec::new();
        for conn in &conns {
            for _ in 0..2 {
                let (rooms, conn) = (rooms.clone(), conn.clone());
                handles.push(tokio::spawn(async move { rooms.join(&conn, "P1").await }));
            }
        }
        let mut joined = 0;
        for handle in handles {
            if handle.await.unwrap() == JoinOutcome::Joined {
                joined += 1;
            }
        }
        assert_eq!(joined, conns.len());
        let members = rooms.members("P1").await;
        let distinct: HashSet<_> = members.iter().map(|(id, _)| *id).collect();
        assert_eq!(members.len(), conns.len());
        assert_eq!(distinct.len(), conns.len());

        let mut handles = Vec::new();
        for (i, conn) in conns.iter().enumerate() {
            let (rooms, conn) = (rooms.clone(), conn.clone());
            handles.push(tokio::spawn(async move {
                for round in 0..50 {
                    if (i + round) % 3 == 0 {
                        rooms.leave(&conn.id(), "P1").await;
                    } else {
                        rooms.join(&conn, "P1").await;
                    }
                    let ping = OutboundEvent::UserDisconnected(UserDisconnectedMessage {
                        user: conn.user().user_ref(),
                    });
                    rooms.broadcast("P1", &ping, Some(conn.id())).await;
                    tokio::task::yield_now().await;
                }
                rooms.remove_connection(&conn.id()).await;
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        assert_eq!(rooms.member_count().await, 0);
        assert_eq!(rooms.room_count().await, 0);
        assert!(rooms.members("P1").await.is_empty());
        drop(receivers);
    }
}

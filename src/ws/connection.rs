use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};

use chrono::{DateTime, Utc};
use tokio::sync::{mpsc, Mutex};
use tracing::debug;
use uuid::Uuid;

use crate::models::{ConnectionId, OutboundEvent, PathId, UserIdentity};

/// Outbound queue of one connection, drained by its writer task.
pub type EventSender = mpsc::UnboundedSender<OutboundEvent>;

/// Lifecycle states of an authenticated connection. A `Connection` only
/// exists once its credential has been verified.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Authenticated,
    Idle,
    InRoom,
    Disconnected,
}

#[derive(Debug)]
struct ConnectionInner {
    state: ConnectionState,
    rooms: HashSet<PathId>,
}

/// A live, authenticated transport connection.
#[derive(Debug)]
pub struct Connection {
    id: ConnectionId,
    user: UserIdentity,
    authenticated_at: DateTime<Utc>,
    tx: EventSender,
    inner: Mutex<ConnectionInner>,
    closing: AtomicBool,
}

impl Connection {
    pub(crate) fn new(user: UserIdentity, tx: EventSender) -> Self {
        Self {
            id: Uuid::new_v4(),
            user,
            authenticated_at: Utc::now(),
            tx,
            inner: Mutex::new(ConnectionInner {
                state: ConnectionState::Authenticated,
                rooms: HashSet::new(),
            }),
            closing: AtomicBool::new(false),
        }
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    pub fn user(&self) -> &UserIdentity {
        &self.user
    }

    pub fn authenticated_at(&self) -> DateTime<Utc> {
        self.authenticated_at
    }

    pub(crate) fn sender(&self) -> EventSender {
        self.tx.clone()
    }

    /// Queue an event for this connection. False once the writer is gone.
    pub fn send(&self, event: OutboundEvent) -> bool {
        if self.tx.send(event).is_err() {
            debug!(connection_id = %self.id, "Dropping event for closed connection");
            return false;
        }
        true
    }

    pub async fn state(&self) -> ConnectionState {
        self.inner.lock().await.state
    }

    /// The transport is attached and events may flow.
    pub async fn mark_ready(&self) {
        let mut inner = self.inner.lock().await;
        if inner.state == ConnectionState::Authenticated {
            inner.state = ConnectionState::Idle;
        }
    }

    pub async fn entered_room(&self, path_id: &str) {
        let mut inner = self.inner.lock().await;
        if inner.state == ConnectionState::Disconnected {
            return;
        }
        inner.rooms.insert(path_id.to_string());
        inner.state = ConnectionState::InRoom;
    }

    pub async fn left_room(&self, path_id: &str) {
        let mut inner = self.inner.lock().await;
        if inner.state == ConnectionState::Disconnected {
            return;
        }
        inner.rooms.remove(path_id);
        if inner.rooms.is_empty() {
            inner.state = ConnectionState::Idle;
        }
    }

    pub fn is_closing(&self) -> bool {
        self.closing.load(Ordering::SeqCst)
    }

    /// Claim the disconnect sequence. Only the first caller gets `true`.
    pub(crate) fn begin_disconnect(&self) -> bool {
        !self.closing.swap(true, Ordering::SeqCst)
    }

    pub(crate) async fn finish_disconnect(&self) {
        let mut inner = self.inner.lock().await;
        inner.rooms.clear();
        inner.state = ConnectionState::Disconnected;
    }
}

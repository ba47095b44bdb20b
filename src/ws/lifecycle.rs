use std::fmt;
use std::sync::Arc;

use tracing::{info, warn};

use crate::models::SyncError;
use crate::services::auth_service::TokenVerifier;
use super::connection::{Connection, EventSender};
use super::room::RoomManager;
use super::session::SessionStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisconnectReason {
    ClientClosed,
    TransportError,
    /// Nothing arrived from the client for too long.
    Unresponsive,
    /// The connection task ended without reaching its normal teardown.
    Aborted,
}

impl fmt::Display for DisconnectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DisconnectReason::ClientClosed => write!(f, "client closed"),
            DisconnectReason::TransportError => write!(f, "transport error"),
            DisconnectReason::Unresponsive => write!(f, "unresponsive"),
            DisconnectReason::Aborted => write!(f, "aborted"),
        }
    }
}

/// Admits connections and tears them down.
pub struct ConnectionLifecycle {
    verifier: Arc<dyn TokenVerifier>,
    sessions: Arc<SessionStore>,
    rooms: Arc<RoomManager>,
}

impl ConnectionLifecycle {
    pub fn new(
        verifier: Arc<dyn TokenVerifier>,
        sessions: Arc<SessionStore>,
        rooms: Arc<RoomManager>,
    ) -> Self {
        Self {
            verifier,
            sessions,
            rooms,
        }
    }

    /// Verify the handshake credential. No session exists unless this succeeds.
    pub async fn authenticate(&self, credential: Option<&str>, tx: EventSender) -> Result<Arc<Connection>, SyncError> {
        let token = credential
            .filter(|t| !t.is_empty())
            .ok_or_else(|| SyncError::Authentication("Authentication token required".to_string()))?;
        let user = self.verifier.verify(token)?;

        let conn = Arc::new(Connection::new(user, tx));
        self.sessions.create(conn.clone()).await;
        info!(connection_id = %conn.id(), user_id = %conn.user().id, "Connection authenticated");
        Ok(conn)
    }

    /// Release everything the connection holds. Safe to call more than once;
    /// only the first call does the work and returns `true`.
    pub async fn disconnect(&self, conn: &Connection, reason: DisconnectReason) -> bool {
        if !conn.begin_disconnect() {
            return false;
        }

        if self.sessions.deactivate(&conn.id()).await.is_none() {
            warn!(connection_id = %conn.id(), "Disconnect without a live session");
        }
        let affected = self.rooms.remove_connection(&conn.id()).await;
        conn.finish_disconnect().await;

        info!(
            connection_id = %conn.id(),
            user_id = %conn.user().id,
            rooms = affected.len(),
            rooms_discarded = affected.iter().filter(|(_, discarded)| *discarded).count(),
            reason = %reason,
            "Connection closed"
        );
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{OutboundEvent, UserIdentity};
    use crate::ws::connection::ConnectionState;
    use std::time::Duration;
    use tokio::sync::mpsc;

    struct StaticVerifier;

    impl TokenVerifier for StaticVerifier {
        fn verify(&self, token: &str) -> Result<UserIdentity, SyncError> {
            match token {
                "alice" => Ok(UserIdentity::new("alice", "Alice")),
                "bob" => Ok(UserIdentity::new("bob", "Bob")),
                _ => Err(SyncError::Authentication("Invalid token".to_string())),
            }
        }
    }

    fn lifecycle() -> (ConnectionLifecycle, Arc<SessionStore>, Arc<RoomManager>) {
        let sessions = Arc::new(SessionStore::new(Duration::from_secs(60)));
        let rooms = Arc::new(RoomManager::new());
        let lifecycle = ConnectionLifecycle::new(
            Arc::new(StaticVerifier),
            sessions.clone(),
            rooms.clone(),
        );
        (lifecycle, sessions, rooms)
    }

    #[tokio::test]
    async fn test_rejected_credentials_create_no_session() {
        let (lifecycle, sessions, _) = lifecycle();
        let (tx, _rx) = mpsc::unbounded_channel();
        assert!(matches!(
            lifecycle.authenticate(None, tx.clone()).await,
            Err(SyncError::Authentication(_))
        ));
        assert!(matches!(
            lifecycle.authenticate(Some(""), tx.clone()).await,
            Err(SyncError::Authentication(_))
        ));
        assert!(matches!(
            lifecycle.authenticate(Some("forged"), tx).await,
            Err(SyncError::Authentication(_))
        ));
        assert_eq!(sessions.active_count().await, 0);
    }

    #[tokio::test]
    async fn test_disconnect_runs_once_and_notifies_peers() {
        let (lifecycle, sessions, rooms) = lifecycle();
        let (tx, _rx) = mpsc::unbounded_channel();
        let alice = lifecycle.authenticate(Some("alice"), tx).await.unwrap();
        let (tx, mut bob_rx) = mpsc::unbounded_channel();
        let bob = lifecycle.authenticate(Some("bob"), tx).await.unwrap();

        rooms.join(&alice, "P1").await;
        rooms.join(&bob, "P1").await;
        alice.entered_room("P1").await;
        while bob_rx.try_recv().is_ok() {}

        assert!(lifecycle.disconnect(&alice, DisconnectReason::ClientClosed).await);
        assert!(!lifecycle.disconnect(&alice, DisconnectReason::TransportError).await);

        assert_eq!(sessions.active_count().await, 1);
        assert!(sessions.audit_record(&alice.id()).is_some());
        assert_eq!(rooms.member_count().await, 1);
        assert_eq!(alice.state().await, ConnectionState::Disconnected);

        let mut disconnected = 0;
        while let Ok(event) = bob_rx.try_recv() {
            if matches!(event, OutboundEvent::UserDisconnected(ref m) if m.user.id == "alice") {
                disconnected += 1;
            }
        }
        assert_eq!(disconnected, 1);
    }

    #[tokio::test]
    async fn test_concurrent_disconnects_release_once() {
        let (lifecycle, sessions, rooms) = lifecycle();
        let lifecycle = Arc::new(lifecycle);
        let (tx, _rx) = mpsc::unbounded_channel();
        let alice = lifecycle.authenticate(Some("alice"), tx).await.unwrap();
        rooms.join(&alice, "P1").await;

        let mut handles = Vec::new();
        for _ in 0..8 {
            let lifecycle = lifecycle.clone();
            let alice = alice.clone();
            handles.push(tokio::spawn(async move {
                lifecycle.disconnect(&alice, DisconnectReason::TransportError).await
            }));
        }
        let mut released = 0;
        for handle in handles {
            if handle.await.unwrap() {
                released += 1;
            }
        }
        assert_eq!(released, 1);
        assert_eq!(sessions.active_count().await, 0);
        assert_eq!(rooms.room_count().await, 0);
    }
}

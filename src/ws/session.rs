use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use moka::sync::Cache;
use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::models::{ConnectionId, UserIdentity};
use super::connection::Connection;

/// Live session: the connection handle plus its activity facts.
#[derive(Clone, Debug)]
pub struct Session {
    pub connection: Arc<Connection>,
    pub last_seen: DateTime<Utc>,
}

/// What remains of a session after disconnect.
#[derive(Clone, Debug)]
pub struct SessionRecord {
    pub connection_id: ConnectionId,
    pub user: UserIdentity,
    pub authenticated_at: DateTime<Utc>,
    /// Last client activity before the close.
    pub last_seen: DateTime<Utc>,
    pub closed_at: DateTime<Utc>,
}

/// One record per live connection. Closed sessions move to a
/// time-bounded audit cache keyed by connection id.
pub struct SessionStore {
    live: RwLock<HashMap<ConnectionId, Session>>,
    audit: Cache<ConnectionId, SessionRecord>,
}

impl SessionStore {
    pub fn new(audit_ttl: Duration) -> Self {
        let audit = Cache::builder()
            .max_capacity(100_000)
            .time_to_live(audit_ttl)
            .build();
        info!("Session store initialized");
        Self {
            live: RwLock::new(HashMap::new()),
            audit,
        }
    }

    pub async fn create(&self, connection: Arc<Connection>) {
        let connection_id = connection.id();
        debug!(connection_id = %connection_id, user_id = %connection.user().id, "Session created");
        let session = Session {
            connection,
            last_seen: Utc::now(),
        };
        self.live.write().await.insert(connection_id, session);
    }

    /// Record activity; false if the session is no longer live.
    pub async fn touch(&self, connection_id: &ConnectionId) -> bool {
        match self.live.write().await.get_mut(connection_id) {
            Some(session) => {
                session.last_seen = Utc::now();
                true
            }
            None => false,
        }
    }

    /// Move the session to the audit cache.
    /// Returns `None` when it was already closed.
    pub async fn deactivate(&self, connection_id: &ConnectionId) -> Option<SessionRecord> {
        let session = self.live.write().await.remove(connection_id)?;
        let record = SessionRecord {
            connection_id: *connection_id,
            user: session.connection.user().clone(),
            authenticated_at: session.connection.authenticated_at(),
            last_seen: session.last_seen,
            closed_at: Utc::now(),
        };
        self.audit.insert(*connection_id, record.clone());
        info!(
            connection_id = %connection_id,
            user_id = %record.user.id,
            connected_secs = (record.closed_at - record.authenticated_at).num_seconds(),
            idle_secs = (record.closed_at - record.last_seen).num_seconds(),
            "Session closed"
        );
        Some(record)
    }

    pub async fn get(&self, connection_id: &ConnectionId) -> Option<Session> {
        self.live.read().await.get(connection_id).cloned()
    }

    pub async fn connection(&self, connection_id: &ConnectionId) -> Option<Arc<Connection>> {
        self.live
            .read()
            .await
            .get(connection_id)
            .map(|s| s.connection.clone())
    }

    pub fn audit_record(&self, connection_id: &ConnectionId) -> Option<SessionRecord> {
        self.audit.get(connection_id)
    }

    pub async fn active_count(&self) -> usize {
        self.live.read().await.len()
    }

    pub fn audit_count(&self) -> u64 {
        self.audit.run_pending_tasks();
        self.audit.entry_count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;

    fn connection(user: &str) -> Arc<Connection> {
        let (tx, _rx) = mpsc::unbounded_channel();
        Arc::new(Connection::new(UserIdentity::new(user, user.to_uppercase()), tx))
    }

    #[tokio::test]
    async fn test_session_lifecycle() {
        let store = SessionStore::new(Duration::from_secs(60));
        let conn = connection("alice");
        let id = conn.id();
        store.create(conn).await;
        assert_eq!(store.active_count().await, 1);
        assert!(store.touch(&id).await);
        let last_seen = store.get(&id).await.unwrap().last_seen;

        let closed = store.deactivate(&id).await.unwrap();
        assert_eq!(closed.last_seen, last_seen);
        assert!(closed.closed_at >= last_seen);
        assert_eq!(store.active_count().await, 0);
        assert!(!store.touch(&id).await);
        assert!(store.connection(&id).await.is_none());

        let audit = store.audit_record(&id).unwrap();
        assert_eq!(audit.user.id, "alice");
        assert_eq!(audit.last_seen, last_seen);
    }

    #[tokio::test]
    async fn test_deactivate_twice_is_a_noop() {
        let store = SessionStore::new(Duration::from_secs(60));
        let conn = connection("alice");
        let id = conn.id();
        store.create(conn).await;
        assert!(store.deactivate(&id).await.is_some());
        assert!(store.deactivate(&id).await.is_none());
        assert_eq!(store.active_count().await, 0);
        assert_eq!(store.audit_count(), 1);
    }

    #[tokio::test]
    async fn test_audit_keeps_last_activity_not_close_time() {
        let store = SessionStore::new(Duration::from_secs(60));
        let conn = connection("alice");
        let id = conn.id();
        store.create(conn).await;
        let last_seen = store.get(&id).await.unwrap().last_seen;

        tokio::time::sleep(Duration::from_millis(20)).await;
        let closed = store.deactivate(&id).await.unwrap();
        assert_eq!(closed.last_seen, last_seen);
        assert!(closed.closed_at > closed.last_seen);
    }
}

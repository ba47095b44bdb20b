use std::sync::Arc;

use crate::config::Config;
use crate::services::auth_service::TokenVerifier;
use crate::services::path_store::PathStore;
use crate::services::translate_service::TextProvider;
use crate::websocket::EventRouter;
use crate::ws::access::AccessResolver;
use crate::ws::lifecycle::ConnectionLifecycle;
use crate::ws::room::RoomManager;
use crate::ws::sequencer::EditSequencer;
use crate::ws::session::SessionStore;

/// Shared state of the server, cloned into every handler.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub sessions: Arc<SessionStore>,
    pub rooms: Arc<RoomManager>,
    pub access: Arc<AccessResolver>,
    pub lifecycle: Arc<ConnectionLifecycle>,
    pub router: Arc<EventRouter>,
}

impl AppState {
    pub fn new(
        config: Config,
        store: Arc<dyn PathStore>,
        verifier: Arc<dyn TokenVerifier>,
        provider: Arc<dyn TextProvider>,
    ) -> Self {
        let sessions = Arc::new(SessionStore::new(config.session_audit_ttl()));
        let rooms = Arc::new(RoomManager::new());
        let sequencer = Arc::new(EditSequencer::new());
        let access = Arc::new(AccessResolver::new(
            store.clone(),
            config.access_cache_ttl(),
            config.access_cache_capacity,
        ));
        let lifecycle = Arc::new(ConnectionLifecycle::new(
            verifier,
            sessions.clone(),
            rooms.clone(),
        ));
        let router = Arc::new(EventRouter::new(
            sessions.clone(),
            rooms.clone(),
            access.clone(),
            store,
            provider,
            sequencer,
        ));

        Self {
            config: Arc::new(config),
            sessions,
            rooms,
            access,
            lifecycle,
            router,
        }
    }
}

use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Query, State,
    },
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use chrono::Utc;
use futures_util::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use tokio::sync::mpsc::{self, UnboundedReceiver};
use tracing::{debug, error, info, warn};

use crate::models::{ErrorResponse, InboundEvent, OutboundEvent};
use crate::services::auth_service::get_auth_token;
use crate::state::AppState;
use crate::utils::scope_guard::ScopeGuard;
use crate::ws::connection::Connection;
use crate::ws::lifecycle::DisconnectReason;
use crate::ws::session::SessionStore;

// How long the reader may finish an in-flight event once the writer is gone
const READER_GRACE: Duration = Duration::from_secs(5);
// A single socket write that takes longer than this means the peer stopped reading
const SEND_TIMEOUT: Duration = Duration::from_secs(10);
// Missed ping rounds before a silent client is dropped
const IDLE_PINGS: u32 = 2;

#[derive(Debug, Deserialize)]
pub struct WsAuthQuery {
    pub token: Option<String>,
}

/// WebSocket handler. The credential is checked before the upgrade; a
/// rejected client gets a 401 and never reaches the event layer.
pub async fn websocket_handler(
    State(state): State<AppState>,
    Query(params): Query<WsAuthQuery>,
    headers: HeaderMap,
    ws: WebSocketUpgrade,
) -> Response {
    info!("New WebSocket connection attempt");

    let token = get_auth_token(&headers, params.token.as_deref()).ok();
    let (tx, rx) = mpsc::unbounded_channel();
    let conn = match state.lifecycle.authenticate(token.as_deref(), tx).await {
        Ok(conn) => conn,
        Err(e) => {
            warn!("WebSocket connection refused: {}", e);
            let status = StatusCode::UNAUTHORIZED;
            return (
                status,
                Json(ErrorResponse {
                    code: status.as_u16(),
                    status: status.to_string(),
                    error: e.message().to_string(),
                }),
            )
                .into_response();
        }
    };

    // Release the session if the upgrade never completes or the task dies
    let lifecycle = state.lifecycle.clone();
    let guarded = conn.clone();
    let guard = ScopeGuard::new(move || {
        if let Ok(handle) = tokio::runtime::Handle::try_current() {
            handle.spawn(async move {
                lifecycle.disconnect(&guarded, DisconnectReason::Aborted).await;
            });
        }
    });

    ws.on_upgrade(move |socket| async move {
        handle_socket(socket, state, conn, rx).await;
        guard.dismiss();
    })
}

/// Handle WebSocket connection
async fn handle_socket(
    socket: WebSocket,
    state: AppState,
    conn: Arc<Connection>,
    rx: UnboundedReceiver<OutboundEvent>,
) {
    conn.mark_ready().await;
    info!(connection_id = %conn.id(), user_id = %conn.user().id, "WebSocket connection established");

    let (sender, mut receiver) = socket.split();
    let mut send_task = tokio::spawn(write_events(
        sender,
        rx,
        state.sessions.clone(),
        conn.clone(),
        state.config.ws_ping_interval(),
    ));

    // Inbound events of one connection are handled one at a time, in order
    let router = state.router.clone();
    let sessions = state.sessions.clone();
    let reader_conn = conn.clone();
    let mut recv_task = tokio::spawn(async move {
        while let Some(msg) = receiver.next().await {
            if msg.is_ok() {
                sessions.touch(&reader_conn.id()).await;
            }
            match msg {
                Ok(Message::Text(text)) => match serde_json::from_str::<InboundEvent>(&text) {
                    Ok(event) => router.dispatch(&reader_conn, event).await,
                    Err(e) => router.reject_malformed(&reader_conn, &e.to_string()),
                },
                Ok(Message::Binary(_)) => {
                    router.reject_malformed(&reader_conn, "binary frames are not supported");
                }
                Ok(Message::Ping(_)) | Ok(Message::Pong(_)) => {}
                Ok(Message::Close(frame)) => {
                    debug!("Close frame received on connection {}: {:?}", reader_conn.id(), frame);
                    return DisconnectReason::ClientClosed;
                }
                Err(e) => {
                    warn!("WebSocket error on connection {}: {}", reader_conn.id(), e);
                    return DisconnectReason::TransportError;
                }
            }
            if reader_conn.is_closing() {
                break;
            }
        }
        DisconnectReason::ClientClosed
    });

    // Wait for either task to finish (and finish the other)
    let reason = tokio::select! {
        result = (&mut recv_task) => {
            send_task.abort();
            result.unwrap_or_else(|e| {
                error!("Reader task of connection {} failed: {}", conn.id(), e);
                DisconnectReason::Aborted
            })
        }
        result = (&mut send_task) => {
            if tokio::time::timeout(READER_GRACE, &mut recv_task).await.is_err() {
                recv_task.abort();
            }
            result.unwrap_or_else(|e| {
                error!("Writer task of connection {} failed: {}", conn.id(), e);
                DisconnectReason::Aborted
            })
        }
    };

    state.lifecycle.disconnect(&conn, reason).await;
    info!("WebSocket connection {} terminated", conn.id());
}

/// Drain the outbound queue to the socket, pinging on a fixed interval.
/// Stops when the queue closes, a write fails or stalls, or the client has
/// been silent for too many ping rounds.
async fn write_events(
    mut sender: SplitSink<WebSocket, Message>,
    mut rx: UnboundedReceiver<OutboundEvent>,
    sessions: Arc<SessionStore>,
    conn: Arc<Connection>,
    ping_interval: Duration,
) -> DisconnectReason {
    let idle_limit = ping_interval * IDLE_PINGS;
    let mut ticker = tokio::time::interval(ping_interval);
    ticker.tick().await;

    loop {
        let message = tokio::select! {
            event = rx.recv() => {
                let Some(event) = event else {
                    return DisconnectReason::ClientClosed;
                };
                match serde_json::to_string(&event) {
                    Ok(text) => Message::Text(text),
                    Err(e) => {
                        error!("Failed to serialize outbound event: {}", e);
                        continue;
                    }
                }
            }
            _ = ticker.tick() => {
                if let Some(idle) = idle_time(&sessions, &conn).await {
                    if idle > idle_limit {
                        warn!(
                            connection_id = %conn.id(),
                            idle_secs = idle.as_secs(),
                            "Client stopped responding"
                        );
                        return DisconnectReason::Unresponsive;
                    }
                }
                Message::Ping(Vec::new())
            }
        };

        match tokio::time::timeout(SEND_TIMEOUT, sender.send(message)).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                debug!("Write to connection {} failed: {}", conn.id(), e);
                return DisconnectReason::TransportError;
            }
            Err(_) => {
                warn!(connection_id = %conn.id(), "Write stalled; dropping connection");
                return DisconnectReason::Unresponsive;
            }
        }
    }
}

/// Time since the client last sent anything, if the session is still live.
async fn idle_time(sessions: &SessionStore, conn: &Connection) -> Option<Duration> {
    let session = sessions.get(&conn.id()).await?;
    (Utc::now() - session.last_seen).to_std().ok()
}

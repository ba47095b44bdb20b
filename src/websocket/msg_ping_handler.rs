use chrono::Utc;
use tracing::debug;

use crate::models::{OutboundEvent, PongMessage, SyncError};
use crate::ws::connection::Connection;
use super::router::Outcome;

/// Handle ping - answer with a pong carrying the server time.
pub async fn handle_ping(conn: &Connection) -> Result<Outcome, SyncError> {
    debug!("Ping received on connection {}", conn.id());
    Ok(Outcome::reply(OutboundEvent::Pong(PongMessage {
        date: Utc::now().to_rfc3339(),
    })))
}

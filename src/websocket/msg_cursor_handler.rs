use crate::models::{CursorMovedMessage, CursorUpdateMessage, OutboundEvent, SyncError};
use crate::ws::connection::Connection;
use super::router::{EventRouter, Outcome};

/// Handle cursor-update. Cursors are ephemeral: the latest position is kept
/// for late joiners and never stored.
pub async fn handle_cursor_update(
    router: &EventRouter,
    conn: &Connection,
    msg: CursorUpdateMessage,
) -> Result<Outcome, SyncError> {
    if !msg.position.x.is_finite() || !msg.position.y.is_finite() {
        return Err(SyncError::Validation("Cursor position must be finite".to_string()));
    }

    let cursor = CursorMovedMessage {
        user_id: conn.user().id.clone(),
        user_name: conn.user().name.clone(),
        node_id: msg.node_id,
        position: msg.position,
    };
    router.rooms.record_cursor(&msg.path_id, cursor.clone()).await;
    Ok(Outcome::to_room(OutboundEvent::CursorMoved(cursor)))
}

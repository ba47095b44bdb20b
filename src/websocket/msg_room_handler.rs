use tracing::debug;

use crate::models::{OutboundEvent, PathId, PathJoinedMessage, SyncError};
use crate::ws::connection::Connection;
use crate::ws::room::{JoinOutcome, LeaveOutcome};
use super::router::{EventRouter, Outcome};

/// Handle join-path. VIEW was checked by the router.
pub async fn handle_join_path(router: &EventRouter, conn: &Connection, path_id: PathId) -> Result<Outcome, SyncError> {
    let joined = PathJoinedMessage {
        path_id: path_id.clone(),
    };

    match router.rooms.join(conn, &path_id).await {
        JoinOutcome::Joined => {
            conn.entered_room(&path_id).await;
            // Show the joiner where everyone else currently is
            let mut outcome = Outcome::reply(OutboundEvent::PathJoined(joined));
            for cursor in router.rooms.cursors_except(&path_id, &conn.user().id).await {
                outcome = outcome.and_reply(OutboundEvent::CursorMoved(cursor));
            }
            Ok(outcome)
        }
        JoinOutcome::AlreadyMember => Ok(Outcome::reply(OutboundEvent::PathJoined(joined))),
        JoinOutcome::Closing => {
            debug!("Join of path {} ignored; connection {} is closing", path_id, conn.id());
            Ok(Outcome::none())
        }
    }
}

/// Handle leave-path. Leaving a room one is not in is a no-op.
pub async fn handle_leave_path(router: &EventRouter, conn: &Connection, path_id: PathId) -> Result<Outcome, SyncError> {
    match router.rooms.leave(&conn.id(), &path_id).await {
        LeaveOutcome::Left { .. } => {
            conn.left_room(&path_id).await;
        }
        LeaveOutcome::NotMember => {
            debug!("Connection {} was not in path {}", conn.id(), path_id);
        }
    }
    Ok(Outcome::none())
}

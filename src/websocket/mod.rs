pub mod handler;
pub mod msg_cursor_handler;
pub mod msg_node_handler;
pub mod msg_ping_handler;
pub mod msg_room_handler;
pub mod msg_translate_handler;
pub mod router;

pub use handler::websocket_handler;
pub use router::EventRouter;

pub mod access;
pub mod connection;
pub mod lifecycle;
pub mod room;
pub mod sequencer;
pub mod session;
pub mod tree;

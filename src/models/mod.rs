pub mod access;
pub mod access_invalidate;
pub mod diagnostics;
pub mod error;
pub mod health;
pub mod identity;
pub mod messages;
pub mod node;

pub use access::*;
pub use access_invalidate::*;
pub use diagnostics::*;
pub use error::*;
pub use health::*;
pub use identity::*;
pub use messages::*;
pub use node::*;

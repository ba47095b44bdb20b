pub mod access_invalidate;
pub mod diagnostics;
pub mod health;

pub use access_invalidate::*;
pub use diagnostics::*;
pub use health::*;

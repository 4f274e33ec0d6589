//! Data models
//!
//! Shared between gate-server and frontend (via API).
//! All zone IDs are `i64`; visitor IDs are opaque strings issued
//! by the identity directory.

pub mod visitor;
pub mod zone;

// Re-exports
pub use visitor::*;
pub use zone::*;

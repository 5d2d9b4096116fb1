//! Sessions and the registry that owns them.

pub mod registry;
#[allow(clippy::module_inception)]
pub mod session;

pub use registry::SessionRegistry;
pub use session::{Session, SessionInfo, SessionState, TransportKind, STDIO_SESSION_ID};

//! figma-context MCP server: Figma design data for LLM clients over stdio,
//! legacy SSE, and streamable HTTP.

pub mod config;
#[cfg(feature = "http")]
pub mod lifecycle;
pub mod protocol;
pub mod session;
pub mod tools;
pub mod transport;
pub mod types;

#[cfg(feature = "http")]
pub use lifecycle::LifecycleManager;
pub use protocol::ProtocolEngine;
pub use session::{Session, SessionRegistry, SessionState, TransportKind};
pub use tools::{ToolHandler, ToolRegistry};
pub use transport::{StdioTransport, TransportAdapter};

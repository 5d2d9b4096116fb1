//! MCP protocol handling: per-session JSON-RPC dispatch.

pub mod engine;
pub mod negotiation;
pub mod validator;

pub use engine::ProtocolEngine;

//! Transport layer for MCP communication.

pub mod framing;
#[cfg(feature = "http")]
pub mod http;
#[cfg(feature = "http")]
pub mod sse;
pub mod stdio;
#[cfg(feature = "http")]
pub mod streamable;

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::session::{Session, TransportKind};
use crate::types::{JsonRpcMessage, McpResult};

#[cfg(feature = "http")]
pub use http::{router, AppState, SESSION_HEADER};
#[cfg(feature = "http")]
pub use sse::SseTransport;
pub use stdio::StdioTransport;
#[cfg(feature = "http")]
pub use streamable::StreamableHttpTransport;

/// What every transport binding does between the wire and a session.
///
/// Accepting connections is each transport's own business (a read loop for
/// stdio, axum routes for HTTP); from there, all of them find a session,
/// hand it messages, and tear it down the same way.
#[async_trait]
pub trait TransportAdapter: Send + Sync {
    fn kind(&self) -> TransportKind;

    /// Find (or, for a handshake, create) the session a message belongs to.
    ///
    /// Unknown ids, ids owned by another transport, and missing ids where one
    /// is required are all `SessionInvalid`.
    fn resolve_session(
        &self,
        session_id: Option<&str>,
        message: Option<&JsonRpcMessage>,
    ) -> McpResult<Arc<Session>>;

    /// Route one client message to the session's engine.
    async fn deliver(&self, session: &Session, message: JsonRpcMessage) -> McpResult<Option<Value>> {
        session.dispatch(message).await
    }

    /// Drain and close the session, then release it.
    async fn terminate(&self, session: &Session);
}

//! Legacy SSE transport: `GET /sse` opens the session and its event stream,
//! `POST /messages?sessionId=` carries client messages.

use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::{
    body::Bytes,
    extract::{Query, State},
    http::StatusCode,
    response::{sse::Event, IntoResponse, Response},
};
use serde::Deserialize;
use serde_json::Value;
use tokio::sync::mpsc;

use crate::config::ServerConfig;
use crate::session::{Session, SessionRegistry, SessionState, TransportKind};
use crate::types::{JsonRpcMessage, McpError, McpResult};

use super::http::{error_response, event_stream, lookup_session, message_event, AppState};
use super::{framing, TransportAdapter};

pub struct SseTransport {
    registry: Arc<SessionRegistry>,
    outbound_buffer: usize,
    drain_timeout: Duration,
}

impl SseTransport {
    pub fn new(registry: Arc<SessionRegistry>, config: &ServerConfig) -> Self {
        Self {
            registry,
            outbound_buffer: config.outbound_buffer,
            drain_timeout: config.shutdown_timeout,
        }
    }

    /// New session in `Initializing`, with its event stream attached.
    fn open(&self) -> McpResult<(Arc<Session>, mpsc::Receiver<Value>)> {
        let session = self.registry.create(self.kind())?;
        let opened = session
            .begin_handshake()
            .and_then(|()| session.attach_outbound(self.outbound_buffer));
        match opened {
            Ok(rx) => Ok((session, rx)),
            Err(e) => {
                self.registry.discard(&session);
                Err(e)
            }
        }
    }
}

#[async_trait]
impl TransportAdapter for SseTransport {
    fn kind(&self) -> TransportKind {
        TransportKind::Sse
    }

    fn resolve_session(
        &self,
        session_id: Option<&str>,
        _message: Option<&JsonRpcMessage>,
    ) -> McpResult<Arc<Session>> {
        let id = session_id
            .ok_or_else(|| McpError::SessionInvalid("missing sessionId parameter".to_string()))?;
        lookup_session(&self.registry, id, self.kind())
    }

    /// Replies travel on the event stream, never in the POST response.
    async fn deliver(&self, session: &Session, message: JsonRpcMessage) -> McpResult<Option<Value>> {
        session.dispatch_to_stream(message).await?;
        Ok(None)
    }

    async fn terminate(&self, session: &Session) {
        self.registry.terminate(session, self.drain_timeout).await;
    }
}

/// Tears the session down when the client's event stream goes away.
struct DisconnectGuard {
    registry: Arc<SessionRegistry>,
    session: Arc<Session>,
    drain_timeout: Duration,
}

impl Drop for DisconnectGuard {
    fn drop(&mut self) {
        if self.session.state() == SessionState::Closed {
            return;
        }
        tracing::info!(session = %self.session.id(), "SSE stream closed");

        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                let registry = self.registry.clone();
                let session = self.session.clone();
                let deadline = self.drain_timeout;
                handle.spawn(async move {
                    registry.terminate(&session, deadline).await;
                });
            }
            Err(_) => self.registry.discard(&self.session),
        }
    }
}

/// `GET /sse`
pub(crate) async fn handle_subscribe(State(state): State<Arc<AppState>>) -> Response {
    let adapter = &state.sse;

    let (session, mut rx) = match adapter.open() {
        Ok(opened) => opened,
        Err(e) => return error_response(&e, None),
    };
    let endpoint = format!("/messages?sessionId={}", session.id());
    let guard = DisconnectGuard {
        registry: state.registry.clone(),
        session,
        drain_timeout: adapter.drain_timeout,
    };

    let stream = async_stream::stream! {
        let _guard = guard;
        yield Ok::<_, Infallible>(Event::default().event("endpoint").data(endpoint));
        while let Some(message) = rx.recv().await {
            yield Ok(message_event(&message));
        }
    };
    event_stream(stream, state.config.keep_alive)
}

#[derive(Debug, Deserialize)]
pub(crate) struct MessagesQuery {
    #[serde(rename = "sessionId")]
    session_id: Option<String>,
}

/// `POST /messages?sessionId=<id>`: replies travel on the event stream.
pub(crate) async fn handle_message(
    State(state): State<Arc<AppState>>,
    Query(query): Query<MessagesQuery>,
    body: Bytes,
) -> Response {
    let adapter = &state.sse;

    let session = match adapter.resolve_session(query.session_id.as_deref(), None) {
        Ok(session) => session,
        Err(e) => return error_response(&e, None),
    };
    let message = match framing::parse_body(&body) {
        Ok(message) => message,
        Err(e) => return error_response(&e, None),
    };
    let id = message.request_id();

    match adapter.deliver(&session, message).await {
        Ok(_) => (StatusCode::ACCEPTED, "Accepted").into_response(),
        Err(e) => error_response(&e, id),
    }
}

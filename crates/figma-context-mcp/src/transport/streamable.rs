//! Streamable HTTP transport: `POST`/`GET`/`DELETE /mcp` keyed by the
//! `mcp-session-id` header.

use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::{
    body::Bytes,
    extract::State,
    http::{HeaderMap, HeaderValue, StatusCode},
    response::{IntoResponse, Json as AxumJson, Response},
};

use crate::config::ServerConfig;
use crate::session::{Session, SessionRegistry, TransportKind};
use crate::types::{JsonRpcMessage, McpError, McpResult};

use super::http::{
    error_response, event_stream, lookup_session, message_event, session_header, AppState,
    SESSION_HEADER,
};
use super::{framing, TransportAdapter};

pub struct StreamableHttpTransport {
    registry: Arc<SessionRegistry>,
    outbound_buffer: usize,
    drain_timeout: Duration,
}

impl StreamableHttpTransport {
    pub fn new(registry: Arc<SessionRegistry>, config: &ServerConfig) -> Self {
        Self {
            registry,
            outbound_buffer: config.outbound_buffer,
            drain_timeout: config.shutdown_timeout,
        }
    }
}

#[async_trait]
impl TransportAdapter for StreamableHttpTransport {
    fn kind(&self) -> TransportKind {
        TransportKind::StreamableHttp
    }

    /// With a header: that session. Without: a new session, but only for
    /// `initialize`.
    fn resolve_session(
        &self,
        session_id: Option<&str>,
        message: Option<&JsonRpcMessage>,
    ) -> McpResult<Arc<Session>> {
        match session_id {
            Some(id) => lookup_session(&self.registry, id, self.kind()),
            None if message.is_some_and(JsonRpcMessage::is_initialize) => {
                self.registry.create(self.kind())
            }
            None => Err(McpError::SessionInvalid(format!(
                "missing {SESSION_HEADER} header"
            ))),
        }
    }

    async fn terminate(&self, session: &Session) {
        self.registry.terminate(session, self.drain_timeout).await;
    }
}

fn with_session_header(mut response: Response, session: &Session) -> Response {
    if let Ok(value) = HeaderValue::from_str(session.id()) {
        response.headers_mut().insert(SESSION_HEADER, value);
    }
    response
}

/// `POST /mcp`: one JSON-RPC message per request.
pub(crate) async fn handle_post(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let adapter = &state.streamable;

    let header = match session_header(&headers) {
        Ok(header) => header,
        Err(e) => return error_response(&e, None),
    };
    let message = match framing::parse_body(&body) {
        Ok(message) => message,
        Err(e) => return error_response(&e, None),
    };
    let id = message.request_id();
    let session = match adapter.resolve_session(header, Some(&message)) {
        Ok(session) => session,
        Err(e) => {
            tracing::debug!("Rejected POST /mcp: {e}");
            return error_response(&e, id);
        }
    };
    let created = header.is_none();

    match adapter.deliver(&session, message).await {
        Ok(Some(reply)) => {
            let response = (StatusCode::OK, AxumJson(reply)).into_response();
            if created && !session.is_active() {
                // The id was never handed out, so nobody can retry on it.
                state.registry.discard(&session);
                return response;
            }
            with_session_header(response, &session)
        }
        Ok(None) => with_session_header(StatusCode::ACCEPTED.into_response(), &session),
        Err(e) => {
            if created {
                state.registry.discard(&session);
            }
            error_response(&e, id)
        }
    }
}

/// `GET /mcp`: server-to-client event stream for an existing session.
pub(crate) async fn handle_get(State(state): State<Arc<AppState>>, headers: HeaderMap) -> Response {
    let adapter = &state.streamable;

    let session = match session_header(&headers).and_then(|h| adapter.resolve_session(h, None)) {
        Ok(session) => session,
        Err(e) => return error_response(&e, None),
    };
    if !session.is_active() {
        let e = McpError::SessionInvalid(format!("session {} is not active", session.id()));
        return error_response(&e, None);
    }

    let mut rx = match session.attach_outbound(adapter.outbound_buffer) {
        Ok(rx) => rx,
        Err(e) => {
            tracing::debug!(session = %session.id(), "Rejected GET /mcp: {e}");
            return error_response(&e, None);
        }
    };
    tracing::debug!(session = %session.id(), "Push stream opened");

    let stream = async_stream::stream! {
        while let Some(message) = rx.recv().await {
            yield Ok::<_, Infallible>(message_event(&message));
        }
    };
    with_session_header(event_stream(stream, state.config.keep_alive), &session)
}

/// `DELETE /mcp`: explicit session termination.
pub(crate) async fn handle_delete(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Response {
    let adapter = &state.streamable;

    let session = match session_header(&headers).and_then(|h| adapter.resolve_session(h, None)) {
        Ok(session) => session,
        Err(e) => return error_response(&e, None),
    };

    adapter.terminate(&session).await;
    StatusCode::OK.into_response()
}

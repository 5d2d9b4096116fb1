//! Shared HTTP surface: router, state, and error mapping for the SSE and
//! streamable HTTP transports.

use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::State,
    http::{HeaderMap, HeaderName, StatusCode},
    response::{
        sse::{Event, KeepAlive, Sse},
        IntoResponse, Json as AxumJson, Response,
    },
    routing::{get, post},
    Router,
};
use futures::Stream;
use serde_json::Value;
use tower_http::cors::CorsLayer;

use crate::config::ServerConfig;
use crate::session::{Session, SessionRegistry, TransportKind};
use crate::types::{McpError, McpResult, RequestId, SERVER_VERSION};

use super::{sse, streamable, SseTransport, StreamableHttpTransport};

/// Header carrying the streamable HTTP session id, both ways.
pub const SESSION_HEADER: &str = "mcp-session-id";

/// Shared server state passed to all handlers via axum State.
pub struct AppState {
    pub registry: Arc<SessionRegistry>,
    pub sse: SseTransport,
    pub streamable: StreamableHttpTransport,
    pub config: ServerConfig,
}

impl AppState {
    pub fn new(registry: Arc<SessionRegistry>, config: &ServerConfig) -> Self {
        Self {
            sse: SseTransport::new(registry.clone(), config),
            streamable: StreamableHttpTransport::new(registry.clone(), config),
            registry,
            config: config.clone(),
        }
    }
}

/// All HTTP routes, with permissive CORS.
pub fn router(registry: Arc<SessionRegistry>, config: &ServerConfig) -> Router {
    let state = Arc::new(AppState::new(registry, config));

    let cors = CorsLayer::permissive()
        .expose_headers([HeaderName::from_static(SESSION_HEADER)]);

    Router::new()
        .route(
            "/mcp",
            post(streamable::handle_post)
                .get(streamable::handle_get)
                .delete(streamable::handle_delete),
        )
        .route("/sse", get(sse::handle_subscribe))
        .route("/messages", post(sse::handle_message))
        .route("/health", get(handle_health))
        .layer(cors)
        .with_state(state)
}

async fn handle_health(State(state): State<Arc<AppState>>) -> AxumJson<Value> {
    AxumJson(serde_json::json!({
        "status": "ok",
        "version": SERVER_VERSION,
        "sessions": state.registry.len(),
    }))
}

pub(crate) fn status_for(err: &McpError) -> StatusCode {
    match err {
        McpError::SessionInvalid(_)
        | McpError::ParseError(_)
        | McpError::InvalidRequest(_)
        | McpError::Json(_) => StatusCode::BAD_REQUEST,
        McpError::Conflict(_) => StatusCode::CONFLICT,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

/// JSON-RPC error body with the matching HTTP status.
pub(crate) fn error_response(err: &McpError, id: Option<RequestId>) -> Response {
    (
        status_for(err),
        AxumJson(err.to_json_value(id.unwrap_or(RequestId::Null))),
    )
        .into_response()
}

/// The `mcp-session-id` header, if present. A non-text value is treated as an
/// unknown id.
pub(crate) fn session_header(headers: &HeaderMap) -> McpResult<Option<&str>> {
    headers
        .get(SESSION_HEADER)
        .map(|v| {
            v.to_str()
                .map_err(|_| McpError::SessionInvalid("malformed mcp-session-id header".to_string()))
        })
        .transpose()
}

/// Registered session of the given transport kind.
pub(crate) fn lookup_session(
    registry: &SessionRegistry,
    id: &str,
    kind: TransportKind,
) -> McpResult<Arc<Session>> {
    registry
        .lookup(id)
        .filter(|s| s.kind() == kind)
        .ok_or_else(|| McpError::SessionInvalid(format!("unknown session id {id}")))
}

pub(crate) fn message_event(message: &Value) -> Event {
    Event::default().event("message").data(message.to_string())
}

pub(crate) fn event_stream<S>(stream: S, keep_alive: Duration) -> Response
where
    S: Stream<Item = Result<Event, Infallible>> + Send + 'static,
{
    Sse::new(stream)
        .keep_alive(KeepAlive::new().interval(keep_alive))
        .into_response()
}

//! A logical client binding: one transport, one protocol engine, one lifecycle.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use tokio::sync::{mpsc, Notify};

use crate::protocol::ProtocolEngine;
use crate::types::{JsonRpcMessage, McpError, McpResult};

/// Implicit identifier of the single stdio session.
pub const STDIO_SESSION_ID: &str = "stdio";

/// Which transport binding owns a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum TransportKind {
    Stdio,
    Sse,
    StreamableHttp,
}

impl std::fmt::Display for TransportKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TransportKind::Stdio => write!(f, "stdio"),
            TransportKind::Sse => write!(f, "sse"),
            TransportKind::StreamableHttp => write!(f, "streamable-http"),
        }
    }
}

/// Session lifecycle. `Closed` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    Created,
    Initializing,
    Active,
    Terminating,
    Closed,
}

impl SessionState {
    fn can_transition_to(self, next: SessionState) -> bool {
        use SessionState::*;
        matches!(
            (self, next),
            (Created, Initializing)
                | (Initializing, Initializing)
                | (Initializing, Active)
                | (Initializing, Created)
                | (Active, Active)
                | (Created | Initializing | Active, Terminating)
                | (Terminating, Closed)
        )
    }
}

/// Diagnostic view of a session.
#[derive(Debug, Clone, Serialize)]
pub struct SessionInfo {
    pub id: String,
    pub transport: TransportKind,
    pub state: SessionState,
    pub created_at: DateTime<Utc>,
    pub last_activity_at: DateTime<Utc>,
}

/// One client's session.
///
/// The engine is fixed at construction and cannot be swapped: there is no
/// setter, and the field is never behind a lock.
pub struct Session {
    id: String,
    kind: TransportKind,
    engine: ProtocolEngine,
    state: Mutex<SessionState>,
    created_at: DateTime<Utc>,
    last_activity_at: Mutex<DateTime<Utc>>,
    outbound: Mutex<Option<mpsc::Sender<Value>>>,
    in_flight: AtomicUsize,
    idle: Notify,
}

/// Marks a request as in flight until dropped.
pub struct InFlight<'a> {
    session: &'a Session,
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        if self.session.in_flight.fetch_sub(1, Ordering::SeqCst) == 1 {
            self.session.idle.notify_waiters();
        }
    }
}

impl Session {
    pub fn new(id: String, kind: TransportKind, engine: ProtocolEngine) -> Self {
        let now = Utc::now();
        Self {
            id,
            kind,
            engine,
            state: Mutex::new(SessionState::Created),
            created_at: now,
            last_activity_at: Mutex::new(now),
            outbound: Mutex::new(None),
            in_flight: AtomicUsize::new(0),
            idle: Notify::new(),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn kind(&self) -> TransportKind {
        self.kind
    }

    pub fn engine(&self) -> &ProtocolEngine {
        &self.engine
    }

    pub fn state(&self) -> SessionState {
        *lock(&self.state)
    }

    pub fn is_active(&self) -> bool {
        self.state() == SessionState::Active
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn last_activity_at(&self) -> DateTime<Utc> {
        *lock(&self.last_activity_at)
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }

    pub fn info(&self) -> SessionInfo {
        SessionInfo {
            id: self.id.clone(),
            transport: self.kind,
            state: self.state(),
            created_at: self.created_at,
            last_activity_at: self.last_activity_at(),
        }
    }

    fn transition(&self, next: SessionState) -> McpResult<SessionState> {
        let mut state = lock(&self.state);
        let prev = *state;
        if !prev.can_transition_to(next) {
            return Err(McpError::SessionInvalid(format!(
                "session {} cannot move from {prev:?} to {next:?}",
                self.id
            )));
        }
        *state = next;
        if prev != next {
            tracing::debug!(session = %self.id, transport = %self.kind, "{prev:?} -> {next:?}");
        }
        Ok(prev)
    }

    /// SSE subscribe: the stream is open and the handshake may begin.
    pub fn begin_handshake(&self) -> McpResult<()> {
        self.transition(SessionState::Initializing).map(|_| ())
    }

    /// Route one message to this session's engine.
    ///
    /// Only `initialize` is accepted before the session is active; everything
    /// addressed to a terminating or closed session is session-invalid.
    pub async fn dispatch(&self, message: JsonRpcMessage) -> McpResult<Option<Value>> {
        // Counted before the state check so a concurrent drain waits for us.
        let _in_flight = self.enter();
        let handshake = self.admit(&message)?;

        let response = self.engine.handle_message(message).await;

        self.settle_handshake(handshake).await?;
        Ok(response)
    }

    /// Like [`Session::dispatch`], but the reply goes onto the attached stream
    /// before the engine takes its next message, so replies leave in the
    /// order they were processed.
    pub async fn dispatch_to_stream(&self, message: JsonRpcMessage) -> McpResult<()> {
        let _in_flight = self.enter();
        let handshake = self.admit(&message)?;

        {
            let _turn = self.engine.turn().await;
            if let Some(reply) = self.engine.process(message).await {
                if let Err(e) = self.push(reply).await {
                    tracing::warn!(session = %self.id, "Dropped reply: {e}");
                }
            }
        }

        self.settle_handshake(handshake).await
    }

    /// State check before a message reaches the engine. Returns whether the
    /// message is the handshake.
    fn admit(&self, message: &JsonRpcMessage) -> McpResult<bool> {
        let handshake = message.is_initialize();
        match self.state() {
            SessionState::Active => {}
            SessionState::Created | SessionState::Initializing if handshake => {
                self.transition(SessionState::Initializing)?;
            }
            SessionState::Created | SessionState::Initializing => {
                return Err(McpError::SessionInvalid(format!(
                    "session {} has not completed initialization",
                    self.id
                )));
            }
            SessionState::Terminating | SessionState::Closed => {
                return Err(McpError::SessionInvalid(format!(
                    "session {} is terminated",
                    self.id
                )));
            }
        }
        self.touch();
        Ok(handshake)
    }

    async fn settle_handshake(&self, handshake: bool) -> McpResult<()> {
        if handshake && self.state() == SessionState::Initializing {
            if self.engine.is_negotiated().await {
                self.transition(SessionState::Active)?;
                tracing::info!(session = %self.id, transport = %self.kind, "Session active");
            } else if self.kind != TransportKind::Sse {
                // SSE sessions stay Initializing while their stream is open.
                self.transition(SessionState::Created)?;
            }
        }
        Ok(())
    }

    fn enter(&self) -> InFlight<'_> {
        self.in_flight.fetch_add(1, Ordering::SeqCst);
        InFlight { session: self }
    }

    fn touch(&self) {
        *lock(&self.last_activity_at) = Utc::now();
    }

    /// Attach the server-to-client push channel.
    ///
    /// Fails with `Conflict` while another live stream is attached.
    pub fn attach_outbound(&self, buffer: usize) -> McpResult<mpsc::Receiver<Value>> {
        if matches!(
            self.state(),
            SessionState::Terminating | SessionState::Closed
        ) {
            return Err(McpError::SessionInvalid(format!(
                "session {} is terminated",
                self.id
            )));
        }

        let mut outbound = lock(&self.outbound);
        if outbound.as_ref().is_some_and(|tx| !tx.is_closed()) {
            return Err(McpError::Conflict(format!(
                "session {} already has an open stream",
                self.id
            )));
        }

        let (tx, rx) = mpsc::channel(buffer.max(1));
        *outbound = Some(tx);
        Ok(rx)
    }

    pub fn has_outbound(&self) -> bool {
        lock(&self.outbound)
            .as_ref()
            .is_some_and(|tx| !tx.is_closed())
    }

    /// Push a server-initiated message onto the attached stream.
    pub async fn push(&self, message: Value) -> McpResult<()> {
        let tx = lock(&self.outbound).clone().ok_or_else(|| {
            McpError::Transport(format!("session {} has no open stream", self.id))
        })?;
        tx.send(message).await.map_err(|_| {
            McpError::Transport(format!("stream for session {} is closed", self.id))
        })
    }

    fn close_outbound(&self) {
        lock(&self.outbound).take();
    }

    /// Move to `Terminating` and release the push stream. Returns false if the
    /// session was already terminating or closed.
    pub fn begin_termination(&self) -> bool {
        let started = self.transition(SessionState::Terminating).is_ok();
        self.close_outbound();
        if started {
            tracing::info!(session = %self.id, transport = %self.kind, "Session terminating");
        }
        started
    }

    /// Wait for in-flight requests to finish, up to `deadline`.
    /// Returns false if the deadline passed first.
    pub async fn drain(&self, deadline: Duration) -> bool {
        tokio::time::timeout(deadline, self.wait_idle()).await.is_ok()
    }

    async fn wait_idle(&self) {
        loop {
            let notified = self.idle.notified();
            if self.in_flight.load(Ordering::SeqCst) == 0 {
                return;
            }
            notified.await;
        }
    }

    /// Final transition. Idempotent.
    pub fn close(&self) {
        self.close_outbound();
        let mut state = lock(&self.state);
        if *state == SessionState::Closed {
            return;
        }
        if *state != SessionState::Terminating {
            tracing::debug!(session = %self.id, "Closing from {:?} without drain", *state);
        }
        *state = SessionState::Closed;
        tracing::info!(session = %self.id, transport = %self.kind, "Session closed");
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("kind", &self.kind)
            .field("state", &self.state())
            .field("in_flight", &self.in_flight())
            .finish()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::ToolRegistry;
    use serde_json::json;

    fn session(kind: TransportKind) -> Session {
        Session::new("s1".to_string(), kind, ProtocolEngine::new(ToolRegistry::new()))
    }

    fn message(value: Value) -> JsonRpcMessage {
        serde_json::from_value(value).unwrap()
    }

    fn init() -> JsonRpcMessage {
        message(json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": "initialize",
            "params": {
                "protocolVersion": "2025-03-26",
                "capabilities": {},
                "clientInfo": { "name": "t", "version": "0" }
            }
        }))
    }

    #[tokio::test]
    async fn test_handshake_activates() {
        let s = session(TransportKind::StreamableHttp);
        assert_eq!(s.state(), SessionState::Created);
        let resp = s.dispatch(init()).await.unwrap().unwrap();
        assert!(resp.get("result").is_some());
        assert_eq!(s.state(), SessionState::Active);
    }

    #[tokio::test]
    async fn test_request_before_handshake_is_session_invalid() {
        let s = session(TransportKind::Stdio);
        let err = s
            .dispatch(message(json!({"jsonrpc": "2.0", "id": 2, "method": "tools/list"})))
            .await
            .unwrap_err();
        assert!(matches!(err, McpError::SessionInvalid(_)));
    }

    #[tokio::test]
    async fn test_failed_handshake_returns_to_created() {
        let s = session(TransportKind::StreamableHttp);
        let resp = s
            .dispatch(message(
                json!({"jsonrpc": "2.0", "id": 1, "method": "initialize", "params": {}}),
            ))
            .await
            .unwrap()
            .unwrap();
        assert!(resp.get("error").is_some());
        assert_eq!(s.state(), SessionState::Created);
    }

    #[tokio::test]
    async fn test_sse_stays_initializing_after_failed_handshake() {
        let s = session(TransportKind::Sse);
        s.begin_handshake().unwrap();
        s.dispatch(message(
            json!({"jsonrpc": "2.0", "id": 1, "method": "initialize"}),
        ))
        .await
        .unwrap();
        assert_eq!(s.state(), SessionState::Initializing);
    }

    #[tokio::test]
    async fn test_terminated_session_rejects_messages() {
        let s = session(TransportKind::StreamableHttp);
        s.dispatch(init()).await.unwrap();
        assert!(s.begin_termination());
        assert!(!s.begin_termination());
        let err = s
            .dispatch(message(json!({"jsonrpc": "2.0", "id": 2, "method": "ping"})))
            .await
            .unwrap_err();
        assert!(matches!(err, McpError::SessionInvalid(_)));

        s.close();
        s.close();
        assert_eq!(s.state(), SessionState::Closed);
        assert!(s.begin_handshake().is_err());
    }

    #[tokio::test]
    async fn test_outbound_conflict_and_release() {
        let s = session(TransportKind::StreamableHttp);
        let rx = s.attach_outbound(4).unwrap();
        assert!(matches!(s.attach_outbound(4), Err(McpError::Conflict(_))));

        drop(rx);
        let mut rx = s.attach_outbound(4).unwrap();
        s.push(json!({"hello": 1})).await.unwrap();
        assert_eq!(rx.recv().await.unwrap()["hello"], 1);

        s.begin_termination();
        assert!(rx.recv().await.is_none());
        assert!(s.push(json!({})).await.is_err());
    }

    #[tokio::test]
    async fn test_drain_waits_for_in_flight() {
        let s = std::sync::Arc::new(session(TransportKind::StreamableHttp));
        let guard = s.enter();
        assert!(!s.drain(Duration::from_millis(20)).await);

        let waiter = {
            let s = s.clone();
            tokio::spawn(async move { s.drain(Duration::from_secs(5)).await })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;
        drop(guard);
        assert!(waiter.await.unwrap());
        assert_eq!(s.in_flight(), 0);
    }

    #[tokio::test]
    async fn test_stream_replies_follow_processing_order() {
        use std::sync::Arc;

        use async_trait::async_trait;

        use crate::tools::ToolHandler;
        use crate::types::{ToolCallResult, ToolDefinition};

        /// Records the order calls were handled in; early calls run longer.
        struct Recorder {
            order: Arc<Mutex<Vec<i64>>>,
        }

        #[async_trait]
        impl ToolHandler for Recorder {
            fn name(&self) -> &str {
                "record"
            }

            fn definition(&self) -> ToolDefinition {
                ToolDefinition {
                    name: "record".to_string(),
                    description: None,
                    input_schema: json!({ "type": "object" }),
                }
            }

            async fn call(&self, args: Value) -> McpResult<ToolCallResult> {
                let n = args["n"].as_i64().unwrap_or_default();
                tokio::time::sleep(Duration::from_millis(5 * (8 - n) as u64)).await;
                lock(&self.order).push(n);
                Ok(ToolCallResult::text(n.to_string()))
            }
        }

        let order = Arc::new(Mutex::new(Vec::new()));
        let tools = ToolRegistry::new().with(Arc::new(Recorder {
            order: order.clone(),
        }));
        let s = Arc::new(Session::new(
            "s1".to_string(),
            TransportKind::Sse,
            ProtocolEngine::new(tools),
        ));
        s.begin_handshake().unwrap();
        let mut rx = s.attach_outbound(16).unwrap();
        s.dispatch_to_stream(init()).await.unwrap();
        assert_eq!(rx.recv().await.unwrap()["id"], 1);

        let tasks: Vec<_> = (1..=6)
            .map(|n| {
                let s = s.clone();
                tokio::spawn(async move {
                    s.dispatch_to_stream(message(json!({
                        "jsonrpc": "2.0",
                        "id": 100 + n,
                        "method": "tools/call",
                        "params": { "name": "record", "arguments": { "n": n } }
                    })))
                    .await
                })
            })
            .collect();
        for task in tasks {
            task.await.unwrap().unwrap();
        }

        let mut pushed = Vec::new();
        for _ in 0..6 {
            pushed.push(rx.recv().await.unwrap()["id"].as_i64().unwrap() - 100);
        }
        assert_eq!(pushed, *lock(&order));
    }
}

//! Process-wide session registry. Maps session ids to live sessions.

use std::collections::HashMap;
use std::sync::{Arc, OnceLock, PoisonError, RwLock};
use std::time::Duration;

use uuid::Uuid;

use super::session::{Session, SessionInfo, TransportKind, STDIO_SESSION_ID};
use crate::protocol::ProtocolEngine;
use crate::tools::ToolRegistry;
use crate::types::{McpError, McpResult};

/// Registry of live HTTP-bound sessions, plus the single stdio session.
///
/// Every session gets a fresh `ProtocolEngine` built from the shared tool
/// table; engines are never handed from one session to another.
pub struct SessionRegistry {
    tools: ToolRegistry,
    sessions: RwLock<HashMap<String, Arc<Session>>>,
    stdio: OnceLock<Arc<Session>>,
}

impl SessionRegistry {
    pub fn new(tools: ToolRegistry) -> Self {
        Self {
            tools,
            sessions: RwLock::new(HashMap::new()),
            stdio: OnceLock::new(),
        }
    }

    pub fn tools(&self) -> &ToolRegistry {
        &self.tools
    }

    /// Create a session with its own engine.
    ///
    /// HTTP sessions get a fresh UUID and are registered under it. The stdio
    /// session uses a fixed implicit id and can be created once per process.
    pub fn create(&self, kind: TransportKind) -> McpResult<Arc<Session>> {
        if kind == TransportKind::Stdio {
            return self.create_stdio();
        }

        let mut sessions = self.sessions.write().unwrap_or_else(PoisonError::into_inner);
        let id = loop {
            let candidate = Uuid::new_v4().to_string();
            if !sessions.contains_key(&candidate) {
                break candidate;
            }
        };

        let session = Arc::new(Session::new(id.clone(), kind, self.new_engine()));
        sessions.insert(id.clone(), session.clone());
        tracing::info!(session = %id, transport = %kind, "Session created");
        Ok(session)
    }

    fn create_stdio(&self) -> McpResult<Arc<Session>> {
        let mut created = false;
        let session = self.stdio.get_or_init(|| {
            created = true;
            Arc::new(Session::new(
                STDIO_SESSION_ID.to_string(),
                TransportKind::Stdio,
                self.new_engine(),
            ))
        });
        if !created {
            return Err(McpError::Conflict(
                "stdio session already exists".to_string(),
            ));
        }
        tracing::info!(session = STDIO_SESSION_ID, "Session created");
        Ok(session.clone())
    }

    fn new_engine(&self) -> ProtocolEngine {
        ProtocolEngine::new(self.tools.clone())
    }

    /// Look up a registered HTTP session.
    pub fn lookup(&self, id: &str) -> Option<Arc<Session>> {
        self.sessions
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(id)
            .cloned()
    }

    pub fn stdio(&self) -> Option<Arc<Session>> {
        self.stdio.get().cloned()
    }

    /// Drop the registry's reference. The session's engine is released once
    /// the last in-flight holder lets go.
    pub fn remove(&self, id: &str) -> Option<Arc<Session>> {
        let removed = self
            .sessions
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(id);
        if removed.is_some() {
            tracing::debug!(session = %id, "Session removed from registry");
        }
        removed
    }

    pub fn len(&self) -> usize {
        self.sessions
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn all(&self) -> Vec<Arc<Session>> {
        let mut all: Vec<_> = self
            .sessions
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .cloned()
            .collect();
        all.extend(self.stdio());
        all
    }

    /// Point-in-time view of every session, for diagnostics.
    pub fn snapshot(&self) -> Vec<SessionInfo> {
        let mut infos: Vec<_> = self.all().iter().map(|s| s.info()).collect();
        infos.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        infos
    }

    /// Terminate one session: stop intake, drain in-flight work up to
    /// `deadline`, close, and deregister.
    pub async fn terminate(&self, session: &Session, deadline: Duration) {
        session.begin_termination();
        if !session.drain(deadline).await {
            tracing::warn!(
                session = %session.id(),
                in_flight = session.in_flight(),
                "Drain deadline passed, closing anyway"
            );
        }
        session.close();
        if session.kind() != TransportKind::Stdio {
            self.remove(session.id());
        }
    }

    /// Close and deregister without draining. For disconnects observed
    /// outside an async context.
    pub fn discard(&self, session: &Session) {
        session.begin_termination();
        session.close();
        if session.kind() != TransportKind::Stdio {
            self.remove(session.id());
        }
    }

    /// Move every session to `Terminating` and release their push streams.
    pub fn terminate_all(&self) {
        for session in self.all() {
            session.begin_termination();
        }
    }

    /// Wait for in-flight work on every session, up to `deadline` in total.
    /// Returns true if everything drained in time.
    pub async fn drain_all(&self, deadline: Duration) -> bool {
        let sessions = self.all();
        let drained = tokio::time::timeout(deadline, async {
            for session in &sessions {
                session.drain(deadline).await;
            }
        })
        .await
        .is_ok();

        if !drained {
            let pending: usize = sessions.iter().map(|s| s.in_flight()).sum();
            tracing::warn!(pending, "Drain deadline passed with requests in flight");
        }
        drained
    }

    /// Close every session and empty the registry.
    pub fn close_all(&self) {
        let sessions: Vec<_> = self
            .sessions
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .drain()
            .map(|(_, s)| s)
            .collect();
        for session in sessions.iter().chain(self.stdio.get()) {
            session.begin_termination();
            session.close();
        }
        tracing::info!(closed = sessions.len(), "All sessions closed");
    }
}

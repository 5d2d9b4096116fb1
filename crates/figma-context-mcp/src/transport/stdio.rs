//! Stdio transport: one implicit session, newline-delimited JSON-RPC.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};

use crate::session::{Session, SessionRegistry, TransportKind, STDIO_SESSION_ID};
use crate::types::{JsonRpcMessage, McpError, McpResult, RequestId};

use super::{framing, TransportAdapter};

/// Stdio transport for desktop MCP clients.
pub struct StdioTransport {
    registry: Arc<SessionRegistry>,
    session: Arc<Session>,
    drain_timeout: Duration,
}

impl StdioTransport {
    /// Creates the process's single stdio session.
    pub fn new(registry: Arc<SessionRegistry>, drain_timeout: Duration) -> McpResult<Self> {
        let session = registry.create(TransportKind::Stdio)?;
        Ok(Self {
            registry,
            session,
            drain_timeout,
        })
    }

    pub fn session(&self) -> &Arc<Session> {
        &self.session
    }

    /// Serve stdin/stdout until EOF.
    pub async fn run(&self) -> McpResult<()> {
        self.run_with(BufReader::new(tokio::io::stdin()), tokio::io::stdout())
            .await
    }

    /// Serve any line-oriented reader/writer pair until EOF, then close the
    /// session.
    pub async fn run_with<R, W>(&self, mut reader: R, mut writer: W) -> McpResult<()>
    where
        R: AsyncBufRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        tracing::info!("Stdio transport started");
        let result = self.serve(&mut reader, &mut writer).await;
        if let Err(e) = &result {
            tracing::error!("Stdio transport failed: {e}");
        }
        self.terminate(&self.session).await;
        result
    }

    async fn serve<R, W>(&self, reader: &mut R, writer: &mut W) -> McpResult<()>
    where
        R: AsyncBufRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        let mut line = String::new();

        loop {
            line.clear();
            let bytes_read = reader.read_line(&mut line).await?;

            if bytes_read == 0 {
                tracing::info!("EOF on stdin, shutting down");
                return Ok(());
            }

            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }

            let reply = match framing::parse_message(trimmed) {
                Ok(msg) => {
                    let id = msg.request_id();
                    match self.deliver(&self.session, msg).await {
                        Ok(response) => response,
                        Err(e) => {
                            tracing::warn!("Rejected message: {e}");
                            id.map(|id| e.to_json_value(id))
                        }
                    }
                }
                Err(e) => {
                    tracing::warn!("Invalid message: {e}");
                    Some(e.to_json_value(RequestId::Null))
                }
            };

            if let Some(response) = reply {
                write_line(writer, &response).await?;
            }
        }
    }
}

async fn write_line<W: AsyncWrite + Unpin>(writer: &mut W, value: &Value) -> McpResult<()> {
    let framed = framing::frame_message(value)?;
    writer.write_all(framed.as_bytes()).await?;
    writer.flush().await?;
    Ok(())
}

#[async_trait]
impl TransportAdapter for StdioTransport {
    fn kind(&self) -> TransportKind {
        TransportKind::Stdio
    }

    fn resolve_session(
        &self,
        session_id: Option<&str>,
        _message: Option<&JsonRpcMessage>,
    ) -> McpResult<Arc<Session>> {
        match session_id {
            None | Some(STDIO_SESSION_ID) => Ok(self.session.clone()),
            Some(other) => Err(McpError::SessionInvalid(format!(
                "stdio has no session {other}"
            ))),
        }
    }

    async fn terminate(&self, session: &Session) {
        self.registry.terminate(session, self.drain_timeout).await;
    }
}

//! Listening socket ownership and coordinated startup/shutdown.

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::TcpListener;
use tokio::sync::{oneshot, Mutex};
use tokio::task::JoinHandle;
use tokio::time::Instant;

use crate::config::ServerConfig;
use crate::session::SessionRegistry;
use crate::transport::router;
use crate::types::{McpError, McpResult};

struct Running {
    addr: SocketAddr,
    shutdown: oneshot::Sender<()>,
    task: JoinHandle<()>,
}

/// Owns the HTTP listener task and shuts sessions down in order.
pub struct LifecycleManager {
    registry: Arc<SessionRegistry>,
    config: ServerConfig,
    running: Mutex<Option<Running>>,
}

impl LifecycleManager {
    pub fn new(registry: Arc<SessionRegistry>, config: ServerConfig) -> Self {
        Self {
            registry,
            config,
            running: Mutex::new(None),
        }
    }

    pub fn registry(&self) -> &Arc<SessionRegistry> {
        &self.registry
    }

    /// Bind `host:port` (port 0 picks a free port) and serve in the background.
    pub async fn start(&self, host: &str, port: u16) -> McpResult<SocketAddr> {
        let mut running = self.running.lock().await;
        if let Some(r) = running.as_ref() {
            return Err(McpError::Conflict(format!(
                "server already listening on {}",
                r.addr
            )));
        }

        let listener = TcpListener::bind((host, port)).await?;
        let addr = listener.local_addr()?;
        let app = router(self.registry.clone(), &self.config);
        let (shutdown, rx) = oneshot::channel::<()>();

        let task = tokio::spawn(async move {
            let served = axum::serve(listener, app)
                .with_graceful_shutdown(async {
                    let _ = rx.await;
                })
                .await;
            if let Err(e) = served {
                tracing::error!("HTTP server error: {e}");
            }
        });

        tracing::info!("HTTP transport listening on {addr}");
        *running = Some(Running {
            addr,
            shutdown,
            task,
        });
        Ok(addr)
    }

    pub async fn local_addr(&self) -> Option<SocketAddr> {
        self.running.lock().await.as_ref().map(|r| r.addr)
    }

    pub async fn is_running(&self) -> bool {
        self.running.lock().await.is_some()
    }

    /// Terminate every session, drain, stop the listener, then close what is
    /// left. Bounded by the configured shutdown timeout. Safe to call twice.
    ///
    /// Returns false if the timeout forced anything closed.
    pub async fn stop(&self) -> bool {
        let mut running = self.running.lock().await;
        let Some(Running {
            addr,
            shutdown,
            mut task,
        }) = running.take()
        else {
            return true;
        };

        let deadline = Instant::now() + self.config.shutdown_timeout;
        tracing::info!("Stopping HTTP transport on {addr}");

        self.registry.terminate_all();
        let drained = self
            .registry
            .drain_all(deadline.saturating_duration_since(Instant::now()))
            .await;
        if !drained {
            tracing::warn!("Shutdown timeout: forcing sessions closed");
        }

        let _ = shutdown.send(());
        let mut clean = drained;
        match tokio::time::timeout_at(deadline, &mut task).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => tracing::warn!("HTTP server task ended abnormally: {e}"),
            Err(_) => {
                tracing::warn!("Shutdown timeout: aborting HTTP server task");
                task.abort();
                clean = false;
            }
        }

        self.registry.close_all();
        tracing::info!("HTTP transport stopped");
        clean
    }
}

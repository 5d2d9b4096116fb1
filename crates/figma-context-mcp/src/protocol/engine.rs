//! Per-session request dispatcher. Receives JSON-RPC messages and routes them to tools.

use serde_json::{json, Value};
use tokio::sync::{Mutex, MutexGuard};

use crate::tools::ToolRegistry;
use crate::types::*;

use super::negotiation::NegotiatedCapabilities;
use super::validator::validate_request;

/// JSON-RPC dispatcher owned by exactly one session.
///
/// Holds its own tool table and handshake state. Messages are processed one
/// at a time in arrival order; nothing here is shared with other sessions.
pub struct ProtocolEngine {
    tools: ToolRegistry,
    capabilities: Mutex<NegotiatedCapabilities>,
    dispatch: Mutex<()>,
}

impl ProtocolEngine {
    pub fn new(tools: ToolRegistry) -> Self {
        Self {
            tools,
            capabilities: Mutex::new(NegotiatedCapabilities::default()),
            dispatch: Mutex::new(()),
        }
    }

    pub fn tools(&self) -> &ToolRegistry {
        &self.tools
    }

    /// Whether this engine has answered an `initialize` request.
    pub async fn is_negotiated(&self) -> bool {
        self.capabilities.lock().await.is_negotiated()
    }

    /// Protocol revision agreed during the handshake.
    pub async fn protocol_version(&self) -> Option<String> {
        self.capabilities.lock().await.protocol_version.clone()
    }

    /// Handle one message. Returns the response envelope for requests and
    /// `None` for notifications and client responses.
    pub async fn handle_message(&self, msg: JsonRpcMessage) -> Option<Value> {
        let _turn = self.turn().await;
        self.process(msg).await
    }

    /// Exclusive use of this engine. Messages passed to [`Self::process`]
    /// while the guard is held are handled, and their replies delivered, in
    /// arrival order.
    pub(crate) async fn turn(&self) -> MutexGuard<'_, ()> {
        self.dispatch.lock().await
    }

    /// Handle one message; the caller holds a [`Self::turn`].
    pub(crate) async fn process(&self, msg: JsonRpcMessage) -> Option<Value> {
        match msg {
            JsonRpcMessage::Request(req) => Some(self.handle_request(req).await),
            JsonRpcMessage::Notification(notif) => {
                self.handle_notification(notif).await;
                None
            }
            _ => {
                tracing::warn!("Received unexpected message type from client");
                None
            }
        }
    }

    async fn handle_request(&self, request: JsonRpcRequest) -> Value {
        if let Err(e) = validate_request(&request) {
            return e.to_json_value(request.id);
        }

        let id = request.id.clone();
        match self.dispatch_request(request).await {
            Ok(value) => serde_json::to_value(JsonRpcResponse::new(id, value)).unwrap_or_default(),
            Err(e) => {
                tracing::debug!("Request {id} failed: {e}");
                e.to_json_value(id)
            }
        }
    }

    async fn dispatch_request(&self, request: JsonRpcRequest) -> McpResult<Value> {
        let method = request.method.as_str();

        if method != INITIALIZE_METHOD && !self.is_negotiated().await {
            return Err(McpError::NotInitialized(format!(
                "{method} sent before initialize"
            )));
        }

        match method {
            INITIALIZE_METHOD => self.handle_initialize(request.params).await,
            "ping" => Ok(json!({})),
            "shutdown" => {
                tracing::info!("Shutdown requested");
                Ok(json!({}))
            }

            "tools/list" => self.handle_tools_list(),
            "tools/call" => self.handle_tools_call(request.params).await,

            // No resources or prompts are offered; answer listings so generic
            // clients that probe them get an empty set instead of an error.
            "resources/list" => Ok(json!({ "resources": [] })),
            "resources/templates/list" => Ok(json!({ "resourceTemplates": [] })),
            "prompts/list" => Ok(json!({ "prompts": [] })),

            _ => Err(McpError::MethodNotFound(request.method.clone())),
        }
    }

    async fn handle_notification(&self, notification: JsonRpcNotification) {
        match notification.method.as_str() {
            "notifications/initialized" | "initialized" => {
                let mut caps = self.capabilities.lock().await;
                if let Err(e) = caps.mark_initialized() {
                    tracing::warn!("Failed to mark initialized: {e}");
                }
            }
            "notifications/cancelled" | "$/cancelRequest" => {
                let params = notification
                    .params
                    .and_then(|p| serde_json::from_value::<CancelledParams>(p).ok());
                match params {
                    Some(p) => tracing::info!("Client cancelled request {}", p.request_id),
                    None => tracing::info!("Received cancellation notification"),
                }
            }
            _ => {
                tracing::debug!("Unknown notification: {}", notification.method);
            }
        }
    }

    async fn handle_initialize(&self, params: Option<Value>) -> McpResult<Value> {
        let init_params: InitializeParams = params
            .map(serde_json::from_value)
            .transpose()
            .map_err(|e| McpError::InvalidParams(e.to_string()))?
            .ok_or_else(|| McpError::InvalidParams("Initialize params required".to_string()))?;

        let mut caps = self.capabilities.lock().await;
        let result = caps.negotiate(init_params)?;

        serde_json::to_value(result).map_err(|e| McpError::InternalError(e.to_string()))
    }

    fn handle_tools_list(&self) -> McpResult<Value> {
        let result = ToolListResult {
            tools: self.tools.list_tools(),
            next_cursor: None,
        };
        serde_json::to_value(result).map_err(|e| McpError::InternalError(e.to_string()))
    }

    async fn handle_tools_call(&self, params: Option<Value>) -> McpResult<Value> {
        let call_params: ToolCallParams = params
            .map(serde_json::from_value)
            .transpose()
            .map_err(|e| McpError::InvalidParams(e.to_string()))?
            .ok_or_else(|| McpError::InvalidParams("Tool call params required".to_string()))?;

        let result = self
            .tools
            .call(&call_params.name, call_params.arguments)
            .await?;

        serde_json::to_value(result).map_err(|e| McpError::InternalError(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use async_trait::async_trait;

    use crate::tools::ToolHandler;

    struct Counter {
        calls: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl ToolHandler for Counter {
        fn name(&self) -> &str {
            "count"
        }

        fn definition(&self) -> ToolDefinition {
            ToolDefinition {
                name: "count".to_string(),
                description: Some("Counts calls".to_string()),
                input_schema: json!({ "type": "object" }),
            }
        }

        async fn call(&self, _args: Value) -> McpResult<ToolCallResult> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            Ok(ToolCallResult::text(n.to_string()))
        }
    }

    fn engine_with_counter() -> (ProtocolEngine, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        let tools = ToolRegistry::new().with(Arc::new(Counter {
            calls: calls.clone(),
        }));
        (ProtocolEngine::new(tools), calls)
    }

    async fn send(engine: &ProtocolEngine, msg: Value) -> Option<Value> {
        let parsed: JsonRpcMessage = serde_json::from_value(msg).unwrap();
        engine.handle_message(parsed).await
    }

    fn init() -> Value {
        json!({
            "jsonrpc": "2.0",
            "id": 0,
            "method": "initialize",
            "params": {
                "protocolVersion": "2024-11-05",
                "capabilities": {},
                "clientInfo": { "name": "test", "version": "1.0" }
            }
        })
    }

    #[tokio::test]
    async fn test_requires_initialize_first() {
        let (engine, calls) = engine_with_counter();
        let resp = send(
            &engine,
            json!({"jsonrpc": "2.0", "id": 1, "method": "tools/call", "params": {"name": "count"}}),
        )
        .await
        .unwrap();
        assert_eq!(resp["error"]["code"], mcp_error_codes::NOT_INITIALIZED);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_ping_requires_initialize() {
        let (engine, _) = engine_with_counter();
        let resp = send(&engine, json!({"jsonrpc": "2.0", "id": 1, "method": "ping"}))
            .await
            .unwrap();
        assert_eq!(resp["error"]["code"], mcp_error_codes::NOT_INITIALIZED);

        send(&engine, init()).await.unwrap();
        let resp = send(&engine, json!({"jsonrpc": "2.0", "id": 2, "method": "ping"}))
            .await
            .unwrap();
        assert!(resp.get("result").is_some());
    }

    #[tokio::test]
    async fn test_handshake_then_call() {
        let (engine, calls) = engine_with_counter();
        let resp = send(&engine, init()).await.unwrap();
        assert_eq!(resp["result"]["serverInfo"]["name"], SERVER_NAME);
        assert!(send(
            &engine,
            json!({"jsonrpc": "2.0", "method": "notifications/initialized"})
        )
        .await
        .is_none());

        let resp = send(
            &engine,
            json!({"jsonrpc": "2.0", "id": 2, "method": "tools/call", "params": {"name": "count"}}),
        )
        .await
        .unwrap();
        assert_eq!(resp["result"]["content"][0]["text"], "1");
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_reinitialize_rejected() {
        let (engine, _) = engine_with_counter();
        send(&engine, init()).await.unwrap();
        let resp = send(&engine, init()).await.unwrap();
        assert_eq!(resp["error"]["code"], error_codes::INVALID_REQUEST);
    }

    #[tokio::test]
    async fn test_tools_list_is_stable() {
        let (engine, _) = engine_with_counter();
        send(&engine, init()).await.unwrap();
        let list = json!({"jsonrpc": "2.0", "id": 3, "method": "tools/list"});
        let first = send(&engine, list.clone()).await.unwrap();
        let second = send(&engine, list).await.unwrap();
        assert_eq!(first["result"], second["result"]);
        assert_eq!(first["result"]["tools"][0]["name"], "count");
    }

    #[tokio::test]
    async fn test_unknown_method_and_tool() {
        let (engine, _) = engine_with_counter();
        send(&engine, init()).await.unwrap();

        let resp = send(&engine, json!({"jsonrpc": "2.0", "id": 4, "method": "nope"}))
            .await
            .unwrap();
        assert_eq!(resp["error"]["code"], error_codes::METHOD_NOT_FOUND);

        let resp = send(
            &engine,
            json!({"jsonrpc": "2.0", "id": 5, "method": "tools/call", "params": {"name": "nope"}}),
        )
        .await
        .unwrap();
        assert_eq!(resp["error"]["code"], mcp_error_codes::TOOL_NOT_FOUND);
    }

    #[tokio::test]
    async fn test_bad_jsonrpc_version() {
        let (engine, _) = engine_with_counter();
        let resp = send(&engine, json!({"jsonrpc": "1.0", "id": 1, "method": "ping"}))
            .await
            .unwrap();
        assert_eq!(resp["error"]["code"], error_codes::INVALID_REQUEST);
    }
}

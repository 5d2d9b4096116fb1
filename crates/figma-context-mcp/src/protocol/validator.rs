//! JSON-RPC envelope validation.

use crate::types::{
    JsonRpcMessage, JsonRpcNotification, JsonRpcRequest, McpError, McpResult, RequestId,
    JSONRPC_VERSION,
};

/// Validate any inbound message. Responses from the client pass untouched.
pub fn validate_message(message: &JsonRpcMessage) -> McpResult<()> {
    match message {
        JsonRpcMessage::Request(request) => validate_request(request),
        JsonRpcMessage::Notification(notification) => validate_notification(notification),
        JsonRpcMessage::Response(_) | JsonRpcMessage::Error(_) => Ok(()),
    }
}

/// Validate that a JSON-RPC request is well-formed.
pub fn validate_request(request: &JsonRpcRequest) -> McpResult<()> {
    check_version(&request.jsonrpc)?;
    check_method(&request.method)?;

    // MCP forbids null request ids.
    if request.id == RequestId::Null {
        return Err(McpError::InvalidRequest(
            "Request id must be a string or number".to_string(),
        ));
    }

    Ok(())
}

fn validate_notification(notification: &JsonRpcNotification) -> McpResult<()> {
    check_version(&notification.jsonrpc)?;
    check_method(&notification.method)
}

fn check_version(version: &str) -> McpResult<()> {
    if version != JSONRPC_VERSION {
        return Err(McpError::InvalidRequest(format!(
            "Expected jsonrpc version \"{JSONRPC_VERSION}\", got \"{version}\""
        )));
    }
    Ok(())
}

fn check_method(method: &str) -> McpResult<()> {
    if method.is_empty() {
        return Err(McpError::InvalidRequest(
            "Method name must not be empty".to_string(),
        ));
    }
    Ok(())
}

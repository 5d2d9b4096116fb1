//! Message framing for newline-delimited JSON and HTTP bodies.

use serde_json::Value;

use crate::protocol::validator::validate_message;
use crate::types::{JsonRpcMessage, McpError, McpResult};

/// Parse one line (or one request body) as a JSON-RPC message.
///
/// Batches are not accepted; a JSON array is an invalid request. A bad
/// envelope (wrong `jsonrpc`, null id, empty method) is rejected here too.
pub fn parse_message(text: &str) -> McpResult<JsonRpcMessage> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Err(McpError::ParseError("Empty message".to_string()));
    }

    let value: Value =
        serde_json::from_str(trimmed).map_err(|e| McpError::ParseError(e.to_string()))?;
    if value.is_array() {
        return Err(McpError::InvalidRequest(
            "Batch requests are not supported".to_string(),
        ));
    }

    let message: JsonRpcMessage =
        serde_json::from_value(value).map_err(|e| McpError::InvalidRequest(e.to_string()))?;
    validate_message(&message)?;
    Ok(message)
}

/// Parse a raw request body.
pub fn parse_body(body: &[u8]) -> McpResult<JsonRpcMessage> {
    let text = std::str::from_utf8(body).map_err(|e| McpError::ParseError(e.to_string()))?;
    parse_message(text)
}

/// Serialize a value to a JSON line (with trailing newline).
pub fn frame_message(value: &Value) -> McpResult<String> {
    let mut json = serde_json::to_string(value).map_err(McpError::Json)?;
    json.push('\n');
    Ok(json)
}

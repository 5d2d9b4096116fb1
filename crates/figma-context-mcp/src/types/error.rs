//! Error types and JSON-RPC error codes for the MCP server.

use super::message::{JsonRpcError, JsonRpcErrorObject, RequestId, JSONRPC_VERSION};

/// Standard JSON-RPC 2.0 error codes.
pub mod error_codes {
    pub const PARSE_ERROR: i32 = -32700;
    pub const INVALID_REQUEST: i32 = -32600;
    pub const METHOD_NOT_FOUND: i32 = -32601;
    pub const INVALID_PARAMS: i32 = -32602;
    pub const INTERNAL_ERROR: i32 = -32603;
}

/// MCP-specific error codes.
pub mod mcp_error_codes {
    /// Session id missing, unknown, or addressed to a session that is not active.
    pub const SESSION_INVALID: i32 = -32001;
    /// Request other than `initialize` before the handshake.
    pub const NOT_INITIALIZED: i32 = -32002;
    /// A push stream is already attached to the session.
    pub const STREAM_CONFLICT: i32 = -32003;
    pub const TOOL_NOT_FOUND: i32 = -32803;
    pub const FIGMA_ERROR: i32 = -32852;
}

/// All errors that can occur in the MCP server.
#[derive(thiserror::Error, Debug)]
pub enum McpError {
    #[error("Parse error: {0}")]
    ParseError(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Method not found: {0}")]
    MethodNotFound(String),

    #[error("Invalid params: {0}")]
    InvalidParams(String),

    #[error("Internal error: {0}")]
    InternalError(String),

    #[error("Tool not found: {0}")]
    ToolNotFound(String),

    /// Missing, unknown, malformed, or inactive session. Never reaches a tool.
    #[error("Invalid session: {0}")]
    SessionInvalid(String),

    #[error("Server not initialized: {0}")]
    NotInitialized(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Figma error: {0}")]
    Figma(String),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl McpError {
    pub fn code(&self) -> i32 {
        use error_codes::*;
        use mcp_error_codes::*;
        match self {
            McpError::ParseError(_) => PARSE_ERROR,
            McpError::InvalidRequest(_) => INVALID_REQUEST,
            McpError::MethodNotFound(_) => METHOD_NOT_FOUND,
            McpError::InvalidParams(_) => INVALID_PARAMS,
            McpError::InternalError(_) => INTERNAL_ERROR,
            McpError::ToolNotFound(_) => TOOL_NOT_FOUND,
            McpError::SessionInvalid(_) => SESSION_INVALID,
            McpError::NotInitialized(_) => NOT_INITIALIZED,
            McpError::Conflict(_) => STREAM_CONFLICT,
            McpError::Figma(_) => FIGMA_ERROR,
            McpError::Transport(_) | McpError::Io(_) => INTERNAL_ERROR,
            McpError::Json(_) => PARSE_ERROR,
        }
    }

    pub fn to_json_rpc_error(&self, id: RequestId) -> JsonRpcError {
        JsonRpcError {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id,
            error: JsonRpcErrorObject {
                code: self.code(),
                message: self.to_string(),
                data: None,
            },
        }
    }

    /// JSON value form of [`McpError::to_json_rpc_error`], for transports that write raw values.
    pub fn to_json_value(&self, id: RequestId) -> serde_json::Value {
        serde_json::to_value(self.to_json_rpc_error(id)).unwrap_or_default()
    }
}

impl From<figma_context::FigmaError> for McpError {
    fn from(e: figma_context::FigmaError) -> Self {
        use figma_context::FigmaError;
        match e {
            FigmaError::InvalidFileKey(_) | FigmaError::InvalidNodeId(_) | FigmaError::InvalidPath(_) => {
                McpError::InvalidParams(e.to_string())
            }
            other => McpError::Figma(other.to_string()),
        }
    }
}

pub type McpResult<T> = Result<T, McpError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_invalid_code() {
        let err = McpError::SessionInvalid("nonexistent".to_string());
        let rpc = err.to_json_rpc_error(RequestId::Null);
        assert_eq!(rpc.error.code, -32001);
        assert!(rpc.error.message.contains("nonexistent"));
    }

    #[test]
    fn test_figma_validation_maps_to_invalid_params() {
        let err: McpError = figma_context::FigmaError::InvalidNodeId("x".to_string()).into();
        assert_eq!(err.code(), error_codes::INVALID_PARAMS);

        let err: McpError = figma_context::FigmaError::MissingCredentials.into();
        assert_eq!(err.code(), mcp_error_codes::FIGMA_ERROR);
    }

    #[test]
    fn test_mcp_codes_are_distinct() {
        let codes = [
            McpError::SessionInvalid(String::new()).code(),
            McpError::NotInitialized(String::new()).code(),
            McpError::Conflict(String::new()).code(),
            McpError::ToolNotFound(String::new()).code(),
            McpError::Figma(String::new()).code(),
        ];
        for (i, a) in codes.iter().enumerate() {
            assert!(codes[i + 1..].iter().all(|b| b != a), "duplicate code {a}");
        }
    }
}

//! MCP capability negotiation during initialization.

use crate::types::{
    ClientCapabilities, Implementation, InitializeParams, InitializeResult, McpError, McpResult,
    LATEST_PROTOCOL_VERSION, SUPPORTED_PROTOCOL_VERSIONS,
};

/// Handshake state for one protocol engine.
#[derive(Debug, Clone, Default)]
pub struct NegotiatedCapabilities {
    pub client: ClientCapabilities,
    pub client_info: Option<Implementation>,
    pub protocol_version: Option<String>,
    /// Set once the client sends `notifications/initialized`.
    pub initialized: bool,
}

impl NegotiatedCapabilities {
    /// Whether an `initialize` request has already been answered.
    pub fn is_negotiated(&self) -> bool {
        self.protocol_version.is_some()
    }

    pub fn negotiate(&mut self, params: InitializeParams) -> McpResult<InitializeResult> {
        if self.is_negotiated() {
            return Err(McpError::InvalidRequest(
                "Session is already initialized".to_string(),
            ));
        }

        let version = if SUPPORTED_PROTOCOL_VERSIONS.contains(&params.protocol_version.as_str()) {
            params.protocol_version.clone()
        } else {
            tracing::warn!(
                "Client requested protocol version {}, server supports {:?}. Proceeding with {}.",
                params.protocol_version,
                SUPPORTED_PROTOCOL_VERSIONS,
                LATEST_PROTOCOL_VERSION
            );
            LATEST_PROTOCOL_VERSION.to_string()
        };

        tracing::info!(
            "Initialized with client: {} v{} (protocol {version})",
            params.client_info.name,
            params.client_info.version
        );

        self.client = params.capabilities;
        self.client_info = Some(params.client_info);
        self.protocol_version = Some(version.clone());

        Ok(InitializeResult::for_version(&version))
    }

    pub fn mark_initialized(&mut self) -> McpResult<()> {
        if !self.is_negotiated() {
            return Err(McpError::NotInitialized(
                "initialized notification before initialize".to_string(),
            ));
        }
        self.initialized = true;
        tracing::info!("MCP handshake complete");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(version: &str) -> InitializeParams {
        InitializeParams {
            protocol_version: version.to_string(),
            capabilities: ClientCapabilities::default(),
            client_info: Implementation {
                name: "test".to_string(),
                version: "1.0".to_string(),
            },
        }
    }

    #[test]
    fn test_echoes_supported_version() {
        let mut caps = NegotiatedCapabilities::default();
        let result = caps.negotiate(params("2025-03-26")).unwrap();
        assert_eq!(result.protocol_version, "2025-03-26");
    }

    #[test]
    fn test_unknown_version_falls_back_to_latest() {
        let mut caps = NegotiatedCapabilities::default();
        let result = caps.negotiate(params("2099-01-01")).unwrap();
        assert_eq!(result.protocol_version, LATEST_PROTOCOL_VERSION);
    }

    #[test]
    fn test_second_negotiation_rejected() {
        let mut caps = NegotiatedCapabilities::default();
        caps.negotiate(params("2024-11-05")).unwrap();
        assert!(caps.negotiate(params("2024-11-05")).is_err());
    }

    #[test]
    fn test_initialized_requires_negotiation() {
        let mut caps = NegotiatedCapabilities::default();
        assert!(caps.mark_initialized().is_err());
        caps.negotiate(params("2024-11-05")).unwrap();
        assert!(caps.mark_initialized().is_ok());
        assert!(caps.initialized);
    }
}

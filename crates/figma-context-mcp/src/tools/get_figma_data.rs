//! `get_figma_data` tool: fetch layout and styling data for a file or node.

use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};

use figma_context::{normalize_node_id, validate_file_key, FigmaService};

use crate::types::{McpError, McpResult, ToolCallResult, ToolDefinition};

use super::registry::ToolHandler;

pub const NAME: &str = "get_figma_data";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GetFigmaDataParams {
    file_key: String,
    #[serde(default)]
    node_id: Option<String>,
    #[serde(default)]
    depth: Option<u32>,
}

pub struct GetFigmaData {
    figma: Arc<FigmaService>,
}

impl GetFigmaData {
    pub fn new(figma: Arc<FigmaService>) -> Self {
        Self { figma }
    }
}

#[async_trait]
impl ToolHandler for GetFigmaData {
    fn name(&self) -> &str {
        NAME
    }

    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: NAME.to_string(),
            description: Some(
                "Get comprehensive Figma file data including layout, content, visuals, and \
                 component information"
                    .to_string(),
            ),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "fileKey": {
                        "type": "string",
                        "pattern": "^[a-zA-Z0-9]+$",
                        "description": "The key of the Figma file, taken from figma.com/(file|design)/<fileKey>/..."
                    },
                    "nodeId": {
                        "type": "string",
                        "description": "Node ID from the node-id URL parameter, e.g. 1234:5678 or 1234-5678"
                    },
                    "depth": {
                        "type": "integer",
                        "minimum": 1,
                        "description": "How many levels deep to traverse the node tree. Only set when explicitly asked."
                    }
                },
                "required": ["fileKey"]
            }),
        }
    }

    async fn call(&self, args: Value) -> McpResult<ToolCallResult> {
        let params: GetFigmaDataParams =
            serde_json::from_value(args).map_err(|e| McpError::InvalidParams(e.to_string()))?;

        let file_key = validate_file_key(&params.file_key)?;
        let node_id = params
            .node_id
            .as_deref()
            .map(normalize_node_id)
            .transpose()?;

        let result = match &node_id {
            Some(id) => {
                tracing::info!("Fetching node {id} from file {file_key}");
                self.figma
                    .get_nodes(file_key, std::slice::from_ref(id), params.depth)
                    .await
            }
            None => {
                tracing::info!("Fetching file {file_key}");
                self.figma.get_file(file_key, params.depth).await
            }
        };

        match result {
            Ok(data) => Ok(ToolCallResult::json(&data)),
            Err(e) => {
                tracing::error!("Error fetching file {file_key}: {e}");
                Ok(ToolCallResult::error(format!(
                    "Error fetching file {file_key}: {e}"
                )))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use figma_context::FigmaAuth;

    fn unreachable_tool() -> GetFigmaData {
        let figma = FigmaService::with_base_url(FigmaAuth::api_key("k"), "http://127.0.0.1:9");
        GetFigmaData::new(Arc::new(figma))
    }

    #[tokio::test]
    async fn test_bad_file_key_is_invalid_params() {
        let err = unreachable_tool()
            .call(json!({ "fileKey": "not/a/key" }))
            .await
            .unwrap_err();
        assert!(matches!(err, McpError::InvalidParams(_)));
    }

    #[tokio::test]
    async fn test_remote_failure_is_tool_error() {
        let result = unreachable_tool()
            .call(json!({ "fileKey": "abc123", "nodeId": "1-2", "depth": 2 }))
            .await
            .unwrap();
        assert!(result.is_error());
    }
}

//! `get_node_screenshot` tool: PNG render of a single node.

use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};

use figma_context::{normalize_node_id, validate_file_key, FigmaService};

use crate::types::{McpError, McpResult, ToolCallResult, ToolDefinition};

use super::registry::ToolHandler;

pub const NAME: &str = "get_node_screenshot";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ScreenshotParams {
    node_id: String,
    file_key: String,
}

pub struct GetNodeScreenshot {
    figma: Arc<FigmaService>,
}

impl GetNodeScreenshot {
    pub fn new(figma: Arc<FigmaService>) -> Self {
        Self { figma }
    }
}

#[async_trait]
impl ToolHandler for GetNodeScreenshot {
    fn name(&self) -> &str {
        NAME
    }

    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: NAME.to_string(),
            description: Some(
                "Get a PNG screenshot for a specific Figma node. Requires fileKey and nodeId."
                    .to_string(),
            ),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "nodeId": {
                        "type": "string",
                        "description": "The ID of the node, e.g. 123:456 or 123-456"
                    },
                    "fileKey": {
                        "type": "string",
                        "pattern": "^[a-zA-Z0-9]+$",
                        "description": "The key of the Figma file"
                    }
                },
                "required": ["nodeId", "fileKey"]
            }),
        }
    }

    async fn call(&self, args: Value) -> McpResult<ToolCallResult> {
        let params: ScreenshotParams =
            serde_json::from_value(args).map_err(|e| McpError::InvalidParams(e.to_string()))?;
        let file_key = validate_file_key(&params.file_key)?;
        let node_id = normalize_node_id(&params.node_id)?;

        tracing::info!("Getting screenshot for node {node_id} from file {file_key}");

        match self.figma.get_node_screenshot(file_key, &node_id).await {
            Ok(Some(data)) => Ok(ToolCallResult::image(data, "image/png")),
            Ok(None) => Ok(ToolCallResult::error(format!(
                "Failed to render node {node_id}. The node may not exist or has no renderable content."
            ))),
            Err(e) => {
                tracing::error!("Error getting screenshot: {e}");
                Ok(ToolCallResult::error(format!(
                    "Failed to get screenshot: {e}"
                )))
            }
        }
    }
}

//! `download_figma_images` tool: save node renders and image fills to disk.

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};

use figma_context::{safe_local_path, validate_file_key, FigmaService, ImageRequest};

use crate::types::{McpError, McpResult, ToolCallResult, ToolDefinition};

use super::registry::ToolHandler;

pub const NAME: &str = "download_figma_images";

const DEFAULT_PNG_SCALE: f32 = 2.0;
const PNG_SCALE_RANGE: std::ops::RangeInclusive<f32> = 0.01..=4.0;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DownloadParams {
    file_key: String,
    nodes: Vec<ImageRequest>,
    local_path: String,
    #[serde(default)]
    png_scale: Option<f32>,
}

pub struct DownloadFigmaImages {
    figma: Arc<FigmaService>,
    root: PathBuf,
}

impl DownloadFigmaImages {
    /// `root` bounds every `localPath` the client can ask for.
    pub fn new(figma: Arc<FigmaService>, root: PathBuf) -> Self {
        Self { figma, root }
    }
}

#[async_trait]
impl ToolHandler for DownloadFigmaImages {
    fn name(&self) -> &str {
        NAME
    }

    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: NAME.to_string(),
            description: Some(
                "Download SVG and PNG images used in a Figma file based on the IDs of image or \
                 icon nodes"
                    .to_string(),
            ),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "fileKey": { "type": "string", "pattern": "^[a-zA-Z0-9]+$" },
                    "nodes": {
                        "type": "array",
                        "items": {
                            "type": "object",
                            "properties": {
                                "nodeId": { "type": "string" },
                                "imageRef": {
                                    "type": "string",
                                    "description": "Set for image fills; leave blank for vector renders"
                                },
                                "fileName": {
                                    "type": "string",
                                    "description": "Local file name; the extension picks svg or png"
                                }
                            },
                            "required": ["nodeId", "fileName"]
                        }
                    },
                    "localPath": {
                        "type": "string",
                        "description": "Directory, relative to the server's working directory, to store images in"
                    },
                    "pngScale": { "type": "number", "minimum": 0.01, "maximum": 4, "default": 2 }
                },
                "required": ["fileKey", "nodes", "localPath"]
            }),
        }
    }

    async fn call(&self, args: Value) -> McpResult<ToolCallResult> {
        let params: DownloadParams =
            serde_json::from_value(args).map_err(|e| McpError::InvalidParams(e.to_string()))?;
        let file_key = validate_file_key(&params.file_key)?;
        let scale = params.png_scale.unwrap_or(DEFAULT_PNG_SCALE);
        if !PNG_SCALE_RANGE.contains(&scale) {
            return Err(McpError::InvalidParams(format!(
                "pngScale {scale} is outside {}..={}",
                PNG_SCALE_RANGE.start(),
                PNG_SCALE_RANGE.end()
            )));
        }
        let dir = safe_local_path(&self.root, &params.local_path)?;
        for node in &params.nodes {
            safe_local_path(&dir, &node.file_name)?;
        }

        match self
            .figma
            .download_images(file_key, &dir, &params.nodes, scale)
            .await
        {
            Ok(saved) => {
                let lines: Vec<String> = saved
                    .iter()
                    .map(|img| format!("- {} ({} bytes)", img.path.display(), img.bytes))
                    .collect();
                Ok(ToolCallResult::text(format!(
                    "Downloaded {} of {} images:\n{}",
                    saved.len(),
                    params.nodes.len(),
                    lines.join("\n")
                )))
            }
            Err(e) => {
                tracing::error!("Error downloading images from {file_key}: {e}");
                Ok(ToolCallResult::error(format!(
                    "Failed to download images: {e}"
                )))
            }
        }
    }
}

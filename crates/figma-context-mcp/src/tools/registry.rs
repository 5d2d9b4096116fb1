//! Tool registration and dispatch.

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use figma_context::FigmaService;

use crate::types::{McpError, McpResult, ToolCallResult, ToolDefinition};

use super::{download_figma_images, get_figma_data, get_node_screenshot};

/// A named, schema-described operation callable through `tools/call`.
///
/// Handlers are stateless from the protocol's point of view: the same handler
/// may be registered in many engines at once.
#[async_trait]
pub trait ToolHandler: Send + Sync {
    fn name(&self) -> &str;

    fn definition(&self) -> ToolDefinition;

    /// Run the tool. Remote failures come back as `ToolCallResult::error`;
    /// `Err` is reserved for protocol-level problems such as bad arguments.
    async fn call(&self, args: Value) -> McpResult<ToolCallResult>;
}

/// Name-keyed set of tool handlers owned by one protocol engine.
///
/// Cloning produces an independent registration table that shares the
/// underlying handlers.
#[derive(Clone, Default)]
pub struct ToolRegistry {
    tools: Vec<Arc<dyn ToolHandler>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// The standard Figma tool set.
    pub fn figma(figma: Arc<FigmaService>, download_root: PathBuf) -> Self {
        Self::new()
            .with(Arc::new(get_figma_data::GetFigmaData::new(figma.clone())))
            .with(Arc::new(download_figma_images::DownloadFigmaImages::new(
                figma.clone(),
                download_root,
            )))
            .with(Arc::new(get_node_screenshot::GetNodeScreenshot::new(figma)))
    }

    /// Register a handler, replacing any handler with the same name.
    pub fn register(&mut self, tool: Arc<dyn ToolHandler>) {
        self.tools.retain(|t| t.name() != tool.name());
        self.tools.push(tool);
    }

    pub fn with(mut self, tool: Arc<dyn ToolHandler>) -> Self {
        self.register(tool);
        self
    }

    pub fn list_tools(&self) -> Vec<ToolDefinition> {
        self.tools.iter().map(|t| t.definition()).collect()
    }

    pub fn names(&self) -> Vec<&str> {
        self.tools.iter().map(|t| t.name()).collect()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    pub async fn call(&self, name: &str, arguments: Option<Value>) -> McpResult<ToolCallResult> {
        let tool = self
            .tools
            .iter()
            .find(|t| t.name() == name)
            .ok_or_else(|| McpError::ToolNotFound(name.to_string()))?;

        let args = arguments.unwrap_or(Value::Object(serde_json::Map::new()));
        tracing::debug!("Calling tool {name}");
        tool.call(args).await
    }
}
